//! Expressions
//!
//! Expression trees used in conditions and property assignments. `and`,
//! `or` and `cond` are special forms: operands that are skipped are never
//! evaluated.

use std::sync::Arc;

use crate::environment::Environment;
use crate::functions::{Args, FunctionDef, FunctionRegistry};
use crate::value::{Value, ValueType};
use crate::MapCssError;

/// Which part of a referenced condition a placeholder inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderPart {
    Key,
    Value,
    /// `key=value`
    Tag,
}

/// Piece of a string literal with placeholders
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// `{index.part}`, the index counts conditions of the matched selector
    Placeholder { index: usize, part: PlaceholderPart },
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Value),
    Call {
        function: Arc<FunctionDef>,
        args: Vec<Expression>,
    },
    /// True if every operand is true; stops at the first that is not
    And(Vec<Expression>),
    /// True if any operand is true; stops at the first that is
    Or(Vec<Expression>),
    /// `test ? then : otherwise`, absent tests take the else branch
    Cond {
        test: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// String literal with `{i.key}`, `{i.value}` or `{i.tag}` references
    Template(Vec<TemplatePart>),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// Build a function application
    ///
    /// `and`, `or` and `cond` become special forms. Other names are
    /// resolved against the registry by arity; literal arguments that
    /// cannot be converted to the parameter type are rejected.
    pub fn call(registry: &FunctionRegistry, name: &str, mut args: Vec<Expression>) -> Result<Self, MapCssError> {
        match name {
            "and" => return Ok(Expression::And(args)),
            "or" => return Ok(Expression::Or(args)),
            "cond" if args.len() == 2 || args.len() == 3 => {
                let otherwise = if args.len() == 3 {
                    args.pop().unwrap_or(Expression::Literal(Value::Absent))
                } else {
                    Expression::Literal(Value::Absent)
                };
                let then = args.pop().unwrap_or(Expression::Literal(Value::Absent));
                let test = args.pop().unwrap_or(Expression::Literal(Value::Absent));
                return Ok(Expression::Cond {
                    test: Box::new(test),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                });
            }
            _ => {}
        }

        let function = registry.resolve(name, args.len())?;
        for (index, arg) in args.iter().enumerate() {
            let expected = function.signature().param_type(index);
            if let Expression::Literal(value) = arg
                && !value.is_absent()
                && expected != ValueType::Any
                && value.coerce(expected).is_none()
            {
                return Err(MapCssError::ArgumentType {
                    function: name.to_string(),
                    index,
                    expected: expected.name(),
                });
            }
        }
        Ok(Expression::Call { function, args })
    }

    /// String literal, split into a template if it holds placeholders
    pub fn string(text: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let candidate = &rest[open..];
            match parse_placeholder(candidate) {
                Some((placeholder, len)) => {
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut literal)));
                    }
                    parts.push(placeholder);
                    rest = &candidate[len..];
                }
                None => {
                    literal.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        literal.push_str(rest);

        if parts.is_empty() {
            return Expression::Literal(Value::String(literal));
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Text(literal));
        }
        Expression::Template(parts)
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn evaluate(&self, env: &Environment<'_>) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::Call { function, args } => {
                let mut values = Args::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    let ty = function.signature().param_type(i);
                    match arg.evaluate(env).coerce(ty) {
                        Some(v) => values.push(v),
                        None if function.is_null_tolerant() => values.push(Value::Absent),
                        None => return Value::Absent,
                    }
                }
                function.call(env, &values)
            }
            Expression::And(args) => {
                Value::Bool(args.iter().all(|a| a.evaluate(env).as_bool() == Some(true)))
            }
            Expression::Or(args) => {
                Value::Bool(args.iter().any(|a| a.evaluate(env).as_bool() == Some(true)))
            }
            Expression::Cond { test, then, otherwise } => {
                if test.evaluate(env).as_bool() == Some(true) {
                    then.evaluate(env)
                } else {
                    otherwise.evaluate(env)
                }
            }
            Expression::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Placeholder { index, part } => {
                            out.push_str(&resolve_placeholder(env, *index, *part));
                        }
                    }
                }
                Value::String(out)
            }
        }
    }
}

/// Parse `{index.part}` at the start of `s`, returning the part and its length
fn parse_placeholder(s: &str) -> Option<(TemplatePart, usize)> {
    let close = s.find('}')?;
    let (index, part) = s[1..close].split_once('.')?;
    let index = index.parse::<usize>().ok()?;
    let part = match part {
        "key" => PlaceholderPart::Key,
        "value" => PlaceholderPart::Value,
        "tag" => PlaceholderPart::Tag,
        _ => return None,
    };
    Some((TemplatePart::Placeholder { index, part }, close + 1))
}

/// Text for a placeholder; empty if the condition or tag does not exist
fn resolve_placeholder(env: &Environment<'_>, index: usize, part: PlaceholderPart) -> String {
    let Some(key) = env
        .selector
        .and_then(|s| s.anchor().conditions.get(index))
        .and_then(|c| c.tag_key())
    else {
        return String::new();
    };
    match part {
        PlaceholderPart::Key => key.to_string(),
        PlaceholderPart::Value => env.tag(key).unwrap_or_default().to_string(),
        PlaceholderPart::Tag => format!("{}={}", key, env.tag(key).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Signature;
    use fos_osm::{DataSet, PrimitiveId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn num(n: f64) -> Expression {
        Expression::literal(n)
    }

    #[test]
    fn test_call_evaluates() {
        let registry = FunctionRegistry::new();
        let ds = DataSet::new();
        let env = Environment::new(&ds, PrimitiveId::node(1));
        let expr = Expression::call(&registry, "times", vec![num(2.0), num(2.0)]).unwrap();
        assert_eq!(expr.evaluate(&env), Value::Number(4.0));
    }

    #[test]
    fn test_absent_argument_propagates() {
        let registry = FunctionRegistry::new();
        let ds = DataSet::new();
        let env = Environment::new(&ds, PrimitiveId::node(1));
        let tag = Expression::call(&registry, "tag", vec![Expression::literal("width")]).unwrap();
        let expr = Expression::call(&registry, "plus", vec![tag.clone(), num(1.0)]).unwrap();
        assert_eq!(expr.evaluate(&env), Value::Absent);

        // concat tolerates absent arguments
        let expr = Expression::call(&registry, "concat", vec![Expression::literal("w"), tag]).unwrap();
        assert_eq!(expr.evaluate(&env), Value::from("w"));
    }

    #[test]
    fn test_literal_type_checked_at_load() {
        let registry = FunctionRegistry::new();
        let err = Expression::call(&registry, "sqrt", vec![Expression::literal("wide")]).unwrap_err();
        assert!(matches!(err, MapCssError::ArgumentType { index: 0, .. }));
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut registry = FunctionRegistry::new();
        registry.register("side_effect", Signature::fixed(&[]), false, |_, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Value::Bool(true)
        });
        let ds = DataSet::new();
        let env = Environment::new(&ds, PrimitiveId::node(1));
        let effect = || Expression::call(&registry, "side_effect", vec![]).unwrap();

        let and = Expression::call(&registry, "and", vec![Expression::literal(false), effect()]).unwrap();
        assert_eq!(and.evaluate(&env), Value::Bool(false));
        let or = Expression::call(&registry, "or", vec![Expression::literal(true), effect()]).unwrap();
        assert_eq!(or.evaluate(&env), Value::Bool(true));
        let cond = Expression::call(&registry, "cond", vec![Expression::literal(false), effect(), num(1.0)]).unwrap();
        assert_eq!(cond.evaluate(&env), Value::Number(1.0));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let and = Expression::call(&registry, "and", vec![Expression::literal(true), effect()]).unwrap();
        assert_eq!(and.evaluate(&env), Value::Bool(true));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_template_split() {
        match Expression::string("{0.value} ({1.key})") {
            Expression::Template(parts) => {
                assert_eq!(parts.len(), 4);
                assert_eq!(parts[0], TemplatePart::Placeholder { index: 0, part: PlaceholderPart::Value });
                assert_eq!(parts[1], TemplatePart::Text(" (".to_string()));
                assert_eq!(parts[3], TemplatePart::Text(")".to_string()));
            }
            other => panic!("expected template, got {:?}", other),
        }
        assert!(Expression::string("plain").as_literal().is_some());
    }
}
