//! Conditions
//!
//! Predicates over one object's tags, its role or position in a matched
//! link, pseudo-classes, class references and boolean expressions. All
//! validation (numbers, regular expressions, pseudo-class names) happens in
//! the constructors; `applies` never fails.

use regex::Regex;

use crate::environment::{Context, Environment};
use crate::expression::Expression;
use crate::pseudo_class::{self, PseudoClassFn};
use crate::MapCssError;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `=~`
    Regex,
    /// `!~`
    NRegex,
    /// `~=`, member of a `;` separated list
    OneOf,
    /// `^=`
    BeginsWith,
    /// `$=`
    EndsWith,
    /// `*=`
    Contains,
}

impl Op {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Op::Greater | Op::GreaterOrEqual | Op::Less | Op::LessOrEqual)
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Op::Regex | Op::NRegex)
    }

    /// Operators that hold when the tested value is absent
    pub fn is_negated(&self) -> bool {
        matches!(self, Op::Neq | Op::NRegex)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Neq => "!=",
            Op::Greater => ">",
            Op::GreaterOrEqual => ">=",
            Op::Less => "<",
            Op::LessOrEqual => "<=",
            Op::Regex => "=~",
            Op::NRegex => "!~",
            Op::OneOf => "~=",
            Op::BeginsWith => "^=",
            Op::EndsWith => "$=",
            Op::Contains => "*=",
        }
    }

    /// Compare an object value with a reference
    ///
    /// `number` is the parsed reference for numeric operators, `regex` the
    /// compiled reference for regex operators.
    fn eval(&self, actual: Option<&str>, reference: &str, number: Option<f64>, regex: Option<&Regex>) -> bool {
        let Some(actual) = actual else {
            return self.is_negated();
        };
        match self {
            Op::Eq => actual == reference,
            Op::Neq => actual != reference,
            Op::Greater | Op::GreaterOrEqual | Op::Less | Op::LessOrEqual => {
                let (Ok(a), Some(b)) = (actual.trim().parse::<f64>(), number) else {
                    return false;
                };
                match self {
                    Op::Greater => a > b,
                    Op::GreaterOrEqual => a >= b,
                    Op::Less => a < b,
                    _ => a <= b,
                }
            }
            Op::Regex => regex.is_some_and(|re| re.is_match(actual)),
            Op::NRegex => !regex.is_some_and(|re| re.is_match(actual)),
            Op::OneOf => actual.split(';').any(|part| part.trim() == reference),
            Op::BeginsWith => actual.starts_with(reference),
            Op::EndsWith => actual.ends_with(reference),
            Op::Contains => actual.contains(reference),
        }
    }
}

/// How a bare key condition tests its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// `[key]`
    Exists,
    /// `[key?]`, value is `yes`, `true` or `1`
    True,
    /// `[key?!]`, value is `no`, `false` or `0`
    False,
    /// `[/pattern/]`, any key matches
    Regex,
}

/// Tag an object must carry for a condition to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredTag<'a> {
    /// `key=value`
    Exact(&'a str, &'a str),
    /// `key` with any value
    Key(&'a str),
}

#[derive(Debug, Clone)]
pub enum Condition {
    KeyPresence {
        key: String,
        kind: KeyMatch,
        negate: bool,
        /// Compiled key pattern for [`KeyMatch::Regex`]
        pattern: Option<Regex>,
    },
    KeyValue {
        key: String,
        value: String,
        op: Op,
        /// Compare against the value of tag `value` instead of the literal
        value_is_key: bool,
        number: Option<f64>,
        regex: Option<Regex>,
    },
    /// Some tag whose key matches `key` has a value matching (`=~`) or not
    /// matching (`!~`) `value`
    RegexKeyValue { key: Regex, value: Regex, op: Op },
    /// Role of the matched membership (link context)
    Role { op: Op, value: String, regex: Option<Regex> },
    /// 1-based position in the parent; negative values count from the end
    Index { op: Op, value: f64, from_end: bool },
    Expression(Expression),
    PseudoClass {
        name: &'static str,
        test: PseudoClassFn,
        negate: bool,
    },
    /// `.name`: `set .name` ran in the current sub-layer
    ClassReference { class: String, negate: bool },
}

fn compile(pattern: &str) -> Result<Regex, MapCssError> {
    Regex::new(pattern).map_err(|source| MapCssError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn parse_number(value: &str) -> Result<f64, MapCssError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
        .ok_or_else(|| MapCssError::InvalidNumber(value.to_string()))
}

impl Condition {
    /// `[key]`, `[!key]`, `[key?]`, `[key?!]`
    pub fn key(key: impl Into<String>, kind: KeyMatch, negate: bool) -> Result<Self, MapCssError> {
        let key = key.into();
        let pattern = match kind {
            KeyMatch::Regex => Some(compile(&key)?),
            _ => None,
        };
        Ok(Condition::KeyPresence { key, kind, negate, pattern })
    }

    /// `[key op value]`
    pub fn key_value(key: impl Into<String>, value: impl Into<String>, op: Op) -> Result<Self, MapCssError> {
        let value = value.into();
        let number = if op.is_numeric() { Some(parse_number(&value)?) } else { None };
        let regex = if op.is_regex() { Some(compile(&value)?) } else { None };
        Ok(Condition::KeyValue {
            key: key.into(),
            value,
            op,
            value_is_key: false,
            number,
            regex,
        })
    }

    /// `[key op *other]`, compares with the value of tag `other`
    pub fn key_value_indirect(key: impl Into<String>, other: impl Into<String>, op: Op) -> Result<Self, MapCssError> {
        if op.is_regex() {
            return Err(MapCssError::UnsupportedOperator {
                op: op.symbol().to_string(),
                context: "tag value references",
            });
        }
        Ok(Condition::KeyValue {
            key: key.into(),
            value: other.into(),
            op,
            value_is_key: true,
            number: None,
            regex: None,
        })
    }

    /// `[/key/ =~ /value/]` or `[/key/ !~ /value/]`
    pub fn regex_key_value(key: &str, value: &str, op: Op) -> Result<Self, MapCssError> {
        if !op.is_regex() {
            return Err(MapCssError::UnsupportedOperator {
                op: op.symbol().to_string(),
                context: "key patterns",
            });
        }
        Ok(Condition::RegexKeyValue {
            key: compile(key)?,
            value: compile(value)?,
            op,
        })
    }

    pub fn role(op: Op, value: impl Into<String>) -> Result<Self, MapCssError> {
        let value = value.into();
        if op.is_numeric() {
            return Err(MapCssError::UnsupportedOperator {
                op: op.symbol().to_string(),
                context: "roles",
            });
        }
        let regex = if op.is_regex() { Some(compile(&value)?) } else { None };
        Ok(Condition::Role { op, value, regex })
    }

    pub fn index(op: Op, value: &str) -> Result<Self, MapCssError> {
        if !(op.is_numeric() || matches!(op, Op::Eq | Op::Neq)) {
            return Err(MapCssError::UnsupportedOperator {
                op: op.symbol().to_string(),
                context: "indexes",
            });
        }
        let number = parse_number(value)?;
        Ok(Condition::Index {
            op,
            value: number,
            from_end: value.trim().starts_with('-'),
        })
    }

    /// `:name` or `!:name`; unknown names are rejected
    pub fn pseudo_class(name: &str, negate: bool) -> Result<Self, MapCssError> {
        let (name, test) =
            pseudo_class::lookup(name).ok_or_else(|| MapCssError::UnknownPseudoClass(name.to_string()))?;
        Ok(Condition::PseudoClass { name, test, negate })
    }

    pub fn class(class: impl Into<String>, negate: bool) -> Self {
        Condition::ClassReference {
            class: class.into(),
            negate,
        }
    }

    pub fn expression(expr: Expression) -> Self {
        Condition::Expression(expr)
    }

    /// Evaluate against an environment
    pub fn applies(&self, env: &Environment<'_>) -> bool {
        match self {
            Condition::KeyPresence { key, kind, negate, pattern } => {
                let found = match kind {
                    KeyMatch::Exists => env.graph.has_key(env.osm, key),
                    KeyMatch::True => matches!(env.tag(key), Some("yes" | "true" | "1")),
                    KeyMatch::False => matches!(env.tag(key), Some("no" | "false" | "0")),
                    KeyMatch::Regex => pattern
                        .as_ref()
                        .is_some_and(|re| env.tags().is_some_and(|t| t.keys().any(|k| re.is_match(k)))),
                };
                found != *negate
            }
            Condition::KeyValue {
                key,
                value,
                op,
                value_is_key,
                number,
                regex,
            } => {
                let actual = env.tag(key);
                if *value_is_key {
                    let Some(reference) = env.tag(value) else {
                        return op.is_negated();
                    };
                    let number = reference.trim().parse::<f64>().ok();
                    return op.eval(actual, reference, number, None);
                }
                op.eval(actual, value, *number, regex.as_ref())
            }
            Condition::RegexKeyValue { key, value, op } => env.tags().is_some_and(|tags| {
                tags.iter()
                    .filter(|(k, _)| key.is_match(k))
                    .any(|(_, v)| value.is_match(v) == (*op == Op::Regex))
            }),
            Condition::Role { op, value, regex } => {
                env.context == Context::Link && op.eval(env.role(), value, None, regex.as_ref())
            }
            Condition::Index { op, value, from_end } => {
                if env.context != Context::Link {
                    return false;
                }
                let (Some(index), Some(count)) = (env.index, env.count) else {
                    return false;
                };
                let position = if *from_end {
                    index as f64 - count as f64
                } else {
                    (index + 1) as f64
                };
                match op {
                    Op::Eq => position == *value,
                    Op::Neq => position != *value,
                    Op::Greater => position > *value,
                    Op::GreaterOrEqual => position >= *value,
                    Op::Less => position < *value,
                    Op::LessOrEqual => position <= *value,
                    _ => false,
                }
            }
            Condition::Expression(expr) => expr.evaluate(env).as_bool() == Some(true),
            Condition::PseudoClass { test, negate, .. } => test(env) != *negate,
            Condition::ClassReference { class, negate } => match env.current_cascade() {
                Some(cascade) => {
                    let set = cascade.get(class).and_then(|v| v.as_bool()) == Some(true);
                    set != *negate
                }
                None => false,
            },
        }
    }

    /// Key this condition refers to (placeholder lookups)
    pub fn tag_key(&self) -> Option<&str> {
        match self {
            Condition::KeyPresence { key, kind, .. } if *kind != KeyMatch::Regex => Some(key),
            Condition::KeyValue { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Tag the object must carry for this condition to hold, if any
    pub fn required_tag(&self) -> Option<RequiredTag<'_>> {
        match self {
            Condition::KeyValue {
                key,
                value,
                op: Op::Eq,
                value_is_key: false,
                ..
            } => Some(RequiredTag::Exact(key, value)),
            Condition::KeyValue { key, op, .. } if !op.is_negated() => Some(RequiredTag::Key(key)),
            Condition::KeyPresence {
                key,
                kind,
                negate: false,
                ..
            } if *kind != KeyMatch::Regex => Some(RequiredTag::Key(key)),
            _ => None,
        }
    }

    /// Whether the condition tests the link rather than an object
    pub fn is_link_condition(&self) -> bool {
        matches!(self, Condition::Role { .. } | Condition::Index { .. })
            || matches!(self, Condition::PseudoClass { name: "open_end", .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::MultiCascade;
    use crate::value::Value;
    use fos_osm::{DataSet, LatLon, Member, PrimitiveId, TagMap};

    fn dataset(tags: &[(&str, &str)]) -> DataSet {
        let mut ds = DataSet::new();
        ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::from_pairs(tags)).unwrap();
        ds
    }

    fn applies(cond: &Condition, tags: &[(&str, &str)]) -> bool {
        let ds = dataset(tags);
        cond.applies(&Environment::new(&ds, PrimitiveId::node(1)))
    }

    #[test]
    fn test_equals_and_absence() {
        let eq = Condition::key_value("highway", "primary", Op::Eq).unwrap();
        assert!(applies(&eq, &[("highway", "primary")]));
        assert!(!applies(&eq, &[("highway", "secondary")]));
        assert!(!applies(&eq, &[]));

        let neq = Condition::key_value("highway", "primary", Op::Neq).unwrap();
        assert!(applies(&neq, &[]));
        assert!(!applies(&neq, &[("highway", "primary")]));
    }

    #[test]
    fn test_numeric_fail_fast_and_non_numeric_values() {
        assert!(matches!(
            Condition::key_value("lanes", "many", Op::Greater),
            Err(MapCssError::InvalidNumber(_))
        ));
        let gt = Condition::key_value("lanes", "2", Op::Greater).unwrap();
        assert!(applies(&gt, &[("lanes", "3")]));
        assert!(!applies(&gt, &[("lanes", "2")]));
        assert!(!applies(&gt, &[("lanes", "three")]));
        assert!(!applies(&gt, &[]));
    }

    #[test]
    fn test_one_of_trims_parts() {
        let cond = Condition::key_value("cuisine", "pizza", Op::OneOf).unwrap();
        assert!(applies(&cond, &[("cuisine", "kebab; pizza")]));
        assert!(!applies(&cond, &[("cuisine", "pizzeria")]));
    }

    #[test]
    fn test_regex_conditions() {
        assert!(matches!(
            Condition::key_value("name", "(", Op::Regex),
            Err(MapCssError::InvalidRegex { .. })
        ));
        let re = Condition::key_value("name", "^Main", Op::Regex).unwrap();
        assert!(applies(&re, &[("name", "Main Street")]));
        let nre = Condition::key_value("name", "^Main", Op::NRegex).unwrap();
        assert!(applies(&nre, &[]));

        let key_re = Condition::regex_key_value("^name:", "^B", Op::Regex).unwrap();
        assert!(applies(&key_re, &[("name:de", "Berlin")]));
        assert!(!applies(&key_re, &[("name", "Berlin")]));
    }

    #[test]
    fn test_key_presence_kinds() {
        let t = Condition::key("oneway", KeyMatch::True, false).unwrap();
        assert!(applies(&t, &[("oneway", "yes")]));
        assert!(!applies(&t, &[("oneway", "-1")]));
        let f = Condition::key("oneway", KeyMatch::False, false).unwrap();
        assert!(applies(&f, &[("oneway", "no")]));
        let not = Condition::key("oneway", KeyMatch::Exists, true).unwrap();
        assert!(applies(&not, &[]));
        let re = Condition::key("^addr:", KeyMatch::Regex, false).unwrap();
        assert!(applies(&re, &[("addr:street", "x")]));
    }

    #[test]
    fn test_value_is_key() {
        let cond = Condition::key_value_indirect("name", "ref", Op::Eq).unwrap();
        assert!(applies(&cond, &[("name", "A1"), ("ref", "A1")]));
        assert!(!applies(&cond, &[("name", "A1"), ("ref", "A2")]));
        assert!(!applies(&cond, &[("name", "A1")]));
    }

    #[test]
    fn test_unknown_pseudo_class() {
        assert!(matches!(
            Condition::pseudo_class("nonsense", false),
            Err(MapCssError::UnknownPseudoClass(_))
        ));
    }

    #[test]
    fn test_role_and_index_in_link_context() {
        let mut ds = DataSet::new();
        for i in 1..=3 {
            ds.add_node(i, LatLon::new(0.0, i as f64), TagMap::new()).unwrap();
        }
        let members = vec![
            Member::new("stop", PrimitiveId::node(1)),
            Member::new("platform", PrimitiveId::node(2)),
            Member::new("stop", PrimitiveId::node(3)),
        ];
        let rel = ds.add_relation(10, members, TagMap::new()).unwrap();
        let env = Environment::new(&ds, PrimitiveId::node(3))
            .with_parent(rel)
            .with_index(2, 3)
            .with_link_context();

        assert!(Condition::role(Op::Eq, "stop").unwrap().applies(&env));
        assert!(!Condition::role(Op::Eq, "platform").unwrap().applies(&env));
        assert!(Condition::index(Op::Eq, "3").unwrap().applies(&env));
        assert!(Condition::index(Op::Eq, "-1").unwrap().applies(&env));
        assert!(!Condition::index(Op::Eq, "1").unwrap().applies(&env));

        // Not outside of a link
        assert!(!Condition::role(Op::Eq, "stop").unwrap().applies(&env.with_primitive_context()));
    }

    #[test]
    fn test_class_reference() {
        let ds = dataset(&[]);
        let mut mc = MultiCascade::new();
        let cond = Condition::class("major", false);
        let env = Environment::new(&ds, PrimitiveId::node(1));
        assert!(!cond.applies(&env.with_cascade(&mc)));

        mc.layer_or_create("default").put("major", Value::Bool(true));
        assert!(cond.applies(&env.with_cascade(&mc)));
        assert!(!Condition::class("major", true).applies(&env.with_cascade(&mc)));
    }

    #[test]
    fn test_required_tag() {
        let eq = Condition::key_value("highway", "primary", Op::Eq).unwrap();
        assert_eq!(eq.required_tag(), Some(RequiredTag::Exact("highway", "primary")));
        let gt = Condition::key_value("lanes", "2", Op::Greater).unwrap();
        assert_eq!(gt.required_tag(), Some(RequiredTag::Key("lanes")));
        let neq = Condition::key_value("highway", "primary", Op::Neq).unwrap();
        assert_eq!(neq.required_tag(), None);
        let indirect = Condition::key_value_indirect("name", "ref", Op::Eq).unwrap();
        assert_eq!(indirect.required_tag(), Some(RequiredTag::Key("name")));
        let negated = Condition::key("highway", KeyMatch::Exists, true).unwrap();
        assert_eq!(negated.required_tag(), None);
    }
}
