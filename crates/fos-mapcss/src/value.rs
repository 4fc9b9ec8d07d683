//! Dynamically Typed Values
//!
//! The result type of expression evaluation and the content of cascades.
//! All conversions between variants go through [`Value::coerce`].

use std::cmp::Ordering;
use std::fmt;

use crate::color::Color;

/// A value produced by an expression
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value (null)
    #[default]
    Absent,
    Bool(bool),
    Number(f64),
    String(String),
    Color(Color),
    List(Vec<Value>),
}

/// Target type of a coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accept any value unchanged
    Any,
    Bool,
    Number,
    String,
    Color,
    List,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Bool => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Color => "color",
            ValueType::List => "list",
        }
    }
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Type of this value, `None` for [`Value::Absent`]
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Absent => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Number(_) => Some(ValueType::Number),
            Value::String(_) => Some(ValueType::String),
            Value::Color(_) => Some(ValueType::Color),
            Value::List(_) => Some(ValueType::List),
        }
    }

    /// Convert to `target`; `None` if the conversion is not defined
    ///
    /// - bool: numbers are true unless zero or NaN, strings unless empty,
    ///   `false`, `no` or `0`, lists unless empty, colors always
    /// - number: booleans are 1/0, strings are parsed after trimming
    /// - string: the display form of the value; lists join with `;`
    /// - color: strings are parsed as hex or CSS color names
    /// - list: any other value becomes a one-element list
    pub fn coerce(&self, target: ValueType) -> Option<Value> {
        if self.is_absent() {
            return None;
        }
        match target {
            ValueType::Any => Some(self.clone()),
            ValueType::Bool => {
                let b = match self {
                    Value::Bool(b) => *b,
                    Value::Number(n) => *n != 0.0 && !n.is_nan(),
                    Value::String(s) => !matches!(s.as_str(), "" | "false" | "no" | "0"),
                    Value::List(l) => !l.is_empty(),
                    Value::Color(_) => true,
                    Value::Absent => return None,
                };
                Some(Value::Bool(b))
            }
            ValueType::Number => match self {
                Value::Number(n) => Some(Value::Number(*n)),
                Value::Bool(b) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::Number),
                _ => None,
            },
            ValueType::String => Some(Value::String(self.to_string())),
            ValueType::Color => match self {
                Value::Color(c) => Some(Value::Color(*c)),
                Value::String(s) => Color::parse(s).map(Value::Color),
                _ => None,
            },
            ValueType::List => match self {
                Value::List(l) => Some(Value::List(l.clone())),
                other => Some(Value::List(vec![other.clone()])),
            },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.coerce(ValueType::Bool)? {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.coerce(ValueType::Number)? {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self.coerce(ValueType::String)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self.coerce(ValueType::Color)? {
            Value::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<Vec<Value>> {
        match self.coerce(ValueType::List)? {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow the string content without conversion
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Equality across variants: equal if either side converts to the
    /// other's type and compares equal
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self.value_type() == other.value_type() {
            return self == other;
        }
        if let Some(t) = self.value_type()
            && other.coerce(t).as_ref() == Some(self)
        {
            return true;
        }
        if let Some(t) = other.value_type()
            && self.coerce(t).as_ref() == Some(other)
        {
            return true;
        }
        false
    }

    /// Numeric ordering when both sides are numbers, string ordering
    /// otherwise; `None` if either side is absent
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_absent() || other.is_absent() {
            return None;
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.as_string()?.cmp(&other.as_string()?)),
        }
    }
}

/// Format a number without a trailing `.0` for integral values
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Color(c) => write!(f, "{}", c),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Absent, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_never_coerces() {
        for t in [ValueType::Any, ValueType::Bool, ValueType::Number, ValueType::String] {
            assert_eq!(Value::Absent.coerce(t), None);
        }
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(Value::from(" 2.5 ").as_number(), Some(2.5));
        assert_eq!(Value::from("wide").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
    }

    #[test]
    fn test_to_bool() {
        assert_eq!(Value::from("no").as_bool(), Some(false));
        assert_eq!(Value::from("yes").as_bool(), Some(true));
        assert_eq!(Value::from("").as_bool(), Some(false));
        assert_eq!(Value::Number(0.0).as_bool(), Some(false));
        assert_eq!(Value::List(vec![]).as_bool(), Some(false));
    }

    #[test]
    fn test_string_to_color() {
        assert_eq!(Value::from("#00ff00").as_color(), Some(Color::rgb(0, 255, 0)));
        assert_eq!(Value::Number(3.0).as_color(), None);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Number(4.0).to_string(), "4");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        let list = Value::List(vec![Value::from("a"), Value::Number(1.0)]);
        assert_eq!(list.to_string(), "a;1");
        assert_eq!(Value::Color(Color::rgb(255, 0, 0)).to_string(), "#ff0000");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Number(3.0).loosely_equals(&Value::from("3")));
        assert!(Value::from("3").loosely_equals(&Value::Number(3.0)));
        assert!(!Value::Number(3.0).loosely_equals(&Value::from("three")));
        assert!(Value::Bool(true).loosely_equals(&Value::Bool(true)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::from("10").compare(&Value::Number(9.0)), Some(Ordering::Greater));
        assert_eq!(Value::from("abc").compare(&Value::from("abd")), Some(Ordering::Less));
        assert_eq!(Value::Absent.compare(&Value::Number(1.0)), None);
    }
}
