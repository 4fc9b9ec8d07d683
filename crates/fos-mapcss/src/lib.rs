//! fOS MapCSS - Rule Matching and Cascade Engine
//!
//! Resolves, for each map object and each rendering sub-layer, the
//! properties that apply at a given display scale. Rules are bucketed by
//! the tags they require so that only plausible candidates are evaluated;
//! matching declarations are applied in declaration order, later ones
//! overriding earlier ones.
//!
//! ```ignore
//! let style = StyleSource::new(StyleConfig::default());
//! style.load_text("way[highway] { width: 2; }")?;
//! let cascade = style.apply(&dataset, PrimitiveId::way(1), 5000.0);
//! ```

pub mod bitset;
pub mod cascade;
pub mod color;
pub mod condition;
pub mod config;
pub mod environment;
pub mod expression;
pub mod functions;
pub mod index;
pub mod interner;
pub mod parser;
pub mod pseudo_class;
pub mod range;
pub mod rule;
pub mod selector;
mod style_source;
pub mod value;

pub use cascade::{Cascade, MultiCascade, ALL_LAYERS};
pub use color::Color;
pub use condition::{Condition, KeyMatch, Op};
pub use config::{Setting, StyleConfig, StyleMeta, StyleSettings};
pub use environment::{Context, Environment, LinkState};
pub use expression::Expression;
pub use functions::{FunctionRegistry, Signature};
pub use index::{EntryRef, ObjectClass, RuleIndex, TypedIndexes};
pub use parser::{parse_stylesheet, Stylesheet};
pub use range::ScaleRange;
pub use rule::{Declaration, Instruction, Rule};
pub use selector::{BaseType, GeneralSelector, LinkKind, LinkSelector, Selector};
pub use style_source::{RuleMatch, StyleSource};
pub use value::{Value, ValueType};

/// MapCSS load error
#[derive(Debug, thiserror::Error)]
pub enum MapCssError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse { line: u32, column: u32, message: String },

    #[error("Unknown pseudo-class: {0}")]
    UnknownPseudoClass(String),

    #[error("Unknown function: {name} with {arity} arguments")]
    UnknownFunction { name: String, arity: usize },

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid regular expression /{pattern}/: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid scale range ({lower}, {upper}]")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("Argument {index} of {function} must be a {expected}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: &'static str,
    },

    #[error("Unknown object type: {0}")]
    UnknownBaseType(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Operator {op} is not supported for {context}")]
    UnsupportedOperator { op: String, context: &'static str },
}

/// A rule rejected while loading
#[derive(Debug, thiserror::Error)]
#[error("Rule at line {line} rejected: {error}")]
pub struct LoadError {
    /// Line where the rule starts
    pub line: u32,
    #[source]
    pub error: MapCssError,
}

/// Outcome of loading a style sheet
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of rules loaded
    pub accepted: usize,
    pub rejected: Vec<LoadError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}
