//! Rules and Declarations

use std::sync::Arc;

use crate::expression::Expression;
use crate::selector::Selector;
use crate::value::Value;

/// One property assignment
#[derive(Debug, Clone)]
pub struct Instruction {
    pub key: String,
    pub value: Expression,
    /// Written with `set` (`set .class;` or `set key = expr;`)
    pub is_set: bool,
}

impl Instruction {
    /// `key: value;`
    pub fn assign(key: impl Into<String>, value: Expression) -> Self {
        Self {
            key: key.into(),
            value,
            is_set: false,
        }
    }

    /// `set .class;`
    pub fn set_class(class: impl Into<String>) -> Self {
        Self {
            key: class.into(),
            value: Expression::Literal(Value::Bool(true)),
            is_set: true,
        }
    }
}

/// Ordered instruction list with its global declaration index
#[derive(Debug, Clone)]
pub struct Declaration {
    pub instructions: Vec<Instruction>,
    /// Position in load order; higher wins
    pub index: usize,
}

impl Declaration {
    pub fn new(index: usize, instructions: Vec<Instruction>) -> Self {
        Self { instructions, index }
    }
}

/// Selectors sharing one declaration
#[derive(Debug, Clone)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declaration: Arc<Declaration>,
}

impl Rule {
    pub fn new(selectors: Vec<Selector>, declaration: Declaration) -> Self {
        Self {
            selectors,
            declaration: Arc::new(declaration),
        }
    }

    pub fn index(&self) -> usize {
        self.declaration.index
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index()
    }
}

impl Eq for Rule {}

impl PartialOrd for Rule {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rule {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index().cmp(&other.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{BaseType, GeneralSelector};

    #[test]
    fn test_rules_order_by_declaration_index() {
        let sel = || vec![Selector::General(GeneralSelector::new(BaseType::Any))];
        let mut rules = vec![
            Rule::new(sel(), Declaration::new(2, vec![])),
            Rule::new(sel(), Declaration::new(0, vec![Instruction::set_class("major")])),
        ];
        rules.sort();
        assert_eq!(rules[0].index(), 0);
        assert!(rules[0].declaration.instructions[0].is_set);
    }
}
