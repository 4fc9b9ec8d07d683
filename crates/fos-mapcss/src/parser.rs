//! MapCSS Parser
//!
//! Recursive descent parser for MapCSS style sheets. A syntax or
//! construction error rejects only the enclosing rule; parsing resumes
//! after the rule's closing brace.
//!
//! ```text
//! way[highway=primary]|z12-::casing { width: 2 + 1; color: #ff8800; }
//! relation[type=route] >[role=stop] node { set .stop; }
//! setting::hide_paths { type: boolean; label: "Hide paths"; default: false; }
//! ```

use fos_osm::{DataSet, PrimitiveId};

use crate::color::Color;
use crate::condition::{Condition, KeyMatch, Op};
use crate::config::{Setting, StyleMeta, StyleSettings};
use crate::environment::Environment;
use crate::expression::Expression;
use crate::functions::FunctionRegistry;
use crate::range::{MAX_ZOOM, ScaleRange};
use crate::rule::{Declaration, Instruction, Rule};
use crate::selector::{BaseType, GeneralSelector, LinkKind, Selector};
use crate::value::{Value, ValueType};
use crate::{LoadError, MapCssError};

type ParseResult<T> = Result<T, MapCssError>;

/// Parsed style sheet
#[derive(Debug, Default)]
pub struct Stylesheet {
    /// Accepted rules, declaration indexes in source order
    pub rules: Vec<Rule>,
    pub settings: StyleSettings,
    pub meta: StyleMeta,
    /// Rejected rules
    pub errors: Vec<LoadError>,
}

/// Parse a style sheet, resolving function names against `functions`
pub fn parse_stylesheet(text: &str, functions: &FunctionRegistry) -> Stylesheet {
    let sheet = MapCssParser::new(text, functions).parse();
    tracing::debug!(
        "Parsed style sheet: {} rules, {} settings, {} errors",
        sheet.rules.len(),
        sheet.settings.len(),
        sheet.errors.len()
    );
    sheet
}

/// Comparison operators, longest first
const OPERATORS: &[(&str, Op)] = &[
    ("=~", Op::Regex),
    ("!~", Op::NRegex),
    ("!=", Op::Neq),
    ("~=", Op::OneOf),
    ("^=", Op::BeginsWith),
    ("$=", Op::EndsWith),
    ("*=", Op::Contains),
    (">=", Op::GreaterOrEqual),
    ("<=", Op::LessOrEqual),
    (">", Op::Greater),
    ("<", Op::Less),
    ("=", Op::Eq),
];

struct MapCssParser<'a> {
    input: &'a str,
    pos: usize,
    functions: &'a FunctionRegistry,
    /// Declaration index of the next accepted rule
    next_index: usize,
}

impl<'a> MapCssParser<'a> {
    fn new(input: &'a str, functions: &'a FunctionRegistry) -> Self {
        Self {
            input,
            pos: 0,
            functions,
            next_index: 0,
        }
    }

    fn parse(mut self) -> Stylesheet {
        let mut sheet = Stylesheet::default();
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            let start = self.pos;
            let line = self.line_col(start).0;
            if let Err(error) = self.parse_block(&mut sheet) {
                self.recover(start);
                sheet.errors.push(LoadError { line, error });
            }
        }
        sheet
    }

    fn parse_block(&mut self, sheet: &mut Stylesheet) -> ParseResult<()> {
        if self.eat_str("setting::") {
            let setting = self.parse_setting()?;
            sheet.settings.declare(setting);
            return Ok(());
        }
        if self.at_keyword("meta") {
            self.expect_str("meta")?;
            self.skip_whitespace();
            self.expect('{')?;
            let env_graph = DataSet::new();
            let env = Environment::new(&env_graph, PrimitiveId::node(0));
            for instruction in self.parse_declarations()? {
                let value = instruction.value.evaluate(&env);
                sheet.meta.properties.insert(instruction.key, value);
            }
            return Ok(());
        }

        let rule = self.parse_rule()?;
        sheet.rules.push(rule);
        Ok(())
    }

    // ========================================================================
    // Rules and selectors
    // ========================================================================

    fn parse_rule(&mut self) -> ParseResult<Rule> {
        let mut selectors = vec![self.parse_selector()?];
        loop {
            self.skip_whitespace();
            if !self.eat(',') {
                break;
            }
            self.skip_whitespace();
            selectors.push(self.parse_selector()?);
        }
        self.skip_whitespace();
        self.expect('{')?;
        let instructions = self.parse_declarations()?;

        let index = self.next_index;
        self.next_index += 1;
        Ok(Rule::new(selectors, Declaration::new(index, instructions)))
    }

    fn parse_selector(&mut self) -> ParseResult<Selector> {
        let mut selector: Selector = self.parse_general()?.into();
        loop {
            self.skip_whitespace();
            let kind = match self.peek() {
                Some('>') => LinkKind::Child,
                Some('<') => LinkKind::Parent,
                Some('+') => LinkKind::Sibling,
                Some('∈') => LinkKind::ElementOf,
                Some('⧉') => LinkKind::Crosses,
                // `parent child` is the same as `parent > child`
                Some(c) if c.is_alphabetic() || c == '*' => {
                    let right = self.parse_general()?;
                    selector = Selector::link(selector, LinkKind::Child, Vec::new(), right);
                    continue;
                }
                _ => break,
            };
            self.advance();
            let link = self.parse_link_conditions()?;
            self.skip_whitespace();
            let right = self.parse_general()?;
            selector = Selector::link(selector, kind, link, right);
        }
        Ok(selector)
    }

    fn parse_general(&mut self) -> ParseResult<GeneralSelector> {
        let base = if self.eat('*') {
            BaseType::Any
        } else {
            let name = self.identifier();
            if name.is_empty() {
                return Err(self.error("Expected object type"));
            }
            BaseType::parse(&name)?
        };

        let mut selector = GeneralSelector::new(base);
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some('|'), _) => selector.range = self.parse_zoom()?,
                (Some('['), _) => {
                    self.advance();
                    selector.conditions.push(self.parse_condition(false)?);
                }
                (Some(':'), Some(':')) => {
                    self.pos += 2;
                    let name = if self.eat('*') { "*".to_string() } else { self.identifier() };
                    if name.is_empty() {
                        return Err(self.error("Expected sub-part name"));
                    }
                    selector.subpart = Some(name);
                }
                (Some(':'), _) => {
                    self.advance();
                    let name = self.identifier();
                    selector.conditions.push(Condition::pseudo_class(&name, false)?);
                }
                (Some('!'), Some(':')) => {
                    self.pos += 2;
                    let name = self.identifier();
                    selector.conditions.push(Condition::pseudo_class(&name, true)?);
                }
                (Some('.'), _) => {
                    self.advance();
                    let name = self.identifier();
                    selector.conditions.push(Condition::class(name, false));
                }
                (Some('!'), Some('.')) => {
                    self.pos += 2;
                    let name = self.identifier();
                    selector.conditions.push(Condition::class(name, true));
                }
                _ => break,
            }
        }
        Ok(selector)
    }

    /// Conditions directly after a link combinator
    fn parse_link_conditions(&mut self) -> ParseResult<Vec<Condition>> {
        let mut conditions = Vec::new();
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some('['), _) => {
                    self.advance();
                    conditions.push(self.parse_condition(true)?);
                }
                (Some(':'), _) => {
                    self.advance();
                    let name = self.identifier();
                    conditions.push(Condition::pseudo_class(&name, false)?);
                }
                (Some('!'), Some(':')) => {
                    self.pos += 2;
                    let name = self.identifier();
                    conditions.push(Condition::pseudo_class(&name, true)?);
                }
                _ => break,
            }
        }
        Ok(conditions)
    }

    /// `|zN`, `|zN-`, `|z-M`, `|zN-M`
    fn parse_zoom(&mut self) -> ParseResult<ScaleRange> {
        self.expect('|')?;
        self.expect('z')?;
        let min = self.zoom_level()?;
        let max = if self.eat('-') { self.zoom_level()? } else { min };
        if min.is_none() && max.is_none() {
            return Err(self.error("Expected zoom level"));
        }
        ScaleRange::from_zoom(min, max)
    }

    fn zoom_level(&mut self) -> ParseResult<Option<u32>> {
        let start = self.pos;
        let level = self.integer()?;
        if level.is_some_and(|z| z > MAX_ZOOM) {
            self.pos = start;
            return Err(self.error(&format!("Zoom level above {}", MAX_ZOOM)));
        }
        Ok(level)
    }

    /// Condition inside `[...]`, after the opening bracket
    fn parse_condition(&mut self, link: bool) -> ParseResult<Condition> {
        self.skip_whitespace();

        if self.at_function_call() {
            let expr = self.parse_expression()?;
            self.skip_whitespace();
            self.expect(']')?;
            return Ok(Condition::expression(expr));
        }

        let negate = self.eat('!');
        self.skip_whitespace();

        if self.peek() == Some('/') {
            let key = self.regex_literal()?;
            self.skip_whitespace();
            let op = if self.eat_str("=~") {
                Some(Op::Regex)
            } else if self.eat_str("!~") {
                Some(Op::NRegex)
            } else {
                None
            };
            let condition = match op {
                Some(op) => {
                    self.skip_whitespace();
                    let value = if self.peek() == Some('/') { self.regex_literal()? } else { self.value_token()? };
                    Condition::regex_key_value(&key, &value, op)?
                }
                None => Condition::key(key, KeyMatch::Regex, negate)?,
            };
            self.skip_whitespace();
            self.expect(']')?;
            return Ok(condition);
        }

        let key = self.key_token()?;
        self.skip_whitespace();
        if self.eat(']') {
            return Condition::key(key, KeyMatch::Exists, negate);
        }
        if self.eat('?') {
            let kind = if self.eat('!') { KeyMatch::False } else { KeyMatch::True };
            self.skip_whitespace();
            self.expect(']')?;
            return Condition::key(key, kind, negate);
        }
        if negate {
            return Err(self.error("Negation is only allowed for key conditions"));
        }

        let op = self.operator()?;
        self.skip_whitespace();
        let condition = if op.is_regex() && self.peek() == Some('/') {
            let value = self.regex_literal()?;
            self.key_condition(link, key, value, op)?
        } else if self.peek() == Some('*') && !matches!(self.peek_nth(1), Some(']') | None) {
            self.advance();
            let other = self.key_token()?;
            Condition::key_value_indirect(key, other, op)?
        } else {
            let value = self.value_token()?;
            self.key_condition(link, key, value, op)?
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(condition)
    }

    /// `role` and `index` refer to the link inside link conditions
    fn key_condition(&self, link: bool, key: String, value: String, op: Op) -> ParseResult<Condition> {
        match key.as_str() {
            "role" if link => Condition::role(op, value),
            "index" if link => Condition::index(op, &value),
            _ => Condition::key_value(key, value, op),
        }
    }

    fn operator(&mut self) -> ParseResult<Op> {
        for (symbol, op) in OPERATORS {
            if self.eat_str(symbol) {
                return Ok(*op);
            }
        }
        Err(self.error("Expected comparison operator"))
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Declarations up to and including the closing brace
    fn parse_declarations(&mut self) -> ParseResult<Vec<Instruction>> {
        let mut instructions = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                break;
            }
            if self.at_end() {
                return Err(self.error("Unclosed declaration block"));
            }
            if self.eat(';') {
                continue;
            }

            if self.at_keyword("set") {
                self.expect_str("set")?;
                self.parse_set(&mut instructions)?;
            } else {
                let key = self.identifier();
                if key.is_empty() {
                    return Err(self.error("Expected property name"));
                }
                self.skip_whitespace();
                self.expect(':')?;
                self.skip_whitespace();
                let value = self.parse_value()?;
                instructions.push(Instruction::assign(key, value));
            }

            self.skip_whitespace();
            if !self.eat(';') && self.peek() != Some('}') {
                return Err(self.error("Expected ';'"));
            }
        }
        Ok(instructions)
    }

    /// `set .a, .b;` or `set key = expr;`
    fn parse_set(&mut self, instructions: &mut Vec<Instruction>) -> ParseResult<()> {
        loop {
            self.skip_whitespace();
            self.eat('.');
            let key = self.identifier();
            if key.is_empty() {
                return Err(self.error("Expected class name"));
            }
            self.skip_whitespace();
            if self.eat('=') {
                self.skip_whitespace();
                let value = self.parse_expression()?;
                instructions.push(Instruction {
                    key,
                    value,
                    is_set: true,
                });
            } else {
                instructions.push(Instruction::set_class(key));
            }
            self.skip_whitespace();
            if !self.eat(',') {
                return Ok(());
            }
        }
    }

    /// Expression, or a comma list of expressions
    fn parse_value(&mut self) -> ParseResult<Expression> {
        let first = self.parse_expression()?;
        self.skip_whitespace();
        if self.peek() != Some(',') {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(',') {
            self.skip_whitespace();
            items.push(self.parse_expression()?);
            self.skip_whitespace();
        }
        Expression::call(self.functions, "list", items)
    }

    fn parse_setting(&mut self) -> ParseResult<Setting> {
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error("Expected setting name"));
        }
        self.skip_whitespace();
        self.expect('{')?;
        let instructions = self.parse_declarations()?;

        let env_graph = DataSet::new();
        let env = Environment::new(&env_graph, PrimitiveId::node(0));
        let property = |key: &str| {
            instructions
                .iter()
                .find(|i| i.key == key)
                .map(|i| i.value.evaluate(&env))
                .unwrap_or_default()
        };

        let kind = match property("type").as_string().as_deref() {
            Some("boolean") => ValueType::Bool,
            Some("double") => ValueType::Number,
            Some("string") => ValueType::String,
            Some("color") => ValueType::Color,
            other => {
                return Err(self.error(&format!(
                    "Unknown type {:?} for setting {}",
                    other.unwrap_or_default(),
                    name
                )));
            }
        };
        let default = property("default").coerce(kind).ok_or_else(|| MapCssError::ArgumentType {
            function: format!("setting::{}", name),
            index: 0,
            expected: kind.name(),
        })?;
        let label = property("label").as_string().unwrap_or_else(|| name.clone());

        Ok(Setting {
            name,
            label,
            kind,
            default,
            value: None,
        })
    }

    // ========================================================================
    // Expressions, lowest precedence first
    // ========================================================================

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let test = self.parse_or()?;
        self.skip_whitespace();
        if !self.eat('?') {
            return Ok(test);
        }
        let then = self.parse_expression()?;
        self.skip_whitespace();
        self.expect(':')?;
        let otherwise = self.parse_expression()?;
        Expression::call(self.functions, "cond", vec![test, then, otherwise])
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if !self.eat_str("||") {
                return Ok(left);
            }
            let right = self.parse_and()?;
            left = self.binary("or", left, right)?;
        }
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_equality()?;
        loop {
            self.skip_whitespace();
            if !self.eat_str("&&") {
                return Ok(left);
            }
            let right = self.parse_equality()?;
            left = self.binary("and", left, right)?;
        }
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison()?;
        loop {
            self.skip_whitespace();
            let name = if self.eat_str("==") {
                "equal"
            } else if self.eat_str("!=") {
                "not_equal"
            } else {
                return Ok(left);
            };
            let right = self.parse_comparison()?;
            left = self.binary(name, left, right)?;
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive()?;
        loop {
            self.skip_whitespace();
            let name = if self.eat_str("<=") {
                "less_equal"
            } else if self.eat_str(">=") {
                "greater_equal"
            } else if self.eat('<') {
                "less"
            } else if self.eat('>') {
                "greater"
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = self.binary(name, left, right)?;
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_whitespace();
            let name = if self.eat('+') {
                "plus"
            } else if self.eat('-') {
                "minus"
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = self.binary(name, left, right)?;
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let name = if self.eat('*') {
                "times"
            } else if self.eat('/') {
                "divided_by"
            } else if self.eat('%') {
                "mod"
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = self.binary(name, left, right)?;
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        self.skip_whitespace();
        match (self.peek(), self.peek_nth(1)) {
            (Some('!'), next) if next != Some('=') => {
                self.advance();
                let operand = self.parse_unary()?;
                Expression::call(self.functions, "not", vec![operand])
            }
            (Some('-'), Some(c)) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            (Some('-'), _) => {
                self.advance();
                let operand = self.parse_unary()?;
                Expression::call(self.functions, "minus", vec![operand])
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.peek() {
            Some('(') => {
                self.advance();
                let inner = self.parse_expression()?;
                self.skip_whitespace();
                self.expect(')')?;
                Ok(inner)
            }
            Some('"' | '\'') => Ok(Expression::string(&self.string_literal()?)),
            Some('#') => {
                let start = self.pos;
                self.advance();
                while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                    self.advance();
                }
                let text = &self.input[start..self.pos];
                Color::parse(text)
                    .map(Expression::literal)
                    .ok_or_else(|| self.error(&format!("Invalid color {}", text)))
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let name = self.identifier();
                self.skip_whitespace();
                if !self.eat('(') {
                    return Ok(match name.as_str() {
                        "true" => Expression::literal(true),
                        "false" => Expression::literal(false),
                        _ => Expression::literal(name),
                    });
                }
                let mut args = Vec::new();
                self.skip_whitespace();
                if !self.eat(')') {
                    loop {
                        args.push(self.parse_expression()?);
                        self.skip_whitespace();
                        if self.eat(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Expression::call(self.functions, &name, args)
            }
            Some(c) => Err(self.error(&format!("Unexpected character '{}'", c))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn parse_number(&mut self) -> ParseResult<Expression> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Expression::literal)
            .map_err(|_| MapCssError::InvalidNumber(text.to_string()))
    }

    fn binary(&self, name: &str, left: Expression, right: Expression) -> ParseResult<Expression> {
        Expression::call(self.functions, name, vec![left, right])
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Letters, digits, `_` and inner `-`
    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let inner_dash = c == '-'
                && self.pos > start
                && self.peek_nth(1).is_some_and(|n| n.is_alphanumeric() || n == '_');
            if c.is_alphanumeric() || c == '_' || inner_dash {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn integer(&mut self) -> ParseResult<Option<u32>> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        if text.is_empty() {
            return Ok(None);
        }
        text.parse()
            .map(Some)
            .map_err(|_| MapCssError::InvalidNumber(text.to_string()))
    }

    /// Tag key, quoted or bare
    fn key_token(&mut self) -> ParseResult<String> {
        if matches!(self.peek(), Some('"' | '\'')) {
            return self.string_literal();
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || "=!~^$*<>?]".contains(c) {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            return Err(self.error("Expected tag key"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Condition value, quoted or bare up to `]`
    fn value_token(&mut self) -> ParseResult<String> {
        if matches!(self.peek(), Some('"' | '\'')) {
            return self.string_literal();
        }
        let start = self.pos;
        while self.peek().is_some_and(|c| c != ']') {
            self.advance();
        }
        Ok(self.input[start..self.pos].trim().to_string())
    }

    fn string_literal(&mut self) -> ParseResult<String> {
        let Some(quote) = self.advance() else {
            return Err(self.error("Expected string"));
        };
        let mut out = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(self.error("Unterminated string"))
    }

    /// `/pattern/`; `\/` stands for a slash
    fn regex_literal(&mut self) -> ParseResult<String> {
        self.expect('/')?;
        let mut out = String::new();
        loop {
            match self.advance() {
                Some('/') => return Ok(out),
                Some('\\') if self.peek() == Some('/') => {
                    self.advance();
                    out.push('/');
                }
                Some(c) => out.push(c),
                None => return Err(self.error("Unterminated regular expression")),
            }
        }
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.input[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> ParseResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{}'", expected)))
        }
    }

    fn expect_str(&mut self, expected: &str) -> ParseResult<()> {
        if self.eat_str(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{}'", expected)))
        }
    }

    /// `word` followed by something that cannot continue an identifier
    fn at_keyword(&self, word: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.starts_with(word)
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':')
    }

    /// Identifier directly followed by `(`
    fn at_function_call(&self) -> bool {
        let rest = &self.input[self.pos..];
        let name_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        name_len > 0
            && rest.chars().next().is_some_and(char::is_alphabetic)
            && rest[name_len..].starts_with('(')
    }

    fn skip_whitespace(&mut self) {
        loop {
            let rest = &self.input[self.pos..];
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("/*") {
                self.pos += trimmed.find("*/").map_or(trimmed.len(), |end| end + 2);
            } else if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                return;
            }
        }
    }

    /// Skip past the closing brace of the block starting at `start`
    fn recover(&mut self, start: usize) {
        self.pos = start;
        let mut depth = 0i32;
        while let Some(c) = self.advance() {
            match c {
                '"' | '\'' => {
                    while let Some(inner) = self.advance() {
                        if inner == '\\' {
                            self.advance();
                        } else if inner == c {
                            break;
                        }
                    }
                }
                '/' if self.peek() == Some('*') => {
                    self.pos += self.input[self.pos..].find("*/").map_or(self.input.len() - self.pos, |end| end + 2);
                }
                '/' if self.peek() == Some('/') => {
                    self.pos += self.input[self.pos..].find('\n').unwrap_or(self.input.len() - self.pos);
                }
                // Regex literals only occur in selectors
                '/' if depth == 0 => {
                    while let Some(inner) = self.advance() {
                        if inner == '\\' {
                            self.advance();
                        } else if inner == '/' || inner == '\n' {
                            break;
                        }
                    }
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// 1-based line and column of a byte offset
    fn line_col(&self, pos: usize) -> (u32, u32) {
        let before = &self.input[..pos];
        let line = before.matches('\n').count() as u32 + 1;
        let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) as u32 + 1;
        (line, column)
    }

    fn error(&self, message: &str) -> MapCssError {
        let (line, column) = self.line_col(self.pos);
        MapCssError::Parse {
            line,
            column,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Stylesheet {
        parse_stylesheet(text, &FunctionRegistry::new())
    }

    #[test]
    fn test_general_selector() {
        let sheet = parse("way[highway=primary][!oneway]:closed.major|z12-::casing { width: 2; }");
        assert!(sheet.errors.is_empty(), "{:?}", sheet.errors);
        let sel = sheet.rules[0].selectors[0].anchor();
        assert_eq!(sel.base, BaseType::Way);
        assert_eq!(sel.conditions.len(), 4);
        assert_eq!(sel.subpart.as_deref(), Some("casing"));
        assert_eq!(sel.range.upper(), crate::range::level_to_scale(12));
        assert_eq!(sel.range.lower(), 0.0);
    }

    #[test]
    fn test_selector_groups_and_indexes() {
        let sheet = parse("node, area[building] { color: red; }\n/* comment */\nway { width: 1 }");
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selectors.len(), 2);
        assert_eq!(sheet.rules[0].index(), 0);
        assert_eq!(sheet.rules[1].index(), 1);
    }

    #[test]
    fn test_link_selectors() {
        let sheet = parse(
            "relation[type=route] >[role=stop] node { color: red; }\n\
             node[amenity] ∈ area[leisure=park] { a: 1; }\n\
             way ⧉ way { b: 1; }\n\
             way node { c: 1; }",
        );
        assert!(sheet.errors.is_empty(), "{:?}", sheet.errors);
        match &sheet.rules[0].selectors[0] {
            Selector::Link(link) => {
                assert_eq!(link.kind, LinkKind::Child);
                assert!(matches!(link.link[0], Condition::Role { .. }));
                assert_eq!(link.right.base, BaseType::Node);
            }
            other => panic!("expected link selector, got {:?}", other),
        }
        for rule in &sheet.rules[1..] {
            assert!(matches!(rule.selectors[0], Selector::Link(_)));
        }
    }

    #[test]
    fn test_condition_forms() {
        let sheet = parse(
            "node[name=~/^Main/][ref!=*name][lanes>=2][oneway?][bridge?!][/^addr:/][\"my key\"=\"a b\"][cuisine~=pizza][is_prop_set(\"x\")] {}",
        );
        assert!(sheet.errors.is_empty(), "{:?}", sheet.errors);
        let conditions = &sheet.rules[0].selectors[0].anchor().conditions;
        assert_eq!(conditions.len(), 9);
        assert!(matches!(conditions[1], Condition::KeyValue { value_is_key: true, .. }));
        assert!(matches!(conditions[3], Condition::KeyPresence { kind: KeyMatch::True, .. }));
        assert!(matches!(conditions[5], Condition::KeyPresence { kind: KeyMatch::Regex, .. }));
        assert!(matches!(conditions[8], Condition::Expression(_)));
    }

    #[test]
    fn test_declarations() {
        let sheet = parse(
            "way { width: 2 * 2; color: #ff0000; dashes: 5, 3; set .minor; set label = tag(\"name\"); text: \"{0.value}\"; }",
        );
        assert!(sheet.errors.is_empty(), "{:?}", sheet.errors);
        let instructions = &sheet.rules[0].declaration.instructions;
        assert_eq!(instructions.len(), 6);
        assert_eq!(instructions[0].key, "width");
        assert_eq!(
            instructions[1].value.as_literal(),
            Some(&Value::Color(Color::rgb(255, 0, 0)))
        );
        assert!(instructions[3].is_set);
        assert_eq!(instructions[3].key, "minor");
        assert!(matches!(instructions[5].value, Expression::Template(_)));
    }

    #[test]
    fn test_error_recovery_rejects_only_one_rule() {
        let sheet = parse("node:unknown { a: 1; }\nway[lanes>wide] { b: 2; }\nway { c: nosuchfn(1); }\nnode { ok: 1; }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.errors.len(), 3);
        assert_eq!(sheet.errors[0].line, 1);
        assert!(matches!(sheet.errors[1].error, MapCssError::InvalidNumber(_)));
        assert!(matches!(sheet.errors[2].error, MapCssError::UnknownFunction { .. }));
        assert_eq!(sheet.rules[0].index(), 0);
    }

    #[test]
    fn test_out_of_range_zoom_rejects_rule() {
        let sheet = parse("node|z4294967295 { a: 1; }\nnode|z12-99 { a: 1; }\nnode { b: 2; }");
        assert_eq!(sheet.errors.len(), 2);
        assert_eq!(sheet.errors[0].line, 1);
        assert_eq!(sheet.errors[1].line, 2);
        assert!(matches!(sheet.errors[1].error, MapCssError::Parse { .. }));
        assert_eq!(sheet.rules.len(), 1);
        assert!(parse("node|z30 { a: 1; }").errors.is_empty());
    }

    #[test]
    fn test_recovery_skips_braces_in_regex_and_comments() {
        let sheet = parse(
            "way[name=~/a{2}/]:bogus { a: 1; }\n\
             /* } */ way[ref=~/^[0-9]{1,3}$/]:nope { b: 2; }\n\
             way { c: 3; }",
        );
        assert_eq!(sheet.errors.len(), 2, "{:?}", sheet.errors);
        assert!(matches!(sheet.errors[0].error, MapCssError::UnknownPseudoClass(_)));
        assert!(matches!(sheet.errors[1].error, MapCssError::UnknownPseudoClass(_)));
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn test_syntax_error_position() {
        let sheet = parse("node {\n  width 2;\n}");
        match &sheet.errors[0].error {
            MapCssError::Parse { line, .. } => assert_eq!(*line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_and_meta() {
        let sheet = parse(
            "meta { title: \"Test style\"; version: \"1.0\"; }\n\
             setting::hide_paths { type: boolean; label: tr(\"Hide paths\"); default: false; }",
        );
        assert!(sheet.errors.is_empty(), "{:?}", sheet.errors);
        assert_eq!(sheet.meta.title().as_deref(), Some("Test style"));
        let setting = sheet.settings.setting("hide_paths").unwrap();
        assert_eq!(setting.kind, ValueType::Bool);
        assert_eq!(setting.default, Value::Bool(false));
        assert_eq!(setting.label, "Hide paths");
    }

    #[test]
    fn test_operator_precedence() {
        let sheet = parse("node { a: 1 + 2 * 3; b: 1 < 2 && !(2 > 3) ? 10 : 20; }");
        let ds = DataSet::new();
        let env = Environment::new(&ds, PrimitiveId::node(1));
        let values: Vec<Value> = sheet.rules[0]
            .declaration
            .instructions
            .iter()
            .map(|i| i.value.evaluate(&env))
            .collect();
        assert_eq!(values, vec![Value::Number(7.0), Value::Number(10.0)]);
    }
}
