//! Expression Functions
//!
//! Static registry from function name to typed implementations. Each
//! overload declares its parameter types; arguments are converted with
//! [`Value::coerce`] before the call. Unknown names and arities are
//! rejected while a style is loaded, never while matching.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::color::Color;
use crate::environment::Environment;
use crate::value::{Value, ValueType};
use crate::MapCssError;

/// Built-in implementation
pub type NativeFn = fn(&Environment<'_>, &[Value]) -> Value;

/// Caller-registered implementation
pub type CustomFn = Arc<dyn Fn(&Environment<'_>, &[Value]) -> Value + Send + Sync>;

/// Argument buffer; most calls take at most four arguments
pub type Args = SmallVec<[Value; 4]>;

/// Parameter list of an overload
#[derive(Debug, Clone, PartialEq)]
pub enum Signature {
    /// Exact arity with one type per parameter
    Fixed(Vec<ValueType>),
    /// Any number (at least `min`) of arguments of one type
    Variadic { element: ValueType, min: usize },
}

impl Signature {
    pub fn fixed(params: &[ValueType]) -> Self {
        Signature::Fixed(params.to_vec())
    }

    pub fn variadic(element: ValueType, min: usize) -> Self {
        Signature::Variadic { element, min }
    }

    pub fn accepts(&self, arity: usize) -> bool {
        match self {
            Signature::Fixed(params) => params.len() == arity,
            Signature::Variadic { min, .. } => arity >= *min,
        }
    }

    /// Declared type of the parameter at `index`
    pub fn param_type(&self, index: usize) -> ValueType {
        match self {
            Signature::Fixed(params) => params.get(index).copied().unwrap_or(ValueType::Any),
            Signature::Variadic { element, .. } => *element,
        }
    }
}

#[derive(Clone)]
enum Callable {
    Native(NativeFn),
    Custom(CustomFn),
}

/// One overload of a named function
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    signature: Signature,
    /// Receive absent arguments instead of short-circuiting to absent
    null_tolerant: bool,
    callable: Callable,
}

impl FunctionDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn is_null_tolerant(&self) -> bool {
        self.null_tolerant
    }

    /// Invoke with already converted arguments
    pub fn call(&self, env: &Environment<'_>, args: &[Value]) -> Value {
        match &self.callable {
            Callable::Native(f) => f(env, args),
            Callable::Custom(f) => f(env, args),
        }
    }
}

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("null_tolerant", &self.null_tolerant)
            .finish()
    }
}

/// Name to overloads
#[derive(Clone, Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, Vec<Arc<FunctionDef>>>,
}

impl FunctionRegistry {
    /// Registry without any functions
    pub fn empty() -> Self {
        Self { functions: HashMap::new() }
    }

    /// Registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();
        register_builtins(&mut registry);
        registry
    }

    fn insert(&mut self, def: FunctionDef) {
        self.functions.entry(def.name.clone()).or_default().push(Arc::new(def));
    }

    /// Register a built-in style function
    pub fn native(&mut self, name: &str, signature: Signature, f: NativeFn) {
        self.insert(FunctionDef {
            name: name.to_string(),
            signature,
            null_tolerant: false,
            callable: Callable::Native(f),
        });
    }

    fn native_tolerant(&mut self, name: &str, signature: Signature, f: NativeFn) {
        self.insert(FunctionDef {
            name: name.to_string(),
            signature,
            null_tolerant: true,
            callable: Callable::Native(f),
        });
    }

    /// Register a caller-supplied function
    pub fn register<F>(&mut self, name: &str, signature: Signature, null_tolerant: bool, f: F)
    where
        F: Fn(&Environment<'_>, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.insert(FunctionDef {
            name: name.to_string(),
            signature,
            null_tolerant,
            callable: Callable::Custom(Arc::new(f)),
        });
    }

    /// Resolve an overload; fixed-arity overloads take precedence
    pub fn resolve(&self, name: &str, arity: usize) -> Result<Arc<FunctionDef>, MapCssError> {
        let unknown = || MapCssError::UnknownFunction {
            name: name.to_string(),
            arity,
        };
        let overloads = self.functions.get(name).ok_or_else(unknown)?;
        overloads
            .iter()
            .find(|d| matches!(d.signature, Signature::Fixed(_)) && d.signature.accepts(arity))
            .or_else(|| overloads.iter().find(|d| d.signature.accepts(arity)))
            .cloned()
            .ok_or_else(unknown)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Argument access (arguments are already converted to the declared types)
// ============================================================================

fn num(args: &[Value], i: usize) -> f64 {
    args.get(i).and_then(Value::as_number).unwrap_or(f64::NAN)
}

fn text(args: &[Value], i: usize) -> &str {
    args.get(i).and_then(Value::as_str).unwrap_or("")
}

fn list(args: &[Value], i: usize) -> &[Value] {
    match args.get(i) {
        Some(Value::List(items)) => items,
        _ => &[],
    }
}

fn color(args: &[Value], i: usize) -> Option<Color> {
    args.get(i).and_then(Value::as_color)
}

/// NaN is not a value
fn number(n: f64) -> Value {
    if n.is_nan() { Value::Absent } else { Value::Number(n) }
}

fn strings(values: &[Value]) -> Vec<String> {
    values.iter().filter_map(Value::as_string).collect()
}

fn string_list(items: Vec<String>) -> Value {
    Value::List(items.into_iter().map(Value::String).collect())
}

/// Entries kept before the pattern cache starts over
const PATTERN_CACHE_LIMIT: usize = 256;

/// Compiled patterns keyed by `flags/pattern`; invalid patterns are cached as `None`
static PATTERNS: LazyLock<RwLock<HashMap<String, Option<regex::Regex>>>> = LazyLock::new(Default::default);

fn compile_regex(pattern: &str, flags: &str) -> Option<regex::Regex> {
    let key = format!("{}/{}", flags, pattern);
    if let Some(cached) = PATTERNS.read().get(&key) {
        return cached.clone();
    }
    let compiled = regex::RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .ok();
    let mut cache = PATTERNS.write();
    if cache.len() >= PATTERN_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(key, compiled.clone());
    compiled
}

// ============================================================================
// Built-ins
// ============================================================================

fn register_builtins(r: &mut FunctionRegistry) {
    use ValueType::{Any, Bool, List, Number, String as Str};

    // Arithmetic
    r.native("plus", Signature::variadic(Number, 0), |_, a| number(a.iter().filter_map(Value::as_number).sum()));
    r.native("sum", Signature::variadic(Number, 0), |_, a| number(a.iter().filter_map(Value::as_number).sum()));
    r.native("minus", Signature::variadic(Number, 1), minus);
    r.native("times", Signature::variadic(Number, 0), |_, a| {
        number(a.iter().filter_map(Value::as_number).product())
    });
    r.native("divided_by", Signature::variadic(Number, 1), divided_by);
    r.native("mod", Signature::fixed(&[Number, Number]), |_, a| number(num(a, 0) % num(a, 1)));
    r.native("min", Signature::variadic(Number, 1), |_, a| {
        number(a.iter().filter_map(Value::as_number).fold(f64::INFINITY, f64::min))
    });
    r.native("max", Signature::variadic(Number, 1), |_, a| {
        number(a.iter().filter_map(Value::as_number).fold(f64::NEG_INFINITY, f64::max))
    });

    let unary: [(&str, fn(f64) -> f64); 17] = [
        ("abs", f64::abs),
        ("ceil", f64::ceil),
        ("floor", f64::floor),
        ("round", f64::round),
        ("sqrt", f64::sqrt),
        ("exp", f64::exp),
        ("log", f64::ln),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("sinh", f64::sinh),
        ("cosh", f64::cosh),
        ("tanh", f64::tanh),
        ("signum", signum),
    ];
    for (name, f) in unary {
        r.insert(FunctionDef {
            name: name.to_string(),
            signature: Signature::fixed(&[Number]),
            null_tolerant: false,
            callable: Callable::Custom(Arc::new(move |_: &Environment<'_>, a: &[Value]| number(f(num(a, 0))))),
        });
    }
    r.native("atan2", Signature::fixed(&[Number, Number]), |_, a| number(num(a, 0).atan2(num(a, 1))));
    r.native("pow", Signature::fixed(&[Number, Number]), |_, a| number(num(a, 0).powf(num(a, 1))));
    r.native("cardinal_to_radians", Signature::fixed(&[Str]), |_, a| {
        cardinal_to_radians(text(a, 0)).map_or(Value::Absent, Value::Number)
    });

    // Logic and comparison
    r.native("not", Signature::fixed(&[Bool]), |_, a| Value::Bool(!a[0].as_bool().unwrap_or(false)));
    r.native("boolean", Signature::fixed(&[Bool]), |_, a| a[0].clone());
    r.native("equal", Signature::fixed(&[Any, Any]), |_, a| Value::Bool(a[0].loosely_equals(&a[1])));
    r.native("not_equal", Signature::fixed(&[Any, Any]), |_, a| Value::Bool(!a[0].loosely_equals(&a[1])));
    r.native("greater", Signature::fixed(&[Number, Number]), |_, a| Value::Bool(num(a, 0) > num(a, 1)));
    r.native("greater_equal", Signature::fixed(&[Number, Number]), |_, a| {
        Value::Bool(num(a, 0) >= num(a, 1))
    });
    r.native("less", Signature::fixed(&[Number, Number]), |_, a| Value::Bool(num(a, 0) < num(a, 1)));
    r.native("less_equal", Signature::fixed(&[Number, Number]), |_, a| Value::Bool(num(a, 0) <= num(a, 1)));

    // Strings
    r.native_tolerant("concat", Signature::variadic(Any, 0), |_, a| {
        Value::String(a.iter().filter(|v| !v.is_absent()).map(Value::to_string).collect())
    });
    r.native("join", Signature::variadic(Str, 1), |_, a| Value::String(strings(&a[1..]).join(text(a, 0))));
    r.native("join_list", Signature::fixed(&[Str, List]), |_, a| {
        Value::String(strings(list(a, 1)).join(text(a, 0)))
    });
    r.native("upper", Signature::fixed(&[Str]), |_, a| Value::String(text(a, 0).to_uppercase()));
    r.native("lower", Signature::fixed(&[Str]), |_, a| Value::String(text(a, 0).to_lowercase()));
    r.native("title", Signature::fixed(&[Str]), |_, a| Value::String(title_case(text(a, 0))));
    r.native("trim", Signature::fixed(&[Str]), |_, a| Value::String(text(a, 0).trim().to_string()));
    r.native("length", Signature::fixed(&[Str]), |_, a| Value::Number(text(a, 0).chars().count() as f64));
    r.native("substring", Signature::fixed(&[Str, Number]), |_, a| {
        substring(text(a, 0), num(a, 1), f64::INFINITY)
    });
    r.native("substring", Signature::fixed(&[Str, Number, Number]), |_, a| {
        substring(text(a, 0), num(a, 1), num(a, 2))
    });
    r.native("replace", Signature::fixed(&[Str, Str, Str]), |_, a| {
        Value::String(text(a, 0).replace(text(a, 1), text(a, 2)))
    });
    r.native("tr", Signature::variadic(Str, 1), |_, a| Value::String(format_template(text(a, 0), &a[1..])));
    r.native("starts_with", Signature::fixed(&[Str, Str]), |_, a| {
        Value::Bool(text(a, 0).starts_with(text(a, 1)))
    });
    r.native("ends_with", Signature::fixed(&[Str, Str]), |_, a| Value::Bool(text(a, 0).ends_with(text(a, 1))));
    r.native("contains", Signature::fixed(&[Str, Str]), |_, a| Value::Bool(text(a, 0).contains(text(a, 1))));
    r.native("regexp_test", Signature::fixed(&[Str, Str]), |_, a| regexp_test(text(a, 0), text(a, 1), ""));
    r.native("regexp_test", Signature::fixed(&[Str, Str, Str]), |_, a| {
        regexp_test(text(a, 0), text(a, 1), text(a, 2))
    });
    r.native("regexp_match", Signature::fixed(&[Str, Str]), |_, a| regexp_match(text(a, 0), text(a, 1), ""));
    r.native("regexp_match", Signature::fixed(&[Str, Str, Str]), |_, a| {
        regexp_match(text(a, 0), text(a, 1), text(a, 2))
    });

    // Lists
    r.native("list", Signature::variadic(Any, 0), |_, a| Value::List(a.to_vec()));
    r.native("get", Signature::fixed(&[List, Number]), |_, a| {
        let i = num(a, 1);
        if i.is_nan() || i < 0.0 {
            return Value::Absent;
        }
        list(a, 0).get(i as usize).cloned().unwrap_or_default()
    });
    r.native("count", Signature::fixed(&[List]), |_, a| Value::Number(list(a, 0).len() as f64));
    r.native("split", Signature::fixed(&[Str, Str]), |_, a| {
        string_list(text(a, 1).split(text(a, 0)).map(str::to_string).collect())
    });
    r.native("sort", Signature::variadic(Str, 0), |_, a| {
        let mut items = strings(a);
        items.sort();
        string_list(items)
    });
    r.native("sort_list", Signature::fixed(&[List]), |_, a| {
        let mut items = strings(list(a, 0));
        items.sort();
        string_list(items)
    });
    r.native("uniq", Signature::variadic(Str, 0), |_, a| string_list(uniq(strings(a))));
    r.native("uniq_list", Signature::fixed(&[List]), |_, a| string_list(uniq(strings(list(a, 0)))));
    r.native_tolerant("any", Signature::variadic(Any, 0), |_, a| {
        a.iter().find(|v| !v.is_absent()).cloned().unwrap_or_default()
    });

    // Colors
    r.native("rgb", Signature::fixed(&[Number, Number, Number]), |_, a| {
        Value::Color(Color::from_unit(num(a, 0), num(a, 1), num(a, 2), 1.0))
    });
    r.native("rgba", Signature::fixed(&[Number, Number, Number, Number]), |_, a| {
        Value::Color(Color::from_unit(num(a, 0), num(a, 1), num(a, 2), num(a, 3)))
    });
    r.native("hsb_color", Signature::fixed(&[Number, Number, Number]), |_, a| {
        Value::Color(Color::from_hsb(num(a, 0), num(a, 1), num(a, 2)))
    });
    r.native("html2color", Signature::fixed(&[Str]), |_, a| Color::parse(text(a, 0)).into());
    r.native("color2html", Signature::fixed(&[ValueType::Color]), |_, a| {
        color(a, 0).map(|c| c.to_html()).into()
    });
    r.native("red", Signature::fixed(&[ValueType::Color]), |_, a| color(a, 0).map(|c| c.red()).into());
    r.native("green", Signature::fixed(&[ValueType::Color]), |_, a| color(a, 0).map(|c| c.green()).into());
    r.native("blue", Signature::fixed(&[ValueType::Color]), |_, a| color(a, 0).map(|c| c.blue()).into());
    r.native("alpha", Signature::fixed(&[ValueType::Color]), |_, a| color(a, 0).map(|c| c.alpha()).into());

    // Environment
    r.native("tag", Signature::fixed(&[Str]), |env, a| env.tag(text(a, 0)).into());
    r.native("parent_tag", Signature::fixed(&[Str]), parent_tag);
    r.native("parent_tags", Signature::fixed(&[Str]), parent_tags);
    r.native("child_tag", Signature::fixed(&[Str]), |env, a| {
        env.child.and_then(|c| env.graph.tag(c, text(a, 0))).into()
    });
    r.native("has_tag_key", Signature::fixed(&[Str]), |env, a| {
        Value::Bool(env.graph.has_key(env.osm, text(a, 0)))
    });
    r.native("tag_regex", Signature::fixed(&[Str]), tag_regex);
    r.native("osm_id", Signature::fixed(&[]), |env, _| Value::Number(env.osm.id as f64));
    r.native("osm_type", Signature::fixed(&[]), |env, _| Value::from(env.osm.kind.name()));
    r.native("number_of_tags", Signature::fixed(&[]), |env, _| {
        Value::Number(env.tags().map_or(0, |t| t.len()) as f64)
    });
    r.native("index", Signature::fixed(&[]), |env, _| env.index.map(|i| (i + 1) as f64).into());
    r.native("role", Signature::fixed(&[]), |env, _| env.member_role().into());
    r.native("count_roles", Signature::variadic(Str, 1), |env, a| {
        let roles = strings(a);
        let n = env
            .graph
            .members(env.osm)
            .iter()
            .filter(|m| roles.iter().any(|r| *r == m.role))
            .count();
        Value::Number(n as f64)
    });
    r.native("prop", Signature::fixed(&[Str]), |env, a| {
        env.current_cascade().and_then(|c| c.get(text(a, 0))).cloned().unwrap_or_default()
    });
    r.native("prop", Signature::fixed(&[Str, Str]), |env, a| {
        env.cascade.and_then(|mc| mc.get(text(a, 1), text(a, 0))).cloned().unwrap_or_default()
    });
    r.native("is_prop_set", Signature::fixed(&[Str]), |env, a| {
        Value::Bool(env.current_cascade().is_some_and(|c| c.contains(text(a, 0))))
    });
    r.native("is_prop_set", Signature::fixed(&[Str, Str]), |env, a| {
        Value::Bool(env.cascade.and_then(|mc| mc.get(text(a, 1), text(a, 0))).is_some())
    });
    r.native("setting", Signature::fixed(&[Str]), |env, a| {
        env.settings.and_then(|s| s.get(text(a, 0))).cloned().unwrap_or_default()
    });
    r.native("eval", Signature::fixed(&[Any]), |_, a| a[0].clone());
    r.native_tolerant("print", Signature::fixed(&[Any]), |_, a| {
        tracing::info!(target: "fos_mapcss::print", "{}", display_or_na(&a[0]));
        a[0].clone()
    });
    r.native_tolerant("println", Signature::fixed(&[Any]), |_, a| {
        tracing::info!(target: "fos_mapcss::print", "{}\n", display_or_na(&a[0]));
        a[0].clone()
    });
}

fn display_or_na(v: &Value) -> String {
    if v.is_absent() { "<n/a>".to_string() } else { v.to_string() }
}

fn signum(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() { x } else { x.signum() }
}

fn minus(_: &Environment<'_>, a: &[Value]) -> Value {
    let first = num(a, 0);
    if a.len() == 1 {
        return number(-first);
    }
    number(a[1..].iter().filter_map(Value::as_number).fold(first, |acc, x| acc - x))
}

fn divided_by(_: &Environment<'_>, a: &[Value]) -> Value {
    let first = num(a, 0);
    number(a[1..].iter().filter_map(Value::as_number).fold(first, |acc, x| acc / x))
}

fn cardinal_to_radians(s: &str) -> Option<f64> {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
    ];
    let upper = s.trim().to_uppercase();
    let abbreviation = match upper.as_str() {
        "NORTH" => "N",
        "EAST" => "E",
        "SOUTH" => "S",
        "WEST" => "W",
        other => other,
    };
    let position = POINTS.iter().position(|p| *p == abbreviation)?;
    Some(position as f64 * PI / 8.0)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Character based substring with clamped bounds
fn substring(s: &str, begin: f64, end: f64) -> Value {
    if begin.is_nan() || end.is_nan() {
        return Value::Absent;
    }
    let len = s.chars().count();
    let begin = (begin.max(0.0) as usize).min(len);
    let end = if end.is_infinite() { len } else { (end.max(0.0) as usize).min(len) };
    if begin >= end {
        return Value::String(String::new());
    }
    Value::String(s.chars().skip(begin).take(end - begin).collect())
}

/// Replace `{0}`, `{1}`, ... with the arguments
fn format_template(template: &str, args: &[Value]) -> String {
    let mut out = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{}}}", i), &arg.to_string());
    }
    out
}

fn uniq(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

fn regexp_test(pattern: &str, target: &str, flags: &str) -> Value {
    match compile_regex(&format!("^(?:{})$", pattern), flags) {
        Some(re) => Value::Bool(re.is_match(target)),
        None => Value::Absent,
    }
}

/// Whole-string match; the list holds the full match followed by groups
fn regexp_match(pattern: &str, target: &str, flags: &str) -> Value {
    let Some(re) = compile_regex(&format!("^(?:{})$", pattern), flags) else {
        return Value::Absent;
    };
    let Some(caps) = re.captures(target) else {
        return Value::Absent;
    };
    Value::List(
        caps.iter()
            .map(|m| m.map_or(Value::Absent, |m| Value::from(m.as_str())))
            .collect(),
    )
}

fn parent_tag(env: &Environment<'_>, a: &[Value]) -> Value {
    let key = text(a, 0);
    match env.parent {
        Some(parent) => env.graph.tag(parent, key).into(),
        None => env
            .graph
            .referrers(env.osm)
            .iter()
            .find_map(|r| env.graph.tag(*r, key))
            .into(),
    }
}

fn parent_tags(env: &Environment<'_>, a: &[Value]) -> Value {
    let key = text(a, 0);
    let mut values: Vec<String> = match env.parent {
        Some(parent) => env.graph.tag(parent, key).map(str::to_string).into_iter().collect(),
        None => env
            .graph
            .referrers(env.osm)
            .iter()
            .filter_map(|r| env.graph.tag(*r, key))
            .map(str::to_string)
            .collect(),
    };
    values.sort();
    values.dedup();
    string_list(values)
}

fn tag_regex(env: &Environment<'_>, a: &[Value]) -> Value {
    let Some(re) = compile_regex(text(a, 0), "") else {
        return Value::Absent;
    };
    let Some(tags) = env.tags() else {
        return Value::Absent;
    };
    string_list(
        tags.iter()
            .filter(|(k, _)| re.is_match(k))
            .map(|(_, v)| v.to_string())
            .collect(),
    )
}
