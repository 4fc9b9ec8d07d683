//! Style Source
//!
//! Owns the loaded rules and their indexes behind a single-writer lock.
//! Loading parses outside the lock and only swaps the compiled style in
//! under the write lock; every query holds the read lock for exactly one
//! object.

use fos_osm::{OsmGraph, PrimitiveId};
use parking_lot::RwLock;

use crate::cascade::{MultiCascade, ALL_LAYERS};
use crate::config::{StyleConfig, StyleMeta, StyleSettings};
use crate::environment::Environment;
use crate::functions::FunctionRegistry;
use crate::index::{EntryRef, TypedIndexes};
use crate::parser::{parse_stylesheet, Stylesheet};
use crate::rule::Rule;
use crate::value::Value;
use crate::{LoadReport, MapCssError};

/// A selector whose declaration was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    /// Declaration index of the rule
    pub declaration: usize,
    /// Position of the selector within the rule
    pub selector: usize,
}

/// Rules and everything derived from them
#[derive(Debug, Default)]
struct CompiledStyle {
    rules: Vec<Rule>,
    indexes: TypedIndexes,
    settings: StyleSettings,
    meta: StyleMeta,
}

impl CompiledStyle {
    fn compile(mut rules: Vec<Rule>, settings: StyleSettings, meta: StyleMeta) -> Self {
        rules.sort_by_key(|r| r.index());
        let indexes = TypedIndexes::build(&rules);
        Self {
            rules,
            indexes,
            settings,
            meta,
        }
    }

    /// Every selector of every rule, in application order
    fn all_entries(&self) -> Vec<EntryRef> {
        self.rules
            .iter()
            .enumerate()
            .flat_map(|(rule, r)| (0..r.selectors.len()).map(move |selector| EntryRef { rule, selector }))
            .collect()
    }
}

/// A loaded style, shared by any number of concurrent queries
pub struct StyleSource {
    config: StyleConfig,
    functions: FunctionRegistry,
    state: RwLock<CompiledStyle>,
}

impl StyleSource {
    /// Empty style with the built-in functions
    pub fn new(config: StyleConfig) -> Self {
        Self::with_functions(config, FunctionRegistry::new())
    }

    /// Empty style resolving function names against `functions`
    pub fn with_functions(config: StyleConfig, functions: FunctionRegistry) -> Self {
        Self {
            config,
            functions,
            state: RwLock::new(CompiledStyle::default()),
        }
    }

    pub fn config(&self) -> &StyleConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Parse style sheet text and replace the loaded rules
    ///
    /// Rejected rules are reported and skipped, unless the configuration
    /// is strict. Overrides of settings that still exist are kept.
    pub fn load_text(&self, text: &str) -> Result<LoadReport, MapCssError> {
        let Stylesheet {
            rules,
            settings,
            meta,
            mut errors,
        } = parse_stylesheet(text, &self.functions);

        for error in &errors {
            tracing::warn!("{}", error);
        }
        if self.config.strict && !errors.is_empty() {
            return Err(errors.swap_remove(0).error);
        }

        let accepted = rules.len();
        self.install(rules, settings, meta);
        tracing::info!("Loaded style: {} rules, {} rejected", accepted, errors.len());
        Ok(LoadReport {
            accepted,
            rejected: errors,
        })
    }

    /// Replace the loaded rules with already built ones
    pub fn load_rules(&self, rules: Vec<Rule>) {
        let count = rules.len();
        self.install(rules, StyleSettings::new(), StyleMeta::default());
        tracing::info!("Loaded style: {} rules", count);
    }

    fn install(&self, rules: Vec<Rule>, mut settings: StyleSettings, meta: StyleMeta) {
        // Index construction happens before the lock is taken
        let mut compiled = CompiledStyle::compile(rules, StyleSettings::new(), meta);
        let mut state = self.state.write();
        for setting in state.settings.iter() {
            if let Some(value) = &setting.value
                && settings.setting(&setting.name).is_some()
                && let Err(e) = settings.set(&setting.name, value.clone())
            {
                tracing::debug!("Dropping override of {}: {}", setting.name, e);
            }
        }
        compiled.settings = settings;
        *state = compiled;
    }

    /// Override a user setting
    pub fn set_setting(&self, name: &str, value: impl Into<Value>) -> Result<(), MapCssError> {
        self.state.write().settings.set(name, value.into())
    }

    /// Current user settings
    pub fn settings(&self) -> StyleSettings {
        self.state.read().settings.clone()
    }

    pub fn meta(&self) -> StyleMeta {
        self.state.read().meta.clone()
    }

    pub fn rule_count(&self) -> usize {
        self.state.read().rules.len()
    }

    /// Resolve the properties of one object at a scale
    pub fn apply(&self, graph: &dyn OsmGraph, id: PrimitiveId, scale: f64) -> MultiCascade {
        let state = self.state.read();
        let entries: Vec<EntryRef> = state.indexes.for_object(graph, id).candidates(graph.tags(id)).collect();
        self.apply_entries(&state, graph, id, scale, &entries, None)
    }

    /// Like [`apply`](Self::apply), also listing the applied selectors
    pub fn apply_with_trace(&self, graph: &dyn OsmGraph, id: PrimitiveId, scale: f64) -> (MultiCascade, Vec<RuleMatch>) {
        let state = self.state.read();
        let entries: Vec<EntryRef> = state.indexes.for_object(graph, id).candidates(graph.tags(id)).collect();
        let mut trace = Vec::new();
        let cascade = self.apply_entries(&state, graph, id, scale, &entries, Some(&mut trace));
        (cascade, trace)
    }

    /// Apply without the rule index, evaluating every selector
    pub fn full_scan(&self, graph: &dyn OsmGraph, id: PrimitiveId, scale: f64) -> (MultiCascade, Vec<RuleMatch>) {
        let state = self.state.read();
        let entries = state.all_entries();
        let mut trace = Vec::new();
        let cascade = self.apply_entries(&state, graph, id, scale, &entries, Some(&mut trace));
        (cascade, trace)
    }

    /// Resolve many objects on a scoped worker pool
    ///
    /// Results are in the order of `ids`.
    pub fn apply_all(&self, graph: &dyn OsmGraph, ids: &[PrimitiveId], scale: f64) -> Vec<MultiCascade> {
        let mut results = vec![MultiCascade::new(); ids.len()];
        if ids.is_empty() {
            return results;
        }
        let workers = self.config.worker_count();
        if ids.len() <= workers {
            for (id, slot) in ids.iter().zip(results.iter_mut()) {
                *slot = self.apply(graph, *id, scale);
            }
            return results;
        }

        let chunk_size = ids.len().div_ceil(workers);
        tracing::debug!("Applying style to {} objects on {} workers", ids.len(), workers);
        std::thread::scope(|s| {
            for (chunk, out) in ids.chunks(chunk_size).zip(results.chunks_mut(chunk_size)) {
                s.spawn(move || {
                    for (id, slot) in chunk.iter().zip(out.iter_mut()) {
                        *slot = self.apply(graph, *id, scale);
                    }
                });
            }
        });
        results
    }

    fn apply_entries(
        &self,
        state: &CompiledStyle,
        graph: &dyn OsmGraph,
        id: PrimitiveId,
        scale: f64,
        entries: &[EntryRef],
        mut trace: Option<&mut Vec<RuleMatch>>,
    ) -> MultiCascade {
        let default_subpart = self.config.default_subpart.as_str();
        let mut cascade = MultiCascade::new();
        cascade.layer_or_create(default_subpart);

        let base = Environment::new(graph, id)
            .with_scale(scale)
            .with_settings(&state.settings)
            .with_spatial_limit(self.config.max_spatial_candidates);

        for entry in entries {
            let rule = &state.rules[entry.rule];
            let selector = &rule.selectors[entry.selector];
            let subpart = selector.subpart().unwrap_or(default_subpart);

            let link = {
                let env = base.with_cascade(&cascade).with_layer(subpart).with_selector(selector);
                match selector.matches(&env) {
                    Some(matched) => matched.link_state(),
                    None => continue,
                }
            };

            let range = selector.range();
            if !range.contains(scale) {
                cascade.range = cascade.range.reduce_around(scale, &range);
                continue;
            }
            if let Some(valid) = cascade.range.intersect(&range) {
                cascade.range = valid;
            }

            tracing::trace!("{} matches rule {} selector {}", id, rule.index(), entry.selector);
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(RuleMatch {
                    declaration: rule.index(),
                    selector: entry.selector,
                });
            }

            let layers: Vec<String> = if subpart == ALL_LAYERS {
                cascade
                    .layer_names()
                    .filter(|name| *name != ALL_LAYERS)
                    .map(str::to_string)
                    .chain(std::iter::once(ALL_LAYERS.to_string()))
                    .collect()
            } else {
                vec![subpart.to_string()]
            };

            for layer in &layers {
                cascade.layer_or_create(layer);
                for instruction in &rule.declaration.instructions {
                    let value = {
                        let env = base
                            .with_cascade(&cascade)
                            .with_layer(layer)
                            .with_selector(selector)
                            .with_link_state(link);
                        instruction.value.evaluate(&env)
                    };
                    cascade.layer_or_create(layer).put(instruction.key.as_str(), value);
                }
            }
        }
        cascade
    }
}

impl Default for StyleSource {
    fn default() -> Self {
        Self::new(StyleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, KeyMatch, Op};
    use crate::expression::Expression;
    use crate::range::ScaleRange;
    use crate::rule::{Declaration, Instruction};
    use crate::selector::{BaseType, GeneralSelector, Selector};
    use fos_osm::{DataSet, LatLon, TagMap};

    fn assign(index: usize, selector: GeneralSelector, key: &str, value: Value) -> Rule {
        Rule::new(
            vec![Selector::General(selector)],
            Declaration::new(index, vec![Instruction::assign(key, Expression::Literal(value))]),
        )
    }

    fn highway_way() -> (DataSet, PrimitiveId) {
        let mut ds = DataSet::new();
        ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new()).unwrap();
        ds.add_node(2, LatLon::new(0.0, 1.0), TagMap::new()).unwrap();
        let way = ds
            .add_way(10, &[1, 2], TagMap::from_pairs(&[("highway", "motorway")]))
            .unwrap();
        (ds, way)
    }

    #[test]
    fn test_later_rule_overrides() {
        let (ds, way) = highway_way();
        let style = StyleSource::default();
        style.load_rules(vec![
            assign(
                0,
                GeneralSelector::new(BaseType::Way).with_condition(Condition::key("highway", KeyMatch::Exists, false).unwrap()),
                "width",
                Value::Number(2.0),
            ),
            assign(
                1,
                GeneralSelector::new(BaseType::Way)
                    .with_condition(Condition::key_value("highway", "motorway", Op::Eq).unwrap()),
                "width",
                Value::Number(4.0),
            ),
        ]);
        let cascade = style.apply(&ds, way, 1000.0);
        assert_eq!(cascade.get("default", "width"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_absent_value_clears_property() {
        let (ds, way) = highway_way();
        let style = StyleSource::default();
        style.load_rules(vec![
            assign(0, GeneralSelector::new(BaseType::Way), "color", Value::from("red")),
            assign(1, GeneralSelector::new(BaseType::Way), "color", Value::Absent),
        ]);
        let cascade = style.apply(&ds, way, 1000.0);
        assert!(cascade.get("default", "color").is_none());
        assert!(cascade.layer("default").is_some());
    }

    #[test]
    fn test_range_reduced_around_scale() {
        let (ds, way) = highway_way();
        let style = StyleSource::default();
        let range = ScaleRange::new(1000.0, 5000.0).unwrap();
        style.load_rules(vec![assign(
            0,
            GeneralSelector::new(BaseType::Way).with_range(range),
            "width",
            Value::Number(1.0),
        )]);

        let inside = style.apply(&ds, way, 2500.0);
        assert!(inside.get("default", "width").is_some());
        assert_eq!(inside.range, range);

        let below = style.apply(&ds, way, 500.0);
        assert!(below.get("default", "width").is_none());
        assert_eq!(below.range.upper(), 1000.0);

        let above = style.apply(&ds, way, 6000.0);
        assert!(above.get("default", "width").is_none());
        assert_eq!(above.range.lower(), 5000.0);
    }

    #[test]
    fn test_all_layers_subpart() {
        let (ds, way) = highway_way();
        let style = StyleSource::default();
        style.load_rules(vec![
            assign(0, GeneralSelector::new(BaseType::Way).with_subpart("casing"), "width", Value::Number(3.0)),
            assign(1, GeneralSelector::new(BaseType::Way).with_subpart("*"), "opacity", Value::Number(0.5)),
            assign(2, GeneralSelector::new(BaseType::Way).with_subpart("late"), "width", Value::Number(1.0)),
        ]);
        let cascade = style.apply(&ds, way, 1000.0);
        assert_eq!(cascade.get("default", "opacity"), Some(&Value::Number(0.5)));
        assert_eq!(cascade.get("casing", "opacity"), Some(&Value::Number(0.5)));
        // Layers created after the `*` rule are seeded from it
        assert_eq!(cascade.get("late", "opacity"), Some(&Value::Number(0.5)));
        assert_eq!(cascade.get("casing", "width"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_strict_load_fails_on_first_error() {
        let style = StyleSource::new(StyleConfig {
            strict: true,
            ..Default::default()
        });
        let err = style.load_text("node:no_such_class { width: 1; }").unwrap_err();
        assert!(matches!(err, MapCssError::UnknownPseudoClass(_)));

        let lenient = StyleSource::default();
        let report = lenient
            .load_text("node:no_such_class { width: 1; }\nway { width: 2; }")
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 1);
    }

    #[test]
    fn test_setting_override_survives_reload() {
        let style = StyleSource::default();
        let sheet = "setting::hide { type: boolean; label: \"Hide\"; default: false; }";
        style.load_text(sheet).unwrap();
        style.set_setting("hide", true).unwrap();
        style.load_text(sheet).unwrap();
        assert_eq!(style.settings().get("hide"), Some(&Value::Bool(true)));
        assert!(style.set_setting("missing", 1.0).is_err());
    }
}
