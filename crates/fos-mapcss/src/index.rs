//! Rule Index
//!
//! Buckets selector entries by the tag their anchor requires so that a
//! query only looks at entries that can possibly match. A query returns a
//! superset of the matching entries in declaration order; callers still
//! evaluate every candidate.

use fos_osm::{OsmGraph, PrimitiveId, TagMap};

use crate::bitset::RuleBitSet;
use crate::condition::RequiredTag;
use crate::interner::{Symbol, SymbolTable};
use crate::rule::Rule;
use crate::selector::BaseType;

/// One selector of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    /// Position in the rule list
    pub rule: usize,
    /// Position in the rule's selector list
    pub selector: usize,
}

/// Entries registered under one key
#[derive(Debug, Clone, Default)]
struct KeyBucket {
    /// Entries that need the key with any value
    general: RuleBitSet,
    /// Entries that need a specific value, plus all general entries;
    /// sorted by value symbol
    per_value: Vec<(Symbol, RuleBitSet)>,
}

impl KeyBucket {
    fn value(&self, value: Symbol) -> Option<&RuleBitSet> {
        self.per_value
            .binary_search_by_key(&value, |(v, _)| *v)
            .ok()
            .map(|i| &self.per_value[i].1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    entries: Vec<EntryRef>,
    /// Entries without a required tag, candidates for every object
    remaining: RuleBitSet,
    symbols: SymbolTable,
    /// Buckets by key symbol; value symbols leave gaps
    per_key: Vec<Option<KeyBucket>>,
}

impl RuleIndex {
    /// Index every selector of `rules` whose anchor base type passes
    /// `accept`. Rules must be sorted by declaration index.
    pub fn build(rules: &[Rule], accept: impl Fn(BaseType) -> bool) -> Self {
        let mut index = Self::default();
        for (rule_pos, rule) in rules.iter().enumerate() {
            for (sel_pos, selector) in rule.selectors.iter().enumerate() {
                let anchor = selector.anchor();
                if !accept(anchor.base) {
                    continue;
                }
                let pos = index.entries.len();
                index.entries.push(EntryRef {
                    rule: rule_pos,
                    selector: sel_pos,
                });

                let required = anchor
                    .conditions
                    .iter()
                    .filter_map(|c| c.required_tag())
                    .find(|r| matches!(r, RequiredTag::Exact(..)))
                    .or_else(|| anchor.conditions.iter().find_map(|c| c.required_tag()));

                match required {
                    Some(RequiredTag::Exact(key, value)) => index.add_for_value(pos, key, value),
                    Some(RequiredTag::Key(key)) => index.add_for_key(pos, key),
                    None => index.remaining.insert(pos),
                }
            }
        }
        tracing::debug!(
            "Rule index: {} entries, {} keys, {} unconditional",
            index.entries.len(),
            index.per_key.iter().flatten().count(),
            index.remaining.count()
        );
        index
    }

    fn bucket_mut(&mut self, key: Symbol) -> &mut KeyBucket {
        let slot = key.0 as usize;
        if self.per_key.len() <= slot {
            self.per_key.resize_with(slot + 1, || None);
        }
        self.per_key[slot].get_or_insert_with(KeyBucket::default)
    }

    fn add_for_key(&mut self, pos: usize, key: &str) {
        let key = self.symbols.intern(key);
        let bucket = self.bucket_mut(key);
        bucket.general.insert(pos);
        for (_, set) in &mut bucket.per_value {
            set.insert(pos);
        }
    }

    fn add_for_value(&mut self, pos: usize, key: &str, value: &str) {
        let key = self.symbols.intern(key);
        let value = self.symbols.intern(value);
        let bucket = self.bucket_mut(key);
        let at = match bucket.per_value.binary_search_by_key(&value, |(v, _)| *v) {
            Ok(at) => at,
            Err(at) => {
                let general = bucket.general.clone();
                bucket.per_value.insert(at, (value, general));
                at
            }
        };
        bucket.per_value[at].1.insert(pos);
    }

    fn bucket(&self, key: &str) -> Option<&KeyBucket> {
        let key = self.symbols.lookup(key)?;
        self.per_key.get(key.0 as usize)?.as_ref()
    }

    /// Candidate positions for an object with these tags
    pub fn candidate_set(&self, tags: Option<&TagMap>) -> RuleBitSet {
        let mut set = self.remaining.clone();
        for (k, v) in tags.into_iter().flat_map(|t| t.iter()) {
            let Some(bucket) = self.bucket(k) else {
                continue;
            };
            match self.symbols.lookup(v).and_then(|v| bucket.value(v)) {
                Some(values) => set.union_with(values),
                None => set.union_with(&bucket.general),
            }
        }
        set
    }

    /// Candidate entries in declaration order
    pub fn candidates(&self, tags: Option<&TagMap>) -> impl Iterator<Item = EntryRef> + '_ {
        let set = self.candidate_set(tags);
        set.iter().map(|pos| self.entries[pos]).collect::<Vec<_>>().into_iter()
    }

    /// All entries in declaration order
    pub fn entries(&self) -> &[EntryRef] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Object classes with their own index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Node,
    AreaWay,
    LineWay,
    Multipolygon,
    Relation,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 5] = [
        ObjectClass::Node,
        ObjectClass::AreaWay,
        ObjectClass::LineWay,
        ObjectClass::Multipolygon,
        ObjectClass::Relation,
    ];

    pub fn of(graph: &dyn OsmGraph, id: PrimitiveId) -> Self {
        match (id.is_node(), id.is_way(), graph.is_area(id)) {
            (true, _, _) => ObjectClass::Node,
            (_, true, true) => ObjectClass::AreaWay,
            (_, true, false) => ObjectClass::LineWay,
            (_, false, true) => ObjectClass::Multipolygon,
            (_, false, false) => ObjectClass::Relation,
        }
    }

    /// Whether a selector with this base type can match objects of the class
    pub fn accepts(&self, base: BaseType) -> bool {
        match base {
            BaseType::Any => true,
            BaseType::Node => *self == ObjectClass::Node,
            BaseType::Way => matches!(self, ObjectClass::AreaWay | ObjectClass::LineWay),
            BaseType::Relation => matches!(self, ObjectClass::Multipolygon | ObjectClass::Relation),
            BaseType::Area => matches!(self, ObjectClass::AreaWay | ObjectClass::Multipolygon),
        }
    }

    fn position(&self) -> usize {
        match self {
            ObjectClass::Node => 0,
            ObjectClass::AreaWay => 1,
            ObjectClass::LineWay => 2,
            ObjectClass::Multipolygon => 3,
            ObjectClass::Relation => 4,
        }
    }
}

/// One rule index per object class
#[derive(Debug, Clone, Default)]
pub struct TypedIndexes {
    indexes: [RuleIndex; 5],
}

impl TypedIndexes {
    pub fn build(rules: &[Rule]) -> Self {
        Self {
            indexes: ObjectClass::ALL.map(|class| RuleIndex::build(rules, |base| class.accepts(base))),
        }
    }

    pub fn get(&self, class: ObjectClass) -> &RuleIndex {
        &self.indexes[class.position()]
    }

    /// Index matching the object's class
    pub fn for_object(&self, graph: &dyn OsmGraph, id: PrimitiveId) -> &RuleIndex {
        self.get(ObjectClass::of(graph, id))
    }
}
