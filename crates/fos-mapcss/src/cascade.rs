//! Cascade
//!
//! Resolved property values per sub-layer. Later writes to the same
//! (sub-layer, key) overwrite earlier ones; insertion order of keys is kept.

use indexmap::IndexMap;

use crate::range::ScaleRange;
use crate::value::Value;

/// Layer name whose declarations apply to every layer
pub const ALL_LAYERS: &str = "*";

/// Property table of one sub-layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cascade {
    props: IndexMap<String, Value>,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Set a property; an absent value removes the key instead
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_absent() {
            self.props.shift_remove(&key);
        } else {
            self.props.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.props.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

/// Cascades of all sub-layers of one object, plus the scale range in
/// which this resolution stays valid
#[derive(Debug, Clone, PartialEq)]
pub struct MultiCascade {
    layers: IndexMap<String, Cascade>,
    /// Valid scale range of the resolution
    pub range: ScaleRange,
}

impl MultiCascade {
    pub fn new() -> Self {
        Self {
            layers: IndexMap::new(),
            range: ScaleRange::ALL,
        }
    }

    /// Property value of a sub-layer
    pub fn get(&self, subpart: &str, key: &str) -> Option<&Value> {
        self.layers.get(subpart)?.get(key)
    }

    /// Property keys of a sub-layer (empty if the layer does not exist)
    pub fn keys<'a>(&'a self, subpart: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.layers.get(subpart).into_iter().flat_map(|c| c.keys())
    }

    pub fn layer(&self, subpart: &str) -> Option<&Cascade> {
        self.layers.get(subpart)
    }

    /// Get or create a layer; new layers start as a copy of the `*` layer
    pub fn layer_or_create(&mut self, subpart: &str) -> &mut Cascade {
        if !self.layers.contains_key(subpart) {
            let seed = if subpart == ALL_LAYERS {
                Cascade::new()
            } else {
                self.layers.get(ALL_LAYERS).cloned().unwrap_or_default()
            };
            self.layers.insert(subpart.to_string(), seed);
        }
        self.layers.entry(subpart.to_string()).or_default()
    }

    /// Layer names in creation order
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &Cascade)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for MultiCascade {
    fn default() -> Self {
        Self::new()
    }
}
