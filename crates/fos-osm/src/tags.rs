//! Tag Map
//!
//! Ordered key/value tags of a primitive: get, insert, remove, has.

use std::collections::HashMap;

/// Single tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Tag collection with unique keys, kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    tags: Vec<Tag>,
    by_key: HashMap<String, usize>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs; later duplicates overwrite earlier ones
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().copied().collect()
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Get tag value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key
            .get(key)
            .and_then(|&i| self.tags.get(i))
            .map(|t| t.value.as_str())
    }

    /// Check if a key is present
    pub fn has_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Set a tag, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        if let Some(&index) = self.by_key.get(&key) {
            let old = std::mem::replace(&mut self.tags[index].value, value);
            Some(old)
        } else {
            self.by_key.insert(key.clone(), self.tags.len());
            self.tags.push(Tag { key, value });
            None
        }
    }

    /// Remove a tag, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.by_key.remove(key)?;
        let removed = self.tags.remove(index);
        // Re-index the tags that moved down
        for (i, tag) in self.tags.iter().enumerate().skip(index) {
            self.by_key.insert(tag.key.clone(), i);
        }
        Some(removed.value)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.tags.iter().map(|t| t.key.as_str())
    }

    /// `(key, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.tags.iter().map(|t| (t.key.as_str(), t.value.as_str()))
    }
}

/// Tag sets compare as sets; insertion order is irrelevant
impl PartialEq for TagMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for TagMap {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TagMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites() {
        let mut tags = TagMap::new();
        assert_eq!(tags.insert("highway", "primary"), None);
        assert_eq!(tags.insert("highway", "motorway"), Some("primary".to_string()));
        assert_eq!(tags.get("highway"), Some("motorway"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_remove_reindexes() {
        let mut tags = TagMap::from_pairs(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert_eq!(tags.remove("a"), Some("1".to_string()));
        assert_eq!(tags.get("b"), Some("2"));
        assert_eq!(tags.get("c"), Some("3"));
        assert!(!tags.has_key("a"));
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_set_equality() {
        let a = TagMap::from_pairs(&[("a", "1"), ("b", "2")]);
        let b = TagMap::from_pairs(&[("b", "2"), ("a", "1")]);
        let c = TagMap::from_pairs(&[("a", "1")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
