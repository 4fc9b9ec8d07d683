//! Evaluation Environment
//!
//! Immutable per-evaluation context. Relational matching extends a copy
//! with `with_*` methods instead of mutating shared state, so one
//! environment can be handed to any number of nested evaluations.

use fos_osm::{OsmGraph, PrimitiveId, TagMap};

use crate::cascade::{Cascade, MultiCascade};
use crate::config::StyleSettings;
use crate::selector::Selector;

/// Whether conditions test an object or the link between two objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Context {
    #[default]
    Primitive,
    Link,
}

/// Relational state produced by a link selector match
///
/// Holds no borrows, so it can outlive the environment it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkState {
    pub parent: Option<PrimitiveId>,
    pub child: Option<PrimitiveId>,
    pub index: Option<usize>,
    pub count: Option<usize>,
}

#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub graph: &'a dyn OsmGraph,
    /// Object under evaluation
    pub osm: PrimitiveId,
    /// Current sub-layer
    pub layer: &'a str,
    /// Query scale, if matching for a specific scale
    pub scale: Option<f64>,
    /// Matched parent (child and sibling links)
    pub parent: Option<PrimitiveId>,
    /// Matched child (parent, containment and crossing links)
    pub child: Option<PrimitiveId>,
    /// Position within the parent's children
    pub index: Option<usize>,
    /// Number of the parent's children
    pub count: Option<usize>,
    pub context: Context,
    /// Cascade under construction
    pub cascade: Option<&'a MultiCascade>,
    pub settings: Option<&'a StyleSettings>,
    /// Selector whose declaration is executed (placeholder lookups)
    pub selector: Option<&'a Selector>,
    /// Bound on bounding box candidates per spatial link evaluation
    pub spatial_limit: usize,
}

impl<'a> Environment<'a> {
    pub fn new(graph: &'a dyn OsmGraph, osm: PrimitiveId) -> Self {
        Self {
            graph,
            osm,
            layer: "default",
            scale: None,
            parent: None,
            child: None,
            index: None,
            count: None,
            context: Context::Primitive,
            cascade: None,
            settings: None,
            selector: None,
            spatial_limit: usize::MAX,
        }
    }

    /// Same context for another object, relational state cleared
    pub fn with_primitive(&self, osm: PrimitiveId) -> Self {
        Self {
            osm,
            parent: None,
            child: None,
            index: None,
            count: None,
            context: Context::Primitive,
            ..*self
        }
    }

    pub fn with_layer(&self, layer: &'a str) -> Self {
        Self { layer, ..*self }
    }

    pub fn with_scale(&self, scale: f64) -> Self {
        Self { scale: Some(scale), ..*self }
    }

    pub fn with_parent(&self, parent: PrimitiveId) -> Self {
        Self { parent: Some(parent), ..*self }
    }

    pub fn with_child(&self, child: PrimitiveId) -> Self {
        Self { child: Some(child), ..*self }
    }

    pub fn with_index(&self, index: usize, count: usize) -> Self {
        Self {
            index: Some(index),
            count: Some(count),
            ..*self
        }
    }

    pub fn with_link_context(&self) -> Self {
        Self { context: Context::Link, ..*self }
    }

    pub fn with_primitive_context(&self) -> Self {
        Self { context: Context::Primitive, ..*self }
    }

    pub fn with_cascade(&self, cascade: &'a MultiCascade) -> Self {
        Self { cascade: Some(cascade), ..*self }
    }

    pub fn with_settings(&self, settings: &'a StyleSettings) -> Self {
        Self { settings: Some(settings), ..*self }
    }

    pub fn with_selector(&self, selector: &'a Selector) -> Self {
        Self { selector: Some(selector), ..*self }
    }

    pub fn with_spatial_limit(&self, limit: usize) -> Self {
        Self { spatial_limit: limit, ..*self }
    }

    /// Apply the relational state of an earlier match
    pub fn with_link_state(&self, link: LinkState) -> Self {
        Self {
            parent: link.parent,
            child: link.child,
            index: link.index,
            count: link.count,
            ..*self
        }
    }

    pub fn link_state(&self) -> LinkState {
        LinkState {
            parent: self.parent,
            child: self.child,
            index: self.index,
            count: self.count,
        }
    }

    /// Tags of the current object
    pub fn tags(&self) -> Option<&'a TagMap> {
        self.graph.tags(self.osm)
    }

    pub fn tag(&self, key: &str) -> Option<&'a str> {
        self.graph.tag(self.osm, key)
    }

    /// Role of the matched relation membership, only in link context
    pub fn role(&self) -> Option<&'a str> {
        if self.context != Context::Link {
            return None;
        }
        self.member_role()
    }

    /// Role of the matched relation membership in any context
    pub fn member_role(&self) -> Option<&'a str> {
        let index = self.index?;
        if let Some(parent) = self.parent.filter(|p| p.is_relation()) {
            return self.graph.members(parent).get(index).map(|m| m.role.as_str());
        }
        if self.child.is_some() && self.osm.is_relation() {
            return self.graph.members(self.osm).get(index).map(|m| m.role.as_str());
        }
        None
    }

    /// Cascade of the current sub-layer
    pub fn current_cascade(&self) -> Option<&'a Cascade> {
        self.cascade?.layer(self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_osm::{DataSet, LatLon, Member};

    #[test]
    fn test_role_requires_link_context() {
        let mut ds = DataSet::new();
        ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new()).unwrap();
        let rel = ds
            .add_relation(2, vec![Member::new("stop", PrimitiveId::node(1))], TagMap::new())
            .unwrap();

        let env = Environment::new(&ds, PrimitiveId::node(1)).with_parent(rel).with_index(0, 1);
        assert_eq!(env.role(), None);
        assert_eq!(env.with_link_context().role(), Some("stop"));
    }

    #[test]
    fn test_with_primitive_clears_link_state() {
        let ds = DataSet::new();
        let env = Environment::new(&ds, PrimitiveId::node(1))
            .with_parent(PrimitiveId::way(2))
            .with_index(3, 4)
            .with_scale(100.0);
        let other = env.with_primitive(PrimitiveId::way(2));
        assert_eq!(other.link_state(), LinkState::default());
        assert_eq!(other.scale, Some(100.0));
        assert_eq!(env.link_state().index, Some(3));
    }
}
