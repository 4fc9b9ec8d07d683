//! Selectors
//!
//! A general selector tests one object: base type, scale range, then its
//! conditions in order. A link selector relates the object matched by its
//! right side to another object matched by its left side. Every link kind
//! first narrows candidates with a cheap structural or bounding box test
//! and then verifies them exactly.

use fos_osm::{OsmGraph, PrimitiveId};

use crate::condition::Condition;
use crate::environment::Environment;
use crate::pseudo_class;
use crate::range::ScaleRange;
use crate::MapCssError;

/// Object class a general selector applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Node,
    Way,
    Relation,
    /// Closed ways (unless `area=no`) and multipolygons
    Area,
    /// `*`
    Any,
}

impl BaseType {
    /// Parse a base type name; `point` and `line` are accepted as aliases
    pub fn parse(name: &str) -> Result<Self, MapCssError> {
        match name {
            "node" | "point" => Ok(BaseType::Node),
            "way" | "line" => Ok(BaseType::Way),
            "relation" => Ok(BaseType::Relation),
            "area" => Ok(BaseType::Area),
            "*" => Ok(BaseType::Any),
            other => Err(MapCssError::UnknownBaseType(other.to_string())),
        }
    }

    pub fn matches(&self, graph: &dyn OsmGraph, id: PrimitiveId) -> bool {
        match self {
            BaseType::Node => id.is_node(),
            BaseType::Way => id.is_way(),
            BaseType::Relation => id.is_relation(),
            BaseType::Area => graph.is_area(id),
            BaseType::Any => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BaseType::Node => "node",
            BaseType::Way => "way",
            BaseType::Relation => "relation",
            BaseType::Area => "area",
            BaseType::Any => "*",
        }
    }
}

/// Relationship of a link selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `left > right`: left is a parent of right
    Child,
    /// `left < right`: left is a child of right
    Parent,
    /// `left + right`: left is the node before right in a way
    Sibling,
    /// `left ∈ right`: left lies inside the area right
    ElementOf,
    /// `left ⧉ right`: the ways left and right cross
    Crosses,
}

impl LinkKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            LinkKind::Child => ">",
            LinkKind::Parent => "<",
            LinkKind::Sibling => "+",
            LinkKind::ElementOf => "∈",
            LinkKind::Crosses => "⧉",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneralSelector {
    pub base: BaseType,
    pub range: ScaleRange,
    pub conditions: Vec<Condition>,
    /// `::name`, `None` for the default sub-layer
    pub subpart: Option<String>,
}

impl GeneralSelector {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            range: ScaleRange::ALL,
            conditions: Vec::new(),
            subpart: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_range(mut self, range: ScaleRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_subpart(mut self, subpart: impl Into<String>) -> Self {
        self.subpart = Some(subpart.into());
        self
    }

    /// Base type and conditions, without the scale range
    pub fn matches_object(&self, env: &Environment<'_>) -> bool {
        self.base.matches(env.graph, env.osm) && self.conditions.iter().all(|c| c.applies(env))
    }

    /// Base type, scale range (when the environment has a scale), then
    /// conditions
    pub fn matches(&self, env: &Environment<'_>) -> bool {
        if !self.base.matches(env.graph, env.osm) {
            return false;
        }
        if let Some(scale) = env.scale
            && !self.range.contains(scale)
        {
            return false;
        }
        self.conditions.iter().all(|c| c.applies(env))
    }
}

#[derive(Debug, Clone)]
pub struct LinkSelector {
    pub left: Selector,
    /// Conditions on the link itself (role, index, open end, ...)
    pub link: Vec<Condition>,
    pub right: GeneralSelector,
    pub kind: LinkKind,
}

#[derive(Debug, Clone)]
pub enum Selector {
    General(GeneralSelector),
    Link(Box<LinkSelector>),
}

impl From<GeneralSelector> for Selector {
    fn from(s: GeneralSelector) -> Self {
        Selector::General(s)
    }
}

impl Selector {
    /// Build a link selector; `left` may itself be a link selector
    pub fn link(left: Selector, kind: LinkKind, link: Vec<Condition>, right: GeneralSelector) -> Self {
        Selector::Link(Box::new(LinkSelector { left, link, right, kind }))
    }

    /// Rightmost general selector, which tests the object itself
    pub fn anchor(&self) -> &GeneralSelector {
        match self {
            Selector::General(s) => s,
            Selector::Link(l) => &l.right,
        }
    }

    /// Scale range of the anchor
    pub fn range(&self) -> ScaleRange {
        self.anchor().range
    }

    pub fn subpart(&self) -> Option<&str> {
        self.anchor().subpart.as_deref()
    }

    /// Match against the environment's object
    ///
    /// The anchor's scale range is not checked here; the caller compares
    /// it with the query scale. On success the returned environment
    /// carries the matched link state (parent, child, index, count).
    pub fn matches<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        match self {
            Selector::General(s) => s.matches_object(env).then_some(*env),
            Selector::Link(l) => l.matches(env),
        }
    }

    /// Match as the left side of a link, scale range included
    fn matches_operand(&self, env: &Environment<'_>) -> bool {
        match self {
            Selector::General(s) => s.matches(env),
            Selector::Link(l) => {
                if let Some(scale) = env.scale
                    && !l.right.range.contains(scale)
                {
                    return false;
                }
                l.matches(env).is_some()
            }
        }
    }
}

impl LinkSelector {
    fn matches<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        if !self.right.matches_object(env) {
            return None;
        }
        match self.kind {
            LinkKind::Child => self.match_child(env),
            LinkKind::Parent => self.match_parent(env),
            LinkKind::Sibling => self.match_sibling(env),
            LinkKind::ElementOf => self.match_element_of(env),
            LinkKind::Crosses => self.match_crosses(env),
        }
    }

    fn link_applies(&self, env: &Environment<'_>) -> bool {
        let link_env = env.with_link_context();
        self.link.iter().all(|c| c.applies(&link_env))
    }

    /// Link conditions are exactly `:open_end`
    fn is_open_end_link(&self) -> bool {
        matches!(
            self.link.as_slice(),
            [Condition::PseudoClass { name: "open_end", negate: false, .. }]
        )
    }

    /// Parents of the object, in referrer order
    fn match_child<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let graph = env.graph;
        if self.is_open_end_link() {
            return self.match_open_end(env);
        }
        for &parent in graph.referrers(env.osm) {
            if !self.left.matches_operand(&env.with_primitive(parent)) {
                continue;
            }
            let children = graph.children(parent);
            let count = children.len();
            for (index, _) in children.iter().enumerate().filter(|(_, c)| **c == env.osm) {
                let candidate = env.with_parent(parent).with_index(index, count);
                if self.link_applies(&candidate) {
                    tracing::trace!("{} is child {} of {}", env.osm, index, parent);
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Node at an open end of a multipolygon: only relations reachable
    /// through the node's ways are inspected
    fn match_open_end<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let graph = env.graph;
        if !env.osm.is_node() {
            return None;
        }
        for &way in graph.referrers(env.osm).iter().filter(|r| r.is_way()) {
            for &relation in graph.referrers(way).iter().filter(|r| r.is_relation()) {
                if pseudo_class::is_open_end_of(graph, relation, env.osm)
                    && self.left.matches_operand(&env.with_primitive(relation))
                {
                    return Some(env.with_parent(relation));
                }
            }
        }
        None
    }

    /// Children of the object, in member order
    fn match_parent<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let children = env.graph.children(env.osm);
        let count = children.len();
        for (index, &child) in children.iter().enumerate() {
            if !self.left.matches_operand(&env.with_primitive(child)) {
                continue;
            }
            let candidate = env.with_child(child).with_index(index, count);
            if self.link_applies(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Preceding node in any way containing the object
    fn match_sibling<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let graph = env.graph;
        if !env.osm.is_node() {
            return None;
        }
        for &way in graph.referrers(env.osm).iter().filter(|r| r.is_way()) {
            let nodes = graph.way_nodes(way);
            for index in (1..nodes.len()).filter(|&i| nodes[i] == env.osm) {
                let previous = nodes[index - 1];
                if !self.left.matches_operand(&env.with_primitive(previous)) {
                    continue;
                }
                let candidate = env.with_parent(way).with_child(previous).with_index(index, nodes.len());
                if self.link_applies(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Nodes and ways inside the area matched by the right side
    fn match_element_of<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let graph = env.graph;
        if !graph.is_area(env.osm) {
            return None;
        }
        let bbox = graph.bbox(env.osm)?;
        let own_members: Vec<PrimitiveId> = if env.osm.is_relation() {
            graph.children(env.osm)
        } else {
            Vec::new()
        };

        graph
            .search(&bbox)
            .into_iter()
            .filter(|c| *c != env.osm && !own_members.contains(c))
            .take(env.spatial_limit)
            .filter(|c| self.left.matches_operand(&env.with_primitive(*c)))
            .find(|c| graph.contains(env.osm, *c) && self.link_applies(&env.with_child(*c)))
            .map(|c| env.with_child(c))
    }

    /// Ways crossing the way matched by the right side
    fn match_crosses<'a>(&self, env: &Environment<'a>) -> Option<Environment<'a>> {
        let graph = env.graph;
        if !env.osm.is_way() {
            return None;
        }
        let bbox = graph.bbox(env.osm)?;
        graph
            .search(&bbox)
            .into_iter()
            .filter(|c| c.is_way() && *c != env.osm)
            .take(env.spatial_limit)
            .filter(|c| self.left.matches_operand(&env.with_primitive(*c)))
            .find(|c| graph.ways_cross(env.osm, *c) && self.link_applies(&env.with_child(*c)))
            .map(|c| env.with_child(c))
    }
}
