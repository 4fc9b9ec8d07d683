//! In-Memory Data Set (arena-based allocation)
//!
//! Stores primitives in insertion order and keeps referrer links up to
//! date as ways and relations are added.

use std::collections::HashMap;

use crate::{BBox, LatLon, Member, OsmError, OsmGraph, OsmType, PrimitiveFlags, PrimitiveId, TagMap};

/// Type-specific payload
#[derive(Debug, Clone)]
enum Payload {
    Node(LatLon),
    Way(Vec<PrimitiveId>),
    Relation(Vec<Member>),
}

/// Arena slot
#[derive(Debug, Clone)]
struct Primitive {
    id: PrimitiveId,
    tags: TagMap,
    flags: PrimitiveFlags,
    referrers: Vec<PrimitiveId>,
    payload: Payload,
}

/// Arena-based primitive store implementing [`OsmGraph`]
#[derive(Debug, Default)]
pub struct DataSet {
    primitives: Vec<Primitive>,
    index: HashMap<PrimitiveId, usize>,
}

impl DataSet {
    /// Create a new empty data set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of primitives
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// All primitive ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = PrimitiveId> + '_ {
        self.primitives.iter().map(|p| p.id)
    }

    /// Check if a primitive is present
    pub fn has_primitive(&self, id: PrimitiveId) -> bool {
        self.index.contains_key(&id)
    }

    /// Add a node
    pub fn add_node(&mut self, id: i64, coords: LatLon, tags: TagMap) -> Result<PrimitiveId, OsmError> {
        self.insert(PrimitiveId::node(id), tags, Payload::Node(coords))
    }

    /// Add a way; all nodes must already exist
    pub fn add_way(&mut self, id: i64, nodes: &[i64], tags: TagMap) -> Result<PrimitiveId, OsmError> {
        let node_ids: Vec<PrimitiveId> = nodes.iter().map(|&n| PrimitiveId::node(n)).collect();
        if let Some(missing) = node_ids.iter().find(|n| !self.has_primitive(**n)) {
            return Err(OsmError::MissingNode { way: id, node: missing.id });
        }

        let way = self.insert(PrimitiveId::way(id), tags, Payload::Way(node_ids.clone()))?;
        for node in node_ids {
            self.add_referrer(node, way);
        }
        Ok(way)
    }

    /// Add a relation; members that are not loaded mark it incomplete
    pub fn add_relation(&mut self, id: i64, members: Vec<Member>, tags: TagMap) -> Result<PrimitiveId, OsmError> {
        let incomplete = members.iter().any(|m| !self.has_primitive(m.id));
        let member_ids: Vec<PrimitiveId> = members.iter().map(|m| m.id).collect();

        let relation = self.insert(PrimitiveId::relation(id), tags, Payload::Relation(members))?;
        if incomplete {
            tracing::debug!("Relation {} has members that are not loaded", relation);
            if let Some(&slot) = self.index.get(&relation) {
                self.primitives[slot].flags.incomplete = true;
            }
        }
        for member in member_ids {
            self.add_referrer(member, relation);
        }
        Ok(relation)
    }

    /// Replace the editing flags of a primitive
    pub fn set_flags(&mut self, id: PrimitiveId, flags: PrimitiveFlags) -> Result<(), OsmError> {
        let slot = *self.index.get(&id).ok_or(OsmError::UnknownPrimitive(id))?;
        self.primitives[slot].flags = flags;
        Ok(())
    }

    fn insert(&mut self, id: PrimitiveId, tags: TagMap, payload: Payload) -> Result<PrimitiveId, OsmError> {
        if self.index.contains_key(&id) {
            return Err(OsmError::Duplicate(id));
        }
        self.index.insert(id, self.primitives.len());
        self.primitives.push(Primitive {
            id,
            tags,
            flags: PrimitiveFlags::default(),
            referrers: Vec::new(),
            payload,
        });
        Ok(id)
    }

    fn add_referrer(&mut self, child: PrimitiveId, parent: PrimitiveId) {
        if let Some(&slot) = self.index.get(&child) {
            let referrers = &mut self.primitives[slot].referrers;
            if !referrers.contains(&parent) {
                referrers.push(parent);
            }
        }
    }

    fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.index.get(&id).and_then(|&slot| self.primitives.get(slot))
    }
}

impl OsmGraph for DataSet {
    fn tags(&self, id: PrimitiveId) -> Option<&TagMap> {
        self.get(id).map(|p| &p.tags)
    }

    fn flags(&self, id: PrimitiveId) -> PrimitiveFlags {
        self.get(id).map(|p| p.flags).unwrap_or_default()
    }

    fn referrers(&self, id: PrimitiveId) -> &[PrimitiveId] {
        self.get(id).map(|p| p.referrers.as_slice()).unwrap_or(&[])
    }

    fn way_nodes(&self, id: PrimitiveId) -> &[PrimitiveId] {
        match self.get(id).map(|p| &p.payload) {
            Some(Payload::Way(nodes)) => nodes,
            _ => &[],
        }
    }

    fn members(&self, id: PrimitiveId) -> &[Member] {
        match self.get(id).map(|p| &p.payload) {
            Some(Payload::Relation(members)) => members,
            _ => &[],
        }
    }

    fn coordinates(&self, id: PrimitiveId) -> Option<LatLon> {
        match self.get(id).map(|p| &p.payload) {
            Some(Payload::Node(coords)) => Some(*coords),
            _ => None,
        }
    }

    fn search(&self, bbox: &BBox) -> Vec<PrimitiveId> {
        self.primitives
            .iter()
            .filter(|p| p.id.kind != OsmType::Relation)
            .filter(|p| self.bbox(p.id).is_some_and(|b| b.intersects(bbox)))
            .map(|p| p.id)
            .collect()
    }
}
