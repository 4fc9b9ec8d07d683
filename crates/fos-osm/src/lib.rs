//! fOS OSM - Tagged Map Object Graph
//!
//! Nodes, ways and relations with tags, membership and referrer links.
//! The style engine only reads the graph through [`OsmGraph`]; geometry
//! predicates have default implementations on top of the raw accessors.

mod dataset;
pub mod geometry;
mod tags;

pub use dataset::DataSet;
pub use geometry::{BBox, LatLon, SegmentRelation};
pub use tags::{Tag, TagMap};

use std::fmt;

/// Primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    /// Lowercase name as used in style sheets
    pub fn name(&self) -> &'static str {
        match self {
            OsmType::Node => "node",
            OsmType::Way => "way",
            OsmType::Relation => "relation",
        }
    }
}

/// Primitive identifier (type + OSM id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId {
    pub kind: OsmType,
    pub id: i64,
}

impl PrimitiveId {
    pub const fn node(id: i64) -> Self {
        Self { kind: OsmType::Node, id }
    }

    pub const fn way(id: i64) -> Self {
        Self { kind: OsmType::Way, id }
    }

    pub const fn relation(id: i64) -> Self {
        Self { kind: OsmType::Relation, id }
    }

    pub fn is_node(&self) -> bool {
        self.kind == OsmType::Node
    }

    pub fn is_way(&self) -> bool {
        self.kind == OsmType::Way
    }

    pub fn is_relation(&self) -> bool {
        self.kind == OsmType::Relation
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            OsmType::Node => 'n',
            OsmType::Way => 'w',
            OsmType::Relation => 'r',
        };
        write!(f, "{}{}", prefix, self.id)
    }
}

/// Relation member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub role: String,
    pub id: PrimitiveId,
}

impl Member {
    pub fn new(role: impl Into<String>, id: PrimitiveId) -> Self {
        Self { role: role.into(), id }
    }
}

/// Editing state of a primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimitiveFlags {
    pub modified: bool,
    pub new: bool,
    pub selected: bool,
    pub highlighted: bool,
    pub disabled: bool,
    /// Some members or nodes were not loaded
    pub incomplete: bool,
}

/// Read-only capability interface of the object graph
///
/// Unknown ids yield empty slices / `None`; predicates on degenerate
/// geometry yield `false` rather than failing.
pub trait OsmGraph: Sync {
    /// Tags of a primitive, `None` if the primitive is unknown
    fn tags(&self, id: PrimitiveId) -> Option<&TagMap>;

    /// Editing state flags
    fn flags(&self, id: PrimitiveId) -> PrimitiveFlags;

    /// Ways and relations referencing this primitive, in visitation order
    fn referrers(&self, id: PrimitiveId) -> &[PrimitiveId];

    /// Ordered nodes of a way
    fn way_nodes(&self, id: PrimitiveId) -> &[PrimitiveId];

    /// Ordered members of a relation
    fn members(&self, id: PrimitiveId) -> &[Member];

    /// Coordinates of a node
    fn coordinates(&self, id: PrimitiveId) -> Option<LatLon>;

    /// Nodes and ways whose bounding box intersects `bbox`
    fn search(&self, bbox: &BBox) -> Vec<PrimitiveId>;

    /// Tag value lookup
    fn tag(&self, id: PrimitiveId, key: &str) -> Option<&str> {
        self.tags(id)?.get(key)
    }

    fn has_key(&self, id: PrimitiveId, key: &str) -> bool {
        self.tags(id).is_some_and(|t| t.has_key(key))
    }

    /// Way nodes or relation member ids, in order
    fn children(&self, id: PrimitiveId) -> Vec<PrimitiveId> {
        match id.kind {
            OsmType::Node => Vec::new(),
            OsmType::Way => self.way_nodes(id).to_vec(),
            OsmType::Relation => self.members(id).iter().map(|m| m.id).collect(),
        }
    }

    /// Way with at least three nodes whose first and last node coincide
    fn is_closed(&self, id: PrimitiveId) -> bool {
        if !id.is_way() {
            return false;
        }
        let nodes = self.way_nodes(id);
        nodes.len() >= 3 && nodes.first() == nodes.last()
    }

    /// Relation of type multipolygon or boundary
    fn is_multipolygon(&self, id: PrimitiveId) -> bool {
        id.is_relation() && matches!(self.tag(id, "type"), Some("multipolygon") | Some("boundary"))
    }

    /// Objects rendered as areas
    fn is_area(&self, id: PrimitiveId) -> bool {
        match id.kind {
            OsmType::Node => false,
            OsmType::Way => self.is_closed(id) && self.tag(id, "area") != Some("no"),
            OsmType::Relation => self.is_multipolygon(id),
        }
    }

    /// Node coordinates of a way, `None` if any node has no position
    fn polyline(&self, id: PrimitiveId) -> Option<Vec<LatLon>> {
        self.way_nodes(id).iter().map(|n| self.coordinates(*n)).collect()
    }

    /// Bounding box; relations only consider node and way members
    fn bbox(&self, id: PrimitiveId) -> Option<BBox> {
        match id.kind {
            OsmType::Node => self.coordinates(id).map(BBox::from_point),
            OsmType::Way => BBox::from_points(&self.polyline(id)?),
            OsmType::Relation => self
                .members(id)
                .iter()
                .filter(|m| !m.id.is_relation())
                .filter_map(|m| self.bbox(m.id))
                .reduce(|a, b| a.union(&b)),
        }
    }

    /// Winding order of a closed way, `None` if not closed or degenerate
    fn is_clockwise(&self, id: PrimitiveId) -> Option<bool> {
        if !self.is_closed(id) {
            return None;
        }
        let area = geometry::signed_area(&self.polyline(id)?);
        if area == 0.0 { None } else { Some(area < 0.0) }
    }

    /// End nodes of unclosed multipolygon member ways that are not joined
    /// to another member way
    fn open_ends(&self, id: PrimitiveId) -> Vec<PrimitiveId> {
        if !self.is_multipolygon(id) {
            return Vec::new();
        }
        let mut ends: Vec<(PrimitiveId, usize)> = Vec::new();
        for member in self.members(id) {
            if !member.id.is_way() || self.is_closed(member.id) {
                continue;
            }
            let nodes = self.way_nodes(member.id);
            let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
                continue;
            };
            for end in [*first, *last] {
                match ends.iter_mut().find(|(n, _)| *n == end) {
                    Some((_, count)) => *count += 1,
                    None => ends.push((end, 1)),
                }
            }
        }
        ends.into_iter()
            .filter(|(_, count)| count % 2 == 1)
            .map(|(n, _)| n)
            .collect()
    }

    /// Outer and inner rings of an area-like primitive
    fn rings(&self, id: PrimitiveId) -> (Vec<Vec<LatLon>>, Vec<Vec<LatLon>>) {
        let mut outer = Vec::new();
        let mut inner = Vec::new();
        if self.is_closed(id) {
            if let Some(ring) = self.polyline(id) {
                outer.push(ring);
            }
        } else if self.is_multipolygon(id) {
            for member in self.members(id) {
                if !self.is_closed(member.id) {
                    continue;
                }
                let Some(ring) = self.polyline(member.id) else {
                    continue;
                };
                if member.role == "inner" {
                    inner.push(ring);
                } else {
                    outer.push(ring);
                }
            }
        }
        (outer, inner)
    }

    /// Check if `inner` (node or way) lies inside the area `container`
    fn contains(&self, container: PrimitiveId, inner: PrimitiveId) -> bool {
        let points = match inner.kind {
            OsmType::Node => match self.coordinates(inner) {
                Some(p) => vec![p],
                None => return false,
            },
            OsmType::Way => match self.polyline(inner) {
                Some(points) if !points.is_empty() => points,
                _ => return false,
            },
            OsmType::Relation => return false,
        };

        let (outer, holes) = self.rings(container);
        if outer.is_empty() {
            return false;
        }
        let vertices_inside = points.iter().all(|p| {
            outer.iter().any(|ring| geometry::point_in_polygon(*p, ring))
                && !holes.iter().any(|ring| geometry::point_in_polygon(*p, ring))
        });
        // A concave boundary can pass between two inside vertices
        vertices_inside
            && !points.windows(2).any(|segment| {
                outer.iter().chain(&holes).any(|ring| {
                    ring.windows(2).any(|edge| {
                        geometry::classify_segments(segment[0], segment[1], edge[0], edge[1])
                            == SegmentRelation::Crossing
                    })
                })
            })
    }

    /// Check if two ways properly cross; touching or overlapping ways do not
    fn ways_cross(&self, a: PrimitiveId, b: PrimitiveId) -> bool {
        if !a.is_way() || !b.is_way() || a == b {
            return false;
        }
        let (Some(line_a), Some(line_b)) = (self.polyline(a), self.polyline(b)) else {
            return false;
        };
        line_a.windows(2).any(|sa| {
            line_b.windows(2).any(|sb| {
                geometry::classify_segments(sa[0], sa[1], sb[0], sb[1]) == SegmentRelation::Crossing
            })
        })
    }
}

/// Graph construction error
#[derive(Debug, thiserror::Error)]
pub enum OsmError {
    #[error("Duplicate primitive: {0}")]
    Duplicate(PrimitiveId),

    #[error("Unknown primitive: {0}")]
    UnknownPrimitive(PrimitiveId),

    #[error("Way {way} references unknown node {node}")]
    MissingNode { way: i64, node: i64 },
}
