//! Pseudo-Classes
//!
//! Static registry of named boolean tests (`:closed`, `:tagged`, ...).
//! Names are looked up once while loading; unknown names are load errors.

use fos_osm::{OsmGraph, OsmType, PrimitiveId};

use crate::environment::Environment;

pub type PseudoClassFn = fn(&Environment<'_>) -> bool;

/// Keys that do not make an object "tagged"
const UNINTERESTING_KEYS: &[&str] = &[
    "source",
    "source_ref",
    "note",
    "comment",
    "converted_by",
    "created_by",
    "watch",
    "fixme",
    "FIXME",
    "description",
    "attribution",
];

const PSEUDO_CLASSES: &[(&str, PseudoClassFn)] = &[
    ("closed", closed),
    ("closed2", closed2),
    ("modified", modified),
    ("new", new),
    ("selected", selected),
    ("highlighted", highlighted),
    ("disabled", disabled),
    ("incomplete", incomplete),
    ("connection", connection),
    ("unconnected", unconnected),
    ("tagged", tagged),
    ("same_tags", same_tags),
    ("area_style", area_style),
    ("clockwise", clockwise),
    ("anticlockwise", anticlockwise),
    ("unclosed_multipolygon", unclosed_multipolygon),
    ("open_end", open_end),
];

/// Lowercase with `-` mapped to `_`
pub fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

/// Find a pseudo-class by name, returning its canonical name
pub fn lookup(name: &str) -> Option<(&'static str, PseudoClassFn)> {
    let name = normalize(name);
    PSEUDO_CLASSES.iter().find(|(n, _)| *n == name).copied()
}

/// All registered names
pub fn names() -> impl Iterator<Item = &'static str> {
    PSEUDO_CLASSES.iter().map(|(n, _)| *n)
}

fn closed(env: &Environment<'_>) -> bool {
    match env.osm.kind {
        OsmType::Way => env.graph.is_closed(env.osm),
        OsmType::Relation => {
            env.graph.is_multipolygon(env.osm)
                && !env.graph.flags(env.osm).incomplete
                && env.graph.open_ends(env.osm).is_empty()
        }
        OsmType::Node => false,
    }
}

/// Like `closed`, but incomplete multipolygons count if what is loaded
/// is closed
fn closed2(env: &Environment<'_>) -> bool {
    match env.osm.kind {
        OsmType::Way => env.graph.is_closed(env.osm),
        OsmType::Relation => env.graph.is_multipolygon(env.osm) && env.graph.open_ends(env.osm).is_empty(),
        OsmType::Node => false,
    }
}

/// Modified or not yet uploaded
fn modified(env: &Environment<'_>) -> bool {
    let flags = env.graph.flags(env.osm);
    flags.modified || flags.new
}

fn new(env: &Environment<'_>) -> bool {
    env.graph.flags(env.osm).new
}

fn selected(env: &Environment<'_>) -> bool {
    env.graph.flags(env.osm).selected
}

fn highlighted(env: &Environment<'_>) -> bool {
    env.graph.flags(env.osm).highlighted
}

fn disabled(env: &Environment<'_>) -> bool {
    env.graph.flags(env.osm).disabled
}

fn incomplete(env: &Environment<'_>) -> bool {
    env.graph.flags(env.osm).incomplete
}

fn clockwise(env: &Environment<'_>) -> bool {
    env.graph.is_clockwise(env.osm) == Some(true)
}

fn anticlockwise(env: &Environment<'_>) -> bool {
    env.graph.is_clockwise(env.osm) == Some(false)
}

fn unclosed_multipolygon(env: &Environment<'_>) -> bool {
    env.graph.is_multipolygon(env.osm)
        && !env.graph.flags(env.osm).incomplete
        && !env.graph.open_ends(env.osm).is_empty()
}

/// Node without any parent way
fn unconnected(env: &Environment<'_>) -> bool {
    env.osm.is_node() && !env.graph.referrers(env.osm).iter().any(|r| r.is_way())
}

/// Node shared by more than one way
fn connection(env: &Environment<'_>) -> bool {
    env.osm.is_node() && env.graph.referrers(env.osm).iter().filter(|r| r.is_way()).count() > 1
}

fn tagged(env: &Environment<'_>) -> bool {
    env.tags()
        .is_some_and(|tags| tags.keys().any(|k| !UNINTERESTING_KEYS.contains(&k) && !k.starts_with("source:")))
}

fn same_tags(env: &Environment<'_>) -> bool {
    let children = env.graph.children(env.osm);
    let Some((first, rest)) = children.split_first() else {
        return false;
    };
    let reference = env.graph.tags(*first);
    rest.iter().all(|c| env.graph.tags(*c) == reference)
}

/// The current layer already received a fill
fn area_style(env: &Environment<'_>) -> bool {
    env.current_cascade()
        .is_some_and(|c| c.contains("fill-color") || c.contains("fill-image"))
}

/// Link test: the object is an open end of the matched multipolygon parent
fn open_end(env: &Environment<'_>) -> bool {
    env.parent
        .is_some_and(|p| is_open_end_of(env.graph, p, env.osm))
}

pub(crate) fn is_open_end_of(graph: &dyn OsmGraph, relation: PrimitiveId, node: PrimitiveId) -> bool {
    graph.is_multipolygon(relation) && graph.open_ends(relation).contains(&node)
}
