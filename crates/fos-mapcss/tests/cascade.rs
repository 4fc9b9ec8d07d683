//! Cascade tests for fos-mapcss
//!
//! Override order, scale ranges, sub-layers, classes, settings and
//! short-circuit evaluation through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use fos_mapcss::{FunctionRegistry, Signature, StyleConfig, StyleSource, Value};
use fos_osm::{DataSet, LatLon, PrimitiveId, TagMap};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn line(tags: &[(&str, &str)]) -> Result<(DataSet, PrimitiveId)> {
    let mut ds = DataSet::new();
    ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new())?;
    ds.add_node(2, LatLon::new(0.0, 1.0), TagMap::new())?;
    let way = ds.add_way(10, &[1, 2], TagMap::from_pairs(tags))?;
    Ok((ds, way))
}

#[test]
fn test_later_declaration_overrides() -> Result<()> {
    init_tracing();
    let style = StyleSource::default();
    let report = style.load_text("way[highway] { width: 2; }\nway[highway=motorway] { width: 2*2; }")?;
    assert!(report.is_clean());

    let (ds, way) = line(&[("highway", "motorway")])?;
    let cascade = style.apply(&ds, way, 1000.0);
    assert_eq!(cascade.get("default", "width"), Some(&Value::Number(4.0)));

    let (ds, way) = line(&[("highway", "residential")])?;
    let cascade = style.apply(&ds, way, 1000.0);
    assert_eq!(cascade.get("default", "width"), Some(&Value::Number(2.0)));
    Ok(())
}

#[test]
fn test_scale_range_containment() -> Result<()> {
    let style = StyleSource::default();
    let mut ds = DataSet::new();
    let node = ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new())?;

    // (1000, 5000] built directly, the text syntax only has zoom levels
    let range = fos_mapcss::ScaleRange::new(1000.0, 5000.0)?;
    let mut selector = fos_mapcss::GeneralSelector::new(fos_mapcss::BaseType::Node);
    selector.range = range;
    style.load_rules(vec![fos_mapcss::Rule::new(
        vec![selector.into()],
        fos_mapcss::Declaration::new(
            0,
            vec![fos_mapcss::Instruction::assign(
                "symbol-size",
                fos_mapcss::Expression::literal(6.0),
            )],
        ),
    )]);

    assert!(style.apply(&ds, node, 2500.0).get("default", "symbol-size").is_some());
    assert!(style.apply(&ds, node, 5000.0).get("default", "symbol-size").is_some());
    assert!(style.apply(&ds, node, 500.0).get("default", "symbol-size").is_none());
    assert!(style.apply(&ds, node, 6000.0).get("default", "symbol-size").is_none());
    assert!(style.apply(&ds, node, 1000.0).get("default", "symbol-size").is_none());
    Ok(())
}

#[test]
fn test_zoom_syntax() -> Result<()> {
    let style = StyleSource::default();
    style.load_text("node|z14- { icon: big; }\nnode|z-13 { icon: small; }")?;
    let mut ds = DataSet::new();
    let node = ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new())?;

    let near = fos_mapcss::range::level_to_scale(16);
    let far = fos_mapcss::range::level_to_scale(10);
    assert_eq!(style.apply(&ds, node, near).get("default", "icon"), Some(&Value::from("big")));
    assert_eq!(style.apply(&ds, node, far).get("default", "icon"), Some(&Value::from("small")));
    Ok(())
}

#[test]
fn test_absent_value_clears() -> Result<()> {
    let style = StyleSource::default();
    style.load_text("way[building] { text: \"house\"; }\nway[building=garage] { text: tag(\"name\"); }")?;
    let (ds, garage) = line(&[("building", "garage")])?;
    assert!(style.apply(&ds, garage, 1000.0).get("default", "text").is_none());

    let (ds, named) = line(&[("building", "garage"), ("name", "Bob's")])?;
    assert_eq!(
        style.apply(&ds, named, 1000.0).get("default", "text"),
        Some(&Value::from("Bob's"))
    );
    Ok(())
}

#[test]
fn test_subparts_and_classes() -> Result<()> {
    let style = StyleSource::default();
    style.load_text(
        "way[highway] { set .road; width: 2; }\n\
         way[highway]::casing { width: 4; }\n\
         way.road { color: gray; }\n\
         way!.road { color: red; }\n\
         way::* { opacity: 0.8; }",
    )?;
    let (ds, way) = line(&[("highway", "primary")])?;
    let cascade = style.apply(&ds, way, 1000.0);

    assert_eq!(cascade.get("default", "width"), Some(&Value::Number(2.0)));
    assert_eq!(cascade.get("casing", "width"), Some(&Value::Number(4.0)));
    assert_eq!(cascade.get("default", "color"), Some(&Value::from("gray")));
    assert_eq!(cascade.get("casing", "opacity"), Some(&Value::Number(0.8)));
    let names: Vec<&str> = cascade.layer_names().collect();
    assert_eq!(names, vec!["default", "casing", "*"]);
    Ok(())
}

#[test]
fn test_prop_reads_cascade_and_placeholders() -> Result<()> {
    let style = StyleSource::default();
    style.load_text(
        "way[highway] { width: 3; }\n\
         way[highway] { casing-width: prop(\"width\") + 1; }\n\
         way[highway][ref] { text: \"{1.value} ({0.value})\"; }",
    )?;
    let (ds, way) = line(&[("highway", "primary"), ("ref", "A1")])?;
    let cascade = style.apply(&ds, way, 1000.0);
    assert_eq!(cascade.get("default", "casing-width"), Some(&Value::Number(4.0)));
    assert_eq!(cascade.get("default", "text"), Some(&Value::from("A1 (primary)")));
    Ok(())
}

#[test]
fn test_settings_drive_rules() -> Result<()> {
    let style = StyleSource::default();
    style.load_text(
        "setting::hide_paths { type: boolean; label: \"Hide paths\"; default: false; }\n\
         way[highway=path][setting(\"hide_paths\")] { width: 0; }",
    )?;
    let (ds, path) = line(&[("highway", "path")])?;
    assert!(style.apply(&ds, path, 1000.0).get("default", "width").is_none());

    style.set_setting("hide_paths", true)?;
    assert_eq!(
        style.apply(&ds, path, 1000.0).get("default", "width"),
        Some(&Value::Number(0.0))
    );
    Ok(())
}

#[test]
fn test_short_circuit_skips_registered_function() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut functions = FunctionRegistry::new();
    let counter = Arc::clone(&calls);
    functions.register("side_effect", Signature::fixed(&[]), false, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Value::Bool(true)
    });

    let style = StyleSource::with_functions(StyleConfig::default(), functions);
    style.load_text(
        "node { a: false && side_effect(); b: true || side_effect(); c: false ? side_effect() : 1; }",
    )?;
    let mut ds = DataSet::new();
    let node = ds.add_node(1, LatLon::new(0.0, 0.0), TagMap::new())?;
    let cascade = style.apply(&ds, node, 1000.0);

    assert_eq!(cascade.get("default", "a"), Some(&Value::Bool(false)));
    assert_eq!(cascade.get("default", "b"), Some(&Value::Bool(true)));
    assert_eq!(cascade.get("default", "c"), Some(&Value::Number(1.0)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_rejected_rules_do_not_block_loading() -> Result<()> {
    let style = StyleSource::default();
    let report = style.load_text(
        "node:bogus { a: 1; }\n\
         node[name=~/(/] { a: 1; }\n\
         node { a: 2; }",
    )?;
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[1].line, 2);
    assert_eq!(style.rule_count(), 1);
    Ok(())
}
