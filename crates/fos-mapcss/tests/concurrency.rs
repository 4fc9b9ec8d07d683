//! Concurrency tests for fos-mapcss
//!
//! Batch application on worker threads and queries racing a reload.

use anyhow::Result;
use fos_mapcss::{StyleConfig, StyleSource, Value};
use fos_osm::{DataSet, LatLon, PrimitiveId, TagMap};

fn grid(nodes: i64) -> Result<(DataSet, Vec<PrimitiveId>)> {
    let mut ds = DataSet::new();
    let mut ids = Vec::new();
    for id in 1..=nodes {
        let tags = if id % 3 == 0 {
            TagMap::from_pairs(&[("amenity", "bench")])
        } else {
            TagMap::from_pairs(&[("natural", "tree")])
        };
        ids.push(ds.add_node(id, LatLon::new((id / 20) as f64, (id % 20) as f64), tags)?);
    }
    Ok((ds, ids))
}

#[test]
fn test_apply_all_matches_sequential_order() -> Result<()> {
    let (ds, ids) = grid(250)?;
    let style = StyleSource::new(StyleConfig {
        threads: Some(4),
        ..Default::default()
    });
    style.load_text(
        "node[amenity=bench] { icon: bench; }\n\
         node[natural=tree] { icon: tree; }\n\
         node { label: osm_id(); }",
    )?;

    let batch = style.apply_all(&ds, &ids, 1000.0);
    assert_eq!(batch.len(), ids.len());
    for (id, cascade) in ids.iter().zip(&batch) {
        assert_eq!(cascade, &style.apply(&ds, *id, 1000.0));
        assert_eq!(cascade.get("default", "label"), Some(&Value::Number(id.id as f64)));
    }
    assert!(style.apply_all(&ds, &[], 1000.0).is_empty());
    Ok(())
}

#[test]
fn test_queries_during_reload_see_whole_styles() -> Result<()> {
    let (ds, ids) = grid(60)?;
    let style = StyleSource::default();
    let narrow = "node { width: 1; color: red; }";
    let wide = "node { width: 2; color: blue; }";
    style.load_text(narrow)?;

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                let text = if i % 2 == 0 { wide } else { narrow };
                assert!(style.load_text(text).is_ok());
            }
        });
        for _ in 0..3 {
            s.spawn(|| {
                for _ in 0..20 {
                    for id in &ids {
                        let cascade = style.apply(&ds, *id, 1000.0);
                        let pair = (cascade.get("default", "width"), cascade.get("default", "color"));
                        assert!(
                            pair == (Some(&Value::Number(1.0)), Some(&Value::from("red")))
                                || pair == (Some(&Value::Number(2.0)), Some(&Value::from("blue"))),
                            "mixed style: {:?}",
                            pair
                        );
                    }
                }
            });
        }
    });
    Ok(())
}
