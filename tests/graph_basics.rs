mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{quiet_graph, quiet_options, open_graph};
use lucent::{ElementKind, GraphError, Result, SemanticType, Value};

#[test]
fn read_your_writes_before_and_after_flush() -> Result<()> {
    let graph = quiet_graph()?;
    let mut v = graph.add_vertex(Some("marko"))?;
    v.set_property("age", 29i64)?;

    let read = graph.vertex("marko")?.expect("vertex visible before flush");
    assert_eq!(read.id(), v.id());
    assert_eq!(read.property("age"), Some(&Value::Long(29)));

    graph.refresh()?;
    let read = graph.vertex_by_id(v.id())?.expect("vertex visible after flush");
    assert_eq!(read.property("age"), Some(&Value::Long(29)));
    Ok(())
}

#[test]
fn property_round_trip_and_removal() -> Result<()> {
    let graph = quiet_graph()?;
    let mut v = graph.add_vertex(None)?;
    assert_eq!(v.set_property("name", "marko")?, None);
    assert_eq!(v.set_property("name", "peter")?, Some(Value::from("marko")));
    v.set_property("score", 1.5f64)?;
    let keys: Vec<&str> = v.property_keys().collect();
    assert_eq!(keys, vec!["name", "score"]);

    assert_eq!(v.remove_property("name")?, Some(Value::from("peter")));
    assert_eq!(v.remove_property("name")?, None);
    let mut fresh = graph.vertex_by_id(v.id())?.unwrap();
    fresh.reload()?;
    assert!(fresh.property("name").is_none());
    assert_eq!(fresh.property("score"), Some(&Value::Double(1.5)));
    Ok(())
}

#[test]
fn reserved_property_names_are_rejected() -> Result<()> {
    let graph = quiet_graph()?;
    let mut a = graph.add_vertex(None)?;
    let b = graph.add_vertex(None)?;
    let mut e = graph.add_edge(None, &a, &b, "knows")?;

    for key in ["id", "_id", "_kind"] {
        assert!(matches!(a.set_property(key, "x"), Err(GraphError::ReservedProperty(_))));
    }
    assert!(matches!(e.set_property("label", "x"), Err(GraphError::ReservedProperty(_))));
    a.set_property("label", "vertices may use it")?;
    e.set_property("weight", 0.5f64)?;
    assert_eq!(e.label(), "knows");
    Ok(())
}

#[test]
fn lookups_are_kind_specific() -> Result<()> {
    let graph = quiet_graph()?;
    let a = graph.add_vertex(Some("a"))?;
    let e = graph.add_edge(Some("e"), &a, &a, "self")?;
    assert!(graph.edge("a")?.is_none());
    assert!(graph.vertex("e")?.is_none());
    assert!(graph.vertex_by_id(e.id())?.is_none());
    assert_eq!(graph.edge("e")?.map(|edge| edge.id()), Some(e.id()));
    assert!(graph.vertex("missing")?.is_none());
    Ok(())
}

#[test]
fn internal_ids_increase() -> Result<()> {
    let graph = quiet_graph()?;
    let ids: Vec<u64> = (0..5)
        .map(|_| graph.add_vertex(None).map(|v| v.id().0))
        .collect::<Result<_>>()?;
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn concurrent_inserts_of_one_user_id_admit_one() -> Result<()> {
    let graph = Arc::new(open_graph(quiet_options())?);
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let graph = Arc::clone(&graph);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                graph.add_vertex(Some("contested")).is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    graph.refresh()?;
    assert_eq!(graph.vertices().count(), 1);
    Ok(())
}

#[test]
fn concurrent_writes_of_different_keys_all_survive() -> Result<()> {
    let graph = Arc::new(open_graph(quiet_options())?);
    let id = graph.add_vertex(Some("shared"))?.id();
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            let graph = Arc::clone(&graph);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                let mut v = graph.vertex_by_id(id)?.expect("vertex exists");
                barrier.wait();
                for round in 0..20i64 {
                    v.set_property(&format!("k{i}"), round)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap()?;
    }

    let v = graph.vertex("shared")?.unwrap();
    let keys: Vec<&str> = v.property_keys().collect();
    assert_eq!(keys, vec!["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"]);
    assert!(v.properties().values().all(|value| *value == Value::Long(19)));
    graph.refresh()?;
    let stored = graph.vertex_by_id(id)?.unwrap();
    assert_eq!(stored.properties().len(), 8);
    Ok(())
}

#[test]
fn schema_fields_are_immutable() -> Result<()> {
    let graph = quiet_graph()?;
    graph.define_field(ElementKind::Vertex, "x", SemanticType::Long)?;
    let err = graph
        .define_field(ElementKind::Vertex, "x", SemanticType::Text)
        .unwrap_err();
    assert!(matches!(err, GraphError::SchemaConflict { .. }));
    assert_eq!(graph.schema().mapping(ElementKind::Vertex).get("x"), Some(SemanticType::Long));
    assert!(graph.define_field(ElementKind::Vertex, "_x", SemanticType::Long).is_err());
    Ok(())
}

#[test]
fn mismatched_value_is_not_written() -> Result<()> {
    let graph = quiet_graph()?;
    graph.define_field(ElementKind::Vertex, "age", SemanticType::Long)?;
    let mut v = graph.add_vertex(None)?;
    let err = v.set_property("age", "old").unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    v.reload()?;
    assert!(v.property("age").is_none());
    Ok(())
}

#[test]
fn mapped_fields_are_queryable_without_an_index() -> Result<()> {
    let graph = quiet_graph()?;
    graph.define_field(ElementKind::Vertex, "age", SemanticType::Long)?;
    let mut v = graph.add_vertex(None)?;
    v.set_property("age", 30i64)?;
    v.set_property("nick", "vee")?;
    graph.refresh()?;

    let found: Vec<_> = graph
        .vertices_by("age", &Value::Long(30))?
        .collect::<Result<_>>()?;
    assert_eq!(found, vec![v.clone()]);
    assert_eq!(graph.count(ElementKind::Vertex, "age", &Value::Long(31))?, 0);
    assert!(matches!(
        graph.vertices_by("nick", &Value::from("vee")),
        Err(GraphError::KeyNotIndexed { .. })
    ));
    assert_eq!(v.property("nick"), Some(&Value::from("vee")));
    Ok(())
}
