mod common;

use common::quiet_graph;
use lucent::{ElementId, ElementKind, GraphError, KeySet, Result, SemanticType, Value};

fn ids<I>(items: I) -> Result<Vec<ElementId>>
where
    I: Iterator<Item = Result<lucent::Vertex>>,
{
    items.map(|v| v.map(|v| v.id())).collect()
}

#[test]
fn lowercase_index_ignores_case() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index("people", ElementKind::Vertex, KeySet::parse(["name"])?)?;
    let mut a = graph.add_vertex(None)?;
    a.set_property("name", "Peter")?;
    let mut b = graph.add_vertex(None)?;
    b.set_property("name", "Paul")?;
    graph.refresh()?;

    let lookup = |value: &str| -> Result<Vec<ElementId>> {
        index
            .get("name", &Value::from(value))?
            .map_items(|r| r.id())
            .collect()
    };
    assert_eq!(lookup("peter")?, vec![a.id()]);
    assert_eq!(lookup("PETER")?, vec![a.id()]);
    assert!(lookup("pete")?.is_empty());
    assert_eq!(ids(graph.vertices_by("name", &Value::from("paul"))?)?, vec![b.id()]);
    Ok(())
}

#[test]
fn unindexed_key_is_stored_but_not_queryable() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index("people", ElementKind::Vertex, KeySet::parse(["name"])?)?;
    let mut v = graph.add_vertex(None)?;
    v.set_property("nickname", "pete")?;
    assert_eq!(v.property("nickname"), Some(&Value::from("pete")));
    assert!(matches!(
        index.get("nickname", &Value::from("pete")),
        Err(GraphError::KeyNotIndexed { .. })
    ));
    Ok(())
}

#[test]
fn reindexing_on_update_replaces_old_tokens() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index("people", ElementKind::Vertex, KeySet::parse(["name"])?)?;
    let mut v = graph.add_vertex(None)?;
    v.set_property("name", "Peter")?;
    graph.refresh()?;
    v.set_property("name", "Pierre")?;
    graph.refresh()?;
    assert_eq!(index.count("name", &Value::from("peter"))?, 0);
    assert_eq!(index.count("name", &Value::from("pierre"))?, 1);

    v.remove_property("name")?;
    graph.refresh()?;
    assert_eq!(index.count("name", &Value::from("pierre"))?, 0);
    Ok(())
}

#[test]
fn typed_keys_match_by_type() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index(
        "typed",
        ElementKind::Vertex,
        KeySet::parse(["bio,TEXT", "age,LONG", "code,STRING", "born,DATE"])?,
    )?;
    let mut v = graph.add_vertex(None)?;
    v.set_property("bio", "Graph databases, inverted indexes")?;
    v.set_property("age", 42i64)?;
    v.set_property("code", "AbC")?;
    v.set_property("born", Value::Date(1_700_000_000_000))?;
    graph.refresh()?;

    assert_eq!(index.count("bio", &Value::from("inverted"))?, 1);
    assert_eq!(index.count("bio", &Value::from("graph INDEXES"))?, 1);
    assert_eq!(index.count("bio", &Value::from("graph tables"))?, 1);
    assert_eq!(index.count("bio", &Value::from("tables chairs"))?, 0);
    assert_eq!(index.count("age", &Value::Long(42))?, 1);
    assert_eq!(index.count("code", &Value::from("AbC"))?, 1);
    assert_eq!(index.count("code", &Value::from("abc"))?, 0);
    // same minute, different second
    assert_eq!(index.count("born", &Value::Date(1_700_000_010_000))?, 1);
    Ok(())
}

#[test]
fn text_queries_match_any_word() -> Result<()> {
    let graph = quiet_graph()?;
    let index =
        graph.create_automatic_index("bios", ElementKind::Vertex, KeySet::parse(["bio,TEXT"])?)?;
    let mut graphs = graph.add_vertex(Some("graphs"))?;
    graphs.set_property("bio", "Graph databases")?;
    let mut tables = graph.add_vertex(Some("tables"))?;
    tables.set_property("bio", "Relational tables")?;
    let mut other = graph.add_vertex(Some("other"))?;
    other.set_property("bio", "Key value stores")?;
    graph.refresh()?;

    let found: Vec<_> = index
        .get("bio", &Value::from("graph TABLES"))?
        .map(|record| record.map(|r| r.user_id().map(str::to_owned)))
        .collect::<Result<_>>()?;
    assert_eq!(found, vec![Some("graphs".to_owned()), Some("tables".to_owned())]);
    assert_eq!(graph.vertices_by("bio", &Value::from("stores graph"))?.count(), 2);
    Ok(())
}

#[test]
fn one_index_per_kind() -> Result<()> {
    let graph = quiet_graph()?;
    graph.create_automatic_index("v", ElementKind::Vertex, KeySet::All)?;
    graph.create_automatic_index("e", ElementKind::Edge, KeySet::parse(["weight,DOUBLE"])?)?;
    assert!(matches!(
        graph.create_automatic_index("again", ElementKind::Vertex, KeySet::All),
        Err(GraphError::IndexExists(ElementKind::Vertex))
    ));
    assert_eq!(graph.indices().len(), 2);
    assert_eq!(graph.automatic_index("e", ElementKind::Edge)?.kind(), ElementKind::Edge);
    assert!(matches!(
        graph.automatic_index("e", ElementKind::Vertex),
        Err(GraphError::IndexNotFound(_))
    ));
    assert!(graph.drop_index("v"));
    assert!(!graph.drop_index("v"));
    assert_eq!(graph.indices().len(), 1);
    Ok(())
}

#[test]
fn edge_index_finds_edges() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index("weights", ElementKind::Edge, KeySet::parse(["weight,DOUBLE"])?)?;
    let a = graph.add_vertex(None)?;
    let b = graph.add_vertex(None)?;
    let mut e = graph.add_edge(None, &a, &b, "knows")?;
    e.set_property("weight", 0.5f64)?;
    graph.refresh()?;

    let hits: Vec<_> = graph
        .edges_by("weight", &Value::Double(0.5))?
        .collect::<Result<_>>()?;
    assert_eq!(hits, vec![e]);
    assert_eq!(index.count("weight", &Value::Double(0.25))?, 0);
    Ok(())
}

#[test]
fn all_keys_index_types_new_keys_on_first_write() -> Result<()> {
    let graph = quiet_graph()?;
    let index = graph.create_automatic_index("everything", ElementKind::Vertex, KeySet::All)?;
    let mut v = graph.add_vertex(None)?;
    v.set_property("city", "Lisbon")?;
    v.set_property("visits", 3i64)?;
    graph.refresh()?;

    let mapping = graph.schema().mapping(ElementKind::Vertex);
    assert_eq!(mapping.get("city"), Some(SemanticType::StringLowercase));
    assert_eq!(mapping.get("visits"), Some(SemanticType::Long));
    assert_eq!(index.keys(), vec!["city".to_string(), "visits".to_string()]);
    assert_eq!(index.count("city", &Value::from("LISBON"))?, 1);

    let mut w = graph.add_vertex(None)?;
    assert!(matches!(
        w.set_property("visits", "many"),
        Err(GraphError::TypeMismatch { .. })
    ));
    Ok(())
}
