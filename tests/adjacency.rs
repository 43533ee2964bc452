mod common;

use common::{open_graph, quiet_options};
use lucent::{AdjacencyStrategy, Direction, Edge, Graph, Result};

fn graph(strategy: AdjacencyStrategy) -> Result<Graph> {
    open_graph(quiet_options().adjacency(strategy))
}

fn collect<I: Iterator<Item = Result<Edge>>>(edges: I) -> Result<Vec<Edge>> {
    edges.collect()
}

fn edge_is_traversable_both_ways(strategy: AdjacencyStrategy) -> Result<()> {
    let graph = graph(strategy)?;
    let v1 = graph.add_vertex(Some("v1"))?;
    let v2 = graph.add_vertex(Some("v2"))?;
    let e = graph.add_edge(None, &v1, &v2, "knows")?;
    graph.refresh()?;

    let out = collect(v1.out_edges(&[])?)?;
    assert_eq!(out, vec![e.clone()]);
    assert_eq!(out[0].label(), "knows");
    assert_eq!(collect(v2.in_edges(&[])?)?, vec![e.clone()]);
    assert!(collect(v1.in_edges(&[])?)?.is_empty());
    assert_eq!(e.out_vertex()?, v1);
    assert_eq!(e.in_vertex()?, v2);

    graph.remove_edge(&e)?;
    graph.refresh()?;
    assert!(collect(v1.out_edges(&[])?)?.is_empty());
    assert!(collect(v2.in_edges(&[])?)?.is_empty());
    assert!(graph.edge_by_id(e.id())?.is_none());
    Ok(())
}

#[test]
fn filter_strategy_tracks_edges() -> Result<()> {
    edge_is_traversable_both_ways(AdjacencyStrategy::Filter)
}

#[test]
fn id_list_strategy_tracks_edges() -> Result<()> {
    edge_is_traversable_both_ways(AdjacencyStrategy::IdList)
}

#[test]
fn label_sets_restrict_traversal() -> Result<()> {
    let graph = graph(AdjacencyStrategy::Filter)?;
    let hub = graph.add_vertex(None)?;
    let mut expected = Vec::new();
    for label in ["knows", "likes", "hates", "knows"] {
        let other = graph.add_vertex(None)?;
        let e = graph.add_edge(None, &hub, &other, label)?;
        if label != "hates" {
            expected.push(e);
        }
    }
    graph.refresh()?;

    let filtered = collect(hub.edges(Direction::Out, &["knows", "likes"]))?;
    assert_eq!(filtered, expected);
    let listed = collect(hub.adjacent_edges(Direction::Out, &["knows", "likes"])?)?;
    assert_eq!(listed, expected);
    assert_eq!(collect(hub.edges(Direction::Out, &[]))?.len(), 4);
    assert!(collect(hub.edges(Direction::Out, &["unknown"]))?.is_empty());
    Ok(())
}

#[test]
fn id_lists_see_unflushed_edges() -> Result<()> {
    let graph = graph(AdjacencyStrategy::IdList)?;
    let a = graph.add_vertex(None)?;
    let b = graph.add_vertex(None)?;
    let e = graph.add_edge(None, &a, &b, "knows")?;
    assert_eq!(collect(a.out_edges(&[])?)?, vec![e]);
    // the filter path only sees searchable edges
    assert!(collect(a.edges(Direction::Out, &[]))?.is_empty());
    Ok(())
}

#[test]
fn removing_a_vertex_removes_incident_edges() -> Result<()> {
    let graph = graph(AdjacencyStrategy::Filter)?;
    let a = graph.add_vertex(None)?;
    let b = graph.add_vertex(None)?;
    let c = graph.add_vertex(None)?;
    let ab = graph.add_edge(None, &a, &b, "x")?;
    let cb = graph.add_edge(None, &c, &b, "y")?;
    let ba = graph.add_edge(None, &b, &a, "z")?;
    graph.refresh()?;

    graph.remove_vertex(&b)?;
    graph.refresh()?;
    for e in [&ab, &cb, &ba] {
        assert!(graph.edge_by_id(e.id())?.is_none());
    }
    assert!(graph.vertex_by_id(b.id())?.is_none());
    let a = graph.vertex_by_id(a.id())?.unwrap();
    assert!(a.record().edges(Direction::Out).is_empty());
    assert!(a.record().edges(Direction::In).is_empty());
    assert!(collect(c.out_edges(&[])?)?.is_empty());
    assert_eq!(graph.edges().count(), 0);
    assert_eq!(graph.vertices().count(), 2);
    Ok(())
}

#[test]
fn incident_sequences_release_searchers() -> Result<()> {
    let graph = graph(AdjacencyStrategy::Filter)?;
    let a = graph.add_vertex(None)?;
    for _ in 0..3 {
        let b = graph.add_vertex(None)?;
        graph.add_edge(None, &a, &b, "x")?;
    }
    graph.refresh()?;
    let mut edges = a.out_edges(&[])?;
    assert!(edges.next().is_some());
    assert_eq!(graph.stats().open_searchers, 1);
    edges.close();
    assert_eq!(graph.stats().open_searchers, 0);
    Ok(())
}

#[test]
fn removing_a_vertex_from_a_scan_removes_incident_edges() -> Result<()> {
    let graph = graph(AdjacencyStrategy::IdList)?;
    let a = graph.add_vertex(Some("a"))?;
    let b = graph.add_vertex(Some("b"))?;
    let ab = graph.add_edge(None, &a, &b, "knows")?;
    graph.refresh()?;

    let mut seq = graph.vertices();
    while let Some(v) = seq.next().transpose()? {
        if v.id() == b.id() {
            seq.remove_current()?;
        }
    }
    graph.refresh()?;

    assert!(graph.vertex("b")?.is_none());
    assert!(graph.edge_by_id(ab.id())?.is_none());
    let a = graph.vertex("a")?.unwrap();
    assert!(a.record().edges(Direction::Out).is_empty());
    assert!(collect(a.out_edges(&[])?)?.is_empty());
    assert_eq!(graph.edges().count(), 0);
    Ok(())
}

#[test]
fn removing_an_edge_from_a_scan_unlinks_endpoints() -> Result<()> {
    let graph = graph(AdjacencyStrategy::IdList)?;
    let a = graph.add_vertex(None)?;
    let b = graph.add_vertex(None)?;
    let c = graph.add_vertex(None)?;
    graph.add_edge(None, &a, &b, "x")?;
    let ac = graph.add_edge(None, &a, &c, "y")?;
    graph.refresh()?;

    let mut all = graph.edges();
    let first = all.next().transpose()?.unwrap();
    all.remove_current()?;
    all.close();
    let mut incident = a.edges(Direction::Out, &["y"]);
    assert_eq!(incident.next().transpose()?.map(|e| e.id()), Some(ac.id()));
    incident.remove_current()?;
    incident.close();
    graph.refresh()?;

    assert!(graph.edge_by_id(first.id())?.is_none());
    assert!(graph.edge_by_id(ac.id())?.is_none());
    let a = graph.vertex_by_id(a.id())?.unwrap();
    assert!(a.record().edges(Direction::Out).is_empty());
    for v in [&b, &c] {
        let v = graph.vertex_by_id(v.id())?.unwrap();
        assert!(v.record().edges(Direction::In).is_empty());
        assert!(collect(v.in_edges(&[])?)?.is_empty());
    }
    Ok(())
}
