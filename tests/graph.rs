//! Graph model validation and persistence.

mod common;

use anyhow::Result;
use common::{broadcast, one_to_one, scatter_gather, vertex};
use dagflow::model::{
    DataType, Direction, EdgeDescriptor, EdgeKind, GRAPH_INFO_PATH, Group, GraphInfo, SerDeProvider, SortTerm,
    SupplierRef, graph_path,
};
use dagflow::DagError;
use std::fs;

fn diamond() -> Result<GraphInfo> {
    let mut g = GraphInfo::new();
    let a = vertex(&mut g, "a")?;
    let b = vertex(&mut g, "b")?;
    let c = vertex(&mut g, "c")?;
    let d = vertex(&mut g, "d")?;
    g.add_edge((a, "out"), (b, "in"), one_to_one("line")?)?;
    g.add_edge((a, "out"), (c, "in"), scatter_gather("by-key", Some("by-amount"))?)?;
    g.add_edge((b, "out"), (d, "left"), broadcast("line")?)?;
    g.add_edge((c, "out"), (d, "right"), one_to_one("line")?)?;
    Ok(g)
}

#[test]
fn diamond_orders_sources_first() -> Result<()> {
    let g = diamond()?;
    g.validate()?;
    let names: Vec<String> = g.topological_order()?.into_iter().map(|id| g.vertex_name(id)).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert_eq!(g.vertices()[0].outputs(), ["out".to_string()]);
    assert_eq!(g.vertices()[3].inputs(), ["left".to_string(), "right".to_string()]);
    assert_eq!(g.edge_label(1), "a.out -> c.in");
    Ok(())
}

#[test]
fn cycle_is_a_configuration_error() -> Result<()> {
    let mut g = GraphInfo::new();
    let a = vertex(&mut g, "a")?;
    let b = vertex(&mut g, "b")?;
    let c = vertex(&mut g, "c")?;
    g.add_edge((a, "out"), (b, "in"), one_to_one("line")?)?;
    g.add_edge((b, "out"), (c, "in"), one_to_one("line")?)?;
    g.add_edge((c, "out"), (b, "back"), EdgeDescriptor::nothing())?;
    let err = g.validate().unwrap_err();
    assert!(DagError::is_configuration(&err));
    assert!(err.to_string().contains("cycle"), "{err}");
    Ok(())
}

#[test]
fn input_port_accepts_one_edge() -> Result<()> {
    let mut g = GraphInfo::new();
    let a = vertex(&mut g, "a")?;
    let b = vertex(&mut g, "b")?;
    let c = vertex(&mut g, "c")?;
    g.add_edge((a, "out"), (c, "in"), one_to_one("line")?)?;
    g.add_edge((b, "out"), (c, "in"), one_to_one("line")?)?;
    let err = g.validate().unwrap_err();
    assert!(DagError::is_configuration(&err));
    assert!(err.to_string().contains("c.in"), "{err}");
    Ok(())
}

#[test]
fn duplicate_vertex_names_are_rejected() -> Result<()> {
    let mut g = GraphInfo::new();
    vertex(&mut g, "same")?;
    vertex(&mut g, "same")?;
    assert!(DagError::is_configuration(&g.validate().unwrap_err()));
    Ok(())
}

#[test]
fn output_port_cannot_mix_nothing_and_data() -> Result<()> {
    let mut g = GraphInfo::new();
    let a = vertex(&mut g, "a")?;
    let b = vertex(&mut g, "b")?;
    let c = vertex(&mut g, "c")?;
    g.add_edge((a, "out"), (b, "in"), one_to_one("line")?)?;
    g.add_edge((a, "out"), (c, "in"), EdgeDescriptor::nothing())?;
    assert!(DagError::is_configuration(&g.validate().unwrap_err()));
    Ok(())
}

#[test]
fn blank_names_are_rejected_at_construction() {
    assert!(DagError::is_configuration(&SupplierRef::new("  ").unwrap_err()));
    assert!(DagError::is_configuration(&DataType::new("").unwrap_err()));
}

#[test]
fn edge_to_unknown_vertex_is_rejected() -> Result<()> {
    let mut other = GraphInfo::new();
    vertex(&mut other, "x")?;
    let ghost = vertex(&mut other, "ghost")?;

    let mut g = GraphInfo::new();
    let a = vertex(&mut g, "a")?;
    let err = g.add_edge((a, "out"), (ghost, "in"), EdgeDescriptor::nothing()).unwrap_err();
    assert!(DagError::is_configuration(&err));
    Ok(())
}

#[test]
fn save_and_load_through_application_root() -> Result<()> {
    let root = tempfile::tempdir()?;
    let g = diamond()?;
    let path = graph_path(root.path());
    assert!(path.ends_with(GRAPH_INFO_PATH));
    g.save(&path)?;
    assert_eq!(GraphInfo::load(&path)?, g);
    Ok(())
}

#[test]
fn corrupted_payload_fails_the_checksum() -> Result<()> {
    let mut bytes = diamond()?.to_bytes()?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let err = GraphInfo::from_bytes(&bytes).unwrap_err();
    assert!(DagError::is_configuration(&err));
    assert!(err.to_string().contains("checksum"), "{err}");
    Ok(())
}

#[test]
fn bad_header_is_rejected() -> Result<()> {
    let bytes = diamond()?.to_bytes()?;
    assert!(bytes.starts_with(b"DAGF"));

    let mut wrong_magic = bytes.clone();
    wrong_magic[0] = b'X';
    assert!(DagError::is_configuration(&GraphInfo::from_bytes(&wrong_magic).unwrap_err()));

    let mut wrong_version = bytes.clone();
    wrong_version[5] = 99;
    let err = GraphInfo::from_bytes(&wrong_version).unwrap_err();
    assert!(err.to_string().contains("version"), "{err}");

    assert!(DagError::is_configuration(&GraphInfo::from_bytes(&bytes[..20]).unwrap_err()));
    Ok(())
}

#[test]
fn missing_graph_file_names_the_path() {
    let err = GraphInfo::load("/nonexistent/dagflow/graph.bin").unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/dagflow/graph.bin"));
}

#[test]
fn display_lists_vertices_and_edge_kinds() -> Result<()> {
    let text = diamond()?.to_string();
    assert!(text.contains("Vertices:      4"), "{text}");
    assert!(text.contains("SCATTER_GATHER"), "{text}");
    assert!(text.contains("4: d [d]"), "{text}");
    assert!(text.contains("<- right ONE_TO_ONE (c.out)"), "{text}");
    Ok(())
}

#[test]
fn group_notation_parses_keys_and_directions() -> Result<()> {
    let g = Group::parse(&["=shop", "=day", "+amount", "-id"])?;
    assert_eq!(g.keys, vec!["shop".to_string(), "day".to_string()]);
    assert_eq!(g.ordering, vec![SortTerm::asc("amount"), SortTerm::desc("id")]);
    assert_eq!(g.ordering[1].direction, Direction::Descending);
    assert!(DagError::is_configuration(&Group::parse(&["*x"]).unwrap_err()));
    assert!(DagError::is_configuration(&Group::parse(&["+"]).unwrap_err()));
    Ok(())
}

struct Generated;

impl SerDeProvider for Generated {
    fn value_serde(&self, data_type: &DataType) -> Result<SupplierRef> {
        SupplierRef::new(format!("{data_type}.value"))
    }

    fn key_value_serde(&self, data_type: &DataType, group: &Group) -> Result<SupplierRef> {
        SupplierRef::new(format!("{data_type}.kv[{}]", group.keys.join(",")))
    }

    fn comparator(&self, data_type: &DataType, group: &Group) -> Result<SupplierRef> {
        SupplierRef::new(format!("{data_type}.cmp[{}]", group.ordering.len()))
    }
}

#[test]
fn provider_supplies_codec_names() -> Result<()> {
    let sale = DataType::new("Sale")?;
    let unordered = EdgeDescriptor::scatter_gather_for(&Generated, sale.clone(), &Group::parse(&["=shop"])?)?;
    assert_eq!(
        unordered,
        EdgeDescriptor::scatter_gather(sale.clone(), SupplierRef::new("Sale.kv[shop]")?, None)
    );

    let ordered = EdgeDescriptor::scatter_gather_for(&Generated, sale.clone(), &Group::parse(&["=shop", "-amount"])?)?;
    let EdgeDescriptor::ScatterGather { comparator, .. } = &ordered else {
        panic!("expected a scatter-gather edge");
    };
    assert_eq!(comparator.as_ref().map(SupplierRef::name), Some("Sale.cmp[1]"));

    let edge = EdgeDescriptor::broadcast_for(&Generated, sale.clone())?;
    assert_eq!(edge.kind(), EdgeKind::Broadcast);
    assert_eq!(edge.data_type(), Some(&sale));
    assert_eq!(EdgeDescriptor::nothing().data_type(), None);
    Ok(())
}
