use super::descriptor::VertexDescriptor;
use super::edge::{EdgeDescriptor, EdgeKind};
use crate::error::DagError;
use crate::vertex_id::VertexId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// A named port on a vertex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub vertex: VertexId,
    pub name: String,
}

/// A vertex of the graph: its processor descriptor and declared ports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexInfo {
    id: VertexId,
    name: String,
    descriptor: VertexDescriptor,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl VertexInfo {
    #[must_use]
    pub fn id(&self) -> VertexId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &VertexDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

/// An edge binding a source output port to a destination input port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub source: Port,
    pub destination: Port,
    pub descriptor: EdgeDescriptor,
}

/// The execution graph: vertices plus typed edges between their ports.
///
/// ```
/// use dagflow::model::{DataType, EdgeDescriptor, GraphInfo, SupplierRef, VertexDescriptor};
///
/// # fn main() -> anyhow::Result<()> {
/// let mut g = GraphInfo::new();
/// let a = g.add_vertex("a", VertexDescriptor::of("source")?);
/// let b = g.add_vertex("b", VertexDescriptor::of("sink")?);
/// g.add_edge(
///     (a, "out"),
///     (b, "in"),
///     EdgeDescriptor::one_to_one(DataType::new("Line")?, SupplierRef::new("line.ser")?),
/// )?;
/// assert_eq!(g.topological_order()?, vec![a, b]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    vertices: Vec<VertexInfo>,
    edges: Vec<EdgeInfo>,
}

impl GraphInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex. Names must be unique; this is checked by [`validate`](Self::validate).
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_vertex(&mut self, name: impl Into<String>, descriptor: VertexDescriptor) -> VertexId {
        let id = VertexId::new(self.vertices.len() as u32);
        self.vertices.push(VertexInfo {
            id,
            name: name.into(),
            descriptor,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        id
    }

    /// Connect `source` output port to `destination` input port. Ports are
    /// declared on first use.
    ///
    /// # Errors
    /// Configuration error if either vertex is unknown.
    pub fn add_edge(
        &mut self,
        source: (VertexId, &str),
        destination: (VertexId, &str),
        descriptor: EdgeDescriptor,
    ) -> Result<()> {
        for (id, _) in [source, destination] {
            if self.vertices.get(id.index()).is_none() {
                return Err(DagError::config(format!("unknown vertex {id:?}")));
            }
        }
        let out = &mut self.vertices[source.0.index()].outputs;
        if !out.iter().any(|p| p == source.1) {
            out.push(source.1.to_string());
        }
        let inp = &mut self.vertices[destination.0.index()].inputs;
        if !inp.iter().any(|p| p == destination.1) {
            inp.push(destination.1.to_string());
        }
        self.edges.push(EdgeInfo {
            source: Port {
                vertex: source.0,
                name: source.1.to_string(),
            },
            destination: Port {
                vertex: destination.0,
                name: destination.1.to_string(),
            },
            descriptor,
        });
        Ok(())
    }

    #[must_use]
    pub fn vertices(&self) -> &[VertexInfo] {
        &self.vertices
    }

    #[must_use]
    pub fn edges(&self) -> &[EdgeInfo] {
        &self.edges
    }

    #[must_use]
    pub fn vertex(&self, id: VertexId) -> Option<&VertexInfo> {
        self.vertices.get(id.index())
    }

    /// Vertex name for diagnostics; falls back to the raw id.
    #[must_use]
    pub fn vertex_name(&self, id: VertexId) -> String {
        self.vertex(id)
            .map_or_else(|| format!("#{}", id.raw()), |v| v.name.clone())
    }

    /// Indices (into [`edges`](Self::edges)) of edges entering `id`.
    pub fn input_edges(&self, id: VertexId) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.destination.vertex == id)
            .map(|(i, _)| i)
    }

    /// Indices (into [`edges`](Self::edges)) of edges leaving `id`.
    pub fn output_edges(&self, id: VertexId) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.source.vertex == id)
            .map(|(i, _)| i)
    }

    /// Label used in diagnostics, e.g. `a.out -> b.in`.
    #[must_use]
    pub fn edge_label(&self, index: usize) -> String {
        self.edges.get(index).map_or_else(
            || format!("edge #{index}"),
            |e| {
                format!(
                    "{}.{} -> {}.{}",
                    self.vertex_name(e.source.vertex),
                    e.source.name,
                    self.vertex_name(e.destination.vertex),
                    e.destination.name
                )
            },
        )
    }

    /// Check structural invariants: unique non-blank vertex names, edges
    /// between declared ports, one edge per input port, homogeneous output
    /// ports, and acyclicity.
    ///
    /// # Errors
    /// Configuration error naming the offending vertex or edge.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (i, v) in self.vertices.iter().enumerate() {
            if v.id.index() != i {
                return Err(DagError::config(format!("vertex '{}' has inconsistent id", v.name)));
            }
            if v.name.trim().is_empty() {
                return Err(DagError::config(format!("vertex #{i} has a blank name")));
            }
            if !names.insert(v.name.as_str()) {
                return Err(DagError::config(format!("duplicate vertex name '{}'", v.name)));
            }
        }

        let mut bound_inputs: HashMap<(VertexId, &str), usize> = HashMap::new();
        let mut output_kinds: HashMap<(VertexId, &str), bool> = HashMap::new();
        for (i, e) in self.edges.iter().enumerate() {
            let (Some(src), Some(dst)) = (self.vertex(e.source.vertex), self.vertex(e.destination.vertex))
            else {
                return Err(DagError::config(format!("{} refers to an unknown vertex", self.edge_label(i))));
            };
            if !src.outputs.contains(&e.source.name) || !dst.inputs.contains(&e.destination.name) {
                return Err(DagError::config(format!(
                    "{} refers to an undeclared port",
                    self.edge_label(i)
                )));
            }
            if let Some(prev) = bound_inputs.insert((dst.id, e.destination.name.as_str()), i) {
                return Err(DagError::config(format!(
                    "input port {}.{} is bound by both '{}' and '{}'",
                    dst.name,
                    e.destination.name,
                    self.edge_label(prev),
                    self.edge_label(i)
                )));
            }
            let carries_data = e.descriptor.kind() != EdgeKind::Nothing;
            if let Some(prev) = output_kinds.insert((src.id, e.source.name.as_str()), carries_data)
                && prev != carries_data
            {
                return Err(DagError::config(format!(
                    "output port {}.{} mixes NOTHING edges with data edges",
                    src.name, e.source.name
                )));
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Vertices ordered so every vertex follows all of its upstream vertices.
    /// Ties are broken by vertex id, so the order is deterministic.
    ///
    /// # Errors
    /// Configuration error listing the vertices left on a cycle.
    pub fn topological_order(&self) -> Result<Vec<VertexId>> {
        let n = self.vertices.len();
        let mut indegree = vec![0usize; n];
        let mut downstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for e in &self.edges {
            let (s, d) = (e.source.vertex.index(), e.destination.vertex.index());
            if s >= n || d >= n {
                return Err(DagError::config("edge refers to an unknown vertex"));
            }
            if downstream[s].insert(d) {
                indegree[d] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_front() {
            order.push(self.vertices[i].id);
            for &d in &downstream[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push_back(d);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.vertices[i].name.as_str())
                .collect();
            return Err(DagError::config(format!(
                "graph contains a cycle through vertices {stuck:?}"
            )));
        }
        Ok(order)
    }

    /// Distinct upstream vertices of `id`.
    #[must_use]
    pub fn upstream(&self, id: VertexId) -> BTreeSet<VertexId> {
        self.edges
            .iter()
            .filter(|e| e.destination.vertex == id)
            .map(|e| e.source.vertex)
            .collect()
    }
}

impl Display for GraphInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "┌─ GRAPH ──────────────────────────────────────────────────────┐"
        )?;
        writeln!(f, "│ Vertices: {:>6}", self.vertices.len())?;
        writeln!(f, "│ Edges:    {:>6}", self.edges.len())?;
        let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
        for e in &self.edges {
            *kinds.entry(e.descriptor.kind().to_string()).or_default() += 1;
        }
        for (kind, count) in &kinds {
            writeln!(f, "│   {kind:<16}{count:>6}")?;
        }
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;

        let order = self
            .topological_order()
            .unwrap_or_else(|_| self.vertices.iter().map(|v| v.id).collect());
        writeln!(
            f,
            "┌─ VERTICES ───────────────────────────────────────────────────┐"
        )?;
        for (step, id) in order.iter().enumerate() {
            let v = &self.vertices[id.index()];
            writeln!(f, "│")?;
            writeln!(f, "│ {}: {} [{}]", step + 1, v.name, v.descriptor.processor())?;
            for i in self.input_edges(*id) {
                let e = &self.edges[i];
                writeln!(
                    f,
                    "│   <- {} {} ({}.{})",
                    e.destination.name,
                    e.descriptor.kind(),
                    self.vertex_name(e.source.vertex),
                    e.source.name
                )?;
            }
        }
        writeln!(f, "│")?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vd() -> VertexDescriptor {
        VertexDescriptor::of("p").unwrap()
    }

    #[test]
    fn topological_order_is_stable() {
        let mut g = GraphInfo::new();
        let a = g.add_vertex("a", vd());
        let b = g.add_vertex("b", vd());
        let c = g.add_vertex("c", vd());
        g.add_edge((c, "out"), (a, "in"), EdgeDescriptor::Nothing).unwrap();
        g.add_edge((b, "out"), (a, "in2"), EdgeDescriptor::Nothing).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![b, c, a]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = GraphInfo::new();
        let a = g.add_vertex("a", vd());
        g.add_edge((a, "out"), (a, "in"), EdgeDescriptor::Nothing).unwrap();
        assert!(DagError::is_configuration(&g.validate().unwrap_err()));
    }
}
