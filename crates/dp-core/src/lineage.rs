//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::collections::HashMap;

use petgraph::algo::{astar, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;

use crate::record::ProvenanceRecord;
use crate::{ProvenanceError, Result};

/// Derivation graph between assets; edges point from parent to child.
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl LineageGraph {
    /// Build the graph from ledger records.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ProvenanceRecord>,
    {
        let mut lineage = Self::default();
        for record in records {
            let child = lineage.node(&record.asset);
            for parent in &record.parents {
                let parent = lineage.node(parent);
                lineage.graph.update_edge(parent, child, ());
            }
        }
        lineage
    }

    fn node(&mut self, asset: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(asset) {
            return *index;
        }
        let index = self.graph.add_node(asset.to_owned());
        self.nodes.insert(asset.to_owned(), index);
        index
    }

    fn index(&self, asset: &str) -> Result<NodeIndex> {
        self.nodes
            .get(asset)
            .copied()
            .ok_or_else(|| ProvenanceError::UnknownAsset(asset.to_owned()))
    }

    /// Number of assets in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// True when no asset is known.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether the asset appears in the graph.
    pub fn contains(&self, asset: &str) -> bool {
        self.nodes.contains_key(asset)
    }

    /// Direct parents, sorted.
    pub fn parents(&self, asset: &str) -> Result<Vec<String>> {
        let index = self.index(asset)?;
        Ok(self.sorted(self.graph.neighbors_directed(index, Direction::Incoming)))
    }

    /// Every asset this one was transitively derived from, sorted.
    pub fn ancestors(&self, asset: &str) -> Result<Vec<String>> {
        let start = self.index(asset)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut found = Vec::new();
        while let Some(index) = dfs.next(reversed) {
            if index != start {
                found.push(index);
            }
        }
        Ok(self.sorted(found))
    }

    /// Every asset transitively derived from this one, sorted.
    pub fn descendants(&self, asset: &str) -> Result<Vec<String>> {
        let start = self.index(asset)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(index) = dfs.next(&self.graph) {
            if index != start {
                found.push(index);
            }
        }
        Ok(self.sorted(found))
    }

    /// Assets without parents, sorted.
    pub fn roots(&self) -> Vec<String> {
        self.sorted(self.graph.node_indices().filter(|index| {
            self.graph
                .neighbors_directed(*index, Direction::Incoming)
                .next()
                .is_none()
        }))
    }

    /// False if the records describe a derivation cycle.
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Shortest derivation chain from `from` to `to`, both inclusive.
    pub fn path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>> {
        let start = self.index(from)?;
        let goal = self.index(to)?;
        Ok(
            astar(&self.graph, start, |node| node == goal, |_| 1u32, |_| 0u32).map(
                |(_, nodes)| {
                    nodes
                        .into_iter()
                        .map(|index| self.graph[index].clone())
                        .collect()
                },
            ),
        )
    }

    fn sorted(&self, indices: impl IntoIterator<Item = NodeIndex>) -> Vec<String> {
        let mut names: Vec<String> = indices
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
