//! Connection Graph
//!
//! Index over a workflow's connections, built once per run. Lookups by
//! source and by target avoid rescanning the edge list on every routing
//! decision.

use std::collections::HashMap;

use super::model::Connection;

/// Directed edges of a workflow, indexed by endpoint.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    connections: Vec<Connection>,
    /// Indices into `connections` by source block id
    outgoing: HashMap<String, Vec<usize>>,
    /// Indices into `connections` by target block id
    incoming: HashMap<String, Vec<usize>>,
}

impl ConnectionGraph {
    /// Builds the index from a list of connections.
    pub fn new(connections: &[Connection]) -> Self {
        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, conn) in connections.iter().enumerate() {
            outgoing.entry(conn.source.clone()).or_default().push(index);
            incoming.entry(conn.target.clone()).or_default().push(index);
        }

        Self {
            connections: connections.to_vec(),
            outgoing,
            incoming,
        }
    }

    /// Edges entering `target`, in definition order.
    pub fn incoming(&self, target: &str) -> impl Iterator<Item = &Connection> {
        self.edges(self.incoming.get(target))
    }

    /// Edges leaving `source`, in definition order.
    pub fn outgoing(&self, source: &str) -> impl Iterator<Item = &Connection> {
        self.edges(self.outgoing.get(source))
    }

    /// Edges leaving `source` through the given handle.
    pub fn outgoing_from_handle<'a>(
        &'a self,
        source: &str,
        handle: &'a str,
    ) -> impl Iterator<Item = &'a Connection> {
        self.outgoing(source).filter(move |c| c.has_source_handle(handle))
    }

    /// Returns true if the block appears on either end of any edge.
    pub fn has_any_connection(&self, block_id: &str) -> bool {
        self.incoming.contains_key(block_id) || self.outgoing.contains_key(block_id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn edges<'a>(&'a self, indices: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Connection> {
        indices
            .into_iter()
            .flatten()
            .map(move |&i| &self.connections[i])
    }
}
