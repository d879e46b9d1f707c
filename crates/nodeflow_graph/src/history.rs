// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history built from invertible commands.
//!
//! Each recorded command carries the data needed to apply it and to
//! reverse it. Commands re-enter the store through its public mutations
//! while `replaying` is set, so replays are never recorded again.

use crate::edge::{EdgeId, EdgeSpec};
use crate::error::{GraphError, Result};
use crate::node::{NodeId, NodeSpec};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum undo history depth
pub const MAX_HISTORY: usize = 100;

/// Unique operation ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A reversible graph mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// A node was created
    CreateNode {
        /// The node as stored
        node: NodeSpec,
    },
    /// A node's position, data or ports changed
    UpdateNode {
        /// State before the update
        before: NodeSpec,
        /// State after the update
        after: NodeSpec,
    },
    /// A node was deleted together with its edges
    DeleteNode {
        /// The deleted node
        node: NodeSpec,
        /// Edges removed by the cascade
        edges: Vec<EdgeSpec>,
    },
    /// An edge was created
    CreateEdge {
        /// The new edge
        edge: EdgeSpec,
        /// Edges removed from single-connection ports to make room
        replaced: Vec<EdgeSpec>,
    },
    /// An edge's payload changed
    UpdateEdge {
        /// State before the update
        before: EdgeSpec,
        /// State after the update
        after: EdgeSpec,
    },
    /// An edge was deleted
    DeleteEdge {
        /// The deleted edge
        edge: EdgeSpec,
    },
    /// Commands undone and redone as one step
    Group {
        /// Human-readable description
        description: String,
        /// Commands in the order they were applied
        commands: Vec<Command>,
    },
}

impl Command {
    /// Human-readable description
    pub fn description(&self) -> String {
        match self {
            Self::CreateNode { node } => format!("Create node {}", node.id),
            Self::UpdateNode { after, .. } => format!("Update node {}", after.id),
            Self::DeleteNode { node, .. } => format!("Delete node {}", node.id),
            Self::CreateEdge { edge, .. } => format!("Create edge {}", edge.id),
            Self::UpdateEdge { after, .. } => format!("Update edge {}", after.id),
            Self::DeleteEdge { edge } => format!("Delete edge {}", edge.id),
            Self::Group { description, .. } => description.clone(),
        }
    }

    /// Perform the command again.
    ///
    /// On error the store is left as it was before the call.
    pub fn apply(&self, store: &mut EntityStore) -> Result<()> {
        match self {
            Self::CreateNode { node } => store.reinsert_node(node).map(drop),
            Self::UpdateNode { after, .. } => store.restore_node(after).map(drop),
            Self::DeleteNode { node, .. } => remove_node(store, &node.id),
            Self::CreateEdge { edge, .. } => store.insert_edge(edge).map(drop),
            Self::UpdateEdge { after, .. } => store.set_edge_data(&after.id, after.data.clone()).map(drop),
            Self::DeleteEdge { edge } => remove_edge(store, &edge.id),
            Self::Group { commands, .. } => {
                for (index, command) in commands.iter().enumerate() {
                    if let Err(err) = command.apply(store) {
                        for done in commands[..index].iter().rev() {
                            roll_back(done.revert(store));
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }

    /// Reverse the command.
    ///
    /// On error the store is left as it was before the call.
    pub fn revert(&self, store: &mut EntityStore) -> Result<()> {
        match self {
            Self::CreateNode { node } => remove_node(store, &node.id),
            Self::UpdateNode { before, .. } => store.restore_node(before).map(drop),
            Self::DeleteNode { node, edges } => {
                store.reinsert_node(node)?;
                for edge in edges {
                    if let Err(err) = store.insert_edge(edge) {
                        // Takes the edges restored so far with it
                        store.delete_node(&node.id);
                        return Err(err);
                    }
                }
                Ok(())
            }
            Self::CreateEdge { edge, replaced } => {
                remove_edge(store, &edge.id)?;
                for (index, old) in replaced.iter().enumerate() {
                    if let Err(err) = store.insert_edge(old) {
                        for restored in &replaced[..index] {
                            store.delete_edge(&restored.id);
                        }
                        roll_back(store.insert_edge(edge).map(drop));
                        return Err(err);
                    }
                }
                Ok(())
            }
            Self::UpdateEdge { before, .. } => store.set_edge_data(&before.id, before.data.clone()).map(drop),
            Self::DeleteEdge { edge } => store.insert_edge(edge).map(drop),
            Self::Group { commands, .. } => {
                for (index, command) in commands.iter().enumerate().rev() {
                    if let Err(err) = command.revert(store) {
                        for done in &commands[index + 1..] {
                            roll_back(done.apply(store));
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }
}

fn roll_back(result: Result<()>) {
    if let Err(err) = result {
        tracing::error!("Rollback after a failed replay step also failed: {err}");
    }
}

fn remove_node(store: &mut EntityStore, id: &NodeId) -> Result<()> {
    if store.delete_node(id) {
        Ok(())
    } else {
        Err(GraphError::invalid_node(
            format!("node {id} no longer exists"),
            json!({ "id": id }),
        ))
    }
}

fn remove_edge(store: &mut EntityStore, id: &EdgeId) -> Result<()> {
    if store.delete_edge(id) {
        Ok(())
    } else {
        Err(GraphError::invalid_edge(
            format!("edge {id} no longer exists"),
            json!({ "id": id }),
        ))
    }
}

/// A recorded undo step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique operation ID
    pub id: OperationId,
    /// Human-readable description
    pub description: String,
    /// What to apply and revert
    pub command: Command,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

impl HistoryEntry {
    fn new(id: OperationId, description: String, command: Command) -> Self {
        Self {
            id,
            description,
            command,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Entries in the undo stack
    pub undo_count: usize,
    /// Entries in the redo stack
    pub redo_count: usize,
    /// Maximum history depth
    pub max_depth: usize,
    /// Commands waiting in an open transaction
    pub pending_commands: usize,
}

#[derive(Debug)]
struct Transaction {
    description: String,
    commands: Vec<Command>,
    depth: usize,
}

/// Undo/redo history manager
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    next_id: u64,
    max_depth: usize,
    replaying: bool,
    transaction: Option<Transaction>,
}

impl History {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            next_id: 1,
            max_depth,
            replaying: false,
            transaction: None,
        }
    }

    /// Record a command that has just been applied.
    ///
    /// Ignored while an undo or redo is running. Inside a transaction the
    /// command joins the open group instead.
    pub fn record(&mut self, command: Command) {
        if self.replaying {
            tracing::trace!("Not recording '{}' during replay", command.description());
            return;
        }
        if let Some(transaction) = &mut self.transaction {
            transaction.commands.push(command);
            return;
        }
        let description = command.description();
        self.push(description, command);
    }

    /// Open a transaction. Nested calls join the outermost one.
    pub fn begin_transaction(&mut self, description: impl Into<String>) {
        match &mut self.transaction {
            Some(transaction) => transaction.depth += 1,
            None => {
                self.transaction = Some(Transaction {
                    description: description.into(),
                    commands: Vec::new(),
                    depth: 1,
                });
            }
        }
    }

    /// Close the innermost transaction.
    ///
    /// When the outermost one closes, its commands become a single undo
    /// step. Returns `true` only if a step was pushed.
    pub fn commit_transaction(&mut self) -> bool {
        let Some(transaction) = &mut self.transaction else {
            tracing::warn!("commit_transaction called without an open transaction");
            return false;
        };
        transaction.depth -= 1;
        if transaction.depth > 0 {
            return false;
        }

        let Some(Transaction {
            description,
            commands,
            ..
        }) = self.transaction.take()
        else {
            return false;
        };
        if commands.is_empty() {
            return false;
        }

        let command = Command::Group {
            description: description.clone(),
            commands,
        };
        self.push(description, command);
        true
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Whether an undo or redo is being applied
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Revert the latest step.
    ///
    /// Returns `false` if there is nothing to undo, a transaction is open,
    /// or the store rejected the reversal. A rejected step stays on the undo
    /// stack.
    pub fn undo(&mut self, store: &mut EntityStore) -> bool {
        if self.in_transaction() {
            tracing::warn!("Undo requested while a transaction is open");
            return false;
        }
        let Some(entry) = self.undo_stack.pop_back() else {
            return false;
        };

        match self.replay(store, |command, store| command.revert(store), &entry) {
            Ok(()) => {
                tracing::debug!("Undid '{}'", entry.description);
                self.redo_stack.push_back(entry);
                true
            }
            Err(err) => {
                tracing::warn!("Undo of '{}' failed: {err}", entry.description);
                self.undo_stack.push_back(entry);
                false
            }
        }
    }

    /// Re-apply the latest undone step.
    ///
    /// Returns `false` if there is nothing to redo, a transaction is open,
    /// or the store rejected it. A rejected step stays on the redo stack.
    pub fn redo(&mut self, store: &mut EntityStore) -> bool {
        if self.in_transaction() {
            tracing::warn!("Redo requested while a transaction is open");
            return false;
        }
        let Some(entry) = self.redo_stack.pop_back() else {
            return false;
        };

        match self.replay(store, |command, store| command.apply(store), &entry) {
            Ok(()) => {
                tracing::debug!("Redid '{}'", entry.description);
                self.undo_stack.push_back(entry);
                true
            }
            Err(err) => {
                tracing::warn!("Redo of '{}' failed: {err}", entry.description);
                self.redo_stack.push_back(entry);
                false
            }
        }
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get undo stack depth
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Maximum number of undo steps kept
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Clear all history, including an open transaction
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.transaction = None;
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            max_depth: self.max_depth,
            pending_commands: self.transaction.as_ref().map_or(0, |t| t.commands.len()),
        }
    }

    /// Get description of next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    fn push(&mut self, description: String, command: Command) {
        let entry = HistoryEntry::new(OperationId(self.next_id), description, command);
        self.next_id += 1;

        self.redo_stack.clear();
        tracing::trace!("Recorded '{}' as operation {}", entry.description, entry.id.value());
        self.undo_stack.push_back(entry);

        // Enforce history limit
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    fn replay<F>(&mut self, store: &mut EntityStore, step: F, entry: &HistoryEntry) -> Result<()>
    where
        F: FnOnce(&Command, &mut EntityStore) -> Result<()>,
    {
        self.replaying = true;
        let result = step(&entry.command, store);
        self.replaying = false;
        result
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortSpec;

    fn node(id: &str) -> NodeSpec {
        NodeSpec::with_id(id, "default")
            .with_port(PortSpec::input("in"))
            .with_port(PortSpec::output("out"))
    }

    fn create(history: &mut History, store: &mut EntityStore, id: &str) {
        let created = store.create_node(node(id)).unwrap();
        history.record(Command::CreateNode {
            node: created.to_spec(),
        });
    }

    #[test]
    fn test_undo_redo_create() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        create(&mut history, &mut store, "a");

        assert_eq!(history.undo_description(), Some("Create node a"));
        assert!(history.undo(&mut store));
        assert_eq!(store.node_count(), 0);
        assert!(history.can_redo());

        assert!(history.redo(&mut store));
        assert!(store.has_node(&NodeId::from("a")));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        assert!(!history.undo(&mut store));
        assert!(!history.redo(&mut store));
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        create(&mut history, &mut store, "a");
        history.undo(&mut store);
        create(&mut history, &mut store, "b");
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_limit() {
        let mut store = EntityStore::new();
        let mut history = History::with_max_depth(2);
        for id in ["a", "b", "c"] {
            create(&mut history, &mut store, id);
        }

        assert_eq!(history.undo_depth(), 2);
        assert!(history.undo(&mut store));
        assert!(history.undo(&mut store));
        assert!(!history.undo(&mut store));
        // The oldest step fell off
        assert!(store.has_node(&NodeId::from("a")));
    }

    #[test]
    fn test_transaction_groups_commands() {
        let mut store = EntityStore::new();
        let mut history = History::new();

        history.begin_transaction("Paste");
        create(&mut history, &mut store, "a");
        history.begin_transaction("inner");
        create(&mut history, &mut store, "b");
        assert!(!history.commit_transaction());
        assert_eq!(history.stats().pending_commands, 2);
        assert!(history.commit_transaction());

        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.undo_description(), Some("Paste"));
        assert!(history.undo(&mut store));
        assert_eq!(store.node_count(), 0);
        assert!(history.redo(&mut store));
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_empty_transaction_is_dropped() {
        let mut history = History::new();
        history.begin_transaction("nothing");
        assert!(!history.commit_transaction());
        assert!(!history.can_undo());
        assert!(!history.commit_transaction());
    }

    #[test]
    fn test_failed_undo_keeps_entry() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        create(&mut history, &mut store, "a");

        // Removed behind the history's back
        store.delete_node(&NodeId::from("a"));
        assert!(!history.undo(&mut store));
        assert!(history.can_undo());
        assert!(!history.can_redo());
        assert!(!history.is_replaying());
    }

    #[test]
    fn test_failed_group_redo_rolls_back() {
        let mut store = EntityStore::new();
        let group = Command::Group {
            description: "Paste".into(),
            commands: vec![
                Command::CreateNode { node: node("a") },
                Command::CreateNode { node: node("b") },
            ],
        };
        store.create_node(node("b")).unwrap();

        assert!(group.apply(&mut store).is_err());
        assert!(!store.has_node(&NodeId::from("a")));
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_failed_node_restore_removes_node_again() {
        let mut store = EntityStore::new();
        let command = Command::DeleteNode {
            node: node("a"),
            edges: vec![EdgeSpec::with_id("e1", "a", "out", "c", "in")],
        };

        assert!(command.revert(&mut store).is_err());
        assert!(!store.has_node(&NodeId::from("a")));

        store.create_node(node("c")).unwrap();
        command.revert(&mut store).unwrap();
        assert!(store.has_edge(&EdgeId::from("e1")));
    }

    #[test]
    fn test_failed_edge_restore_keeps_new_edge() {
        let mut store = EntityStore::new();
        store.create_node(node("a")).unwrap();
        store.create_node(node("b")).unwrap();
        let edge = EdgeSpec::with_id("e2", "a", "out", "b", "in");
        store.create_edge(edge.clone()).unwrap();

        let command = Command::CreateEdge {
            edge,
            replaced: vec![EdgeSpec::with_id("e1", "c", "out", "b", "in")],
        };
        assert!(command.revert(&mut store).is_err());
        assert!(store.has_edge(&EdgeId::from("e2")));
        assert!(!store.has_edge(&EdgeId::from("e1")));
    }

    #[test]
    fn test_replay_is_not_recorded() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        create(&mut history, &mut store, "a");

        history.undo(&mut store);
        assert_eq!(history.stats().undo_count, 0);
        assert_eq!(history.stats().redo_count, 1);
    }

    #[test]
    fn test_clear() {
        let mut store = EntityStore::new();
        let mut history = History::new();
        create(&mut history, &mut store, "a");
        history.begin_transaction("open");
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.in_transaction());
        assert_eq!(history.stats(), HistoryStats {
            undo_count: 0,
            redo_count: 0,
            max_depth: MAX_HISTORY,
            pending_commands: 0,
        });
    }
}
