// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mutation notifications for renderers and other collaborators.
//!
//! Delivery is synchronous and in registration order. A panicking listener
//! is caught and logged; the remaining listeners still receive the event.

use crate::edge::{Edge, EdgeId};
use crate::node::{Node, NodeId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Default number of retained events
pub const DEFAULT_EVENT_HISTORY: usize = 1000;

/// Default listener count per event type before a warning is logged
pub const DEFAULT_MAX_LISTENERS: usize = 100;

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// `node:created`
    NodeCreated,
    /// `node:updated`
    NodeUpdated,
    /// `node:deleted`
    NodeDeleted,
    /// `node:selected`
    NodeSelected,
    /// `node:deselected`
    NodeDeselected,
    /// `edge:created`
    EdgeCreated,
    /// `edge:updated`
    EdgeUpdated,
    /// `edge:deleted`
    EdgeDeleted,
    /// `edge:selected`
    EdgeSelected,
    /// `edge:deselected`
    EdgeDeselected,
}

impl EventType {
    /// Wire name, e.g. `node:created`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NodeCreated => "node:created",
            Self::NodeUpdated => "node:updated",
            Self::NodeDeleted => "node:deleted",
            Self::NodeSelected => "node:selected",
            Self::NodeDeselected => "node:deselected",
            Self::EdgeCreated => "edge:created",
            Self::EdgeUpdated => "edge:updated",
            Self::EdgeDeleted => "edge:deleted",
            Self::EdgeSelected => "edge:selected",
            Self::EdgeDeselected => "edge:deselected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph mutation notification.
///
/// Entities are cloned at emit time; for deletions this is the last state
/// the entity had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// A node was created
    NodeCreated {
        /// The stored node
        node: Node,
    },
    /// A node changed
    NodeUpdated {
        /// State after the update
        node: Node,
        /// State before the update
        previous: Node,
    },
    /// A node was removed
    NodeDeleted {
        /// The removed node
        node: Node,
    },
    /// A node joined the selection
    NodeSelected {
        /// The node
        node: Node,
    },
    /// A node left the selection
    NodeDeselected {
        /// The node
        node: Node,
    },
    /// An edge was created
    EdgeCreated {
        /// The stored edge
        edge: Edge,
    },
    /// An edge's payload changed
    EdgeUpdated {
        /// State after the update
        edge: Edge,
        /// State before the update
        previous: Edge,
    },
    /// An edge was removed
    EdgeDeleted {
        /// The removed edge
        edge: Edge,
    },
    /// An edge joined the selection
    EdgeSelected {
        /// The edge
        edge: Edge,
    },
    /// An edge left the selection
    EdgeDeselected {
        /// The edge
        edge: Edge,
    },
}

impl GraphEvent {
    /// Kind of this event
    pub fn event_type(&self) -> EventType {
        match self {
            Self::NodeCreated { .. } => EventType::NodeCreated,
            Self::NodeUpdated { .. } => EventType::NodeUpdated,
            Self::NodeDeleted { .. } => EventType::NodeDeleted,
            Self::NodeSelected { .. } => EventType::NodeSelected,
            Self::NodeDeselected { .. } => EventType::NodeDeselected,
            Self::EdgeCreated { .. } => EventType::EdgeCreated,
            Self::EdgeUpdated { .. } => EventType::EdgeUpdated,
            Self::EdgeDeleted { .. } => EventType::EdgeDeleted,
            Self::EdgeSelected { .. } => EventType::EdgeSelected,
            Self::EdgeDeselected { .. } => EventType::EdgeDeselected,
        }
    }

    /// Affected node, for node events
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeCreated { node }
            | Self::NodeUpdated { node, .. }
            | Self::NodeDeleted { node }
            | Self::NodeSelected { node }
            | Self::NodeDeselected { node } => Some(&node.id),
            _ => None,
        }
    }

    /// Affected edge, for edge events
    pub fn edge_id(&self) -> Option<&EdgeId> {
        match self {
            Self::EdgeCreated { edge }
            | Self::EdgeUpdated { edge, .. }
            | Self::EdgeDeleted { edge }
            | Self::EdgeSelected { edge }
            | Self::EdgeDeselected { edge } => Some(&edge.id),
            _ => None,
        }
    }
}

/// An event as kept in the diagnostic history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Monotonic emit counter
    pub sequence: u64,
    /// The event
    pub event: GraphEvent,
}

/// Handle returned by [`EventRegistry::on`], used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&GraphEvent)>;

struct ListenerEntry {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

/// Publish/subscribe registry for [`GraphEvent`]s
pub struct EventRegistry {
    listeners: IndexMap<EventType, Vec<ListenerEntry>>,
    history: VecDeque<RecordedEvent>,
    history_capacity: usize,
    max_listeners: usize,
    warned: HashSet<EventType>,
    next_listener: u64,
    next_sequence: u64,
}

impl EventRegistry {
    /// Create a registry with default limits
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_EVENT_HISTORY, DEFAULT_MAX_LISTENERS)
    }

    /// Create a registry with custom history capacity and listener warning threshold
    pub fn with_limits(history_capacity: usize, max_listeners: usize) -> Self {
        Self {
            listeners: IndexMap::new(),
            history: VecDeque::new(),
            history_capacity,
            max_listeners,
            warned: HashSet::new(),
            next_listener: 1,
            next_sequence: 1,
        }
    }

    /// Register a listener for every future event of `event_type`
    pub fn on<F>(&mut self, event_type: EventType, listener: F) -> ListenerId
    where
        F: FnMut(&GraphEvent) + 'static,
    {
        self.add(event_type, false, Box::new(listener))
    }

    /// Register a listener for the next event of `event_type` only
    pub fn once<F>(&mut self, event_type: EventType, listener: F) -> ListenerId
    where
        F: FnMut(&GraphEvent) + 'static,
    {
        self.add(event_type, true, Box::new(listener))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&mut self, event_type: EventType, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Remove every listener of one type, or of all types
    pub fn remove_all_listeners(&mut self, event_type: Option<EventType>) {
        match event_type {
            Some(event_type) => {
                self.listeners.shift_remove(&event_type);
                self.warned.remove(&event_type);
            }
            None => {
                self.listeners.clear();
                self.warned.clear();
            }
        }
    }

    /// Number of listeners for a type
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners.get(&event_type).map_or(0, Vec::len)
    }

    /// Deliver an event. Returns whether at least one listener received it.
    pub fn emit(&mut self, event: GraphEvent) -> bool {
        let event_type = event.event_type();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut delivered = false;
        if let Some(entries) = self.listeners.get_mut(&event_type) {
            // Detach the whole list so `once` entries are gone before their
            // callback runs.
            let pending = std::mem::take(entries);
            let mut kept = Vec::with_capacity(pending.len());

            for mut entry in pending {
                delivered = true;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&event)));
                if let Err(payload) = outcome {
                    tracing::error!(
                        "Listener {:?} for {event_type} panicked: {}",
                        entry.id,
                        panic_message(payload.as_ref())
                    );
                }
                if !entry.once {
                    kept.push(entry);
                }
            }

            if let Some(entries) = self.listeners.get_mut(&event_type) {
                *entries = kept;
            }
        }

        tracing::trace!("Emitted {event_type} (#{sequence}, delivered: {delivered})");
        self.record(sequence, event);
        delivered
    }

    /// Retained events, oldest first, optionally filtered by type
    pub fn event_history(&self, filter: Option<EventType>) -> Vec<&RecordedEvent> {
        self.history
            .iter()
            .filter(|recorded| filter.map_or(true, |t| recorded.event.event_type() == t))
            .collect()
    }

    /// Drop all retained events
    pub fn clear_event_history(&mut self) {
        self.history.clear();
    }

    /// Capacity of the event history ring
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    fn add(&mut self, event_type: EventType, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;

        let entries = self.listeners.entry(event_type).or_default();
        entries.push(ListenerEntry { id, once, callback });

        if entries.len() > self.max_listeners && self.warned.insert(event_type) {
            tracing::warn!(
                "{} listeners registered for {event_type}, exceeding the limit of {}; this may indicate a leak",
                entries.len(),
                self.max_listeners
            );
        }

        id
    }

    fn record(&mut self, sequence: u64, event: GraphEvent) {
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(RecordedEvent { sequence, event });
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<_> = self
            .listeners
            .iter()
            .map(|(event_type, entries)| (*event_type, entries.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("listeners", &counts)
            .field("history_len", &self.history.len())
            .field("history_capacity", &self.history_capacity)
            .field("max_listeners", &self.max_listeners)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeSpec;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn edge_event(id: &str) -> GraphEvent {
        GraphEvent::EdgeDeleted {
            edge: Edge::from_spec(&EdgeSpec::with_id(id, "a", "out", "b", "in")),
        }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let mut registry = EventRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            registry.on(EventType::EdgeDeleted, move |_| seen.borrow_mut().push(tag));
        }

        assert!(registry.emit(edge_event("e1")));
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_emit_without_listeners() {
        let mut registry = EventRegistry::new();
        assert!(!registry.emit(edge_event("e1")));
        // Still recorded
        assert_eq!(registry.event_history(None).len(), 1);
    }

    #[test]
    fn test_once_listener_fires_once() {
        let mut registry = EventRegistry::new();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        registry.once(EventType::EdgeDeleted, move |_| *counter.borrow_mut() += 1);

        assert!(registry.emit(edge_event("e1")));
        assert!(!registry.emit(edge_event("e2")));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(registry.listener_count(EventType::EdgeDeleted), 0);
    }

    #[test]
    fn test_off() {
        let mut registry = EventRegistry::new();
        let id = registry.on(EventType::EdgeDeleted, |_| {});
        assert!(registry.off(EventType::EdgeDeleted, id));
        assert!(!registry.off(EventType::EdgeDeleted, id));
        assert!(!registry.off(EventType::NodeCreated, id));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        crate::test_support::init_tracing();
        let mut registry = EventRegistry::new();
        let reached = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&reached);

        registry.on(EventType::EdgeDeleted, |_| panic!("listener failure"));
        registry.on(EventType::EdgeDeleted, move |_| *flag.borrow_mut() = true);

        assert!(registry.emit(edge_event("e1")));
        assert!(*reached.borrow());
        // The failing listener stays registered
        assert_eq!(registry.listener_count(EventType::EdgeDeleted), 2);
    }

    #[test]
    fn test_listener_limit_only_warns() {
        let mut registry = EventRegistry::with_limits(10, 2);
        for _ in 0..5 {
            registry.on(EventType::NodeCreated, |_| {});
        }
        assert_eq!(registry.listener_count(EventType::NodeCreated), 5);
    }

    #[test]
    fn test_history_is_bounded_and_filterable() {
        let mut registry = EventRegistry::with_limits(3, DEFAULT_MAX_LISTENERS);
        for i in 0..5 {
            registry.emit(edge_event(&format!("e{i}")));
        }

        let history = registry.event_history(None);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sequence, 3);
        assert_eq!(history[0].event.edge_id().map(EdgeId::as_str), Some("e2"));

        assert!(registry.event_history(Some(EventType::NodeCreated)).is_empty());
        assert_eq!(registry.event_history(Some(EventType::EdgeDeleted)).len(), 3);

        registry.clear_event_history();
        assert!(registry.event_history(None).is_empty());
    }

    #[test]
    fn test_remove_all_listeners() {
        let mut registry = EventRegistry::new();
        registry.on(EventType::NodeCreated, |_| {});
        registry.on(EventType::EdgeCreated, |_| {});

        registry.remove_all_listeners(Some(EventType::NodeCreated));
        assert_eq!(registry.listener_count(EventType::NodeCreated), 0);
        assert_eq!(registry.listener_count(EventType::EdgeCreated), 1);

        registry.remove_all_listeners(None);
        assert_eq!(registry.listener_count(EventType::EdgeCreated), 0);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::NodeCreated.to_string(), "node:created");
        assert_eq!(edge_event("e1").event_type().as_str(), "edge:deleted");
    }
}
