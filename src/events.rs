use std::collections::HashMap;

use crate::dom::NodeId;

/// Index of a page script inside its [`Page`](crate::Page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScriptId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Listener {
    pub(crate) capture: bool,
    pub(crate) script: ScriptId,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ListenerStore {
    map: HashMap<NodeId, HashMap<String, Vec<Listener>>>,
}

impl ListenerStore {
    /// Registers a listener; registering the same one twice is a no-op, as
    /// with `addEventListener`.
    pub(crate) fn add(&mut self, node_id: NodeId, event: &str, listener: Listener) {
        let listeners = self
            .map
            .entry(node_id)
            .or_default()
            .entry(event.to_string())
            .or_default();
        if !listeners.contains(&listener) {
            listeners.push(listener);
        }
    }

    pub(crate) fn get(&self, node_id: NodeId, event: &str, capture: bool) -> Vec<Listener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|listener| listener.capture == capture)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The event object handed to page scripts.
#[derive(Debug, Clone)]
pub struct EventState {
    pub(crate) event_type: String,
    pub(crate) target: NodeId,
    pub(crate) current_target: NodeId,
    pub(crate) default_prevented: bool,
    pub(crate) propagation_stopped: bool,
}

impl EventState {
    pub(crate) fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The node the event was dispatched to.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose listener is running.
    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registrations_collapse() {
        let mut store = ListenerStore::default();
        let listener = Listener {
            capture: false,
            script: ScriptId(0),
        };
        store.add(NodeId(1), "change", listener);
        store.add(NodeId(1), "change", listener);
        store.add(
            NodeId(1),
            "change",
            Listener {
                capture: true,
                script: ScriptId(0),
            },
        );
        assert_eq!(store.get(NodeId(1), "change", false).len(), 1);
        assert_eq!(store.get(NodeId(1), "change", true).len(), 1);
        assert!(store.get(NodeId(2), "change", false).is_empty());
    }
}
