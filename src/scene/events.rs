//! Capture/target/bubble event dispatch over the transform graph.

use super::SceneError;
use super::transform::Vec3;
use crate::ecs::{Entity, ListenerId, World};
use serde_json::Value;
use std::sync::Arc;

pub type NodeCallback = Arc<dyn Fn(&mut NodeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
    None,
    Capture,
    Target,
    Bubble,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
}

impl ListenerOptions {
    pub fn bubble() -> Self {
        Self::default()
    }

    pub fn capture() -> Self {
        Self {
            capture: true,
            once: false,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Event travelling through the graph. Listeners receive it mutably so they
/// can stop propagation or cancel the default action.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    name: String,
    payload: Value,
    cancelable: bool,
    phase: EventPhase,
    target: Option<Entity>,
    current: Option<Entity>,
    propagation_stopped: bool,
    immediate_stopped: bool,
    default_prevented: bool,
}

impl NodeEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            cancelable: false,
            phase: EventPhase::None,
            target: None,
            current: None,
            propagation_stopped: false,
            immediate_stopped: false,
            default_prevented: false,
        }
    }

    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    pub fn current_target(&self) -> Option<Entity> {
        self.current
    }

    /// Remaining nodes on the path are skipped; listeners on the current
    /// node still run.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_stopped = true;
    }

    /// Marks the default action cancelled. Has no effect on events that were
    /// not created cancelable.
    pub fn prevent_default(&mut self) -> bool {
        if !self.cancelable {
            log::warn!(
                "[scene] prevent_default on non-cancelable event '{}'",
                self.name
            );
            return false;
        }
        self.default_prevented = true;
        true
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    fn fresh(&self) -> Self {
        Self::new(self.name.clone(), self.payload.clone()).with_cancelable(self.cancelable)
    }

    fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub target: Entity,
    pub delivered: usize,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

impl World {
    pub fn add_node_listener<F>(
        &mut self,
        node: Entity,
        event: &str,
        options: ListenerOptions,
        callback: F,
    ) -> Result<ListenerId, SceneError>
    where
        F: Fn(&mut NodeEvent) + Send + Sync + 'static,
    {
        self.require_live_node(node)?;
        let node = self
            .node_mut(node)
            .ok_or(SceneError::MissingNode(node))?;
        Ok(node.add_listener(event, options.capture, options.once, Arc::new(callback)))
    }

    pub fn remove_node_listener(&mut self, node: Entity, id: ListenerId) -> bool {
        self.node_mut(node)
            .map(|node| node.remove_listener(id))
            .unwrap_or(false)
    }

    /// Delivers `event` along the path from the root to `target`.
    ///
    /// Capture listeners on ancestors run root first, then the target's
    /// capture and bubble listeners, then bubble listeners on ancestors back
    /// toward the root.
    pub fn dispatch_event(
        &mut self,
        target: Entity,
        mut event: NodeEvent,
    ) -> Result<DispatchOutcome, SceneError> {
        self.require_live_node(target)?;
        let path = self.propagation_path(target);
        let ancestors = &path[..path.len().saturating_sub(1)];
        event.target = Some(target);
        let mut delivered = 0;

        event.phase = EventPhase::Capture;
        for node in ancestors {
            if event.propagation_stopped {
                break;
            }
            delivered += self.invoke_listeners(*node, true, &mut event);
        }

        if !event.propagation_stopped {
            event.phase = EventPhase::Target;
            delivered += self.invoke_listeners(target, true, &mut event);
            if !event.immediate_stopped {
                delivered += self.invoke_listeners(target, false, &mut event);
            }
        }

        event.phase = EventPhase::Bubble;
        for node in ancestors.iter().rev() {
            if event.propagation_stopped {
                break;
            }
            delivered += self.invoke_listeners(*node, false, &mut event);
        }

        event.phase = EventPhase::None;
        event.current = None;
        Ok(DispatchOutcome {
            target,
            delivered,
            default_prevented: event.default_prevented,
            propagation_stopped: event.propagation_stopped,
        })
    }

    fn invoke_listeners(&mut self, node: Entity, capture: bool, event: &mut NodeEvent) -> usize {
        let listeners = match self.node(node) {
            Some(component) if !component.is_disposed() => {
                component.matching_listeners(event, capture)
            }
            _ => return 0,
        };
        event.immediate_stopped = false;
        event.current = Some(node);
        let mut delivered = 0;
        for (id, once, callback) in listeners {
            if event.immediate_stopped {
                break;
            }
            if once {
                self.remove_node_listener(node, id);
            }
            callback(event);
            delivered += 1;
        }
        delivered
    }

    /// Dispatches a copy of `event` to every node within `radius` of `center`.
    pub fn emit_to_radius(
        &mut self,
        center: Vec3,
        radius: f32,
        event: &NodeEvent,
    ) -> Vec<DispatchOutcome> {
        let targets = self.nodes_within_radius(center, radius);
        targets
            .into_iter()
            .filter_map(|target| self.dispatch_event(target, event.fresh()).ok())
            .collect()
    }

    /// Dispatches a copy of `event` to `root` and each descendant down to
    /// `max_depth` levels.
    pub fn emit_to_hierarchy(
        &mut self,
        root: Entity,
        event: &NodeEvent,
        max_depth: Option<usize>,
    ) -> Result<Vec<DispatchOutcome>, SceneError> {
        self.require_live_node(root)?;
        let targets = self.descendants(root, max_depth);
        Ok(targets
            .into_iter()
            .filter_map(|target| self.dispatch_event(target, event.fresh()).ok())
            .collect())
    }
}
