use super::events::{NodeCallback, NodeEvent};
use super::transform::{Transform, Vec3};
use crate::ecs::{
    Component, ComponentError, Entity, ListenerId, SnapshotRole, TypedComponent, from_blob,
    to_blob,
};
use crate::engine::interpolation::Interpolated;
use crate::render::RenderAdapter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

pub const NODE_TAG: &str = "position";

pub(crate) struct NodeListener {
    pub(crate) id: ListenerId,
    pub(crate) event: String,
    pub(crate) capture: bool,
    pub(crate) once: bool,
    pub(crate) callback: NodeCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeState {
    #[serde(flatten)]
    transform: Transform,
    #[serde(default = "visible_by_default")]
    visible: bool,
}

fn visible_by_default() -> bool {
    true
}

/// Transform-graph node carried by a game object.
///
/// Parent and child links are maintained by the world; the node only stores
/// them. The local transform is interpolated between ticks.
pub struct NodeComponent {
    transform: Interpolated<Transform>,
    parent: Option<Entity>,
    children: Vec<Entity>,
    visible: bool,
    presented: bool,
    disposed: bool,
    owner: Option<Entity>,
    listeners: Vec<NodeListener>,
    next_listener: u64,
}

impl Default for NodeComponent {
    fn default() -> Self {
        Self::new(Transform::IDENTITY)
    }
}

impl NodeComponent {
    pub fn new(local: Transform) -> Self {
        Self {
            transform: Interpolated::new(local),
            parent: None,
            children: Vec::new(),
            visible: true,
            presented: true,
            disposed: false,
            owner: None,
            listeners: Vec::new(),
            next_listener: 1,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(Transform::from_position(position))
    }

    /// Grouping node with nothing for the renderer to draw.
    pub fn without_presentation(mut self) -> Self {
        self.presented = false;
        self
    }

    pub fn local(&self) -> &Transform {
        self.transform.current()
    }

    pub fn local_mut(&mut self) -> &mut Transform {
        self.transform.current_mut()
    }

    pub fn previous_local(&self) -> &Transform {
        self.transform.previous()
    }

    pub fn set_local(&mut self, local: Transform) {
        self.transform.set(local);
    }

    /// Moves the node without blending from its old placement.
    pub fn teleport(&mut self, local: Transform) {
        self.transform.teleport(local);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.current_mut().position = position;
    }

    pub fn interpolated(&self, alpha: f32) -> Transform {
        self.transform.sample(alpha)
    }

    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_presented(&self) -> bool {
        self.presented
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn owner(&self) -> Option<Entity> {
        self.owner
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn set_visible_flag(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<Entity>) {
        self.parent = parent;
    }

    pub(crate) fn push_child(&mut self, child: Entity) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: Entity) -> bool {
        let before = self.children.len();
        self.children.retain(|existing| *existing != child);
        self.children.len() != before
    }

    pub(crate) fn take_children(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.children)
    }

    /// Forgets every link; used on a node that has left the world.
    pub(crate) fn clear_links(&mut self) {
        self.parent = None;
        self.children.clear();
    }

    pub(crate) fn add_listener(
        &mut self,
        event: &str,
        capture: bool,
        once: bool,
        callback: NodeCallback,
    ) -> ListenerId {
        let id = ListenerId::new(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(NodeListener {
            id,
            event: event.to_string(),
            capture,
            once,
            callback,
        });
        id
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Listeners for `event` registered for the given phase, in registration order.
    pub(crate) fn matching_listeners(
        &self,
        event: &NodeEvent,
        capture: bool,
    ) -> Vec<(ListenerId, bool, NodeCallback)> {
        self.listeners
            .iter()
            .filter(|listener| listener.capture == capture && listener.event == event.name())
            .map(|listener| (listener.id, listener.once, listener.callback.clone()))
            .collect()
    }
}

impl Component for NodeComponent {
    fn type_tag(&self) -> &'static str {
        NODE_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_attach(&mut self, owner: Entity) {
        self.owner = Some(owner);
    }

    fn commit_tick(&mut self) {
        self.transform.commit();
    }

    fn present(&self, owner: Entity, alpha: f32, renderer: &mut dyn RenderAdapter) {
        if self.presented && !self.disposed {
            renderer.set_local_transform(owner, &self.interpolated(alpha));
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.listeners.clear();
        self.children.clear();
        self.parent = None;
        self.disposed = true;
    }

    fn serialize(&self) -> Result<Value, ComponentError> {
        to_blob(
            NODE_TAG,
            &NodeState {
                transform: *self.local(),
                visible: self.visible,
            },
        )
    }

    fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError> {
        let state: NodeState = from_blob(NODE_TAG, blob)?;
        self.teleport(state.transform);
        self.visible = state.visible;
        Ok(())
    }

    fn snapshot_role(&self) -> Option<SnapshotRole> {
        Some(SnapshotRole::Position)
    }

    fn snapshot(&self) -> Result<Value, ComponentError> {
        to_blob(NODE_TAG, self.local())
    }

    /// Remote updates only move `current`, so presentation eases toward them.
    fn apply_snapshot(&mut self, blob: &Value) -> Result<(), ComponentError> {
        let transform: Transform = from_blob(NODE_TAG, blob)?;
        self.set_local(transform);
        Ok(())
    }
}

impl TypedComponent for NodeComponent {
    const TAG: &'static str = NODE_TAG;
}
