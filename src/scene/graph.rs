use super::SceneError;
use super::node::{NODE_TAG, NodeComponent};
use super::transform::{Quat, Transform, Vec3, WORLD_UP, look_rotation, normalize_rotation};
use crate::ecs::{Component, Entity, World};
use crate::events::{EventCategory, LogLevel, LogRecord};
use rayon::prelude::*;
use serde_json::json;
use std::collections::{HashSet, VecDeque};

/// Upper bound on parent hops walked from any node.
pub const MAX_PATH_HOPS: usize = 1000;

const LOOK_EPSILON: f32 = 1e-6;

impl World {
    pub fn node(&self, entity: Entity) -> Option<&NodeComponent> {
        self.component::<NodeComponent>(entity)
    }

    pub fn node_mut(&mut self, entity: Entity) -> Option<&mut NodeComponent> {
        self.component_mut::<NodeComponent>(entity)
    }

    pub(crate) fn require_live_node(&self, entity: Entity) -> Result<&NodeComponent, SceneError> {
        if !self.contains(entity) {
            return Err(SceneError::NoSuchEntity(entity));
        }
        let node = self.node(entity).ok_or(SceneError::MissingNode(entity))?;
        if node.is_disposed() {
            return Err(SceneError::Disposed(entity));
        }
        Ok(node)
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)?.parent()
    }

    pub fn children_of(&self, entity: Entity) -> &[Entity] {
        self.node(entity).map(NodeComponent::children).unwrap_or(&[])
    }

    /// Moves `child` under `parent`, or makes it a root when `parent` is `None`.
    ///
    /// Links that would close a cycle are rejected and leave the graph as it
    /// was. The child's local transform is kept, so its world placement
    /// follows the new parent.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<(), SceneError> {
        let current = self.require_live_node(child)?.parent();
        if let Some(parent) = parent {
            if parent == child {
                return Err(SceneError::SelfParent(child));
            }
            self.require_live_node(parent)?;
            if self.is_ancestor(child, parent) {
                log::warn!(
                    "[scene] rejected parenting {:?} under its descendant {:?}",
                    child,
                    parent
                );
                return Err(SceneError::CycleRejected { child, parent });
            }
        }
        if current == parent {
            return Ok(());
        }

        if let Some(old) = current {
            if let Some(old) = self.node_mut(old) {
                old.remove_child(child);
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.set_parent_link(parent);
        }
        if let Some(parent) = parent {
            if let Some(node) = self.node_mut(parent) {
                node.push_child(child);
            }
        }
        Ok(())
    }

    /// True when `ancestor` appears on the parent chain of `node`.
    ///
    /// The whole chain is walked, however deep. A chain with more links than
    /// the world has objects can only be a loop and also counts as `true`,
    /// so `set_parent` refuses to extend it.
    pub fn is_ancestor(&self, ancestor: Entity, node: Entity) -> bool {
        let mut cursor = self.parent_of(node);
        for _ in 0..self.len() {
            let Some(current) = cursor else {
                return false;
            };
            if current == ancestor {
                return true;
            }
            cursor = self.parent_of(current);
        }
        cursor.is_some()
    }

    /// Nodes from the root down to `target`, inclusive.
    pub fn propagation_path(&self, target: Entity) -> Vec<Entity> {
        let mut path = vec![target];
        let mut cursor = self.parent_of(target);
        while let Some(next) = cursor {
            if path.len() > MAX_PATH_HOPS {
                self.report_truncated_path(target);
                break;
            }
            path.push(next);
            cursor = self.parent_of(next);
        }
        path.reverse();
        path
    }

    fn report_truncated_path(&self, target: Entity) {
        log::warn!(
            "[scene] parent chain of {:?} exceeds {MAX_PATH_HOPS} hops; truncating",
            target
        );
        if let Some(events) = self.event_stack() {
            events.record(
                LogRecord::new(
                    EventCategory::Error,
                    LogLevel::Warn,
                    "path_truncated",
                    format!("parent chain exceeds {MAX_PATH_HOPS} hops"),
                )
                .context(json!({ "target": target.to_raw() })),
            );
        }
    }

    pub fn world_transform(&self, entity: Entity) -> Option<Transform> {
        self.node(entity)?;
        let world = self
            .propagation_path(entity)
            .into_iter()
            .filter_map(|node| self.node(node))
            .fold(Transform::IDENTITY, |acc, node| acc.compose(node.local()));
        Some(world)
    }

    pub fn world_position(&self, entity: Entity) -> Option<Vec3> {
        self.world_transform(entity).map(|t| t.position)
    }

    pub fn world_rotation(&self, entity: Entity) -> Option<Quat> {
        self.world_transform(entity).map(|t| t.rotation)
    }

    pub fn world_scale(&self, entity: Entity) -> Option<Vec3> {
        self.world_transform(entity).map(|t| t.scale)
    }

    pub fn forward(&self, entity: Entity) -> Option<Vec3> {
        self.world_transform(entity).map(|t| t.forward())
    }

    pub fn up(&self, entity: Entity) -> Option<Vec3> {
        self.world_transform(entity).map(|t| t.up())
    }

    pub fn right(&self, entity: Entity) -> Option<Vec3> {
        self.world_transform(entity).map(|t| t.right())
    }

    /// Rotates `entity` so its world forward (+Z) faces `target`.
    ///
    /// A target at the node's own position leaves the rotation untouched.
    pub fn look_at(&mut self, entity: Entity, target: Vec3) -> Result<(), SceneError> {
        self.require_live_node(entity)?;
        let Some(world) = self.world_transform(entity) else {
            return Err(SceneError::MissingNode(entity));
        };
        let direction = target - world.position;
        if direction.length() <= LOOK_EPSILON {
            return Ok(());
        }
        let desired = look_rotation(direction, WORLD_UP);
        let parent_rotation = self
            .parent_of(entity)
            .and_then(|parent| self.world_rotation(parent))
            .unwrap_or(Quat::IDENTITY);
        let local = normalize_rotation(parent_rotation.conjugate() * desired);
        if let Some(node) = self.node_mut(entity) {
            node.local_mut().rotation = local;
        }
        Ok(())
    }

    /// `root` followed by its descendants breadth first, down to `max_depth`
    /// levels below the root.
    pub fn descendants(&self, root: Entity, max_depth: Option<usize>) -> Vec<Entity> {
        if self.node(root).is_none() {
            return Vec::new();
        }
        let mut visited = HashSet::from([root]);
        let mut ordered = vec![root];
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|limit| depth >= limit) {
                continue;
            }
            for child in self.children_of(node) {
                if visited.insert(*child) {
                    ordered.push(*child);
                    queue.push_back((*child, depth + 1));
                }
            }
        }
        ordered
    }

    /// Live nodes whose world position lies within `radius` of `center`, in
    /// spawn order.
    pub fn nodes_within_radius(&self, center: Vec3, radius: f32) -> Vec<Entity> {
        let candidates: Vec<Entity> = self.entities().collect();
        candidates
            .par_iter()
            .filter(|entity| self.node(**entity).is_some_and(|node| !node.is_disposed()))
            .filter(|entity| {
                self.world_position(**entity)
                    .is_some_and(|position| position.distance(center) <= radius)
            })
            .copied()
            .collect()
    }

    pub fn set_visible(&mut self, entity: Entity, visible: bool) -> Result<(), SceneError> {
        let presented = self.require_live_node(entity)?.is_presented();
        if let Some(node) = self.node_mut(entity) {
            node.set_visible_flag(visible);
        }
        if presented {
            if let Some(renderer) = self.renderer() {
                renderer.lock().set_visible(entity, visible);
            }
        }
        Ok(())
    }

    /// Detaches the node from its parent, orphans its children, releases its
    /// renderer resources and marks it disposed. Returns `false` if it was
    /// already disposed.
    pub fn dispose_node(&mut self, entity: Entity) -> Result<bool, SceneError> {
        if !self.contains(entity) {
            return Err(SceneError::NoSuchEntity(entity));
        }
        let Some(node) = self.node(entity) else {
            return Err(SceneError::MissingNode(entity));
        };
        if node.is_disposed() {
            return Ok(false);
        }
        self.release_node(entity);
        if let Some(node) = self.node_mut(entity) {
            crate::ecs::Component::dispose(node);
        }
        Ok(true)
    }

    /// Moves the graph links of the node on `entity` onto `incoming`, which is
    /// about to take over its tag. When `incoming` uses the node tag without
    /// being a node, the old node is released instead.
    pub(crate) fn hand_over_links(&mut self, entity: Entity, incoming: &mut dyn Component) {
        if incoming.type_tag() != NODE_TAG {
            return;
        }
        let Some((parent, children)) = self
            .node(entity)
            .filter(|node| !node.is_disposed())
            .map(|node| (node.parent(), node.children().to_vec()))
        else {
            return;
        };
        match incoming.as_any_mut().downcast_mut::<NodeComponent>() {
            Some(node) => {
                node.set_parent_link(parent);
                node.take_children();
                for child in children {
                    node.push_child(child);
                }
            }
            None => self.release_node(entity),
        }
    }

    /// Graph and renderer cleanup shared by node disposal and despawn.
    pub(crate) fn release_node(&mut self, entity: Entity) {
        let Some(node) = self.node(entity) else {
            return;
        };
        if node.is_disposed() {
            return;
        }
        let parent = node.parent();
        let presented = node.is_presented();

        if let Some(parent) = parent {
            if let Some(parent) = self.node_mut(parent) {
                parent.remove_child(entity);
            }
        }
        let children = match self.node_mut(entity) {
            Some(node) => {
                node.set_parent_link(None);
                node.take_children()
            }
            None => Vec::new(),
        };
        for child in children {
            if let Some(child) = self.node_mut(child) {
                child.set_parent_link(None);
            }
        }
        if presented {
            if let Some(renderer) = self.renderer() {
                renderer.lock().dispose(entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventStackHandle;
    use crate::render::{RecordingRenderAdapter, RenderCall, RenderHandle};
    use std::f32::consts::FRAC_PI_2;

    fn node(world: &mut World, kind: &str, position: Vec3) -> Entity {
        let entity = world.spawn(kind);
        world.insert(entity, NodeComponent::at(position)).unwrap();
        entity
    }

    /// Nodes parented one under the next, root first.
    fn chain(world: &mut World, length: usize) -> Vec<Entity> {
        let links: Vec<Entity> = (0..length)
            .map(|_| node(world, "signal", Vec3::ZERO))
            .collect();
        for pair in links.windows(2) {
            world.set_parent(pair[1], Some(pair[0])).unwrap();
        }
        links
    }

    fn assert_close(actual: Vec3, expected: Vec3) {
        assert!(actual.abs_diff_eq(expected, 1e-4), "{actual:?} != {expected:?}");
    }

    #[test]
    fn set_parent_links_both_sides() {
        let mut world = World::new();
        let parent = node(&mut world, "station", Vec3::ZERO);
        let child = node(&mut world, "platform", Vec3::ZERO);

        world.set_parent(child, Some(parent)).unwrap();
        world.set_parent(child, Some(parent)).unwrap();

        assert_eq!(world.parent_of(child), Some(parent));
        assert_eq!(world.children_of(parent), &[child]);
    }

    #[test]
    fn reparent_moves_child_between_lists() {
        let mut world = World::new();
        let a = node(&mut world, "station", Vec3::ZERO);
        let b = node(&mut world, "station", Vec3::ZERO);
        let child = node(&mut world, "platform", Vec3::ZERO);

        world.set_parent(child, Some(a)).unwrap();
        world.set_parent(child, Some(b)).unwrap();

        assert!(world.children_of(a).is_empty());
        assert_eq!(world.children_of(b), &[child]);

        world.set_parent(child, None).unwrap();
        assert_eq!(world.parent_of(child), None);
        assert!(world.children_of(b).is_empty());
    }

    #[test]
    fn cycles_and_self_parenting_are_rejected() {
        let mut world = World::new();
        let a = node(&mut world, "station", Vec3::ZERO);
        let b = node(&mut world, "platform", Vec3::ZERO);
        let c = node(&mut world, "signal", Vec3::ZERO);
        world.set_parent(b, Some(a)).unwrap();
        world.set_parent(c, Some(b)).unwrap();

        assert_eq!(
            world.set_parent(a, Some(c)),
            Err(SceneError::CycleRejected { child: a, parent: c })
        );
        assert_eq!(world.set_parent(a, Some(a)), Err(SceneError::SelfParent(a)));
        assert_eq!(world.parent_of(a), None);
        assert_eq!(world.propagation_path(c), vec![a, b, c]);
    }

    #[test]
    fn cycle_check_walks_chains_deeper_than_the_path_cap() {
        let mut world = World::new();
        let links = chain(&mut world, MAX_PATH_HOPS + 5);
        let (root, leaf) = (links[0], links[links.len() - 1]);

        assert!(world.is_ancestor(root, leaf));
        assert_eq!(
            world.set_parent(root, Some(leaf)),
            Err(SceneError::CycleRejected { child: root, parent: leaf })
        );
        assert_eq!(world.parent_of(root), None);
        assert!(world.children_of(leaf).is_empty());
    }

    #[test]
    fn overlong_chain_truncates_path_and_records_warning() {
        let events = EventStackHandle::default();
        let mut world = World::with_event_stack(events.clone());
        let links = chain(&mut world, MAX_PATH_HOPS + 10);
        let leaf = links[links.len() - 1];

        let path = world.propagation_path(leaf);

        assert_eq!(path.len(), MAX_PATH_HOPS + 1);
        assert_eq!(path.first(), Some(&links[links.len() - 1 - MAX_PATH_HOPS]));
        assert_eq!(path.last(), Some(&leaf));

        let truncated: Vec<_> = events
            .get_all_events()
            .into_iter()
            .filter(|entry| entry.event_type == "path_truncated")
            .collect();
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].level, LogLevel::Warn);
        assert_eq!(truncated[0].category, EventCategory::Error);
        assert_eq!(truncated[0].context, Some(json!({ "target": leaf.to_raw() })));
    }

    #[test]
    fn path_at_exactly_the_cap_is_not_truncated() {
        let events = EventStackHandle::default();
        let mut world = World::with_event_stack(events.clone());
        let links = chain(&mut world, MAX_PATH_HOPS + 1);

        let path = world.propagation_path(links[MAX_PATH_HOPS]);

        assert_eq!(path, links);
        assert!(
            events
                .get_all_events()
                .iter()
                .all(|entry| entry.event_type != "path_truncated")
        );
    }

    #[test]
    fn world_transform_composes_chain() {
        let mut world = World::new();
        let station = world.spawn("station");
        world
            .insert(
                station,
                NodeComponent::new(
                    Transform::from_position(Vec3::new(10.0, 0.0, 0.0))
                        .with_rotation(Quat::from_axis_angle(WORLD_UP, FRAC_PI_2)),
                ),
            )
            .unwrap();
        let platform = node(&mut world, "platform", Vec3::new(0.0, 0.0, 2.0));
        world.set_parent(platform, Some(station)).unwrap();

        assert_close(world.world_position(platform).unwrap(), Vec3::new(12.0, 0.0, 0.0));
        assert_close(world.forward(platform).unwrap(), Vec3::X);
        assert_close(world.up(platform).unwrap(), Vec3::Y);
    }

    #[test]
    fn look_at_accounts_for_parent_rotation() {
        let mut world = World::new();
        let station = world.spawn("station");
        world
            .insert(
                station,
                NodeComponent::new(
                    Transform::IDENTITY.with_rotation(Quat::from_axis_angle(WORLD_UP, FRAC_PI_2)),
                ),
            )
            .unwrap();
        let turret = node(&mut world, "turret", Vec3::ZERO);
        world.set_parent(turret, Some(station)).unwrap();

        world.look_at(turret, Vec3::new(0.0, 0.0, -5.0)).unwrap();

        assert_close(world.forward(turret).unwrap(), Vec3::NEG_Z);
    }

    #[test]
    fn look_at_own_position_is_a_no_op() {
        let mut world = World::new();
        let turret = node(&mut world, "turret", Vec3::ONE);
        world.look_at(turret, Vec3::ONE).unwrap();
        assert_eq!(world.node(turret).unwrap().local().rotation, Quat::IDENTITY);
    }

    #[test]
    fn dispose_node_orphans_children_and_notifies_renderer() {
        let recorder = RecordingRenderAdapter::default();
        let mut world = World::new();
        world.attach_renderer(RenderHandle::new(recorder.clone()));
        let parent = node(&mut world, "station", Vec3::ZERO);
        let middle = node(&mut world, "platform", Vec3::ZERO);
        let child = node(&mut world, "signal", Vec3::ZERO);
        world.set_parent(middle, Some(parent)).unwrap();
        world.set_parent(child, Some(middle)).unwrap();

        assert!(world.dispose_node(middle).unwrap());
        assert!(!world.dispose_node(middle).unwrap());

        assert!(world.children_of(parent).is_empty());
        assert_eq!(world.parent_of(child), None);
        assert_eq!(recorder.calls(), vec![RenderCall::Dispose { node: middle }]);
        assert_eq!(
            world.set_parent(child, Some(middle)),
            Err(SceneError::Disposed(middle))
        );
    }

    #[test]
    fn despawn_detaches_from_graph() {
        let mut world = World::new();
        let parent = node(&mut world, "station", Vec3::ZERO);
        let child = node(&mut world, "platform", Vec3::ZERO);
        world.set_parent(child, Some(parent)).unwrap();

        world.despawn(parent).unwrap();

        assert_eq!(world.parent_of(child), None);
        assert_eq!(world.propagation_path(child), vec![child]);
    }

    #[test]
    fn set_visible_pushes_to_renderer() {
        let recorder = RecordingRenderAdapter::default();
        let mut world = World::new();
        world.attach_renderer(RenderHandle::new(recorder.clone()));
        let shown = node(&mut world, "signal", Vec3::ZERO);
        let group = world.spawn("group");
        world
            .insert(group, NodeComponent::default().without_presentation())
            .unwrap();

        world.set_visible(shown, false).unwrap();
        world.set_visible(group, false).unwrap();

        assert!(!world.node(group).unwrap().is_visible());
        assert_eq!(
            recorder.calls(),
            vec![RenderCall::Visibility { node: shown, visible: false }]
        );
    }

    #[test]
    fn descendants_respect_depth_limit() {
        let mut world = World::new();
        let root = node(&mut world, "station", Vec3::ZERO);
        let a = node(&mut world, "platform", Vec3::ZERO);
        let b = node(&mut world, "platform", Vec3::ZERO);
        let leaf = node(&mut world, "signal", Vec3::ZERO);
        world.set_parent(a, Some(root)).unwrap();
        world.set_parent(b, Some(root)).unwrap();
        world.set_parent(leaf, Some(a)).unwrap();

        assert_eq!(world.descendants(root, None), vec![root, a, b, leaf]);
        assert_eq!(world.descendants(root, Some(1)), vec![root, a, b]);
        assert_eq!(world.descendants(root, Some(0)), vec![root]);
    }
}
