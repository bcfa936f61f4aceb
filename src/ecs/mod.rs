mod component;
mod object;
pub mod replication;
pub mod save;

pub use component::{
    Component, ComponentError, SnapshotRole, TypedComponent, from_blob, to_blob,
};
pub use object::{
    DATA_VERSION, DeserializeReport, GameObject, GameObjectData, ListenerId, NetworkSnapshot,
    ObjectCallback, ObjectMetadata,
};

use crate::events::EventStackHandle;
use crate::render::RenderHandle;
use crate::scene::{NODE_TAG, NodeComponent};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle referencing an entity within the world arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub const fn to_raw(self) -> (u32, u32) {
        (self.index, self.generation)
    }
}

#[derive(Default)]
struct EntityRecord {
    generation: u32,
    object: Option<GameObject>,
}

/// Errors returned by world and game object operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    NoSuchEntity(Entity),
    DuplicateId(String),
    SnapshotMismatch { expected: String, actual: String },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::NoSuchEntity(entity) => {
                write!(f, "entity {:?} is not alive in this world", entity)
            }
            EcsError::DuplicateId(id) => write!(f, "game object id '{id}' is already in use"),
            EcsError::SnapshotMismatch { expected, actual } => write!(
                f,
                "network snapshot for '{actual}' cannot be applied to '{expected}'"
            ),
        }
    }
}

impl std::error::Error for EcsError {}

/// Arena owning every game object of a session.
///
/// Entities are addressed by generational handles; the string id
/// (`"{type}_{counter}"`) is unique within the world and is what save files and
/// network snapshots refer to. Iteration follows spawn order, which is also the
/// order in which objects are updated each tick.
#[derive(Default)]
pub struct World {
    entities: Vec<EntityRecord>,
    free_list: Vec<u32>,
    order: Vec<Entity>,
    ids: HashMap<String, Entity>,
    next_serial: u64,
    events: Option<EventStackHandle>,
    renderer: Option<RenderHandle>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_stack(events: EventStackHandle) -> Self {
        let mut world = Self::default();
        world.attach_event_stack(events);
        world
    }

    /// Points every current and future object at `events` for failure reporting.
    pub fn attach_event_stack(&mut self, events: EventStackHandle) {
        let weak = events.downgrade();
        for record in &mut self.entities {
            if let Some(object) = record.object.as_mut() {
                object.set_event_stack(Some(weak.clone()));
            }
        }
        self.events = Some(events);
    }

    pub fn event_stack(&self) -> Option<&EventStackHandle> {
        self.events.as_ref()
    }

    pub fn attach_renderer(&mut self, renderer: RenderHandle) {
        self.renderer = Some(renderer);
    }

    pub fn renderer(&self) -> Option<&RenderHandle> {
        self.renderer.as_ref()
    }

    pub fn spawn(&mut self, object_type: &str) -> Entity {
        let id = loop {
            self.next_serial += 1;
            let candidate = format!("{object_type}_{}", self.next_serial);
            if !self.ids.contains_key(&candidate) {
                break candidate;
            }
        };
        self.insert_object(object_type, id)
    }

    /// Spawns an object with a caller-chosen id, as save loading does.
    ///
    /// A numeric suffix on the id moves the serial counter past it so later
    /// `spawn` calls never collide with restored objects.
    pub fn spawn_with_id(
        &mut self,
        object_type: &str,
        id: impl Into<String>,
    ) -> Result<Entity, EcsError> {
        let id = id.into();
        if self.ids.contains_key(&id) {
            return Err(EcsError::DuplicateId(id));
        }
        if let Some(serial) = id
            .rsplit_once('_')
            .and_then(|(_, suffix)| suffix.parse::<u64>().ok())
        {
            self.next_serial = self.next_serial.max(serial);
        }
        Ok(self.insert_object(object_type, id))
    }

    fn insert_object(&mut self, object_type: &str, id: String) -> Entity {
        let entity = self.allocate();
        let mut object = GameObject::new(entity, id.clone(), object_type);
        object.set_event_stack(self.events.as_ref().map(EventStackHandle::downgrade));
        self.entities[entity.index as usize].object = Some(object);
        self.ids.insert(id, entity);
        self.order.push(entity);
        entity
    }

    fn allocate(&mut self) -> Entity {
        if let Some(index) = self.free_list.pop() {
            let record = &self.entities[index as usize];
            Entity::new(index, record.generation)
        } else {
            let index = self.entities.len() as u32;
            self.entities.push(EntityRecord::default());
            Entity::new(index, 0)
        }
    }

    /// Removes an entity: detaches it from the transform graph, disposes every
    /// component once and frees the slot.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.validate_entity(entity)?;
        self.release_node(entity);

        let record = &mut self.entities[entity.index as usize];
        if let Some(mut object) = record.object.take() {
            object.dispose();
            self.ids.remove(object.id());
        }
        record.generation = record.generation.wrapping_add(1);
        self.order.retain(|alive| *alive != entity);
        if !self.free_list.contains(&entity.index) {
            self.free_list.push(entity.index);
        }
        log::debug!("[world] despawned {:?}", entity);
        Ok(())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities
            .get(entity.index as usize)
            .map(|record| record.object.is_some() && record.generation == entity.generation)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, entity: Entity) -> Option<&GameObject> {
        if !self.contains(entity) {
            return None;
        }
        self.entities[entity.index as usize].object.as_ref()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut GameObject> {
        if !self.contains(entity) {
            return None;
        }
        self.entities[entity.index as usize].object.as_mut()
    }

    /// Looks up an entity by its string id.
    pub fn find(&self, id: &str) -> Option<Entity> {
        self.ids.get(id).copied()
    }

    /// Entities in spawn order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.order.iter().copied()
    }

    pub fn objects(&self) -> impl Iterator<Item = (Entity, &GameObject)> + '_ {
        self.order
            .iter()
            .filter_map(|entity| self.get(*entity).map(|object| (*entity, object)))
    }

    /// Adds `component` to `entity`, returning any displaced occupant of the
    /// same tag undisposed.
    ///
    /// A node replacing another node inherits its parent and children, so the
    /// transform graph stays symmetric. The displaced node comes back unlinked.
    pub fn insert<C: Component>(
        &mut self,
        entity: Entity,
        mut component: C,
    ) -> Result<Option<Box<dyn Component>>, EcsError> {
        self.validate_entity(entity)?;
        self.hand_over_links(entity, &mut component);
        let object = self
            .get_mut(entity)
            .ok_or(EcsError::NoSuchEntity(entity))?;
        let mut displaced = object.add_component(component);
        if let Some(node) = displaced
            .as_deref_mut()
            .and_then(|previous| previous.as_any_mut().downcast_mut::<NodeComponent>())
        {
            node.clear_links();
        }
        Ok(displaced)
    }

    /// Adds `component` to `entity` and disposes whatever held the tag before.
    /// Graph links carry over as in [`World::insert`].
    pub fn replace_component<C: Component>(
        &mut self,
        entity: Entity,
        mut component: C,
    ) -> Result<(), EcsError> {
        self.validate_entity(entity)?;
        self.hand_over_links(entity, &mut component);
        let object = self
            .get_mut(entity)
            .ok_or(EcsError::NoSuchEntity(entity))?;
        object.replace_component(component);
        Ok(())
    }

    /// Detaches the component under `tag` without disposing it.
    ///
    /// Removing the node first releases it from the graph: it leaves its
    /// parent, its children become roots and the renderer drops it.
    pub fn remove_component(
        &mut self,
        entity: Entity,
        tag: &str,
    ) -> Result<Option<Box<dyn Component>>, EcsError> {
        self.validate_entity(entity)?;
        if tag == NODE_TAG {
            self.release_node(entity);
        }
        let object = self
            .get_mut(entity)
            .ok_or(EcsError::NoSuchEntity(entity))?;
        Ok(object.remove_component(tag))
    }

    pub fn component<T: TypedComponent>(&self, entity: Entity) -> Option<&T> {
        self.get(entity)?.get_component::<T>()
    }

    pub fn component_mut<T: TypedComponent>(&mut self, entity: Entity) -> Option<&mut T> {
        self.get_mut(entity)?.get_component_mut::<T>()
    }

    pub fn component_entries<T: TypedComponent>(&self) -> Vec<(Entity, &T)> {
        self.objects()
            .filter_map(|(entity, object)| object.get_component::<T>().map(|c| (entity, c)))
            .collect()
    }

    /// Runs `update` on every object in spawn order.
    pub fn update_objects(&mut self, delta_seconds: f32) {
        for position in 0..self.order.len() {
            let entity = self.order[position];
            if let Some(object) = self.entities[entity.index as usize].object.as_mut() {
                object.update(delta_seconds);
            }
        }
    }

    /// Copies every interpolated quantity's current value into its previous slot.
    pub fn commit_interpolation(&mut self) {
        for record in &mut self.entities {
            if let Some(object) = record.object.as_mut() {
                object.commit_tick();
            }
        }
    }

    pub fn serialize_all(&self) -> Vec<GameObjectData> {
        self.order
            .par_iter()
            .filter_map(|entity| self.get(*entity))
            .map(GameObject::serialize)
            .collect()
    }

    pub fn network_snapshots(&self) -> Vec<NetworkSnapshot> {
        self.objects()
            .map(|(_, object)| object.network_snapshot())
            .collect()
    }

    fn validate_entity(&self, entity: Entity) -> Result<(), EcsError> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(EcsError::NoSuchEntity(entity))
        }
    }
}

pub(crate) fn current_time_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
