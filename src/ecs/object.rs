use super::component::{Component, ComponentError, SnapshotRole, TypedComponent};
use super::{EcsError, Entity, current_time_millis};
use crate::events::{EventCategory, LogLevel, LogRecord, WeakEventStack};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

pub const DATA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub type ObjectCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub created_at: u64,
    pub version: String,
}

/// Persistent form of a game object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObjectData {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub components: IndexMap<String, Value>,
    pub metadata: ObjectMetadata,
}

/// Compact state sent over the wire each replication tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub id: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// Outcome of restoring component blobs onto an object.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeserializeReport {
    pub applied: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

impl DeserializeReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

/// A game entity: one component per tag plus a small named-event emitter.
pub struct GameObject {
    id: String,
    object_type: String,
    handle: Entity,
    components: IndexMap<&'static str, Box<dyn Component>>,
    listeners: HashMap<String, Vec<(ListenerId, ObjectCallback)>>,
    next_listener: u64,
    events: Option<WeakEventStack>,
    created_at: u64,
    disposed: bool,
}

impl GameObject {
    pub(crate) fn new(handle: Entity, id: String, object_type: &str) -> Self {
        Self {
            id,
            object_type: object_type.to_string(),
            handle,
            components: IndexMap::new(),
            listeners: HashMap::new(),
            next_listener: 1,
            events: None,
            created_at: current_time_millis(),
            disposed: false,
        }
    }

    pub(crate) fn set_event_stack(&mut self, events: Option<WeakEventStack>) {
        self.events = events;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn handle(&self) -> Entity {
        self.handle
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Adds `component` under its tag.
    ///
    /// When the tag is already occupied the previous component is handed back
    /// undisposed; the caller owns it from then on.
    #[must_use = "a displaced component is returned undisposed"]
    pub fn add_component<C: Component>(&mut self, component: C) -> Option<Box<dyn Component>> {
        self.add_boxed(Box::new(component))
    }

    #[must_use = "a displaced component is returned undisposed"]
    pub fn add_boxed(&mut self, mut component: Box<dyn Component>) -> Option<Box<dyn Component>> {
        let tag = component.type_tag();
        component.on_attach(self.handle);
        let displaced = self.components.insert(tag, component);
        if displaced.is_some() {
            self.report(
                LogLevel::Warn,
                "component_replaced",
                format!("component '{tag}' on {} was overwritten", self.id),
                json!({ "component": tag }),
            );
        }
        displaced
    }

    /// Adds `component`, disposing whatever held the tag before.
    pub fn replace_component<C: Component>(&mut self, component: C) {
        let mut component: Box<dyn Component> = Box::new(component);
        component.on_attach(self.handle);
        if let Some(mut previous) = self.components.insert(component.type_tag(), component) {
            previous.dispose();
        }
    }

    /// Detaches the component under `tag` without disposing it.
    ///
    /// This touches the object alone. Go through [`World::remove_component`]
    /// for a node so its parent and children are unlinked too.
    ///
    /// [`World::remove_component`]: crate::ecs::World::remove_component
    pub fn remove_component(&mut self, tag: &str) -> Option<Box<dyn Component>> {
        self.components.shift_remove(tag)
    }

    pub fn has_component(&self, tag: &str) -> bool {
        self.components.contains_key(tag)
    }

    pub fn component(&self, tag: &str) -> Option<&dyn Component> {
        self.components.get(tag).map(|component| &**component)
    }

    pub fn get_component<T: TypedComponent>(&self) -> Option<&T> {
        let component: &dyn Component = &**self.components.get(T::TAG)?;
        component.as_any().downcast_ref::<T>()
    }

    pub fn get_component_mut<T: TypedComponent>(&mut self) -> Option<&mut T> {
        let component: &mut dyn Component = &mut **self.components.get_mut(T::TAG)?;
        component.as_any_mut().downcast_mut::<T>()
    }

    /// Components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &dyn Component> + '_ {
        self.components.values().map(|component| &**component)
    }

    pub fn component_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.keys().copied()
    }

    pub fn update(&mut self, delta_seconds: f32) {
        if self.disposed {
            return;
        }
        for component in self.components.values_mut() {
            component.update(delta_seconds);
        }
    }

    pub(crate) fn commit_tick(&mut self) {
        for component in self.components.values_mut() {
            component.commit_tick();
        }
    }

    /// Disposes every component once, then drops them and all listeners.
    ///
    /// Returns `false` when the object was already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        for (_, mut component) in self.components.drain(..) {
            component.dispose();
        }
        self.listeners.clear();
        self.disposed = true;
        true
    }

    /// Collects every component blob; components that fail are skipped and
    /// reported rather than aborting the whole object.
    pub fn serialize(&self) -> GameObjectData {
        let mut components = IndexMap::with_capacity(self.components.len());
        for (tag, component) in &self.components {
            match component.serialize() {
                Ok(blob) => {
                    components.insert(tag.to_string(), blob);
                }
                Err(err) => self.report_component_failure("serialize_failed", tag, &err),
            }
        }
        GameObjectData {
            id: self.id.clone(),
            object_type: self.object_type.clone(),
            components,
            metadata: ObjectMetadata {
                created_at: self.created_at,
                version: DATA_VERSION.to_string(),
            },
        }
    }

    /// Routes each blob in `data` to the component of the same tag.
    pub fn deserialize(&mut self, data: &GameObjectData) -> DeserializeReport {
        let mut report = DeserializeReport::default();
        let mut failures = Vec::new();
        for (tag, blob) in &data.components {
            match self.components.get_mut(tag.as_str()) {
                Some(component) => match component.deserialize(blob) {
                    Ok(()) => report.applied.push(tag.clone()),
                    Err(err) => {
                        report.failed.push(tag.clone());
                        failures.push((tag.clone(), err));
                    }
                },
                None => report.missing.push(tag.clone()),
            }
        }
        for (tag, err) in failures {
            self.report_component_failure("deserialize_failed", &tag, &err);
        }
        if !report.missing.is_empty() {
            self.report(
                LogLevel::Warn,
                "component_missing",
                format!(
                    "{} has no components for saved tags {:?}",
                    self.id, report.missing
                ),
                json!({ "tags": report.missing }),
            );
        }
        report
    }

    /// Builds the wire snapshot from components that declare a snapshot role.
    pub fn network_snapshot(&self) -> NetworkSnapshot {
        let mut snapshot = NetworkSnapshot {
            id: self.id.clone(),
            timestamp: current_time_millis(),
            position: None,
            health: None,
            state: None,
        };
        let mut state = Map::new();
        for (tag, component) in &self.components {
            let Some(role) = component.snapshot_role() else {
                continue;
            };
            match component.snapshot() {
                Ok(blob) => match role {
                    SnapshotRole::Position => snapshot.position = Some(blob),
                    SnapshotRole::Health => snapshot.health = Some(blob),
                    SnapshotRole::State => {
                        state.insert(tag.to_string(), blob);
                    }
                },
                Err(err) => self.report_component_failure("snapshot_failed", tag, &err),
            }
        }
        if !state.is_empty() {
            snapshot.state = Some(Value::Object(state));
        }
        snapshot
    }

    pub fn apply_network_snapshot(
        &mut self,
        snapshot: &NetworkSnapshot,
    ) -> Result<DeserializeReport, EcsError> {
        if snapshot.id != self.id {
            return Err(EcsError::SnapshotMismatch {
                expected: self.id.clone(),
                actual: snapshot.id.clone(),
            });
        }

        let mut routed: Vec<(String, &Value)> = Vec::new();
        for (role, blob) in [
            (SnapshotRole::Position, snapshot.position.as_ref()),
            (SnapshotRole::Health, snapshot.health.as_ref()),
        ] {
            let Some(blob) = blob else { continue };
            if let Some(tag) = self.tag_for_role(role) {
                routed.push((tag.to_string(), blob));
            }
        }
        if let Some(Value::Object(state)) = &snapshot.state {
            for (tag, blob) in state {
                routed.push((tag.clone(), blob));
            }
        }

        let mut report = DeserializeReport::default();
        let mut failures = Vec::new();
        for (tag, blob) in routed {
            match self.components.get_mut(tag.as_str()) {
                Some(component) => match component.apply_snapshot(blob) {
                    Ok(()) => report.applied.push(tag),
                    Err(err) => {
                        report.failed.push(tag.clone());
                        failures.push((tag, err));
                    }
                },
                None => report.missing.push(tag),
            }
        }
        for (tag, err) in failures {
            self.report_component_failure("snapshot_apply_failed", &tag, &err);
        }
        Ok(report)
    }

    fn tag_for_role(&self, role: SnapshotRole) -> Option<&'static str> {
        self.components
            .iter()
            .find(|(_, component)| component.snapshot_role() == Some(role))
            .map(|(tag, _)| *tag)
    }

    pub fn on<F>(&mut self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::new(self.next_listener);
        self.next_listener += 1;
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, callbacks| {
            let before = callbacks.len();
            callbacks.retain(|(listener, _)| *listener != id);
            removed |= callbacks.len() != before;
            !callbacks.is_empty()
        });
        removed
    }

    /// Invokes every listener for `event` and returns how many ran.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let Some(callbacks) = self.listeners.get(event) else {
            return 0;
        };
        let callbacks: Vec<ObjectCallback> =
            callbacks.iter().map(|(_, callback)| callback.clone()).collect();
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    fn report_component_failure(&self, event_type: &str, tag: &str, err: &ComponentError) {
        self.report(
            LogLevel::Error,
            event_type,
            format!("{}: {err}", self.id),
            json!({ "component": tag }),
        );
    }

    fn report(&self, level: LogLevel, event_type: &str, message: String, context: Value) {
        match level {
            LogLevel::Error => log::error!("[object] {message}"),
            LogLevel::Warn => log::warn!("[object] {message}"),
            _ => log::debug!("[object] {message}"),
        }
        let Some(events) = self.events.as_ref().and_then(WeakEventStack::upgrade) else {
            return;
        };
        let category = if level == LogLevel::Error {
            EventCategory::Error
        } else {
            EventCategory::System
        };
        events.record(
            LogRecord::new(category, level, event_type, message)
                .context(context)
                .source(self.id.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{World, from_blob, to_blob};
    use crate::events::EventStackHandle;
    use crate::game::Health;
    use std::any::Any;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked {
        label: &'static str,
        disposals: Arc<AtomicUsize>,
    }

    impl Component for Tracked {
        fn type_tag(&self) -> &'static str {
            "tracked"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn dispose(&mut self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }

        fn serialize(&self) -> Result<Value, ComponentError> {
            to_blob("tracked", &self.label)
        }

        fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError> {
            let _: String = from_blob("tracked", blob)?;
            Ok(())
        }
    }

    impl TypedComponent for Tracked {
        const TAG: &'static str = "tracked";
    }

    struct Broken;

    impl Component for Broken {
        fn type_tag(&self) -> &'static str {
            "broken"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn serialize(&self) -> Result<Value, ComponentError> {
            Err(ComponentError::InvalidState {
                tag: "broken".into(),
                reason: "cannot persist".into(),
            })
        }

        fn deserialize(&mut self, _blob: &Value) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn tracked(label: &'static str, counter: &Arc<AtomicUsize>) -> Tracked {
        Tracked {
            label,
            disposals: counter.clone(),
        }
    }

    #[test]
    fn duplicate_add_returns_previous_without_disposing() {
        let mut world = World::new();
        let entity = world.spawn("train");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let object = world.get_mut(entity).unwrap();

        assert!(object.add_component(tracked("a", &first)).is_none());
        let displaced = object.add_component(tracked("b", &second));

        let displaced = displaced.expect("first component should be handed back");
        let displaced = displaced.as_any().downcast_ref::<Tracked>().unwrap();
        assert_eq!(displaced.label, "a");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(object.get_component::<Tracked>().unwrap().label, "b");
    }

    #[test]
    fn replace_component_disposes_previous() {
        let mut world = World::new();
        let entity = world.spawn("train");
        let first = Arc::new(AtomicUsize::new(0));
        let object = world.get_mut(entity).unwrap();

        assert!(object.add_component(tracked("a", &first)).is_none());
        object.replace_component(tracked("b", &Arc::new(AtomicUsize::new(0))));

        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_runs_each_component_once() {
        let mut world = World::new();
        let entity = world.spawn("train");
        let counter = Arc::new(AtomicUsize::new(0));
        let object = world.get_mut(entity).unwrap();
        assert!(object.add_component(tracked("a", &counter)).is_none());
        assert!(object.add_component(Health::new(3.0)).is_none());

        assert!(object.dispose());
        assert!(!object.dispose());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(object.components().count(), 0);
        assert!(object.is_disposed());
    }

    #[test]
    fn serialize_skips_failing_components_and_reports() {
        let events = EventStackHandle::default();
        let mut world = World::with_event_stack(events.clone());
        let entity = world.spawn("enemy");
        let object = world.get_mut(entity).unwrap();
        assert!(object.add_component(Broken).is_none());
        assert!(object.add_component(Health::new(8.0)).is_none());

        let data = object.serialize();

        assert_eq!(data.id, "enemy_1");
        assert_eq!(data.object_type, "enemy");
        assert_eq!(data.components.keys().collect::<Vec<_>>(), vec!["health"]);
        assert_eq!(data.metadata.version, DATA_VERSION);
        let logged = events.get_all_events();
        assert!(logged.iter().any(|entry| entry.event_type == "serialize_failed"
            && entry.category == EventCategory::Error));
    }

    #[test]
    fn deserialize_reports_missing_components() {
        let mut world = World::new();
        let source = world.spawn("enemy");
        assert!(world.insert(source, Health::new(12.0)).unwrap().is_none());
        world.component_mut::<Health>(source).unwrap().damage(5.0);
        let mut data = world.get(source).unwrap().serialize();
        data.components.insert("shield".into(), json!({ "charge": 1 }));

        let target = world.spawn("enemy");
        assert!(world.insert(target, Health::new(12.0)).unwrap().is_none());
        let report = world.get_mut(target).unwrap().deserialize(&data);

        assert_eq!(report.applied, vec!["health".to_string()]);
        assert_eq!(report.missing, vec!["shield".to_string()]);
        assert!(!report.is_clean());
        assert_eq!(world.component::<Health>(target).unwrap().current(), 7.0);
    }

    #[test]
    fn network_snapshot_routes_roles() {
        let mut world = World::new();
        let entity = world.spawn("enemy");
        assert!(world.insert(entity, Health::new(4.0)).unwrap().is_none());
        let object = world.get(entity).unwrap();

        let snapshot = object.network_snapshot();

        assert_eq!(snapshot.id, "enemy_1");
        assert!(snapshot.position.is_none());
        assert_eq!(snapshot.health, Some(json!({ "current": 4.0, "max": 4.0 })));
        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert!(encoded.get("position").is_none());
    }

    #[test]
    fn apply_snapshot_rejects_foreign_id() {
        let mut world = World::new();
        let entity = world.spawn("enemy");
        let snapshot = NetworkSnapshot {
            id: "enemy_99".into(),
            timestamp: 0,
            position: None,
            health: None,
            state: None,
        };

        let err = world
            .get_mut(entity)
            .unwrap()
            .apply_network_snapshot(&snapshot)
            .unwrap_err();
        assert!(matches!(err, EcsError::SnapshotMismatch { .. }));
    }

    #[test]
    fn emitter_delivers_until_removed() {
        let mut world = World::new();
        let entity = world.spawn("station");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let object = world.get_mut(entity).unwrap();
        let sink = seen.clone();
        let id = object.on("arrived", move |payload| {
            sink.lock().unwrap().push(payload.clone());
        });

        assert_eq!(object.emit("arrived", &json!({ "train": "train_1" })), 1);
        assert!(object.off(id));
        assert_eq!(object.emit("arrived", &json!(null)), 0);
        assert!(!object.off(id));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
