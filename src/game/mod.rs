//! Rail-yard gameplay built on the engine core: trains that follow rails,
//! damageable objects and the commands that act on them.

mod health;
mod rail;

pub use health::{HEALTH_TAG, Health};
pub use rail::{RAIL_MOVEMENT_TAG, RailMovement};

use crate::ecs::save::ComponentRegistry;
use crate::ecs::{EcsError, Entity, World};
use crate::engine::schedule::{Scheduler, Stage};
use crate::events::{EventCategory, GameEvent, GameEventError, LogLevel, LogRecord};
use crate::scene::NodeComponent;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const EVENT_DAMAGE: &str = "damage";
pub const EVENT_DESPAWN: &str = "despawn";
pub const EVENT_TRAIN_ARRIVED: &str = "trainArrived";

pub const TRAIN_TYPE: &str = "train";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagePayload {
    pub target: String,
    pub amount: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPayload {
    pub target: String,
}

pub fn damage_event(target: &str, amount: f32) -> GameEvent {
    GameEvent::new(EVENT_DAMAGE, json!({ "target": target, "amount": amount }))
}

pub fn despawn_event(target: &str) -> GameEvent {
    GameEvent::new(EVENT_DESPAWN, json!({ "target": target }))
}

pub fn register_components(registry: &mut ComponentRegistry) {
    registry.register::<RailMovement>().register::<Health>();
}

/// Spawns a train at the start of a rail running along +Z.
pub fn spawn_train(world: &mut World, rail_length: f32, speed: f32) -> Result<Entity, EcsError> {
    let train = world.spawn(TRAIN_TYPE);
    let rail = RailMovement::new(rail_length, speed);
    world.insert(train, NodeComponent::at(rail.position_on_rail()))?;
    world.insert(train, rail)?;
    Ok(train)
}

/// Registers the gameplay systems and command handlers.
///
/// Rail progress itself advances through object updates, so the scheduler
/// must also run `World::update_objects` ahead of these systems (the engine
/// registers it first).
pub fn install(scheduler: &mut Scheduler) {
    scheduler.add_system_fn(Stage::Simulation, "rail_follow", |world, _| rail_follow(world));
    scheduler.add_system_fn(Stage::Simulation, "train_arrival", |world, _| {
        detect_arrivals(world)
    });
    scheduler.register_event_handler(EVENT_DAMAGE, handle_damage);
    scheduler.register_event_handler(EVENT_DESPAWN, handle_despawn);
    scheduler.register_event_handler(EVENT_TRAIN_ARRIVED, handle_train_arrived);
}

fn rail_follow(world: &mut World) {
    let placements: Vec<_> = world
        .component_entries::<RailMovement>()
        .into_iter()
        .map(|(entity, rail)| (entity, rail.position_on_rail()))
        .collect();
    for (entity, position) in placements {
        if let Some(node) = world.node_mut(entity) {
            node.set_position(position);
        }
    }
}

fn detect_arrivals(world: &mut World) {
    let trains: Vec<Entity> = world
        .component_entries::<RailMovement>()
        .into_iter()
        .map(|(entity, _)| entity)
        .collect();
    for train in trains {
        let arrived = world
            .component_mut::<RailMovement>(train)
            .is_some_and(RailMovement::take_arrival);
        if !arrived {
            continue;
        }
        let Some(id) = world.get(train).map(|object| object.id().to_string()) else {
            continue;
        };
        log::debug!("[game] {id} reached the end of its rail");
        if let Some(events) = world.event_stack() {
            events.push_game_event(
                GameEvent::new(EVENT_TRAIN_ARRIVED, json!({ "target": id }))
                    .with_source("train_arrival"),
            );
        }
    }
}

fn find_target(world: &World, event: &GameEvent, target: &str) -> Result<Entity, GameEventError> {
    world.find(target).ok_or_else(|| GameEventError::Rejected {
        kind: event.kind.clone(),
        reason: format!("no object with id '{target}'"),
    })
}

fn record(world: &World, record: LogRecord) {
    if let Some(events) = world.event_stack() {
        events.record(record);
    }
}

fn handle_damage(world: &mut World, event: &GameEvent) -> Result<(), GameEventError> {
    let payload: DamagePayload = event.payload_as()?;
    let entity = find_target(world, event, &payload.target)?;
    let health = world
        .component_mut::<Health>(entity)
        .ok_or_else(|| GameEventError::Rejected {
            kind: event.kind.clone(),
            reason: format!("'{}' has no health", payload.target),
        })?;
    let died = health.damage(payload.amount);
    let remaining = health.current();

    let context = json!({ "target": payload.target, "amount": payload.amount, "remaining": remaining });
    if died {
        record(
            world,
            LogRecord::new(
                EventCategory::Combat,
                LogLevel::Info,
                "entity_killed",
                format!("{} destroyed", payload.target),
            )
            .context(context),
        );
        if let Some(events) = world.event_stack() {
            events.push_game_event(despawn_event(&payload.target).with_source(EVENT_DAMAGE));
        }
    } else {
        record(
            world,
            LogRecord::new(
                EventCategory::Combat,
                LogLevel::Debug,
                "damage_applied",
                format!("{} took {} damage", payload.target, payload.amount),
            )
            .context(context),
        );
    }
    Ok(())
}

fn handle_despawn(world: &mut World, event: &GameEvent) -> Result<(), GameEventError> {
    let payload: TargetPayload = event.payload_as()?;
    let entity = find_target(world, event, &payload.target)?;
    world.despawn(entity)?;
    record(
        world,
        LogRecord::new(
            EventCategory::Game,
            LogLevel::Info,
            "entity_despawned",
            format!("{} removed", payload.target),
        ),
    );
    Ok(())
}

fn handle_train_arrived(world: &mut World, event: &GameEvent) -> Result<(), GameEventError> {
    let payload: TargetPayload = event.payload_as()?;
    find_target(world, event, &payload.target)?;
    record(
        world,
        LogRecord::new(
            EventCategory::Station,
            LogLevel::Info,
            "train_arrived",
            format!("{} arrived at the station", payload.target),
        )
        .context(json!({ "train": payload.target })),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> Scheduler {
        let mut scheduler = Scheduler::default();
        scheduler.add_system_fn(Stage::Simulation, "update_objects", |world, tick| {
            world.update_objects(tick.delta_seconds);
        });
        install(&mut scheduler);
        scheduler
    }

    #[test]
    fn trains_follow_their_rail() {
        let mut scheduler = scheduler();
        let train = spawn_train(scheduler.world_mut(), 1.6, 10.0).unwrap();

        scheduler.step();

        let world = scheduler.world();
        let progress = world.component::<RailMovement>(train).unwrap().progress();
        assert!((progress - 0.1).abs() < 1e-5);
        let position = world.node(train).unwrap().local().position;
        assert!((position.z - 0.16).abs() < 1e-5);
    }

    #[test]
    fn arrival_is_announced_once() {
        let mut scheduler = scheduler();
        spawn_train(scheduler.world_mut(), 0.1, 10.0).unwrap();

        for _ in 0..3 {
            scheduler.step();
        }

        let arrivals = scheduler
            .events()
            .lock()
            .events_by_category(EventCategory::Station)
            .len();
        assert_eq!(arrivals, 1);
    }

    #[test]
    fn lethal_damage_despawns_on_next_tick() {
        let mut scheduler = scheduler();
        let enemy = {
            let world = scheduler.world_mut();
            let enemy = world.spawn("enemy");
            world.insert(enemy, Health::new(5.0)).unwrap();
            enemy
        };

        scheduler.push_event(damage_event("enemy_1", 2.0));
        scheduler.step();
        assert_eq!(scheduler.world().component::<Health>(enemy).unwrap().current(), 3.0);

        scheduler.push_event(damage_event("enemy_1", 9.0));
        scheduler.step();
        assert!(scheduler.world().contains(enemy));

        scheduler.step();
        assert!(!scheduler.world().contains(enemy));
        assert!(scheduler.world().find("enemy_1").is_none());
    }

    #[test]
    fn bad_commands_are_logged_as_errors() {
        let mut scheduler = scheduler();
        scheduler.push_event(damage_event("ghost", 1.0));
        scheduler.push_event(GameEvent::new(EVENT_DESPAWN, json!({ "wrong": 1 })));

        let profile = scheduler.step().clone();

        assert_eq!(profile.drain.failed, 2);
        assert_eq!(
            scheduler
                .events()
                .lock()
                .events_by_category(EventCategory::Error)
                .len(),
            2
        );
    }
}
