//! Snapshot diffing for keeping a remote mirror of a world in sync.

use super::{NetworkSnapshot, World};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Objects whose snapshot body changed since the previous diff, plus ids that
/// disappeared.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub sequence: u64,
    pub changed: Vec<NetworkSnapshot>,
    pub removed: Vec<String>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SnapshotBody {
    position: Option<Value>,
    health: Option<Value>,
    state: Option<Value>,
}

impl From<&NetworkSnapshot> for SnapshotBody {
    fn from(snapshot: &NetworkSnapshot) -> Self {
        Self {
            position: snapshot.position.clone(),
            health: snapshot.health.clone(),
            state: snapshot.state.clone(),
        }
    }
}

/// Remembers the last snapshot body per object id; timestamps never count as
/// a change.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    last_state: HashMap<String, SnapshotBody>,
    sequence: u64,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&mut self, world: &World) -> SnapshotDelta {
        let mut changed = Vec::new();
        let mut next_state = HashMap::with_capacity(self.last_state.len());

        for snapshot in world.network_snapshots() {
            let body = SnapshotBody::from(&snapshot);
            if self.last_state.get(&snapshot.id) != Some(&body) {
                changed.push(snapshot.clone());
            }
            next_state.insert(snapshot.id, body);
        }

        let mut removed: Vec<String> = self
            .last_state
            .keys()
            .filter(|id| !next_state.contains_key(*id))
            .cloned()
            .collect();
        removed.sort();

        self.last_state = next_state;
        self.sequence += 1;
        SnapshotDelta {
            sequence: self.sequence,
            changed,
            removed,
        }
    }

    pub fn reset(&mut self) {
        self.last_state.clear();
    }
}

impl World {
    /// Applies a delta produced by [`SnapshotTracker::diff`] on another world.
    ///
    /// Unknown ids are skipped with a warning; removed ids are despawned.
    /// Returns the number of snapshots applied.
    pub fn apply_snapshot_delta(&mut self, delta: &SnapshotDelta) -> usize {
        let mut applied = 0;
        for snapshot in &delta.changed {
            let Some(entity) = self.find(&snapshot.id) else {
                log::warn!("[replication] no local object for '{}'", snapshot.id);
                continue;
            };
            let Some(object) = self.get_mut(entity) else {
                continue;
            };
            match object.apply_network_snapshot(snapshot) {
                Ok(_) => applied += 1,
                Err(err) => log::warn!("[replication] {err}"),
            }
        }
        for id in &delta.removed {
            if let Some(entity) = self.find(id) {
                if let Err(err) = self.despawn(entity) {
                    log::warn!("[replication] {err}");
                }
            }
        }
        applied
    }
}
