//! Transform graph: parent/child links between game objects, world-space
//! queries and DOM-style event propagation.

mod events;
mod graph;
mod node;
pub mod transform;

pub use events::{DispatchOutcome, EventPhase, ListenerOptions, NodeCallback, NodeEvent};
pub use graph::MAX_PATH_HOPS;
pub use node::{NODE_TAG, NodeComponent};
pub use transform::{Quat, Transform, Vec3};

use crate::ecs::Entity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("entity {0:?} is not alive")]
    NoSuchEntity(Entity),
    #[error("entity {0:?} has no transform node")]
    MissingNode(Entity),
    #[error("transform node of {0:?} has been disposed")]
    Disposed(Entity),
    #[error("entity {0:?} cannot be its own parent")]
    SelfParent(Entity),
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    CycleRejected { child: Entity, parent: Entity },
}
