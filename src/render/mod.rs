use crate::ecs::{Entity, World};
use crate::engine::lighting::SunState;
use crate::scene::Transform;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Write-only boundary to whatever draws the scene.
///
/// The simulation never reads anything back through this trait.
pub trait RenderAdapter: Send {
    fn label(&self) -> &'static str;

    fn set_local_transform(&mut self, node: Entity, transform: &Transform);

    fn set_visible(&mut self, node: Entity, visible: bool);

    /// Releases the presentation resource backing `node`.
    fn dispose(&mut self, node: Entity);

    fn set_lighting(&mut self, _sun: &SunState) {}
}

#[derive(Debug, Default)]
pub struct NullRenderAdapter {
    transforms_pushed: u64,
}

impl NullRenderAdapter {
    pub fn transforms_pushed(&self) -> u64 {
        self.transforms_pushed
    }
}

impl RenderAdapter for NullRenderAdapter {
    fn label(&self) -> &'static str {
        "Null Render Adapter"
    }

    fn set_local_transform(&mut self, _node: Entity, _transform: &Transform) {
        self.transforms_pushed += 1;
    }

    fn set_visible(&mut self, node: Entity, visible: bool) {
        log::trace!("[renderer] {:?} visible={visible}", node);
    }

    fn dispose(&mut self, node: Entity) {
        log::trace!("[renderer] dispose {:?}", node);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    LocalTransform { node: Entity, transform: Transform },
    Visibility { node: Entity, visible: bool },
    Dispose { node: Entity },
    Lighting(SunState),
}

/// Adapter that keeps every call for later inspection. Clones share the
/// same call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderAdapter {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderAdapter {
    fn log(&self) -> MutexGuard<'_, Vec<RenderCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.log().clone()
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    /// Most recent transform pushed for `node`.
    pub fn last_transform(&self, node: Entity) -> Option<Transform> {
        self.log().iter().rev().find_map(|call| match call {
            RenderCall::LocalTransform { node: target, transform } if *target == node => {
                Some(*transform)
            }
            _ => None,
        })
    }

    pub fn last_lighting(&self) -> Option<SunState> {
        self.log().iter().rev().find_map(|call| match call {
            RenderCall::Lighting(sun) => Some(*sun),
            _ => None,
        })
    }
}

impl RenderAdapter for RecordingRenderAdapter {
    fn label(&self) -> &'static str {
        "Recording Render Adapter"
    }

    fn set_local_transform(&mut self, node: Entity, transform: &Transform) {
        self.log().push(RenderCall::LocalTransform {
            node,
            transform: *transform,
        });
    }

    fn set_visible(&mut self, node: Entity, visible: bool) {
        self.log().push(RenderCall::Visibility { node, visible });
    }

    fn dispose(&mut self, node: Entity) {
        self.log().push(RenderCall::Dispose { node });
    }

    fn set_lighting(&mut self, sun: &SunState) {
        self.log().push(RenderCall::Lighting(*sun));
    }
}

/// Shared handle to the active adapter.
#[derive(Clone)]
pub struct RenderHandle {
    inner: Arc<Mutex<Box<dyn RenderAdapter>>>,
}

impl Default for RenderHandle {
    fn default() -> Self {
        Self::new(NullRenderAdapter::default())
    }
}

impl RenderHandle {
    pub fn new(adapter: impl RenderAdapter + 'static) -> Self {
        Self::from_boxed(Box::new(adapter))
    }

    pub fn from_boxed(adapter: Box<dyn RenderAdapter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(adapter)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn RenderAdapter>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self) -> &'static str {
        self.lock().label()
    }
}

/// Pushes every component's interpolated state to the adapter.
///
/// Takes the world by shared reference; presentation never mutates the
/// simulation. Returns the number of objects visited.
pub fn present_world(world: &World, alpha: f32, renderer: &RenderHandle) -> usize {
    let mut adapter = renderer.lock();
    let mut visited = 0;
    for (entity, object) in world.objects() {
        for component in object.components() {
            component.present(entity, alpha, &mut **adapter);
        }
        visited += 1;
    }
    visited
}
