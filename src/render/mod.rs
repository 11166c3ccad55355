//! Render-object bookkeeping and the GPU backend seam.
//!
//! [`Renderer`] is the single owner of every tracked [`RenderObject`] and of
//! the backend buffers uploaded for it. Callers refer to objects only through
//! the [`ObjectHandle`] returned by [`Renderer::init_buffers`].

mod common;
pub mod headless;
pub mod native;

use std::collections::BTreeMap;

use log::debug;

use crate::error::{EngineError, Result};
use crate::object::{ObjectHandle, RenderObject};

pub use common::{
    interleave_vertices, ColorSource, GlobalUniform, MaterialUniform, RenderParams,
    FLOATS_PER_VERTEX,
};
pub use headless::HeadlessBackend;
pub use native::WgpuBackend;

/// GPU side of the renderer.
///
/// Implementations allocate, update and release the resources for one render
/// object and draw the tracked objects for a frame.
pub trait RenderBackend {
    type Buffers;

    fn upload(&mut self, handle: ObjectHandle, object: &RenderObject)
        -> anyhow::Result<Self::Buffers>;

    fn update(
        &mut self,
        handle: ObjectHandle,
        buffers: &mut Self::Buffers,
        object: &RenderObject,
    ) -> anyhow::Result<()>;

    fn release(&mut self, handle: ObjectHandle, buffers: Self::Buffers);

    /// Draws `draws` in order. Called once per frame.
    fn draw(&mut self, params: &RenderParams, draws: &[DrawCall<'_, Self::Buffers>])
        -> anyhow::Result<()>;
}

/// One object queued for drawing.
#[derive(Debug)]
pub struct DrawCall<'a, T> {
    pub handle: ObjectHandle,
    pub object: &'a RenderObject,
    pub buffers: &'a T,
}

struct Entry<T> {
    object: RenderObject,
    buffers: T,
}

/// Tracks render objects and their backend buffers in insertion order.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    entries: BTreeMap<ObjectHandle, Entry<B::Buffers>>,
    next_id: u64,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Uploads `object` and starts tracking it. Every call allocates new
    /// buffers and returns a new handle, even for identical objects.
    pub fn init_buffers(&mut self, object: RenderObject) -> Result<ObjectHandle> {
        object
            .validate()
            .map_err(|err| EngineError::InvalidGeometry(format!("{err:#}")))?;
        let handle = ObjectHandle::new(self.next_id);
        let buffers = self.backend.upload(handle, &object)?;
        self.next_id += 1;
        debug!(
            "uploaded render object {handle} ({} vertices)",
            object.geometry.vertex_count()
        );
        self.entries.insert(handle, Entry { object, buffers });
        Ok(handle)
    }

    /// Re-uploads the current data of a tracked object after it was modified
    /// in place.
    pub fn refresh_buffers(&mut self, handle: ObjectHandle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(EngineError::UnknownObject(handle))?;
        entry
            .object
            .validate()
            .map_err(|err| EngineError::InvalidGeometry(format!("{err:#}")))?;
        self.backend
            .update(handle, &mut entry.buffers, &entry.object)?;
        debug!("refreshed render object {handle}");
        Ok(())
    }

    /// Releases the buffers of `handle` and hands the object back.
    pub fn remove_buffer(&mut self, handle: ObjectHandle) -> Result<RenderObject> {
        let entry = self
            .entries
            .remove(&handle)
            .ok_or(EngineError::UnknownObject(handle))?;
        self.backend.release(handle, entry.buffers);
        debug!("released render object {handle}");
        Ok(entry.object)
    }

    /// Draws every tracked object in insertion order.
    pub fn render_all(&mut self, params: &RenderParams) -> Result<()> {
        let draws: Vec<_> = self
            .entries
            .iter()
            .map(|(handle, entry)| DrawCall {
                handle: *handle,
                object: &entry.object,
                buffers: &entry.buffers,
            })
            .collect();
        self.backend.draw(params, &draws)?;
        Ok(())
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&RenderObject> {
        self.entries.get(&handle).map(|entry| &entry.object)
    }

    /// Mutable access to a tracked object. Changes reach the GPU on the next
    /// [`refresh_buffers`](Self::refresh_buffers).
    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut RenderObject> {
        self.entries.get_mut(&handle).map(|entry| &mut entry.object)
    }

    /// Handles in draw order.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
