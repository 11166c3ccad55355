//! Backend that keeps no GPU state and records what it was asked to do.
//!
//! Used for tests and for the command line summary mode.

use std::collections::HashMap;

use anyhow::{ensure, Result};

use super::{
    interleave_vertices, ColorSource, DrawCall, GlobalUniform, MaterialUniform, RenderBackend,
    RenderParams,
};
use crate::object::{ObjectHandle, RenderObject};

/// Stand-in for the GPU buffers of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessBuffers {
    pub vertex_floats: usize,
    pub index_count: u32,
    pub textures: usize,
    pub material: MaterialUniform,
    /// Number of uploads this entry has seen, starting at 1.
    pub generation: u32,
}

impl HeadlessBuffers {
    fn from_object(object: &RenderObject, generation: u32) -> Self {
        Self {
            vertex_floats: interleave_vertices(object).len(),
            index_count: object.geometry.indices.len() as u32,
            textures: object.textures.count(),
            material: MaterialUniform::from_object(object),
            generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub handle: ObjectHandle,
    pub index_count: u32,
    pub color_source: ColorSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub clear_color: [f32; 4],
    pub globals: GlobalUniform,
    pub draws: Vec<DrawRecord>,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    live: HashMap<ObjectHandle, u32>,
    uploads: usize,
    updates: usize,
    releases: usize,
    frames: Vec<FrameRecord>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Buffers allocated and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    /// Index count last uploaded for `handle`, if it is still live.
    pub fn buffers_for(&self, handle: ObjectHandle) -> Option<BufferSummary> {
        self.live
            .get(&handle)
            .map(|index_count| BufferSummary {
                index_count: *index_count,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSummary {
    pub index_count: u32,
}

impl RenderBackend for HeadlessBackend {
    type Buffers = HeadlessBuffers;

    fn upload(&mut self, handle: ObjectHandle, object: &RenderObject) -> Result<HeadlessBuffers> {
        ensure!(
            !self.live.contains_key(&handle),
            "buffers for {handle} already exist"
        );
        let buffers = HeadlessBuffers::from_object(object, 1);
        self.live.insert(handle, buffers.index_count);
        self.uploads += 1;
        Ok(buffers)
    }

    fn update(
        &mut self,
        handle: ObjectHandle,
        buffers: &mut HeadlessBuffers,
        object: &RenderObject,
    ) -> Result<()> {
        ensure!(self.live.contains_key(&handle), "buffers for {handle} were released");
        *buffers = HeadlessBuffers::from_object(object, buffers.generation + 1);
        self.live.insert(handle, buffers.index_count);
        self.updates += 1;
        Ok(())
    }

    fn release(&mut self, handle: ObjectHandle, _buffers: HeadlessBuffers) {
        if self.live.remove(&handle).is_some() {
            self.releases += 1;
        }
    }

    fn draw(&mut self, params: &RenderParams, draws: &[DrawCall<'_, HeadlessBuffers>]) -> Result<()> {
        let draws = draws
            .iter()
            .map(|draw| DrawRecord {
                handle: draw.handle,
                index_count: draw.buffers.index_count,
                color_source: ColorSource::of(draw.object),
            })
            .collect();
        self.frames.push(FrameRecord {
            clear_color: params.background_color,
            globals: GlobalUniform::from_params(params),
            draws,
        });
        Ok(())
    }
}
