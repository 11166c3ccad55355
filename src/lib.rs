//! A small real-time 3D rendering engine.
//!
//! The crate owns a camera model, a Phong lighting model and the lifecycle
//! of render objects. GPU work goes through a [`RenderBackend`]: the
//! [`WgpuBackend`] draws to a window surface, the [`HeadlessBackend`] records
//! what it was asked to do so everything above it can run without a GPU.

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod light;
pub mod math;
pub mod obj;
pub mod object;
pub mod render;

pub use bootstrap::{compile_program, init_engine};
pub use config::{EngineConfig, LightConfig};
pub use engine::{Engine, DEFAULT_ROTATION_STEP, PAN_STEP};
pub use error::{EngineError, MathError, Result};
pub use input::{InputState, KeyCode, MouseButton, ViewAction};
pub use light::Light;
pub use math::{TransformationMatrix, Vector3D};
pub use obj::ObjectReader;
pub use object::{Geometry, Material, ObjectHandle, RenderObject, TextureImage, TextureSlot};
pub use render::{HeadlessBackend, RenderBackend, RenderParams, Renderer, WgpuBackend};
