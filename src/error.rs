use thiserror::Error;

use crate::object::ObjectHandle;

/// Precondition violations raised by the math library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("cannot normalize a zero-length vector")]
    DegenerateVector,
    #[error("matrix is singular and has no inverse")]
    SingularMatrix,
    #[error("invalid perspective frustum")]
    InvalidFrustum,
    #[error("view direction and up vector do not span a basis")]
    DegenerateBasis,
}

/// Errors surfaced by the engine, the renderer and their collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("render object {0} is not tracked by the renderer")]
    UnknownObject(ObjectHandle),
    #[error("render object has invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid light parameter {name}: {reason}")]
    InvalidLightParameter { name: &'static str, reason: String },
    #[error("invalid color {name}: {reason}")]
    InvalidColor { name: &'static str, reason: String },
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("shader program link failed: {0}")]
    ShaderLink(String),
    #[error("engine initialization failed: {0}")]
    InitializationFailure(String),
    #[error("failed to parse render object: {0}")]
    Parse(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
