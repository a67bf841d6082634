//! The error taxonomy for scene construction and rendering: a small `thiserror` enum of named
//! failure modes plus a blanket `anyhow::Error` passthrough for anything that doesn't warrant
//! its own variant.
//!
//! Scene-file parsing and resource loading are out of scope here, so the "input error" and
//! "resource error" categories degrade gracefully as documented in their variants rather than
//! failing construction -- there is no file to fail to read.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A referenced material, medium, or light index was out of range for the scene it was
    /// built against. Can only happen if a caller hand-assembles `Scene` fields without going
    /// through `SceneBuilder`.
    #[error("invalid scene reference: {0}")]
    InvalidReference(String),

    /// The render settings named an integrator or resolution that can't produce a sensible
    /// image (e.g. zero resolution, zero spp).
    #[error("invalid render settings: {0}")]
    InvalidSettings(String),

    /// Wraps a lower-level failure (e.g. image encoding) that doesn't need its own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
