//! Error type shared by the renderer.
//!
//! Most per-frame anomalies never reach this type: malformed drawables are
//! dropped, capability and attachment failures are logged and skipped. What
//! remains is setup-time failure that the caller has to decide about.

use std::fmt;
use std::path::PathBuf;

/// Errors surfaced by fjord's setup and frame APIs.
#[derive(Debug)]
pub enum FjordError {
    /// A configuration value is out of range.
    Config(String),
    /// Projection parameters cannot form a valid frustum.
    Projection(String),
    /// A texture or other file-backed resource failed to load.
    Asset { path: PathBuf, reason: String },
    /// A shader program failed to compile or link.
    Shader { program: String, reason: String },
    /// The presentation surface could not be acquired.
    Surface(String),
    /// Adapter or device creation failed.
    Device(String),
}

impl fmt::Display for FjordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FjordError::Config(e) => write!(f, "invalid renderer config: {e}"),
            FjordError::Projection(e) => write!(f, "invalid projection: {e}"),
            FjordError::Asset { path, reason } => {
                write!(f, "failed to load '{}': {reason}", path.display())
            }
            FjordError::Shader { program, reason } => {
                write!(f, "shader program '{program}' failed: {reason}")
            }
            FjordError::Surface(e) => write!(f, "surface error: {e}"),
            FjordError::Device(e) => write!(f, "device error: {e}"),
        }
    }
}

impl std::error::Error for FjordError {}

pub type Result<T> = std::result::Result<T, FjordError>;
