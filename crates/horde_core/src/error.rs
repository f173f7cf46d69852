//! Error types for the simulation engine.
//!
//! The engine operations themselves degrade to `false` / `None` / empty
//! results. These variants describe *why*, for callers that use the
//! detailed `Result` forms underneath.

use thiserror::Error;

use crate::components::EntityHandle;
use crate::economy::ResourceType;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for the simulation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The handle refers to a destroyed or never-created entity.
    #[error("Invalid entity handle: {0}")]
    InvalidHandle(EntityHandle),

    /// The entity exists but lacks a required component.
    #[error("Entity {handle} has no {component} component")]
    MissingComponent {
        /// Entity that was queried.
        handle: EntityHandle,
        /// Name of the missing component.
        component: &'static str,
    },

    /// Not enough of a resource to cover a withdrawal.
    #[error("Insufficient resources: need {required} {resource:?}, have {available}")]
    InsufficientResources {
        /// Resource type.
        resource: ResourceType,
        /// Amount required.
        required: u32,
        /// Amount available.
        available: u32,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Failed to parse a RON configuration.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Snapshot encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}
