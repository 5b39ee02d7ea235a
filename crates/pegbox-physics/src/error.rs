//! Error types for world construction and lifecycle calls.
//!
//! Only configuration mistakes and stale handles are errors. Numeric
//! degeneracies met during simulation (zero-length edges, coincident
//! centres, singular effective masses) resolve to "no result" instead.

use thiserror::Error;

/// Physics configuration and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("radius must be finite and non-negative, got {0}")]
    NegativeRadius(f32),

    #[error("shape geometry contains a non-finite coordinate")]
    NonFiniteGeometry,

    #[error("{shape} needs at least {min} vertices, got {count}")]
    TooFewVertices {
        shape: &'static str,
        count: usize,
        min: usize,
    },

    #[error("polygon supports at most {max} vertices, got {count}")]
    TooManyVertices { count: usize, max: usize },

    #[error("polygon vertices are collinear or welded into a degenerate hull")]
    DegenerateHull,

    #[error("chain vertices {0} and {1} are closer than the linear slop")]
    VerticesTooClose(usize, usize),

    #[error("density must be finite and non-negative, got {0}")]
    InvalidDensity(f32),

    #[error("friction must be finite and non-negative, got {0}")]
    InvalidFriction(f32),

    #[error("restitution must be finite and non-negative, got {0}")]
    InvalidRestitution(f32),

    #[error("body handle is stale or was never issued by this world")]
    StaleBody,

    #[error("fixture handle is stale or was never issued by this world")]
    StaleFixture,

    #[error("joint handle is stale or was never issued by this world")]
    StaleJoint,

    #[error("a joint must connect two different bodies")]
    JointSameBody,

    #[error("invalid joint parameter: {0}")]
    InvalidJoint(&'static str),
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;
