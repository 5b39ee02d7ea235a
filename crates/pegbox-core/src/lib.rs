//! # Pegbox Core
//!
//! Foundational types shared by the pegbox physics engine and its hosts.
//!
//! - **Math**: 2-D rotations, rigid transforms, sweeps, AABBs and small matrix solves on top of glam
//! - **Pool**: Slab storage with free-list reuse and generational handles
//! - **Time**: Fixed-step accumulator for driving a simulation from variable frame times

pub mod math;
pub mod pool;
pub mod time;

pub use math::{Aabb, Rot, Sweep, Transform, Vec2};
pub use pool::{Handle, Pool, PoolStats};
pub use time::{FixedTimeStep, FixedUpdate, StepClock, Stopwatch};
