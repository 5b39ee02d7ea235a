//! # Pegbox Physics
//!
//! 2-D rigid body simulation for the pegbox peg-board engine.
//!
//! ## Features
//! - Circles, convex polygons, edges and chains
//! - Dynamic AABB tree broad phase with a pair cache
//! - Contact manifolds with feature ids for warm starting
//! - Sequential impulse solver with friction, restitution and a block solver
//! - Distance, revolute and weld joints
//! - Island sleeping
//! - AABB queries and raycasts

pub mod collision;
pub mod dynamics;
pub mod error;
pub mod settings;
pub mod shapes;

pub use collision::{Manifold, RayCastInput, RayCastOutput, WorldManifold};
pub use dynamics::{
    Body, BodyDef, BodyHandle, BodyType, Contact, ContactFilter, ContactHandle, ContactImpulse, ContactListener,
    ContactRef, DistanceJointDef, Filter, Fixture, FixtureDef, FixtureHandle, Joint, JointDef, JointHandle, JointKind,
    RayCastHit, RevoluteJointDef, WeldJointDef, World, WorldConfig,
};
pub use error::{PhysicsError, PhysicsResult};
pub use settings::{Settings, mix_friction, mix_restitution};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeGeometry, ShapeType};
