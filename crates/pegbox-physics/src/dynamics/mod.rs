//! Rigid body dynamics
//!
//! Bodies, fixtures, contacts and joints live in pools owned by the
//! [`World`]. Hosts refer to them through the typed handles below.

mod body;
mod contact;
mod contact_manager;
mod contact_solver;
mod fixture;
mod island;
pub mod joints;
mod listener;
mod time_step;
mod world;

pub use body::{Body, BodyDef, BodyType};
pub use contact::Contact;
pub use fixture::{Filter, Fixture, FixtureDef};
pub use joints::{DistanceJointDef, Joint, JointDef, JointKind, RevoluteJointDef, WeldJointDef};
pub use listener::{ContactFilter, ContactImpulse, ContactListener, ContactRef, DefaultContactFilter};
pub use world::{RayCastHit, World, WorldConfig};

use pegbox_core::pool::Handle;
use serde::{Deserialize, Serialize};

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) Handle);

        impl $name {
            /// Underlying pool handle
            pub fn raw(&self) -> Handle {
                self.0
            }
        }
    };
}

typed_handle!(
    /// Handle to a body in a [`World`]
    BodyHandle
);
typed_handle!(
    /// Handle to a fixture attached to a body
    FixtureHandle
);
typed_handle!(
    /// Handle to a live contact between two fixture children
    ContactHandle
);
typed_handle!(
    /// Handle to a joint between two bodies
    JointHandle
);
