//! Contact lifecycle
//!
//! Turns broad-phase pairs into contacts, keeps them updated each step and
//! destroys them once their proxies separate or filtering rejects them.

use ahash::AHashMap;
use pegbox_core::pool::Pool;

use super::body::{Body, ContactEdge};
use super::contact::{Contact, ContactFlags, pair_order};
use super::fixture::{Fixture, ProxyKey};
use super::joints::Joint;
use super::listener::{ContactFilter, ContactRef, DefaultContactFilter, ListenerSlot};
use super::{BodyHandle, ContactHandle};
use crate::collision::BroadPhase;
use crate::settings::Settings;

type PairKey = (ProxyKey, ProxyKey);

fn pair_key(a: ProxyKey, b: ProxyKey) -> PairKey {
    if a <= b { (a, b) } else { (b, a) }
}

/// Listener view of a live contact
pub(crate) fn contact_ref<'a>(
    handle: ContactHandle,
    contacts: &'a Pool<Contact>,
    fixtures: &'a Pool<Fixture>,
    bodies: &Pool<Body>,
) -> Option<ContactRef<'a>> {
    let contact = contacts.get(handle.0)?;
    Some(ContactRef {
        handle,
        contact,
        fixture_a: fixtures.get(contact.fixture_a.0)?,
        fixture_b: fixtures.get(contact.fixture_b.0)?,
        xf_a: bodies.get(contact.body_a.0)?.xf,
        xf_b: bodies.get(contact.body_b.0)?.xf,
    })
}

/// Body-level collision rules: at least one dynamic body, and no joint
/// between them that forbids collision.
pub(crate) fn should_collide_bodies(
    bodies: &Pool<Body>,
    joints: &Pool<Joint>,
    body_a: BodyHandle,
    body_b: BodyHandle,
) -> bool {
    let (Some(a), Some(b)) = (bodies.get(body_a.0), bodies.get(body_b.0)) else {
        return false;
    };
    if !a.should_collide_type(b) {
        return false;
    }
    !b.joints
        .iter()
        .any(|edge| edge.other == body_a && joints.get(edge.joint.0).is_some_and(|joint| !joint.collide_connected))
}

pub(crate) struct ContactManager {
    pub broad_phase: BroadPhase<ProxyKey>,
    pub contacts: Pool<Contact>,
    pair_map: AHashMap<PairKey, ContactHandle>,
    pub filter: Box<dyn ContactFilter>,
    pending_pairs: Vec<(ProxyKey, ProxyKey)>,
    scratch: Vec<ContactHandle>,
}

impl ContactManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            broad_phase: BroadPhase::new(settings),
            contacts: Pool::new(),
            pair_map: AHashMap::new(),
            filter: Box::new(DefaultContactFilter),
            pending_pairs: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Create contacts for every new overlapping proxy pair
    pub fn find_new_contacts(&mut self, bodies: &mut Pool<Body>, fixtures: &Pool<Fixture>, joints: &Pool<Joint>) {
        let mut pairs = std::mem::take(&mut self.pending_pairs);
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for (a, b) in pairs.drain(..) {
            self.add_pair(a, b, bodies, fixtures, joints);
        }
        self.pending_pairs = pairs;
    }

    fn add_pair(
        &mut self,
        key_a: ProxyKey,
        key_b: ProxyKey,
        bodies: &mut Pool<Body>,
        fixtures: &Pool<Fixture>,
        joints: &Pool<Joint>,
    ) {
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(key_a.fixture.0), fixtures.get(key_b.fixture.0)) else {
            return;
        };

        // Fixtures on the same body never collide.
        if fixture_a.body == fixture_b.body {
            return;
        }

        let key = pair_key(key_a, key_b);
        if self.pair_map.contains_key(&key) {
            return;
        }

        if !should_collide_bodies(bodies, joints, fixture_a.body, fixture_b.body) {
            return;
        }
        if !self.filter.should_collide(fixture_a, fixture_b) {
            return;
        }

        let Some(swap) = pair_order(fixture_a.shape_type(), fixture_b.shape_type()) else {
            return;
        };
        let contact = if swap {
            Contact::new(key_b, fixture_b, key_a, fixture_a)
        } else {
            Contact::new(key_a, fixture_a, key_b, fixture_b)
        };

        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        let handle = ContactHandle(self.contacts.insert(contact));
        self.pair_map.insert(key, handle);

        if let Some(body) = bodies.get_mut(body_a.0) {
            body.contacts.push(ContactEdge {
                other: body_b,
                contact: handle,
            });
            if !sensor {
                body.set_awake(true);
            }
        }
        if let Some(body) = bodies.get_mut(body_b.0) {
            body.contacts.push(ContactEdge {
                other: body_a,
                contact: handle,
            });
            if !sensor {
                body.set_awake(true);
            }
        }
    }

    /// Remove a contact, raising `end_contact` if it was touching
    pub fn destroy(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Pool<Body>,
        fixtures: &Pool<Fixture>,
        listener: &mut ListenerSlot,
    ) {
        let Some(contact) = self.contacts.get(handle.0) else {
            return;
        };

        if contact.is_touching() {
            if let (Some(listener), Some(view)) =
                (listener.as_mut(), contact_ref(handle, &self.contacts, fixtures, bodies))
            {
                log::trace!("end contact {:?} (destroyed)", handle.0);
                listener.end_contact(view);
            }
        }

        let Some(contact) = self.contacts.remove(handle.0) else {
            return;
        };
        self.pair_map.remove(&pair_key(contact.key_a(), contact.key_b()));

        let sensor = [contact.fixture_a, contact.fixture_b]
            .iter()
            .any(|f| fixtures.get(f.0).is_some_and(|fixture| fixture.is_sensor));
        let wake = contact.manifold.point_count() > 0 && !sensor;

        for body_handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_handle.0) {
                body.contacts.retain(|edge| edge.contact != handle);
                if wake {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Narrow phase for every contact: filter, cull separated proxies and
    /// update manifolds, raising listener events as touching changes.
    pub fn collide(
        &mut self,
        bodies: &mut Pool<Body>,
        fixtures: &Pool<Fixture>,
        joints: &Pool<Joint>,
        listener: &mut ListenerSlot,
    ) {
        let mut handles = std::mem::take(&mut self.scratch);
        handles.clear();
        handles.extend(self.contacts.iter().map(|(handle, _)| ContactHandle(handle)));

        for &handle in &handles {
            let Some(contact) = self.contacts.get(handle.0) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a.0), fixtures.get(contact.fixture_b.0))
            else {
                continue;
            };

            if contact.flags.contains(ContactFlags::FILTER) {
                if !should_collide_bodies(bodies, joints, contact.body_a, contact.body_b)
                    || !self.filter.should_collide(fixture_a, fixture_b)
                {
                    self.destroy(handle, bodies, fixtures, listener);
                    continue;
                }
                self.contacts[handle.0].flags -= ContactFlags::FILTER;
            }

            let contact = &self.contacts[handle.0];
            let (body_a, body_b) = (&bodies[contact.body_a.0], &bodies[contact.body_b.0]);

            // Nothing moves if both are asleep or static.
            if !body_a.is_active() && !body_b.is_active() {
                continue;
            }

            let proxy_a = fixture_a.proxies.get(contact.child_a).map(|p| p.proxy_id);
            let proxy_b = fixture_b.proxies.get(contact.child_b).map(|p| p.proxy_id);
            let overlap = match (proxy_a, proxy_b) {
                (Some(a), Some(b)) => self.broad_phase.test_overlap(a, b),
                _ => false,
            };
            if !overlap {
                self.destroy(handle, bodies, fixtures, listener);
                continue;
            }

            let (xf_a, xf_b) = (body_a.xf, body_b.xf);
            let (body_a, body_b) = (contact.body_a, contact.body_b);
            let update = self.contacts[handle.0].update(fixture_a, &xf_a, fixture_b, &xf_b);

            if !update.sensor && update.touching != update.was_touching {
                bodies[body_a.0].set_awake(true);
                bodies[body_b.0].set_awake(true);
            }

            let Some(listener) = listener.as_mut() else {
                continue;
            };
            let Some(view) = contact_ref(handle, &self.contacts, fixtures, bodies) else {
                continue;
            };

            if !update.was_touching && update.touching {
                log::trace!("begin contact {:?}", handle.0);
                listener.begin_contact(view);
            } else if update.was_touching && !update.touching {
                log::trace!("end contact {:?}", handle.0);
                listener.end_contact(view);
            }

            if !update.sensor && update.touching && !listener.pre_solve(view, &update.old_manifold) {
                self.contacts[handle.0].flags -= ContactFlags::ENABLED;
            }
        }

        self.scratch = handles;
    }

    /// Mark contacts between two bodies for re-filtering on the next step
    pub fn flag_for_filtering(&mut self, bodies: &Pool<Body>, body_a: BodyHandle, body_b: BodyHandle) {
        let Some(body) = bodies.get(body_b.0) else {
            return;
        };
        for edge in &body.contacts {
            if edge.other == body_a {
                if let Some(contact) = self.contacts.get_mut(edge.contact.0) {
                    contact.flags |= ContactFlags::FILTER;
                }
            }
        }
    }
}
