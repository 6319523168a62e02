//! Object-graph reconstruction engine
//!
//! One `ObjectManager` per session owns every tracked entity. Updates,
//! kills, and queries are serialized through it; there is no locking and
//! no I/O here. Observer notification is a synchronous in-line call during
//! the merge, so observers must not block.
//!
//! Entity lifecycle: unknown -> live (first full update) -> dead (explicit
//! kill, or cascade from an ancestor's kill). A child whose parent has not
//! been seen yet waits in the orphan table; it is adopted the moment the
//! parent appears. A child appears in at most one place at a time: either
//! one live parent's children list or one orphan bucket, never both.

use std::collections::{HashMap, HashSet};

use prism_core::{FullId, LocalId, PrismError, PrismResult, Quaternion, Vector3};
use tracing::{debug, warn};

use crate::object::{Attr, AttrSet, ObjectKind, SceneObject};
use crate::update::ObjectUpdate;

/// Synchronous notifications out of the merge path
pub trait SceneObserver {
    /// A previously unseen entity went live
    fn object_created(&self, _object: &SceneObject) {}

    /// Exactly the attributes whose stored value changed, never merely
    /// the attributes present on the wire
    fn attributes_changed(&self, _object: &SceneObject, _changed: AttrSet) {}

    /// The entity left the scene (explicit kill or cascade)
    fn object_killed(&self, _object: &SceneObject) {}
}

/// Where a relink inserts the child in the parent's children list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Linking {
    /// First sighting: append at the tail
    NewSibling,
    /// Relink of an already-known child: insert at the head
    Readopt,
}

/// Per-session entity table and hierarchy tracker
#[derive(Default)]
pub struct ObjectManager {
    objects: HashMap<LocalId, SceneObject>,
    by_full_id: HashMap<FullId, LocalId>,
    /// Parent handle -> children waiting for that parent to appear
    orphans: HashMap<LocalId, Vec<LocalId>>,
    /// Handles condemned before they were ever seen; discarded on discovery
    kill_pending: HashSet<LocalId>,
    observers: Vec<Box<dyn SceneObserver>>,
}

impl ObjectManager {
    pub fn new() -> Self {
        ObjectManager::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn SceneObserver>) {
        self.observers.push(observer);
    }

    // Read accessors

    pub fn lookup_by_full_id(&self, id: FullId) -> Option<&SceneObject> {
        self.by_full_id.get(&id).and_then(|l| self.objects.get(l))
    }

    pub fn lookup_by_local_id(&self, id: LocalId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All live entities, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    /// Live entities of one kind
    pub fn iter_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &SceneObject> {
        self.objects.values().filter(move |o| o.kind == kind)
    }

    /// Children currently waiting for `parent` to appear
    pub fn orphans_of(&self, parent: LocalId) -> &[LocalId] {
        self.orphans.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    // Update ingestion

    /// Merge one normalized update into the live graph
    pub fn apply_update(&mut self, update: &ObjectUpdate) {
        if update.local_id.is_none() {
            warn!("dropping update without a local id");
            return;
        }
        match update.full_id {
            Some(full_id) => match self.by_full_id.get(&full_id).copied() {
                Some(current) => {
                    let mut changed = AttrSet::empty();
                    if current != update.local_id {
                        self.reassign_local_id(current, update.local_id, full_id);
                        changed.insert(Attr::LocalId);
                    }
                    self.merge(update.local_id, update, changed);
                }
                None => self.create(full_id, update),
            },
            None => {
                // Terse and cache-hit updates only reference known entities
                if self.objects.contains_key(&update.local_id) {
                    self.merge(update.local_id, update, AttrSet::empty());
                } else {
                    warn!(local_id = %update.local_id, "update for unknown object dropped");
                }
            }
        }
    }

    fn create(&mut self, full_id: FullId, update: &ObjectUpdate) {
        let local_id = update.local_id;
        if self.kill_pending.remove(&local_id) {
            debug!(%local_id, "discovered a condemned object; discarding");
            return;
        }
        if let Some(stale) = self.objects.remove(&local_id) {
            // The session reused a handle without killing its holder
            warn!(%local_id, "local id reused; evicting stale object");
            self.by_full_id.remove(&stale.full_id);
            self.unlink_child(local_id, stale.parent);
        }

        let kind = update.kind.unwrap_or(ObjectKind::Prim);
        let mut object = SceneObject::new(full_id, local_id, kind);
        let mut changed = AttrSet::empty();
        Self::merge_attrs(&mut object, update, &mut changed);
        let parent = update.parent.unwrap_or(LocalId::NONE);
        object.parent = parent;

        self.objects.insert(local_id, object);
        self.by_full_id.insert(full_id, local_id);
        if !parent.is_none() {
            self.link_child(local_id, parent, Linking::NewSibling);
        }
        self.adopt_waiting(local_id);

        let object = &self.objects[&local_id];
        for observer in &self.observers {
            observer.object_created(object);
        }
    }

    fn merge(&mut self, local_id: LocalId, update: &ObjectUpdate, mut changed: AttrSet) {
        let object = match self.objects.get_mut(&local_id) {
            Some(object) => object,
            None => return,
        };
        let old_parent = object.parent;
        let new_parent = update.parent.unwrap_or(old_parent);
        Self::merge_attrs(object, update, &mut changed);

        if new_parent != old_parent {
            object.parent = new_parent;
            changed.insert(Attr::Parent);
            self.unlink_child(local_id, old_parent);
            if !new_parent.is_none() {
                self.link_child(local_id, new_parent, Linking::Readopt);
            }
        }

        if !changed.is_empty() {
            let object = &self.objects[&local_id];
            for observer in &self.observers {
                observer.attributes_changed(object, changed);
            }
        }
    }

    /// Fold non-hierarchy attributes in, recording exactly what differed
    fn merge_attrs(object: &mut SceneObject, update: &ObjectUpdate, changed: &mut AttrSet) {
        macro_rules! merge_field {
            ($field:ident, $attr:expr) => {
                if let Some(value) = &update.$field {
                    if *value != object.$field {
                        object.$field = value.clone();
                        changed.insert($attr);
                    }
                }
            };
        }
        merge_field!(kind, Attr::Kind);
        merge_field!(state, Attr::State);
        merge_field!(flags, Attr::Flags);
        merge_field!(position, Attr::Position);
        merge_field!(velocity, Attr::Velocity);
        merge_field!(acceleration, Attr::Acceleration);
        merge_field!(rotation, Attr::Rotation);
        merge_field!(angular_velocity, Attr::AngularVelocity);
        merge_field!(scale, Attr::Scale);
        merge_field!(text, Attr::Text);
        merge_field!(media_url, Attr::MediaUrl);
        merge_field!(sound, Attr::Sound);
        merge_field!(name_values, Attr::NameValues);
        merge_field!(particles, Attr::Particles);
        merge_field!(texture_anim, Attr::TextureAnim);
        merge_field!(crc, Attr::Crc);
        if let Some(plane) = update.collision_plane {
            if object.collision_plane != Some(plane) {
                object.collision_plane = Some(plane);
                changed.insert(Attr::CollisionPlane);
            }
        }
    }

    // Hierarchy bookkeeping

    fn link_child(&mut self, child: LocalId, parent: LocalId, linking: Linking) {
        match self.objects.get_mut(&parent) {
            Some(parent_obj) => match linking {
                Linking::NewSibling => parent_obj.children.push(child),
                Linking::Readopt => parent_obj.children.insert(0, child),
            },
            None => {
                debug!(%child, %parent, "parent not seen yet; child waits in orphan table");
                self.orphans.entry(parent).or_default().push(child);
            }
        }
    }

    fn unlink_child(&mut self, child: LocalId, old_parent: LocalId) {
        if old_parent.is_none() {
            return;
        }
        if let Some(parent_obj) = self.objects.get_mut(&old_parent) {
            parent_obj.children.retain(|c| *c != child);
        }
        let bucket_emptied = match self.orphans.get_mut(&old_parent) {
            Some(bucket) => {
                bucket.retain(|c| *c != child);
                bucket.is_empty()
            }
            None => false,
        };
        if bucket_emptied {
            self.orphans.remove(&old_parent);
        }
    }

    /// Adopt every child that was waiting for this parent, oldest first
    fn adopt_waiting(&mut self, parent: LocalId) {
        let waiting = match self.orphans.remove(&parent) {
            Some(waiting) => waiting,
            None => return,
        };
        for child in waiting {
            if self.objects.contains_key(&child) {
                debug!(%child, %parent, "adopting waiting child");
                self.link_child(child, parent, Linking::NewSibling);
            }
        }
    }

    /// Re-index an entity whose session handle was reassigned mid-life
    fn reassign_local_id(&mut self, old: LocalId, new: LocalId, full_id: FullId) {
        let mut object = match self.objects.remove(&old) {
            Some(object) => object,
            None => return,
        };
        debug!(%old, %new, "local id reassigned");
        object.local_id = new;
        let parent = object.parent;
        self.by_full_id.insert(full_id, new);

        // The handle must change in every index before any field merges:
        // the parent's children list (or the orphan bucket it waits in)...
        if !parent.is_none() {
            if let Some(parent_obj) = self.objects.get_mut(&parent) {
                for c in parent_obj.children.iter_mut() {
                    if *c == old {
                        *c = new;
                    }
                }
            }
            if let Some(bucket) = self.orphans.get_mut(&parent) {
                for c in bucket.iter_mut() {
                    if *c == old {
                        *c = new;
                    }
                }
            }
        }
        // ...its own orphan bucket, whose waiting children still point at it...
        if let Some(waiting) = self.orphans.remove(&old) {
            for &child in &waiting {
                if let Some(child_obj) = self.objects.get_mut(&child) {
                    child_obj.parent = new;
                }
            }
            self.orphans.entry(new).or_default().extend(waiting);
        }
        // ...and the kill queue
        if self.kill_pending.remove(&old) {
            self.kill_pending.insert(new);
        }
        if let Some(stale) = self.objects.insert(new, object) {
            warn!(%new, "local id reassignment displaced a live object");
            self.by_full_id.remove(&stale.full_id);
        }
    }

    // Kills

    /// Explicit kill: the entity and its known non-avatar descendants die;
    /// seated or attached avatars are merely unparented
    pub fn kill(&mut self, local_id: LocalId) {
        if self.objects.contains_key(&local_id) {
            self.kill_recursive(local_id);
        } else {
            debug!(%local_id, "kill for unknown object; condemning on discovery");
            self.kill_pending.insert(local_id);
            let waiting = self.orphans.remove(&local_id).unwrap_or_default();
            self.cascade(waiting);
        }
    }

    fn kill_recursive(&mut self, local_id: LocalId) {
        // Snapshot: the children list mutates as descendants unlink
        let children = self
            .objects
            .get(&local_id)
            .map(|o| o.children.clone())
            .unwrap_or_default();
        self.cascade(children);

        // Children still waiting for this entity die with it (or would on
        // discovery, if they were never seen)
        let waiting = self.orphans.remove(&local_id).unwrap_or_default();
        self.cascade(waiting);

        if let Some(parent) = self.objects.get(&local_id).map(|o| o.parent) {
            self.unlink_child(local_id, parent);
        }
        if let Some(object) = self.objects.remove(&local_id) {
            self.by_full_id.remove(&object.full_id);
            for observer in &self.observers {
                observer.object_killed(&object);
            }
        }
    }

    fn cascade(&mut self, children: Vec<LocalId>) {
        for child in children {
            match self.objects.get(&child) {
                Some(object) if object.is_avatar() => self.unparent_avatar(child),
                Some(_) => self.kill_recursive(child),
                None => {
                    debug!(%child, "condemning unseen descendant");
                    self.kill_pending.insert(child);
                }
            }
        }
    }

    fn unparent_avatar(&mut self, avatar: LocalId) {
        if let Some(object) = self.objects.get_mut(&avatar) {
            object.parent = LocalId::NONE;
            let mut changed = AttrSet::empty();
            changed.insert(Attr::Parent);
            let object = &self.objects[&avatar];
            for observer in &self.observers {
                observer.attributes_changed(object, changed);
            }
        }
    }

    // Derived pose

    /// Region-global position, composed up the ancestor chain
    ///
    /// Fails for that query alone when an ancestor is unresolved; the
    /// graph itself is untouched.
    pub fn global_position(&self, local_id: LocalId) -> PrismResult<Vector3> {
        let object = self.resolved(local_id)?;
        let mut position = object.position;
        let mut parent = object.parent;
        let mut depth = 0u32;
        while !parent.is_none() {
            let ancestor = self.resolved(parent)?;
            position = ancestor.position + ancestor.rotation.normalized().rotate(position);
            parent = ancestor.parent;
            depth += 1;
            if depth > 255 {
                return Err(PrismError::GraphInvariant(format!(
                    "parent cycle above {local_id}"
                )));
            }
        }
        Ok(position)
    }

    /// Region-global rotation, composed up the ancestor chain
    pub fn global_rotation(&self, local_id: LocalId) -> PrismResult<Quaternion> {
        let object = self.resolved(local_id)?;
        let mut rotation = object.rotation.normalized();
        let mut parent = object.parent;
        let mut depth = 0u32;
        while !parent.is_none() {
            let ancestor = self.resolved(parent)?;
            rotation = ancestor.rotation.normalized().mul_quat(rotation);
            parent = ancestor.parent;
            depth += 1;
            if depth > 255 {
                return Err(PrismError::GraphInvariant(format!(
                    "parent cycle above {local_id}"
                )));
            }
        }
        Ok(rotation)
    }

    fn resolved(&self, local_id: LocalId) -> PrismResult<&SceneObject> {
        self.objects.get(&local_id).ok_or_else(|| {
            PrismError::GraphInvariant(format!("unresolved entity {local_id}"))
        })
    }
}
