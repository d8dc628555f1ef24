//! In-memory resource state.
//!
//! Committed resources are immutable once published. Writers are serialized, build the
//! next snapshot copy-on-write and swap it in atomically; readers load the current
//! snapshot without locking and always receive deep copies.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::Utc;
use keel_core::{Phase, Resource, ResourceDefinitionProvider, ResourceKey, ResourceSpec, TypedResource, Version};
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::registry::Registry;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("resource {0} not found")]
    NotFound(ResourceKey),
    #[error("resource {0} already exists")]
    AlreadyExists(ResourceKey),
    #[error("resource {key} version conflict: stored {stored}, update based on {got}")]
    VersionConflict { key: ResourceKey, stored: Version, got: Version },
    #[error("resource {0} is tearing down")]
    TearingDown(ResourceKey),
    #[error("resource {key} has pending finalizers {finalizers:?}")]
    PendingFinalizers { key: ResourceKey, finalizers: Vec<String> },
    #[error("resource type {0:?} is not registered")]
    UnregisteredType(String),
    #[error("resource {0} is not of the requested kind")]
    KindMismatch(ResourceKey),
}

pub type StateResult<T> = Result<T, StateError>;

type Items = BTreeMap<ResourceKey, Arc<dyn Resource>>;

/// Immutable view of every committed resource at one epoch.
#[derive(Default)]
pub struct Snapshot {
    pub epoch: u64,
    items: Items,
}

impl Snapshot {
    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn get(&self, key: &ResourceKey) -> Option<&dyn Resource> { self.items.get(key).map(|r| r.as_ref()) }

    /// Resources of one type in one namespace, ordered by id.
    pub fn iter_kind<'a>(&'a self, namespace: &'a str, typ: &'a str) -> impl Iterator<Item = &'a dyn Resource> + 'a {
        self.items
            .iter()
            .filter(move |(k, _)| k.namespace == namespace && k.typ == typ)
            .map(|(_, r)| r.as_ref())
    }
}

pub struct State {
    registry: Arc<Registry>,
    snap: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    epoch_tx: watch::Sender<u64>,
}

impl State {
    pub fn new(registry: Arc<Registry>) -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self { registry, snap: ArcSwap::from_pointee(Snapshot::default()), writer: Mutex::new(()), epoch_tx }
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub fn snapshot(&self) -> Arc<Snapshot> { self.snap.load_full() }

    pub fn epoch(&self) -> u64 { self.snap.load().epoch }

    /// Receiver notified with the new epoch after every commit.
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }

    pub fn get(&self, key: &ResourceKey) -> StateResult<Box<dyn Resource>> {
        self.snap.load().get(key).map(|r| r.deep_copy()).ok_or_else(|| StateError::NotFound(key.clone()))
    }

    pub fn get_typed<T: ResourceSpec, RD: ResourceDefinitionProvider<T>>(
        &self,
        namespace: &str,
        id: &str,
    ) -> StateResult<TypedResource<T, RD>> {
        let key = ResourceKey { namespace: namespace.to_string(), typ: RD::TYPE.to_string(), id: id.to_string() };
        let snap = self.snap.load();
        let cur = snap.get(&key).ok_or_else(|| StateError::NotFound(key.clone()))?;
        cur.downcast_ref::<TypedResource<T, RD>>()
            .map(TypedResource::deep_copy)
            .ok_or(StateError::KindMismatch(key))
    }

    pub fn list(&self, namespace: &str, typ: &str) -> Vec<Box<dyn Resource>> {
        self.snap.load().iter_kind(namespace, typ).map(|r| r.deep_copy()).collect()
    }

    /// Commit a new resource. Its version becomes 1.
    pub fn create(&self, mut res: Box<dyn Resource>) -> StateResult<Box<dyn Resource>> {
        let key = self.check_kind(&*res)?;
        self.commit("create", |items| {
            if items.contains_key(&key) {
                return Err(StateError::AlreadyExists(key.clone()));
            }
            let md = res.metadata_mut();
            md.set_phase(Phase::Running);
            md.set_version(Version::UNDEFINED);
            md.bump_version(Utc::now());
            let out = res.deep_copy();
            items.insert(key.clone(), Arc::from(res));
            Ok(out)
        })
    }

    /// Commit a modified copy of a stored resource.
    ///
    /// `res` must carry the version it was read at. Identical content is not a mutation
    /// and leaves the version alone; otherwise the version advances by one.
    pub fn update(&self, mut res: Box<dyn Resource>) -> StateResult<Box<dyn Resource>> {
        let key = self.check_kind(&*res)?;
        self.commit("update", |items| {
            let cur = items.get(&key).ok_or_else(|| StateError::NotFound(key.clone()))?;
            let (stored, got) = (cur.metadata().version(), res.metadata().version());
            if stored != got {
                return Err(StateError::VersionConflict { key: key.clone(), stored, got });
            }
            res.metadata_mut().set_phase(cur.metadata().phase());
            if **cur == *res {
                return Ok(Outcome::NoChange(cur.deep_copy()));
            }
            if cur.metadata().phase() == Phase::TearingDown && !cur.spec_eq(res.as_ref()) {
                return Err(StateError::TearingDown(key.clone()));
            }
            res.metadata_mut().bump_version(Utc::now());
            let out = res.deep_copy();
            items.insert(key.clone(), Arc::from(res));
            Ok(Outcome::Changed(out))
        })
        .map(Outcome::into_inner)
    }

    /// Copy-on-write edit of a typed resource's spec.
    pub fn modify<T, RD, F>(&self, namespace: &str, id: &str, f: F) -> StateResult<TypedResource<T, RD>>
    where
        T: ResourceSpec,
        RD: ResourceDefinitionProvider<T>,
        F: FnOnce(&mut T),
    {
        let mut next = self.get_typed::<T, RD>(namespace, id)?;
        f(next.spec_mut());
        let committed = self.update(Box::new(next))?;
        let key = committed.metadata().key();
        committed
            .downcast_ref::<TypedResource<T, RD>>()
            .map(TypedResource::deep_copy)
            .ok_or(StateError::KindMismatch(key))
    }

    /// Mark a resource as tearing down. Returns true once no finalizers remain.
    pub fn teardown(&self, key: &ResourceKey) -> StateResult<bool> {
        self.edit_metadata("teardown", key, |res| {
            let md = res.metadata_mut();
            let changed = md.phase() != Phase::TearingDown;
            md.set_phase(Phase::TearingDown);
            changed
        })
        .map(|res| res.metadata().finalizers().is_empty())
    }

    pub fn add_finalizer(&self, key: &ResourceKey, fin: &str) -> StateResult<Box<dyn Resource>> {
        self.edit_metadata("add_finalizer", key, |res| res.metadata_mut().add_finalizer(fin))
    }

    pub fn remove_finalizer(&self, key: &ResourceKey, fin: &str) -> StateResult<Box<dyn Resource>> {
        self.edit_metadata("remove_finalizer", key, |res| res.metadata_mut().remove_finalizer(fin))
    }

    /// Remove a resource. Refused while finalizers are pending.
    pub fn destroy(&self, key: &ResourceKey) -> StateResult<()> {
        self.commit("destroy", |items| {
            let cur = items.get(key).ok_or_else(|| StateError::NotFound(key.clone()))?;
            let finalizers = cur.metadata().finalizers();
            if !finalizers.is_empty() {
                return Err(StateError::PendingFinalizers { key: key.clone(), finalizers: finalizers.to_vec() });
            }
            items.remove(key);
            Ok(())
        })
    }

    /// The resource's key, provided its type is registered to exactly this payload.
    fn check_kind(&self, res: &dyn Resource) -> StateResult<ResourceKey> {
        let key = res.metadata().key();
        match self.registry.get(&key.typ) {
            None => Err(StateError::UnregisteredType(key.typ)),
            Some(entry) if !entry.accepts(res) => Err(StateError::KindMismatch(key)),
            Some(_) => Ok(key),
        }
    }

    fn edit_metadata(
        &self,
        op: &'static str,
        key: &ResourceKey,
        f: impl FnOnce(&mut dyn Resource) -> bool,
    ) -> StateResult<Box<dyn Resource>> {
        self.commit(op, |items| {
            let cur = items.get(key).ok_or_else(|| StateError::NotFound(key.clone()))?;
            let mut next = cur.deep_copy();
            if !f(next.as_mut()) {
                return Ok(Outcome::NoChange(next));
            }
            next.metadata_mut().bump_version(Utc::now());
            let out = next.deep_copy();
            items.insert(key.clone(), Arc::from(next));
            Ok(Outcome::Changed(out))
        })
        .map(Outcome::into_inner)
    }

    /// Run `f` against a private copy of the index and publish it as the next epoch.
    /// Nothing is published when `f` fails or reports no change.
    fn commit<R: Committed>(&self, op: &'static str, f: impl FnOnce(&mut Items) -> StateResult<R>) -> StateResult<R> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let cur = self.snap.load_full();
        let mut items = cur.items.clone();
        let out = f(&mut items)?;
        if !out.changed() {
            debug!(op, epoch = cur.epoch, "no-op commit");
            return Ok(out);
        }
        let epoch = cur.epoch + 1;
        self.snap.store(Arc::new(Snapshot { epoch, items }));
        self.epoch_tx.send_replace(epoch);
        counter!("keel_store_ops_total", 1, "op" => op);
        info!(op, epoch, "state committed");
        Ok(out)
    }
}

/// Result of a write that may turn out to be a no-op.
enum Outcome<T> {
    Changed(T),
    NoChange(T),
}

impl<T> Outcome<T> {
    fn into_inner(self) -> T {
        match self {
            Outcome::Changed(v) | Outcome::NoChange(v) => v,
        }
    }
}

trait Committed {
    fn changed(&self) -> bool { true }
}

impl Committed for () {}

impl Committed for Box<dyn Resource> {}

impl<T> Committed for Outcome<T> {
    fn changed(&self) -> bool { matches!(self, Outcome::Changed(_)) }
}
