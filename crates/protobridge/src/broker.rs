//! Ownership broker
//!
//! Tracks which proxies depend on which native root. Every proxy holds a
//! [`Lease`]; a root stays alive while any lease on it exists, so dropping a
//! message proxy never invalidates a field view taken from it.
//!
//! Bookkeeping is sharded in a `DashMap` and no lock is held while native
//! storage is being read or written.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prost_reflect::DynamicMessage;
use rustc_hash::FxHashMap;

use crate::storage::{Backing, NativeRoot, PathStep, StaticMessage};

static BROKER: Lazy<OwnershipBroker> = Lazy::new(OwnershipBroker::new);

/// Identity of one native root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        OwnerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Identity of one proxy (lease) on a root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependentId(u64);

impl DependentId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        DependentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// How the bridge holds a root's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipKind {
    /// Created by the bridge; freed when the last lease goes away
    Exclusive,
    /// Owned by native code; never freed by the bridge
    Unowned,
}

struct OwnershipRecord {
    kind: OwnershipKind,
    dependents: FxHashMap<DependentId, Arc<[PathStep]>>,
}

/// Process-wide registry of native roots and their dependents
pub struct OwnershipBroker {
    records: DashMap<OwnerId, OwnershipRecord>,
    statics: Mutex<FxHashMap<usize, Weak<NativeRoot>>>,
}

impl OwnershipBroker {
    fn new() -> Self {
        Self {
            records: DashMap::new(),
            statics: Mutex::new(FxHashMap::default()),
        }
    }

    /// The process-wide broker
    pub fn global() -> &'static OwnershipBroker {
        &BROKER
    }

    /// Take exclusive ownership of a freshly built message
    pub fn adopt(&self, message: DynamicMessage) -> Lease {
        let owner = OwnerId::next();
        self.records.insert(owner, OwnershipRecord::new(OwnershipKind::Exclusive));
        tracing::trace!(owner = owner.as_u64(), "adopted native message");
        let root = Arc::new(NativeRoot::new(owner, Backing::Owned(Mutex::new(message))));
        self.borrow(&root, Arc::from(Vec::new()))
    }

    /// Wrap memory owned by native code.
    ///
    /// Wrapping the same static twice yields leases on the same root, so the
    /// resulting proxies observe each other's writes.
    pub fn wrap_static(&self, message: &'static StaticMessage) -> Lease {
        let address = message.address();
        let root = {
            let mut statics = self.statics.lock();
            match statics.get(&address).and_then(Weak::upgrade) {
                Some(root) => root,
                None => {
                    let owner = OwnerId::next();
                    self.records
                        .insert(owner, OwnershipRecord::new(OwnershipKind::Unowned));
                    tracing::trace!(owner = owner.as_u64(), address, "wrapped unowned message");
                    let root = Arc::new(NativeRoot::new(owner, Backing::Unowned(message)));
                    statics.insert(address, Arc::downgrade(&root));
                    root
                }
            }
        };
        self.borrow(&root, Arc::from(Vec::new()))
    }

    /// Register a new dependent on `root` reaching it through `path`
    pub fn borrow(&self, root: &Arc<NativeRoot>, path: Arc<[PathStep]>) -> Lease {
        let dependent = DependentId::next();
        if let Some(mut record) = self.records.get_mut(&root.owner()) {
            record.dependents.insert(dependent, path.clone());
        }
        Lease {
            root: root.clone(),
            path,
            dependent,
        }
    }

    /// Forget a dependent. Safe to call from any thread, in any order.
    pub fn release(&self, owner: OwnerId, dependent: DependentId) {
        if let Some(mut record) = self.records.get_mut(&owner) {
            record.dependents.remove(&dependent);
        }
    }

    /// Called when a root's last lease is gone
    pub(crate) fn retire(&self, owner: OwnerId, address: Option<usize>) {
        if let Some((_, record)) = self.records.remove(&owner) {
            tracing::trace!(owner = owner.as_u64(), kind = ?record.kind, "retired native root");
        }
        if let Some(address) = address {
            let mut statics = self.statics.lock();
            let dead = statics
                .get(&address)
                .map_or(false, |weak| weak.strong_count() == 0);
            if dead {
                statics.remove(&address);
            }
        }
    }

    /// Whether the root is still backed by live memory
    pub fn is_alive(&self, owner: OwnerId) -> bool {
        self.records.contains_key(&owner)
    }

    pub fn kind(&self, owner: OwnerId) -> Option<OwnershipKind> {
        self.records.get(&owner).map(|record| record.kind)
    }

    /// Number of live proxies on the root
    pub fn dependent_count(&self, owner: OwnerId) -> usize {
        self.records
            .get(&owner)
            .map_or(0, |record| record.dependents.len())
    }

    /// Snapshot of the paths held by the root's live proxies
    pub fn live_paths(&self, owner: OwnerId) -> Vec<Arc<[PathStep]>> {
        self.records
            .get(&owner)
            .map(|record| record.dependents.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of roots currently tracked
    pub fn live_roots(&self) -> usize {
        self.records.len()
    }
}

impl OwnershipRecord {
    fn new(kind: OwnershipKind) -> Self {
        Self {
            kind,
            dependents: FxHashMap::default(),
        }
    }
}

impl fmt::Debug for OwnershipBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipBroker")
            .field("roots", &self.records.len())
            .finish()
    }
}

/// One dependent's hold on a native root
pub struct Lease {
    root: Arc<NativeRoot>,
    path: Arc<[PathStep]>,
    dependent: DependentId,
}

impl Lease {
    pub fn root(&self) -> &Arc<NativeRoot> {
        &self.root
    }

    pub fn path(&self) -> &[PathStep] {
        &self.path
    }

    pub fn owner(&self) -> OwnerId {
        self.root.owner()
    }

    pub fn dependent(&self) -> DependentId {
        self.dependent
    }

    /// A new lease on the same root, one step deeper
    pub(crate) fn child(&self, step: PathStep) -> Lease {
        let mut steps = self.path.to_vec();
        steps.push(step);
        OwnershipBroker::global().borrow(&self.root, Arc::from(steps))
    }
}

impl Clone for Lease {
    fn clone(&self) -> Self {
        OwnershipBroker::global().borrow(&self.root, self.path.clone())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        OwnershipBroker::global().release(self.root.owner(), self.dependent);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("owner", &self.owner())
            .field("dependent", &self.dependent)
            .field("depth", &self.path.len())
            .finish()
    }
}
