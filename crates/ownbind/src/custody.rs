//! Custodian/ward tracking
//!
//! A ward must not outlive its custodian. The tracker records these edges
//! and refuses any operation that would break that: a link that closes a
//! cycle, or the release of a custodian that still has live wards. It never
//! frees anything itself; bindings consult it before reclaiming an object.
//!
//! All mutations go through one mutex around the whole graph, since cycle
//! detection needs a consistent view of every edge.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use crate::annotation::CustodianRef;
use crate::error::CustodyError;

/// Identity of a wrapped native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A slot of a call that can take part in a custodian link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The returned object
    Return,
    /// The instance the method was invoked on
    Receiver,
    /// A parameter, zero-based
    Param(usize),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Return => write!(f, "return value"),
            Endpoint::Receiver => write!(f, "receiver"),
            Endpoint::Param(i) => write!(f, "parameter {}", i + 1),
        }
    }
}

impl From<CustodianRef> for Endpoint {
    fn from(custodian: CustodianRef) -> Self {
        match custodian {
            CustodianRef::Return => Endpoint::Return,
            CustodianRef::Receiver => Endpoint::Receiver,
            CustodianRef::Param(i) => Endpoint::Param(i),
        }
    }
}

/// A link to record after a call: `ward` is kept alive by `custodian`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CustodyLinkSpec {
    /// The dependent slot
    pub ward: Endpoint,
    /// The slot that must outlive it
    pub custodian: Endpoint,
}

impl CustodyLinkSpec {
    /// Create a link spec.
    pub fn new(ward: Endpoint, custodian: Endpoint) -> Self {
        Self { ward, custodian }
    }
}

/// The objects bound to a call's slots, used to resolve a [`CustodyLinkSpec`].
///
/// `None` in a slot means no object (a null pointer or a value type).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallBinding {
    receiver: Option<ObjectId>,
    params: Vec<Option<ObjectId>>,
    ret: Option<ObjectId>,
}

impl CallBinding {
    /// An empty binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the receiver.
    pub fn receiver(mut self, id: ObjectId) -> Self {
        self.receiver = Some(id);
        self
    }

    /// Bind the next parameter.
    pub fn param(mut self, id: Option<ObjectId>) -> Self {
        self.params.push(id);
        self
    }

    /// Bind the returned object.
    pub fn ret(mut self, id: ObjectId) -> Self {
        self.ret = Some(id);
        self
    }

    /// The object bound to `endpoint`, if any.
    pub fn resolve(&self, endpoint: Endpoint) -> Option<ObjectId> {
        match endpoint {
            Endpoint::Return => self.ret,
            Endpoint::Receiver => self.receiver,
            Endpoint::Param(i) => self.params.get(i).copied().flatten(),
        }
    }
}

#[derive(Debug, Default)]
struct Graph {
    live: HashSet<ObjectId>,
    /// Ids already reclaimed; they never come back
    released: HashSet<ObjectId>,
    /// ward -> its custodians
    custodians: HashMap<ObjectId, BTreeSet<ObjectId>>,
    /// custodian -> its wards
    wards: HashMap<ObjectId, BTreeSet<ObjectId>>,
}

impl Graph {
    /// True when `from` depends, directly or transitively, on `target`.
    fn depends_on(&self, from: ObjectId, target: ObjectId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(next) = self.custodians.get(&current) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    fn wards_of(&self, custodian: ObjectId) -> Vec<ObjectId> {
        self.wards
            .get(&custodian)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    fn remove(&mut self, id: ObjectId) {
        self.live.remove(&id);
        self.released.insert(id);
        self.wards.remove(&id);
        if let Some(custodians) = self.custodians.remove(&id) {
            for custodian in custodians {
                if let Some(wards) = self.wards.get_mut(&custodian) {
                    wards.remove(&id);
                    if wards.is_empty() {
                        self.wards.remove(&custodian);
                    }
                }
            }
        }
    }
}

/// The custodian/ward link graph.
///
/// # Example
///
/// ```
/// use ownbind::{CustodyTracker, ObjectId};
///
/// let tracker = CustodyTracker::new();
/// let (ward, custodian) = (ObjectId(1), ObjectId(2));
/// tracker.link(ward, custodian).unwrap();
///
/// assert!(tracker.release(custodian).is_err());
/// tracker.release(ward).unwrap();
/// tracker.release(custodian).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct CustodyTracker {
    graph: Mutex<Graph>,
}

impl CustodyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn graph(&self) -> MutexGuard<'_, Graph> {
        // Mutations validate before they apply, so a poisoned graph is intact
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking `id`. Returns `false` if it was already live or has
    /// been released.
    pub fn track(&self, id: ObjectId) -> bool {
        let mut graph = self.graph();
        !graph.released.contains(&id) && graph.live.insert(id)
    }

    /// Record that `ward` must not outlive `custodian`.
    ///
    /// Both objects become tracked. Returns `false` if the link already
    /// existed.
    ///
    /// # Errors
    ///
    /// - `UnknownObject` when either object has already been released
    /// - `CyclicCustodianship` when `custodian` already depends on `ward`
    ///   (including `ward == custodian`)
    pub fn link(&self, ward: ObjectId, custodian: ObjectId) -> Result<bool, CustodyError> {
        let mut graph = self.graph();
        if let Some(gone) = [ward, custodian]
            .into_iter()
            .find(|id| graph.released.contains(id))
        {
            return Err(CustodyError::UnknownObject(gone));
        }
        if graph.depends_on(custodian, ward) {
            return Err(CustodyError::CyclicCustodianship { ward, custodian });
        }

        graph.live.insert(ward);
        graph.live.insert(custodian);
        let added = graph.custodians.entry(ward).or_default().insert(custodian);
        graph.wards.entry(custodian).or_default().insert(ward);
        if added {
            debug!(%ward, %custodian, "custody link");
        }
        Ok(added)
    }

    /// Drop a link explicitly. Returns `false` if it did not exist.
    pub fn revoke(&self, ward: ObjectId, custodian: ObjectId) -> bool {
        let mut graph = self.graph();
        let removed = graph
            .custodians
            .get_mut(&ward)
            .is_some_and(|c| c.remove(&custodian));
        if !removed {
            return false;
        }
        if graph.custodians.get(&ward).is_some_and(BTreeSet::is_empty) {
            graph.custodians.remove(&ward);
        }
        if let Some(wards) = graph.wards.get_mut(&custodian) {
            wards.remove(&ward);
            if wards.is_empty() {
                graph.wards.remove(&custodian);
            }
        }
        debug!(%ward, %custodian, "custody link revoked");
        true
    }

    /// Release `id`, which must have no live wards.
    ///
    /// Its own links to custodians are dropped with it.
    ///
    /// # Errors
    ///
    /// - `UnknownObject` when `id` is not tracked
    /// - `DanglingWard` when live wards still name `id` as custodian
    pub fn release(&self, id: ObjectId) -> Result<(), CustodyError> {
        let mut graph = self.graph();
        if !graph.live.contains(&id) {
            return Err(CustodyError::UnknownObject(id));
        }
        let wards = graph.wards_of(id);
        if !wards.is_empty() {
            return Err(CustodyError::DanglingWard {
                custodian: id,
                wards,
            });
        }
        graph.remove(id);
        debug!(%id, "released");
        Ok(())
    }

    /// Release `id` together with every object that transitively depends on
    /// it, wards before their custodians. Returns the released ids in
    /// release order.
    ///
    /// # Errors
    ///
    /// `UnknownObject` when `id` is not tracked.
    pub fn release_cascade(&self, id: ObjectId) -> Result<Vec<ObjectId>, CustodyError> {
        let mut graph = self.graph();
        if !graph.live.contains(&id) {
            return Err(CustodyError::UnknownObject(id));
        }

        // Iterative post-order over the ward edges
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.push((current, true));
            for ward in graph.wards_of(current).into_iter().rev() {
                if !visited.contains(&ward) {
                    stack.push((ward, false));
                }
            }
        }

        for released in &order {
            graph.remove(*released);
        }
        debug!(%id, count = order.len(), "released with wards");
        Ok(order)
    }

    /// Live wards of `custodian`, sorted.
    pub fn wards_of(&self, custodian: ObjectId) -> Vec<ObjectId> {
        self.graph().wards_of(custodian)
    }

    /// Custodians of `ward`, sorted.
    pub fn custodians_of(&self, ward: ObjectId) -> Vec<ObjectId> {
        self.graph()
            .custodians
            .get(&ward)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// True when `id` is tracked and not yet released.
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.graph().live.contains(&id)
    }

    /// Number of tracked objects.
    pub fn len(&self) -> usize {
        self.graph().live.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.graph().live.is_empty()
    }

    /// Record the link described by `spec` for a completed call.
    ///
    /// A ward slot bound to no object (a null return, say) records nothing
    /// and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `UnboundEndpoint` when the custodian slot has no object
    /// - anything [`CustodyTracker::link`] returns
    pub fn apply(&self, spec: &CustodyLinkSpec, binding: &CallBinding) -> Result<bool, CustodyError> {
        let Some(ward) = binding.resolve(spec.ward) else {
            return Ok(false);
        };
        let custodian = binding
            .resolve(spec.custodian)
            .ok_or(CustodyError::UnboundEndpoint(spec.custodian))?;
        self.link(ward, custodian)
    }
}
