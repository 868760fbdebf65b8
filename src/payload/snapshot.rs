//! The current, fully populated set of VRPs and router keys.

use std::collections::BTreeSet;
use std::sync::Arc;
use crate::rtr::serial::Serial;
use super::vrp::{RouterKey, Vrp};


//------------ PayloadSet ----------------------------------------------------

/// A mutable, growable collection of VRPs and router keys.
///
/// This is what a validation worker fills in while walking a TAL's
/// certificate tree, and what the driver merges worker tables into
/// before installing them as a new [`Snapshot`].
#[derive(Clone, Debug, Default)]
pub struct PayloadSet {
    vrps: BTreeSet<Vrp>,
    router_keys: BTreeSet<RouterKey>,
}

impl PayloadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_vrp(&mut self, vrp: Vrp) {
        self.vrps.insert(vrp);
    }

    pub fn insert_router_key(&mut self, key: RouterKey) {
        self.router_keys.insert(key);
    }

    /// Merges `other` into `self`, collapsing duplicates.
    pub fn merge(&mut self, other: PayloadSet) {
        self.vrps.extend(other.vrps);
        self.router_keys.extend(other.router_keys);
    }

    pub fn vrp_count(&self) -> usize {
        self.vrps.len()
    }

    pub fn router_key_count(&self) -> usize {
        self.router_keys.len()
    }

    fn into_parts(self) -> (BTreeSet<Vrp>, BTreeSet<RouterKey>) {
        (self.vrps, self.router_keys)
    }
}


//------------ Snapshot -------------------------------------------------------

/// An immutable, serial-tagged snapshot of the VRP Store's payload.
///
/// Snapshots are cheap to share: readers hold an `Arc<Snapshot>` and are
/// unaffected by later installs.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    serial: Serial,
    vrps: BTreeSet<Vrp>,
    router_keys: BTreeSet<RouterKey>,
}

impl Snapshot {
    /// Creates the empty snapshot with serial 0, used before any
    /// validation cycle has completed.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn new(serial: Serial, set: PayloadSet) -> Self {
        let (vrps, router_keys) = set.into_parts();
        Snapshot { serial, vrps, router_keys }
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn vrps(&self) -> &BTreeSet<Vrp> {
        &self.vrps
    }

    pub fn router_keys(&self) -> &BTreeSet<RouterKey> {
        &self.router_keys
    }

    /// Iterates over the snapshot's payload as RTR payload items,
    /// filtered to what the given protocol version supports.
    ///
    /// All items are announcements: a snapshot has no concept of
    /// withdrawal.
    pub fn iter_for_version(
        &self, version: u8
    ) -> impl Iterator<Item = PayloadItem<'_>> {
        let keys: Box<dyn Iterator<Item = PayloadItem<'_>>> = if version >= 1 {
            Box::new(
                self.router_keys.iter()
                    .map(|key| PayloadItem::RouterKey(key, true))
            )
        }
        else {
            Box::new(std::iter::empty())
        };
        self.vrps.iter().map(|vrp| PayloadItem::Vrp(vrp, true)).chain(keys)
    }
}


//------------ PayloadItem ----------------------------------------------------

/// A single payload item tagged with its announce/withdraw flag.
#[derive(Clone, Copy, Debug)]
pub enum PayloadItem<'a> {
    Vrp(&'a Vrp, bool),
    RouterKey(&'a RouterKey, bool),
}

impl PayloadItem<'_> {
    /// `true` for an announcement, `false` for a withdrawal.
    pub fn is_announce(&self) -> bool {
        match self {
            PayloadItem::Vrp(_, flag) => *flag,
            PayloadItem::RouterKey(_, flag) => *flag,
        }
    }
}
