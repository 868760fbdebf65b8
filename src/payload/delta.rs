//! The announce/withdraw difference between two adjacent snapshots.

use std::collections::BTreeMap;
use crate::rtr::serial::Serial;
use super::snapshot::{PayloadItem, Snapshot};
use super::vrp::{RouterKey, Vrp};


//------------ Delta ----------------------------------------------------------

/// The set of announcements and withdrawals that turns one snapshot into
/// the next.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    serial: Serial,
    vrps: BTreeMap<Vrp, bool>,
    router_keys: BTreeMap<RouterKey, bool>,
}

impl Delta {
    /// Constructs the delta between two adjacent snapshots via a sorted
    /// merge-join: items present in `new` but not `old` are
    /// announcements, items present in `old` but not `new` are
    /// withdrawals, items present in both are skipped entirely.
    pub fn construct(serial: Serial, old: &Snapshot, new: &Snapshot) -> Self {
        let vrps = diff_sorted(old.vrps().iter(), new.vrps().iter());
        let router_keys = diff_sorted(
            old.router_keys().iter(), new.router_keys().iter()
        );
        Delta { serial, vrps, router_keys }
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn is_empty(&self) -> bool {
        self.vrps.is_empty() && self.router_keys.is_empty()
    }

    /// Composes `self` (the earlier delta) with `later` into a single
    /// delta spanning both, per the usual action-combination rule:
    /// an announce followed by a withdraw (or vice versa) of the same
    /// item cancels out; otherwise the later delta's action for an item
    /// wins, and items mentioned by only one side keep that side's
    /// action.
    pub fn merge(&self, later: &Delta) -> Self {
        Delta {
            serial: later.serial,
            vrps: merge_actions(&self.vrps, &later.vrps),
            router_keys: merge_actions(&self.router_keys, &later.router_keys),
        }
    }

    /// Iterates over the delta's items as RTR payload items, flagged
    /// announce/withdraw, filtered to what the given protocol version
    /// supports.
    pub fn iter_for_version(
        &self, version: u8
    ) -> impl Iterator<Item = PayloadItem<'_>> {
        let keys: Box<dyn Iterator<Item = PayloadItem<'_>>> = if version >= 1 {
            Box::new(
                self.router_keys.iter()
                    .map(|(key, flag)| PayloadItem::RouterKey(key, *flag))
            )
        }
        else {
            Box::new(std::iter::empty())
        };
        self.vrps.iter()
            .map(|(vrp, flag)| PayloadItem::Vrp(vrp, *flag))
            .chain(keys)
    }
}

/// Computes the sorted-merge-join difference between two sorted
/// iterators, returning a map from item to announce (`true`) / withdraw
/// (`false`).
fn diff_sorted<'a, T, I, J>(mut old: I, mut new: J) -> BTreeMap<T, bool>
where
    T: Ord + Clone + 'a,
    I: Iterator<Item = &'a T>,
    J: Iterator<Item = &'a T>,
{
    let mut result = BTreeMap::new();
    let mut o = old.next();
    let mut n = new.next();
    loop {
        match (o, n) {
            (Some(a), Some(b)) => {
                match a.cmp(b) {
                    std::cmp::Ordering::Less => {
                        result.insert(a.clone(), false);
                        o = old.next();
                    }
                    std::cmp::Ordering::Greater => {
                        result.insert(b.clone(), true);
                        n = new.next();
                    }
                    std::cmp::Ordering::Equal => {
                        o = old.next();
                        n = new.next();
                    }
                }
            }
            (Some(a), None) => {
                result.insert(a.clone(), false);
                o = old.next();
            }
            (None, Some(b)) => {
                result.insert(b.clone(), true);
                n = new.next();
            }
            (None, None) => break,
        }
    }
    result
}

/// Combines two action maps per the delta-merge rule described on
/// [`Delta::merge`].
fn merge_actions<T: Ord + Clone>(
    first: &BTreeMap<T, bool>, second: &BTreeMap<T, bool>
) -> BTreeMap<T, bool> {
    let mut result = first.clone();
    for (item, &flag) in second {
        match result.get(item) {
            Some(&existing) if existing != flag => {
                // announce-then-withdraw or withdraw-then-announce:
                // net effect is no change at all.
                result.remove(item);
            }
            _ => {
                result.insert(item.clone(), flag);
            }
        }
    }
    result
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::snapshot::{PayloadSet, Snapshot};
    use crate::payload::vrp::Prefix;
    use std::net::Ipv4Addr;

    fn vrp(asn: u32, octet: u8) -> Vrp {
        Vrp::new(
            asn,
            Prefix::V4(Ipv4Addr::new(192, 0, 2, octet), 24),
            24,
        )
    }

    #[test]
    fn construct_reports_only_differences() {
        let mut old_set = PayloadSet::new();
        old_set.insert_vrp(vrp(1, 0));
        old_set.insert_vrp(vrp(2, 0));
        let old = Snapshot::new(Serial::from(1), old_set);

        let mut new_set = PayloadSet::new();
        new_set.insert_vrp(vrp(2, 0));
        new_set.insert_vrp(vrp(3, 0));
        let new = Snapshot::new(Serial::from(2), new_set);

        let delta = Delta::construct(Serial::from(2), &old, &new);
        assert_eq!(delta.vrps.len(), 2);
        assert_eq!(delta.vrps.get(&vrp(1, 0)), Some(&false));
        assert_eq!(delta.vrps.get(&vrp(3, 0)), Some(&true));
        assert!(delta.vrps.get(&vrp(2, 0)).is_none());
    }

    #[test]
    fn merge_cancels_out_flip_flop() {
        let mut a = BTreeMap::new();
        a.insert(vrp(1, 0), true);
        let mut b = BTreeMap::new();
        b.insert(vrp(1, 0), false);
        let merged = merge_actions(&a, &b);
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_keeps_single_sided_actions() {
        let mut a = BTreeMap::new();
        a.insert(vrp(1, 0), true);
        let mut b = BTreeMap::new();
        b.insert(vrp(2, 0), false);
        let merged = merge_actions(&a, &b);
        assert_eq!(merged.get(&vrp(1, 0)), Some(&true));
        assert_eq!(merged.get(&vrp(2, 0)), Some(&false));
    }
}
