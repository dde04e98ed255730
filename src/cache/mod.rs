// src/cache/mod.rs
//! The current snapshot and the handle everybody shares to reach it.

pub mod persist;

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::ingest::types::Listing;
use crate::query::BoundingBox;

/// An immutable set of listings plus the attribution of the fetch that
/// produced them. Persisted as `{"Copyright": .., "Events": [..]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Copyright", default)]
    copyright: String,
    #[serde(rename = "Events", default)]
    listings: Vec<Listing>,
}

impl Snapshot {
    pub fn new(copyright: impl Into<String>, listings: Vec<Listing>) -> Self {
        Self {
            copyright: copyright.into(),
            listings,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn copyright(&self) -> &str {
        &self.copyright
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings strictly inside `bbox`, in snapshot order.
    pub fn within<'a>(&'a self, bbox: &'a BoundingBox) -> impl Iterator<Item = &'a Listing> + 'a {
        self.listings
            .iter()
            .filter(move |l| l.strictly_inside(bbox.south, bbox.west, bbox.north, bbox.east))
    }

    /// Listings come out of a file without their cached JSON; rebuild it.
    pub(crate) fn precompute_json(&mut self) -> serde_json::Result<()> {
        for l in self.listings.iter_mut() {
            l.precompute_json()?;
        }
        Ok(())
    }
}

/// Result of a search: the snapshot that was current when the search began
/// and the box to filter it with. Replacing the store's snapshot afterwards
/// does not affect it.
#[derive(Debug, Clone)]
pub struct Matches {
    snapshot: Arc<Snapshot>,
    bbox: BoundingBox,
}

impl Matches {
    pub fn copyright(&self) -> &str {
        self.snapshot.copyright()
    }

    pub fn listings(&self) -> impl Iterator<Item = &Listing> + '_ {
        self.snapshot.within(&self.bbox)
    }

    /// Precomputed JSON of every match.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.listings().map(Listing::as_json)
    }

    pub fn count(&self) -> usize {
        self.listings().count()
    }
}

/// Shared holder of the current [`Snapshot`].
///
/// Cheap to clone; all clones see the same snapshot. Readers take the read
/// guard only long enough to clone the `Arc`, the writer only long enough to
/// swap it.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl CacheStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The snapshot installed right now.
    pub fn current(&self) -> Arc<Snapshot> {
        // The guarded value is a plain Arc, so a poisoned lock is still consistent.
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `snapshot`, dropping this store's reference to the old one.
    pub fn replace(&self, snapshot: Snapshot) {
        let fresh = Arc::new(snapshot);
        let old = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, fresh)
        };
        // old snapshot is freed outside the lock, once its last reader is done
        drop(old);
    }

    pub fn query(&self, bbox: BoundingBox) -> Matches {
        Matches {
            snapshot: self.current(),
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawListing;

    fn at(id: i64, lat: f64, lng: f64) -> Listing {
        let mut l = Listing::new(
            RawListing {
                event_id: id,
                ..Default::default()
            },
            lat,
            lng,
        );
        l.precompute_json().unwrap();
        l
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            south: 40.0,
            west: -74.0,
            north: 41.0,
            east: -73.0,
        }
    }

    fn ids(m: &Matches) -> Vec<i64> {
        m.listings().map(|l| l.raw.event_id).collect()
    }

    #[test]
    fn boundaries_are_exclusive() {
        let store = CacheStore::new(Snapshot::new(
            "c",
            vec![
                at(1, 40.0, -73.5),      // on south edge
                at(2, 41.0, -73.5),      // on north edge
                at(3, 40.5, -74.0),      // on west edge
                at(4, 40.5, -73.0),      // on east edge
                at(5, 40.000001, -73.5), // just inside south
                at(6, 40.999999, -73.000001),
                at(7, 40.5, -73.5),
                at(8, 42.0, -73.5), // outside
            ],
        ));
        assert_eq!(ids(&store.query(bbox())), vec![5, 6, 7]);
    }

    #[test]
    fn inverted_box_matches_nothing() {
        let store = CacheStore::new(Snapshot::new("c", vec![at(1, 40.5, -73.5)]));
        let inverted = BoundingBox {
            south: 41.0,
            west: -73.0,
            north: 40.0,
            east: -74.0,
        };
        assert_eq!(store.query(inverted).count(), 0);
    }

    #[test]
    fn in_flight_query_keeps_its_snapshot() {
        let store = CacheStore::new(Snapshot::new("old", vec![at(1, 40.5, -73.5), at(2, 40.6, -73.6)]));
        let matches = store.query(bbox());

        store.replace(Snapshot::new("new", vec![at(9, 40.7, -73.7)]));

        assert_eq!(matches.copyright(), "old");
        assert_eq!(ids(&matches), vec![1, 2]);
        assert_eq!(ids(&store.query(bbox())), vec![9]);
        assert_eq!(store.current().copyright(), "new");
    }

    #[test]
    fn clones_share_state() {
        let a = CacheStore::default();
        let b = a.clone();
        assert!(a.current().is_empty());
        b.replace(Snapshot::new("x", vec![at(1, 40.5, -73.5)]));
        assert_eq!(a.current().len(), 1);
    }

    #[test]
    fn matches_yield_precomputed_json() {
        let store = CacheStore::new(Snapshot::new("c", vec![at(3, 40.5, -73.5)]));
        let m = store.query(bbox());
        let json: Vec<&str> = m.iter().collect();
        assert_eq!(json.len(), 1);
        assert!(json[0].contains("\"event_id\":3"));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let store = CacheStore::new(Snapshot::new("0", (0..50).map(|i| at(i, 40.5, -73.5)).collect()));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for round in 1..=50i64 {
                    let n = 50 + round;
                    store.replace(Snapshot::new(
                        round.to_string(),
                        (0..n).map(|i| at(i, 40.5, -73.5)).collect(),
                    ));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let m = store.query(bbox());
                        // each snapshot is internally consistent: its size matches its label
                        let label: i64 = m.copyright().parse().unwrap();
                        assert_eq!(m.count() as i64, 50 + label);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
