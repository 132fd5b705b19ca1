//! Lazily-created per-price-bucket trackers, held in two parallel views:
//! a lifetime view that never resets and a session view rotated every
//! profile period.

use crate::{scheduler::Scheduler, tracker::MultiWindowTracker};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc, time::Duration};

/// Bucket index for a price: `floor(price / step)`. The bucket's lower bound
/// is `index * step`, so positive prices always floor toward the lower
/// bucket.
pub fn bucket_index(price: f64, step: f64) -> i64 {
    (price / step).floor() as i64
}

/// Lower-bound price of a bucket, i.e. `price - (price mod step)`.
pub fn bucket_lower_bound(index: i64, step: f64) -> f64 {
    index as f64 * step
}

/// Maps bucket index -> tracker for the lifetime and session views. The
/// top-level locks cover only key insertion and the session swap; per-key
/// mutation happens on the returned tracker handles without cross-key
/// contention.
pub struct BucketRegistry {
    step: f64,
    durations: Vec<Duration>,
    tick_interval: Duration,
    scheduler: Scheduler,
    lifetime: Mutex<BTreeMap<i64, Arc<MultiWindowTracker>>>,
    session: Mutex<BTreeMap<i64, Arc<MultiWindowTracker>>>,
}

impl BucketRegistry {
    pub fn new(
        step: f64,
        durations: Vec<Duration>,
        tick_interval: Duration,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            step,
            durations,
            tick_interval,
            scheduler,
            lifetime: Mutex::new(BTreeMap::new()),
            session: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Feed one delta into the bucket holding `price`, creating trackers in
    /// both views on first observation. Returns the (lifetime, session)
    /// trackers for immediate rendering.
    pub fn observe(
        &self,
        price: f64,
        delta: f64,
    ) -> (Arc<MultiWindowTracker>, Arc<MultiWindowTracker>) {
        let index = bucket_index(price, self.step);
        let lifetime = self.tracker_for(&self.lifetime, index);
        let session = self.tracker_for(&self.session, index);
        lifetime.add(delta);
        session.add(delta);
        (lifetime, session)
    }

    fn tracker_for(
        &self,
        view: &Mutex<BTreeMap<i64, Arc<MultiWindowTracker>>>,
        index: i64,
    ) -> Arc<MultiWindowTracker> {
        let mut map = view.lock();
        Arc::clone(map.entry(index).or_insert_with(|| {
            Arc::new(MultiWindowTracker::new(
                bucket_lower_bound(index, self.step),
                &self.durations,
                self.tick_interval,
                &self.scheduler,
            ))
        }))
    }

    /// Atomically swap the session view with an empty map and return the
    /// outgoing session for summary printing. A concurrent observe lands in
    /// exactly one of the pre- or post-rotation maps; the lifetime view is
    /// unaffected.
    pub fn rotate_session(&self) -> BTreeMap<i64, Arc<MultiWindowTracker>> {
        std::mem::take(&mut *self.session.lock())
    }

    /// Number of buckets ever observed.
    pub fn lifetime_buckets(&self) -> usize {
        self.lifetime.lock().len()
    }

    /// Number of buckets observed in the current session.
    pub fn session_buckets(&self) -> usize {
        self.session.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(scheduler: &Scheduler) -> BucketRegistry {
        BucketRegistry::new(
            10.0,
            vec![Duration::from_secs(30), Duration::ZERO],
            Duration::from_secs(5),
            scheduler.clone(),
        )
    }

    #[test]
    fn test_bucket_discretisation_floors_toward_lower_bucket() {
        for (price, expected) in [(10234.5, 10230.0), (10239.9, 10230.0), (10240.1, 10240.0)] {
            let index = bucket_index(price, 10.0);
            assert_eq!(bucket_lower_bound(index, 10.0), expected, "price {price}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trackers_created_lazily_in_both_views() {
        let scheduler = Scheduler::spawn();
        let registry = registry(&scheduler);

        assert_eq!(registry.lifetime_buckets(), 0);
        let (lifetime, session) = registry.observe(10234.5, 1_000.0);
        assert_eq!(registry.lifetime_buckets(), 1);
        assert_eq!(registry.session_buckets(), 1);
        assert_eq!(lifetime.bucket_price(), 10230.0);
        assert_eq!(session.bucket_price(), 10230.0);
        assert_eq!(lifetime.lifetime_value(), 1_000.0);
        assert_eq!(session.lifetime_value(), 1_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_bucket_reuses_tracker() {
        let scheduler = Scheduler::spawn();
        let registry = registry(&scheduler);

        let (first, _) = registry.observe(10234.5, 1_000.0);
        let (second, _) = registry.observe(10239.9, 500.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lifetime_value(), 1_500.0);

        let (third, _) = registry.observe(10240.1, 1.0);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(registry.lifetime_buckets(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_is_a_clean_cut() {
        let scheduler = Scheduler::spawn();
        let registry = registry(&scheduler);

        registry.observe(10_000.0, 1_000.0);
        registry.observe(10_050.0, -200.0);

        let outgoing = registry.rotate_session();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(registry.session_buckets(), 0);

        // Deltas observed after rotation appear only in the new session map.
        registry.observe(10_000.0, 500.0);
        assert_eq!(registry.session_buckets(), 1);
        let pre = outgoing.get(&bucket_index(10_000.0, 10.0)).unwrap();
        assert_eq!(pre.lifetime_value(), 1_000.0);

        // The lifetime view is unaffected by rotation.
        assert_eq!(registry.lifetime_buckets(), 2);
        let (lifetime, _) = registry.observe(10_000.0, 0.0);
        assert_eq!(lifetime.lifetime_value(), 1_500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_keys_iterate_sorted() {
        let scheduler = Scheduler::spawn();
        let registry = registry(&scheduler);

        registry.observe(10_050.0, 1.0);
        registry.observe(10_000.0, 1.0);
        registry.observe(10_100.0, 1.0);

        let keys: Vec<i64> = registry.rotate_session().into_keys().collect();
        assert_eq!(keys, vec![1_000, 1_005, 1_010]);
    }
}
