//! Host-driven debouncing with value coalescing.
//!
//! A [`Debouncer`] collects triggers per key. Each trigger restarts the key's
//! quiet window and folds its value into the pending one through a
//! `coalesce(previous, next)` reducer. Once a key has been quiet for the
//! configured delay, [`Debouncer::take_ready`] hands out the merged value.
//!
//! Nothing runs on its own: the owner pumps the debouncer, typically from an
//! idle hook, using [`Debouncer::time_until_next`] to know when to come back.
//!
//! ```
//! use lineup_core::Debouncer;
//! use std::time::{Duration, Instant};
//!
//! let mut debouncer = Debouncer::new(Duration::from_millis(100), |mut a: Vec<u8>, b: Vec<u8>| {
//!     a.extend(b);
//!     a
//! });
//!
//! let start = Instant::now();
//! debouncer.trigger_at("ranking0", vec![1], start);
//! debouncer.trigger_at("ranking0", vec![2], start + Duration::from_millis(50));
//!
//! assert!(debouncer.take_ready(start + Duration::from_millis(120)).is_empty());
//! let ready = debouncer.take_ready(start + Duration::from_millis(150));
//! assert_eq!(ready, vec![("ranking0", vec![1, 2])]);
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::logging::targets;

/// A pending, not yet delivered value.
struct Pending<T> {
    value: T,
    due: Instant,
}

/// An entry in the due queue (min-heap by due time).
struct QueueEntry<K> {
    key: K,
    due: Instant,
}

impl<K> PartialEq for QueueEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl<K> Eq for QueueEntry<K> {}

impl<K> PartialOrd for QueueEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for QueueEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.due.cmp(&self.due)
    }
}

type Coalesce<T> = Box<dyn Fn(T, T) -> T + Send + Sync>;

/// Coalesces repeated triggers per key into one delayed delivery.
pub struct Debouncer<K, T> {
    delay: Duration,
    pending: HashMap<K, Pending<T>>,
    queue: BinaryHeap<QueueEntry<K>>,
    coalesce: Coalesce<T>,
}

impl<K, T> fmt::Debug for Debouncer<K, T>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, T> Debouncer<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create a debouncer with the given quiet window and reducer.
    pub fn new<F>(delay: Duration, coalesce: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Self {
            delay,
            pending: HashMap::new(),
            queue: BinaryHeap::new(),
            coalesce: Box::new(coalesce),
        }
    }

    /// The quiet window.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the quiet window for future triggers.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Trigger `key` now.
    pub fn trigger(&mut self, key: K, value: T) {
        self.trigger_at(key, value, Instant::now());
    }

    /// Trigger `key` as of `now`, restarting its quiet window.
    pub fn trigger_at(&mut self, key: K, value: T, now: Instant) {
        let due = now + self.delay;
        let value = match self.pending.remove(&key) {
            Some(previous) => (self.coalesce)(previous.value, value),
            None => value,
        };
        tracing::trace!(target: targets::DEBOUNCE, ?key, "debounce triggered");
        self.pending.insert(key.clone(), Pending { value, due });
        self.queue.push(QueueEntry { key, due });
    }

    /// Whether a value is pending for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of keys with a pending value.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop the pending value for `key`, returning it.
    pub fn cancel(&mut self, key: &K) -> Option<T> {
        self.pending.remove(key).map(|p| p.value)
    }

    /// Take the pending value for `key` regardless of its window.
    pub fn flush(&mut self, key: &K) -> Option<T> {
        self.cancel(key)
    }

    /// Take every pending value regardless of windows, earliest first.
    pub fn flush_all(&mut self) -> Vec<(K, T)> {
        let mut all: Vec<(K, Pending<T>)> = self.pending.drain().collect();
        self.queue.clear();
        all.sort_by_key(|(_, p)| p.due);
        all.into_iter().map(|(k, p)| (k, p.value)).collect()
    }

    /// Time until the next key becomes ready, as of `now`.
    ///
    /// Returns `None` when nothing is pending.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        self.prune_stale();
        self.queue
            .peek()
            .map(|entry| entry.due.saturating_duration_since(now))
    }

    /// Remove and return every value whose quiet window has elapsed by `now`.
    pub fn take_ready(&mut self, now: Instant) -> Vec<(K, T)> {
        let mut ready = Vec::new();
        while let Some(entry) = self.queue.peek() {
            if entry.due > now {
                break;
            }
            let Some(entry) = self.queue.pop() else {
                break;
            };
            // Skip entries superseded by a later trigger or a cancel.
            let current = self.pending.get(&entry.key).is_some_and(|p| p.due == entry.due);
            if !current {
                continue;
            }
            if let Some(pending) = self.pending.remove(&entry.key) {
                tracing::trace!(target: targets::DEBOUNCE, key = ?entry.key, "debounce ready");
                ready.push((entry.key, pending.value));
            }
        }
        ready
    }

    fn prune_stale(&mut self) {
        while let Some(entry) = self.queue.peek() {
            let current = self.pending.get(&entry.key).is_some_and(|p| p.due == entry.due);
            if current {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn union() -> Debouncer<u32, Vec<&'static str>> {
        Debouncer::new(Duration::from_millis(100), |mut a, b: Vec<&'static str>| {
            for r in b {
                if !a.contains(&r) {
                    a.push(r);
                }
            }
            a
        })
    }

    #[test]
    fn test_triggers_within_window_coalesce() {
        let mut d = union();
        let t0 = Instant::now();
        d.trigger_at(1, vec!["sort"], t0);
        d.trigger_at(1, vec!["group"], t0 + Duration::from_millis(40));
        d.trigger_at(1, vec!["sort"], t0 + Duration::from_millis(80));

        assert!(d.take_ready(t0 + Duration::from_millis(150)).is_empty());
        assert_eq!(
            d.take_ready(t0 + Duration::from_millis(180)),
            vec![(1, vec!["sort", "group"])]
        );
        assert_eq!(d.pending_count(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut d = union();
        let t0 = Instant::now();
        d.trigger_at(1, vec!["a"], t0);
        d.trigger_at(2, vec!["b"], t0 + Duration::from_millis(50));

        assert_eq!(d.take_ready(t0 + Duration::from_millis(100)), vec![(1, vec!["a"])]);
        assert_eq!(
            d.time_until_next(t0 + Duration::from_millis(100)),
            Some(Duration::from_millis(50))
        );
        assert_eq!(d.take_ready(t0 + Duration::from_millis(150)), vec![(2, vec!["b"])]);
        assert_eq!(d.time_until_next(t0), None);
    }

    #[test]
    fn test_cancel_and_flush() {
        let mut d = union();
        let t0 = Instant::now();
        d.trigger_at(1, vec!["a"], t0);
        d.trigger_at(2, vec!["b"], t0);
        assert_eq!(d.cancel(&1), Some(vec!["a"]));
        assert!(!d.is_pending(&1));
        assert!(d.take_ready(t0 + Duration::from_secs(1)).len() == 1);

        d.trigger_at(3, vec!["c"], t0);
        assert_eq!(d.flush_all(), vec![(3, vec!["c"])]);
        assert_eq!(d.time_until_next(t0), None);
    }
}
