use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Logical clock value, advanced by one on every recorded access.
type Timestamp = u64;

/// Access history for one tracked key
#[derive(Debug)]
struct AccessHistory {
    /// Most recent access at the back, at most k entries
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl AccessHistory {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// LRU-K replacement policy over arbitrary keys.
///
/// The victim is the evictable key whose backward k-distance is the largest.
/// Keys with fewer than k accesses have +inf distance and go first, oldest
/// access first. With `k == 1` this is plain least-recently-used.
///
/// The replacer does no locking of its own; the owning cache keeps it inside
/// its critical section.
#[derive(Debug)]
pub struct LruKReplacer<K> {
    k: usize,
    current_timestamp: Timestamp,
    entries: HashMap<K, AccessHistory>,
    num_evictable: usize,
}

impl<K: Clone + Eq + Hash> LruKReplacer<K> {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            current_timestamp: 0,
            entries: HashMap::new(),
            num_evictable: 0,
        }
    }

    /// Evicts the key with the largest backward k-distance.
    /// Returns None if nothing is evictable.
    pub fn evict(&mut self) -> Option<K> {
        if self.num_evictable == 0 {
            return None;
        }

        let now = self.current_timestamp;
        let mut victim: Option<(&K, Option<Timestamp>, Option<Timestamp>)> = None;

        for (key, info) in self.entries.iter().filter(|(_, info)| info.is_evictable) {
            let k_dist = info.k_distance(now, self.k);
            let earliest = info.earliest_timestamp();

            let replace = match victim {
                None => true,
                Some((_, victim_dist, victim_earliest)) => match (victim_dist, k_dist) {
                    (None, Some(_)) => false,
                    (Some(_), None) => true,
                    (None, None) => match (victim_earliest, earliest) {
                        (Some(v), Some(c)) => c < v,
                        (None, Some(_)) => true,
                        _ => false,
                    },
                    (Some(v), Some(c)) => c > v,
                },
            };

            if replace {
                victim = Some((key, k_dist, earliest));
            }
        }

        let key = victim.map(|(key, _, _)| key.clone())?;
        self.entries.remove(&key);
        self.num_evictable -= 1;
        Some(key)
    }

    /// Records an access to `key` at the current timestamp.
    /// A key seen for the first time starts out non-evictable.
    pub fn record_access(&mut self, key: &K) {
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        let k = self.k;
        self.entries
            .entry(key.clone())
            .or_insert_with(AccessHistory::new)
            .record_access(timestamp, k);
    }

    /// Marks a tracked key evictable or pinned. Unknown keys are ignored.
    pub fn set_evictable(&mut self, key: &K, is_evictable: bool) {
        if let Some(info) = self.entries.get_mut(key) {
            if info.is_evictable != is_evictable {
                if is_evictable {
                    self.num_evictable += 1;
                } else {
                    self.num_evictable -= 1;
                }
                info.is_evictable = is_evictable;
            }
        }
    }

    /// Stops tracking a key.
    pub fn remove(&mut self, key: &K) {
        if let Some(info) = self.entries.remove(key) {
            if info.is_evictable {
                self.num_evictable -= 1;
            }
        }
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.num_evictable = 0;
    }

    /// Number of evictable keys.
    pub fn size(&self) -> usize {
        self.num_evictable
    }

    /// Number of tracked keys, evictable or not.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
