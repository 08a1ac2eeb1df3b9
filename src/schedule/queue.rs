use std::collections::{HashSet, VecDeque};

use crate::foundation::time::Time;

/// Distance from `anchor`, with times behind it weighted by `behind_penalty`.
///
/// Frames after the playhead are needed soonest, so a point `d` seconds behind ranks like one
/// `d * behind_penalty` seconds ahead.
pub fn weighted_distance(t: Time, anchor: Time, behind_penalty: i64) -> Time {
    let d = t - anchor;
    if d.is_negative() {
        d.abs() * behind_penalty
    } else {
        d
    }
}

/// Pending cache points ordered by weighted distance from the playhead.
///
/// Each time appears at most once. Insertion keeps the order stable: a new point goes after every
/// queued point with an equal or smaller distance.
#[derive(Clone, Debug)]
pub struct CacheQueue {
    entries: VecDeque<Time>,
    members: HashSet<Time>,
    anchor: Time,
    behind_penalty: i64,
}

impl CacheQueue {
    /// Empty queue anchored at zero.
    pub fn new(behind_penalty: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            members: HashSet::new(),
            anchor: Time::ZERO,
            behind_penalty: behind_penalty.max(1),
        }
    }

    /// Playhead the order is computed against.
    pub fn anchor(&self) -> Time {
        self.anchor
    }

    /// Move the playhead and re-sort the queued points (stable).
    pub fn set_anchor(&mut self, anchor: Time) {
        if anchor == self.anchor {
            return;
        }
        self.anchor = anchor;
        let penalty = self.behind_penalty;
        self.entries
            .make_contiguous()
            .sort_by_key(|t| weighted_distance(*t, anchor, penalty));
    }

    fn distance(&self, t: Time) -> Time {
        weighted_distance(t, self.anchor, self.behind_penalty)
    }

    /// Queue `t` unless it is already present. Returns `true` when inserted.
    pub fn insert(&mut self, t: Time) -> bool {
        if !self.members.insert(t) {
            return false;
        }
        let d = self.distance(t);
        let at = self.entries.partition_point(|e| self.distance(*e) <= d);
        self.entries.insert(at, t);
        true
    }

    /// Take the most urgent point.
    pub fn pop_front(&mut self) -> Option<Time> {
        let t = self.entries.pop_front()?;
        self.members.remove(&t);
        Some(t)
    }

    /// Put a point back at the head, ahead of everything else.
    pub fn push_front(&mut self, t: Time) {
        if self.members.insert(t) {
            self.entries.push_front(t);
        }
    }

    /// Drop `t` if queued.
    pub fn remove(&mut self, t: Time) -> bool {
        if !self.members.remove(&t) {
            return false;
        }
        self.entries.retain(|e| *e != t);
        true
    }

    /// Return `true` when `t` is queued.
    pub fn contains(&self, t: Time) -> bool {
        self.members.contains(&t)
    }

    /// Number of queued points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued points, most urgent first.
    pub fn iter(&self) -> impl Iterator<Item = Time> + '_ {
        self.entries.iter().copied()
    }

    /// Keep only the points `keep` accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(Time) -> bool) {
        let members = &mut self.members;
        self.entries.retain(|t| {
            let kept = keep(*t);
            if !kept {
                members.remove(t);
            }
            kept
        });
    }

    /// Drop every queued point.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/queue.rs"]
mod tests;
