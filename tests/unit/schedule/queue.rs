use super::*;
use crate::foundation::time::TimeRange;
use crate::schedule::aligned_points;

fn frames(n: i64) -> Time {
    Time::new(n, 24).unwrap()
}

#[test]
fn behind_points_are_penalized() {
    let anchor = Time::from_secs(2);
    assert_eq!(weighted_distance(frames(50), anchor, 5), frames(2));
    assert_eq!(weighted_distance(frames(46), anchor, 5), frames(10));
    assert_eq!(weighted_distance(anchor, anchor, 5), Time::ZERO);
}

#[test]
fn full_invalidation_orders_around_playhead() {
    let tb = frames(1);
    let mut q = CacheQueue::new(5);
    q.set_anchor(Time::from_secs(2));
    for t in aligned_points(
        TimeRange::new(Time::ZERO, Time::from_secs(10)),
        Time::from_secs(10),
        tb,
    ) {
        q.insert(t);
    }
    assert_eq!(q.len(), 241);

    let head: Vec<Time> = q.iter().take(7).collect();
    assert_eq!(
        head,
        vec![
            frames(48),
            frames(49),
            frames(50),
            frames(51),
            frames(52),
            frames(47),
            frames(53),
        ]
    );
}

#[test]
fn queue_stays_sorted_and_unique() {
    let anchor = Time::from_secs(3);
    let mut q = CacheQueue::new(5);
    q.set_anchor(anchor);
    for n in [10, 80, 72, 60, 72, 0, 75, 10] {
        q.insert(frames(n));
    }
    assert_eq!(q.len(), 6);
    let d: Vec<Time> = q.iter().map(|t| weighted_distance(t, anchor, 5)).collect();
    assert!(d.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn ties_keep_insertion_order() {
    let mut q = CacheQueue::new(1);
    q.set_anchor(Time::from_secs(5));
    q.insert(Time::from_secs(6));
    q.insert(Time::from_secs(4));
    assert_eq!(
        q.iter().collect::<Vec<_>>(),
        vec![Time::from_secs(6), Time::from_secs(4)]
    );
}

#[test]
fn moving_anchor_resorts() {
    let mut q = CacheQueue::new(5);
    for s in 0..5 {
        q.insert(Time::from_secs(s));
    }
    assert_eq!(q.iter().next(), Some(Time::ZERO));
    q.set_anchor(Time::from_secs(4));
    assert_eq!(q.iter().next(), Some(Time::from_secs(4)));
    assert_eq!(q.iter().last(), Some(Time::ZERO));
}

#[test]
fn pop_remove_and_push_front_keep_membership() {
    let mut q = CacheQueue::new(5);
    q.insert(Time::ZERO);
    q.insert(Time::from_secs(1));
    assert_eq!(q.pop_front(), Some(Time::ZERO));
    assert!(!q.contains(Time::ZERO));
    assert!(q.insert(Time::ZERO));

    assert!(q.remove(Time::from_secs(1)));
    assert!(!q.remove(Time::from_secs(1)));

    q.push_front(Time::from_secs(9));
    assert_eq!(q.pop_front(), Some(Time::from_secs(9)));
    q.clear();
    assert!(q.is_empty());
}

#[test]
fn retain_drops_points_and_membership() {
    let mut q = CacheQueue::new(5);
    for s in 0..6 {
        q.insert(Time::from_secs(s));
    }
    q.retain(|t| t <= Time::from_secs(2));
    assert_eq!(q.len(), 3);
    assert!(!q.contains(Time::from_secs(4)));
    assert!(q.insert(Time::from_secs(4)));
    assert_eq!(q.iter().last(), Some(Time::from_secs(4)));
}
