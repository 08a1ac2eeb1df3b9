use super::*;

fn t(n: i64, d: i64) -> Time {
    Time::new(n, d).unwrap()
}

#[test]
fn enumerates_inclusive_end() {
    let pts: Vec<Time> = aligned_points(
        TimeRange::new(Time::ZERO, Time::from_secs(1)),
        Time::from_secs(10),
        t(1, 4),
    )
    .collect();
    assert_eq!(
        pts,
        vec![Time::ZERO, t(1, 4), t(1, 2), t(3, 4), Time::from_secs(1)]
    );
}

#[test]
fn start_snaps_down_to_time_base() {
    let pts: Vec<Time> =
        aligned_points(TimeRange::new(t(1, 10), t(1, 5)), Time::from_secs(10), t(1, 24)).collect();
    assert_eq!(pts, vec![t(2, 24), t(3, 24), t(4, 24)]);
}

#[test]
fn clamps_to_sequence() {
    let pts: Vec<Time> = aligned_points(
        TimeRange::new(Time::from_secs(-3), Time::from_secs(50)),
        Time::from_secs(1),
        t(1, 2),
    )
    .collect();
    assert_eq!(pts, vec![Time::ZERO, t(1, 2), Time::from_secs(1)]);

    let beyond = aligned_points(
        TimeRange::new(Time::from_secs(5), Time::from_secs(6)),
        Time::from_secs(1),
        t(1, 2),
    );
    assert_eq!(beyond.count(), 0);
}

#[test]
fn zero_time_base_yields_nothing() {
    let pts = aligned_points(
        TimeRange::new(Time::ZERO, Time::from_secs(1)),
        Time::from_secs(1),
        Time::ZERO,
    );
    assert_eq!(pts.count(), 0);
}
