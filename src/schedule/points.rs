use crate::foundation::time::{Time, TimeRange};

/// Time-base-aligned cache points covering `[start, end]` within `[0, length]`.
///
/// The range is clamped to the sequence first; the start is then snapped down onto the time-base
/// grid, and points are enumerated up to and including the clamped end. Nothing is produced for
/// a non-positive time base or a range that lies outside the sequence.
pub fn aligned_points(range: TimeRange, length: Time, time_base: Time) -> AlignedPoints {
    let start = range.in_point().max(Time::ZERO);
    let end = range.out_point().min(length);
    if !time_base.is_positive() || start > end {
        return AlignedPoints {
            next: Time::ZERO,
            end: Time::ZERO,
            step: time_base,
            done: true,
        };
    }
    AlignedPoints {
        next: start.floor_to(time_base),
        end,
        step: time_base,
        done: false,
    }
}

/// Iterator returned by [`aligned_points`].
#[derive(Clone, Debug)]
pub struct AlignedPoints {
    next: Time,
    end: Time,
    step: Time,
    done: bool,
}

impl Iterator for AlignedPoints {
    type Item = Time;

    fn next(&mut self) -> Option<Time> {
        if self.done || self.next > self.end {
            self.done = true;
            return None;
        }
        let t = self.next;
        self.next += self.step;
        Some(t)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/points.rs"]
mod tests;
