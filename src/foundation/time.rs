use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;

use crate::foundation::error::{KinemaError, KinemaResult};

/// Exact rational time (seconds) as `num/den`.
///
/// Always stored reduced with `den > 0`, so derived equality and hashing are numeric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawTime", into = "RawTime")]
pub struct Time {
    num: i64,
    den: i64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawTime {
    num: i64,
    den: i64,
}

impl TryFrom<RawTime> for Time {
    type Error = KinemaError;

    fn try_from(raw: RawTime) -> KinemaResult<Self> {
        Time::new(raw.num, raw.den)
    }
}

impl From<Time> for RawTime {
    fn from(t: Time) -> Self {
        Self {
            num: t.num,
            den: t.den,
        }
    }
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

impl Time {
    /// Zero seconds.
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Largest representable time, used as an open upper bound.
    pub const MAX: Time = Time {
        num: i64::MAX,
        den: 1,
    };

    /// Create a validated, reduced rational.
    pub fn new(num: i64, den: i64) -> KinemaResult<Self> {
        if den == 0 {
            return Err(KinemaError::config("time denominator must be non-zero"));
        }
        Ok(Self::reduce(i128::from(num), i128::from(den)))
    }

    /// Whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self { num: secs, den: 1 }
    }

    /// Duration of one frame at `fps` frames per second (`fps` of zero is treated as one).
    pub const fn frame_duration(fps: u32) -> Self {
        let den = if fps == 0 { 1 } else { fps as i64 };
        Self { num: 1, den }
    }

    /// Numerator of the reduced form.
    pub fn num(self) -> i64 {
        self.num
    }

    /// Denominator of the reduced form (always > 0).
    pub fn den(self) -> i64 {
        self.den
    }

    /// Lossy conversion for display and logging.
    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Return `true` when strictly below zero.
    pub fn is_negative(self) -> bool {
        self.num < 0
    }

    /// Return `true` when strictly above zero.
    pub fn is_positive(self) -> bool {
        self.num > 0
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Self {
            num: self.num.saturating_abs(),
            den: self.den,
        }
    }

    /// Largest integer `k` with `k <= self / step`.
    ///
    /// `step` must be positive.
    pub fn div_floor(self, step: Time) -> i64 {
        // self/step = (a*d) / (b*c) with b, d > 0 and c > 0.
        let n = i128::from(self.num) * i128::from(step.den);
        let d = i128::from(self.den) * i128::from(step.num);
        clamp_i64(n.div_euclid(d))
    }

    /// Snap down to the closest multiple of `step` that is `<= self`.
    pub fn floor_to(self, step: Time) -> Time {
        step * self.div_floor(step)
    }

    fn reduce(mut num: i128, mut den: i128) -> Self {
        if den < 0 {
            num = -num;
            den = -den;
        }
        let g = gcd(num, den).max(1);
        num /= g;
        den /= g;
        // Out-of-range results saturate; timeline values never get close in practice.
        if num > i128::from(i64::MAX) || num < i128::from(i64::MIN) || den > i128::from(i64::MAX)
        {
            let approx = num / den;
            return Self {
                num: clamp_i64(approx),
                den: 1,
            };
        }
        Self {
            num: num as i64,
            den: den as i64,
        }
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

impl Default for Time {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        let l = i128::from(self.num) * i128::from(other.den);
        let r = i128::from(other.num) * i128::from(self.den);
        l.cmp(&r)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        let n = i128::from(self.num) * i128::from(rhs.den)
            + i128::from(rhs.num) * i128::from(self.den);
        let d = i128::from(self.den) * i128::from(rhs.den);
        Time::reduce(n, d)
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        self + (-rhs)
    }
}

impl Neg for Time {
    type Output = Time;

    fn neg(self) -> Time {
        Time::reduce(-i128::from(self.num), i128::from(self.den))
    }
}

impl Mul<i64> for Time {
    type Output = Time;

    fn mul(self, rhs: i64) -> Time {
        Time::reduce(i128::from(self.num) * i128::from(rhs), i128::from(self.den))
    }
}

impl Mul for Time {
    type Output = Time;

    fn mul(self, rhs: Time) -> Time {
        Time::reduce(
            i128::from(self.num) * i128::from(rhs.num),
            i128::from(self.den) * i128::from(rhs.den),
        )
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Time {
    type Err = KinemaError;

    /// Accepts `"num/den"` or a plain integer.
    fn from_str(s: &str) -> KinemaResult<Self> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|e| KinemaError::config(format!("invalid time '{s}': {e}")))
        };
        match s.split_once('/') {
            Some((n, d)) => Time::new(parse(n)?, parse(d)?),
            None => Ok(Time::from_secs(parse(s)?)),
        }
    }
}

/// Ordered `(in, out)` pair of times with `in <= out`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    #[serde(rename = "in")]
    in_: Time,
    out: Time,
}

impl TimeRange {
    /// Build a range; reversed bounds are swapped.
    pub fn new(a: Time, b: Time) -> Self {
        if a <= b {
            Self { in_: a, out: b }
        } else {
            Self { in_: b, out: a }
        }
    }

    /// Degenerate range covering a single time point.
    pub fn point(t: Time) -> Self {
        Self { in_: t, out: t }
    }

    /// Inclusive start.
    pub fn in_point(self) -> Time {
        self.in_
    }

    /// Inclusive end.
    pub fn out_point(self) -> Time {
        self.out
    }

    /// `out - in`.
    pub fn length(self) -> Time {
        self.out - self.in_
    }

    /// Return `true` when `t` lies in `[in, out]`.
    pub fn contains(self, t: Time) -> bool {
        self.in_ <= t && t <= self.out
    }

    /// Return `true` when both closed ranges share at least one point.
    pub fn overlaps(self, other: TimeRange) -> bool {
        self.in_ <= other.out && other.in_ <= self.out
    }

    /// Smallest range covering both.
    pub fn union(self, other: TimeRange) -> TimeRange {
        TimeRange {
            in_: self.in_.min(other.in_),
            out: self.out.max(other.out),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.in_, self.out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/time.rs"]
mod tests;
