//! Virtual time for the discrete-event network simulator.
//!
//! Absolute instants are `VirtualTime` (nanoseconds since the start of a
//! run); relative spans are `TimeDelta` (signed nanoseconds, so a
//! negative scheduling delay is representable and rejected). Neither
//! depends on `std::time` or the wall clock.

use std::fmt;
use std::str::FromStr;

use crate::error::{SimError, SimResult};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

// ── VirtualTime ───────────────────────────────────────────────────────

/// An absolute point in simulation time, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Create a `VirtualTime` from raw nanoseconds.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    // The unit constructors saturate at the ends of the range instead of
    // wrapping.

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        VirtualTime(micros.saturating_mul(NANOS_PER_MICRO as u64))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis.saturating_mul(NANOS_PER_MILLI as u64))
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs.saturating_mul(NANOS_PER_SEC as u64))
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Offset this instant by a non-negative delta.
    ///
    /// Returns `InvalidDelay` for a negative delta and `TimeOverflow` if
    /// the result does not fit.
    pub fn checked_add(self, delta: TimeDelta) -> SimResult<VirtualTime> {
        if delta.is_negative() {
            return Err(SimError::InvalidDelay { delay: delta });
        }
        self.0
            .checked_add(delta.0 as u64)
            .map(VirtualTime)
            .ok_or(SimError::TimeOverflow)
    }

    /// Span from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn since(self, earlier: VirtualTime) -> Option<TimeDelta> {
        let diff = self.0.checked_sub(earlier.0)?;
        i64::try_from(diff).ok().map(TimeDelta)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", format_nanos(self.0 as i128))
    }
}

// ── TimeDelta ─────────────────────────────────────────────────────────

/// A signed span of simulation time, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeDelta(i64);

impl TimeDelta {
    pub const ZERO: TimeDelta = TimeDelta(0);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        TimeDelta(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        TimeDelta(micros.saturating_mul(NANOS_PER_MICRO))
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        TimeDelta(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        TimeDelta(secs.saturating_mul(NANOS_PER_SEC))
    }

    #[inline]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: TimeDelta) -> Option<TimeDelta> {
        self.0.checked_add(other.0).map(TimeDelta)
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_nanos(self.0 as i128))
    }
}

/// Parses `"2ms"`, `"4s"`, `"150us"`, `"10ns"`, `"1.5ms"` or a bare number
/// of seconds.
impl FromStr for TimeDelta {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let scale = match unit.trim() {
            "" | "s" => NANOS_PER_SEC,
            "ms" => NANOS_PER_MILLI,
            "us" => NANOS_PER_MICRO,
            "ns" => 1,
            "min" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            _ => return Err(invalid_time(s)),
        };
        let nanos = scale_decimal(number, scale).ok_or_else(|| invalid_time(s))?;
        Ok(TimeDelta(nanos))
    }
}

fn invalid_time(s: &str) -> SimError {
    SimError::InvalidValue {
        kind: "Time",
        value: s.to_string(),
    }
}

/// Multiply a decimal literal by an integer scale without going through
/// floating point, so `"1.5ms"` is exactly 1_500_000 ns.
pub(crate) fn scale_decimal(number: &str, scale: i64) -> Option<i64> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(scale)?;
    let mut unit = scale;
    for c in frac.chars() {
        let digit = c.to_digit(10)? as i64;
        unit /= 10;
        if unit == 0 {
            // Finer than the unit can express: truncated.
            break;
        }
        value = value.checked_add(digit * unit)?;
    }
    Some(if negative { -value } else { value })
}

fn format_nanos(nanos: i128) -> String {
    let abs = nanos.unsigned_abs();
    let sign = if nanos < 0 { "-" } else { "" };
    let (div, unit) = if abs == 0 {
        (1, "s")
    } else if abs % NANOS_PER_SEC as u128 == 0 {
        (NANOS_PER_SEC as u128, "s")
    } else if abs % NANOS_PER_MILLI as u128 == 0 {
        (NANOS_PER_MILLI as u128, "ms")
    } else if abs % NANOS_PER_MICRO as u128 == 0 {
        (NANOS_PER_MICRO as u128, "us")
    } else {
        (1, "ns")
    };
    format!("{}{}{}", sign, abs / div, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(VirtualTime::ZERO.nanos(), 0);
        assert_eq!(TimeDelta::ZERO.nanos(), 0);
    }

    #[test]
    fn test_unit_constructors_saturate() {
        assert_eq!(VirtualTime::from_secs(u64::MAX).nanos(), u64::MAX);
        assert_eq!(VirtualTime::from_micros(u64::MAX / 10).nanos(), u64::MAX);
        assert_eq!(TimeDelta::from_secs(i64::MAX).nanos(), i64::MAX);
        assert_eq!(TimeDelta::from_millis(i64::MIN).nanos(), i64::MIN);
    }

    #[test]
    fn test_ordering() {
        let t1 = VirtualTime::from_millis(1);
        let t2 = VirtualTime::from_millis(2);
        assert!(t1 < t2);
    }

    #[test]
    fn test_checked_add() {
        let t = VirtualTime::from_millis(1);
        let t2 = t.checked_add(TimeDelta::from_millis(2)).unwrap();
        assert_eq!(t2, VirtualTime::from_millis(3));
    }

    #[test]
    fn test_checked_add_rejects_negative() {
        let t = VirtualTime::from_millis(5);
        let err = t.checked_add(TimeDelta::from_nanos(-1)).unwrap_err();
        assert!(matches!(err, SimError::InvalidDelay { .. }));
    }

    #[test]
    fn test_checked_add_overflow() {
        let t = VirtualTime::from_nanos(u64::MAX);
        assert_eq!(
            t.checked_add(TimeDelta::from_nanos(1)).unwrap_err(),
            SimError::TimeOverflow
        );
    }

    #[test]
    fn test_since() {
        let a = VirtualTime::from_millis(1);
        let b = VirtualTime::from_millis(4);
        assert_eq!(b.since(a), Some(TimeDelta::from_millis(3)));
        assert_eq!(a.since(b), None);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("2ms".parse::<TimeDelta>().unwrap(), TimeDelta::from_millis(2));
        assert_eq!("4s".parse::<TimeDelta>().unwrap(), TimeDelta::from_secs(4));
        assert_eq!("150us".parse::<TimeDelta>().unwrap(), TimeDelta::from_micros(150));
        assert_eq!("10ns".parse::<TimeDelta>().unwrap(), TimeDelta::from_nanos(10));
        assert_eq!("1.5ms".parse::<TimeDelta>().unwrap(), TimeDelta::from_micros(1500));
        assert_eq!("0.25".parse::<TimeDelta>().unwrap(), TimeDelta::from_millis(250));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("fast".parse::<TimeDelta>().is_err());
        assert!("3 parsecs".parse::<TimeDelta>().is_err());
        assert!("ms".parse::<TimeDelta>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TimeDelta::from_millis(2).to_string(), "2ms");
        assert_eq!(TimeDelta::from_micros(1500).to_string(), "1500us");
        assert_eq!(VirtualTime::from_secs(3).to_string(), "+3s");
        assert_eq!(TimeDelta::from_nanos(-7).to_string(), "-7ns");
    }
}
