//! Link data rate and transmission-time arithmetic.

use std::fmt;
use std::str::FromStr;

use crate::error::{SimError, SimResult};
use crate::time::{scale_decimal, TimeDelta};

/// Link capacity in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DataRate(u64);

impl DataRate {
    #[inline]
    pub const fn from_bps(bps: u64) -> Self {
        DataRate(bps)
    }

    // The unit constructors saturate at `u64::MAX` bit/s.

    #[inline]
    pub const fn from_kbps(kbps: u64) -> Self {
        DataRate(kbps.saturating_mul(1_000))
    }

    #[inline]
    pub const fn from_mbps(mbps: u64) -> Self {
        DataRate(mbps.saturating_mul(1_000_000))
    }

    #[inline]
    pub const fn from_gbps(gbps: u64) -> Self {
        DataRate(gbps.saturating_mul(1_000_000_000))
    }

    #[inline]
    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Time needed to clock `bytes` onto the wire at this rate.
    ///
    /// Rounded up to the next nanosecond so a transmission never
    /// completes early.
    pub fn tx_time(self, bytes: usize) -> SimResult<TimeDelta> {
        if self.0 == 0 {
            return Err(SimError::InvalidValue {
                kind: "DataRate",
                value: self.to_string(),
            });
        }
        let bits = bytes as u128 * 8;
        let nanos = (bits * 1_000_000_000).div_ceil(self.0 as u128);
        i64::try_from(nanos)
            .map(TimeDelta::from_nanos)
            .map_err(|_| SimError::TimeOverflow)
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.0;
        if bps != 0 && bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps != 0 && bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps != 0 && bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{}bps", bps)
        }
    }
}

/// Parses `"10Mbps"`, `"1.5Gb/s"`, `"500kbps"`, `"2MBps"` (bytes) and the
/// binary forms `"1Mibps"` / `"1MiBps"`.
impl FromStr for DataRate {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let multiplier = unit_multiplier(unit.trim()).ok_or_else(|| invalid_rate(s))?;
        let bps = scale_decimal(number, multiplier).ok_or_else(|| invalid_rate(s))?;
        if bps <= 0 {
            return Err(invalid_rate(s));
        }
        Ok(DataRate(bps as u64))
    }
}

fn unit_multiplier(unit: &str) -> Option<i64> {
    let (prefix, per_second) = unit
        .strip_suffix("ps")
        .or_else(|| unit.strip_suffix("/s"))
        .map(|p| (p, true))
        .unwrap_or((unit, false));
    if !per_second {
        return None;
    }
    let (scale_part, bits) = if let Some(p) = prefix.strip_suffix('b') {
        (p, 1)
    } else if let Some(p) = prefix.strip_suffix('B') {
        (p, 8)
    } else {
        return None;
    };
    let scale: i64 = match scale_part {
        "" => 1,
        "k" | "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        _ => return None,
    };
    Some(scale * bits)
}

fn invalid_rate(s: &str) -> SimError {
    SimError::InvalidValue {
        kind: "DataRate",
        value: s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bit_units() {
        assert_eq!("10Mbps".parse::<DataRate>().unwrap(), DataRate::from_mbps(10));
        assert_eq!("500kbps".parse::<DataRate>().unwrap(), DataRate::from_kbps(500));
        assert_eq!("1Gb/s".parse::<DataRate>().unwrap(), DataRate::from_gbps(1));
        assert_eq!("1.5Mbps".parse::<DataRate>().unwrap(), DataRate::from_bps(1_500_000));
        assert_eq!("9600bps".parse::<DataRate>().unwrap(), DataRate::from_bps(9600));
    }

    #[test]
    fn test_unit_constructors_saturate() {
        assert_eq!(DataRate::from_gbps(u64::MAX).bps(), u64::MAX);
        assert_eq!(DataRate::from_kbps(u64::MAX / 100).bps(), u64::MAX);
        assert_eq!(DataRate::from_mbps(3).bps(), 3_000_000);
    }

    #[test]
    fn test_parse_byte_and_binary_units() {
        assert_eq!("1MBps".parse::<DataRate>().unwrap(), DataRate::from_mbps(8));
        assert_eq!("1Kibps".parse::<DataRate>().unwrap(), DataRate::from_bps(1024));
        assert_eq!("1KiBps".parse::<DataRate>().unwrap(), DataRate::from_bps(8192));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("10".parse::<DataRate>().is_err());
        assert!("10Mbit".parse::<DataRate>().is_err());
        assert!("0bps".parse::<DataRate>().is_err());
        assert!("fastbps".parse::<DataRate>().is_err());
    }

    #[test]
    fn test_tx_time_exact() {
        // 1250 bytes = 10_000 bits at 10 Mbps = 1 ms.
        let rate = DataRate::from_mbps(10);
        assert_eq!(rate.tx_time(1250).unwrap(), TimeDelta::from_millis(1));
    }

    #[test]
    fn test_tx_time_rounds_up() {
        // 1 byte at 3 bps = 2.666.. s
        let rate = DataRate::from_bps(3);
        assert_eq!(rate.tx_time(1).unwrap().nanos(), 2_666_666_667);
    }

    #[test]
    fn test_tx_time_zero_rate() {
        assert!(DataRate::from_bps(0).tx_time(1).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataRate::from_mbps(100).to_string(), "100Mbps");
        assert_eq!(DataRate::from_bps(32768).to_string(), "32768bps");
        assert_eq!(DataRate::from_gbps(1).to_string(), "1Gbps");
    }
}
