use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const HOUR_SECS: f64 = 3600.0;

/// Ascending second counts at which a session changes tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub green: f64,
    pub yellow: f64,
    pub red: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            green: 12.0 * HOUR_SECS,
            yellow: 18.0 * HOUR_SECS,
            red: 36.0 * HOUR_SECS,
        }
    }
}

impl Thresholds {
    pub fn new(green: f64, yellow: f64, red: f64) -> Result<Self> {
        let thresholds = Self { green, yellow, red };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.green > 0.0 && self.green < self.yellow && self.yellow < self.red) {
            bail!(
                "thresholds must be positive and ascending (green {} < yellow {} < red {})",
                self.green,
                self.yellow,
                self.red
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Normal,
    Green,
    Yellow,
    Red,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Green => "green",
            Tier::Yellow => "yellow",
            Tier::Red => "red",
        }
    }
}

/// Seconds shown for a shelf at `now_ms`, never negative.
pub fn elapsed_seconds(start_ms: Option<i64>, manual_offset: f64, now_ms: i64) -> f64 {
    let since_start = start_ms
        .map(|start| now_ms.saturating_sub(start) as f64 / 1000.0)
        .unwrap_or(0.0);
    (since_start + manual_offset).max(0.0)
}

/// `HH:MM`, hours unbounded.
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let hours = (seconds / HOUR_SECS).floor() as u64;
    let minutes = ((seconds % HOUR_SECS) / 60.0).floor() as u64;
    format!("{hours:02}:{minutes:02}")
}

pub fn severity_tier(seconds: f64, thresholds: &Thresholds) -> Tier {
    if seconds >= thresholds.red {
        Tier::Red
    } else if seconds >= thresholds.yellow {
        Tier::Yellow
    } else if seconds >= thresholds.green {
        Tier::Green
    } else {
        Tier::Normal
    }
}

/// Share of the red threshold reached, in `0.0..=1.0`.
pub fn progress_fraction(seconds: f64, thresholds: &Thresholds) -> f64 {
    (seconds / thresholds.red).clamp(0.0, 1.0)
}

/// Everything a timer widget renders for one instant.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerReading {
    pub elapsed_secs: f64,
    pub display: String,
    pub tier: Tier,
    pub progress: f64,
}

impl TimerReading {
    pub fn at(start_ms: Option<i64>, manual_offset: f64, now_ms: i64, thresholds: &Thresholds) -> Self {
        let elapsed_secs = elapsed_seconds(start_ms, manual_offset, now_ms);
        Self {
            elapsed_secs,
            display: format_duration(elapsed_secs),
            tier: severity_tier(elapsed_secs, thresholds),
            progress: progress_fraction(elapsed_secs, thresholds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_combines_start_and_offset() {
        assert_eq!(elapsed_seconds(Some(1_000), 0.0, 4_000), 3.0);
        assert_eq!(elapsed_seconds(Some(1_000), 10.0, 4_000), 13.0);
        assert_eq!(elapsed_seconds(None, 90.0, 4_000), 90.0);
        assert_eq!(elapsed_seconds(None, -30.0, 4_000), 0.0);
        assert_eq!(elapsed_seconds(Some(10_000), -30.0, 12_000), 0.0);
    }

    #[test]
    fn extreme_timestamps_saturate() {
        let far = elapsed_seconds(Some(i64::MIN), 0.0, i64::MAX);
        assert!(far.is_finite() && far > 0.0);
        assert_eq!(elapsed_seconds(Some(i64::MAX), 0.0, i64::MIN), 0.0);
        assert!(format_duration(far).len() > 5);
    }

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_duration(0.0), "00:00");
        assert_eq!(format_duration(59.9), "00:00");
        assert_eq!(format_duration(61.0), "00:01");
        assert_eq!(format_duration(3_599.0), "00:59");
        assert_eq!(format_duration(7_200.0), "02:00");
        assert_eq!(format_duration(100.0 * HOUR_SECS + 5.0 * 60.0), "100:05");
        assert_eq!(format_duration(-5.0), format_duration(0.0));
        assert_eq!(format_duration(f64::NAN), "00:00");
    }

    #[test]
    fn format_matches_floor_division_across_range() {
        for seconds in (0..200_000u64).step_by(37) {
            let expected = format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60);
            assert_eq!(format_duration(seconds as f64), expected);
        }
    }

    #[test]
    fn tiers_follow_default_thresholds() {
        let thresholds = Thresholds::default();
        assert_eq!(severity_tier(0.0, &thresholds), Tier::Normal);
        assert_eq!(severity_tier(12.0 * HOUR_SECS - 1.0, &thresholds), Tier::Normal);
        assert_eq!(severity_tier(12.0 * HOUR_SECS, &thresholds), Tier::Green);
        assert_eq!(severity_tier(18.0 * HOUR_SECS, &thresholds), Tier::Yellow);
        assert_eq!(severity_tier(36.0 * HOUR_SECS, &thresholds), Tier::Red);
        assert_eq!(severity_tier(500.0 * HOUR_SECS, &thresholds), Tier::Red);
    }

    #[test]
    fn tier_is_monotonic() {
        let thresholds = Thresholds::new(10.0, 20.0, 30.0).unwrap();
        let mut previous = Tier::Normal;
        for step in 0..400 {
            let tier = severity_tier(step as f64 * 0.1, &thresholds);
            assert!(tier >= previous);
            previous = tier;
        }
        assert_eq!(previous, Tier::Red);
    }

    #[test]
    fn progress_caps_at_red() {
        let thresholds = Thresholds::default();
        assert_eq!(progress_fraction(0.0, &thresholds), 0.0);
        assert_eq!(progress_fraction(18.0 * HOUR_SECS, &thresholds), 0.5);
        assert_eq!(progress_fraction(72.0 * HOUR_SECS, &thresholds), 1.0);
    }

    #[test]
    fn rejects_unordered_thresholds() {
        assert!(Thresholds::new(10.0, 10.0, 30.0).is_err());
        assert!(Thresholds::new(0.0, 10.0, 30.0).is_err());
        assert!(Thresholds::new(30.0, 20.0, 10.0).is_err());
    }

    #[test]
    fn reading_is_deterministic() {
        let thresholds = Thresholds::default();
        let a = TimerReading::at(Some(0), 43_200.0, 1_000, &thresholds);
        let b = TimerReading::at(Some(0), 43_200.0, 1_000, &thresholds);
        assert_eq!(a, b);
        assert_eq!(a.display, "12:00");
        assert_eq!(a.tier, Tier::Green);
    }
}
