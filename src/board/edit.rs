use crate::timer::{compute::HOUR_SECS, elapsed_seconds};

/// Hours/minutes fields of the "edit elapsed time" dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeEntry {
    hours: String,
    minutes: String,
}

fn last_two_digits(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    digits[digits.len().saturating_sub(2)..].iter().collect()
}

impl TimeEntry {
    /// Fields pre-filled with what the shelf currently shows.
    pub fn prefill(start_ms: Option<i64>, manual_offset: f64, now_ms: i64) -> Self {
        let total = elapsed_seconds(start_ms, manual_offset, now_ms);
        let hours = (total / HOUR_SECS).floor() as u64;
        let minutes = ((total % HOUR_SECS) / 60.0).floor() as u64;
        Self {
            hours: format!("{hours:02}"),
            minutes: format!("{minutes:02}"),
        }
    }

    pub fn hours(&self) -> &str {
        &self.hours
    }

    pub fn minutes(&self) -> &str {
        &self.minutes
    }

    /// Replaces the hours field with the digits of `raw`, keeping the last
    /// two. Returns true when focus should move on to minutes.
    pub fn type_hours(&mut self, raw: &str) -> bool {
        self.hours = last_two_digits(raw);
        raw.chars().filter(char::is_ascii_digit).count() >= 2
    }

    pub fn type_minutes(&mut self, raw: &str) {
        self.minutes = last_two_digits(raw);
    }

    /// `H*3600 + M*60`; an empty field counts as zero.
    pub fn total_seconds(&self) -> f64 {
        let hours: u32 = self.hours.parse().unwrap_or(0);
        let minutes: u32 = self.minutes.parse().unwrap_or(0);
        f64::from(hours) * HOUR_SECS + f64::from(minutes) * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefill_pads_current_time() {
        let entry = TimeEntry::prefill(Some(0), 0.0, (2 * 3600 + 5 * 60 + 59) * 1000);
        assert_eq!(entry.hours(), "02");
        assert_eq!(entry.minutes(), "05");

        let idle = TimeEntry::prefill(None, -40.0, 0);
        assert_eq!((idle.hours(), idle.minutes()), ("00", "00"));
    }

    #[test]
    fn typing_strips_non_digits_and_keeps_last_two() {
        let mut entry = TimeEntry::default();
        assert!(!entry.type_hours("1"));
        assert_eq!(entry.hours(), "1");

        assert!(entry.type_hours("1a2"));
        assert_eq!(entry.hours(), "12");

        assert!(entry.type_hours("123"));
        assert_eq!(entry.hours(), "23");

        entry.type_minutes("4:5x9");
        assert_eq!(entry.minutes(), "59");

        entry.type_minutes("--");
        assert_eq!(entry.minutes(), "");
    }

    #[test]
    fn totals_without_upper_bound_on_hours() {
        let mut entry = TimeEntry::default();
        entry.type_hours("99");
        entry.type_minutes("30");
        assert_eq!(entry.total_seconds(), 99.0 * 3600.0 + 30.0 * 60.0);

        entry.type_hours("");
        assert_eq!(entry.total_seconds(), 1_800.0);
    }
}
