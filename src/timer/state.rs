use serde::{Deserialize, Serialize};

use crate::models::ShelfRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ShelfStatus {
    Idle,
    Running,
}

impl Default for ShelfStatus {
    fn default() -> Self {
        ShelfStatus::Idle
    }
}

impl ShelfRecord {
    pub fn status(&self) -> ShelfStatus {
        if self.start_time.is_some() {
            ShelfStatus::Running
        } else {
            ShelfStatus::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == ShelfStatus::Running
    }

    pub fn can_start(&self) -> bool {
        !self.is_running()
    }

    /// Reset does something only if there is a timer, an offset or a station to clear.
    pub fn can_reset(&self) -> bool {
        self.is_running() || self.manual_offset != 0.0 || !self.station_id.is_empty()
    }

    /// Idle -> Running. The offset is kept so a preset time carries over.
    /// Returns `false` when the shelf was already running.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.is_running() {
            return false;
        }
        self.start_time = Some(now_ms);
        true
    }

    /// Back to Idle, clearing the station and offset too.
    pub fn reset(&mut self) {
        self.start_time = None;
        self.manual_offset = 0.0;
        self.station_id.clear();
    }

    /// Makes the displayed elapsed time equal `total_secs` at `now_ms` and
    /// leaves the shelf running from there.
    pub fn edit_time(&mut self, total_secs: f64, now_ms: i64) {
        let base = self.start_time.unwrap_or(now_ms);
        let elapsed_since_base = now_ms.saturating_sub(base) as f64 / 1000.0;
        self.start_time = Some(base);
        self.manual_offset = total_secs - elapsed_since_base;
    }

    pub fn assign_station(&mut self, station_id: impl Into<String>) {
        self.station_id = station_id.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::compute::elapsed_seconds;

    #[test]
    fn start_preserves_preset_offset() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.manual_offset = 1_800.0;

        assert!(shelf.start(1_000));
        assert_eq!(shelf.status(), ShelfStatus::Running);
        assert_eq!(elapsed_seconds(shelf.start_time, shelf.manual_offset, 1_000), 1_800.0);
    }

    #[test]
    fn start_is_ignored_while_running() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.start(1_000);
        assert!(!shelf.start(9_000));
        assert_eq!(shelf.start_time, Some(1_000));
    }

    #[test]
    fn reset_clears_everything() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.assign_station("S3");
        shelf.start(1_000);
        shelf.edit_time(600.0, 5_000);

        shelf.reset();
        assert_eq!(shelf, ShelfRecord::new(1, 1));
        assert!(!shelf.can_reset());

        let mut idle_with_station = ShelfRecord::new(1, 2);
        idle_with_station.assign_station("S1");
        assert!(idle_with_station.can_reset());
        idle_with_station.reset();
        assert_eq!(idle_with_station.station_id, "");
    }

    #[test]
    fn edit_on_idle_shelf_starts_it() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.edit_time(5_400.0, 20_000);

        assert_eq!(shelf.start_time, Some(20_000));
        assert_eq!(shelf.manual_offset, 5_400.0);
        assert_eq!(elapsed_seconds(shelf.start_time, shelf.manual_offset, 20_000), 5_400.0);
        assert_eq!(elapsed_seconds(shelf.start_time, shelf.manual_offset, 80_000), 5_460.0);
    }

    #[test]
    fn edit_then_read_yields_target() {
        for (start, now, target) in [(0i64, 1i64, 0.0), (1_000, 4_000, 7_200.0), (5, 86_400_123, 61.0)] {
            let mut shelf = ShelfRecord::new(3, 1);
            shelf.start(start);
            shelf.edit_time(target, now);
            let elapsed = elapsed_seconds(shelf.start_time, shelf.manual_offset, now);
            assert!((elapsed - target).abs() < 1e-6, "{elapsed} != {target}");
            assert_eq!(shelf.start_time, Some(start));
        }
    }

    #[test]
    fn edit_with_corrupt_start_does_not_overflow() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.start_time = Some(i64::MIN);
        shelf.edit_time(60.0, i64::MAX);

        assert_eq!(shelf.start_time, Some(i64::MIN));
        assert!(shelf.manual_offset.is_finite());
    }

    #[test]
    fn line_a_scenario() {
        let mut shelf = ShelfRecord::new(1, 1);
        shelf.start(1_000);
        assert_eq!(elapsed_seconds(shelf.start_time, shelf.manual_offset, 4_000), 3.0);

        shelf.edit_time(7_200.0, 4_000);
        assert_eq!(shelf.start_time, Some(1_000));
        assert!((shelf.manual_offset - 7_197.0).abs() < 1e-9);
        let elapsed = elapsed_seconds(shelf.start_time, shelf.manual_offset, 4_000);
        assert!((elapsed - 7_200.0).abs() < 1e-6);
    }
}
