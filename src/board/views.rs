use serde::{Deserialize, Serialize};

use crate::{
    models::{FacilityState, ShelfRecord},
    timer::{Thresholds, TimerReading},
};

use super::FacilityLayout;

/// Label shown for a shelf with no station assigned.
pub const UNASSIGNED_LABEL: &str = "--";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShelfView {
    pub id: String,
    pub rack_number: u32,
    pub position: u32,
    pub station: String,
    pub reading: TimerReading,
    pub running: bool,
    pub can_start: bool,
    pub can_reset: bool,
}

impl ShelfView {
    fn of(
        shelf: &ShelfRecord,
        rack_number: u32,
        position: u32,
        now_ms: i64,
        thresholds: &Thresholds,
    ) -> Self {
        let station = if shelf.station_id.is_empty() {
            UNASSIGNED_LABEL.to_string()
        } else {
            shelf.station_id.clone()
        };
        Self {
            id: shelf.id.clone(),
            rack_number,
            position,
            station,
            reading: TimerReading::at(shelf.start_time, shelf.manual_offset, now_ms, thresholds),
            running: shelf.is_running(),
            can_start: shelf.can_start(),
            can_reset: shelf.can_reset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RackView {
    pub rack_number: u32,
    pub shelves: Vec<ShelfView>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub name: String,
    pub racks: Vec<RackView>,
}

fn rack_view(rack_number: u32, shelves: &[ShelfRecord], now_ms: i64, thresholds: &Thresholds) -> RackView {
    let shelves = shelves
        .iter()
        .zip(1..)
        .map(|(shelf, position)| ShelfView::of(shelf, rack_number, position, now_ms, thresholds))
        .collect();
    RackView {
        rack_number,
        shelves,
    }
}

/// The editable grid: groups in layout order, racks in group order. Racks the
/// state doesn't know about are left out.
pub fn grid_view(
    state: &FacilityState,
    layout: &FacilityLayout,
    now_ms: i64,
    thresholds: &Thresholds,
) -> Vec<GroupView> {
    layout
        .groups
        .iter()
        .map(|group| GroupView {
            name: group.name.clone(),
            racks: group
                .racks
                .iter()
                .filter_map(|&number| Some(rack_view(number, state.rack(number)?, now_ms, thresholds)))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TvSort {
    #[default]
    Rack,
    Duration,
}

impl TvSort {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rack" => Some(TvSort::Rack),
            "duration" => Some(TvSort::Duration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TvSort::Rack => "rack",
            TvSort::Duration => "duration",
        }
    }
}

/// Per-device display preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewPrefs {
    pub tv_sort: TvSort,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TvView {
    pub active: Vec<ShelfView>,
    pub idle: Vec<ShelfView>,
}

/// The read-only summary: every shelf split into running and idle.
pub fn tv_view(state: &FacilityState, now_ms: i64, thresholds: &Thresholds, sort: TvSort) -> TvView {
    let mut view = TvView::default();
    for (rack_number, shelves) in state.racks_by_number() {
        for shelf in rack_view(rack_number, shelves, now_ms, thresholds).shelves {
            if shelf.running {
                view.active.push(shelf);
            } else {
                view.idle.push(shelf);
            }
        }
    }
    if sort == TvSort::Duration {
        view.active
            .sort_by(|a, b| b.reading.elapsed_secs.total_cmp(&a.reading.elapsed_secs));
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::RackGroup;
    use crate::timer::Tier;

    fn layout() -> FacilityLayout {
        FacilityLayout {
            groups: vec![
                RackGroup::new("Line 10", vec![10, 2]),
                RackGroup::new("Spare", vec![99]),
            ],
            shelves_per_rack: 2,
            station_ids: vec![String::new(), "S1".into()],
        }
    }

    fn running(state: &FacilityState, id: &str, start_ms: i64, offset: f64) -> FacilityState {
        let mut shelf = state.shelf(id).cloned().unwrap();
        shelf.start_time = Some(start_ms);
        shelf.manual_offset = offset;
        state.with_shelf(shelf)
    }

    #[test]
    fn grid_follows_layout_order() {
        let layout = layout();
        let mut state = layout.initial_state();
        state = running(&state, "rack-2-shelf-2", 0, 0.0);
        let mut assigned = state.shelf("rack-10-shelf-1").cloned().unwrap();
        assigned.station_id = "S1".into();
        state = state.with_shelf(assigned);

        let groups = grid_view(&state, &layout, 13 * 3_600_000, &Thresholds::default());
        assert_eq!(groups.len(), 2);
        let racks: Vec<u32> = groups[0].racks.iter().map(|r| r.rack_number).collect();
        assert_eq!(racks, vec![10, 2]);

        let first = &groups[0].racks[0].shelves[0];
        assert_eq!((first.position, first.station.as_str()), (1, "S1"));
        assert!(first.can_start && first.can_reset && !first.running);

        let live = &groups[0].racks[1].shelves[1];
        assert_eq!(live.station, UNASSIGNED_LABEL);
        assert_eq!(live.reading.display, "13:00");
        assert_eq!(live.reading.tier, Tier::Green);
        assert!(live.running && !live.can_start && live.can_reset);
    }

    #[test]
    fn grid_skips_racks_missing_from_state() {
        let layout = layout();
        let mut state = FacilityState::new();
        state.insert_rack(2, vec![ShelfRecord::new(2, 1)]);

        let groups = grid_view(&state, &layout, 0, &Thresholds::default());
        assert_eq!(groups[0].racks.len(), 1);
        assert!(groups[1].racks.is_empty());
    }

    #[test]
    fn tv_orders_racks_numerically() {
        let state = layout().initial_state();
        let state = running(&state, "rack-10-shelf-1", 0, 0.0);
        let state = running(&state, "rack-2-shelf-1", 0, 0.0);

        let view = tv_view(&state, 1_000, &Thresholds::default(), TvSort::Rack);
        let active: Vec<&str> = view.active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(active, vec!["rack-2-shelf-1", "rack-10-shelf-1"]);
        let idle: Vec<&str> = view.idle.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            idle,
            vec!["rack-2-shelf-2", "rack-10-shelf-2", "rack-99-shelf-1", "rack-99-shelf-2"]
        );
    }

    #[test]
    fn tv_duration_sort_is_descending_and_stable() {
        let state = layout().initial_state();
        let state = running(&state, "rack-2-shelf-1", 0, 0.0);
        let state = running(&state, "rack-2-shelf-2", 0, 600.0);
        let state = running(&state, "rack-10-shelf-1", 0, 0.0);

        let view = tv_view(&state, 60_000, &Thresholds::default(), TvSort::Duration);
        let active: Vec<&str> = view.active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(active, vec!["rack-2-shelf-2", "rack-2-shelf-1", "rack-10-shelf-1"]);
    }

    #[test]
    fn prefs_default_and_parse() {
        assert_eq!(ViewPrefs::default().tv_sort, TvSort::Rack);
        let prefs: ViewPrefs = serde_json::from_str(r#"{"tvSort":"duration"}"#).unwrap();
        assert_eq!(prefs.tv_sort, TvSort::Duration);
        let empty: ViewPrefs = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ViewPrefs::default());

        assert_eq!(TvSort::parse(" Duration "), Some(TvSort::Duration));
        assert_eq!(TvSort::parse("size"), None);
    }
}
