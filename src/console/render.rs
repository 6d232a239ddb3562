use std::{collections::HashMap, fmt::Write};

use crate::{
    board::{GroupView, ShelfView, TvSort, TvView},
    timer::TimerReading,
};

const BAR_WIDTH: usize = 10;

fn progress_bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn shelf_cell(shelf: &ShelfView, reading: &TimerReading) -> String {
    let marker = if shelf.running { '*' } else { ' ' };
    format!(
        "{}{marker} {:<3} {:>6} {:<6} [{}]",
        shelf.position,
        shelf.station,
        reading.display,
        reading.tier.as_str(),
        progress_bar(reading.progress),
    )
}

/// One line per rack. Running shelves prefer the latest ticked reading.
pub fn render_grid(groups: &[GroupView], live: &HashMap<String, TimerReading>) -> String {
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(out, "== {} ==", group.name);
        if group.racks.is_empty() {
            let _ = writeln!(out, "  (no racks)");
        }
        for rack in &group.racks {
            let cells: Vec<String> = rack
                .shelves
                .iter()
                .map(|shelf| {
                    let reading = live
                        .get(&shelf.id)
                        .filter(|_| shelf.running)
                        .unwrap_or(&shelf.reading);
                    shelf_cell(shelf, reading)
                })
                .collect();
            let _ = writeln!(out, "rack {:>3} | {}", rack.rack_number, cells.join(" | "));
        }
    }
    out
}

fn tv_row(shelf: &ShelfView) -> String {
    format!(
        "  rack {:>3} shelf {}  {:<3} {:>6}  {}",
        shelf.rack_number,
        shelf.position,
        shelf.station,
        shelf.reading.display,
        shelf.reading.tier.as_str()
    )
}

pub fn render_tv(view: &TvView, sort: TvSort) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Active (sort: {})", sort.as_str());
    if view.active.is_empty() {
        let _ = writeln!(out, "  No active shelves.");
    }
    for shelf in &view.active {
        let _ = writeln!(out, "{}", tv_row(shelf));
    }
    let _ = writeln!(out, "Idle");
    for shelf in &view.idle {
        let _ = writeln!(out, "{}", tv_row(shelf));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        board::{grid_view, tv_view, FacilityLayout, RackGroup},
        timer::{Thresholds, Tier},
    };

    fn layout() -> FacilityLayout {
        FacilityLayout {
            groups: vec![RackGroup::new("Line A", vec![1])],
            shelves_per_rack: 2,
            station_ids: vec![String::new(), "S1".into()],
        }
    }

    #[test]
    fn progress_bar_is_clamped() {
        assert_eq!(progress_bar(0.0), "..........");
        assert_eq!(progress_bar(0.5), "#####.....");
        assert_eq!(progress_bar(3.0), "##########");
    }

    #[test]
    fn grid_prefers_live_readings_for_running_shelves() {
        let layout = layout();
        let state = layout.initial_state();
        let mut shelf = state.shelf("rack-1-shelf-1").cloned().unwrap();
        shelf.start_time = Some(0);
        let state = state.with_shelf(shelf);
        let groups = grid_view(&state, &layout, 60_000, &Thresholds::default());

        let mut live = HashMap::new();
        live.insert(
            "rack-1-shelf-1".to_string(),
            TimerReading::at(Some(0), 0.0, 19 * 3_600_000, &Thresholds::default()),
        );
        // Idle shelves never use a cached reading.
        live.insert(
            "rack-1-shelf-2".to_string(),
            TimerReading::at(Some(0), 0.0, 19 * 3_600_000, &Thresholds::default()),
        );

        let text = render_grid(&groups, &live);
        assert!(text.starts_with("== Line A ==\n"));
        assert!(text.contains("1* --   19:00 yellow"));
        assert!(text.contains("2  --   00:00 normal"));
        assert_eq!(groups[0].racks[0].shelves[0].reading.tier, Tier::Normal);
    }

    #[test]
    fn tv_lists_active_then_idle() {
        let state = layout().initial_state();
        let view = tv_view(&state, 0, &Thresholds::default(), TvSort::Duration);
        let text = render_tv(&view, TvSort::Duration);
        assert!(text.starts_with("Active (sort: duration)\n  No active shelves.\nIdle\n"));
        assert!(text.contains("rack   1 shelf 2"));
    }
}
