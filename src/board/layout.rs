use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::{FacilityState, ShelfRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RackGroup {
    pub name: String,
    pub racks: Vec<u32>,
}

impl RackGroup {
    pub fn new(name: impl Into<String>, racks: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            racks,
        }
    }
}

/// Physical topology of the facility plus the station tokens operators may pick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FacilityLayout {
    pub groups: Vec<RackGroup>,
    pub shelves_per_rack: u32,
    /// Includes `""` for "unassigned".
    pub station_ids: Vec<String>,
}

fn rack_range(first: u32, last: u32) -> Vec<u32> {
    (first..=last).collect()
}

impl Default for FacilityLayout {
    fn default() -> Self {
        Self {
            groups: vec![
                RackGroup::new("Line 2", rack_range(21, 27)),
                RackGroup::new("Line 3", rack_range(31, 37)),
                RackGroup::new("Line 4", rack_range(41, 47)),
                RackGroup::new("Line 5", rack_range(51, 58)),
                RackGroup::new("Line 6", rack_range(61, 66)),
                RackGroup::new("Line 7", rack_range(71, 78)),
                RackGroup::new("Repair", rack_range(91, 93)),
            ],
            shelves_per_rack: 4,
            station_ids: ["", "S1", "S2", "S3", "S4", "S5", "S6", "S7"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl FacilityLayout {
    pub fn validate(&self) -> Result<()> {
        if self.shelves_per_rack == 0 {
            bail!("shelvesPerRack must be at least 1");
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            for rack in &group.racks {
                if !seen.insert(*rack) {
                    bail!("rack {rack} appears more than once in the layout");
                }
            }
        }
        if !self.station_ids.iter().any(String::is_empty) {
            bail!("stationIds must include the empty (unassigned) token");
        }
        Ok(())
    }

    pub fn rack_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.groups.iter().flat_map(|group| group.racks.iter().copied())
    }

    pub fn is_valid_station(&self, station_id: &str) -> bool {
        self.station_ids.iter().any(|id| id == station_id)
    }

    /// Every shelf idle, unassigned and at zero. This is the only source of
    /// factory-reset state.
    pub fn initial_state(&self) -> FacilityState {
        let mut state = FacilityState::new();
        for rack_number in self.rack_numbers() {
            let shelves = (1..=self.shelves_per_rack)
                .map(|position| ShelfRecord::new(rack_number, position))
                .collect();
            state.insert_rack(rack_number, shelves);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_facility() {
        let layout = FacilityLayout::default();
        layout.validate().unwrap();

        let state = layout.initial_state();
        assert_eq!(state.rack_count(), 7 + 7 + 7 + 8 + 6 + 8 + 3);
        assert_eq!(state.rack(58).unwrap().len(), 4);
        assert_eq!(state.rack(93).unwrap()[3].id, "rack-93-shelf-4");
        assert!(state.rack(28).is_none());
        assert_eq!(state.running_count(), 0);
    }

    #[test]
    fn single_line_scenario() {
        let layout = FacilityLayout {
            groups: vec![RackGroup::new("Line A", vec![1])],
            shelves_per_rack: 2,
            station_ids: vec![String::new()],
        };

        let state = layout.initial_state();
        let rack = state.rack(1).unwrap();
        assert_eq!(rack.len(), 2);
        assert_eq!(rack[0], ShelfRecord::new(1, 1));
        assert_eq!(rack[0].id, "rack-1-shelf-1");
        assert_eq!(rack[1].id, "rack-1-shelf-2");
        assert!(rack.iter().all(|s| s.start_time.is_none() && s.manual_offset == 0.0 && s.station_id.is_empty()));

        assert_eq!(layout.initial_state(), state);
    }

    #[test]
    fn rejects_bad_layouts() {
        let mut layout = FacilityLayout::default();
        layout.shelves_per_rack = 0;
        assert!(layout.validate().is_err());

        let mut layout = FacilityLayout::default();
        layout.groups.push(RackGroup::new("Dup", vec![21]));
        assert!(layout.validate().is_err());

        let mut layout = FacilityLayout::default();
        layout.station_ids.retain(|id| !id.is_empty());
        assert!(layout.validate().is_err());
    }
}
