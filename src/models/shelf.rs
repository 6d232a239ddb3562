use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::log_anomaly;

/// One physical shelf's test session as stored at the remote path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShelfRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub station_id: String,
    /// Epoch milliseconds of the last (re)start; `None` while idle.
    #[serde(default, deserialize_with = "falsy_as_none")]
    pub start_time: Option<i64>,
    /// Seconds layered onto the wall-clock elapsed time. May go negative
    /// right after an edit; never displayed that way.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub manual_offset: f64,
}

impl ShelfRecord {
    pub fn new(rack_number: u32, position: u32) -> Self {
        Self {
            id: shelf_id(rack_number, position),
            station_id: String::new(),
            start_time: None,
            manual_offset: 0.0,
        }
    }
}

pub fn shelf_id(rack_number: u32, position: u32) -> String {
    format!("rack-{rack_number}-shelf-{position}")
}

/// Splits `rack-<n>-shelf-<m>` into `(n, m)`.
pub fn parse_shelf_id(id: &str) -> Option<(u32, u32)> {
    let rest = id.strip_prefix("rack-")?;
    let (rack, position) = rest.split_once("-shelf-")?;
    if rack.is_empty() || !rack.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if position.is_empty() || !position.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((rack.parse().ok()?, position.parse().ok()?))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

// Stored records written by older clients carry `0` for a stopped timer.
fn falsy_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|ms| *ms != 0.0 && ms.is_finite()).map(|ms| ms as i64))
}

/// Every rack's shelves keyed by the rack number's string form.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct FacilityState {
    racks: BTreeMap<String, Vec<ShelfRecord>>,
}

// A malformed rack or shelf is dropped on its own so the rest of the board
// still loads. Only a payload that isn't an object fails as a whole.
impl<'de> Deserialize<'de> for FacilityState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut racks = BTreeMap::new();
        for (rack, shelves) in raw {
            let Value::Array(entries) = shelves else {
                log_anomaly!("Skipping rack {rack}: expected a list of shelves");
                continue;
            };
            let mut records = Vec::with_capacity(entries.len());
            for (index, entry) in entries.into_iter().enumerate() {
                match serde_json::from_value::<ShelfRecord>(entry) {
                    Ok(record) => records.push(record),
                    Err(err) => log_anomaly!("Skipping shelf {index} of rack {rack}: {err}"),
                }
            }
            racks.insert(rack, records);
        }
        Ok(Self { racks })
    }
}

impl FacilityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rack(&mut self, rack_number: u32, shelves: Vec<ShelfRecord>) {
        self.racks.insert(rack_number.to_string(), shelves);
    }

    pub fn rack(&self, rack_number: u32) -> Option<&[ShelfRecord]> {
        self.racks.get(&rack_number.to_string()).map(Vec::as_slice)
    }

    pub fn shelf(&self, id: &str) -> Option<&ShelfRecord> {
        let (rack_number, _) = parse_shelf_id(id)?;
        self.rack(rack_number)?.iter().find(|shelf| shelf.id == id)
    }

    /// Returns a copy with the shelf sharing `record.id` replaced. Ids that
    /// don't parse or don't exist leave the state untouched.
    pub fn with_shelf(&self, record: ShelfRecord) -> Self {
        let mut next = self.clone();
        next.replace_shelf(record);
        next
    }

    pub fn replace_shelf(&mut self, record: ShelfRecord) -> bool {
        let Some((rack_number, _)) = parse_shelf_id(&record.id) else {
            return false;
        };
        let Some(shelves) = self.racks.get_mut(&rack_number.to_string()) else {
            return false;
        };
        match shelves.iter_mut().find(|shelf| shelf.id == record.id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    /// Racks ordered by their numeric value rather than string order.
    pub fn racks_by_number(&self) -> Vec<(u32, &[ShelfRecord])> {
        let mut racks: Vec<(u32, &[ShelfRecord])> = self
            .racks
            .iter()
            .filter_map(|(key, shelves)| Some((key.parse().ok()?, shelves.as_slice())))
            .collect();
        racks.sort_by_key(|(number, _)| *number);
        racks
    }

    pub fn shelves(&self) -> impl Iterator<Item = &ShelfRecord> {
        self.racks.values().flatten()
    }

    pub fn running_count(&self) -> usize {
        self.shelves().filter(|shelf| shelf.start_time.is_some()).count()
    }

    pub fn rack_count(&self) -> usize {
        self.racks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.racks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_shelf_ids() {
        assert_eq!(parse_shelf_id("rack-21-shelf-3"), Some((21, 3)));
        assert_eq!(parse_shelf_id("rack--shelf-3"), None);
        assert_eq!(parse_shelf_id("rack-2x-shelf-3"), None);
        assert_eq!(parse_shelf_id("shelf-3"), None);
    }

    #[test]
    fn normalizes_missing_and_null_fields() {
        let value = json!({
            "21": [
                { "id": "rack-21-shelf-1" },
                { "id": "rack-21-shelf-2", "stationId": null, "startTime": null, "manualOffset": null },
                { "id": "rack-21-shelf-3", "stationId": "S2", "startTime": 0, "manualOffset": 60 },
                { "id": "rack-21-shelf-4", "stationId": "S3", "startTime": 1700000000000i64, "manualOffset": -2.5 }
            ]
        });

        let state: FacilityState = serde_json::from_value(value).unwrap();
        let shelves = state.rack(21).unwrap();

        assert_eq!(shelves[0].station_id, "");
        assert_eq!(shelves[0].start_time, None);
        assert_eq!(shelves[0].manual_offset, 0.0);
        assert_eq!(shelves[1], ShelfRecord::new(21, 2));
        assert_eq!(shelves[2].start_time, None);
        assert_eq!(shelves[2].manual_offset, 60.0);
        assert_eq!(shelves[3].start_time, Some(1_700_000_000_000));
        assert_eq!(shelves[3].manual_offset, -2.5);
    }

    #[test]
    fn malformed_entries_are_dropped_individually() {
        let value = json!({
            "1": [
                { "id": "rack-1-shelf-1", "startTime": 5000 },
                { "stationId": "S1" },
                "shelf",
                { "id": "rack-1-shelf-3", "manualOffset": "lots" }
            ],
            "2": null,
            "3": [{ "id": "rack-3-shelf-1", "stationId": "S7" }]
        });

        let state: FacilityState = serde_json::from_value(value).unwrap();
        assert_eq!(state.rack_count(), 2);
        assert!(state.rack(2).is_none());
        assert_eq!(state.rack(1).unwrap().len(), 1);
        assert_eq!(state.shelf("rack-1-shelf-1").unwrap().start_time, Some(5_000));
        assert_eq!(state.shelf("rack-3-shelf-1").unwrap().station_id, "S7");
        assert_eq!(state.running_count(), 1);

        assert!(serde_json::from_value::<FacilityState>(json!([1, 2])).is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let mut state = FacilityState::new();
        state.insert_rack(5, vec![ShelfRecord::new(5, 1)]);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({ "5": [{ "id": "rack-5-shelf-1", "stationId": "", "startTime": null, "manualOffset": 0.0 }] })
        );
    }

    #[test]
    fn replace_shelf_ignores_unknown_ids() {
        let mut state = FacilityState::new();
        state.insert_rack(1, vec![ShelfRecord::new(1, 1)]);

        let mut stray = ShelfRecord::new(2, 1);
        stray.station_id = "S1".into();
        assert!(!state.replace_shelf(stray));

        let mut garbage = ShelfRecord::new(1, 1);
        garbage.id = "shelf-1".into();
        assert!(!state.replace_shelf(garbage));

        let mut edited = ShelfRecord::new(1, 1);
        edited.station_id = "S4".into();
        let next = state.with_shelf(edited);
        assert_eq!(next.shelf("rack-1-shelf-1").unwrap().station_id, "S4");
        assert_eq!(state.shelf("rack-1-shelf-1").unwrap().station_id, "");
    }

    #[test]
    fn racks_sort_numerically() {
        let mut state = FacilityState::new();
        state.insert_rack(91, vec![]);
        state.insert_rack(3, vec![]);
        state.insert_rack(21, vec![]);

        let order: Vec<u32> = state.racks_by_number().into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec![3, 21, 91]);
    }
}
