pub mod shelf;

pub use shelf::{parse_shelf_id, shelf_id, FacilityState, ShelfRecord};
