pub mod controller;
pub mod edit;
pub mod layout;
pub mod views;

pub use controller::BoardController;
pub use edit::TimeEntry;
pub use layout::{FacilityLayout, RackGroup};
pub use views::{grid_view, tv_view, GroupView, RackView, ShelfView, TvSort, TvView, ViewPrefs};
