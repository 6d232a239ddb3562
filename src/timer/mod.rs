pub mod clock;
pub mod compute;
pub mod controller;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compute::{
    elapsed_seconds, format_duration, progress_fraction, severity_tier, Thresholds, Tier,
    TimerReading,
};
pub use controller::{TickEvent, TimerController};
pub use state::ShelfStatus;
