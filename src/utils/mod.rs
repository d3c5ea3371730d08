pub mod clock;
pub mod utils;

pub use self::clock::{Clock, ManualClock, SharedClock, SystemClock};
