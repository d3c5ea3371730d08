pub mod aggregator;
pub mod feed;
pub mod job;
pub mod pipeline;

pub use self::aggregator::CalendarZone;
pub use self::feed::{JsonFileFeed, PriceFeed};
pub use self::job::IndicatorJob;
pub use self::pipeline::{IndicatorPipeline, JobReport};
