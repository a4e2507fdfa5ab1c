pub mod batch;
pub mod maintenance;
pub mod observation;
pub mod segment;
pub mod status;
pub mod timeline_card;
pub mod usage;

pub use batch::Batch;
pub use maintenance::{ClearedRows, TableCounts};
pub use observation::Observation;
pub use segment::Segment;
pub use status::ProcessingStatus;
pub use timeline_card::TimelineCard;
pub use usage::{RequestType, UsageRecord, UsageSummary};
