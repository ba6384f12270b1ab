pub mod borrower_cache;
pub mod monitor;
pub mod schedule;

pub use borrower_cache::{BorrowerCache, BorrowerSnapshot};
pub use monitor::{CycleReport, ShortfallMonitor};
pub use schedule::{IntervalSchedule, ManualSchedule, ManualTrigger, Schedule};
