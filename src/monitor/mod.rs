pub mod scheduler;
pub mod sources;
pub mod templates;

pub use scheduler::{AlertCallback, AlertSink, DuePass, MonitorStatistics, Scheduler};
pub use sources::{HitSource, SourceRouter};
pub use templates::create_rule_from_template;
