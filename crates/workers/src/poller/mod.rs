mod liveness;
mod source;

pub use liveness::{staleness_secs, LivenessPoller, PollerConfig, TickReport};
pub use source::{InfluxConfig, InfluxMetricSource, LastSeenIndex, MetricSource, SourceError};
