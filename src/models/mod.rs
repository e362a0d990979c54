// Domain models: report schema, tiers, client identity

mod client;
mod snapshot;
mod tier;

pub use client::{Client, LatestStatus};
pub use snapshot::{Counters, Gauges, Snapshot, is_metric_field};
pub use tier::{Tier, TierRow};
