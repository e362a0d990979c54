// Rollup tiers (fine -> medium -> coarse) and the rows stored in them.

use serde::{Deserialize, Serialize};

use super::{Counters, Gauges};

/// Resolution level of historical rollup. Each coarser tier is derived only from the next
/// finer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 10 s windows, 360 rows (1 hour).
    Seconds,
    /// 60 s windows, 1440 rows (24 hours).
    Minutes,
    /// 3600 s windows, 8760 rows (365 days).
    Hours,
}

impl Tier {
    /// Finest to coarsest.
    pub const ALL: [Tier; 3] = [Tier::Seconds, Tier::Minutes, Tier::Hours];
    pub const FINEST: Tier = Tier::Seconds;

    pub const fn window_secs(self) -> i64 {
        match self {
            Tier::Seconds => 10,
            Tier::Minutes => 60,
            Tier::Hours => 3600,
        }
    }

    /// Max rows retained per client.
    pub const fn cap(self) -> u64 {
        match self {
            Tier::Seconds => 360,
            Tier::Minutes => 1440,
            Tier::Hours => 8760,
        }
    }

    /// Seconds of history a full tier covers.
    pub const fn retention_secs(self) -> i64 {
        self.window_secs() * self.cap() as i64
    }

    pub const fn table(self) -> &'static str {
        match self {
            Tier::Seconds => "status_seconds",
            Tier::Minutes => "status_minutes",
            Tier::Hours => "status_hours",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Tier::Seconds => "seconds",
            Tier::Minutes => "minutes",
            Tier::Hours => "hours",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Tier::Seconds => 0,
            Tier::Minutes => 1,
            Tier::Hours => 2,
        }
    }

    /// Source tier for aggregation; None for the finest tier (fed by deltas).
    pub const fn finer(self) -> Option<Tier> {
        match self {
            Tier::Seconds => None,
            Tier::Minutes => Some(Tier::Seconds),
            Tier::Hours => Some(Tier::Minutes),
        }
    }

    /// `timestamp` is an exact multiple of this tier's window.
    pub fn is_boundary(self, timestamp: i64) -> bool {
        timestamp.rem_euclid(self.window_secs()) == 0
    }

    pub fn from_name(s: &str) -> Option<Tier> {
        match s {
            "seconds" => Some(Tier::Seconds),
            "minutes" => Some(Tier::Minutes),
            "hours" => Some(Tier::Hours),
            _ => None,
        }
    }
}

/// One aggregated row. Counters are window sums; gauges are window averages.
/// Keyed by (client_id, timestamp) within its tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TierRow {
    pub client_id: i64,
    pub timestamp: i64,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub counters: Counters,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub gauges: Gauges,
    /// Set when a counter went backwards in (one of) the interval(s) this row covers.
    pub counter_reset: bool,
}
