//! Ledger configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an [`AccountingBook`](crate::AccountingBook).
///
/// An empty store path opens an in-memory store instead of LMDB.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub trusted_nodes_db_path: String,
    pub trxs_to_vertices_db_path: String,
    pub vertices_db_path: String,

    /// Where truncation writes archive backups. `None` disables backups.
    pub backup_dir: Option<PathBuf>,

    /// Admission tolerance window right after genesis or a DAG load.
    pub initial_throughput: u64,

    /// Weight at which the first truncation may run; later ones run every
    /// `truncate_at_weight` past the previous.
    pub truncate_at_weight: u64,

    /// How many vertices behind the frontier the checkpoint vertex sits.
    pub truncate_depth: u64,

    pub truncate_signal_capacity: usize,

    pub replier_capacity: usize,
    pub replier_max_repeats: u32,
    pub replier_tick_ms: u64,
    pub replier_longevity_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            trusted_nodes_db_path: String::new(),
            trxs_to_vertices_db_path: String::new(),
            vertices_db_path: String::new(),
            backup_dir: None,
            initial_throughput: 50,
            truncate_at_weight: 100_000,
            truncate_depth: 1_000,
            truncate_signal_capacity: 50,
            replier_capacity: 200,
            replier_max_repeats: 5,
            replier_tick_ms: 2_000,
            replier_longevity_secs: 60,
        }
    }
}

impl LedgerConfig {
    /// Fix up values the ledger cannot run with.
    ///
    /// A truncation mark closer than two depths to genesis would archive a
    /// graph that is mostly frontier, so it falls back to the default mark.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.truncate_depth == 0 {
            tracing::warn!("truncate_depth of 0 is invalid, using {}", defaults.truncate_depth);
            self.truncate_depth = defaults.truncate_depth;
        }
        if self.truncate_at_weight < self.truncate_depth.saturating_mul(2) {
            tracing::warn!(
                truncate_at_weight = self.truncate_at_weight,
                truncate_depth = self.truncate_depth,
                "truncation mark below twice the depth, using {}",
                defaults.truncate_at_weight
            );
            self.truncate_at_weight = defaults.truncate_at_weight.max(self.truncate_depth.saturating_mul(2));
        }
        if self.truncate_signal_capacity == 0 {
            self.truncate_signal_capacity = defaults.truncate_signal_capacity;
        }
        if self.replier_capacity == 0 {
            self.replier_capacity = defaults.replier_capacity;
        }
        if self.replier_tick_ms == 0 {
            self.replier_tick_ms = defaults.replier_tick_ms;
        }
        self
    }

    pub fn replier_tick(&self) -> Duration {
        Duration::from_millis(self.replier_tick_ms)
    }

    pub fn replier_longevity(&self) -> Duration {
        Duration::from_secs(self.replier_longevity_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.initial_throughput, 50);
        assert_eq!(cfg.truncate_at_weight, 100_000);
        assert_eq!(cfg.truncate_depth, 1_000);
        assert_eq!(cfg.replier_tick(), Duration::from_secs(2));
        assert_eq!(cfg.replier_longevity(), Duration::from_secs(60));
    }

    #[test]
    fn low_truncation_mark_falls_back() {
        let cfg = LedgerConfig {
            truncate_at_weight: 1_500,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.truncate_at_weight, 100_000);
    }

    #[test]
    fn small_depth_keeps_custom_mark() {
        let cfg = LedgerConfig {
            truncate_depth: 10,
            truncate_at_weight: 20,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.truncate_at_weight, 20);
    }
}
