//! Tracker configuration supplied by the embedding application.

use serde::{Deserialize, Serialize};

/// Configuration for the flow tracker.
///
/// `shard_count` sizes the state table: more shards mean less lock
/// contention between packet workers at the cost of memory. The default
/// suits scans with thousands of concurrent outstanding probes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConf {
    /// Number of independently locked partitions in the state table.
    /// - Default Value: `4096`
    #[serde(default = "defaults::shard_count")]
    pub shard_count: usize,

    /// Emit per-packet diagnostics when a reply fails sequence/ack
    /// validation. Noisy; intended for debugging a scan, not production.
    /// - Default Value: `false`
    #[serde(default = "defaults::trace_packets")]
    pub trace_packets: bool,
}

impl Default for TrackerConf {
    fn default() -> TrackerConf {
        TrackerConf {
            shard_count: defaults::shard_count(),
            trace_packets: defaults::trace_packets(),
        }
    }
}

mod defaults {
    pub fn shard_count() -> usize {
        4096
    }
    pub fn trace_packets() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let conf = TrackerConf::default();
        assert_eq!(conf.shard_count, 4096);
        assert!(!conf.trace_packets);
    }

    #[test]
    fn test_deserialize_partial() {
        let conf: TrackerConf = serde_json::from_str(r#"{"shard_count": 64}"#).unwrap();
        assert_eq!(conf.shard_count, 64);
        assert!(!conf.trace_packets);

        let conf: TrackerConf = serde_json::from_str("{}").unwrap();
        assert_eq!(conf.shard_count, 4096);
    }
}
