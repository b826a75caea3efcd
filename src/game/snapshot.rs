//! Snapshot building and encoding

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::registry::ConnectionRegistry;
use super::round::Phase;

/// Build a snapshot message covering every registered player, dead or alive
pub fn build(phase: Phase, registry: &ConnectionRegistry) -> ServerMsg {
    let players = registry
        .players()
        .map(|p| PlayerSnapshot {
            x: p.x,
            y: p.y,
            id: p.id,
        })
        .collect();

    ServerMsg {
        phase: phase.into(),
        players,
    }
}

/// Serialize a snapshot for a text frame
pub fn encode(msg: &ServerMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
}

impl SnapshotStats {
    pub fn record(&mut self, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;
    }

    pub fn avg_bytes(&self) -> u64 {
        self.total_bytes.checked_div(self.total_snapshots).unwrap_or(0)
    }
}
