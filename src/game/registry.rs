//! Connection registry: transport address -> live connection and player

use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::player::{PlayerId, PlayerState};

/// Outbound half of a live connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub addr: SocketAddr,
    pub player_id: PlayerId,
    /// Bounded queue drained by the connection's writer task
    pub outbox: mpsc::Sender<String>,
}

/// A connected client and the player it steers
#[derive(Debug)]
pub struct Seat {
    pub connection: Connection,
    pub player: PlayerState,
}

/// Result of one fan-out
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Outbox full; this client skips the frame
    pub dropped: usize,
    /// Writer gone; these connections must leave
    pub closed: Vec<(SocketAddr, PlayerId)>,
}

/// Registry of all connected players, owned by the tick driver
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    seats: HashMap<SocketAddr, Seat>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection and its player. A stale seat under the same
    /// address is replaced.
    pub fn join(&mut self, connection: Connection, player: PlayerState) -> &PlayerState {
        let addr = connection.addr;
        if let Some(old) = self.seats.remove(&addr) {
            warn!(addr = %addr, player_id = old.player.id, "Replacing stale seat");
        }
        &self
            .seats
            .entry(addr)
            .or_insert(Seat { connection, player })
            .player
    }

    /// Remove a connection. `id` guards against removing a newer connection
    /// that reuses the same address.
    pub fn leave(&mut self, addr: SocketAddr, id: PlayerId) -> Option<PlayerState> {
        match self.seats.get(&addr) {
            Some(seat) if seat.player.id == id => self.seats.remove(&addr).map(|s| s.player),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.seats.values().map(|s| &s.player)
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut PlayerState> {
        self.seats.values_mut().map(|s| &mut s.player)
    }

    pub fn alive_count(&self) -> usize {
        self.players().filter(|p| p.alive).count()
    }

    /// Live connections to receive this tick's snapshot
    pub fn broadcast_targets(&self) -> impl Iterator<Item = &Connection> {
        self.seats.values().map(|s| &s.connection)
    }

    /// Queue `text` on every outbox without waiting on any of them
    pub fn broadcast(&self, text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for connection in self.broadcast_targets() {
            match connection.outbox.try_send(text.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(addr = %connection.addr, "Client lagging, dropping snapshot");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(addr = %connection.addr, "Outbox closed");
                    report.closed.push((connection.addr, connection.player_id));
                }
            }
        }
        report
    }
}
