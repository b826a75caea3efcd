//! The global game session and its authoritative tick loop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::util::time::tick_interval;

use super::player::{IntentCell, PlayerId, PlayerState};
use super::playfield::ArenaView;
use super::registry::{Connection, ConnectionRegistry};
use super::round::RoundState;
use super::snapshot::{self, SnapshotStats};

/// Queued snapshots per connection before frames are dropped for it
pub const OUTBOX_CAPACITY: usize = 32;

/// Commands applied per tick; the rest wait for the next tick
pub const MAX_COMMANDS_PER_TICK: usize = 64;

/// Requests routed into the tick driver
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        addr: SocketAddr,
        id: PlayerId,
        intent: IntentCell,
        outbox: mpsc::Sender<String>,
    },
    Leave {
        addr: SocketAddr,
        id: PlayerId,
    },
}

/// What a connection keeps after joining
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub id: PlayerId,
    /// Write side of the player's turn intent
    pub intent: IntentCell,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("game session is not running")]
    Closed,

    #[error("arena render failed: {0}")]
    Render(#[from] tokio::task::JoinError),
}

/// Handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    next_id: Arc<AtomicU32>,
    player_count: Arc<AtomicUsize>,
    ticks: Arc<AtomicU64>,
    arena: ArenaView,
}

impl SessionHandle {
    /// Register a connection. The id is unique for the life of the process.
    pub async fn join(
        &self,
        addr: SocketAddr,
        outbox: mpsc::Sender<String>,
    ) -> Result<JoinTicket, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let intent = IntentCell::new();
        self.command_tx
            .send(SessionCommand::Join {
                addr,
                id,
                intent: intent.clone(),
                outbox,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(JoinTicket { id, intent })
    }

    pub async fn leave(&self, addr: SocketAddr, id: PlayerId) -> Result<(), SessionError> {
        self.command_tx
            .send(SessionCommand::Leave { addr, id })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Current trail grid as a PGM image, rendered on the blocking pool
    pub async fn render_arena(&self) -> Result<Vec<u8>, SessionError> {
        let arena = self.arena.clone();
        Ok(tokio::task::spawn_blocking(move || arena.render_pgm()).await?)
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// The authoritative game session
pub struct GameSession {
    round: RoundState,
    registry: ConnectionRegistry,
    command_rx: mpsc::Receiver<SessionCommand>,
    tick_interval: Duration,
    stats: SnapshotStats,
    player_count: Arc<AtomicUsize>,
    ticks: Arc<AtomicU64>,
}

impl GameSession {
    /// Create the session
    pub fn new(config: &Config) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::new(AtomicU64::new(0));

        let round = RoundState::new(config);

        let handle = SessionHandle {
            command_tx,
            next_id: Arc::new(AtomicU32::new(1)),
            player_count: player_count.clone(),
            ticks: ticks.clone(),
            arena: round.playfield().view(),
        };

        let session = Self {
            round,
            registry: ConnectionRegistry::new(),
            command_rx,
            tick_interval: tick_interval(config.tick_rate),
            stats: SnapshotStats::default(),
            player_count,
            ticks,
        };

        (session, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "Game loop started");

        let mut tick_interval = interval(self.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if !self.process_commands() {
                info!("Session handles dropped, stopping game loop");
                break;
            }

            self.tick();
        }
    }

    /// Apply up to [`MAX_COMMANDS_PER_TICK`] queued joins and leaves.
    /// Returns false once the command channel is closed and drained.
    fn process_commands(&mut self) -> bool {
        for _ in 0..MAX_COMMANDS_PER_TICK {
            match self.command_rx.try_recv() {
                Ok(SessionCommand::Join {
                    addr,
                    id,
                    intent,
                    outbox,
                }) => self.handle_join(addr, id, intent, outbox),
                Ok(SessionCommand::Leave { addr, id }) => self.handle_leave(addr, id, "disconnected"),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
        true
    }

    fn handle_join(
        &mut self,
        addr: SocketAddr,
        id: PlayerId,
        intent: IntentCell,
        outbox: mpsc::Sender<String>,
    ) {
        let mut player = PlayerState::new(id, intent);
        self.round.prepare_joiner(&mut player);
        let connection = Connection {
            addr,
            player_id: id,
            outbox,
        };
        let player = self.registry.join(connection, player);

        info!(
            addr = %addr,
            player_id = id,
            alive = player.alive,
            phase = ?self.round.phase(),
            "Player joined"
        );
        self.publish_player_count();
    }

    fn handle_leave(&mut self, addr: SocketAddr, id: PlayerId, reason: &str) {
        if self.registry.leave(addr, id).is_some() {
            info!(addr = %addr, player_id = id, reason, "Player left");
            self.publish_player_count();
        }
    }

    fn publish_player_count(&self) {
        self.player_count.store(self.registry.len(), Ordering::Relaxed);
    }

    /// One tick: advance the round, then broadcast the snapshot
    pub fn tick(&mut self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(change) = self.round.tick(&mut self.registry) {
            info!(from = ?change.from, to = ?change.to, "Phase changed");
        }

        let msg = snapshot::build(self.round.phase(), &self.registry);
        let text = match snapshot::encode(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode snapshot, skipping broadcast");
                return;
            }
        };
        self.stats.record(text.len());

        let report = self.registry.broadcast(&text);
        if report.dropped > 0 {
            debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Snapshot not delivered to every client"
            );
        }
        for (addr, id) in report.closed {
            self.handle_leave(addr, id, "send failed");
        }

        if tick % 300 == 0 && !self.registry.is_empty() {
            debug!(
                tick,
                round = self.round.round(),
                phase = ?self.round.phase(),
                deadline_us = self.round.deadline_us(),
                players = self.registry.len(),
                alive = self.registry.alive_count(),
                trail_cells = self.round.playfield().occupied_count(),
                avg_snapshot_bytes = self.stats.avg_bytes(),
                "Session heartbeat"
            );
        }
    }
}
