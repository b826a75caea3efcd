//! Per-player authoritative state

use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Stable per-process player identity
pub type PlayerId = u32;

/// Distance travelled per tick
pub const DEFAULT_SPEED: f64 = 3.0;
/// Heading change per tick while turning, in radians
pub const DEFAULT_TURN_RATE: f64 = 0.07;

/// Steering instruction most recently received from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TurnIntent {
    Left = 1,
    Right = 2,
    #[default]
    Straight = 0,
}

impl TurnIntent {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Left,
            2 => Self::Right,
            _ => Self::Straight,
        }
    }
}

/// Lock-free slot holding a player's turn intent.
///
/// The connection reader is the only writer; the tick driver reads it once
/// at the start of every tick.
#[derive(Debug, Clone, Default)]
pub struct IntentCell(Arc<AtomicU8>);

impl IntentCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, intent: TurnIntent) {
        self.0.store(intent as u8, Ordering::Release);
    }

    pub fn load(&self) -> TurnIntent {
        TurnIntent::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Player state in the session (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,

    // Kinematics
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
    pub turn_rate: f64,
    pub alive: bool,

    /// Written by the connection reader
    pub intent: IntentCell,
    /// Intent latched at the start of the current tick
    pub current_intent: TurnIntent,
}

impl PlayerState {
    /// A dormant player: parked at the origin, not alive
    pub fn new(id: PlayerId, intent: IntentCell) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            speed: DEFAULT_SPEED,
            turn_rate: DEFAULT_TURN_RATE,
            alive: false,
            intent,
            current_intent: TurnIntent::Straight,
        }
    }

    /// Place the player at a random spawn point and bring it to life.
    ///
    /// Spawns stay `edge / 20` away from every wall; heading is uniform over
    /// a full turn.
    pub fn respawn<R: Rng + ?Sized>(&mut self, rng: &mut R, edge: f64) {
        let margin = edge / 20.0;
        let span = edge - 2.0 * margin;
        self.x = rng.gen::<f64>() * span + margin;
        self.y = rng.gen::<f64>() * span + margin;
        self.heading = rng.gen_range(0.0..std::f64::consts::TAU);
        self.alive = true;
    }

    /// Copy the shared intent into this tick's working value
    pub fn latch_intent(&mut self) {
        self.current_intent = self.intent.load();
    }
}
