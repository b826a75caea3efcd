//! Round lifecycle: waiting, countdown, running, finished

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::Config;
use crate::util::time::tick_micros;

use super::physics::{PhysicsSystem, StepOutcome};
use super::player::PlayerState;
use super::playfield::Playfield;
use super::registry::ConnectionRegistry;

/// Countdown applied while the lobby fills (3 s), in microseconds
pub const GRACE_MICROS: i64 = 3_000_000;
/// Pause between a finished round and the next lobby (5 s), in microseconds
pub const FINISH_MICROS: i64 = 5_000_000;

/// Global session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// At most one player connected
    Waiting,
    /// Enough players, counting down to the start
    Starting,
    /// Round in progress
    Running,
    /// Round over, showing the result
    Finished,
}

/// A phase change produced by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
}

/// Round state (owned by the tick driver)
pub struct RoundState {
    phase: Phase,
    /// Microseconds left before the next timed transition
    deadline_us: i64,
    tick_us: i64,
    round: u64,
    playfield: Playfield,
    rng: ChaCha8Rng,
}

impl RoundState {
    pub fn new(config: &Config) -> Self {
        let rng = match config.session_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            phase: Phase::Waiting,
            deadline_us: GRACE_MICROS,
            tick_us: tick_micros(config.tick_rate),
            round: 0,
            playfield: Playfield::new(config.arena_edge, config.trail_radius),
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline_us(&self) -> i64 {
        self.deadline_us
    }

    /// Rounds started so far
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn playfield(&self) -> &Playfield {
        &self.playfield
    }

    #[cfg(test)]
    pub(crate) fn playfield_mut(&mut self) -> &mut Playfield {
        &mut self.playfield
    }

    /// Prepare a freshly connected player for the current phase.
    ///
    /// During the countdown or the result screen the player spawns right
    /// away; otherwise it stays dormant until the next round begins.
    pub fn prepare_joiner(&mut self, player: &mut PlayerState) {
        match self.phase {
            Phase::Starting | Phase::Finished => {
                player.respawn(&mut self.rng, self.playfield.edge());
            }
            Phase::Waiting | Phase::Running => {}
        }
    }

    /// Run one tick of the state machine over every registered player
    pub fn tick(&mut self, registry: &mut ConnectionRegistry) -> Option<PhaseChange> {
        // Intents are fixed for the whole tick before anyone moves
        for player in registry.players_mut() {
            player.latch_intent();
        }

        let from = self.phase;
        match self.phase {
            Phase::Waiting => self.waiting_tick(registry),
            Phase::Starting => self.starting_tick(registry),
            Phase::Running => self.running_tick(registry),
            Phase::Finished => self.finished_tick(),
        }

        (self.phase != from).then_some(PhaseChange {
            from,
            to: self.phase,
        })
    }

    fn waiting_tick(&mut self, registry: &mut ConnectionRegistry) {
        if registry.len() <= 1 {
            self.deadline_us = GRACE_MICROS;
            return;
        }

        self.phase = Phase::Starting;
        self.respawn_all(registry);
        info!(players = registry.len(), "Countdown started");
        self.count_down_to_start(registry);
    }

    fn starting_tick(&mut self, registry: &mut ConnectionRegistry) {
        if registry.len() <= 1 {
            self.phase = Phase::Waiting;
            self.deadline_us = GRACE_MICROS;
            info!("Countdown cancelled, not enough players");
            return;
        }
        self.count_down_to_start(registry);
    }

    fn count_down_to_start(&mut self, registry: &mut ConnectionRegistry) {
        self.deadline_us -= self.tick_us;
        if self.deadline_us < 0 {
            self.start_round(registry);
        }
    }

    fn start_round(&mut self, registry: &mut ConnectionRegistry) {
        self.playfield.clear();
        self.respawn_all(registry);
        self.round += 1;
        self.phase = Phase::Running;
        info!(round = self.round, players = registry.len(), "Round started");
    }

    fn running_tick(&mut self, registry: &mut ConnectionRegistry) {
        for player in registry.players_mut() {
            match PhysicsSystem::advance(player, &mut self.playfield) {
                StepOutcome::HitWall => debug!(player_id = player.id, "Player hit the wall"),
                StepOutcome::HitTrail => debug!(player_id = player.id, "Player hit a trail"),
                StepOutcome::Moved | StepOutcome::Idle => {}
            }
        }

        // Counted only after every player has moved this tick
        if registry.alive_count() > 1 {
            return;
        }

        let winner = registry.players().find(|p| p.alive).map(|p| p.id);
        info!(round = self.round, winner = ?winner, "Round finished");

        self.phase = Phase::Finished;
        self.deadline_us = FINISH_MICROS;
        // Stage the next round's spawns now; they are not moved until it starts
        self.respawn_all(registry);
    }

    fn finished_tick(&mut self) {
        self.deadline_us -= self.tick_us;
        if self.deadline_us < 0 {
            self.phase = Phase::Waiting;
            self.deadline_us = GRACE_MICROS;
        }
    }

    fn respawn_all(&mut self, registry: &mut ConnectionRegistry) {
        let edge = self.playfield.edge();
        for player in registry.players_mut() {
            player.respawn(&mut self.rng, edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::{IntentCell, PlayerId, TurnIntent};
    use crate::game::registry::Connection;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn test_config() -> Config {
        Config {
            session_seed: Some(7),
            ..Config::default()
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn join(round: &mut RoundState, registry: &mut ConnectionRegistry, id: PlayerId) -> IntentCell {
        let (tx, _rx) = mpsc::channel(1);
        let intent = IntentCell::new();
        let mut player = PlayerState::new(id, intent.clone());
        round.prepare_joiner(&mut player);
        registry.join(
            Connection {
                addr: addr(5000 + id as u16),
                player_id: id,
                outbox: tx,
            },
            player,
        );
        intent
    }

    fn player(registry: &ConnectionRegistry, id: PlayerId) -> &PlayerState {
        registry.players().find(|p| p.id == id).unwrap()
    }

    fn player_mut(registry: &mut ConnectionRegistry, id: PlayerId) -> &mut PlayerState {
        registry.players_mut().find(|p| p.id == id).unwrap()
    }

    /// Tick until the phase is Running, returning the number of ticks taken
    fn tick_until_running(round: &mut RoundState, registry: &mut ConnectionRegistry) -> usize {
        for n in 1..=500 {
            round.tick(registry);
            if round.phase() == Phase::Running {
                return n;
            }
        }
        panic!("round never started");
    }

    #[test]
    fn test_single_player_never_starts() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);

        for _ in 0..1000 {
            assert!(round.tick(&mut registry).is_none());
            assert_eq!(round.phase(), Phase::Waiting);
            assert_eq!(round.deadline_us(), GRACE_MICROS);
        }
    }

    #[test]
    fn test_two_players_start_after_grace() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);

        let ticks = tick_until_running(&mut round, &mut registry);
        // 3 s at 33_333 us per tick drops below zero on tick 91
        assert_eq!(ticks, 91);
        assert_eq!(round.round(), 1);

        for p in registry.players() {
            assert!(p.alive);
            assert!((50.0..=950.0).contains(&p.x));
            assert!((50.0..=950.0).contains(&p.y));
        }
    }

    #[test]
    fn test_countdown_cancelled_when_player_leaves() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);

        let change = round.tick(&mut registry);
        assert_eq!(
            change,
            Some(PhaseChange {
                from: Phase::Waiting,
                to: Phase::Starting
            })
        );
        assert_eq!(round.deadline_us(), GRACE_MICROS - 33_333);
        // Spawn points are visible during the countdown
        assert!(registry.players().all(|p| p.alive));

        registry.leave(addr(5002), 2);
        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Waiting);
        assert_eq!(round.deadline_us(), GRACE_MICROS);
    }

    #[test]
    fn test_round_start_clears_playfield() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        round.playfield.mark_cell(10, 10);

        tick_until_running(&mut round, &mut registry);
        assert_eq!(round.playfield().occupied_count(), 0);
    }

    #[test]
    fn test_last_survivor_finishes_round() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        for id in 1..=3 {
            join(&mut round, &mut registry, id);
        }
        tick_until_running(&mut round, &mut registry);

        for id in [1, 2] {
            let p = player_mut(&mut registry, id);
            p.alive = false;
        }
        let p3 = player_mut(&mut registry, 3);
        p3.x = 500.0;
        p3.y = 500.0;
        p3.heading = 0.0;

        let change = round.tick(&mut registry);
        assert_eq!(
            change,
            Some(PhaseChange {
                from: Phase::Running,
                to: Phase::Finished
            })
        );
        assert_eq!(round.deadline_us(), FINISH_MICROS);
        // Next round is pre-staged
        assert!(registry.players().all(|p| p.alive));
    }

    #[test]
    fn test_simultaneous_death_ends_round_with_no_survivor() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        for (id, y) in [(1, 100.0), (2, 200.0)] {
            let p = player_mut(&mut registry, id);
            p.x = 999.0;
            p.y = y;
            p.heading = 0.0;
        }

        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Finished);
    }

    #[test]
    fn test_dead_player_is_frozen_while_round_runs() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        for id in 1..=3 {
            join(&mut round, &mut registry, id);
        }
        tick_until_running(&mut round, &mut registry);

        for (id, y) in [(1, 300.0), (2, 500.0), (3, 700.0)] {
            let p = player_mut(&mut registry, id);
            p.x = 100.0;
            p.y = y;
            p.heading = 0.0;
        }
        player_mut(&mut registry, 1).alive = false;
        let frozen = (player(&registry, 1).x, player(&registry, 1).y);

        for _ in 0..50 {
            round.tick(&mut registry);
            assert_eq!(round.phase(), Phase::Running);
            assert_eq!((player(&registry, 1).x, player(&registry, 1).y), frozen);
        }
        assert!((player(&registry, 2).x - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_turn_intent_applies_on_next_tick() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        let intent = join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        for (id, y) in [(1, 300.0), (2, 700.0)] {
            let p = player_mut(&mut registry, id);
            p.x = 100.0;
            p.y = y;
            p.heading = 0.0;
        }

        intent.store(TurnIntent::Right);
        round.tick(&mut registry);
        assert!((player(&registry, 1).heading - 0.07).abs() < 1e-12);
        assert!(player(&registry, 2).heading.abs() < 1e-12);
    }

    #[test]
    fn test_finished_returns_to_waiting() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        player_mut(&mut registry, 1).alive = false;
        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Finished);

        let mut ticks = 0;
        while round.phase() == Phase::Finished {
            round.tick(&mut registry);
            ticks += 1;
        }
        // 5 s at 33_333 us per tick drops below zero on tick 151
        assert_eq!(ticks, 151);
        assert_eq!(round.phase(), Phase::Waiting);
        assert_eq!(round.deadline_us(), GRACE_MICROS);
    }

    #[test]
    fn test_phase_sequence_is_cyclic() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);

        let mut changes = Vec::new();
        for _ in 0..3000 {
            if let Some(change) = round.tick(&mut registry) {
                if change.to == Phase::Running {
                    assert!(registry.len() >= 2);
                }
                changes.push(change);
            }
        }

        assert!(round.round() >= 2);
        for change in changes {
            let allowed = matches!(
                (change.from, change.to),
                (Phase::Waiting, Phase::Starting)
                    | (Phase::Starting, Phase::Waiting)
                    | (Phase::Starting, Phase::Running)
                    | (Phase::Running, Phase::Finished)
                    | (Phase::Finished, Phase::Waiting)
            );
            assert!(allowed, "unexpected transition {:?}", change);
        }
    }

    #[test]
    fn test_join_during_running_is_dormant() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        join(&mut round, &mut registry, 3);
        let late = player(&registry, 3);
        assert!(!late.alive);
        assert_eq!((late.x, late.y), (0.0, 0.0));
    }

    #[test]
    fn test_join_during_countdown_spawns_immediately() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Starting);

        join(&mut round, &mut registry, 3);
        let late = player(&registry, 3);
        assert!(late.alive);
        assert!((50.0..=950.0).contains(&late.x));
    }

    #[test]
    fn test_join_during_finished_spawns_immediately() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        player_mut(&mut registry, 1).alive = false;
        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Finished);

        join(&mut round, &mut registry, 3);
        let late = player(&registry, 3);
        assert!(late.alive);
        assert!((50.0..=950.0).contains(&late.x));
        assert!((50.0..=950.0).contains(&late.y));
        assert!((0.0..std::f64::consts::TAU).contains(&late.heading));
    }

    #[test]
    fn test_leaving_mid_round_finishes_on_next_tick() {
        let mut round = RoundState::new(&test_config());
        let mut registry = ConnectionRegistry::new();
        join(&mut round, &mut registry, 1);
        join(&mut round, &mut registry, 2);
        tick_until_running(&mut round, &mut registry);

        for (id, y) in [(1, 300.0), (2, 700.0)] {
            let p = player_mut(&mut registry, id);
            p.x = 100.0;
            p.y = y;
            p.heading = 0.0;
        }
        round.tick(&mut registry);
        assert_eq!(round.phase(), Phase::Running);
        let trail_cells = round.playfield().occupied_count();
        assert!(trail_cells > 0);

        assert!(registry.leave(addr(5002), 2).is_some());
        let change = round.tick(&mut registry);
        assert_eq!(
            change,
            Some(PhaseChange {
                from: Phase::Running,
                to: Phase::Finished
            })
        );
        assert_eq!(round.deadline_us(), FINISH_MICROS);
        assert!(registry.players().all(|p| p.id != 2));
        // The leaver's trail stays until the next round clears the field
        assert!(round.playfield().occupied_count() >= trail_cells);
    }
}
