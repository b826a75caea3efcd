//! Player movement and trail collision

use super::player::{PlayerState, TurnIntent};
use super::playfield::Playfield;

/// What happened to a player during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Already dead, nothing moved
    Idle,
    /// Moved and laid a trail dot
    Moved,
    /// Left the arena
    HitWall,
    /// Landed on an occupied cell
    HitTrail,
}

/// Physics system for advancing players one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance a player by one tick using its latched intent.
    ///
    /// Order matters: move, turn, bounds check, occupancy check, then draw.
    /// The dot is drawn only after the query, so a player cannot collide
    /// with the dot it lays this tick. A dead player's position is frozen.
    pub fn advance(player: &mut PlayerState, field: &mut Playfield) -> StepOutcome {
        if !player.alive {
            return StepOutcome::Idle;
        }

        player.x += player.speed * player.heading.cos();
        player.y += player.speed * player.heading.sin();

        match player.current_intent {
            TurnIntent::Left => player.heading -= player.turn_rate,
            TurnIntent::Right => player.heading += player.turn_rate,
            TurnIntent::Straight => {}
        }

        if !field.contains(player.x, player.y) {
            player.alive = false;
            return StepOutcome::HitWall;
        }

        if field.is_occupied(player.x, player.y) {
            player.alive = false;
            return StepOutcome::HitTrail;
        }

        field.draw_dot(player.x, player.y);
        StepOutcome::Moved
    }
}
