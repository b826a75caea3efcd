//! Game simulation modules

pub mod physics;
pub mod player;
pub mod playfield;
pub mod registry;
pub mod round;
pub mod session;
pub mod snapshot;

pub use player::{IntentCell, PlayerId, TurnIntent};
pub use round::Phase;
pub use session::{GameSession, JoinTicket, SessionHandle, OUTBOX_CAPACITY};
