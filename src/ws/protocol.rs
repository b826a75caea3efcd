//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{Phase, PlayerId, TurnIntent};

/// Message sent from client to server: the player's steering intent.
///
/// `{"d": "l"}` turns left, `{"d": "r"}` turns right, anything else in `d`
/// (or no `d` at all) goes straight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMsg {
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<serde_json::Value>,
}

impl ClientMsg {
    pub fn turn_intent(&self) -> TurnIntent {
        match self.direction.as_ref().and_then(|d| d.as_str()) {
            Some("l") => TurnIntent::Left,
            Some("r") => TurnIntent::Right,
            _ => TurnIntent::Straight,
        }
    }
}

/// Decode a text frame into a turn intent. Only JSON objects are accepted.
pub fn parse_turn_intent(text: &str) -> Result<TurnIntent, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a JSON object"));
    }
    serde_json::from_value::<ClientMsg>(value).map(|msg| msg.turn_intent())
}

/// Phase name as clients see it. Waiting and Starting are both "starting".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    Starting,
    Running,
    Finished,
}

impl From<Phase> for PhaseTag {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Waiting | Phase::Starting => Self::Starting,
            Phase::Running => Self::Running,
            Phase::Finished => Self::Finished,
        }
    }
}

/// Per-tick snapshot broadcast identically to every connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMsg {
    #[serde(rename = "s")]
    pub phase: PhaseTag,
    #[serde(rename = "p")]
    pub players: Vec<PlayerSnapshot>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "i")]
    pub id: PlayerId,
}
