use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PairKey;

/// Safety events that other components react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairEvent {
    Blocked { blocker: Uuid, blocked: Uuid },
    Unblocked { blocker: Uuid, blocked: Uuid },
}

impl PairEvent {
    pub fn pair(&self) -> PairKey {
        match *self {
            PairEvent::Blocked { blocker, blocked } | PairEvent::Unblocked { blocker, blocked } => {
                PairKey::new(blocker, blocked)
            }
        }
    }
}
