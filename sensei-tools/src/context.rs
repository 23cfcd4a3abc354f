//! Identity and turn scope threaded explicitly through every tool call.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(OwnerId);
id_newtype!(ConfirmationId);

impl ConfirmationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Counter state for one conversation turn.
///
/// Created by the turn orchestrator, handed to every tool call of that turn and
/// dropped when the turn ends, so counts never leak into a later turn.
#[derive(Debug)]
pub struct TurnScope {
    id: Uuid,
    owner: OwnerId,
    counters: DashMap<String, u32>,
}

impl TurnScope {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            counters: DashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Increments the counter for `key` if it is still below `limit`.
    ///
    /// Check and increment happen under the key's shard lock, so racing calls
    /// with the same key can never exceed `limit` successful acquisitions.
    /// Returns the new count, or the saturated count when the limit is reached.
    pub fn try_acquire(&self, key: &str, limit: u32) -> std::result::Result<u32, u32> {
        let mut count = self.counters.entry(key.to_string()).or_insert(0);
        if *count >= limit {
            return Err(*count);
        }
        *count += 1;
        Ok(*count)
    }

    pub fn count(&self, key: &str) -> u32 {
        self.counters.get(key).map(|c| *c).unwrap_or(0)
    }
}

/// Per-call context passed alongside tool arguments.
///
/// A detached context (no turn) turns the governor into a passthrough; this is
/// what direct invocations and HTTP-driven calls use.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    owner: Option<OwnerId>,
    turn: Option<Arc<TurnScope>>,
}

impl ToolContext {
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn for_owner(owner: OwnerId) -> Self {
        Self {
            owner: Some(owner),
            turn: None,
        }
    }

    pub fn for_turn(turn: Arc<TurnScope>) -> Self {
        Self {
            owner: Some(turn.owner().clone()),
            turn: Some(turn),
        }
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    pub fn turn(&self) -> Option<&TurnScope> {
        self.turn.as_deref()
    }
}
