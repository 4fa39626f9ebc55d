//! Visible download state per control group.
//!
//! ```text
//! idle --begin--> preparing --finish(ok)---> success --3000ms--> idle
//!                           --finish(err)--> error   --5000ms--> idle
//! ```
//!
//! Controls are only disabled in `preparing`. Activating a control in
//! `success` or `error` starts a new attempt and supersedes the pending
//! revert timer.
//!
//! State is stored once per logical action, never per control, so every
//! control in a group reports the same state at all times. Controls are
//! disabled while their group is `preparing`.
//!
//! Revert timers carry the generation of the attempt that armed them and
//! only fire if that attempt is still the latest one for the group.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::actions::ActionTable;
use super::constants::{ERROR_REVERT_DELAY, SUCCESS_REVERT_DELAY};

/// Capacity of the state-change broadcast channel.
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Visible state of a control group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    Idle,
    Preparing,
    Success,
    Error,
}

impl DownloadState {
    /// Whether controls in this state ignore activation.
    #[must_use]
    pub fn is_disabled(self) -> bool {
        matches!(self, Self::Preparing)
    }

    /// Whether the current attempt has reached its terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Control label for this state.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Download",
            Self::Preparing => "Preparing download...",
            Self::Success => "Download started",
            Self::Error => "Download failed, try again",
        }
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// A group transition, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub action: String,
    pub from: DownloadState,
    pub to: DownloadState,
}

#[derive(Debug, Clone, Copy)]
struct GroupSlot {
    state: DownloadState,
    generation: u64,
}

/// Revert delays for terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertDelays {
    pub success: Duration,
    pub error: Duration,
}

impl Default for RevertDelays {
    fn default() -> Self {
        Self {
            success: SUCCESS_REVERT_DELAY,
            error: ERROR_REVERT_DELAY,
        }
    }
}

/// Shared state of every control group.
#[derive(Debug, Clone)]
pub struct ControlBoard {
    table: Arc<ActionTable>,
    groups: Arc<DashMap<String, GroupSlot>>,
    delays: RevertDelays,
    changes: broadcast::Sender<StateChange>,
}

impl ControlBoard {
    /// Creates a board with every group of `table` idle.
    #[must_use]
    pub fn new(table: ActionTable, delays: RevertDelays) -> Self {
        let groups = DashMap::new();
        for action in table.actions() {
            groups.insert(
                action.to_string(),
                GroupSlot {
                    state: DownloadState::Idle,
                    generation: 0,
                },
            );
        }
        let (changes, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            table: Arc::new(table),
            groups: Arc::new(groups),
            delays,
            changes,
        }
    }

    #[must_use]
    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    /// Subscribes to group transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Current state of `action`'s group. Unknown actions read as idle.
    #[must_use]
    pub fn state(&self, action: &str) -> DownloadState {
        self.groups
            .get(action)
            .map_or(DownloadState::Idle, |slot| slot.state)
    }

    /// State shown by `control`, derived from its group.
    #[must_use]
    pub fn control_state(&self, control: &str) -> Option<DownloadState> {
        self.table
            .resolve(control)
            .map(|binding| self.state(&binding.action))
    }

    /// Whether `control` currently accepts activation.
    #[must_use]
    pub fn is_enabled(&self, control: &str) -> bool {
        self.control_state(control)
            .is_some_and(|state| !state.is_disabled())
    }

    /// Moves a group to `preparing`. Returns the attempt generation, or
    /// `None` if the action is unknown or its controls are disabled.
    pub fn begin(&self, action: &str) -> Option<u64> {
        let (previous, generation) = {
            let mut slot = self.groups.get_mut(action)?;
            if slot.state.is_disabled() {
                return None;
            }
            let previous = slot.state;
            slot.state = DownloadState::Preparing;
            slot.generation += 1;
            (previous, slot.generation)
        };
        self.announce(action, previous, DownloadState::Preparing);
        Some(generation)
    }

    /// Moves a `preparing` group to its terminal state and arms the revert
    /// timer. Returns false if `generation` is stale.
    ///
    /// Must be called within a Tokio runtime.
    pub fn finish(&self, action: &str, generation: u64, succeeded: bool) -> bool {
        let terminal = if succeeded {
            DownloadState::Success
        } else {
            DownloadState::Error
        };
        {
            let Some(mut slot) = self.groups.get_mut(action) else {
                return false;
            };
            if slot.generation != generation || slot.state != DownloadState::Preparing {
                return false;
            }
            slot.state = terminal;
        }
        self.announce(action, DownloadState::Preparing, terminal);

        let delay = if succeeded {
            self.delays.success
        } else {
            self.delays.error
        };
        let board = self.clone();
        let action = action.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            board.revert(&action, generation, terminal);
        });
        true
    }

    fn revert(&self, action: &str, generation: u64, expected: DownloadState) {
        {
            let Some(mut slot) = self.groups.get_mut(action) else {
                return;
            };
            if slot.generation != generation || slot.state != expected {
                trace!(action, generation, "stale revert timer ignored");
                return;
            }
            slot.state = DownloadState::Idle;
        }
        self.announce(action, expected, DownloadState::Idle);
    }

    fn announce(&self, action: &str, from: DownloadState, to: DownloadState) {
        debug!(action, %from, %to, "control group transition");
        // No subscribers is fine.
        let _ = self.changes.send(StateChange {
            action: action.to_string(),
            from,
            to,
        });
    }
}
