//! The optimistic mutation primitive.
//!
//! Every mutating operation of both stores runs the same protocol:
//!
//! 1. capture a snapshot of the affected slot
//! 2. apply the change locally
//! 3. await the remote call
//! 4. on success reconcile with the server's answer, on failure restore the
//!    snapshot
//!
//! [`OptimisticMutation`] implements steps 1 to 4 once; callers only provide
//! the slot, the local change and the reconcile step.
//!
//! # Fencing
//!
//! With [`FencingMode::LastResponseWins`] (the default) whichever response
//! arrives last overwrites the slot, regardless of issue order. With
//! [`FencingMode::IssueOrder`] each mutation draws a [`Ticket`] from the
//! [`Fence`]; a response whose ticket is no longer the latest for its entity
//! is dropped: it neither reconciles nor rolls back, and the caller receives
//! [`SyncError::Superseded`].

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::error::SyncError;
use crate::infrastructure::{ConfigError, RemoteError};

// =============================================================================
// Rollback
// =============================================================================

/// A piece of local state that can be captured and restored.
pub trait Rollback {
    /// The captured state.
    type Snapshot;

    /// Identity of the entity, used as the fence key.
    fn fence_key(&self) -> String;

    /// Captures the current state.
    fn capture(&self) -> Self::Snapshot;

    /// Puts the captured state back.
    fn restore(&self, snapshot: Self::Snapshot);
}

// =============================================================================
// Fence
// =============================================================================

/// How concurrent mutations of one entity are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencingMode {
    /// Every response commits; the last to arrive wins.
    #[default]
    LastResponseWins,
    /// Only the latest-issued request of an entity may commit.
    IssueOrder,
}

impl FromStr for FencingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "last_response_wins" | "last" | "none" => Ok(Self::LastResponseWins),
            "issue_order" | "fenced" => Ok(Self::IssueOrder),
            _ => Err(ConfigError::InvalidFencingMode(value.to_string())),
        }
    }
}

impl std::fmt::Display for FencingMode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastResponseWins => formatter.write_str("last_response_wins"),
            Self::IssueOrder => formatter.write_str("issue_order"),
        }
    }
}

/// Proof of issue order for one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    sequence: u64,
}

impl Ticket {
    /// The entity this ticket was issued for.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Default)]
struct FenceState {
    next_sequence: u64,
    /// Latest issued sequence per entity with a request in flight.
    latest: HashMap<String, u64>,
}

/// Per-entity issue counter. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct Fence {
    mode: FencingMode,
    state: Arc<Mutex<FenceState>>,
}

impl Fence {
    #[must_use]
    pub fn new(mode: FencingMode) -> Self {
        Self {
            mode,
            state: Arc::default(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> FencingMode {
        self.mode
    }

    /// Issues a ticket, superseding every earlier ticket for `key`.
    ///
    /// Sequences are global, so a ticket can never collide with one issued
    /// before its entity's entry was released.
    pub fn issue(&self, key: impl Into<String>) -> Ticket {
        let key = key.into();
        let mut state = self.state.lock();
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        if self.mode == FencingMode::IssueOrder {
            state.latest.insert(key.clone(), sequence);
        }
        Ticket { key, sequence }
    }

    /// Returns `true` if the ticket may still commit.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        match self.mode {
            FencingMode::LastResponseWins => true,
            FencingMode::IssueOrder => {
                self.state.lock().latest.get(&ticket.key) == Some(&ticket.sequence)
            }
        }
    }

    /// Settles `ticket`: returns `false` if it was superseded. A current ticket
    /// is retired so the entity's entry does not linger.
    fn settle(&self, ticket: &Ticket) -> bool {
        if self.mode == FencingMode::LastResponseWins {
            return true;
        }
        let mut state = self.state.lock();
        if state.latest.get(&ticket.key) == Some(&ticket.sequence) {
            state.latest.remove(&ticket.key);
            true
        } else {
            false
        }
    }

    /// Number of entities with a request in flight (fenced mode only).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().latest.len()
    }
}

// =============================================================================
// Optimistic Mutation
// =============================================================================

/// A ticket held by an unsettled mutation. Retires itself when dropped, so an
/// abandoned mutation does not leave its entity's entry in the fence.
struct TicketGuard<'f> {
    fence: &'f Fence,
    ticket: Ticket,
    settled: bool,
}

impl TicketGuard<'_> {
    fn settle(&mut self) -> bool {
        self.settled = true;
        self.fence.settle(&self.ticket)
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.fence.settle(&self.ticket) {
            tracing::debug!(key = %self.ticket.key, "Retired ticket of abandoned mutation");
        }
    }
}

/// A mutation that has been applied locally and awaits its remote outcome.
#[must_use = "an applied mutation must be settled"]
pub struct OptimisticMutation<'f, R: Rollback> {
    slot: R,
    snapshot: R::Snapshot,
    ticket: TicketGuard<'f>,
}

impl<'f, R: Rollback> OptimisticMutation<'f, R> {
    /// Captures the slot, draws a ticket, then applies the local change.
    pub fn begin(slot: R, fence: &'f Fence, apply: impl FnOnce(&R)) -> Self {
        let ticket = fence.issue(slot.fence_key());
        let snapshot = slot.capture();
        apply(&slot);
        Self {
            slot,
            snapshot,
            ticket: TicketGuard {
                fence,
                ticket,
                settled: false,
            },
        }
    }

    /// Awaits `remote`, then reconciles or rolls back.
    ///
    /// `reconcile` runs only for a successful, current response and receives
    /// the slot so it can write the server's answer.
    ///
    /// Dropping the returned future before it resolves abandons the mutation:
    /// its ticket is retired, but the local change is neither reconciled nor
    /// rolled back, since the request may already have reached the server.
    ///
    /// # Errors
    ///
    /// - `SyncError::Remote` after restoring the snapshot
    /// - `SyncError::Superseded` when a newer ticket exists (fenced mode)
    pub async fn settle<T, U>(
        mut self,
        remote: impl Future<Output = Result<T, RemoteError>>,
        reconcile: impl FnOnce(&R, T) -> U,
    ) -> Result<U, SyncError> {
        let outcome = remote.await;

        if !self.ticket.settle() {
            tracing::debug!(
                key = %self.ticket.ticket.key,
                succeeded = outcome.is_ok(),
                "Discarding response of superseded request"
            );
            return Err(SyncError::Superseded);
        }

        match outcome {
            Ok(value) => Ok(reconcile(&self.slot, value)),
            Err(error) => {
                tracing::warn!(key = %self.ticket.ticket.key, %error, "Remote call failed, rolling back");
                self.slot.restore(self.snapshot);
                Err(SyncError::Remote(error))
            }
        }
    }
}

// =============================================================================
// Supersede Token
// =============================================================================

/// Flag marking a read whose result is no longer wanted.
///
/// The request itself is not aborted; its response is dropped on arrival.
#[derive(Debug, Clone, Default)]
pub struct SupersedeToken(Arc<AtomicBool>);

impl SupersedeToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the read as unwanted.
    pub fn supersede(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// Tests
// =============================================================================
