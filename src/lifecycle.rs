//! Lifecycle state machine.
//!
//! The gate is the sole authority over which operation is legal when.
//! It tracks a *base* state (`None`/`NoInit`/`NoIndex`/`Ready`) and an
//! *exclusive op* slot (`Add`/`Train`/`Dump`). Exclusive operations claim
//! the slot with a compare-and-swap, so at most one mutating operation
//! runs per handle; read-only operations consult the base state only and
//! are never blocked by an in-flight exclusive op.
//!
//! A claimed slot is always returned: [`OpGuard`] restores it on drop,
//! including panic unwinds and early `?` returns.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of an index handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Handle not yet initialized.
    None,
    /// Config set, empty dataset, no trained model.
    NoInit,
    /// Data present but not fully indexed; served by brute force or by
    /// the stale snapshot plus a brute-force tail.
    NoIndex,
    /// Trained and fully indexed.
    Ready,
    /// Transient: an insert batch is being appended.
    Add,
    /// Transient: training/reindexing is in progress.
    Train,
    /// Transient: a dump is being written.
    Dump,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::None => "NONE",
            LifecycleState::NoInit => "NOINIT",
            LifecycleState::NoIndex => "NOINDEX",
            LifecycleState::Ready => "READY",
            LifecycleState::Add => "ADD",
            LifecycleState::Train => "TRAIN",
            LifecycleState::Dump => "DUMP",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LifecycleState::None => 0,
            LifecycleState::NoInit => 1,
            LifecycleState::NoIndex => 2,
            LifecycleState::Ready => 3,
            LifecycleState::Add => 4,
            LifecycleState::Train => 5,
            LifecycleState::Dump => 6,
        }
    }

    fn from_u8(v: u8) -> LifecycleState {
        match v {
            1 => LifecycleState::NoInit,
            2 => LifecycleState::NoIndex,
            3 => LifecycleState::Ready,
            4 => LifecycleState::Add,
            5 => LifecycleState::Train,
            6 => LifecycleState::Dump,
            _ => LifecycleState::None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const OP_NONE: u8 = 0;

/// State gate for one index handle.
#[derive(Debug)]
pub(crate) struct LifecycleGate {
    base: AtomicU8,
    op: AtomicU8,
}

impl LifecycleGate {
    pub(crate) fn new(initial: LifecycleState) -> Self {
        Self {
            base: AtomicU8::new(initial.to_u8()),
            op: AtomicU8::new(OP_NONE),
        }
    }

    /// Current base state.
    pub(crate) fn base(&self) -> LifecycleState {
        LifecycleState::from_u8(self.base.load(Ordering::Acquire))
    }

    /// The state reported to callers: the transient op when one is
    /// active, else the base state.
    pub(crate) fn reported(&self) -> LifecycleState {
        match self.op.load(Ordering::Acquire) {
            OP_NONE => self.base(),
            op => LifecycleState::from_u8(op),
        }
    }

    /// Claim the exclusive-op slot for `op`, requiring the base state to
    /// be one of `allowed`.
    ///
    /// Fails with `NotReady` when another exclusive op holds the slot or
    /// the base state is not allowed. The base state only changes while
    /// the slot is held, so the check is race-free once the claim lands.
    pub(crate) fn begin(
        &self,
        op: LifecycleState,
        allowed: &[LifecycleState],
    ) -> Result<OpGuard<'_>> {
        if self
            .op
            .compare_exchange(OP_NONE, op.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(IndexError::NotReady(self.reported()));
        }
        let base = self.base();
        if !allowed.contains(&base) {
            self.op.store(OP_NONE, Ordering::Release);
            return Err(IndexError::NotReady(base));
        }
        Ok(OpGuard { gate: self })
    }
}

/// Scoped claim on the exclusive-op slot.
///
/// Dropping the guard without [`OpGuard::finish`] releases the slot and
/// leaves the base state untouched (the error path).
#[derive(Debug)]
pub(crate) struct OpGuard<'a> {
    gate: &'a LifecycleGate,
}

impl OpGuard<'_> {
    /// Advance the base state to `next` and release the slot.
    pub(crate) fn finish(self, next: LifecycleState) {
        self.gate.base.store(next.to_u8(), Ordering::Release);
        // Drop releases the op slot.
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.gate.op.store(OP_NONE, Ordering::Release);
    }
}
