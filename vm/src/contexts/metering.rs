//! The gas ledger.
//!
//! One ledger serves the whole request. Charges are checked before they are
//! applied, so a failed charge leaves the ledger untouched. Nested calls
//! push a frame budget on top: a charge must fit both the innermost budget
//! and the global ledger.
//!
//! Conservation invariant, holding at every observable point:
//! `used + remaining + locked + refund == initial`, with
//! `remaining = initial - used - locked - refund`. A refund reclassifies
//! used gas rather than minting new budget, and locking moves budget out of
//! `remaining` without touching `used`.

use std::sync::Arc;

use cinder_hostapi::GasSchedule;
use cinder_primitives::{VMError, VMResult};

/// Saved frame accounting, restored when the frame pops.
#[derive(Debug, Clone, Copy)]
struct MeteringFrame {
    frame_limit: u64,
    frame_used_base: u64,
    frame_locked_base: u64,
}

/// Gas accounting for the active request.
#[derive(Debug)]
pub struct MeteringContext {
    schedule: Arc<GasSchedule>,
    initial: u64,
    used: u64,
    locked: u64,
    refund: u64,
    /// Budget of the innermost frame.
    frame_limit: u64,
    /// Global `used` at entry of the innermost frame.
    frame_used_base: u64,
    /// Global `locked` at entry of the innermost frame.
    frame_locked_base: u64,
    stack: Vec<MeteringFrame>,
}

impl MeteringContext {
    pub fn new(schedule: Arc<GasSchedule>) -> Self {
        Self {
            schedule,
            initial: 0,
            used: 0,
            locked: 0,
            refund: 0,
            frame_limit: 0,
            frame_used_base: 0,
            frame_locked_base: 0,
            stack: Vec::new(),
        }
    }

    /// Reset the ledger for a fresh request.
    pub fn init_state(&mut self) {
        self.initial = 0;
        self.used = 0;
        self.locked = 0;
        self.refund = 0;
        self.frame_limit = 0;
        self.frame_used_base = 0;
        self.frame_locked_base = 0;
        self.stack.clear();
    }

    /// Open the root frame with the request's gas budget.
    pub fn init_for_request(&mut self, gas_provided: u64) {
        self.init_state();
        self.initial = gas_provided;
        self.frame_limit = gas_provided;
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn set_schedule(&mut self, schedule: Arc<GasSchedule>) {
        self.schedule = schedule;
    }

    /// Gas still spendable by the innermost frame.
    ///
    /// Locks taken inside the frame are held out of its budget for as long
    /// as the frame runs.
    pub fn gas_remaining(&self) -> u64 {
        let global = self
            .initial
            .saturating_sub(self.used)
            .saturating_sub(self.locked)
            .saturating_sub(self.refund);
        let frame_locked = self.locked.saturating_sub(self.frame_locked_base);
        let frame = self
            .frame_limit
            .saturating_sub(self.frame_used())
            .saturating_sub(frame_locked);
        global.min(frame)
    }

    pub fn gas_used(&self) -> u64 {
        self.used
    }

    pub fn gas_locked(&self) -> u64 {
        self.locked
    }

    pub fn gas_refund(&self) -> u64 {
        self.refund
    }

    pub fn initial_gas(&self) -> u64 {
        self.initial
    }

    fn frame_used(&self) -> u64 {
        self.used.saturating_sub(self.frame_used_base)
    }

    /// Charge gas against the innermost frame.
    pub fn charge(&mut self, amount: u64) -> VMResult<()> {
        if amount > self.gas_remaining() {
            return Err(VMError::OutOfGas);
        }
        self.used += amount;
        Ok(())
    }

    /// Charge a base cost plus a per-byte rate.
    pub fn charge_with_bytes(&mut self, base: u64, per_byte: u64, len: usize) -> VMResult<()> {
        self.charge(GasSchedule::with_bytes(base, per_byte, len))
    }

    /// Reserve gas out of the spendable budget, to be released when the
    /// frame completes.
    pub fn lock_gas(&mut self, amount: u64) -> VMResult<()> {
        if amount > self.gas_remaining() {
            return Err(VMError::OutOfGas);
        }
        self.locked += amount;
        Ok(())
    }

    /// Credit a refund, capped so total refunds never exceed the configured
    /// share of all gas ever charged.
    pub fn add_refund(&mut self, amount: u64) {
        let gross = self.used.saturating_add(self.refund);
        let cap = gross.saturating_mul(self.schedule.refund_cap_percent) / 100;
        let headroom = cap.saturating_sub(self.refund);
        let credit = amount.min(headroom).min(self.used);
        self.used -= credit;
        self.refund += credit;
    }

    /// Open a nested frame with the given budget.
    ///
    /// The budget is clamped to what the current frame can still spend.
    pub fn push_state(&mut self, requested_gas: u64) -> u64 {
        let granted = requested_gas.min(self.gas_remaining());
        self.stack.push(MeteringFrame {
            frame_limit: self.frame_limit,
            frame_used_base: self.frame_used_base,
            frame_locked_base: self.frame_locked_base,
        });
        self.frame_limit = granted;
        self.frame_used_base = self.used;
        self.frame_locked_base = self.locked;
        granted
    }

    /// Close a successful frame: the child's consumption stays on the
    /// ledger and its remaining locks are released to the caller.
    pub fn pop_merge(&mut self) {
        self.locked = self.frame_locked_base;
        self.restore_frame();
    }

    /// Close a failed frame. Consumption stays on the ledger; when the
    /// frame failed by exhausting its budget, the entire budget is
    /// consumed.
    pub fn pop_discard(&mut self, out_of_gas: bool) {
        if out_of_gas {
            self.used = self.frame_used_base.saturating_add(self.frame_limit);
        }
        self.locked = self.frame_locked_base;
        self.restore_frame();
    }

    fn restore_frame(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.frame_limit = frame.frame_limit;
            self.frame_used_base = frame.frame_used_base;
            self.frame_locked_base = frame.frame_locked_base;
        }
    }

    /// Drop all nested frames, keeping the root accounting.
    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Conservation check; every completed request must satisfy it.
    pub fn is_balanced(&self) -> bool {
        let global_remaining = self
            .initial
            .saturating_sub(self.used)
            .saturating_sub(self.locked)
            .saturating_sub(self.refund);
        self.used + global_remaining + self.locked + self.refund == self.initial
    }
}
