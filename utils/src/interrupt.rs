//! Stand-ins for the architecture's interrupt-mask instructions.
//!
//! On real x86 these would be `cli`/`sti`. Since this crate models the
//! architecture abstractly (see `kernel::arch`), interrupt state is tracked
//! as a single global flag; it is enough to express and assert the
//! "run queues and wait channels are touched with interrupts disabled"
//! invariant from spec.md §5 without depending on real hardware.

use core::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disables interrupts, returning the previous state.
#[inline]
pub fn cli() -> bool {
	INTERRUPTS_ENABLED.swap(false, Ordering::AcqRel)
}

/// Enables interrupts.
#[inline]
pub fn sti() {
	INTERRUPTS_ENABLED.store(true, Ordering::Release);
}

/// Restores a previously saved interrupt state.
#[inline]
pub fn restore(prev: bool) {
	INTERRUPTS_ENABLED.store(prev, Ordering::Release);
}

/// Tells whether interrupts are currently enabled.
#[inline]
pub fn is_interrupt_enabled() -> bool {
	INTERRUPTS_ENABLED.load(Ordering::Acquire)
}
