//! Architecture glue
//!
//! Only interrupt masking is needed by the driver: the command-ring lock and
//! the stream buffer lock are also taken from the interrupt handler, so on
//! bare metal they are held with local interrupts disabled.

/// Run a closure with interrupts disabled, restoring previous state after
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[inline(always)]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Hosted builds run "interrupts" on ordinary threads; nothing to mask.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[inline(always)]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
