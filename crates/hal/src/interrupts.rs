// Generic interrupt control wrapper.
// Delegates to the bare-metal implementation on kernel targets and to a
// per-thread mock when the HAL runs hosted.

/// Disables interrupts and returns the previous state for [`restore`].
#[inline(always)]
pub fn disable() -> u64 {
    arch::disable()
}

/// Restores a state previously returned by [`disable`].
#[inline(always)]
pub fn restore(state: u64) {
    arch::restore(state);
}

#[inline(always)]
pub fn is_enabled() -> bool {
    arch::is_enabled()
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod arch {
    use x86_64::instructions::interrupts;

    #[inline(always)]
    pub fn disable() -> u64 {
        let was_enabled = interrupts::are_enabled();
        interrupts::disable();
        u64::from(was_enabled)
    }

    #[inline(always)]
    pub fn restore(state: u64) {
        if state != 0 {
            interrupts::enable();
        }
    }

    #[inline(always)]
    pub fn is_enabled() -> bool {
        interrupts::are_enabled()
    }
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
mod arch {
    use aarch64_cpu::registers::{DAIF, Readable, Writeable};

    #[inline(always)]
    pub fn disable() -> u64 {
        let state = DAIF.get();
        // SAFETY: daifset is an immediate-only instruction not provided by aarch64-cpu
        unsafe { core::arch::asm!("msr daifset, #2") };
        state
    }

    #[inline(always)]
    pub fn restore(state: u64) {
        DAIF.set(state);
    }

    #[inline(always)]
    pub fn is_enabled() -> bool {
        // IRQ mask is bit 7
        (DAIF.get() & (1 << 7)) == 0
    }
}

// Hosted: each thread stands in for one execution context with its own flag.
#[cfg(all(not(target_os = "none"), any(test, feature = "std")))]
mod arch {
    use std::cell::Cell;

    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    pub fn disable() -> u64 {
        u64::from(ENABLED.with(|e| e.replace(false)))
    }

    pub fn restore(state: u64) {
        ENABLED.with(|e| e.set(state != 0));
    }

    pub fn is_enabled() -> bool {
        ENABLED.with(Cell::get)
    }
}

#[cfg(not(any(
    all(target_os = "none", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(not(target_os = "none"), any(test, feature = "std"))
)))]
mod arch {
    pub fn disable() -> u64 {
        0
    }

    pub fn restore(state: u64) {
        let _ = state;
    }

    pub fn is_enabled() -> bool {
        true
    }
}
