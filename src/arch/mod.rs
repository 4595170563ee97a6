//! Architecture support: saved process contexts and the context switch.
//!
//! Each backend provides:
//! - `Context` -- the callee-saved register file, the status register and
//!   the stack pointer of a suspended process,
//! - `switch_context(old, new)` -- save into `old`, resume from `new`,
//! - `init_context(base, len, entry)` -- seed a fresh stack so that resuming
//!   the context "returns" into `entry`.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::{Context, init_context, switch_context};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::{Context, init_context, switch_context};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("unsupported architecture: no context-switch backend");

impl Context {
    /// Raw byte view of the saved context, for checksumming.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: Context is repr(C) and contains only plain integers.
        unsafe {
            core::slice::from_raw_parts(
                self as *const Context as *const u8,
                core::mem::size_of::<Context>(),
            )
        }
    }
}
