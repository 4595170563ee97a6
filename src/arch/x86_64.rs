//! x86_64 context switch (System V ABI)

use core::arch::global_asm;

global_asm!(
    r#"
.section .text
.global mame_switch_context

// void mame_switch_context(Context* old, const Context* new)
// rdi = pointer to old context (save here)
// rsi = pointer to new context (load from here)
mame_switch_context:
    // Save status register
    pushfq
    pop qword ptr [rdi + 0x38]

    // Save callee-saved registers
    mov [rdi + 0x00], rbx
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], r12
    mov [rdi + 0x18], r13
    mov [rdi + 0x20], r14
    mov [rdi + 0x28], r15

    // Save stack pointer (points at our return address)
    mov [rdi + 0x30], rsp

    // Load new context
    mov rbx, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    mov r12, [rsi + 0x10]
    mov r13, [rsi + 0x18]
    mov r14, [rsi + 0x20]
    mov r15, [rsi + 0x28]
    mov rsp, [rsi + 0x30]

    // Restore status register
    push qword ptr [rsi + 0x38]
    popfq

    // Return into the new context (its saved return address, or the
    // dispatcher entry seeded at the base of a fresh stack)
    ret
"#
);

unsafe extern "C" {
    fn mame_switch_context(old: *mut Context, new: *const Context);
}

/// CPU context saved across a context switch.
///
/// Layout is fixed by the assembly above; keep the field order in sync.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    /// Status register (RFLAGS).
    pub rflags: u64,
}

impl Context {
    pub const fn zero() -> Self {
        Self { rbx: 0, rbp: 0, r12: 0, r13: 0, r14: 0, r15: 0, rsp: 0, rflags: 0 }
    }

    pub fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }
}

/// Suspend the current flow of execution into `old` and resume `new`.
///
/// # Safety
///
/// `old` must be writable and `new` must hold either a context previously
/// saved by this function or one produced by [`init_context`] over a live,
/// exclusively owned stack region.
pub unsafe fn switch_context(old: *mut Context, new: *const Context) {
    unsafe { mame_switch_context(old, new) }
}

/// Seed a fresh context on the given stack region.
///
/// The region base (its highest 16-byte-aligned address) receives the entry
/// return address, so the first `ret` of the context switch lands in `entry`
/// with the stack alignment the ABI mandates at function entry. The register
/// prologue is zeroed.
pub fn init_context(stack: *mut u8, len: usize, entry: extern "C" fn() -> !) -> Context {
    let top = (stack as usize + len) & !15;
    let ra_slot = top - 16;
    // SAFETY: ra_slot lies inside the caller-owned stack region.
    unsafe { (ra_slot as *mut u64).write(entry as usize as u64) };

    let mut ctx = Context::zero();
    ctx.rsp = ra_slot as u64;
    ctx
}
