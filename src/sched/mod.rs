//! Scheduler core
//!
//! The process table, the timer tick, process lifecycle (spawn, kill,
//! dispatch), cooperative yield and the critical-section discipline.
//!
//! How a switch works:
//!   - the timer tick marks the running slot Ready (unless it blocked or
//!     died), asks the selected strategy for the next id, verifies that
//!     slot's stack checksum and switches contexts,
//!   - the suspended slot's stack pointer and checksum are recorded on the
//!     resume side of the switch, right after its registers were saved,
//!   - a fresh process enters through the dispatcher, which calls the slot's
//!     program and kills the slot when the program returns.
//!
//! Slot 0 is the idle process and is bound to the boot context: whoever
//! initialised the kernel keeps running as slot 0 on the boot stack, and is
//! scheduled only when no other slot is ready.

pub mod queue;
pub mod strategies;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use spinning_top::Spinlock;

use crate::arch::{self, Context};
use crate::config::{DEFAULT_PRIORITY, IDLE, N_SLOTS, STACK_SIZE};
use crate::error;
use crate::mem;
use crate::timer;

pub use strategies::SchedulingStrategy;

use strategies::SchedulingInfo;

/// Index of a process slot.
pub type Pid = u8;

/// A program entry: every process runs one of these to completion.
pub type Program = fn();

/// Lifecycle state of a process slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Ready,
    Running,
    Blocked,
}

/// One slot of the process table.
#[derive(Clone, Copy)]
pub(crate) struct Process {
    pub state: ProcState,
    pub program: Option<Program>,
    pub priority: u8,
    pub ctx: Context,
    pub checksum: u8,
}

impl Process {
    pub(crate) const fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            program: None,
            priority: 0,
            ctx: Context::zero(),
            checksum: 0,
        }
    }
}

/// Spawn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every non-idle slot is occupied.
    NoFreeSlot,
}

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SpawnError::NoFreeSlot => write!(f, "no free process slot"),
        }
    }
}

// ============================================================================
// Global state
// ============================================================================

struct Scheduler {
    slots: [Process; N_SLOTS],
    current: Pid,
    strategy: SchedulingStrategy,
    info: SchedulingInfo,
}

impl Scheduler {
    const fn new() -> Self {
        const UNUSED: Process = Process::unused();
        Self {
            slots: [UNUSED; N_SLOTS],
            current: IDLE,
            strategy: SchedulingStrategy::Even,
            info: SchedulingInfo::new(),
        }
    }

    fn select_next(&mut self) -> Pid {
        let current = self.current;
        match self.strategy {
            SchedulingStrategy::Even => strategies::even(&mut self.slots, current),
            SchedulingStrategy::Random => strategies::random(&mut self.slots, current),
            SchedulingStrategy::RoundRobin => {
                strategies::round_robin(&mut self.slots, &mut self.info, current)
            }
            SchedulingStrategy::InactiveAging => {
                strategies::inactive_aging(&mut self.slots, &mut self.info, current)
            }
            SchedulingStrategy::RunToCompletion => {
                strategies::run_to_completion(&mut self.slots, current)
            }
            SchedulingStrategy::MultiLevelFeedbackQueue => {
                strategies::mlfq(&mut self.slots, &mut self.info, current)
            }
        }
    }

    /// Raw pointers to two slots' saved contexts, for the switch itself.
    /// Taken from one borrow so neither pointer invalidates the other.
    fn context_ptrs(&mut self, old: usize, new: usize) -> (*mut Context, *const Context) {
        let base = self.slots.as_mut_ptr();
        // SAFETY: both indices are in bounds of the slot array.
        unsafe { (&raw mut (*base.add(old)).ctx, &raw const (*base.add(new)).ctx) }
    }

    /// Clear one slot's strategy bookkeeping and queue it by its priority
    /// class. Runs whenever a slot is (re)occupied.
    fn reset_process_scheduling_info(&mut self, pid: Pid) {
        let slot = pid as usize;
        let class = strategies::queue_class(self.slots[slot].priority);
        self.info.age[slot] = 0;
        self.info.slice_mlfq[slot] = strategies::default_slice(class);
        for queue in &mut self.info.queues {
            queue.remove(pid);
        }
        if self.info.queues[class].append(pid).is_err() {
            log::error!("feedback queue {} overflow", class);
        }
    }
}

static SCHEDULER: Spinlock<Scheduler> = Spinlock::new(Scheduler::new());

/// Mirror of the running pid, readable without taking the table lock.
static CURRENT: AtomicU8 = AtomicU8::new(IDLE);

/// Nesting depth of critical sections. Process-wide, like the timer mask it
/// guards; a yielding process snapshots and restores it around the switch.
static CS_DEPTH: AtomicU8 = AtomicU8::new(0);

/// Slot suspended by the most recent context switch; the resume side records
/// its checksum.
static PREV: AtomicU8 = AtomicU8::new(IDLE);

/// Landing pad for the registers of a slot that died mid-switch.
struct ScratchContext(UnsafeCell<Context>);
// SAFETY: written only during a context switch; never read back.
unsafe impl Sync for ScratchContext {}
static SCRATCH: ScratchContext = ScratchContext(UnsafeCell::new(Context::zero()));

/// Fixed, disjoint stack regions for slots 1..N_SLOTS. Slot 0 runs on the
/// boot stack.
#[repr(align(16))]
struct StackPool([u8; STACK_SIZE * (N_SLOTS - 1)]);
struct StackCell(UnsafeCell<StackPool>);
// SAFETY: each region is written only by its own slot (and by spawn while
// the slot is Unused, inside a critical section).
unsafe impl Sync for StackCell {}
static STACKS: StackCell = StackCell(UnsafeCell::new(StackPool([0; STACK_SIZE * (N_SLOTS - 1)])));

fn stack_region(pid: Pid) -> Option<(*mut u8, usize)> {
    if pid == IDLE || pid as usize >= N_SLOTS {
        return None;
    }
    let pool = STACKS.0.get() as *mut u8;
    // SAFETY: the offset stays inside the pool.
    let base = unsafe { pool.add((pid as usize - 1) * STACK_SIZE) };
    Some((base, STACK_SIZE))
}

/// XOR checksum over a slot's saved context and the used part of its stack
/// region (from the saved stack pointer up to the region base). The idle
/// slot has no pool region, so only its context is covered.
fn stack_checksum(pid: Pid, ctx: &Context) -> u8 {
    let mut sum = 0u8;
    for byte in ctx.as_bytes() {
        sum ^= *byte;
    }
    if let Some((base, len)) = stack_region(pid) {
        let top = base as usize + len;
        let sp = ctx.stack_pointer();
        if sp < base as usize || sp > top {
            error::fatal("saved stack pointer outside the slot region");
        }
        let mut addr = sp;
        while addr < top {
            // SAFETY: [sp, top) lies inside the slot's pool region.
            sum ^= unsafe { *(addr as *const u8) };
            addr += 1;
        }
    }
    sum
}

// ============================================================================
// Timer tick
// ============================================================================

/// The scheduler tick: the body of the timer interrupt.
///
/// Runs on every unmasked timer firing and directly from [`yield_now`].
pub(crate) fn tick() {
    let mut switch: Option<(*mut Context, *const Context)> = None;
    let prev: Pid;
    {
        let mut s = SCHEDULER.lock();
        let cur = s.current as usize;
        prev = s.current;

        let state = s.slots[cur].state;
        if state != ProcState::Unused && state != ProcState::Blocked {
            s.slots[cur].state = ProcState::Ready;
        }

        let next = s.select_next();
        if next != prev {
            // The chosen slot was suspended earlier; its stored checksum
            // must match a fresh recomputation of its untouched stack.
            let fresh = stack_checksum(next, &s.slots[next as usize].ctx);
            if fresh != s.slots[next as usize].checksum {
                error::fatal("stack inconsistency detected");
            }
            let (old, new) = s.context_ptrs(cur, next as usize);
            let old = if s.slots[cur].state == ProcState::Unused {
                // The registers of a dead slot land in the scratch pad.
                SCRATCH.0.get()
            } else {
                old
            };
            switch = Some((old, new));
        }
        s.slots[next as usize].state = ProcState::Running;
        s.current = next;
        CURRENT.store(next, Ordering::Relaxed);
    }

    if let Some((old, new)) = switch {
        PREV.store(prev, Ordering::Relaxed);
        // SAFETY: both pointers address pinned slots of the static process
        // table (or the scratch pad); the table lock is released, and no
        // other execution runs until the switch completes.
        unsafe { arch::switch_context(old, new) };
        record_suspended();
    }
}

/// Record stack pointer and checksum of the slot the switch just suspended.
///
/// Runs as the first kernel code of the resumed side, when the suspended
/// slot's context is complete.
fn record_suspended() {
    let prev = PREV.load(Ordering::Relaxed) as usize;
    let mut s = SCHEDULER.lock();
    if s.slots[prev].state != ProcState::Unused {
        let checksum = stack_checksum(prev as Pid, &s.slots[prev].ctx);
        s.slots[prev].checksum = checksum;
    }
}

/// The trampoline every fresh process starts in.
extern "C" fn dispatch_entry() -> ! {
    record_suspended();
    let (pid, program) = {
        let s = SCHEDULER.lock();
        (s.current, s.slots[s.current as usize].program)
    };
    if let Some(program) = program {
        program();
    }
    kill(pid);
    // Reached only if another process killed this slot first; give the
    // processor away until the slot is recycled.
    loop {
        yield_now();
    }
}

// ============================================================================
// Public interface
// ============================================================================

/// Reset the kernel and register the auto-start programs.
///
/// Every slot is cleared, the scheduling information is wiped, slot 0 is
/// bound to the calling (boot) context, and each entry of `autostart` is
/// spawned at the default priority.
pub fn init(autostart: &[Program]) {
    CS_DEPTH.store(0, Ordering::Relaxed);
    timer::reset();
    {
        let mut s = SCHEDULER.lock();
        for slot in s.slots.iter_mut() {
            *slot = Process::unused();
        }
        s.info = SchedulingInfo::new();
        s.strategy = SchedulingStrategy::Even;
        s.current = IDLE;

        s.slots[IDLE as usize] = Process {
            state: ProcState::Running,
            program: None,
            priority: DEFAULT_PRIORITY,
            ctx: Context::zero(),
            checksum: 0,
        };
        let checksum = stack_checksum(IDLE, &s.slots[IDLE as usize].ctx);
        s.slots[IDLE as usize].checksum = checksum;
        CURRENT.store(IDLE, Ordering::Relaxed);
    }
    for &program in autostart {
        if let Err(e) = spawn(program, DEFAULT_PRIORITY) {
            log::error!("auto-start entry rejected: {}", e);
        }
    }
}

/// Hand the processor to the scheduler: the timer source goes live and the
/// caller continues as the idle process.
pub fn start() {
    {
        let mut s = SCHEDULER.lock();
        let cur = s.current as usize;
        s.slots[cur].state = ProcState::Running;
    }
    timer::unmask();
}

/// Occupy a free slot with `program` and make it Ready.
///
/// The new slot's stack is seeded so that the scheduler can switch into it:
/// the dispatcher's return address at the stack base and a zeroed register
/// prologue below it.
pub fn spawn(program: Program, priority: u8) -> Result<Pid, SpawnError> {
    critical_section::with(|_| {
        let mut s = SCHEDULER.lock();
        let slot = (1..N_SLOTS)
            .find(|&i| s.slots[i].state == ProcState::Unused)
            .ok_or(SpawnError::NoFreeSlot)?;
        let pid = slot as Pid;

        let (base, len) = stack_region(pid).expect("non-idle slot owns a stack region");
        let ctx = arch::init_context(base, len, dispatch_entry);
        s.slots[slot] = Process {
            state: ProcState::Ready,
            program: Some(program),
            priority,
            ctx,
            checksum: 0,
        };
        s.slots[slot].checksum = stack_checksum(pid, &ctx);
        s.reset_process_scheduling_info(pid);
        Ok(pid)
    })
}

/// Terminate a process and reclaim its memory on every heap.
///
/// Killing the idle slot, an out-of-range pid or an unused slot is refused.
/// Killing the calling process does not return.
pub fn kill(pid: Pid) -> bool {
    if pid == IDLE || pid as usize >= N_SLOTS {
        return false;
    }
    enter_critical_section();
    let was_used = {
        let mut s = SCHEDULER.lock();
        let slot = &mut s.slots[pid as usize];
        if slot.state == ProcState::Unused {
            false
        } else {
            slot.state = ProcState::Unused;
            slot.program = None;
            true
        }
    };
    if !was_used {
        leave_critical_section();
        return false;
    }

    for index in 0..mem::heap_list_length() {
        if let Some(heap) = mem::lookup_heap(index) {
            mem::free_process_memory(heap, pid);
        }
    }

    if pid == current_process() {
        // Control moves on for good; the slot is unused and the scheduler
        // will never pick it again.
        yield_now();
    }
    leave_critical_section();
    true
}

/// Give the remaining slice away voluntarily.
///
/// The caller is marked Blocked so the strategies know not to re-pick it
/// immediately, the critical-section depth is parked at zero, and the
/// scheduler tick runs as if the timer had fired. On resume the prior
/// depth (and with it the timer mask) is restored.
pub fn yield_now() {
    enter_critical_section();
    let depth = CS_DEPTH.load(Ordering::Relaxed);
    {
        let mut s = SCHEDULER.lock();
        let cur = s.current as usize;
        if s.slots[cur].state != ProcState::Unused {
            s.slots[cur].state = ProcState::Blocked;
        }
    }
    while CS_DEPTH.load(Ordering::Relaxed) > 0 {
        leave_critical_section();
    }
    tick();
    CS_DEPTH.store(depth, Ordering::Relaxed);
    timer::mask();
    leave_critical_section();
}

/// Id of the running process.
pub fn current_process() -> Pid {
    CURRENT.load(Ordering::Relaxed)
}

/// Lifecycle state of a slot.
pub fn process_state(pid: Pid) -> ProcState {
    if pid as usize >= N_SLOTS {
        return ProcState::Unused;
    }
    SCHEDULER.lock().slots[pid as usize].state
}

/// Open a critical section: the scheduler timer is masked until the
/// outermost section closes. Sections nest up to 255 deep.
pub fn enter_critical_section() {
    let depth = CS_DEPTH.load(Ordering::Relaxed);
    if depth == u8::MAX {
        error::fatal("critical section overflow");
    }
    CS_DEPTH.store(depth + 1, Ordering::Relaxed);
    timer::mask();
}

/// Close a critical section; the outermost close re-enables the scheduler
/// timer and delivers a latched firing.
pub fn leave_critical_section() {
    let depth = CS_DEPTH.load(Ordering::Relaxed);
    if depth == 0 {
        error::fatal("critical section underflow");
    }
    CS_DEPTH.store(depth - 1, Ordering::Relaxed);
    if depth == 1 {
        timer::unmask();
    }
}

/// Switch the scheduling strategy and reset its bookkeeping.
pub fn set_scheduling_strategy(strategy: SchedulingStrategy) {
    critical_section::with(|_| {
        let mut s = SCHEDULER.lock();
        s.strategy = strategy;
        match strategy {
            SchedulingStrategy::RoundRobin => {
                s.info.time_slice = s.slots[s.current as usize].priority;
            }
            SchedulingStrategy::InactiveAging => {
                s.info.age = [0; N_SLOTS];
            }
            SchedulingStrategy::MultiLevelFeedbackQueue => {
                for queue in &mut s.info.queues {
                    queue.reset();
                }
                for slot in 1..N_SLOTS {
                    if s.slots[slot].state != ProcState::Unused {
                        s.reset_process_scheduling_info(slot as Pid);
                    }
                }
            }
            _ => {}
        }
    });
}

/// The active scheduling strategy.
pub fn get_scheduling_strategy() -> SchedulingStrategy {
    SCHEDULER.lock().strategy
}

/// Run the scheduler until every non-idle slot is unused again.
///
/// The hosted counterpart of the idle program's spin: the boot context
/// yields in a loop, so every ready process gets the processor.
pub fn run_until_idle() {
    loop {
        let busy = {
            let s = SCHEDULER.lock();
            s.slots[1..].iter().any(|p| p.state != ProcState::Unused)
        };
        if !busy {
            break;
        }
        yield_now();
    }
}

// ============================================================================
// critical-section integration
// ============================================================================

// The kernel's critical sections back the `critical_section` API, so a
// `critical_section::with` block is a kernel critical section.
struct KernelCriticalSection;
critical_section::set_impl!(KernelCriticalSection);

unsafe impl critical_section::Impl for KernelCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let depth = CS_DEPTH.load(Ordering::Relaxed);
        enter_critical_section();
        depth
    }

    unsafe fn release(_prev_depth: critical_section::RawRestoreState) {
        leave_critical_section();
    }
}
