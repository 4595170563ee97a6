//! Scheduling strategies
//!
//! Six selection functions the timer tick dispatches on. Every strategy
//! consumes the process table and the id of the running process and answers
//! the id to run next; the idle slot is returned only when nothing else is
//! eligible. Blocked slots are woken exactly as each strategy prescribes and
//! nowhere else.

use crate::config::{IDLE, MLFQ_SLICES, N_QUEUES, N_SLOTS};
use crate::rng;
use crate::sched::queue::ProcessQueue;
use crate::sched::{Pid, ProcState, Process};

/// Selectable scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    Even,
    Random,
    RoundRobin,
    InactiveAging,
    RunToCompletion,
    MultiLevelFeedbackQueue,
}

/// Strategy bookkeeping with kernel-long lifetime.
pub(crate) struct SchedulingInfo {
    /// Remaining ticks of the round-robin slice.
    pub time_slice: u8,
    /// Inactive-aging accumulator per slot.
    pub age: [u16; N_SLOTS],
    /// Remaining ticks of each slot in its current feedback queue.
    pub slice_mlfq: [u8; N_SLOTS],
    /// One ring per priority class.
    pub queues: [ProcessQueue; N_QUEUES],
}

impl SchedulingInfo {
    pub const fn new() -> Self {
        Self {
            time_slice: 0,
            age: [0; N_SLOTS],
            slice_mlfq: [0; N_SLOTS],
            queues: [ProcessQueue::new(); N_QUEUES],
        }
    }
}

/// Feedback queue index for a priority: the two high bits, inverted so the
/// most favourable priorities land in queue 0.
pub(crate) fn queue_class(priority: u8) -> usize {
    3 - (priority >> 6) as usize
}

/// Default time slice of a feedback queue.
pub(crate) fn default_slice(class: usize) -> u8 {
    MLFQ_SLICES[class]
}

/// Even: wrap-scan for the next Ready slot after `current`, skipping idle.
/// A Blocked slot found on the way becomes Ready and the scan restarts, so
/// every newly woken process is eligible immediately.
pub(crate) fn even(slots: &mut [Process; N_SLOTS], current: Pid) -> Pid {
    'scan: loop {
        for i in 1..=N_SLOTS {
            let cand = (current as usize + i) % N_SLOTS;
            match slots[cand].state {
                ProcState::Blocked => {
                    slots[cand].state = ProcState::Ready;
                    continue 'scan;
                }
                ProcState::Ready if cand != IDLE as usize => return cand as Pid,
                _ => {}
            }
        }
        return IDLE;
    }
}

/// Random: uniform pick over the Ready and Blocked non-idle slots. Picking
/// a Blocked slot wakes it and reruns the selection.
pub(crate) fn random(slots: &mut [Process; N_SLOTS], _current: Pid) -> Pid {
    let eligible = slots[1..]
        .iter()
        .filter(|p| matches!(p.state, ProcState::Ready | ProcState::Blocked))
        .count();
    if eligible == 0 {
        return IDLE;
    }
    'retry: loop {
        let mut pick = rng::next_u16() as usize % eligible;
        for i in 1..N_SLOTS {
            match slots[i].state {
                ProcState::Ready => {
                    if pick == 0 {
                        return i as Pid;
                    }
                    pick -= 1;
                }
                ProcState::Blocked => {
                    if pick == 0 {
                        slots[i].state = ProcState::Ready;
                        continue 'retry;
                    }
                    pick -= 1;
                }
                _ => {}
            }
        }
    }
}

/// Round-robin: the current process keeps running until its slice (seeded
/// from its priority) drains, then Even picks the next one.
pub(crate) fn round_robin(
    slots: &mut [Process; N_SLOTS],
    info: &mut SchedulingInfo,
    current: Pid,
) -> Pid {
    info.time_slice = info.time_slice.wrapping_sub(1);
    if info.time_slice != 0 && slots[current as usize].state == ProcState::Ready {
        return current;
    }
    let next = even(slots, current);
    info.time_slice = slots[next as usize].priority;
    next
}

/// Inactive-aging: every waiting slot accumulates its priority; the oldest
/// slot wins (ties: higher priority, then lower id) and its age restarts at
/// its priority. Blocked slots wake in bulk on every call.
pub(crate) fn inactive_aging(
    slots: &mut [Process; N_SLOTS],
    info: &mut SchedulingInfo,
    current: Pid,
) -> Pid {
    for i in 1..N_SLOTS {
        if slots[i].state == ProcState::Blocked {
            slots[i].state = ProcState::Ready;
        }
    }
    for i in 1..N_SLOTS {
        if slots[i].state == ProcState::Ready && i != current as usize {
            info.age[i] = info.age[i].saturating_add(slots[i].priority as u16);
        }
    }

    let mut winner = 0usize;
    for i in 1..N_SLOTS {
        if slots[i].state != ProcState::Ready {
            continue;
        }
        if winner == 0
            || info.age[i] > info.age[winner]
            || (info.age[i] == info.age[winner] && slots[i].priority > slots[winner].priority)
        {
            winner = i;
        }
    }
    if winner == 0 {
        return IDLE;
    }
    info.age[winner] = slots[winner].priority as u16;
    winner as Pid
}

/// Run-to-completion: the current process keeps the processor for as long
/// as it stays Ready; afterwards Even takes over.
pub(crate) fn run_to_completion(slots: &mut [Process; N_SLOTS], current: Pid) -> Pid {
    if current != IDLE && slots[current as usize].state == ProcState::Ready {
        return current;
    }
    even(slots, current)
}

/// Multi-level feedback queue: scan the queues from the most favourable
/// class down. Unused and idle heads are dropped; a head with a drained
/// slice is demoted one class (waking it if Blocked) and the scan restarts;
/// a Blocked head wakes, rotates to the back of its queue, and the scan
/// restarts. The first Ready head pays one slice tick and runs. Idle is
/// returned only after a full traversal that performed no rotations.
pub(crate) fn mlfq(
    slots: &mut [Process; N_SLOTS],
    info: &mut SchedulingInfo,
    _current: Pid,
) -> Pid {
    'restart: loop {
        for class in 0..N_QUEUES {
            loop {
                let Some(pid) = info.queues[class].peek_first() else {
                    break;
                };
                let slot = pid as usize;
                if slot >= N_SLOTS || pid == IDLE || slots[slot].state == ProcState::Unused {
                    info.queues[class].drop_first();
                    continue;
                }
                if info.slice_mlfq[slot] == 0 {
                    info.queues[class].drop_first();
                    if slots[slot].state == ProcState::Blocked {
                        slots[slot].state = ProcState::Ready;
                    }
                    let demoted = (class + 1).min(N_QUEUES - 1);
                    info.slice_mlfq[slot] = default_slice(demoted);
                    if info.queues[demoted].append(pid).is_err() {
                        log::error!("feedback queue {} overflow", demoted);
                    }
                    continue 'restart;
                }
                match slots[slot].state {
                    ProcState::Ready | ProcState::Running => {
                        info.slice_mlfq[slot] -= 1;
                        return pid;
                    }
                    ProcState::Blocked => {
                        slots[slot].state = ProcState::Ready;
                        info.queues[class].drop_first();
                        if info.queues[class].append(pid).is_err() {
                            log::error!("feedback queue {} overflow", class);
                        }
                        continue 'restart;
                    }
                    ProcState::Unused => unreachable!(),
                }
            }
        }
        return IDLE;
    }
}
