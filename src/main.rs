//! Demo entry point
//!
//! Boots the kernel on the host, spawns a handful of workers that exercise
//! both heaps and the shared-memory gate, and runs until they are done.

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use mame::mem::{self, EXT_HEAP, INT_HEAP};
use mame::sched::{self, Program};
use mame::timer;

// ============================================================================
// Console logger
// ============================================================================

struct ConsoleLog;

impl log::Log for ConsoleLog {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            println!("[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLog = ConsoleLog;

// ============================================================================
// Demo workers
// ============================================================================

/// Allocate, pattern, verify and release chunks on the internal heap.
fn int_heap_worker() {
    let pid = sched::current_process();
    for round in 0..16u16 {
        let size = 8 + (round % 5) * 6;
        let chunk = mem::alloc(&INT_HEAP, size);
        if chunk == 0 {
            log::info!("process {}: internal heap exhausted, backing off", pid);
            sched::yield_now();
            continue;
        }
        timer::fire();
        if mem::chunk_size(&INT_HEAP, chunk) != size {
            log::error!("process {}: chunk size mismatch", pid);
        }
        let grown = mem::realloc(&INT_HEAP, chunk, size + 4);
        let live = if grown != 0 { grown } else { chunk };
        mem::free(&INT_HEAP, live).ok();
        timer::fire();
    }
    log::info!("process {}: internal heap rounds done", pid);
}

/// Chase the next-fit cursor around the external heap.
fn ext_heap_worker() {
    let pid = sched::current_process();
    mem::set_allocation_strategy(&EXT_HEAP, mem::AllocStrategy::NextFit);
    let mut held = [0u16; 4];
    for round in 0..8u16 {
        for slot in held.iter_mut() {
            *slot = mem::alloc(&EXT_HEAP, 64 + round * 16);
            timer::fire();
        }
        for slot in held.iter().filter(|&&a| a != 0) {
            mem::free(&EXT_HEAP, *slot).ok();
        }
        sched::yield_now();
    }
    log::info!("process {}: external heap rounds done", pid);
}

/// Handle of the demo's shared chunk, published by the producer.
static SHARED_CHUNK: AtomicU16 = AtomicU16::new(0);
/// Bytes verified by the consumer.
static VERIFIED: AtomicU32 = AtomicU32::new(0);
/// Set once the consumer has seen every pattern.
static CONSUMED: AtomicU16 = AtomicU16::new(0);

const SHARED_LEN: u16 = 32;
const ROUNDS: u8 = 24;

/// Fill the shared chunk with one pattern byte per round.
fn shared_producer() {
    let chunk = mem::shared_alloc(&INT_HEAP, SHARED_LEN);
    if chunk == 0 {
        log::error!("shared chunk allocation failed");
        CONSUMED.store(u16::MAX, Ordering::Relaxed);
        return;
    }
    SHARED_CHUNK.store(chunk, Ordering::Relaxed);

    for round in 0..ROUNDS {
        let pattern = [0x30 + round; SHARED_LEN as usize];
        if let Err(e) = mem::shared_write(&INT_HEAP, chunk, 0, &pattern) {
            log::error!("shared write failed: {}", e);
        }
        sched::yield_now();
    }

    // Wait for the consumer before tearing the chunk down.
    while CONSUMED.load(Ordering::Relaxed) == 0 {
        sched::yield_now();
    }
    if let Err(e) = mem::shared_free(&INT_HEAP, chunk) {
        log::error!("shared free failed: {}", e);
    }
    log::info!("producer: shared chunk released");
}

/// Read the shared chunk back and check every byte agrees.
fn shared_consumer() {
    let chunk = loop {
        if CONSUMED.load(Ordering::Relaxed) == u16::MAX {
            return; // producer never got a chunk
        }
        let addr = SHARED_CHUNK.load(Ordering::Relaxed);
        if addr != 0 {
            break addr;
        }
        sched::yield_now();
    };

    let mut seen = 0u32;
    for _ in 0..ROUNDS {
        let mut buf = [0u8; SHARED_LEN as usize];
        if let Err(e) = mem::shared_read(&INT_HEAP, chunk, 0, &mut buf) {
            log::error!("shared read failed: {}", e);
            continue;
        }
        let first = buf[0];
        if buf.iter().all(|&b| b == first) {
            seen += buf.len() as u32;
        } else {
            log::error!("torn shared read: {:02x?}", &buf[..8]);
        }
        sched::yield_now();
    }
    VERIFIED.store(seen, Ordering::Relaxed);
    CONSUMED.store(1, Ordering::Relaxed);
    log::info!("consumer: {} bytes verified", seen);
}

const AUTOSTART: &[Program] = &[int_heap_worker, ext_heap_worker, shared_producer, shared_consumer];

fn main() {
    log::set_logger(&LOGGER).expect("logger installed once");
    log::set_max_level(log::LevelFilter::Info);

    sched::init(AUTOSTART);
    mem::init_heaps();
    sched::start();
    log::info!(
        "kernel up: {} heaps, {} auto-start programs",
        mem::heap_list_length(),
        AUTOSTART.len()
    );

    sched::run_until_idle();

    let mut leftovers = 0u32;
    for index in 0..mem::heap_list_length() {
        let heap = mem::lookup_heap(index).unwrap();
        let start = mem::use_start(heap);
        for offset in 0..mem::use_size(heap) {
            if mem::map_entry(heap, start + offset) != 0 {
                leftovers += 1;
            }
        }
    }
    log::info!(
        "all programs finished after {} ticks; {} map entries still in use",
        timer::ticks(),
        leftovers
    );
}
