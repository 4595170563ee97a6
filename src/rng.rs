//! Pseudo random number generator
//!
//! A small xorshift generator backing the random scheduling strategy. Not
//! cryptographic; it only has to spread process picks evenly enough that no
//! ready slot starves.

use core::sync::atomic::{AtomicU32, Ordering};

/// Generator state. Never zero (xorshift has a fixed point at 0).
static STATE: AtomicU32 = AtomicU32::new(0x2545_F491);

/// Reseed the generator. A zero seed is nudged to keep the state valid.
pub fn seed(value: u32) {
    STATE.store(if value == 0 { 0x2545_F491 } else { value }, Ordering::Relaxed);
}

/// Next value of the xorshift32 sequence.
pub fn next_u32() -> u32 {
    let mut x = STATE.load(Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    STATE.store(x, Ordering::Relaxed);
    x
}

/// Narrowed variant for small modulus picks.
pub fn next_u16() -> u16 {
    (next_u32() >> 16) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_not_constant() {
        seed(1);
        let a = next_u32();
        let b = next_u32();
        let c = next_u32();
        assert!(a != b || b != c);
    }

    #[test]
    fn zero_seed_is_rejected() {
        seed(0);
        assert_ne!(next_u32(), 0);
    }
}
