//! Per-register input pattern generator
//!
//! An infinite lazy sequence of byte patterns sized to one register. Each
//! cycle starts with a deterministic corner-case phase (zero, all-ones,
//! boundary bytes, a walking single bit, alternating masks) and then falls
//! into PRNG-driven fills. `advance` reports when a cycle wraps so the
//! search loop can carry advancement into the next generator.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// How many random fills follow the corner phase before the cycle wraps.
/// Kept short enough that carry-chained generators still cycle within the
/// search loop's attempt budget.
fn random_phase_len(width_bits: usize) -> usize {
    width_bits.max(16)
}

pub struct InputGenerator {
    width_bytes: usize,
    corner: Vec<Vec<u8>>,
    random_len: usize,
    /// Position within the current cycle: corner patterns first, then
    /// `random_len` PRNG fills.
    position: usize,
    current: Vec<u8>,
    rng: StdRng,
}

impl InputGenerator {
    /// Create a generator for a register of `width_bits`, seeded from the
    /// instruction PRNG so runs stay reproducible.
    pub fn new(width_bits: usize, seed_rng: &mut StdRng) -> Self {
        let width_bytes = width_bits / 8;
        let corner = corner_patterns(width_bytes);
        let current = corner[0].clone();
        Self {
            width_bytes,
            corner,
            random_len: random_phase_len(width_bits),
            position: 0,
            current,
            rng: StdRng::seed_from_u64(seed_rng.next_u64()),
        }
    }

    /// The pattern for the current trial.
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// Move to the next pattern. Returns `true` iff the cycle wrapped back
    /// to the corner phase.
    pub fn advance(&mut self) -> bool {
        self.position += 1;
        let cycle_len = self.corner.len() + self.random_len;
        let rolled = self.position >= cycle_len;
        if rolled {
            self.position = 0;
        }

        if self.position < self.corner.len() {
            self.current = self.corner[self.position].clone();
        } else {
            self.rng.fill_bytes(&mut self.current);
        }
        rolled
    }

    /// Register width in bytes, as staged into the context.
    pub fn width_bytes(&self) -> usize {
        self.width_bytes
    }
}

/// The deterministic corner-case phase: values most likely to flip carry
/// chains, sign bits and parity.
fn corner_patterns(width_bytes: usize) -> Vec<Vec<u8>> {
    let w = width_bytes.max(1);
    let mut patterns = Vec::new();

    patterns.push(vec![0x00; w]);
    patterns.push(vec![0xFF; w]);

    // MSB only, LSB only.
    let mut msb = vec![0x00; w];
    msb[w - 1] = 0x80;
    patterns.push(msb);
    let mut lsb = vec![0x00; w];
    lsb[0] = 0x01;
    patterns.push(lsb);

    // Signed maximum.
    let mut smax = vec![0xFF; w];
    smax[w - 1] = 0x7F;
    patterns.push(smax);

    // Walking single bit across the full width.
    for bit in 0..w * 8 {
        let mut p = vec![0x00; w];
        p[bit / 8] = 1 << (bit % 8);
        patterns.push(p);
    }

    // Alternating bit and byte masks.
    patterns.push(vec![0x55; w]);
    patterns.push(vec![0xAA; w]);
    patterns.push(
        (0..w)
            .map(|i| if i % 2 == 0 { 0xFF } else { 0x00 })
            .collect(),
    );
    patterns.push(
        (0..w)
            .map(|i| if i % 2 == 0 { 0x00 } else { 0xFF })
            .collect(),
    );

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(width_bits: usize, seed: u64) -> InputGenerator {
        let mut rng = StdRng::seed_from_u64(seed);
        InputGenerator::new(width_bits, &mut rng)
    }

    #[test]
    fn test_pattern_width() {
        for bits in [8usize, 16, 32, 64, 128] {
            let g = make(bits, 1);
            assert_eq!(g.current().len(), bits / 8);
            assert_eq!(g.width_bytes(), bits / 8);
        }
    }

    #[test]
    fn test_corner_phase_starts_with_extremes() {
        let mut g = make(32, 7);
        assert_eq!(g.current(), &[0x00, 0x00, 0x00, 0x00]);
        g.advance();
        assert_eq!(g.current(), &[0xFF, 0xFF, 0xFF, 0xFF]);
        g.advance();
        assert_eq!(g.current(), &[0x00, 0x00, 0x00, 0x80]);
        g.advance();
        assert_eq!(g.current(), &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_walking_bit_is_present() {
        let mut g = make(16, 3);
        let mut seen = Vec::new();
        for _ in 0..64 {
            seen.push(g.current().to_vec());
            g.advance();
        }
        for bit in 0..16 {
            let mut expect = vec![0u8; 2];
            expect[bit / 8] = 1 << (bit % 8);
            assert!(seen.contains(&expect), "missing walking bit {bit}");
        }
    }

    #[test]
    fn test_advance_signals_rollover_once_per_cycle() {
        let mut g = make(8, 9);
        let mut rollovers = 0;
        let mut steps_to_first = None;
        for step in 0..2000 {
            if g.advance() {
                rollovers += 1;
                if steps_to_first.is_none() {
                    steps_to_first = Some(step + 1);
                }
            }
        }
        assert!(rollovers >= 2);
        // Cycle length is fixed, so rollovers are evenly spaced.
        let first = steps_to_first.unwrap();
        assert_eq!(2000 / first, rollovers);
    }

    #[test]
    fn test_rollover_restarts_corner_phase() {
        let mut g = make(8, 11);
        while !g.advance() {}
        assert_eq!(g.current(), &[0x00]);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = make(32, 42);
        let mut b = make(32, 42);
        for _ in 0..500 {
            assert_eq!(a.current(), b.current());
            a.advance();
            b.advance();
        }
    }

    #[test]
    fn test_infinite_and_never_empty() {
        let mut g = make(64, 5);
        for _ in 0..5000 {
            assert_eq!(g.current().len(), 8);
            g.advance();
        }
    }
}
