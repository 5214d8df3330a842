// File: testing-framework/src/orchestrator/rng.rs
//
// Seeded RNG
//
// Relayer key material and generated correlation labels come from this RNG so
// a failing run can be replayed with the same wallets and labels.

use parking_lot::Mutex;
use rand::distributions::{uniform::SampleUniform, Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::ops::Range;

/// Environment variable used to pin the seed of a test run
pub const SEED_ENV_VAR: &str = "INTERCHAIN_TEST_SEED";

/// Thread-safe seeded RNG
///
/// The seed is logged on creation. Replay a run with:
///
/// ```text
/// INTERCHAIN_TEST_SEED=0xa3f5c8e1b2d94706 cargo test ...
/// ```
pub struct TestRng {
    seed: u64,
    inner: Mutex<StdRng>,
}

impl TestRng {
    /// Create an RNG with an explicit seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Use `INTERCHAIN_TEST_SEED` when set (decimal or `0x` hex), otherwise a
    /// random seed
    pub fn new_from_env_or_random() -> Self {
        let seed = std::env::var(SEED_ENV_VAR)
            .ok()
            .and_then(|raw| parse_seed(&raw))
            .unwrap_or_else(|| rand::thread_rng().gen());

        log::info!("TestRng seed: 0x{:016x}", seed);
        log::info!("   Replay: {}=0x{:016x} cargo test ...", SEED_ENV_VAR, seed);

        Self::with_seed(seed)
    }

    /// The seed this RNG was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random value
    pub fn gen<T>(&self) -> T
    where
        Standard: Distribution<T>,
    {
        self.inner.lock().gen()
    }

    /// Generate a random value in `range`
    pub fn gen_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.inner.lock().gen_range(range)
    }

    /// Fill `dest` with random bytes
    pub fn fill_bytes(&self, dest: &mut [u8]) {
        self.inner.lock().fill_bytes(dest)
    }

    /// Random lowercase hex string of `bytes` bytes (`2 * bytes` characters)
    pub fn hex_string(&self, bytes: usize) -> String {
        let mut buf = vec![0u8; bytes];
        self.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => raw.parse().ok(),
    }
}

impl std::fmt::Debug for TestRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRng")
            .field("seed", &format_args!("0x{:016x}", self.seed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = TestRng::with_seed(42);
        let b = TestRng::with_seed(42);

        let va: Vec<u64> = (0..8).map(|_| a.gen()).collect();
        let vb: Vec<u64> = (0..8).map(|_| b.gen()).collect();
        assert_eq!(va, vb);
    }

    #[test]
    fn test_hex_string_length() {
        let rng = TestRng::with_seed(7);
        let s = rng.hex_string(16);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_parse_seed_formats() {
        assert_eq!(parse_seed("0xff"), Some(255));
        assert_eq!(parse_seed("  12 "), Some(12));
        assert_eq!(parse_seed("nope"), None);
    }
}
