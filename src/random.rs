use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Owned source of random codes and identifiers. Callers hold and pass an
/// instance; there is no process-wide generator to initialise.
pub struct CodeGenerator {
    rng: StdRng,
}

impl CodeGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Numeric verification code of `len` digits.
    pub fn verification_code(&mut self, len: usize) -> String {
        self.pick(DIGITS, len)
    }

    /// ASCII alphanumeric string of `len` chars.
    pub fn random_string(&mut self, len: usize) -> String {
        self.pick(ALPHANUMERIC, len)
    }

    fn pick(&mut self, alphabet: &[u8], len: usize) -> String {
        (0..len)
            .map(|_| alphabet[self.rng.gen_range(0..alphabet.len())] as char)
            .collect()
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
