//! Deterministic RNG wrapper, opaque state blobs and seed-derivation helpers.

use std::hash::Hasher;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::errors::{BmcError, ErrorInfo};

/// Number of integer words in a ChaCha12 state blob: four seed words, the
/// stream id and the 128-bit word position split into two halves.
const CHACHA_STATE_WORDS: usize = 7;

/// Deterministic RNG handle used by the chain, operators and checkpoints.
///
/// The handle wraps ChaCha12 (the generator behind `rand::rngs::StdRng`) so
/// that its complete position can be captured as an [`RngState`] and restored
/// bit-for-bit. Substreams are derived by hashing `(master_seed, substream_id)`
/// with SipHash-1-3 configured with fixed zero keys.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: ChaCha12Rng,
}

/// Opaque serialized generator state.
///
/// The checkpoint format only sees a list of integers; their meaning belongs
/// to the generator, so the algorithm can change without touching the outer
/// record structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    words: Vec<u64>,
}

impl RngState {
    /// Wraps raw words read from a checkpoint.
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Raw words suitable for writing to a checkpoint.
    pub fn words(&self) -> &[u64] {
        &self.words
    }
}

impl RngHandle {
    /// Seeds a fresh stream.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }

    /// Captures the exact generator position.
    pub fn state(&self) -> RngState {
        let seed = self.rng.get_seed();
        let mut words = Vec::with_capacity(CHACHA_STATE_WORDS);
        for chunk in seed.chunks_exact(8) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            words.push(u64::from_le_bytes(bytes));
        }
        words.push(self.rng.get_stream());
        let pos = self.rng.get_word_pos();
        words.push((pos >> 64) as u64);
        words.push(pos as u64);
        RngState { words }
    }

    /// Rebuilds a handle positioned exactly where `state` was captured.
    pub fn from_state(state: &RngState) -> Result<Self, BmcError> {
        if state.words.len() != CHACHA_STATE_WORDS {
            return Err(BmcError::Rng(
                ErrorInfo::new("rng-state-shape", "unexpected number of rng state words")
                    .with_context("expected", CHACHA_STATE_WORDS.to_string())
                    .with_context("found", state.words.len().to_string()),
            ));
        }
        let mut seed = [0u8; 32];
        for (idx, word) in state.words[..4].iter().enumerate() {
            seed[idx * 8..(idx + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        let mut rng = ChaCha12Rng::from_seed(seed);
        rng.set_stream(state.words[4]);
        let pos = (u128::from(state.words[5]) << 64) | u128::from(state.words[6]);
        rng.set_word_pos(pos);
        Ok(Self { rng })
    }

    /// Uniform draw in the open interval `(0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        loop {
            let value: f64 = self.rng.gen();
            if value > 0.0 {
                return value;
            }
        }
    }

    /// Uniform index in `0..upper`; `upper` must be non-zero.
    pub fn index(&mut self, upper: usize) -> usize {
        self.rng.gen_range(0..upper)
    }

    /// Direct access to the ChaCha generator.
    pub fn inner_mut(&mut self) -> &mut ChaCha12Rng {
        &mut self.rng
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Seed of substream `substream` under `master_seed`. Stable across platforms.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
