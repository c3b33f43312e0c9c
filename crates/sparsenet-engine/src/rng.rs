//! Seeded, reproducible randomness passed explicitly through a run

use rand::{Error as RandError, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal};

/// Deterministic random source for one simulation run.
///
/// The same seed and the same sequence of draw requests always produce the
/// same values, on any platform. There is no process-wide generator: every
/// component that needs randomness receives a `&mut RandomStream`.
#[derive(Debug, Clone)]
pub struct RandomStream {
    seed: u64,
    stream: u64,
    rng: ChaCha8Rng,
    draws: u64,
}

impl RandomStream {
    /// Create a stream from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            stream: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Independent stream sharing this seed, selected by `stream_id`.
    ///
    /// The parent is left untouched.
    pub fn derive(&self, stream_id: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream_id);
        Self {
            seed: self.seed,
            stream: stream_id,
            rng,
            draws: 0,
        }
    }

    /// Seed this stream was created from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Stream selector (0 for the root stream)
    pub fn stream_id(&self) -> u64 {
        self.stream
    }

    /// Number of 32/64-bit words drawn so far
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform value in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }

    /// Uniform value in [low, high)
    pub fn uniform_range(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.uniform()
    }

    /// True with probability `p`
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Uniform index in [0, n)
    pub fn index(&mut self, n: usize) -> usize {
        self.gen_range(0..n)
    }

    /// Normally distributed value
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(dist) => dist.sample(self),
            Err(_) => mean,
        }
    }

    /// Exponentially distributed interval for a process of the given rate
    pub fn exponential(&mut self, rate: f64) -> f64 {
        match Exp::new(rate) {
            Ok(dist) => dist.sample(self),
            Err(_) => f64::INFINITY,
        }
    }
}

impl RngCore for RandomStream {
    fn next_u32(&mut self) -> u32 {
        self.draws += 1;
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws += 1;
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.draws += 1;
        self.rng.try_fill_bytes(dest)
    }
}
