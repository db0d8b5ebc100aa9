use rand::Rng;
use rand::rngs::StdRng;

/// Keep one in `rate` items, chosen uniformly at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSampler {
    rate: u32,
}

impl StaticSampler {
    pub fn new(rate: u32) -> Self {
        Self { rate: rate.max(1) }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn is_disabled(&self) -> bool {
        self.rate == 1
    }

    pub fn keep(&self, rng: &mut StdRng) -> bool {
        keep_one_in(self.rate, rng)
    }
}

pub(crate) fn keep_one_in(rate: u32, rng: &mut StdRng) -> bool {
    rate <= 1 || rng.random_range(0..rate) == 0
}
