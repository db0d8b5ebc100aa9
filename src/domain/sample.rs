use super::Event;

/// The sampler's verdict for one event (or raw line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDecision {
    pub keep: bool,
    /// Rate that was applied; never below 1.
    pub rate: u32,
}

impl SampleDecision {
    pub fn new(keep: bool, rate: u32) -> Self {
        Self {
            keep,
            rate: rate.max(1),
        }
    }

    pub fn keep_all() -> Self {
        Self { keep: true, rate: 1 }
    }
}

/// A kept event together with the rate it was sampled at, so the backend
/// can weight it back to a true count.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledEvent {
    pub event: Event,
    pub rate: u32,
}

impl SampledEvent {
    pub fn new(event: Event, rate: u32) -> Self {
        Self {
            event,
            rate: rate.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_floor_is_one() {
        assert_eq!(SampleDecision::new(true, 0).rate, 1);
        assert_eq!(SampledEvent::new(Event::new(), 0).rate, 1);
        assert_eq!(SampleDecision::new(false, 7).rate, 7);
    }
}
