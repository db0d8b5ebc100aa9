//! Average-with-minimum dynamic sampling.
//!
//! Keys are counted over a fixed window. When a window closes, each key
//! seen in it gets a rate chosen so that frequent keys are sampled harder
//! than rare ones, while the traffic-weighted average approaches the goal
//! rate. Decisions during a window use the rates of the window before it;
//! a key not seen in that window is kept at rate 1 (or the floor).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynSamplerSettings {
    pub goal_rate: u32,
    pub window: Duration,
    /// Below this many events per second in a window every key gets rate 1.
    pub min_events_per_sec: u32,
    /// Floor applied to every assigned rate.
    pub min_rate: u32,
}

impl Default for DynSamplerSettings {
    fn default() -> Self {
        Self {
            goal_rate: 10,
            window: Duration::from_secs(30),
            min_events_per_sec: 50,
            min_rate: 1,
        }
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    counts: HashMap<String, u64>,
    rates: HashMap<String, u32>,
}

/// Dynamic sampler state shared by every source lineage.
#[derive(Debug, Clone)]
pub struct DynSamplerState {
    settings: DynSamplerSettings,
    window: Arc<Mutex<Window>>,
}

impl DynSamplerState {
    pub fn new(settings: DynSamplerSettings) -> Self {
        Self::starting_at(settings, Instant::now())
    }

    pub fn starting_at(settings: DynSamplerSettings, now: Instant) -> Self {
        Self {
            settings: DynSamplerSettings {
                goal_rate: settings.goal_rate.max(1),
                min_rate: settings.min_rate.max(1),
                ..settings
            },
            window: Arc::new(Mutex::new(Window {
                started: now,
                counts: HashMap::new(),
                rates: HashMap::new(),
            })),
        }
    }

    pub fn settings(&self) -> &DynSamplerSettings {
        &self.settings
    }

    pub fn get_rate(&self, key: &str) -> u32 {
        self.get_rate_at(key, Instant::now())
    }

    /// Record one occurrence of `key` at `now` and return its current rate.
    pub fn get_rate_at(&self, key: &str, now: Instant) -> u32 {
        let mut window = self.window.lock();

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.settings.window {
            window.rates = if elapsed >= self.settings.window * 2 {
                // the window that just closed is not the previous one
                HashMap::new()
            } else {
                compute_rates(&window.counts, &self.settings)
            };
            window.counts.clear();
            window.started = now;
            tracing::debug!(keys = window.rates.len(), "Dynamic sampler window rotated");
        }

        *window.counts.entry(key.to_string()).or_insert(0) += 1;
        window
            .rates
            .get(key)
            .copied()
            .unwrap_or(1)
            .max(self.settings.min_rate)
    }
}

fn compute_rates(counts: &HashMap<String, u64>, settings: &DynSamplerSettings) -> HashMap<String, u32> {
    let floor = settings.min_rate;
    if counts.is_empty() {
        return HashMap::new();
    }

    let total: u64 = counts.values().sum();
    let threshold = u64::from(settings.min_events_per_sec) * settings.window.as_secs().max(1);
    if total < threshold {
        return counts.keys().map(|k| (k.clone(), floor)).collect();
    }

    let goal_count = total as f64 / f64::from(settings.goal_rate);
    let log_sum: f64 = counts.values().map(|&c| (c as f64).log10()).sum();
    if log_sum <= 0.0 {
        // every key seen exactly once
        return counts.keys().map(|k| (k.clone(), floor)).collect();
    }
    let goal_ratio = goal_count / log_sum;

    let mut keys: Vec<&String> = counts.keys().collect();
    keys.sort();

    let mut rates = HashMap::with_capacity(keys.len());
    let mut remaining = keys.len();
    let mut extra = 0.0_f64;
    for key in keys {
        let count = counts[key] as f64;
        let mut goal_for_key = (count.log10() * goal_ratio).max(1.0);
        let share = extra / remaining as f64;
        goal_for_key += share;
        extra -= share;
        remaining -= 1;

        let rate = if count <= goal_for_key {
            extra += goal_for_key - count;
            1
        } else {
            let rate = (count / goal_for_key).ceil();
            extra += goal_for_key - count / rate;
            rate as u32
        };
        rates.insert(key.clone(), rate.max(floor));
    }
    rates
}
