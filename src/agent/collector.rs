//! Host metric sampling for the agent.
//!
//! Every poll refreshes the OS counters through `sysinfo`, stores them as
//! gauges and bumps the `PollCount` counter. A snapshot hands out the
//! current gauges plus the counter increase since the previous snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;
use sysinfo::System;
use tracing::trace;

use crate::{MetricSet, MetricValue};

pub const POLL_COUNT: &str = "PollCount";
pub const RANDOM_VALUE: &str = "RandomValue";

#[derive(Debug, Default)]
struct CollectorState {
    gauges: HashMap<String, f64>,
    poll_count: i64,
    reported_poll_count: i64,
}

pub struct Collector {
    system: Mutex<System>,
    state: Mutex<CollectorState>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            state: Mutex::new(CollectorState::default()),
        }
    }

    /// Sample the host and record the readings.
    pub fn poll(&self) {
        let readings = match self.system.lock() {
            Ok(mut sys) => sample(&mut sys),
            Err(poisoned) => sample(&mut poisoned.into_inner()),
        };

        let mut state = self.lock_state();
        state.gauges.extend(readings);
        state
            .gauges
            .insert(RANDOM_VALUE.to_string(), rand::thread_rng().r#gen::<f64>());
        state.poll_count += 1;

        trace!("poll #{} recorded {} gauges", state.poll_count, state.gauges.len());
    }

    /// Current gauges plus the `PollCount` increase since the last snapshot.
    pub fn snapshot(&self) -> MetricSet {
        let mut state = self.lock_state();

        let mut metrics: MetricSet = state
            .gauges
            .iter()
            .map(|(name, value)| (name.clone(), MetricValue::Gauge(*value)))
            .collect();

        let delta = state.poll_count - state.reported_poll_count;
        if delta > 0 {
            metrics.insert(POLL_COUNT.to_string(), MetricValue::Counter(delta));
            state.reported_poll_count = state.poll_count;
        }

        metrics
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sample(sys: &mut System) -> Vec<(String, f64)> {
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    let mut readings = vec![
        ("TotalMemory".to_string(), sys.total_memory() as f64),
        ("UsedMemory".to_string(), sys.used_memory() as f64),
        ("FreeMemory".to_string(), sys.free_memory() as f64),
        ("AvailableMemory".to_string(), sys.available_memory() as f64),
        ("TotalSwap".to_string(), sys.total_swap() as f64),
        ("UsedSwap".to_string(), sys.used_swap() as f64),
    ];

    let cpus = sys.cpus();
    if !cpus.is_empty() {
        let usage_sum: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum();
        readings.push((
            "CPUutilization".to_string(),
            f64::from(usage_sum / cpus.len() as f32),
        ));
    }
    readings.extend(
        cpus.iter()
            .enumerate()
            .map(|(i, cpu)| (format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage()))),
    );

    let load = System::load_average();
    readings.push(("LoadAverage1".to_string(), load.one));
    readings.push(("LoadAverage5".to_string(), load.five));

    readings
}
