//! Synthetic telemetry for robots that have no radio attached.
//!
//! Records go through [`DeviceStore::apply`] exactly like real packets, so
//! liveness, history and snapshots behave the same for simulated robots.
use crate::device::DeviceId;
use crate::protocol::{Flags, TelemetryRecord, NO_DISTANCE};
use crate::store::DeviceStore;
use log::{info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

const STATES: [&str; 4] = ["FOLLOW_LINE", "TURNING_LEFT", "TURNING_RIGHT", "AVOIDING"];
const POSITIONS: [&str; 5] = ["CENTER", "LEFT_LINE", "RIGHT_LINE", "T_JUNC", "NO_LINE"];

#[derive(Debug, Clone, Copy, Default)]
struct Odometer {
    left: i64,
    right: i64,
}

pub struct Simulator {
    store: Arc<DeviceStore>,
    devices: Vec<DeviceId>,
    interval: Duration,
    rng: StdRng,
    odometers: HashMap<DeviceId, Odometer>,
}

impl Simulator {
    /// Unknown robot names are skipped with a warning.
    pub fn new(store: Arc<DeviceStore>, devices: &[String], interval: Duration) -> Self {
        let devices = devices
            .iter()
            .filter_map(|name| match store.devices().get(name) {
                Some(id) => Some(id.clone()),
                None => {
                    warn!("Simulator: '{}' is not a configured device, skipping", name);
                    None
                }
            })
            .collect();
        Self {
            store,
            devices,
            interval,
            rng: StdRng::from_entropy(),
            odometers: HashMap::new(),
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Synthesize the next packet for one robot, `elapsed` into the run.
    pub fn next_record(&mut self, id: &DeviceId, elapsed: Duration) -> TelemetryRecord {
        let secs = elapsed.as_secs();
        let rng = &mut self.rng;
        let state = if rng.gen_bool(0.1) {
            STATES[rng.gen_range(0..STATES.len())]
        } else {
            "FOLLOW_LINE"
        };
        let line_position = if rng.gen_bool(0.15) {
            POSITIONS[rng.gen_range(0..POSITIONS.len())]
        } else {
            "CENTER"
        };
        let speed = rng.gen_range(160..=200);
        let left_step = rng.gen_range(5..=15);
        let right_step = rng.gen_range(5..=15);
        let distance = if rng.gen_bool(0.1) {
            rng.gen_range(10..=30)
        } else {
            NO_DISTANCE
        };

        let odo = self.odometers.entry(id.clone()).or_default();
        odo.left += left_step;
        odo.right += right_step;

        TelemetryRecord {
            device: id.clone(),
            uptime: format!("{}s", secs),
            state: state.to_string(),
            line_position: line_position.to_string(),
            speed,
            left_ticks: odo.left,
            right_ticks: odo.right,
            distance,
            flags: Some(Flags {
                calibrated: secs > 5,
                cone_picked: secs > 8,
                game_started: secs > 10,
                ..Flags::default()
            }),
        }
    }

    /// One round: a packet per simulated robot.
    pub fn step(&mut self, elapsed: Duration) {
        for id in self.devices.clone() {
            let record = self.next_record(&id, elapsed);
            trace!("SIM: {}", record.to_line());
            if let Err(e) = self.store.apply(&record) {
                warn!("Simulator could not apply record for {}: {}", id, e);
            }
        }
    }

    pub async fn run(mut self) {
        if self.devices.is_empty() {
            info!("Simulator has no devices; not starting");
            return;
        }
        info!(
            "Simulating {:?} every {}ms",
            self.devices,
            self.interval.as_millis()
        );
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.step(started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceSet;
    use crate::store::StoreSettings;

    fn simulator() -> Simulator {
        let store = Arc::new(DeviceStore::new(
            DeviceSet::new(["R1", "R2", "R3"]),
            StoreSettings::default(),
        ));
        Simulator::new(
            store,
            &["R1".to_string(), "R3".to_string(), "R7".to_string()],
            Duration::from_millis(500),
        )
        .with_seed(7)
    }

    #[test]
    fn skips_unknown_devices() {
        let sim = simulator();
        let names: Vec<&str> = sim.devices().iter().map(DeviceId::as_str).collect();
        assert_eq!(names, ["R1", "R3"]);
    }

    #[test]
    fn records_stay_in_range_and_ticks_accumulate() {
        let mut sim = simulator();
        let id = sim.devices()[0].clone();
        let mut last_left = 0;
        for i in 0..50 {
            let rec = sim.next_record(&id, Duration::from_millis(i * 500));
            assert!((160..=200).contains(&rec.speed));
            assert!(rec.distance == NO_DISTANCE || (10..=30).contains(&rec.distance));
            assert!((5..=15).contains(&(rec.left_ticks - last_left)));
            last_left = rec.left_ticks;
        }
    }

    #[test]
    fn flags_follow_elapsed_time() {
        let mut sim = simulator();
        let id = sim.devices()[0].clone();
        let early = sim.next_record(&id, Duration::from_secs(3)).flags.unwrap();
        assert_eq!(early, Flags::default());
        let mid = sim.next_record(&id, Duration::from_secs(9)).flags.unwrap();
        assert!(mid.calibrated && mid.cone_picked && !mid.game_started);
        let late = sim.next_record(&id, Duration::from_secs(11)).flags.unwrap();
        assert!(late.game_started);
    }

    #[test]
    fn step_applies_through_store() {
        let mut sim = simulator();
        sim.step(Duration::from_secs(1));
        let state = sim.store.state("R3").unwrap();
        assert!(state.connected);
        assert_eq!(state.history.len(), 1);
        assert!(!sim.store.state("R2").unwrap().connected);
    }
}
