/*!
 * Reading sources for simulated accessories.
 *
 * Sensors and controllers do not invent their own readings; they pull them
 * from a source. The seeded sources produce plausible, reproducible noise
 * and the scripted ones replay fixed fixtures for tests.
 */
use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One temperature and humidity reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            humidity: 50.0,
        }
    }
}

/// Produces temperature and humidity readings
pub trait SampleSource: Send + Sync + Debug {
    /// Take the next reading
    fn next_sample(&mut self) -> Sample;
}

/// Temperature range of the drift simulation
pub const TEMPERATURE_RANGE: (f64, f64) = (10.0, 40.0);

/// Humidity range of the drift simulation
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A random walk that moves at most once per interval
#[derive(Debug, Clone)]
pub struct SimulatedDrift {
    rng: ChaCha8Rng,
    current: Sample,
    interval: Duration,
    last_update: Instant,
}

impl SimulatedDrift {
    /// Create a drift source starting from the default reading
    pub fn new(seed: u64, interval: Duration) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            current: Sample::default(),
            interval,
            last_update: Instant::now(),
        }
    }

    /// Start from a different reading
    pub fn starting_at(mut self, sample: Sample) -> Self {
        self.current = sample;
        self
    }

    fn step(&mut self) {
        let temperature = self.current.temperature + self.rng.gen_range(-0.5..=0.5);
        let humidity = self.current.humidity + self.rng.gen_range(-1.0..=1.0);
        self.current = Sample {
            temperature: round_tenths(temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)),
            humidity: round_tenths(humidity.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1)),
        };
        trace!(
            temperature = self.current.temperature,
            humidity = self.current.humidity,
            "Drifted sample"
        );
    }
}

impl SampleSource for SimulatedDrift {
    fn next_sample(&mut self) -> Sample {
        if self.last_update.elapsed() >= self.interval {
            self.step();
            self.last_update = Instant::now();
        }
        self.current
    }
}

/// Replays fixed readings, repeating the last one when exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedSamples {
    queue: VecDeque<Sample>,
    last: Sample,
}

impl ScriptedSamples {
    /// Create a source from a list of readings
    pub fn new<I: IntoIterator<Item = Sample>>(samples: I) -> Self {
        Self {
            queue: samples.into_iter().collect(),
            last: Sample::default(),
        }
    }

    /// Create a source from `(temperature, humidity)` pairs
    pub fn from_pairs<I: IntoIterator<Item = (f64, f64)>>(pairs: I) -> Self {
        Self::new(pairs.into_iter().map(|(temperature, humidity)| Sample {
            temperature,
            humidity,
        }))
    }
}

impl SampleSource for ScriptedSamples {
    fn next_sample(&mut self) -> Sample {
        if let Some(sample) = self.queue.pop_front() {
            self.last = sample;
        }
        self.last
    }
}

/// Digital buttons plus the two analog triggers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Buttons {
    /// A button
    pub a: bool,
    /// B button
    pub b: bool,
    /// X button
    pub x: bool,
    /// Y button
    pub y: bool,
    /// Left shoulder
    pub l1: bool,
    /// Right shoulder
    pub r1: bool,
    /// Left trigger, 0.0 to 1.0
    pub l2: f64,
    /// Right trigger, 0.0 to 1.0
    pub r2: f64,
    /// Select button
    pub select: bool,
    /// Start button
    pub start: bool,
}

/// One analog stick, each axis -1.0 to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stick {
    /// Horizontal axis
    pub x: f64,
    /// Vertical axis
    pub y: f64,
}

/// Both analog sticks
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Joysticks {
    /// Left stick
    pub left: Stick,
    /// Right stick
    pub right: Stick,
}

/// Acceleration in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accelerometer {
    /// Lateral axis
    pub x: f64,
    /// Longitudinal axis
    pub y: f64,
    /// Vertical axis
    pub z: f64,
}

impl Default for Accelerometer {
    /// A controller lying flat
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        }
    }
}

/// Everything a controller reports in one poll
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Button and trigger state
    pub buttons: Buttons,
    /// Stick positions
    pub joysticks: Joysticks,
    /// Motion reading
    pub accelerometer: Accelerometer,
}

/// Produces controller input
pub trait InputSource: Send + Sync + Debug {
    /// Read the controller once
    fn poll(&mut self) -> InputSnapshot;
}

/// Random controller input from a seeded generator
#[derive(Debug, Clone)]
pub struct SimulatedInput {
    rng: ChaCha8Rng,
}

/// Chance that any single button reads as pressed
const PRESS_PROBABILITY: f64 = 0.1;

impl SimulatedInput {
    /// Create an input source from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn press(&mut self) -> bool {
        self.rng.gen_bool(PRESS_PROBABILITY)
    }

    fn analog(&mut self, low: f64, high: f64) -> f64 {
        (self.rng.gen_range(low..=high) * 100.0).round() / 100.0
    }

    fn stick(&mut self) -> Stick {
        Stick {
            x: self.analog(-0.2, 0.2),
            y: self.analog(-0.2, 0.2),
        }
    }
}

impl InputSource for SimulatedInput {
    fn poll(&mut self) -> InputSnapshot {
        let buttons = Buttons {
            a: self.press(),
            b: self.press(),
            x: self.press(),
            y: self.press(),
            l1: self.press(),
            r1: self.press(),
            l2: self.analog(0.0, 0.3),
            r2: self.analog(0.0, 0.3),
            select: self.press(),
            start: self.press(),
        };
        let joysticks = Joysticks {
            left: self.stick(),
            right: self.stick(),
        };
        let accelerometer = Accelerometer {
            x: self.analog(-0.5, 0.5),
            y: self.analog(-0.5, 0.5),
            z: self.analog(0.8, 1.0),
        };
        InputSnapshot {
            buttons,
            joysticks,
            accelerometer,
        }
    }
}

/// Replays fixed input, repeating the last snapshot when exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    queue: VecDeque<InputSnapshot>,
    last: InputSnapshot,
}

impl ScriptedInput {
    /// Create a source from a list of snapshots
    pub fn new<I: IntoIterator<Item = InputSnapshot>>(snapshots: I) -> Self {
        Self {
            queue: snapshots.into_iter().collect(),
            last: InputSnapshot::default(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> InputSnapshot {
        if let Some(snapshot) = self.queue.pop_front() {
            self.last = snapshot;
        }
        self.last
    }
}
