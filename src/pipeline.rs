//! Pipeline orchestration
//!
//! This module provides the public API for MobiGait.
//! `MotionProcessor` routes each sensor event through the walking detector,
//! the step counter, and gait analysis, and returns the events the
//! presentation layer should see. It never blocks on persistence: records
//! go to a `RecordSink`.

use crate::buffer::GaitWindow;
use crate::classifier::GaitClassifier;
use crate::config::{ModeSelection, MotionConfig};
use crate::error::MotionError;
use crate::features::GaitFeatureExtractor;
use crate::metrics::{BodyMassIndex, StepMetrics};
use crate::profile::ProfileProvider;
use crate::step_counter::{DayRollover, StepCounter};
use crate::store::{RecordKind, RecordSink, StepStore};
use crate::types::{
    CountingMode, GaitResult, MotionEvent, MotionSample, SensorEvent, StepRecord, StepSession,
    TrackingState, WalkingState,
};
use crate::walking::{WalkingDetector, WalkingTransition};
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// Pick the counting strategy from the configured selection and hardware support
pub fn resolve_counting_mode(selection: ModeSelection, hardware_counter: bool) -> CountingMode {
    match selection {
        ModeSelection::HardwareCounter => CountingMode::HardwareCounter,
        ModeSelection::Accelerometer => CountingMode::Accelerometer,
        ModeSelection::Auto if hardware_counter => CountingMode::HardwareCounter,
        ModeSelection::Auto => CountingMode::Accelerometer,
    }
}

/// Host commands accepted by `MotionProcessor::command`
pub const COMMANDS: [&str; 8] = [
    "start",
    "pause",
    "resume",
    "reset",
    "stop",
    "start_gait",
    "stop_gait",
    "roll_day",
];

/// Stateful motion pipeline for one user session.
///
/// Sample processing and day rollover both take `&mut self`, so a rollover is
/// never interleaved with a sample. Wrap it in `SharedMotionProcessor` when
/// several threads drive it.
pub struct MotionProcessor {
    config: MotionConfig,
    profile: Arc<dyn ProfileProvider>,
    sink: Box<dyn RecordSink>,
    detector: WalkingDetector,
    window: GaitWindow,
    extractor: GaitFeatureExtractor,
    counter: StepCounter,
    collecting: bool,
    last_result: Option<GaitResult>,
}

impl MotionProcessor {
    /// Create a processor; the counting mode is fixed here.
    pub fn new(
        config: MotionConfig,
        profile: Arc<dyn ProfileProvider>,
        sink: Box<dyn RecordSink>,
        hardware_counter: bool,
        now_ms: i64,
    ) -> Result<Self, MotionError> {
        config.validate()?;
        let mode = resolve_counting_mode(config.counting_mode, hardware_counter);
        if mode == CountingMode::Accelerometer && hardware_counter {
            debug!("Hardware step counter present but accelerometer mode selected");
        } else if mode == CountingMode::Accelerometer {
            info!("Step counter sensor not available, using accelerometer");
        }

        Ok(Self {
            detector: WalkingDetector::new(&config),
            window: GaitWindow::new(config.max_window_samples),
            extractor: GaitFeatureExtractor::new(&config),
            counter: StepCounter::new(mode, &config, Arc::clone(&profile), now_ms),
            config,
            profile,
            sink,
            collecting: true,
            last_result: None,
        })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn counting_mode(&self) -> CountingMode {
        self.counter.mode()
    }

    pub fn walking_state(&self) -> WalkingState {
        self.detector.state()
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.counter.tracking_state()
    }

    pub fn session(&self) -> &StepSession {
        self.counter.session()
    }

    pub fn is_collecting_gait(&self) -> bool {
        self.collecting
    }

    /// Buffered gait window (accelerometer and gyroscope channels)
    pub fn gait_window(&self) -> &GaitWindow {
        &self.window
    }

    pub fn last_gait_result(&self) -> Option<&GaitResult> {
        self.last_result.as_ref()
    }

    /// Today's metrics as of `now_ms`
    pub fn metrics(&self, now_ms: i64) -> StepMetrics {
        self.counter.metrics(now_ms)
    }

    pub fn body_mass_index(&self) -> Option<BodyMassIndex> {
        BodyMassIndex::from_profile(self.profile.as_ref())
    }

    /// Process one sensor event to completion.
    ///
    /// Counting samples from a later local day close out the current day first.
    pub fn process_sample(&mut self, event: SensorEvent) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        match event {
            SensorEvent::Accelerometer { timestamp, x, y, z } => {
                self.roll_day_at(timestamp, &mut events);
                let sample = MotionSample::new(timestamp, x, y, z);
                if let Some(record) = self.counter.on_accelerometer(&sample) {
                    self.publish_step(record, &mut events);
                }
                if self.collecting {
                    self.collect_accel(sample, &mut events);
                }
            }
            SensorEvent::Gyroscope { timestamp, x, y, z } => {
                if self.collecting {
                    self.window.push_gyro(MotionSample::new(timestamp, x, y, z));
                }
            }
            SensorEvent::StepCounter { timestamp, value } => {
                self.roll_day_at(timestamp, &mut events);
                if let Some(record) = self.counter.on_hardware_count(value, timestamp) {
                    self.publish_step(record, &mut events);
                }
            }
        }
        events
    }

    fn collect_accel(&mut self, sample: MotionSample, events: &mut Vec<MotionEvent>) {
        self.window.push_accel(sample);

        match self.detector.update(&sample, self.window.accel()) {
            Some(WalkingTransition::Started { at }) => {
                events.push(MotionEvent::WalkingStarted { timestamp: at });
            }
            Some(transition @ WalkingTransition::Stopped { stopped_at, .. }) => {
                let duration_ms = transition.duration_ms().unwrap_or(0);
                events.push(MotionEvent::WalkingStopped {
                    timestamp: stopped_at,
                    duration_ms,
                });
                if duration_ms > self.config.min_walk_duration_ms {
                    self.analyze(stopped_at, events);
                }
                self.window.clear();
            }
            None => {}
        }

        if self.detector.is_walking() {
            if self.window.accel_len() >= self.config.analysis_trigger_samples {
                self.analyze(sample.timestamp, events);
                self.window.trim_to(self.config.analysis_keep_samples);
            }
        } else {
            // Idle samples older than the detection window are never analyzed
            self.window.trim_to(self.config.walking_window_size);
        }
    }

    fn analyze(&mut self, timestamp: i64, events: &mut Vec<MotionEvent>) {
        let Some(features) = self.extractor.extract(&self.window) else {
            return;
        };
        let result = GaitClassifier::evaluate(features, timestamp);
        info!(
            "Gait analysis complete: {} (cadence {:.1}, variability {:.1}, symmetry {:.1})",
            result.status, features.cadence, features.step_variability, features.symmetry_index
        );
        self.sink.insert_gait_result(result);
        self.last_result = Some(result);
        events.push(MotionEvent::AnalysisCompleted { result });
    }

    fn publish_step(&mut self, record: StepRecord, events: &mut Vec<MotionEvent>) {
        self.sink
            .upsert_step_record(self.counter.current_day(), record);
        events.push(MotionEvent::StepUpdated { record });
    }

    fn publish_rollover(&mut self, rollover: DayRollover, events: &mut Vec<MotionEvent>) {
        if let Some(record) = rollover.final_record {
            self.sink.upsert_step_record(rollover.previous_day, record);
        }
        events.push(MotionEvent::DayRolledOver {
            previous_day: rollover.previous_day,
            final_record: rollover.final_record,
        });
        events.push(MotionEvent::WakeRequested {
            at_ms: rollover.next_wake_ms,
        });
    }

    /// Finalize the previous day if `now_ms` is on a new local day.
    ///
    /// Safe to call from both a periodic check and a midnight wake.
    pub fn maybe_roll_day(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        self.roll_day_at(now_ms, &mut events);
        events
    }

    fn roll_day_at(&mut self, now_ms: i64, events: &mut Vec<MotionEvent>) {
        if let Some(rollover) = self.counter.maybe_roll_day(now_ms) {
            self.publish_rollover(rollover, events);
        }
    }

    /// Start step tracking and request the next midnight wake
    pub fn start_tracking(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        match self.counter.start(now_ms) {
            Some(Some(rollover)) => self.publish_rollover(rollover, &mut events),
            Some(None) => events.push(MotionEvent::WakeRequested {
                at_ms: self.counter.calendar().next_midnight_ms(now_ms),
            }),
            None => {}
        }
        events
    }

    pub fn pause_tracking(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        self.counter.pause(now_ms);
        Vec::new()
    }

    pub fn resume_tracking(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        if let Some(Some(rollover)) = self.counter.resume(now_ms) {
            self.publish_rollover(rollover, &mut events);
        }
        events
    }

    /// Zero today's count and persist the cleared record
    pub fn reset_steps(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        let record = self.counter.reset(now_ms);
        self.publish_step(record, &mut events);
        events
    }

    /// Stop tracking and persist final metrics
    pub fn stop_tracking(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        if let Some(record) = self.counter.stop(now_ms) {
            self.publish_step(record, &mut events);
        }
        events
    }

    /// Begin buffering samples for gait analysis
    pub fn start_gait_analysis(&mut self) {
        if !self.collecting {
            info!("Gait analysis started");
        }
        self.collecting = true;
    }

    /// Stop buffering, analyzing what a walking episode has collected so far
    pub fn stop_gait_analysis(&mut self, now_ms: i64) -> Vec<MotionEvent> {
        let mut events = Vec::new();
        if !self.collecting {
            return events;
        }
        info!("Gait analysis stopped");
        if self.detector.is_walking() && self.window.accel_len() > self.config.walking_window_size
        {
            self.analyze(now_ms, &mut events);
        }
        self.collecting = false;
        self.detector.reset();
        self.window.clear();
        events
    }

    /// Continue from the stored record for the current day.
    ///
    /// Records from other days are ignored. Returns whether one was applied.
    pub fn restore_today(&mut self, record: Option<StepRecord>, now_ms: i64) -> bool {
        match record {
            Some(record) => self.counter.restore(&record, now_ms),
            None => false,
        }
    }

    /// Look up and restore the current day's record from `store`
    pub fn restore_from_store<S: StepStore + ?Sized>(
        &mut self,
        store: &S,
        now_ms: i64,
    ) -> Result<bool, MotionError> {
        let record = store.step_record_for_day(self.counter.current_day())?;
        Ok(self.restore_today(record, now_ms))
    }

    /// Queue deletion of all stored records of `kind`
    pub fn clear_history(&mut self, kind: RecordKind) {
        info!("Clearing {kind:?} history");
        self.sink.delete_all(kind);
        if kind == RecordKind::Gait {
            self.last_result = None;
        }
    }

    /// Dispatch a named lifecycle command (see `COMMANDS`)
    pub fn command(&mut self, name: &str, now_ms: i64) -> Result<Vec<MotionEvent>, MotionError> {
        let events = match name {
            "start" => self.start_tracking(now_ms),
            "pause" => self.pause_tracking(now_ms),
            "resume" => self.resume_tracking(now_ms),
            "reset" => self.reset_steps(now_ms),
            "stop" => self.stop_tracking(now_ms),
            "start_gait" => {
                self.start_gait_analysis();
                Vec::new()
            }
            "stop_gait" => self.stop_gait_analysis(now_ms),
            "roll_day" => self.maybe_roll_day(now_ms),
            other => return Err(MotionError::UnknownCommand(other.to_string())),
        };
        Ok(events)
    }
}

/// Thread-safe handle to a `MotionProcessor`.
///
/// Every call holds the lock for its whole mutation, so a sensor thread and a
/// timer thread can drive the same processor.
#[derive(Clone)]
pub struct SharedMotionProcessor {
    inner: Arc<Mutex<MotionProcessor>>,
}

impl SharedMotionProcessor {
    pub fn new(processor: MotionProcessor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(processor)),
        }
    }

    pub fn process_sample(&self, event: SensorEvent) -> Result<Vec<MotionEvent>, MotionError> {
        self.with_processor(|p| p.process_sample(event))
    }

    pub fn maybe_roll_day(&self, now_ms: i64) -> Result<Vec<MotionEvent>, MotionError> {
        self.with_processor(|p| p.maybe_roll_day(now_ms))
    }

    pub fn command(&self, name: &str, now_ms: i64) -> Result<Vec<MotionEvent>, MotionError> {
        self.with_processor(|p| p.command(name, now_ms))?
    }

    /// Run `f` with exclusive access to the processor
    pub fn with_processor<R>(
        &self,
        f: impl FnOnce(&mut MotionProcessor) -> R,
    ) -> Result<R, MotionError> {
        let mut processor = self
            .inner
            .lock()
            .map_err(|e| MotionError::LockPoisoned(e.to_string()))?;
        Ok(f(&mut processor))
    }
}
