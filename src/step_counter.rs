//! Daily step counting
//!
//! `StepCounter` owns the live `StepSession` and counts steps from either the
//! hardware cumulative counter or accelerometer threshold crossings. Every
//! count change yields the day's refreshed `StepRecord`; the caller persists
//! it and notifies observers.
//!
//! Day boundaries are handled by `maybe_roll_day`, which is idempotent per
//! local day so a periodic check and a midnight wake can both call it.

use crate::calendar::LocalCalendar;
use crate::config::{DurationBasis, MotionConfig};
use crate::metrics::{estimated_duration_ms, MetricsAggregator, StepMetrics};
use crate::profile::ProfileProvider;
use crate::types::{CountingMode, MotionSample, StepRecord, StepSession, TrackingState};
use chrono::NaiveDate;
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a day change
#[derive(Debug, Clone, PartialEq)]
pub struct DayRollover {
    pub previous_day: NaiveDate,
    pub new_day: NaiveDate,
    /// Final record for `previous_day`, present when it had steps
    pub final_record: Option<StepRecord>,
    /// Next local midnight to wake at
    pub next_wake_ms: i64,
}

/// Step counter for one tracking session
pub struct StepCounter {
    mode: CountingMode,
    calendar: LocalCalendar,
    aggregator: MetricsAggregator,
    duration_basis: DurationBasis,
    debounce_ms: i64,
    profile: Arc<dyn ProfileProvider>,

    session: StepSession,
    tracking: bool,
    /// Active time accumulated before the current pause or stop
    paused_elapsed_ms: i64,
    step_threshold: f64,
    last_magnitude: f64,
    last_step_time: Option<i64>,
}

impl StepCounter {
    pub fn new(
        mode: CountingMode,
        config: &MotionConfig,
        profile: Arc<dyn ProfileProvider>,
        now_ms: i64,
    ) -> Self {
        let calendar = LocalCalendar::from_offset_minutes(config.utc_offset_minutes);
        let step_threshold = profile.sensor_sensitivity().step_threshold();
        Self {
            mode,
            calendar,
            aggregator: MetricsAggregator::new(config.apply_gender_factor),
            duration_basis: config.duration_basis,
            debounce_ms: config.step_debounce_ms,
            profile,
            session: StepSession {
                session_id: Uuid::new_v4().to_string(),
                step_count: 0,
                initial_counter_offset: None,
                start_time: now_ms,
                paused: false,
                current_day: calendar.local_day(now_ms),
            },
            tracking: false,
            paused_elapsed_ms: 0,
            step_threshold,
            last_magnitude: 0.0,
            last_step_time: None,
        }
    }

    pub fn mode(&self) -> CountingMode {
        self.mode
    }

    pub fn session(&self) -> &StepSession {
        &self.session
    }

    pub fn step_count(&self) -> u32 {
        self.session.step_count
    }

    pub fn current_day(&self) -> NaiveDate {
        self.session.current_day
    }

    pub fn calendar(&self) -> &LocalCalendar {
        &self.calendar
    }

    pub fn tracking_state(&self) -> TrackingState {
        TrackingState {
            tracking: self.tracking,
            paused: self.session.paused,
        }
    }

    fn consuming(&self) -> bool {
        self.tracking && !self.session.paused
    }

    /// Begin tracking. Returns `None` when already tracking.
    ///
    /// A pending day change is applied first. The hardware offset is re-armed
    /// so steps taken while stopped are not counted.
    pub fn start(&mut self, now_ms: i64) -> Option<Option<DayRollover>> {
        if self.tracking {
            debug!("Already tracking, ignoring start request");
            return None;
        }
        info!("Starting step tracking ({:?})", self.mode);
        let rollover = self.maybe_roll_day(now_ms);
        self.tracking = true;
        self.session.paused = false;
        self.session.initial_counter_offset = None;
        self.session.start_time = now_ms - self.paused_elapsed_ms;
        self.refresh_sensitivity();
        Some(rollover)
    }

    /// Stop consuming samples, keeping the count. Returns whether it paused.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.consuming() {
            debug!("Not tracking or already paused, ignoring pause request");
            return false;
        }
        info!("Pausing step tracking at {} steps", self.session.step_count);
        self.session.paused = true;
        self.paused_elapsed_ms = now_ms - self.session.start_time;
        true
    }

    /// Resume after a pause. Returns `None` when not paused.
    ///
    /// The hardware offset is re-armed so a counter reboot during the pause
    /// keeps the visible count continuous.
    pub fn resume(&mut self, now_ms: i64) -> Option<Option<DayRollover>> {
        if !self.tracking || !self.session.paused {
            debug!("Not tracking or not paused, ignoring resume request");
            return None;
        }
        info!("Resuming step tracking");
        let rollover = self.maybe_roll_day(now_ms);
        self.session.paused = false;
        self.session.initial_counter_offset = None;
        self.session.start_time = now_ms - self.paused_elapsed_ms;
        self.refresh_sensitivity();
        Some(rollover)
    }

    /// Zero the count without changing the day; returns the cleared record
    pub fn reset(&mut self, now_ms: i64) -> StepRecord {
        info!("Resetting steps");
        self.clear_counters(now_ms);
        self.record_at(now_ms, now_ms)
    }

    /// Stop tracking. Returns the final record, or `None` when not tracking.
    pub fn stop(&mut self, now_ms: i64) -> Option<StepRecord> {
        if !self.tracking {
            debug!("Not tracking, ignoring stop request");
            return None;
        }
        info!("Stopping step tracking at {} steps", self.session.step_count);
        let record = self.record_at(now_ms, now_ms);
        self.paused_elapsed_ms = self.active_elapsed_ms(now_ms);
        self.tracking = false;
        self.session.paused = false;
        Some(record)
    }

    /// Feed a lifetime hardware counter value
    pub fn on_hardware_count(&mut self, raw: u64, timestamp: i64) -> Option<StepRecord> {
        if self.mode != CountingMode::HardwareCounter || !self.consuming() {
            return None;
        }
        let raw = i64::try_from(raw).unwrap_or(i64::MAX);
        let count = self.session.step_count as i64;

        let offset = match self.session.initial_counter_offset {
            Some(offset) if raw >= offset + count => offset,
            Some(offset) => {
                debug!(
                    "Counter went backwards ({raw} < last value {}), re-arming",
                    offset + count
                );
                raw - count
            }
            None => {
                debug!("Initialized step counter with base value {}", raw - count);
                raw - count
            }
        };
        self.session.initial_counter_offset = Some(offset);

        let new_count = u32::try_from((raw - offset).max(0)).unwrap_or(u32::MAX);
        if new_count == self.session.step_count {
            return None;
        }
        self.session.step_count = new_count;
        debug!("Step count updated: {new_count}");
        Some(self.record_at(timestamp, timestamp))
    }

    /// Feed an accelerometer sample for threshold-crossing step detection
    pub fn on_accelerometer(&mut self, sample: &MotionSample) -> Option<StepRecord> {
        if self.mode != CountingMode::Accelerometer || !self.consuming() {
            return None;
        }
        let magnitude = sample.magnitude();
        let crossed = magnitude > self.step_threshold && self.last_magnitude <= self.step_threshold;
        let debounced = self
            .last_step_time
            .map_or(true, |last| sample.timestamp - last >= self.debounce_ms);
        self.last_magnitude = magnitude;

        if !(crossed && debounced) {
            return None;
        }
        self.session.step_count = self.session.step_count.saturating_add(1);
        self.last_step_time = Some(sample.timestamp);
        debug!("Step detected with accelerometer, count: {}", self.session.step_count);
        Some(self.record_at(sample.timestamp, sample.timestamp))
    }

    /// Apply a day change if `now_ms` falls on a later local day than the session.
    ///
    /// Calling it again for the same or an earlier day does nothing.
    pub fn maybe_roll_day(&mut self, now_ms: i64) -> Option<DayRollover> {
        let today = self.calendar.local_day(now_ms);
        let previous_day = self.session.current_day;
        if today <= previous_day {
            return None;
        }

        info!("Day change detected: {previous_day} -> {today}");
        let final_record = (self.session.step_count > 0).then(|| {
            let stamp = self.calendar.final_record_timestamp(previous_day);
            self.record_at(stamp, now_ms)
        });
        if let Some(record) = &final_record {
            info!(
                "Saving final step data for {previous_day}: {} steps",
                record.step_count
            );
        }

        self.clear_counters(now_ms);
        self.session.current_day = today;
        self.session.session_id = Uuid::new_v4().to_string();

        Some(DayRollover {
            previous_day,
            new_day: today,
            final_record,
            next_wake_ms: self.calendar.next_midnight_ms(now_ms),
        })
    }

    /// Continue from a stored record of the current day.
    ///
    /// Returns whether the record was applied.
    pub fn restore(&mut self, record: &StepRecord, now_ms: i64) -> bool {
        if self.calendar.local_day(record.timestamp) != self.session.current_day {
            debug!("No step data found for today");
            return false;
        }
        info!("Loaded today's step count: {}", record.step_count);
        self.session.step_count = record.step_count;
        self.paused_elapsed_ms = record.duration.max(0);
        self.session.start_time = now_ms - self.paused_elapsed_ms;
        self.session.initial_counter_offset = None;
        true
    }

    /// Metrics for the current count as of `now_ms`
    pub fn metrics(&self, now_ms: i64) -> StepMetrics {
        let duration_ms = match self.duration_basis {
            DurationBasis::StepEstimate => estimated_duration_ms(self.session.step_count),
            DurationBasis::WallClock => self.active_elapsed_ms(now_ms),
        };
        self.aggregator
            .compute(self.session.step_count, duration_ms, self.profile.as_ref())
    }

    fn record_at(&self, timestamp: i64, now_ms: i64) -> StepRecord {
        self.metrics(now_ms).to_record(timestamp)
    }

    fn active_elapsed_ms(&self, now_ms: i64) -> i64 {
        let elapsed = if self.session.paused || !self.tracking {
            self.paused_elapsed_ms
        } else {
            now_ms - self.session.start_time
        };
        elapsed.max(0)
    }

    fn clear_counters(&mut self, now_ms: i64) {
        self.session.step_count = 0;
        self.session.initial_counter_offset = None;
        self.session.start_time = now_ms;
        self.paused_elapsed_ms = 0;
        self.last_step_time = None;
    }

    fn refresh_sensitivity(&mut self) {
        self.step_threshold = self.profile.sensor_sensitivity().step_threshold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserProfile;
    use crate::types::Sensitivity;
    use approx::assert_relative_eq;

    // 2024-03-15T10:30:00Z
    const NOW: i64 = 1_710_498_600_000;
    const DAY_MS: i64 = 86_400_000;

    fn counter(mode: CountingMode) -> StepCounter {
        let profile = Arc::new(UserProfile::with_biometrics(170.0, 70.0));
        let mut counter = StepCounter::new(mode, &MotionConfig::default(), profile, NOW);
        assert_eq!(counter.start(NOW), Some(None));
        counter
    }

    fn shake(ts: i64, magnitude: f64) -> MotionSample {
        MotionSample::new(ts, 0.0, magnitude, 0.0)
    }

    #[test]
    fn test_hardware_offset_initialization() {
        let mut counter = counter(CountingMode::HardwareCounter);

        // First raw value only arms the offset
        assert_eq!(counter.on_hardware_count(50_000, NOW), None);
        assert_eq!(counter.session().initial_counter_offset, Some(50_000));

        let record = counter.on_hardware_count(50_120, NOW + 1_000).unwrap();
        assert_eq!(record.step_count, 120);
        assert_eq!(record.timestamp, NOW + 1_000);
        assert_eq!(record.duration, 72_000);

        // Unchanged value is not written again
        assert_eq!(counter.on_hardware_count(50_120, NOW + 2_000), None);
    }

    #[test]
    fn test_pause_resume_keeps_count_continuous() {
        let mut counter = counter(CountingMode::HardwareCounter);
        counter.on_hardware_count(1_000, NOW);
        counter.on_hardware_count(1_300, NOW + 10);
        assert_eq!(counter.step_count(), 300);

        assert!(counter.pause(NOW + 20));
        assert_eq!(counter.on_hardware_count(1_500, NOW + 30), None);
        assert_eq!(counter.step_count(), 300);

        // Sensor rebooted during the pause
        assert_eq!(counter.resume(NOW + 40), Some(None));
        assert_eq!(counter.on_hardware_count(7, NOW + 50), None);
        assert_eq!(counter.step_count(), 300);

        let record = counter.on_hardware_count(17, NOW + 60).unwrap();
        assert_eq!(record.step_count, 310);
    }

    #[test]
    fn test_counter_reboot_without_pause_rearms() {
        let mut counter = counter(CountingMode::HardwareCounter);
        counter.on_hardware_count(5_000, NOW);
        counter.on_hardware_count(5_040, NOW + 10);

        assert_eq!(counter.on_hardware_count(3, NOW + 20), None);
        assert_eq!(counter.step_count(), 40);
        assert_eq!(counter.on_hardware_count(8, NOW + 30).map(|r| r.step_count), Some(45));
    }

    #[test]
    fn test_backwards_value_above_offset_rearms() {
        let mut counter = counter(CountingMode::HardwareCounter);
        counter.on_hardware_count(1_000, NOW);
        counter.on_hardware_count(1_300, NOW + 10);
        assert_eq!(counter.step_count(), 300);

        // Lower than the last value but still above the offset
        assert_eq!(counter.on_hardware_count(1_005, NOW + 20), None);
        assert_eq!(counter.step_count(), 300);
        assert_eq!(counter.on_hardware_count(1_010, NOW + 30).map(|r| r.step_count), Some(305));
    }

    #[test]
    fn test_restart_after_stop_ignores_stopped_steps() {
        let mut counter = counter(CountingMode::HardwareCounter);
        counter.on_hardware_count(1_000, NOW);
        counter.on_hardware_count(1_100, NOW + 10);
        assert_eq!(counter.stop(NOW + 20).map(|r| r.step_count), Some(100));

        // 500 steps walked while stopped
        assert_eq!(counter.start(NOW + 1_000), Some(None));
        assert_eq!(counter.on_hardware_count(1_600, NOW + 1_010), None);
        assert_eq!(counter.step_count(), 100);
        assert_eq!(counter.on_hardware_count(1_610, NOW + 1_020).map(|r| r.step_count), Some(110));
    }

    #[test]
    fn test_accelerometer_crossing_and_debounce() {
        let mut counter = counter(CountingMode::Accelerometer);

        // Rising edge counts
        assert!(counter.on_accelerometer(&shake(NOW, 13.0)).is_some());
        // Staying above threshold is not a new crossing
        assert!(counter.on_accelerometer(&shake(NOW + 50, 14.0)).is_none());
        assert!(counter.on_accelerometer(&shake(NOW + 100, 9.0)).is_none());
        // New crossing within 250 ms is debounced
        assert!(counter.on_accelerometer(&shake(NOW + 200, 13.0)).is_none());
        assert!(counter.on_accelerometer(&shake(NOW + 230, 9.0)).is_none());
        // Exactly 250 ms after the last registered step
        assert_eq!(
            counter.on_accelerometer(&shake(NOW + 250, 13.0)).map(|r| r.step_count),
            Some(2)
        );
        // At-threshold previous sample still counts as "at or below"
        counter.on_accelerometer(&shake(NOW + 400, 12.0));
        assert_eq!(
            counter.on_accelerometer(&shake(NOW + 600, 12.5)).map(|r| r.step_count),
            Some(3)
        );
    }

    #[test]
    fn test_sensitivity_changes_threshold() {
        let profile = Arc::new(UserProfile {
            sensitivity: Sensitivity::High,
            ..UserProfile::default()
        });
        let mut counter = StepCounter::new(
            CountingMode::Accelerometer,
            &MotionConfig::default(),
            profile,
            NOW,
        );
        counter.start(NOW);
        assert!(counter.on_accelerometer(&shake(NOW, 9.5)).is_some());
    }

    #[test]
    fn test_mode_ignores_other_inputs() {
        let mut hardware = counter(CountingMode::HardwareCounter);
        assert!(hardware.on_accelerometer(&shake(NOW, 20.0)).is_none());

        let mut accel = counter(CountingMode::Accelerometer);
        accel.on_hardware_count(10, NOW);
        assert!(accel.on_hardware_count(20, NOW + 1).is_none());
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let mut counter = counter(CountingMode::Accelerometer);
        counter.on_accelerometer(&shake(NOW, 13.0));
        counter.on_accelerometer(&shake(NOW + 300, 9.0));
        counter.on_accelerometer(&shake(NOW + 600, 13.0));
        assert_eq!(counter.step_count(), 2);

        let tomorrow = NOW + DAY_MS;
        let rollover = counter.maybe_roll_day(tomorrow).unwrap();
        assert_eq!(rollover.previous_day, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(rollover.new_day, NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());

        let final_record = rollover.final_record.unwrap();
        assert_eq!(final_record.step_count, 2);
        // 2024-03-15T23:59:59Z
        assert_eq!(final_record.timestamp, 1_710_547_199_000);
        assert_eq!(rollover.next_wake_ms, 1_710_633_600_000);

        assert_eq!(counter.step_count(), 0);
        assert_eq!(counter.current_day(), rollover.new_day);
        assert_eq!(counter.maybe_roll_day(tomorrow), None);
        assert_eq!(counter.maybe_roll_day(tomorrow + 60_000), None);
    }

    #[test]
    fn test_rollover_without_steps_has_no_record() {
        let mut counter = counter(CountingMode::HardwareCounter);
        let session_id = counter.session().session_id.clone();
        let rollover = counter.maybe_roll_day(NOW + DAY_MS).unwrap();
        assert_eq!(rollover.final_record, None);
        assert_ne!(counter.session().session_id, session_id);
    }

    #[test]
    fn test_late_rollover_stamps_outgoing_day() {
        let mut counter = counter(CountingMode::Accelerometer);
        counter.on_accelerometer(&shake(NOW, 13.0));

        // Three days late
        let rollover = counter.maybe_roll_day(NOW + 3 * DAY_MS).unwrap();
        let stamp = rollover.final_record.unwrap().timestamp;
        assert_eq!(
            counter.calendar().local_day(stamp),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_start_is_noop_when_tracking() {
        let mut counter = counter(CountingMode::Accelerometer);
        assert_eq!(counter.start(NOW + 1), None);
        assert!(counter.tracking_state().tracking);
    }

    #[test]
    fn test_reset_and_stop() {
        let mut counter = counter(CountingMode::HardwareCounter);
        counter.on_hardware_count(100, NOW);
        counter.on_hardware_count(150, NOW + 1);

        let cleared = counter.reset(NOW + 2);
        assert_eq!(cleared.step_count, 0);
        assert_eq!(counter.current_day(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        // Offset re-armed: next raw value is the new baseline
        assert_eq!(counter.on_hardware_count(160, NOW + 3), None);
        assert_eq!(counter.on_hardware_count(165, NOW + 4).map(|r| r.step_count), Some(5));

        let last = counter.stop(NOW + 5).unwrap();
        assert_eq!(last.step_count, 5);
        assert_eq!(counter.tracking_state(), TrackingState::default());
        assert_eq!(counter.stop(NOW + 6), None);
        assert!(counter.on_hardware_count(200, NOW + 7).is_none());
    }

    #[test]
    fn test_wall_clock_duration_excludes_pause() {
        let config = MotionConfig {
            duration_basis: DurationBasis::WallClock,
            ..MotionConfig::default()
        };
        let mut counter = StepCounter::new(
            CountingMode::HardwareCounter,
            &config,
            Arc::new(UserProfile::default()),
            NOW,
        );
        counter.start(NOW);

        counter.pause(NOW + 60_000);
        assert_eq!(counter.metrics(NOW + 600_000).duration_ms, 60_000);

        counter.resume(NOW + 600_000);
        assert_eq!(counter.metrics(NOW + 630_000).duration_ms, 90_000);
    }

    #[test]
    fn test_wall_clock_duration_excludes_stopped_span() {
        let config = MotionConfig {
            duration_basis: DurationBasis::WallClock,
            ..MotionConfig::default()
        };
        let mut counter = StepCounter::new(
            CountingMode::HardwareCounter,
            &config,
            Arc::new(UserProfile::default()),
            NOW,
        );
        counter.start(NOW);

        counter.stop(NOW + 60_000);
        assert_eq!(counter.metrics(NOW + 600_000).duration_ms, 60_000);

        counter.start(NOW + 600_000);
        assert_eq!(counter.metrics(NOW + 630_000).duration_ms, 90_000);
    }

    #[test]
    fn test_restore_today_only() {
        let mut counter = counter(CountingMode::Accelerometer);
        let yesterday = StepRecord {
            timestamp: NOW - DAY_MS,
            step_count: 900,
            distance: 0.0,
            calories: 0.0,
            duration: 0,
        };
        assert!(!counter.restore(&yesterday, NOW));

        let today = StepRecord {
            timestamp: NOW - 3_600_000,
            step_count: 1_000,
            distance: 0.7055,
            calories: 49.385,
            duration: 600_000,
        };
        assert!(counter.restore(&today, NOW));
        assert_eq!(counter.step_count(), 1_000);
        assert_eq!(counter.session().start_time, NOW - 600_000);

        let metrics = counter.metrics(NOW);
        assert_relative_eq!(metrics.calories, 49.385, epsilon = 1e-9);
    }
}
