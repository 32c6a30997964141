use super::*;
use crate::engine::backend::{RecordingActuator, ReplaySensor};
use crate::profile::CalibrationPoint;
use std::time::Duration;

fn linear_profile() -> Arc<ProfileCurve> {
    Arc::new(ProfileCurve::new(vec![
        CalibrationPoint::new(0.0, 0),
        CalibrationPoint::new(1000.0, 255),
    ]))
}

fn session_loop(
    readings: Vec<f32>,
) -> (ConvergenceLoop<ReplaySensor, RecordingActuator>, RecordingActuator) {
    let actuator = RecordingActuator::new();
    let sensor = ReplaySensor::new(readings, Duration::ZERO);
    (ConvergenceLoop::new(sensor, actuator.clone()), actuator)
}

struct FailingSensor;

impl LightSensor for FailingSensor {
    fn start(&mut self, _sink: crate::sampling::ReadingSink) -> Result<(), DeviceError> {
        Err(DeviceError::NotFound {
            path: "/dev/null/iio".to_string(),
        })
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::NotRunning)
    }
}

/// Replay sensor whose shutdown races a cancel request
struct CancelOnStop {
    inner: ReplaySensor,
    cancel: CancelHandle,
}

impl LightSensor for CancelOnStop {
    fn start(&mut self, sink: crate::sampling::ReadingSink) -> Result<(), DeviceError> {
        self.inner.start(sink)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.cancel.cancel();
        self.inner.stop()
    }
}

struct BrokenBacklight;

impl BrightnessActuator for BrokenBacklight {
    fn apply(&mut self, _brightness: u8) -> Result<(), DeviceError> {
        Err(DeviceError::Io {
            details: "permission denied".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_average_commits_stable_full_buffer() {
    let (mut session, actuator) = session_loop(vec![500.0; 6]);
    let outcome = session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.committed_brightness(), Some(128));
    assert_eq!(outcome.state(), SessionState::Converged);
    assert_eq!(actuator.applied(), vec![128]);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.sensor().is_running());
    assert_eq!(session.last_snapshot().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_average_commits_median_of_final_snapshot() {
    let (mut session, actuator) = session_loop(vec![500.0, 504.0, 496.0, 500.0, 508.0, 492.0]);
    let outcome = session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    // Brightness values: 128, 129, 126, 128, 130, 125 -> sorted 125,126,128,128,129,130
    let SessionOutcome::Committed { brightness, snapshot } = outcome else {
        panic!("expected a committed outcome, got {:?}", outcome);
    };
    assert_eq!(brightness, 128);
    assert_eq!(snapshot.count, 6);
    assert!(snapshot.stddev <= snapshot.threshold(1.5, 4.0));
    assert_eq!(actuator.applied(), vec![128]);
}

#[tokio::test(start_paused = true)]
async fn test_one_shot_commits_first_sample() {
    let (mut session, actuator) = session_loop(vec![250.0]);
    let started = Instant::now();
    let outcome = session
        .run(
            AggregationMode::OneShot,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.committed_brightness(), Some(64));
    assert_eq!(actuator.applied(), vec![64]);
    assert!(started.elapsed() < Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_skips_actuation() {
    let (mut session, actuator) = session_loop(vec![500.0; 6]);
    let cancel = CancelHandle::new();
    cancel.cancel();

    let outcome = session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert!(actuator.applied().is_empty());
    assert!(!session.sensor().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_session_stops_feed_without_actuation() {
    // Two stable samples never fill the buffer and the long dwell keeps polling
    let (mut session, actuator) = session_loop(vec![500.0, 500.0]);
    let config = SessionConfig {
        min_dwell_ms: 60_000,
        max_session_ms: None,
        ..SessionConfig::default()
    };
    let cancel = CancelHandle::new();
    let remote = cancel.clone();

    let task = tokio::spawn(async move {
        let outcome = session
            .run(AggregationMode::Average, &config, linear_profile(), &cancel)
            .await;
        (session, outcome)
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    remote.cancel();

    let (session, outcome) = task.await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Cancelled);
    assert!(actuator.applied().is_empty());
    assert!(!session.sensor().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stable_partial_buffer_commits_after_dwell() {
    let (mut session, actuator) = session_loop(vec![500.0, 500.0]);
    let config = SessionConfig {
        min_dwell_ms: 5000,
        ..SessionConfig::default()
    };
    let started = Instant::now();

    let outcome = session
        .run(
            AggregationMode::Average,
            &config,
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.committed_brightness(), Some(128));
    assert_eq!(actuator.applied(), vec![128]);
    // Ticks land every 1.2s, the first past 5s is at 6s
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_millis(7200));
}

#[tokio::test(start_paused = true)]
async fn test_noisy_readings_time_out_without_actuation() {
    let (mut session, actuator) = session_loop(vec![0.0, 1000.0, 0.0, 1000.0, 0.0, 1000.0]);
    let config = SessionConfig {
        max_session_ms: Some(5000),
        ..SessionConfig::default()
    };

    let outcome = session
        .run(
            AggregationMode::Average,
            &config,
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::TimedOut { count: 6 });
    assert_eq!(outcome.state(), SessionState::TimedOut);
    assert!(actuator.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_uncovered_readings_time_out_one_shot() {
    let (mut session, actuator) = session_loop(vec![5000.0, 6000.0]);
    let config = SessionConfig {
        max_session_ms: Some(1000),
        ..SessionConfig::default()
    };

    let outcome = session
        .run(
            AggregationMode::OneShot,
            &config,
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::TimedOut { count: 0 });
    assert!(actuator.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sensor_start_failure_is_reported() {
    let actuator = RecordingActuator::new();
    let mut session = ConvergenceLoop::new(FailingSensor, actuator.clone());

    let result = session
        .run(
            AggregationMode::OneShot,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await;

    assert!(matches!(result, Err(SessionError::SensorStart { .. })));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(actuator.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_session_never_starts_sensor() {
    let actuator = RecordingActuator::new();
    let mut session = ConvergenceLoop::new(FailingSensor, actuator.clone());
    let cancel = CancelHandle::new();
    cancel.cancel();

    let outcome = session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(actuator.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_convergence_skips_actuation() {
    let cancel = CancelHandle::new();
    let sensor = CancelOnStop {
        inner: ReplaySensor::new(vec![500.0; 6], Duration::ZERO),
        cancel: cancel.clone(),
    };
    let actuator = RecordingActuator::new();
    let mut session = ConvergenceLoop::new(sensor, actuator.clone());

    let outcome = session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert!(actuator.applied().is_empty());
    assert_eq!(session.last_snapshot().len(), 6);
}

/// Other tasks on a single-threaded runtime keep running while the feed stops
#[tokio::test(flavor = "current_thread")]
async fn test_stopping_threaded_sensor_does_not_stall_runtime() {
    let actuator = RecordingActuator::new();
    let sensor = ReplaySensor::constant(500.0, Duration::from_secs(1));
    let mut session = ConvergenceLoop::new(sensor, actuator.clone());

    let done = Arc::new(AtomicBool::new(false));
    let ticker = tokio::spawn({
        let done = Arc::clone(&done);
        async move {
            let mut last = Instant::now();
            let mut max_gap = Duration::ZERO;
            while !done.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let now = Instant::now();
                max_gap = max_gap.max(now - last);
                last = now;
            }
            max_gap
        }
    });

    let outcome = session
        .run(
            AggregationMode::OneShot,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();
    done.store(true, Ordering::SeqCst);
    let max_gap = ticker.await.unwrap();

    assert_eq!(outcome.committed_brightness(), Some(128));
    assert_eq!(actuator.applied(), vec![128]);
    assert!(max_gap < Duration::from_millis(300), "ticker stalled for {:?}", max_gap);
}

#[tokio::test(start_paused = true)]
async fn test_actuation_failure_is_reported() {
    let sensor = ReplaySensor::new(vec![1000.0], Duration::ZERO);
    let mut session = ConvergenceLoop::new(sensor, BrokenBacklight);

    let outcome = session
        .run(
            AggregationMode::OneShot,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SessionOutcome::ActuationFailed { brightness: 255, .. }
    ));
    assert_eq!(outcome.committed_brightness(), None);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_broadcast() {
    let (tx, mut rx) = broadcast::channel(16);
    let (session, _actuator) = session_loop(vec![500.0; 6]);
    let mut session = session.with_progress(tx);

    session
        .run(
            AggregationMode::Average,
            &SessionConfig::default(),
            linear_profile(),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    let progress = rx.try_recv().unwrap();
    assert_eq!(progress.mode, AggregationMode::Average);
    assert_eq!(progress.count, 6);
    assert_eq!(progress.capacity, 6);
    assert_eq!(progress.stddev, Some(0.0));
    assert!(progress.elapsed_ms >= 1200);
}

#[test]
fn test_buffer_is_reset_between_sessions() {
    let (mut session, _actuator) = session_loop(Vec::new());

    let buffer = session.prepare_buffer(4).unwrap();
    lock_buffer(&buffer).unwrap().push(Sample::new(10, 40.0, 1));

    let reused = session.prepare_buffer(4).unwrap();
    assert!(Arc::ptr_eq(&buffer, &reused));
    assert!(lock_buffer(&reused).unwrap().is_empty());

    let resized = session.prepare_buffer(8).unwrap();
    assert!(!Arc::ptr_eq(&buffer, &resized));
    assert_eq!(lock_buffer(&resized).unwrap().capacity(), 8);
}
