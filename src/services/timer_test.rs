use super::*;

const T0: i64 = 1_700_000_000_000;

#[test]
fn new_log_is_idle() {
    let log = TimerLog::default();
    assert_eq!(log.state(), TimerState::Idle);
    assert!(log.running().is_none());
    assert_eq!(log.running_count(), 0);
}

#[test]
fn start_then_stop_records_duration() {
    let session = Uuid::new_v4();
    let teacher = Uuid::new_v4();
    let mut log = TimerLog::default();

    let (closed, started) = log.start(session, teacher, T0);
    assert!(closed.is_none());
    assert_eq!(log.state(), TimerState::Running(teacher));
    assert!(started.is_running());

    let stopped = log.stop(T0 + 720_500).expect("timer was running");
    assert_eq!(stopped.id, started.id);
    assert_eq!(stopped.duration_seconds, 720);
    assert_eq!(stopped.ended_at, Some(T0 + 720_500));
    assert_eq!(log.state(), TimerState::Idle);
}

#[test]
fn stop_when_idle_is_noop() {
    let mut log = TimerLog::default();
    assert!(log.stop(T0).is_none());
    assert!(log.timers().is_empty());
}

#[test]
fn starting_closes_the_running_timer_first() {
    let session = Uuid::new_v4();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut log = TimerLog::default();

    log.start(session, a, T0);
    let (closed, _) = log.start(session, b, T0 + 60_000);
    let closed = closed.expect("previous timer closed");
    assert_eq!(closed.teacher_id, a);
    assert_eq!(closed.duration_seconds, 60);
    assert_eq!(log.state(), TimerState::Running(b));
    assert_eq!(log.running_count(), 1);
}

#[test]
fn at_most_one_running_across_many_transitions() {
    let session = Uuid::new_v4();
    let teachers = [Uuid::new_v4(), Uuid::new_v4()];
    let mut log = TimerLog::default();

    for step in 0..20_i64 {
        let now = T0 + step * 10_000;
        if step % 3 == 2 {
            log.stop(now);
        } else {
            log.start(session, teachers[usize::try_from(step % 2).expect("small")], now);
        }
        assert!(log.running_count() <= 1, "step {step}");
    }
}

#[test]
fn teaching_seconds_sums_closed_timers_per_teacher() {
    let session = Uuid::new_v4();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut log = TimerLog::default();

    log.start(session, a, T0);
    log.start(session, b, T0 + 300_000);
    log.start(session, a, T0 + 360_000);
    log.stop(T0 + 780_000);
    log.start(session, b, T0 + 800_000);

    assert_eq!(log.teaching_seconds(a), 300 + 420);
    // b's second timer is still running and does not count yet.
    assert_eq!(log.teaching_seconds(b), 60);
}

#[test]
fn clock_skew_never_yields_negative_duration() {
    let mut log = TimerLog::default();
    log.start(Uuid::new_v4(), Uuid::new_v4(), T0);
    let stopped = log.stop(T0 - 5_000).expect("running");
    assert_eq!(stopped.duration_seconds, 0);
}

#[test]
fn from_timers_repairs_multiple_running() {
    let session = Uuid::new_v4();
    let teacher = Uuid::new_v4();
    let open = |start: i64| Timer {
        id: Uuid::new_v4(),
        session_id: session,
        teacher_id: teacher,
        started_at: start,
        ended_at: None,
        duration_seconds: 0,
    };

    let log = TimerLog::from_timers(vec![open(T0 + 90_000), open(T0)]);
    assert_eq!(log.running_count(), 1);
    assert_eq!(log.timers()[0].duration_seconds, 90);
    assert_eq!(log.running().map(|t| t.started_at), Some(T0 + 90_000));
}
