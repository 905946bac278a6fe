use super::*;
use crate::encode::sink::{InMemorySink, SinkEvent, WriteStatus};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::ReelError;
use crate::pool::{PoolCall, ScriptedPool};

fn policy() -> ShutdownPolicy {
    ShutdownPolicy {
        max_attempts: 3,
        retry_delay_ms: 1_000,
        finish_timeout_ms: 10,
    }
}

fn finish_waits(sink: &InMemorySink) -> usize {
    sink.events()
        .iter()
        .filter(|e| matches!(e, SinkEvent::AwaitFinish(_)))
        .count()
}

#[test]
fn clean_close_takes_one_attempt() {
    let clock = ManualClock::new();
    let mut sink = InMemorySink::new();
    let (mut pool, _events) = ScriptedPool::new(2);

    let mut protocol = ShutdownProtocol::new(policy(), &clock);
    assert_eq!(protocol.phase(), ShutdownPhase::Running);
    let report = protocol.run(&mut sink, &mut pool).unwrap();

    assert_eq!(
        report,
        ShutdownReport {
            phase: ShutdownPhase::Closed,
            attempts: 1
        }
    );
    assert!(report.is_clean());
    assert!(clock.sleeps().is_empty());
    assert_eq!(
        sink.events(),
        &[
            SinkEvent::EndInput,
            SinkEvent::AwaitFinish(FinishStatus::Finished)
        ]
    );
    assert_eq!(
        pool.calls(),
        &[PoolCall::BeginTeardown, PoolCall::AwaitTeardown(true)]
    );
}

#[test]
fn slow_consumer_closes_on_a_later_attempt() {
    let clock = ManualClock::new();
    let mut sink =
        InMemorySink::new().script_finishes([FinishStatus::Pending, FinishStatus::Pending]);
    let (mut pool, _events) = ScriptedPool::new(1);

    let report = ShutdownProtocol::new(policy(), &clock)
        .run(&mut sink, &mut pool)
        .unwrap();

    assert_eq!(report.phase, ShutdownPhase::Closed);
    assert_eq!(report.attempts, 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    assert!(!sink.events().contains(&SinkEvent::Kill));
}

#[test]
fn persistent_close_failure_is_bounded_then_force_killed() {
    let clock = ManualClock::new();
    let mut sink = InMemorySink::new().never_finish();
    let (mut pool, _events) = ScriptedPool::new(2);

    let mut protocol = ShutdownProtocol::new(policy(), &clock);
    let report = protocol.run(&mut sink, &mut pool).unwrap();

    assert_eq!(report.phase, ShutdownPhase::ForceKilled);
    assert_eq!(protocol.phase(), ShutdownPhase::ForceKilled);
    assert_eq!(report.attempts, 3);
    assert_eq!(finish_waits(&sink), 3);
    assert_eq!(sink.events().last(), Some(&SinkEvent::Kill));
    assert_eq!(pool.calls().last(), Some(&PoolCall::Kill));
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
}

#[test]
fn workers_that_never_exit_force_a_kill() {
    let clock = ManualClock::new();
    let mut sink = InMemorySink::new();
    let (pool, _events) = ScriptedPool::new(1);
    let mut pool = pool.never_tear_down();

    let report = ShutdownProtocol::new(policy(), &clock)
        .run(&mut sink, &mut pool)
        .unwrap();

    assert_eq!(report.phase, ShutdownPhase::ForceKilled);
    let waits = pool
        .calls()
        .iter()
        .filter(|c| matches!(c, PoolCall::AwaitTeardown(false)))
        .count();
    assert_eq!(waits, 3);
}

#[test]
fn single_attempt_bound_never_sleeps() {
    let clock = ManualClock::new();
    let mut sink = InMemorySink::new().never_finish();
    let (mut pool, _events) = ScriptedPool::new(1);
    let policy = ShutdownPolicy {
        max_attempts: 1,
        ..policy()
    };

    let report = ShutdownProtocol::new(policy, &clock)
        .run(&mut sink, &mut pool)
        .unwrap();
    assert_eq!(report.phase, ShutdownPhase::ForceKilled);
    assert_eq!(report.attempts, 1);
    assert!(clock.sleeps().is_empty());
}

/// Consumer that exits with a failure status once input ends.
struct FailingSink;

impl FrameSink for FailingSink {
    fn write_frame(&mut self, _idx: FrameIndex, _payload: Vec<u8>) -> ReelResult<WriteStatus> {
        Ok(WriteStatus::Ready)
    }

    fn poll_drain(&mut self) -> ReelResult<bool> {
        Ok(true)
    }

    fn end_input(&mut self) -> ReelResult<()> {
        Ok(())
    }

    fn await_finish(&mut self, _timeout: Duration) -> ReelResult<FinishStatus> {
        Err(ReelError::sink("consumer exited with status 1"))
    }

    fn kill(&mut self) -> ReelResult<()> {
        Ok(())
    }
}

#[test]
fn consumer_failure_is_not_retried() {
    let clock = ManualClock::new();
    let (mut pool, _events) = ScriptedPool::new(1);

    let err = ShutdownProtocol::new(policy(), &clock)
        .run(&mut FailingSink, &mut pool)
        .unwrap_err();

    assert!(matches!(err, ReelError::Sink(_)), "{err}");
    assert!(clock.sleeps().is_empty());
    assert_eq!(pool.calls().last(), Some(&PoolCall::Kill));
}
