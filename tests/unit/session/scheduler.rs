use super::*;
use crate::encode::sink::{InMemorySink, SinkEvent, WriteStatus};
use crate::pool::{LeastLoaded, PoolCall, RoundRobin, ScriptedPool};
use crate::session::shutdown::{ManualClock, ShutdownPhase};

fn opts(frames: u64) -> SchedulerOptions {
    SchedulerOptions {
        frames: FrameCount::new(frames).unwrap(),
        poll_interval: Duration::from_millis(1),
        shutdown: ShutdownPolicy {
            max_attempts: 3,
            retry_delay_ms: 1_000,
            finish_timeout_ms: 10,
        },
    }
}

fn indices(range: std::ops::RangeInclusive<u64>) -> Vec<FrameIndex> {
    range.map(FrameIndex).collect()
}

#[test]
fn initial_round_is_capped_by_frame_count() {
    let (pool, _events) = ScriptedPool::new(4);
    let mut sched = Scheduler::new(pool, Box::new(LeastLoaded), opts(2));
    sched.start().unwrap();
    sched.start().unwrap();

    assert_eq!(
        sched.pool().dispatched(),
        vec![(WorkerId(0), FrameIndex(1)), (WorkerId(1), FrameIndex(2))]
    );
    assert!(sched.all_dispatched());
}

#[test]
fn every_completion_dispatches_the_next_index() {
    let (pool, events) = ScriptedPool::new(2);
    let mut sched = Scheduler::new(pool, Box::new(RoundRobin::default()), opts(5));
    let mut sink = InMemorySink::new();

    sched.pump(&events, &mut sink).unwrap();

    let sent: Vec<FrameIndex> = sched.pool().dispatched().iter().map(|d| d.1).collect();
    assert_eq!(sent, indices(1..=5));
    assert_eq!(sched.dispatched(), 5);
    assert_eq!(sched.completed(), 5);
    assert_eq!(sched.next_to_emit(), FrameIndex(6));
    assert_eq!(sink.indices(), indices(1..=5));
}

#[test]
fn failed_send_moves_the_request_to_another_worker() {
    let (pool, events) = ScriptedPool::new(2);
    let pool = pool.unreachable_worker(WorkerId(0));
    let mut sched = Scheduler::new(pool, Box::new(LeastLoaded), opts(3));
    let mut sink = InMemorySink::new();

    sched.pump(&events, &mut sink).unwrap();

    assert!(
        sched
            .pool()
            .dispatched()
            .iter()
            .all(|(w, _)| *w == WorkerId(1))
    );
    assert_eq!(sched.closed_workers().len(), 1);
    assert_eq!(sched.closed_workers()[0].worker, WorkerId(0));
    assert!(sched.closed_workers()[0].lost.is_empty());
    assert_eq!(sink.indices(), indices(1..=3));
}

#[test]
fn lone_worker_crash_stalls_with_the_lost_frame() {
    let (pool, events) = ScriptedPool::new(1);
    let pool = pool.crash_on(2);
    let mut sched = Scheduler::new(pool, Box::new(LeastLoaded), opts(3));
    let mut sink = InMemorySink::new();

    let err = sched.pump(&events, &mut sink).unwrap_err();
    match err {
        ReelError::Stalled { next_to_emit, lost } => {
            assert_eq!(next_to_emit, FrameIndex(2));
            assert_eq!(lost, vec![FrameIndex(2)]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.indices(), vec![FrameIndex(1)]);
    assert_eq!(sched.closed_workers()[0].lost, vec![FrameIndex(2)]);
}

#[test]
fn survivors_finish_dispatch_but_the_gap_is_never_filled() {
    let (pool, events) = ScriptedPool::new(2);
    let pool = pool.crash_on(2);
    let mut sched = Scheduler::new(pool, Box::new(LeastLoaded), opts(5));
    let mut sink = InMemorySink::new();
    let clock = ManualClock::new();

    let err = sched.run(&events, &mut sink, &clock).unwrap_err();
    assert!(matches!(err, ReelError::Stalled { .. }), "{err}");
    assert_eq!(sched.dispatched(), 5);
    assert_eq!(sink.indices(), vec![FrameIndex(1)]);
    // The consumer still gets a finalized stream.
    assert!(sink.is_ended());
    assert!(sched.pool().calls().contains(&PoolCall::BeginTeardown));
}

#[test]
fn backpressure_holds_writes_until_drain_while_results_keep_arriving() {
    let (pool, events) = ScriptedPool::new(3);
    let mut sched = Scheduler::new(pool, Box::new(LeastLoaded), opts(6));
    let mut sink = InMemorySink::new()
        .script_writes([WriteStatus::Backpressure])
        .script_drains([false, false, true]);
    let clock = ManualClock::new();

    let report = sched.run(&events, &mut sink, &clock).unwrap();
    assert_eq!(report.shutdown.phase, ShutdownPhase::Closed);
    assert_eq!(sink.indices(), indices(1..=6));

    let events = sink.events();
    let first_drain = events
        .iter()
        .position(|e| *e == SinkEvent::Drain(true))
        .unwrap();
    assert_eq!(events[0], SinkEvent::Write(FrameIndex(1)));
    assert!(
        events[1..first_drain]
            .iter()
            .all(|e| matches!(e, SinkEvent::Drain(false)))
    );
    assert_eq!(sink.bytes(), {
        let mut all = Vec::new();
        for idx in 1..=6 {
            all.extend(ScriptedPool::payload_for(FrameIndex(idx)));
        }
        all
    });
}

#[test]
fn idle_survivor_picks_up_dispatch_after_a_crash_takes_every_in_flight_frame() {
    let (pool, events) = ScriptedPool::new(2);
    let pool = pool.arrival_order([2, 3, 1]).crash_on(3).crash_on(1);
    let mut sched = Scheduler::new(pool, Box::new(RoundRobin::default()), opts(6));

    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut sink = InMemorySink::new();
        let clock = ManualClock::new();
        let outcome = sched.run(&events, &mut sink, &clock);
        let _ = done_tx.send((outcome, sched, sink));
    });
    let (outcome, sched, sink) = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("run did not finish with a live idle worker");

    match outcome.unwrap_err() {
        ReelError::Stalled { next_to_emit, lost } => {
            assert_eq!(next_to_emit, FrameIndex(1));
            assert_eq!(lost, vec![FrameIndex(1), FrameIndex(3)]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sched.dispatched(), 6);
    assert!(
        sched
            .pool()
            .dispatched()
            .iter()
            .filter(|(_, idx)| idx.0 >= 4)
            .all(|(w, _)| *w == WorkerId(1))
    );
    assert!(sink.indices().is_empty());
    assert!(sink.is_ended());
}
