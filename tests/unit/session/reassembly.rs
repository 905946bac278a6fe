use super::*;
use crate::encode::sink::{InMemorySink, SinkEvent};

fn result(idx: u64) -> FrameResult {
    FrameResult {
        index: FrameIndex(idx),
        payload: vec![idx as u8; 3],
    }
}

fn count(n: u64) -> FrameCount {
    FrameCount::new(n).unwrap()
}

#[test]
fn insert_rejects_duplicates_emitted_and_out_of_range() {
    let mut buf = ReassemblyBuffer::new(count(5));
    buf.insert(FrameIndex(1), result(3)).unwrap();
    assert!(buf.insert(FrameIndex(1), result(3)).is_err());
    assert!(buf.insert(FrameIndex(1), result(6)).is_err());
    assert!(buf.insert(FrameIndex(1), result(0)).is_err());
    assert!(buf.insert(FrameIndex(4), result(2)).is_err());
    assert_eq!(buf.indices().collect::<Vec<_>>(), vec![FrameIndex(3)]);
}

#[test]
fn out_of_order_arrivals_are_emitted_in_order() {
    let mut buf = ReassemblyBuffer::new(count(5));
    let mut writer = SinkWriter::new(count(5));
    let mut sink = InMemorySink::new();

    for idx in [2, 1, 3, 5, 4] {
        buf.insert(writer.next_to_emit(), result(idx)).unwrap();
        writer.try_advance(&mut buf, &mut sink).unwrap();
    }

    assert_eq!(
        sink.indices(),
        (1..=5).map(FrameIndex).collect::<Vec<_>>()
    );
    assert!(writer.is_complete());
    assert!(buf.is_empty());
    assert_eq!(writer.next_to_emit(), FrameIndex(6));
}

#[test]
fn try_advance_without_the_next_frame_changes_nothing() {
    let mut buf = ReassemblyBuffer::new(count(3));
    let mut writer = SinkWriter::new(count(3));
    let mut sink = InMemorySink::new();
    buf.insert(writer.next_to_emit(), result(2)).unwrap();

    for _ in 0..3 {
        assert_eq!(writer.try_advance(&mut buf, &mut sink).unwrap(), 0);
    }
    assert!(sink.events().is_empty());
    assert_eq!(writer.next_to_emit(), FrameIndex(1));
    assert_eq!(buf.len(), 1);
}

#[test]
fn backpressure_suspends_writes_until_drain() {
    let mut buf = ReassemblyBuffer::new(count(3));
    let mut writer = SinkWriter::new(count(3));
    let mut sink = InMemorySink::new()
        .script_writes([WriteStatus::Backpressure])
        .script_drains([false, false, true]);

    for idx in 1..=3 {
        buf.insert(writer.next_to_emit(), result(idx)).unwrap();
    }

    assert_eq!(writer.try_advance(&mut buf, &mut sink).unwrap(), 1);
    assert!(writer.is_suspended());
    // The accepted frame counts as emitted; the rest stays buffered.
    assert_eq!(writer.next_to_emit(), FrameIndex(2));
    assert_eq!(buf.len(), 2);

    assert_eq!(writer.try_advance(&mut buf, &mut sink).unwrap(), 0);
    assert_eq!(writer.try_advance(&mut buf, &mut sink).unwrap(), 0);
    assert_eq!(writer.try_advance(&mut buf, &mut sink).unwrap(), 2);
    assert_eq!(writer.state(), WriterState::Ready);

    assert_eq!(
        sink.events(),
        &[
            SinkEvent::Write(FrameIndex(1)),
            SinkEvent::Drain(false),
            SinkEvent::Drain(false),
            SinkEvent::Drain(true),
            SinkEvent::Write(FrameIndex(2)),
            SinkEvent::Write(FrameIndex(3)),
        ]
    );
    assert_eq!(sink.bytes(), vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
}

#[test]
fn sink_errors_propagate_without_advancing() {
    let mut buf = ReassemblyBuffer::new(count(2));
    let mut writer = SinkWriter::new(count(2));
    let mut sink = InMemorySink::new();
    sink.end_input().unwrap();

    buf.insert(writer.next_to_emit(), result(1)).unwrap();
    assert!(writer.try_advance(&mut buf, &mut sink).is_err());
    assert_eq!(writer.next_to_emit(), FrameIndex(1));
}
