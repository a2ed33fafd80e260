//! Latest-value slot tests

use smart_mirror::slot::LatestValueSlot;
use std::sync::Arc;
use std::thread;

#[test]
fn test_read_after_publish_returns_value() {
    let slot = LatestValueSlot::new();
    assert!(slot.read().is_none());
    assert!(slot.is_empty());

    for value in ["first", "second", "third"] {
        slot.publish(value.to_string());
        assert_eq!(slot.read().as_deref().map(String::as_str), Some(value));
    }
    assert_eq!(slot.sequence(), 3);
}

#[test]
fn test_readers_keep_their_snapshot() {
    let slot = LatestValueSlot::new();
    slot.publish(vec![1, 2, 3]);
    let snapshot = slot.read().unwrap();

    slot.publish(vec![4]);
    assert_eq!(*snapshot, vec![1, 2, 3]);
    assert_eq!(*slot.read().unwrap(), vec![4]);
}

#[test]
fn test_clear_and_age() {
    let slot = LatestValueSlot::new();
    slot.publish(1u8);
    let (value, published_at) = slot.read_with_age().unwrap();
    assert_eq!(*value, 1);
    assert!(published_at.elapsed().as_secs() < 5);

    slot.clear();
    assert!(slot.read_with_age().is_none());
    assert_eq!(slot.sequence(), 0);
}

#[test]
fn test_concurrent_publish_and_read() {
    let slot = Arc::new(LatestValueSlot::new());

    let writers: Vec<_> = (0..4u64)
        .map(|writer| {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..1000u64 {
                    slot.publish((writer, i));
                }
            })
        })
        .collect();

    let reader = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            let mut last_seen = [None::<u64>; 4];
            for _ in 0..2000 {
                if let Some(value) = slot.read() {
                    let (writer, i) = *value;
                    let index = usize::try_from(writer).unwrap();
                    // Values from one writer never go backwards
                    if let Some(previous) = last_seen[index] {
                        assert!(i >= previous);
                    }
                    last_seen[index] = Some(i);
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(slot.sequence(), 4000);
    let (_, i) = *slot.read().unwrap();
    assert_eq!(i, 999);
}
