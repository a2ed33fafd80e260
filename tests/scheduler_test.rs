//! Task scheduler tests: priority order, panics, timeouts, shedding


use smart_mirror::config::SchedulerConfig;
use smart_mirror::scheduler::TaskScheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use test_helpers::wait_for;

fn single_worker() -> TaskScheduler {
    TaskScheduler::new(SchedulerConfig {
        workers: 1,
        ..SchedulerConfig::default()
    })
}

#[test]
fn test_priority_zero_runs_before_queued_priority_two() {
    let scheduler = single_worker();
    let order = Arc::new(AtomicUsize::new(0));

    let mut low = Vec::new();
    for i in 0..5 {
        let order = Arc::clone(&order);
        low.push(scheduler.schedule_with_result(2, Some(format!("low-{i}").as_str()), move || {
            order.fetch_add(1, Ordering::SeqCst)
        }));
    }
    let urgent = {
        let order = Arc::clone(&order);
        scheduler.schedule_with_result(0, Some("urgent"), move || order.fetch_add(1, Ordering::SeqCst))
    };
    assert_eq!(scheduler.pending_tasks(), 6);

    scheduler.start().unwrap();
    // The last low-priority task finishes last on a single worker
    assert!(wait_for(Duration::from_secs(2), || scheduler
        .get_result::<usize>(&low[4], false)
        .is_some()));
    assert_eq!(order.load(Ordering::SeqCst), 6);

    let urgent_rank: usize = scheduler.get_result(&urgent, true).unwrap();
    assert_eq!(urgent_rank, 0);
    for (i, id) in low.iter().enumerate() {
        let rank: usize = scheduler.get_result(id, true).unwrap();
        assert_eq!(rank, i + 1, "equal priorities keep submission order");
    }
    scheduler.stop();
}

#[test]
fn test_panicking_task_does_not_kill_worker() {
    let scheduler = single_worker();
    scheduler.start().unwrap();

    scheduler.schedule(0, Some("boom"), || panic!("task failure"));
    let id = scheduler.schedule_with_result(1, Some("after"), || "still alive".to_string());

    assert!(wait_for(Duration::from_secs(2), || scheduler.has_results()));
    assert_eq!(scheduler.take_result::<String>(&id).as_deref(), Some("still alive"));
    scheduler.stop();
}

#[test]
fn test_overrunning_task_result_is_discarded() {
    let scheduler = TaskScheduler::new(SchedulerConfig {
        workers: 1,
        task_timeout_ms: 20,
        ..SchedulerConfig::default()
    });
    scheduler.start().unwrap();

    let slow = scheduler.schedule_with_result(0, Some("slow"), || {
        thread::sleep(Duration::from_millis(60));
        1u32
    });
    let fast = scheduler.schedule_with_result(1, Some("fast"), || 2u32);

    assert!(wait_for(Duration::from_secs(2), || scheduler.get_result::<u32>(&fast, false).is_some()));
    assert_eq!(scheduler.get_result::<u32>(&slow, false), None);
    scheduler.stop();
}

#[test]
fn test_get_result_without_clear_keeps_value() {
    let scheduler = single_worker();
    scheduler.start().unwrap();
    let id = scheduler.schedule_with_result(0, None, || vec![1, 2, 3]);

    assert!(wait_for(Duration::from_secs(2), || scheduler.has_results()));
    assert_eq!(scheduler.get_result::<Vec<i32>>(&id, false), Some(vec![1, 2, 3]));
    assert_eq!(scheduler.get_result::<Vec<i32>>(&id, true), Some(vec![1, 2, 3]));
    assert_eq!(scheduler.get_result::<Vec<i32>>(&id, true), None);
    assert!(!scheduler.has_results());
    scheduler.stop();
}

#[test]
fn test_wrong_result_type_keeps_value() {
    let scheduler = single_worker();
    scheduler.start().unwrap();
    let id = scheduler.schedule_with_result(0, None, || 42u64);

    assert!(wait_for(Duration::from_secs(2), || scheduler.has_results()));
    assert_eq!(scheduler.take_result::<String>(&id), None);
    assert_eq!(scheduler.get_result::<i32>(&id, true), None);
    assert!(scheduler.has_results());
    assert_eq!(scheduler.take_result::<u64>(&id), Some(42));
    assert!(!scheduler.has_results());
    scheduler.stop();
}

#[test]
fn test_full_queue_drops_new_tasks() {
    let scheduler = TaskScheduler::new(SchedulerConfig {
        workers: 1,
        queue_capacity: 3,
        ..SchedulerConfig::default()
    });
    let ran = Arc::new(Mutex::new(Vec::new()));
    for name in ["a", "b", "c", "d", "e"] {
        let ran = Arc::clone(&ran);
        scheduler.schedule(1, Some(name), move || ran.lock().unwrap().push(name));
    }
    assert_eq!(scheduler.pending_tasks(), 3);

    scheduler.start().unwrap();
    assert!(wait_for(Duration::from_secs(2), || ran.lock().unwrap().len() == 3));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(*ran.lock().unwrap(), vec!["a", "b", "c"]);
    scheduler.stop();
}

#[test]
fn test_restart_after_stop() {
    let scheduler = single_worker();
    scheduler.schedule(1, None, || {});
    scheduler.schedule(1, None, || {});
    scheduler.stop();
    assert!(!scheduler.is_running());

    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    scheduler.stop();
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[test]
fn test_clear_results() {
    let scheduler = single_worker();
    scheduler.start().unwrap();
    scheduler.schedule_with_result(0, Some("x"), || 1u8);
    assert!(wait_for(Duration::from_secs(2), || scheduler.has_results()));
    scheduler.clear_results();
    assert!(!scheduler.has_results());
    scheduler.stop();
}
