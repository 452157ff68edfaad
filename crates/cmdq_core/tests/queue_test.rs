//! Integration tests for the command queue.

use cmdq_core::{CommandQueue, QueueConfig, QueueError, ReturnSlot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn append_char(log: Arc<Mutex<String>>, c: char) {
    log.lock().push(c);
}

fn ret() -> i32 {
    1
}

fn inc(a: i32) -> i32 {
    a + 1
}

fn add2(a: i32, b: i32) -> i32 {
    a + b
}

fn add3(a: i32, b: i32, c: i32) -> i32 {
    a + b + c
}

fn add4(a: i32, b: i32, c: i32, d: i32) -> i32 {
    a + b + c + d
}

fn add5(a: i32, b: i32, c: i32, d: i32, e: i32) -> i32 {
    a + b + c + d + e
}

fn add6(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32) -> i32 {
    a + b + c + d + e + f
}

#[test]
fn test_single_producer_order() {
    let queue = CommandQueue::new().unwrap();
    let log = Arc::new(Mutex::new(String::new()));

    queue.execute(append_char, (Arc::clone(&log), 'a')).unwrap();
    queue.execute(append_char, (Arc::clone(&log), 'b')).unwrap();
    queue.execute(append_char, (Arc::clone(&log), 'c')).unwrap();
    queue.join().unwrap();

    assert_eq!(*log.lock(), "abc");
}

#[test]
fn test_long_sequence_order() {
    let queue = CommandQueue::with_capacity(64).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10_000u32 {
        let seen = Arc::clone(&seen);
        queue.execute(move |n: u32| seen.lock().push(n), (i,)).unwrap();
    }
    queue.join().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 10_000);
    assert!(seen.iter().copied().eq(0..10_000));
}

#[test]
fn test_chained_calls() {
    let queue = CommandQueue::new().unwrap();
    let log = Arc::new(Mutex::new(String::new()));

    queue
        .then(append_char, (Arc::clone(&log), 'x'))
        .unwrap()
        .then(append_char, (Arc::clone(&log), 'y'))
        .unwrap()
        .then(append_char, (Arc::clone(&log), 'z'))
        .unwrap();
    queue.join().unwrap();

    assert_eq!(*log.lock(), "xyz");
}

#[test]
fn test_returns_all_arities() {
    let queue = CommandQueue::new().unwrap();
    let mut r = ReturnSlot::new();

    queue.returns(ret, &r, ()).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(1));

    queue.returns(inc, &r, (1,)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(2));

    queue.returns(add2, &r, (2, 3)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(5));

    queue.returns(add3, &r, (1, 2, 3)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(6));

    queue.returns(add4, &r, (1, 2, 3, 4)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(10));

    queue.returns(add5, &r, (1, 2, 3, 4, 5)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(15));

    queue.returns(add6, &r, (1, 2, 3, 4, 5, 6)).unwrap();
    queue.join().unwrap();
    assert_eq!(r.take(), Some(21));
}

#[test]
fn test_returns_owned_result() {
    let queue = CommandQueue::new().unwrap();
    let greeting = ReturnSlot::new();

    queue
        .returns(|name: String| format!("Hello {name}"), &greeting, ("World".to_string(),))
        .unwrap();
    queue.join().unwrap();

    assert_eq!(greeting.into_inner().as_deref(), Some("Hello World"));
}

#[test]
fn test_two_threads_increment() {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn increment(counter: &'static AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    let queue = CommandQueue::new().unwrap();
    thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..1000 {
                    queue.execute(increment, (&COUNTER,)).unwrap();
                }
            });
        }
    });
    queue.join().unwrap();

    assert_eq!(COUNTER.load(Ordering::Relaxed), 2000);
}

#[test]
fn test_many_producers_stress() {
    const PRODUCERS: usize = 32;
    const PER_PRODUCER: usize = 2_000;

    let queue = CommandQueue::with_capacity(128).unwrap();
    let logs: Arc<Vec<Mutex<Vec<usize>>>> =
        Arc::new((0..PRODUCERS).map(|_| Mutex::new(Vec::new())).collect());

    let start = Instant::now();
    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let queue = &queue;
            let logs = Arc::clone(&logs);
            scope.spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let logs = Arc::clone(&logs);
                    queue
                        .execute(
                            move |p: usize, s: usize| logs[p].lock().push(s),
                            (producer, seq),
                        )
                        .unwrap();
                }
            });
        }
    });
    queue.join().unwrap();
    let elapsed = start.elapsed();

    let mut total = 0;
    for log in logs.iter() {
        let log = log.lock();
        assert_eq!(log.len(), PER_PRODUCER);
        assert!(log.iter().copied().eq(0..PER_PRODUCER), "per-producer order broken");
        total += log.len();
    }
    assert_eq!(total, PRODUCERS * PER_PRODUCER);

    let stats = queue.stats();
    println!("\n=== Many Producers Stress ===");
    println!("Commands: {}", total);
    println!("Elapsed: {:?}", elapsed);
    println!("Drains: {}", stats.drains);
    println!("Arena capacities: {:?}", queue.arena_capacities());
    assert_eq!(stats.commands_panicked, 0);
}

#[test]
fn test_join_waits_for_slow_commands() {
    let queue = CommandQueue::new().unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let done = Arc::clone(&done);
        queue
            .execute(
                move || {
                    thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                },
                (),
            )
            .unwrap();
    }
    queue.join().unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 5);
}

#[test]
fn test_checkpoint_reached_later() {
    let queue = CommandQueue::new().unwrap();
    let gate = Arc::new(Mutex::new(()));

    let held = gate.lock();
    let blocker = Arc::clone(&gate);
    queue.execute(move || drop(blocker.lock()), ()).unwrap();
    let checkpoint = queue.checkpoint().unwrap();

    assert_eq!(checkpoint.wait_timeout(Duration::from_millis(20)), Ok(false));
    assert!(!checkpoint.is_reached());

    drop(held);
    checkpoint.wait().unwrap();
    assert!(checkpoint.is_reached());
}

#[test]
fn test_drop_runs_pending_commands() {
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let queue = CommandQueue::new().unwrap();
        for _ in 0..1_000 {
            let ran = Arc::clone(&ran);
            queue
                .execute(move || ran.fetch_add(1, Ordering::Relaxed), ())
                .unwrap();
        }
    }
    assert_eq!(ran.load(Ordering::Relaxed), 1_000);
}

#[test]
fn test_drop_races_final_enqueue() {
    const ROUNDS: usize = 3_000;

    let ran = Arc::new(AtomicUsize::new(0));
    let mut expected = 0;
    for round in 0..ROUNDS {
        let queue = CommandQueue::new().unwrap();
        let commands = round % 4 + 1;
        for _ in 0..commands {
            // Vary the gap so the consumer is caught at different points of
            // its idle swap when the next command and the drop arrive.
            match round % 3 {
                0 => {}
                1 => thread::yield_now(),
                _ => thread::sleep(Duration::from_micros((round % 50) as u64)),
            }
            let ran = Arc::clone(&ran);
            queue
                .execute(move || ran.fetch_add(1, Ordering::Relaxed), ())
                .unwrap();
        }
        drop(queue);

        expected += commands;
        assert_eq!(
            ran.load(Ordering::Relaxed),
            expected,
            "round {round} lost a command"
        );
    }
}

#[test]
fn test_panicking_command_isolated() {
    let queue = CommandQueue::new().unwrap();
    let mut before = ReturnSlot::new();
    let mut failed: ReturnSlot<i32> = ReturnSlot::new();
    let mut after = ReturnSlot::new();

    queue.returns(add2, &before, (1, 1)).unwrap();
    queue
        .returns(|| -> i32 { panic!("command failed") }, &failed, ())
        .unwrap();
    queue.returns(add2, &after, (2, 2)).unwrap();
    queue.join().unwrap();

    assert_eq!(before.take(), Some(2));
    assert_eq!(failed.take(), None);
    assert_eq!(after.take(), Some(4));
    assert_eq!(queue.stats().commands_panicked, 1);
}

#[test]
fn test_join_from_consumer_rejected() {
    let queue = Arc::new(CommandQueue::new().unwrap());
    let mut result = ReturnSlot::new();

    queue
        .returns(|q: Arc<CommandQueue>| q.join(), &result, (Arc::clone(&queue),))
        .unwrap();
    queue.join().unwrap();

    assert_eq!(result.take(), Some(Err(QueueError::JoinFromConsumer)));
}

#[test]
fn test_enqueue_from_consumer() {
    let queue = Arc::new(CommandQueue::new().unwrap());
    let log = Arc::new(Mutex::new(String::new()));

    queue
        .execute(
            |q: Arc<CommandQueue>, log: Arc<Mutex<String>>| {
                log.lock().push('1');
                q.execute(append_char, (log, '2')).unwrap();
            },
            (Arc::clone(&queue), Arc::clone(&log)),
        )
        .unwrap();

    // Once the first join returns the nested command is queued, so the
    // second join covers it.
    queue.join().unwrap();
    queue.join().unwrap();
    assert_eq!(*log.lock(), "12");
}

#[test]
fn test_last_owner_dropped_on_consumer() {
    let queue = Arc::new(CommandQueue::new().unwrap());
    let ran = Arc::new(AtomicUsize::new(0));

    let held = Arc::clone(&queue);
    let counter = Arc::clone(&ran);
    queue
        .execute(
            move || {
                thread::sleep(Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
                drop(held);
            },
            (),
        )
        .unwrap();
    drop(queue);

    let deadline = Instant::now() + Duration::from_secs(5);
    while ran.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_queue_from_toml_config() {
    let config = QueueConfig::from_toml_str(
        r#"
        initial_capacity = 1024
        thread_name = "toml-consumer"
        "#,
    )
    .unwrap();
    let queue = CommandQueue::with_config(config).unwrap();
    assert_eq!(queue.arena_capacities(), [1024, 1024]);

    let mut name = ReturnSlot::new();
    queue
        .returns(|| thread::current().name().map(str::to_owned), &name, ())
        .unwrap();
    queue.join().unwrap();
    assert_eq!(name.take().flatten().as_deref(), Some("toml-consumer"));
}
