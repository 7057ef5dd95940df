#![cfg(target_family = "unix")]
use std::collections::HashSet;

use ringlog::{FollowLine, Ringlogger, CURSOR_ALL, SLOT_COUNT};

fn texts(lines: &[FollowLine]) -> Vec<&str> {
    lines.iter().map(|line| line.text.as_str()).collect()
}

#[test]
fn hello_world() {
    let logger = Ringlogger::create_anonymous("T1").unwrap();
    logger.append_with_timestamp("hello", 1000).unwrap();
    logger.append_with_timestamp("world", 2000).unwrap();

    let (lines, next) = logger.follow_from_cursor(CURSOR_ALL);
    assert_eq!(
        lines,
        [
            FollowLine { text: "hello".into(), stamp: 1000 },
            FollowLine { text: "world".into(), stamp: 2000 },
        ]
    );
    assert_eq!(next, 2);
}

#[test]
fn all_of_a_partial_ring() {
    let logger = Ringlogger::create_anonymous("P").unwrap();
    let appended: Vec<String> = (0..SLOT_COUNT).map(|i| format!("line {i}")).collect();

    for (n, text) in appended.iter().enumerate() {
        logger.append(text).unwrap();
        if n == 9 {
            let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
            assert_eq!(texts(&lines), appended[..10]);
        }
    }

    let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
    assert_eq!(texts(&lines), appended);
}

#[test]
fn all_of_an_overwritten_ring() {
    let logger = Ringlogger::create_anonymous("O").unwrap();
    let total = 3 * SLOT_COUNT + 17;

    for i in 0..total {
        logger.append(&i.to_string()).unwrap();
    }

    let (lines, next) = logger.follow_from_cursor(CURSOR_ALL);
    let expected: Vec<String> = (total - SLOT_COUNT..total).map(|i| i.to_string()).collect();
    assert_eq!(texts(&lines), expected);
    assert_eq!(next, total % SLOT_COUNT);
}

#[test]
fn chained_cursor_is_stable() {
    let logger = Ringlogger::create_anonymous("S").unwrap();
    logger.append("only").unwrap();

    let (_, cursor) = logger.follow_from_cursor(CURSOR_ALL);
    let (lines, again) = logger.follow_from_cursor(cursor);
    assert!(lines.is_empty());
    assert_eq!(again, cursor);

    let (lines, again) = logger.follow_from_cursor(again);
    assert!(lines.is_empty());
    assert_eq!(again, cursor);
}

#[test]
fn chained_cursor_returns_new_lines() {
    let logger = Ringlogger::create_anonymous("N").unwrap();
    for i in 0..100 {
        logger.append(&format!("old {i}")).unwrap();
    }

    let (_, mut cursor) = logger.follow_from_cursor(CURSOR_ALL);

    for batch in [1, 7, SLOT_COUNT - 1, SLOT_COUNT / 2] {
        let appended: Vec<String> = (0..batch).map(|i| format!("new {batch} {i}")).collect();
        for text in &appended {
            logger.append(text).unwrap();
        }

        let (lines, next) = logger.follow_from_cursor(cursor);
        assert_eq!(texts(&lines), appended, "batch of {batch}");
        cursor = next;
    }
}

#[test]
fn empty_region() {
    let logger = Ringlogger::create_anonymous("E").unwrap();
    let (lines, cursor) = logger.follow_from_cursor(CURSOR_ALL);
    assert!(lines.is_empty());
    assert_eq!(cursor, 0);

    logger.append("first").unwrap();
    let (lines, _) = logger.follow_from_cursor(cursor);
    assert_eq!(texts(&lines), ["first"]);
}

#[test]
fn concurrent_writers_never_share_a_slot() {
    const THREADS: u32 = 8;
    let logger = Ringlogger::create_anonymous("MT").unwrap();

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let logger = &logger;
            scope.spawn(move || {
                for i in 0..SLOT_COUNT / THREADS {
                    logger.append(&format!("{t} {i}")).unwrap();
                }
            });
        }
    });

    let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
    let unique: HashSet<_> = lines.iter().map(|line| line.text.as_str()).collect();
    assert_eq!(lines.len(), SLOT_COUNT as usize);
    assert_eq!(unique.len(), SLOT_COUNT as usize);
}

#[test]
fn concurrent_writers_keep_per_thread_order() {
    const THREADS: u32 = 4;
    const PER_THREAD: u32 = 1500;
    let logger = Ringlogger::create_anonymous("MT").unwrap();

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let logger = &logger;
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    logger.append(&format!("{t} {i}")).unwrap();
                }
            });
        }
    });

    let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
    assert_eq!(lines.len(), SLOT_COUNT as usize);

    let mut last = [None::<u32>; THREADS as usize];
    for line in &lines {
        let (t, i) = line.text.split_once(' ').unwrap();
        let (t, i): (usize, u32) = (t.parse().unwrap(), i.parse().unwrap());
        assert!(last[t] < Some(i), "thread {t} went back to {i}");
        last[t] = Some(i);
    }
}

#[test]
fn reader_follows_concurrent_writer() {
    let writer = Ringlogger::create_anonymous("W").unwrap();
    let token = writer.export_inheritable().unwrap().into_token();
    let reader = unsafe { Ringlogger::attach(&token, "R") }.unwrap();
    const COUNT: u32 = 500;

    let seen = std::thread::scope(|scope| {
        let producer = scope.spawn(|| {
            for i in 0..COUNT {
                writer.append(&i.to_string()).unwrap();
                if i % 50 == 0 {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            }
        });

        let mut follower = reader.follower();
        let mut seen = Vec::new();
        loop {
            let done = producer.is_finished();
            let batch = follower.poll();
            assert_eq!(batch.missed, 0);
            seen.extend(batch.lines.into_iter().map(|line| line.text.parse::<u32>().unwrap()));
            if done {
                break seen;
            }
        }
    });

    // A slot caught between its claim and its publication is skipped, never repeated or torn.
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{seen:?}");
}
