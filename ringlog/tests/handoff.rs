//! Hand an anonymous region to a child process.
//!
//! The test binary re-executes itself, running only `child_reads_handed_over_region`, which does
//! nothing unless the token variable is set.
#![cfg(target_family = "unix")]
use std::process::Command;

use ringlog::{Error, Ringlogger, CURSOR_ALL};

const TOKEN_VAR: &str = "RINGLOG_TEST_TOKEN";

#[test]
fn parent_hands_over_region() {
    let logger = Ringlogger::create_anonymous("PAR").unwrap();
    logger.append_with_timestamp("hello", 1000).unwrap();
    logger.append_with_timestamp("world", 2000).unwrap();

    let exported = logger.export_inheritable().unwrap();
    let mut child = Command::new(std::env::current_exe().unwrap());
    child.args(["--exact", "child_reads_handed_over_region", "--nocapture"]);
    exported.pass_to(&mut child, TOKEN_VAR);

    let mut child = child.spawn().unwrap();
    // The child holds its own copy now.
    drop(exported);

    let status = child.wait().unwrap();
    assert!(status.success(), "child failed with {status}");

    // The child could not have written, our view is unchanged.
    let (lines, next) = logger.follow_from_cursor(CURSOR_ALL);
    assert_eq!(lines.len(), 2);
    assert_eq!(next, 2);
}

#[test]
fn child_reads_handed_over_region() {
    if std::env::var_os(TOKEN_VAR).is_none() {
        return;
    }

    let logger = unsafe { Ringlogger::attach_env(TOKEN_VAR, "CHD") }.unwrap();
    assert!(logger.is_read_only());

    let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
    let lines: Vec<_> = lines.iter().map(|line| (line.text.as_str(), line.stamp)).collect();
    assert_eq!(lines, [("hello", 1000), ("world", 2000)]);

    assert!(matches!(logger.append("from child"), Err(Error::ReadOnly)));
}
