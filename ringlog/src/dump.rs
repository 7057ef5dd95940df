//! Print a region to a byte sink, once or continuously.
use std::io::{ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::follow::{FollowLine, CURSOR_ALL};
use crate::stamp::{format_stamp, StampZone};
use crate::{Error, Ringlogger};

/// Pause between two polls of [`dump_continuous`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct DumpOptions {
    pub zone: StampZone,
    pub poll_interval: Duration,
}

/// Why [`dump_continuous`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stopped {
    Cancelled,
    /// The sink does not accept more data, a normal way to end a tail.
    SinkClosed,
}

enum Flow {
    Continue,
    Closed,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            zone: StampZone::Utc,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Write every line currently in the ring, oldest first.
///
/// Returns the number of bytes written. A sink closing early ends the dump without error.
pub fn dump_snapshot<W: Write>(
    logger: &Ringlogger,
    sink: &mut W,
    options: &DumpOptions,
) -> Result<u64, Error> {
    let (lines, _) = logger.follow_from_cursor(CURSOR_ALL);
    let mut buffer = Vec::new();
    let mut written = 0;

    for line in &lines {
        if let Flow::Closed = emit(sink, line, options.zone, &mut buffer)? {
            debug!(written, "sink closed during snapshot");
            return Ok(written);
        }

        written += buffer.len() as u64;
    }

    check(sink.flush())?;
    Ok(written)
}

/// Write the ring and then every new line until cancelled or the sink closes.
///
/// `cancel` is checked once per poll.
pub fn dump_continuous<W: Write>(
    logger: &Ringlogger,
    sink: &mut W,
    cancel: &AtomicBool,
    options: &DumpOptions,
) -> Result<Stopped, Error> {
    let mut follower = logger.follower();
    let mut buffer = Vec::new();
    debug!(tag = logger.tag(), "following log region");

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!("dump cancelled");
            return Ok(Stopped::Cancelled);
        }

        let batch = follower.poll();
        if batch.missed > 0 {
            warn!(missed = batch.missed, "writers lapped the reader, lines were lost");
        }

        for line in &batch.lines {
            if let Flow::Closed = emit(sink, line, options.zone, &mut buffer)? {
                debug!("sink closed");
                return Ok(Stopped::SinkClosed);
            }
        }

        if !batch.lines.is_empty() {
            if let Flow::Closed = check(sink.flush())? {
                debug!("sink closed");
                return Ok(Stopped::SinkClosed);
            }
        }

        std::thread::sleep(options.poll_interval);
    }
}

/// Format a line into `buffer` and hand it to the sink in one write.
fn emit<W: Write>(
    sink: &mut W,
    line: &FollowLine,
    zone: StampZone,
    buffer: &mut Vec<u8>,
) -> Result<Flow, Error> {
    buffer.clear();
    buffer.extend_from_slice(format_stamp(line.stamp, zone).as_bytes());
    buffer.extend_from_slice(b": ");
    buffer.extend_from_slice(line.text.as_bytes());
    buffer.push(b'\n');

    check(sink.write_all(buffer))
}

fn check(result: std::io::Result<()>) -> Result<Flow, Error> {
    match result {
        Ok(()) => Ok(Flow::Continue),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::BrokenPipe | ErrorKind::WriteZero | ErrorKind::UnexpectedEof
            ) =>
        {
            Ok(Flow::Closed)
        }
        Err(err) => Err(Error::SinkWriteFailure(err)),
    }
}
