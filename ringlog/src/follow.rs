//! Incremental reads from the ring.
//!
//! A cursor is the slot position, reduced modulo `SLOT_COUNT`, where the previous read stopped.
//! Reads never block and never fail. A slot that is unwritten, or that a writer is rewriting
//! while we copy it, is skipped.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::layout::{Region, SLOT_COUNT};
use crate::Ringlogger;

/// The cursor asking for the whole ring, oldest line first.
pub const CURSOR_ALL: u32 = u32::MAX;

/// A line read from the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowLine {
    pub text: String,
    /// Nanoseconds since the UNIX epoch.
    pub stamp: i64,
}

impl FollowLine {
    pub fn time(&self) -> SystemTime {
        let offset = Duration::from_nanos(self.stamp.unsigned_abs());

        if self.stamp >= 0 {
            UNIX_EPOCH + offset
        } else {
            UNIX_EPOCH - offset
        }
    }
}

/// The result of one pass over the ring.
pub(crate) struct Scan {
    pub(crate) lines: Vec<FollowLine>,
    pub(crate) next: u32,
    /// Number of slots visited.
    pub(crate) examined: u32,
    /// The raw write index the pass ran against.
    pub(crate) write_index: u32,
}

impl Ringlogger {
    /// Return all lines published since `cursor` and the cursor to continue from.
    ///
    /// With [`CURSOR_ALL`] the whole ring is returned, starting at the least recently written
    /// slot. A closed handle returns no lines and the cursor unchanged.
    pub fn follow_from_cursor(&self, cursor: u32) -> (Vec<FollowLine>, u32) {
        match self.region() {
            Some(region) => {
                let scan = scan(region, cursor);
                (scan.lines, scan.next)
            }
            None => (Vec::new(), cursor),
        }
    }

    /// Follow the ring from its current contents onward.
    pub fn follower(&self) -> Follower<'_> {
        Follower {
            logger: self,
            cursor: CURSOR_ALL,
            seen: None,
        }
    }
}

pub(crate) fn scan(region: Region<'_>, cursor: u32) -> Scan {
    let write_index = region.next_index();
    let stop = write_index % SLOT_COUNT;
    let everything = cursor == CURSOR_ALL;

    let mut position = if everything { stop } else { cursor % SLOT_COUNT };
    let mut lines = Vec::new();
    let mut examined = 0;

    // At most one sweep, whatever concurrent writers do to the index.
    while examined < SLOT_COUNT {
        if !everything && position == stop {
            break;
        }

        if let Some(line) = read_line(region, position) {
            lines.push(line);
        }

        position = (position + 1) % SLOT_COUNT;
        examined += 1;
    }

    Scan {
        lines,
        next: position,
        examined,
        write_index,
    }
}

fn read_line(region: Region<'_>, position: u32) -> Option<FollowLine> {
    let (stamp, text) = region.slot(position).read()?;
    let text = decode(&text)?;
    Some(FollowLine { text, stamp })
}

/// The text up to the first NUL, `None` for empty or unterminated text.
pub(crate) fn decode(text: &[u8]) -> Option<String> {
    let end = text.iter().position(|&b| b == 0)?;

    if end == 0 {
        return None;
    }

    Some(String::from_utf8_lossy(&text[..end]).into_owned())
}

/// Lines of one poll.
#[derive(Debug, Default)]
pub struct Batch {
    pub lines: Vec<FollowLine>,
    /// Lines written since the previous poll that were overwritten before we got to them.
    pub missed: u32,
}

/// A reader continuing where its previous poll stopped.
///
/// Unlike a bare cursor, it remembers the unreduced write index of its last poll and so notices
/// when writers lapped it. This holds as long as fewer than 2^32 lines are written between two
/// polls.
pub struct Follower<'lt> {
    logger: &'lt Ringlogger,
    cursor: u32,
    seen: Option<u32>,
}

impl Follower<'_> {
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn poll(&mut self) -> Batch {
        let Some(region) = self.logger.region() else {
            return Batch::default();
        };

        let scan = scan(region, self.cursor);
        let missed = match self.seen {
            Some(seen) => scan
                .write_index
                .wrapping_sub(seen)
                .saturating_sub(scan.examined),
            None => 0,
        };

        self.cursor = scan.next;
        self.seen = Some(scan.write_index);

        Batch {
            lines: scan.lines,
            missed,
        }
    }
}
