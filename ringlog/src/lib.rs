//! A circular log in shared memory.
//!
//! Any number of processes append short, timestamped lines to one fixed-size region without
//! taking locks. Slots are claimed by an atomic increment of an index in the shared header, and a
//! line becomes visible once its timestamp is written, which happens after the text. Readers,
//! including processes which only map the region read-only, snapshot the ring or follow it with
//! a cursor.
//!
//! ## Losing lines
//!
//! The ring keeps the latest [`SLOT_COUNT`] lines. A reader that falls further behind misses the
//! overwritten ones; a bare cursor resumes silently, a [`Follower`] counts them. A slot being
//! rewritten while it is read is skipped rather than returned torn.
//!
//! ## Sharing a region
//!
//! A region is either a file, usually on a `tmpfs`, that every participant opens by path, or an
//! anonymous memory file handed to a child process with [`Ringlogger::export_inheritable`]. The
//! region is released by the OS when the last mapping goes away.

mod dump;
mod error;
mod follow;
mod layout;
mod region;
mod stamp;
mod writer;

pub use dump::{dump_continuous, dump_snapshot, DumpOptions, Stopped, POLL_INTERVAL};
pub use error::Error;
pub use follow::{Batch, FollowLine, Follower, CURSOR_ALL};
pub use layout::{MAGIC, MAX_LINE_LEN, MAX_TAG_LEN, REGION_SIZE, SLOT_COUNT, SLOT_SIZE};
pub use region::Ringlogger;
pub use stamp::{format_stamp, StampZone};

pub use ringlog_fd::InheritableFd;
