use std::time::{SystemTime, UNIX_EPOCH};

use crate::layout::{Region, MAX_LINE_LEN};
use crate::{Error, Ringlogger};

/// Public interface of the writer.
impl Ringlogger {
    /// Append a line stamped with the current time.
    pub fn append(&self, text: &str) -> Result<(), Error> {
        self.append_with_timestamp(text, now_ns())
    }

    /// Append a line with a caller-chosen timestamp in ns since the UNIX epoch.
    ///
    /// Text beyond `MAX_LINE_LEN - 1` bytes is cut at a character boundary. A timestamp of 0
    /// marks unwritten slots and is stored as 1 instead.
    pub fn append_with_timestamp(&self, text: &str, stamp: i64) -> Result<(), Error> {
        let region = self.region().ok_or(Error::Closed)?;

        if self.read_only {
            return Err(Error::ReadOnly);
        }

        let tag = self.prefix_tag.then_some(self.tag.as_str());
        write_line(region, &encode(tag, text), stamp);
        Ok(())
    }
}

pub(crate) fn write_line(region: Region<'_>, line: &[u8; MAX_LINE_LEN], stamp: i64) -> u32 {
    // Two writers never share an index, even from different processes: the index is an atomic
    // in the shared pages.
    let index = region.reserve();
    region.slot(index).publish(line, if stamp == 0 { 1 } else { stamp });
    index
}

/// Lay out the stored text, always leaving a NUL terminator.
pub(crate) fn encode(tag: Option<&str>, text: &str) -> [u8; MAX_LINE_LEN] {
    let mut line = [0; MAX_LINE_LEN];
    let mut len = 0;

    let mut push = |part: &str| {
        let part = truncate(part, MAX_LINE_LEN - 1 - len);
        line[len..len + part.len()].copy_from_slice(part.as_bytes());
        len += part.len();
    };

    if let Some(tag) = tag {
        push("[");
        push(tag);
        push("] ");
    }

    push(text);
    line
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }

    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}

pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |since| i64::try_from(since.as_nanos()).unwrap_or(i64::MAX))
}
