//! Sortable timestamps for dumped lines.
use std::time::{Duration, UNIX_EPOCH};

/// The time zone timestamps are shown in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StampZone {
    #[default]
    Utc,
    Local,
}

/// Format ns since the UNIX epoch as `YYYY-MM-DD HH:MM:SS.ffffff`.
///
/// Times before the epoch are shown as the epoch.
pub fn format_stamp(stamp: i64, zone: StampZone) -> String {
    let secs = stamp.div_euclid(1_000_000_000);
    let nanos = stamp.rem_euclid(1_000_000_000) as u32;

    let shifted = match zone {
        StampZone::Utc => secs,
        StampZone::Local => secs.saturating_add(local_offset(secs)),
    };

    let time = match u64::try_from(shifted) {
        Ok(secs) => UNIX_EPOCH + Duration::new(secs, nanos),
        Err(_) => UNIX_EPOCH,
    };

    // `2018-02-14T00:28:07.123456Z`
    let mut formatted = humantime::format_rfc3339_micros(time)
        .to_string()
        .replacen('T', " ", 1);
    formatted.pop();
    formatted
}

/// Seconds east of UTC of the local zone at `secs`.
fn local_offset(secs: i64) -> i64 {
    let Ok(time) = libc::time_t::try_from(secs) else {
        return 0;
    };

    let mut tm = core::mem::MaybeUninit::<libc::tm>::zeroed();
    // Safety: both pointers are valid, `localtime_r` is the reentrant variant.
    if unsafe { libc::localtime_r(&time, tm.as_mut_ptr()) }.is_null() {
        return 0;
    }

    // Safety: initialized on success.
    i64::from(unsafe { tm.assume_init() }.tm_gmtoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microsecond_precision() {
        assert_eq!(format_stamp(1000, StampZone::Utc), "1970-01-01 00:00:00.000001");
        assert_eq!(
            format_stamp(1_700_000_000_123_456_789, StampZone::Utc),
            "2023-11-14 22:13:20.123456"
        );
    }

    #[test]
    fn clamps_before_epoch() {
        assert_eq!(format_stamp(-5, StampZone::Utc), "1970-01-01 00:00:00.000000");
    }

    #[test]
    fn local_keeps_shape() {
        let local = format_stamp(1_700_000_000_000_000_000, StampZone::Local);
        assert_eq!(local.len(), "2023-11-14 22:13:20.000000".len());
        assert!(local.ends_with(".000000"), "{local}");
    }
}
