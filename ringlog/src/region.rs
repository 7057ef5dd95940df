use std::fs::{File, OpenOptions};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use memmap2::{MmapOptions, MmapRaw};
use ringlog_fd::{InheritableFd, SharedFd};
use tracing::{debug, trace, warn};

use crate::layout::{Region, MAGIC, MAX_TAG_LEN, REGION_SIZE};
use crate::Error;

/// A process-local handle to a shared log region.
///
/// The handle owns its mapping and descriptor. Both are released by [`Ringlogger::close`], at
/// the latest when the handle is dropped. The region itself lives on for as long as any process
/// maps it or, for regions created at a path, as long as the file exists.
pub struct Ringlogger {
    pub(crate) tag: String,
    mapping: Option<Mapping>,
    pub(crate) read_only: bool,
    pub(crate) prefix_tag: bool,
}

struct Mapping {
    map: MmapRaw,
    /// The descriptor we mapped, kept for `export_inheritable`.
    file: File,
}

impl Ringlogger {
    /// Create the region at `path`, or join it if another writer created it first.
    pub fn create(path: impl AsRef<Path>, tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .map_err(Error::RegionUnavailable)?;

        debug!(path = %path.display(), tag, "opening log region for writing");
        Self::from_writable_file(file, tag)
    }

    /// Create a fresh region in an anonymous memory file.
    ///
    /// Other processes can only reach it through [`Ringlogger::export_inheritable`].
    pub fn create_anonymous(tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;

        let memfile = memfile::CreateOptions::new()
            .create("ringlog")
            .map_err(Error::RegionUnavailable)?;
        // Safety: we consume the memfile, the descriptor has no other owner.
        let file = unsafe { File::from_raw_fd(memfile.into_raw_fd()) };

        debug!(tag, "creating anonymous log region");
        Self::from_writable_file(file, tag)
    }

    /// Map an existing region read-only.
    pub fn open(path: impl AsRef<Path>, tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::RegionUnavailable)?;

        debug!(path = %path.display(), tag, "opening log region for reading");
        Self::from_readable_file(file, tag)
    }

    /// Map the region behind a token exported by [`Ringlogger::export_inheritable`], read-only.
    ///
    /// # Safety
    ///
    /// The caller asserts that the token names a descriptor that was passed to this process for
    /// this purpose and that is owned by no other resource. A token is redeemable exactly once,
    /// this handle closes the descriptor.
    pub unsafe fn attach(token: &str, tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;
        let shared = SharedFd::from_token(token)?;

        debug!(fd = shared.as_raw_fd(), tag, "attaching to inherited log region");
        Self::from_readable_file(shared.into_file(), tag)
    }

    /// Like [`Ringlogger::attach`], reading the token from the environment variable `var`.
    ///
    /// # Safety
    ///
    /// See [`Ringlogger::attach`].
    pub unsafe fn attach_env(var: &str, tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;
        let shared = SharedFd::from_env(var)?;

        debug!(fd = shared.as_raw_fd(), var, tag, "attaching to inherited log region");
        Self::from_readable_file(shared.into_file(), tag)
    }

    /// Map the region a service manager passed under `name` in `LISTEN_FDNAMES`, read-only.
    ///
    /// # Safety
    ///
    /// See [`Ringlogger::attach`].
    pub unsafe fn attach_listen(name: &str, tag: &str) -> Result<Self, Error> {
        check_tag(tag)?;
        let shared = SharedFd::from_listen_env(name)?;

        debug!(fd = shared.as_raw_fd(), name, tag, "attaching to listen descriptor");
        Self::from_readable_file(shared.into_file(), tag)
    }

    fn from_writable_file(file: File, tag: &str) -> Result<Self, Error> {
        let len = file.metadata().map_err(Error::RegionUnavailable)?.len();

        if len == 0 {
            file.set_len(REGION_SIZE as u64)
                .map_err(Error::RegionUnavailable)?;
        } else if len < REGION_SIZE as u64 {
            warn!(len, "refusing to map a file too small to hold a log region");
            return Err(Error::InvalidRegion);
        }

        let map = MmapOptions::new()
            .len(REGION_SIZE)
            .map_raw(&file)
            .map_err(Error::RegionUnavailable)?;
        let mapping = Mapping { map, file };

        let region = mapping.region().ok_or(Error::InvalidRegion)?;
        match region.init_magic() {
            Ok(true) => debug!(tag, "initialized log region"),
            Ok(false) => debug!(tag, index = region.next_index(), "joined existing log region"),
            Err(magic) => {
                warn!(magic = format_args!("{magic:#x}"), "refusing to write to foreign memory");
                return Err(Error::InvalidRegion);
            }
        }

        Ok(Ringlogger {
            tag: tag.to_owned(),
            mapping: Some(mapping),
            read_only: false,
            prefix_tag: false,
        })
    }

    fn from_readable_file(file: File, tag: &str) -> Result<Self, Error> {
        let len = file.metadata().map_err(Error::RegionUnavailable)?.len();

        if len < REGION_SIZE as u64 {
            warn!(len, "file too small to hold a log region");
            return Err(Error::InvalidRegion);
        }

        let map = MmapOptions::new()
            .len(REGION_SIZE)
            .map_raw_read_only(&file)
            .map_err(Error::RegionUnavailable)?;
        let mapping = Mapping { map, file };

        let magic = mapping.region().ok_or(Error::InvalidRegion)?.magic();
        if magic != MAGIC {
            warn!(magic = format_args!("{magic:#x}"), "memory is not a log region");
            return Err(Error::InvalidRegion);
        }

        Ok(Ringlogger {
            tag: tag.to_owned(),
            mapping: Some(mapping),
            read_only: true,
            prefix_tag: false,
        })
    }

    /// Store lines as `"[TAG] text"`.
    pub fn prefix_tag(mut self, enabled: bool) -> Self {
        self.prefix_tag = enabled;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.mapping.is_none()
    }

    /// Duplicate our descriptor for a child process.
    ///
    /// Hand [`InheritableFd::token`] to exactly one child and drop the returned value once the
    /// child was spawned.
    pub fn export_inheritable(&self) -> Result<InheritableFd, Error> {
        let mapping = self.mapping.as_ref().ok_or(Error::Closed)?;
        InheritableFd::duplicate(&mapping.file).map_err(Error::RegionUnavailable)
    }

    /// Unmap the region and close the descriptor.
    ///
    /// Calling it again is a no-op. Failures to unmap are not observable.
    pub fn close(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            trace!(tag = %self.tag, "closing log region");
            drop(mapping);
        }
    }

    pub(crate) fn region(&self) -> Option<Region<'_>> {
        self.mapping.as_ref().and_then(Mapping::region)
    }
}

impl Mapping {
    fn region(&self) -> Option<Region<'_>> {
        // Safety: the map stays alive for the borrow of `self` and is `REGION_SIZE` long. The
        // pages are shared with other processes, all our accesses are atomic. Read-only maps are
        // only handed to `Ringlogger`s with `read_only` set, which never write.
        unsafe { Region::from_raw(self.map.as_ptr(), self.map.len()) }
    }
}

impl Drop for Ringlogger {
    fn drop(&mut self) {
        self.close();
    }
}

impl core::fmt::Debug for Ringlogger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ringlogger")
            .field("tag", &self.tag)
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_tag(tag: &str) -> Result<(), Error> {
    if tag.len() > MAX_TAG_LEN {
        return Err(Error::TagTooLong(tag.len()));
    }

    Ok(())
}
