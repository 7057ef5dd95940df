//! Descriptor tokens for shared log regions.
//!
//! A token is the decimal number of a file descriptor that is open in the process redeeming it.
//! The exporting side duplicates its descriptor without close-on-exec, so that a child spawned
//! afterwards inherits the same number, and passes the number out-of-band: as an argument, in an
//! environment variable, or through the `LISTEN_FDS` protocol of a service manager.
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::process::Command;

mod listenfd;

pub use listenfd::{Error as ListenError, ListenFd};

/// Errors redeeming a descriptor token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token {0:?} is not a decimal descriptor number")]
    Malformed(String),
    #[error("descriptor {0} is not open in this process")]
    NotOpen(RawFd),
    #[error("environment variable {0} is not set")]
    MissingVar(String),
    #[error("no descriptor named {0:?} was passed")]
    MissingName(String),
    #[error("invalid listen descriptors: {0}")]
    Listen(#[from] ListenError),
}

/// A raw file descriptor, opened for us by another process.
///
/// The descriptor was validated to be open but is not owned until converted with
/// [`SharedFd::into_file`].
#[derive(Debug)]
pub struct SharedFd {
    fd: RawFd,
}

impl SharedFd {
    /// Parse and validate a decimal token.
    pub fn from_token(token: &str) -> Result<Self, TokenError> {
        let fd: RawFd = token
            .trim()
            .parse()
            .ok()
            .filter(|&fd: &RawFd| fd >= 0)
            .ok_or_else(|| TokenError::Malformed(token.to_owned()))?;

        let mut statbuf = core::mem::MaybeUninit::<libc::stat>::zeroed();
        // Safety: passing a pointer to a correctly sized, writable `libc::stat`.
        if -1 == unsafe { libc::fstat(fd, statbuf.as_mut_ptr()) } {
            return Err(TokenError::NotOpen(fd));
        }

        Ok(SharedFd { fd })
    }

    /// Import a token from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, TokenError> {
        let value = std::env::var(var).map_err(|_| TokenError::MissingVar(var.to_owned()))?;
        Self::from_token(&value)
    }

    /// Import the descriptor passed under `name` by a service manager.
    pub fn from_listen(listen: &ListenFd, name: &str) -> Result<Self, TokenError> {
        let fd = listen
            .position(name)
            .ok_or_else(|| TokenError::MissingName(name.to_owned()))?;
        Self::from_token(&fd.to_string())
    }

    /// Like [`SharedFd::from_listen`], with the `LISTEN_FDS` variables of this process.
    pub fn from_listen_env(name: &str) -> Result<Self, TokenError> {
        let listen = ListenFd::new().ok_or_else(|| TokenError::MissingVar("LISTEN_FDS".into()))??;
        Self::from_listen(&listen, name)
    }

    /// Take ownership of the descriptor.
    ///
    /// # Safety
    ///
    /// The caller asserts that no other resource in this process owns the descriptor. A token is
    /// redeemable exactly once.
    pub unsafe fn into_file(self) -> File {
        File::from_raw_fd(self.into_raw_fd())
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn into_raw_fd(self) -> RawFd {
        let _this = core::mem::ManuallyDrop::new(self);
        _this.fd
    }
}

impl AsRawFd for SharedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// An owned duplicate of a descriptor that survives `exec`.
///
/// Dropping it closes the duplicate in this process. Drop it once the child that should inherit
/// it has been spawned.
#[derive(Debug)]
pub struct InheritableFd {
    fd: OwnedFd,
}

impl InheritableFd {
    pub fn duplicate(fd: impl AsFd) -> Result<Self, std::io::Error> {
        // `dup` never sets FD_CLOEXEC on the new descriptor.
        match unsafe { libc::dup(fd.as_fd().as_raw_fd()) } {
            -1 => Err(std::io::Error::last_os_error()),
            // Safety: freshly created, owned by nothing else.
            raw => Ok(InheritableFd {
                fd: unsafe { OwnedFd::from_raw_fd(raw) },
            }),
        }
    }

    /// The token to hand to a child process.
    pub fn token(&self) -> String {
        self.fd.as_raw_fd().to_string()
    }

    /// Give up ownership, the token is to be redeemed within this process.
    pub fn into_token(self) -> String {
        self.fd.into_raw_fd().to_string()
    }

    /// Set the token as environment variable `var` of a child command.
    pub fn pass_to(&self, proc: &mut Command, var: &str) {
        proc.env(var, self.token());
    }
}

impl AsFd for InheritableFd {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
