//! Parse the LISTEN_FDS environment variables.
//!
//! A service manager may open the log region for us and pass it as one of the named listen
//! descriptors, starting at descriptor 3.
use std::os::fd::RawFd;

pub struct ListenFd {
    pub fd_base: RawFd,
    pub fd_len: RawFd,
    pub names: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("LISTEN_PID is not this process")]
    BadPid,
    #[error("LISTEN_FDS is not a descriptor count")]
    BadFd,
    #[error("LISTEN_FDNAMES is not valid")]
    BadNames,
}

// https://github.com/systemd/systemd/blob/414ae39821f0c103b076fc5f7432f827e0e79765/src/libsystemd/sd-daemon/sd-daemon.c#L92-L129
impl ListenFd {
    /// Read the variables of this process, `None` if no descriptors were passed.
    pub fn new() -> Option<Result<Self, Error>> {
        let count = std::env::var_os("LISTEN_FDS")?;
        let Some(count) = count.to_str() else {
            return Some(Err(Error::BadFd));
        };

        let pid = std::env::var_os("LISTEN_PID");
        let Ok(pid) = pid.as_deref().map(|pid| pid.to_str().ok_or(Error::BadPid)).transpose() else {
            return Some(Err(Error::BadPid));
        };

        let names = std::env::var_os("LISTEN_FDNAMES");
        // Must be a subset of ASCII.
        let Ok(names) = names.as_deref().map(|n| n.to_str().ok_or(Error::BadNames)).transpose() else {
            return Some(Err(Error::BadNames));
        };

        let own_pid = unsafe { libc::getpid() };
        Some(Self::from_vars(count, pid, names, own_pid))
    }

    pub fn from_vars(
        count: &str,
        pid: Option<&str>,
        names: Option<&str>,
        own_pid: libc::pid_t,
    ) -> Result<Self, Error> {
        if let Some(pid) = pid {
            let Ok(pid): Result<libc::pid_t, _> = pid.parse() else {
                return Err(Error::BadPid);
            };

            if pid != own_pid {
                return Err(Error::BadPid);
            }
        }

        let Ok(fd_len): Result<RawFd, _> = count.parse() else {
            return Err(Error::BadFd);
        };

        if fd_len < 0 {
            return Err(Error::BadFd);
        }

        let names: Vec<String> = match names {
            Some(names) => names.split(':').map(String::from).collect(),
            None => Vec::new(),
        };

        if names.len() > fd_len as usize {
            return Err(Error::BadNames);
        }

        Ok(ListenFd {
            fd_base: 3,
            fd_len,
            names,
        })
    }

    /// The descriptor passed under `name`.
    pub fn position(&self, name: &str) -> Option<RawFd> {
        let num = self.names.iter().position(|v| v == name)?;
        Some(self.fd_base + num as RawFd)
    }
}
