//! The two unidirectional pipes connecting the host and one plug-in.

use std::fs::File;
use std::io::{self, BufReader};

#[cfg(unix)]
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::protocol::BufferedWriter;

/// Host and child ends of both pipes. Every field is released on its own;
/// releasing an empty field does nothing.
#[derive(Default)]
pub(crate) struct Channels {
    pub(crate) host_read: Option<BufReader<File>>,
    pub(crate) host_write: Option<BufferedWriter<File>>,
    #[cfg(unix)]
    child_read: Option<OwnedFd>,
    #[cfg(unix)]
    child_write: Option<OwnedFd>,
}

impl Channels {
    /// Creates both pipes. Host ends are close-on-exec; child ends stay
    /// inheritable.
    #[cfg(unix)]
    pub(crate) fn create(write_capacity: usize) -> io::Result<Self> {
        use nix::fcntl::{FcntlArg, FdFlag, fcntl};

        let (child_read, host_write) = nix::unistd::pipe().map_err(io::Error::from)?;
        let (host_read, child_write) = nix::unistd::pipe().map_err(io::Error::from)?;
        for host_end in [&host_read, &host_write] {
            fcntl(host_end.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
                .map_err(io::Error::from)?;
        }
        Ok(Self {
            host_read: Some(BufReader::new(File::from(host_read))),
            host_write: Some(BufferedWriter::with_capacity(
                write_capacity,
                File::from(host_write),
            )),
            child_read: Some(child_read),
            child_write: Some(child_write),
        })
    }

    /// Pipes are only available on unix hosts.
    #[cfg(not(unix))]
    pub(crate) fn create(_write_capacity: usize) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "plug-in pipes require a unix host",
        ))
    }

    /// Descriptor numbers the child reads from and writes to.
    #[cfg(unix)]
    pub(crate) fn child_fds(&self) -> Option<(RawFd, RawFd)> {
        let read = self.child_read.as_ref()?.as_raw_fd();
        let write = self.child_write.as_ref()?.as_raw_fd();
        Some((read, write))
    }

    /// Closes the host's copies of the child ends.
    pub(crate) fn close_child_ends(&mut self) {
        #[cfg(unix)]
        {
            self.child_read.take();
            self.child_write.take();
        }
    }

    /// Releases all four ends.
    pub(crate) fn release(&mut self) {
        self.host_read.take();
        self.host_write.take();
        self.close_child_ends();
    }

    /// Returns `true` when no end is held.
    pub(crate) fn is_released(&self) -> bool {
        #[cfg(unix)]
        let child_free = self.child_read.is_none() && self.child_write.is_none();
        #[cfg(not(unix))]
        let child_free = true;
        self.host_read.is_none() && self.host_write.is_none() && child_free
    }
}
