//! Bounded write buffer in front of a plug-in's pipe.

use std::io::{self, ErrorKind, Write};

/// Capacity used when none is configured.
pub const DEFAULT_WRITE_BUFFER_CAPACITY: usize = 512;

/// Accumulates outgoing bytes and writes them in as few syscalls as possible.
///
/// The buffer never grows past its capacity: a write that would overflow it
/// first drains the pending bytes. Draining retries on
/// [`ErrorKind::WouldBlock`] and [`ErrorKind::Interrupted`] and fails on any
/// other error.
#[derive(Debug)]
pub struct BufferedWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    capacity: usize,
}

impl<W: Write> BufferedWriter<W> {
    /// Wraps `inner` with the default capacity.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_WRITE_BUFFER_CAPACITY, inner)
    }

    /// Wraps `inner` with room for `capacity` bytes. A zero capacity is
    /// raised to one byte.
    #[must_use]
    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        let bounded = capacity.max(1);
        Self {
            inner,
            buffer: Vec::with_capacity(bounded),
            capacity: bounded,
        }
    }

    /// Bytes waiting to be written.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The wrapped writer.
    #[must_use]
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Discards pending bytes and returns the wrapped writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn drain(&mut self) -> io::Result<()> {
        let outcome = write_all_retrying(&mut self.inner, &self.buffer);
        self.buffer.clear();
        outcome
    }
}

impl<W: Write> Write for BufferedWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buffer.len() + data.len() > self.capacity {
            self.drain()?;
        }
        if data.len() >= self.capacity {
            write_all_retrying(&mut self.inner, data)?;
        } else {
            self.buffer.extend_from_slice(data);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) => std::thread::yield_now(),
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

fn write_all_retrying<W: Write>(writer: &mut W, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(written) => data = data.get(written..).unwrap_or_default(),
            Err(err) if is_transient(&err) => std::thread::yield_now(),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
