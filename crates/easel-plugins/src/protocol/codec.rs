//! Framing of [`Message`] values on a byte stream.

use std::io::{BufRead, Write};

use crate::error::WireError;

use super::Message;

/// Reads and writes whole messages.
///
/// Implementations must be stateless so one codec can serve every open
/// plug-in, including from the reader threads of the input watches.
pub trait WireCodec: Send + Sync {
    /// Reads the next message.
    ///
    /// Returns `Ok(None)` when the stream ended cleanly between messages.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] when the stream fails, ends inside a frame, or
    /// carries an undecodable frame.
    fn read_message(&self, reader: &mut dyn BufRead) -> Result<Option<Message>, WireError>;

    /// Writes one message. The writer is not flushed.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] when encoding or writing fails.
    fn write_message(&self, writer: &mut dyn Write, message: &Message) -> Result<(), WireError>;
}

/// One JSON object per newline-terminated line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineCodec;

impl WireCodec for JsonLineCodec {
    fn read_message(&self, reader: &mut dyn BufRead) -> Result<Option<Message>, WireError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                return Ok(None);
            }
            if line.last() != Some(&b'\n') {
                return Err(WireError::Truncated);
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(&line)
                .map(Some)
                .map_err(|err| WireError::Decode {
                    message: err.to_string(),
                });
        }
    }

    fn write_message(&self, writer: &mut dyn Write, message: &Message) -> Result<(), WireError> {
        let mut frame = serde_json::to_vec(message).map_err(|err| WireError::Encode {
            message: err.to_string(),
        })?;
        frame.push(b'\n');
        writer.write_all(&frame)?;
        Ok(())
    }
}
