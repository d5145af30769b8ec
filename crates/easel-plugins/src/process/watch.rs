//! Input watch on a plug-in's read pipe.
//!
//! A reader thread blocks on the pipe and forwards decoded messages over an
//! unbounded channel. The host side drains the channel from a local task so
//! every message is handled on the host's single thread.

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::WireError;
use crate::protocol::{Message, WireCodec};

use super::PROCESS_TARGET;

/// What the reader thread observed.
#[derive(Debug)]
pub(crate) enum WatchEvent {
    /// A complete message.
    Message(Message),
    /// The plug-in closed its end without a partial frame.
    Hangup,
    /// The pipe failed or carried an invalid frame.
    ReadFailed(WireError),
}

/// Running watch; dropping it leaves the dispatch task running, so call
/// [`InputWatch::stop`].
pub(crate) struct InputWatch {
    task: JoinHandle<()>,
}

impl InputWatch {
    pub(crate) const fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stops dispatching. The reader thread ends once the pipe closes.
    pub(crate) fn stop(self) {
        self.task.abort();
    }
}

/// Starts the reader thread for `pipe`.
pub(crate) fn spawn_reader(
    label: String,
    pipe: File,
    codec: Arc<dyn WireCodec>,
) -> io::Result<UnboundedReceiver<WatchEvent>> {
    let (sender, receiver) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name(format!("easel-watch-{label}"))
        .spawn(move || read_loop(&label, pipe, codec.as_ref(), &sender))?;
    Ok(receiver)
}

fn read_loop(label: &str, pipe: File, codec: &dyn WireCodec, sender: &UnboundedSender<WatchEvent>) {
    let mut reader = BufReader::new(pipe);
    loop {
        let event = match codec.read_message(&mut reader) {
            Ok(Some(message)) => WatchEvent::Message(message),
            Ok(None) => WatchEvent::Hangup,
            Err(err) => WatchEvent::ReadFailed(err),
        };
        let last = !matches!(event, WatchEvent::Message(_));
        if sender.send(event).is_err() || last {
            break;
        }
    }
    debug!(target: PROCESS_TARGET, plug_in = label, "input watch finished");
}
