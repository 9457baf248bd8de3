//! Interactive exec relay.
//!
//! An exec session runs over one duplex hyperd call. After the initial
//! request, outbound messages carry stdin chunks and inbound messages carry
//! stdout/stderr chunks. The relay runs two halves concurrently inside the
//! calling task:
//!
//! - input forwarding reads the local source in [`STDIN_CHUNK_SIZE`] chunks
//!   and sends each one, then closes the send direction;
//! - output draining writes every inbound payload to its sink and owns the
//!   session outcome.
//!
//! Both halves report into one first-error-wins slot. When output draining
//! ends, input forwarding is stopped and awaited before the relay returns.

use crate::error::{Error, Result};
use crate::proto::hyperd;
use futures::{Stream, StreamExt};
use std::sync::OnceLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;
use uuid::Uuid;

/// Size of each stdin read forwarded to hyperd.
pub const STDIN_CHUNK_SIZE: usize = 32;

/// Local input source for a session.
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;
/// Local output sink for a session.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// What to run, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSession {
    pub container_id: String,
    /// Multiplexing tag hyperd uses to tell concurrent sessions apart.
    pub tag: String,
    pub command: Vec<String>,
    pub tty: bool,
}

impl ExecSession {
    /// Creates a session with a fresh random tag.
    pub fn new(container_id: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            container_id: container_id.into(),
            tag: Uuid::new_v4().to_string(),
            command,
            tty: false,
        }
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub(crate) fn initial_request(&self) -> hyperd::ContainerExecRequest {
        hyperd::ContainerExecRequest {
            container_id: self.container_id.clone(),
            command: self.command.clone(),
            tag: self.tag.clone(),
            tty: self.tty,
            stdin: Vec::new(),
        }
    }
}

/// Local ends of a session. Every stream is optional.
#[derive(Default)]
pub struct ExecStreams {
    pub stdin: Option<InputSource>,
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

impl ExecStreams {
    fn has_sinks(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }
}

/// Relays one established session until the remote side ends it, a half
/// fails, or `cancel` fires.
///
/// `outbound` is the send direction of the duplex call; the initial request
/// must already be queued on it.
///
/// With no output sinks the relay returns immediately and the input source
/// is left unread, even when one is supplied: nothing would observe the
/// session, and dropping `outbound` ends the call.
pub async fn relay<S>(
    outbound: mpsc::Sender<hyperd::ContainerExecRequest>,
    inbound: S,
    streams: ExecStreams,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<hyperd::ContainerExecResponse, Status>> + Unpin,
{
    if !streams.has_sinks() {
        debug!("exec session has no output sinks, not waiting for output");
        return Ok(());
    }

    let ExecStreams {
        stdin,
        stdout,
        stderr,
    } = streams;

    let outcome_slot = OnceLock::new();
    let session_token = cancel.child_token();
    let (outcome, session) = (&outcome_slot, &session_token);

    let input = async move {
        if let Some(reader) = stdin {
            if let Err(err) = forward_input(reader, &outbound, session).await {
                debug!("exec input forwarding failed: {}", err);
                let _ = outcome.set(err);
                session.cancel();
            }
        }
        // Dropping the sender closes the send direction.
        drop(outbound);
    };

    let output = async move {
        if let Err(err) = drain_output(inbound, stdout, stderr, session).await {
            let _ = outcome.set(err);
        }
        session.cancel();
    };

    tokio::join!(input, output);

    match outcome_slot.into_inner() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Reads the input source and forwards each chunk until end of input or
/// until the session is stopped.
///
/// A failed send means the transport already closed the call. That is not
/// an input error; the output side reports how the session ended.
async fn forward_input(
    mut reader: InputSource,
    outbound: &mpsc::Sender<hyperd::ContainerExecRequest>,
    session: &CancellationToken,
) -> Result<()> {
    let mut buf = [0u8; STDIN_CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            _ = session.cancelled() => return Ok(()),
            read = reader.read(&mut buf) => read?,
        };
        if read == 0 {
            return Ok(());
        }

        let chunk = hyperd::ContainerExecRequest {
            stdin: buf[..read].to_vec(),
            ..Default::default()
        };
        tokio::select! {
            _ = session.cancelled() => return Ok(()),
            sent = outbound.send(chunk) => {
                if sent.is_err() {
                    debug!("exec send direction closed by transport");
                    return Ok(());
                }
            }
        }
    }
}

/// Writes inbound payloads to their sinks until the remote end of stream.
async fn drain_output<S>(
    mut inbound: S,
    mut stdout: Option<OutputSink>,
    mut stderr: Option<OutputSink>,
    session: &CancellationToken,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<hyperd::ContainerExecResponse, Status>> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = session.cancelled() => return Err(Error::Cancelled),
            message = inbound.next() => message,
        };
        let Some(message) = message else {
            return Ok(());
        };
        let message = message?;

        if let Some(sink) = stdout.as_mut() {
            write_payload(sink, &message.stdout).await?;
        }
        if let Some(sink) = stderr.as_mut() {
            write_payload(sink, &message.stderr).await?;
        }
    }
}

/// Writes one payload with a single write call. Fewer bytes than requested
/// is a [`Error::ShortWrite`].
pub(crate) async fn write_payload<W>(sink: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.is_empty() {
        return Ok(());
    }
    let written = sink.write(payload).await?;
    if written != payload.len() {
        return Err(Error::ShortWrite {
            written,
            expected: payload.len(),
        });
    }
    sink.flush().await?;
    Ok(())
}
