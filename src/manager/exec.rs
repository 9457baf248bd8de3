//! Kubelet `Exec` bridged onto a hyperd exec session.
//!
//! The first kubelet message names the container and command. Its stdin
//! payload and that of every later message form the session input. Output
//! chunks travel back as `ExecResponse` frames, one frame per sink write.

use super::{required, KubeHyperManager};
use crate::error::{Error, Result};
use crate::hyper::{ExecSession, ExecStreams};
use crate::proto::kubeapi::{ExecRequest, ExecResponse};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;
use tonic::{Status, Streaming};
use tracing::{debug, error};

/// Frames buffered towards the kubelet per session.
const EXEC_RESPONSE_BUFFER: usize = 16;

pub type ExecResponseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<ExecResponse, Status>> + Send + 'static>>;

#[derive(Debug, Clone, Copy)]
enum OutputKind {
    Stdout,
    Stderr,
}

/// Turns each write into one `ExecResponse` frame on the response channel.
struct FrameWriter {
    sender: PollSender<std::result::Result<ExecResponse, Status>>,
    kind: OutputKind,
}

impl FrameWriter {
    fn new(sender: mpsc::Sender<std::result::Result<ExecResponse, Status>>, kind: OutputKind) -> Self {
        Self {
            sender: PollSender::new(sender),
            kind,
        }
    }
}

impl AsyncWrite for FrameWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        ready!(self.sender.poll_reserve(cx)).map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;

        let frame = match self.kind {
            OutputKind::Stdout => ExecResponse {
                stdout: Some(buf.to_vec()),
                stderr: None,
            },
            OutputKind::Stderr => ExecResponse {
                stdout: None,
                stderr: Some(buf.to_vec()),
            },
        };
        self.sender
            .send_item(Ok(frame))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.sender.close();
        Poll::Ready(Ok(()))
    }
}

impl KubeHyperManager {
    /// Reads the opening message, then runs the session in the background
    /// and hands back the response stream.
    pub(super) async fn start_exec(&self, mut inbound: Streaming<ExecRequest>) -> Result<ExecResponseStream> {
        let first = inbound
            .message()
            .await?
            .ok_or(Error::MissingField("container_id"))?;
        let container_id = required(&first.container_id, "container_id")?;
        if first.cmd.is_empty() {
            return Err(Error::MissingField("cmd"));
        }

        let session = ExecSession::new(container_id, first.cmd.clone()).with_tty(first.tty());
        debug!(
            container_id = %session.container_id,
            tag = %session.tag,
            "Exec with command {:?}",
            session.command
        );

        let opening = Bytes::from(first.stdin.clone().unwrap_or_default());
        let input = stream::iter([Ok::<_, io::Error>(opening)]).chain(inbound.map(|message| {
            message
                .map(|req| Bytes::from(req.stdin.unwrap_or_default()))
                .map_err(io::Error::other)
        }));

        let (tx, rx) = mpsc::channel(EXEC_RESPONSE_BUFFER);
        let streams = ExecStreams {
            stdin: Some(Box::new(StreamReader::new(input))),
            stdout: Some(Box::new(FrameWriter::new(tx.clone(), OutputKind::Stdout))),
            stderr: Some(Box::new(FrameWriter::new(tx.clone(), OutputKind::Stderr))),
        };

        let client = self.client.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            if let Err(err) = client.container_exec(&session, streams, &cancel).await {
                error!("Exec in container {} failed: {}", session.container_id, err);
                let _ = tx.send(Err(err.into())).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
