//! Per-connection reader and writer tasks.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::debug;

use super::Event;
use crate::state::ConnId;

/// Longest line accepted from a peer, tags and CRLF included.
pub const MAX_LINE: usize = 8191;

/// Forward framed lines to the event loop until the socket closes.
pub(super) async fn read_lines(conn: ConnId, read: OwnedReadHalf, events: mpsc::Sender<Event>) {
    let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE));
    let reason = loop {
        match lines.next().await {
            Some(Ok(line)) => {
                if line.is_empty() {
                    continue;
                }
                if events.send(Event::Line { conn, line }).await.is_err() {
                    return;
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                debug!(%conn, "discarding overlong line");
            }
            Some(Err(LinesCodecError::Io(e))) => break format!("Read error: {e}"),
            None => break "Remote host closed the connection".to_string(),
        }
    };
    let _ = events.send(Event::Closed { conn, reason }).await;
}

/// Write queued chunks in order. Reports back once its queue runs dry so a
/// blocked sendq can be retried, and shuts the socket down when the event
/// loop drops the sender.
pub(super) async fn write_chunks(
    conn: ConnId,
    write: OwnedWriteHalf,
    mut chunks: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<Event>,
) {
    let mut sink = FramedWrite::new(write, BytesCodec::new());
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = sink.send(chunk).await {
            let _ = events
                .send(Event::Closed {
                    conn,
                    reason: format!("Write error: {e}"),
                })
                .await;
            return;
        }
        if chunks.is_empty() {
            let _ = events.try_send(Event::Writable(conn));
        }
    }
    let _ = SinkExt::<Bytes>::close(&mut sink).await;
}
