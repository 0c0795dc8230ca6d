//! Connection Transport
//!
//! Drives one client session over any byte stream: registers the connection,
//! pumps length-prefixed frames into the lifecycle manager and the outbound
//! queue back onto the wire, and runs disconnect cleanup when the stream ends.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::lifecycle::LifecycleManager;
use crate::protocol::{read_frame, FrameError, SignalingMessage};
use crate::registry::ConnectionId;

/// How long queued messages may take to flush after the read side closes
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve a client until its stream closes or sends an oversized frame
pub async fn serve_connection<S>(
    stream: S,
    peer: &str,
    manager: Arc<LifecycleManager>,
    max_frame_bytes: usize,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (message_tx, mut message_rx) = mpsc::unbounded_channel::<SignalingMessage>();
    let connection_id = ConnectionId::new();
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    let writer_peer = peer.to_string();
    let mut writer = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            let data = match message.to_framed() {
                Ok(data) => data,
                Err(e) => {
                    error!("Failed to encode {} for {}: {}", message.kind(), writer_peer, e);
                    continue;
                }
            };
            if write_half.write_all(&data).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    manager.connect(connection_id, message_tx);
    info!("Connection {} opened from {}", connection_id, peer);

    let result = async {
        while let Some(body) = read_frame(&mut read_half, max_frame_bytes).await? {
            let reply = match SignalingMessage::from_bytes(&body) {
                Ok(message) => {
                    debug!("{} from {}", message.kind(), connection_id);
                    manager.handle(connection_id, message)
                }
                Err(e) => {
                    error!("Invalid message from {}: {}", peer, e);
                    Some(SignalingMessage::Error {
                        message: "Invalid message format".to_string(),
                    })
                }
            };

            if let Some(reply) = reply {
                if let Err(e) = manager.registry().send(connection_id, reply) {
                    debug!("Reply to {} dropped: {}", connection_id, e);
                }
            }
        }
        Ok::<(), FrameError>(())
    }
    .await;

    if let Err(e) = &result {
        error!("Connection {} from {} closed with error: {}", connection_id, peer, e);
    }

    // Unregistering drops the last sender, so the writer drains and exits
    manager.disconnect(connection_id);
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    info!("Connection {} from {} disconnected", connection_id, peer);

    result
}
