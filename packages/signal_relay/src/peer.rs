//! Peer record: one admitted connection's identity and outbound half.

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::RelayError;
use crate::protocol::PeerId;

/// Outbound half of a peer's transport.
///
/// For a live socket this is the sink side of `WebSocket::split`; tests
/// substitute an in-memory channel.
pub type Outbound = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Close code sent when an admission is refused after the upgrade.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

pub struct Peer {
    id: PeerId,
    /// Serializes every write to this peer's channel.
    outbound: Mutex<Outbound>,
    write_wait: Duration,
}

impl Peer {
    pub fn new(id: PeerId, outbound: Outbound, write_wait: Duration) -> Self {
        Self {
            id,
            outbound: Mutex::new(outbound),
            write_wait,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Serialize `value` as JSON and send it as one text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), RelayError> {
        let json = serde_json::to_string(value).map_err(|e| RelayError::DeliveryFailure {
            peer: self.id.clone(),
            reason: e.to_string(),
        })?;
        self.write(Message::Text(json.into()))
            .await
            .map_err(|reason| RelayError::DeliveryFailure {
                peer: self.id.clone(),
                reason,
            })
    }

    /// Send a liveness ping, bounded by the write deadline.
    pub async fn ping(&self) -> Result<(), RelayError> {
        self.write(Message::Ping(Bytes::new()))
            .await
            .map_err(|reason| RelayError::LivenessFailure {
                peer: self.id.clone(),
                reason,
            })
    }

    /// Send a close frame and shut the outbound half. Errors are ignored:
    /// the connection is going away either way.
    pub async fn close(&self, code: u16, reason: &str) {
        let mut outbound = self.outbound.lock().await;
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        }));
        let _ = tokio::time::timeout(self.write_wait, async {
            let _ = outbound.send(frame).await;
            let _ = outbound.close().await;
        })
        .await;
    }

    async fn write(&self, message: Message) -> Result<(), String> {
        let mut outbound = self.outbound.lock().await;
        match tokio::time::timeout(self.write_wait, outbound.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("write timed out after {:?}", self.write_wait)),
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use futures::channel::mpsc;

    /// An in-memory outbound channel and the receiver that observes it.
    pub fn channel() -> (Outbound, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded();
        (Box::pin(tx.sink_map_err(|e| axum::Error::new(e))), rx)
    }

    /// An outbound whose every write fails.
    pub fn broken() -> Outbound {
        Box::pin(BrokenSink)
    }

    /// A sink that rejects every write. `sink_map_err` on a closed channel
    /// cannot serve here: its mapper is `FnOnce`, so it panics when polled
    /// again after the first error.
    struct BrokenSink;

    impl Sink<Message> for BrokenSink {
        type Error = axum::Error;

        fn poll_ready(
            self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Err(axum::Error::new("send failed because receiver is gone")))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Err(axum::Error::new("send failed because receiver is gone"))
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    pub fn test_peer(id: &str) -> (std::sync::Arc<Peer>, mpsc::UnboundedReceiver<Message>) {
        let (outbound, rx) = channel();
        let peer = Peer::new(PeerId::from(id), outbound, Duration::from_secs(1));
        (std::sync::Arc::new(peer), rx)
    }
}
