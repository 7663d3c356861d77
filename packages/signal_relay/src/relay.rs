//! Relay Server
//!
//! Admits signaling connections into the [`PeerDirectory`], announces
//! arrivals and departures, keeps each connection alive with pings and
//! forwards signaling messages to their declared target.
//!
//! Each admitted connection runs two cooperating tasks: the receive loop
//! (which owns teardown) and a heartbeat that only ever sends pings.

use axum::extract::ws::Message;
use futures::{SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::directory::PeerDirectory;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::peer::{CLOSE_POLICY_VIOLATION, Outbound, Peer};
use crate::protocol::{PeerId, ServerMessage, SignalingMessage};

#[derive(Clone)]
pub struct Relay {
    directory: Arc<PeerDirectory>,
    config: Arc<RelayConfig>,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    pub fn new(config: RelayConfig, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            directory: Arc::new(PeerDirectory::new()),
            config: Arc::new(config),
            metrics,
        }
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Admit an upgraded connection under its claimed id and announce it.
    ///
    /// The id check and the directory insert are one atomic step, so two
    /// concurrent claims of the same id cannot both succeed. Presence for the
    /// arrival is written before the roster is released, so no other join or
    /// leave can interleave with it. A refused connection is closed and
    /// leaves no relay state behind.
    pub async fn admit(
        &self,
        claimed: Option<&str>,
        outbound: Outbound,
    ) -> Result<PeerSession, RelayError> {
        let id = match PeerId::parse(claimed) {
            Ok(id) => id,
            Err(e) => {
                self.metrics.admission_rejected();
                let mut outbound = outbound;
                let _ = tokio::time::timeout(self.config.write_wait, outbound.close()).await;
                return Err(e);
            }
        };

        let peer = Arc::new(Peer::new(id, outbound, self.config.write_wait));
        let roster = match self.directory.insert_if_absent(peer.clone()).await {
            Ok(roster) => roster,
            Err(e) => {
                self.metrics.admission_rejected();
                peer.close(CLOSE_POLICY_VIOLATION, "peer id already in use")
                    .await;
                return Err(e);
            }
        };
        self.metrics.peer_admitted();
        info!(peer = %peer.id(), "Peer connected");

        // Owned from here on, so an abandoned admission still departs.
        let session = PeerSession {
            relay: self.clone(),
            peer,
            released: false,
        };
        self.announce_arrival(session.peer(), roster.others()).await;
        drop(roster);

        Ok(session)
    }

    /// Run one connection from admission to teardown.
    pub async fn serve<S>(&self, claimed: Option<String>, outbound: Outbound, inbound: S)
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        // Admission completes the presence exchange before any traffic is read.
        let mut session = match self.admit(claimed.as_deref(), outbound).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Rejected connection: {}", e);
                return;
            }
        };

        let cancel = CancellationToken::new();
        let heartbeat = tokio::spawn(run_heartbeat(
            session.peer().clone(),
            self.config.ping_interval,
            cancel.clone(),
            self.metrics.clone(),
        ));

        let disconnect = self.receive_loop(session.peer(), inbound).await;
        debug!(peer = %session.id(), "Receive loop ended: {}", disconnect);

        cancel.cancel();
        if let Err(e) = heartbeat.await {
            warn!(peer = %session.id(), "Heartbeat task failed: {}", e);
        }

        session.release().await;
    }

    /// Read frames until the connection fails, forwarding each one.
    async fn receive_loop<S>(&self, peer: &Peer, mut inbound: S) -> Disconnect
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            // Every frame, pongs included, restarts the read deadline.
            let frame = match tokio::time::timeout(self.config.pong_wait, inbound.next()).await {
                Err(_) => return Disconnect::ReadDeadline(self.config.pong_wait),
                Ok(None) => return Disconnect::Closed,
                Ok(Some(Err(e))) => return Disconnect::Error(e.to_string()),
                Ok(Some(Ok(frame))) => frame,
            };

            let payload: &[u8] = match &frame {
                Message::Text(text) => text.as_str().as_bytes(),
                Message::Binary(bytes) => bytes.as_ref(),
                Message::Close(_) => return Disconnect::Closed,
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            self.handle_frame(peer.id(), payload).await;
        }
    }

    async fn handle_frame(&self, sender: &PeerId, payload: &[u8]) {
        self.metrics.message_received();

        let message = match SignalingMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.decode_failed();
                warn!(peer = %sender, "Error reading message: {}", e);
                return;
            }
        };

        match self.route(sender, message).await {
            Ok(()) => {}
            Err(e @ (RelayError::MissingTarget | RelayError::RoutingFailure(_))) => {
                self.metrics.message_dropped();
                warn!(peer = %sender, "Dropped message: {}", e);
            }
            Err(e) => {
                self.metrics.delivery_failed();
                warn!(peer = %sender, "Error forwarding message: {}", e);
            }
        }
    }

    /// Stamp `sender` on a decoded message and forward it to its target.
    pub async fn route(
        &self,
        sender: &PeerId,
        mut message: SignalingMessage,
    ) -> Result<(), RelayError> {
        let target = message.target().cloned().ok_or(RelayError::MissingTarget)?;
        message.stamp_sender(sender);
        self.forward(sender, &target, &message).await
    }

    /// Deliver `message` to `target` if it is online. Best effort: the
    /// target may leave between lookup and write.
    pub async fn forward(
        &self,
        sender: &PeerId,
        target: &PeerId,
        message: &SignalingMessage,
    ) -> Result<(), RelayError> {
        let peer = self
            .directory
            .get(target.as_str())
            .await
            .ok_or_else(|| RelayError::RoutingFailure(target.clone()))?;

        peer.send_json(message).await?;
        self.metrics.message_forwarded();
        debug!(from = %sender, target = %target, kind = %message.kind, "Forwarded message");
        Ok(())
    }

    /// Tell the newcomer who is online, then tell everyone online about the
    /// newcomer.
    async fn announce_arrival(&self, peer: &Arc<Peer>, roster: &[Arc<Peer>]) {
        for other in roster {
            self.deliver_presence(peer, &ServerMessage::joined(other.id()))
                .await;
        }
        self.broadcast(roster, &ServerMessage::joined(peer.id()))
            .await;
    }

    /// Remove `peer` and announce its departure to everyone remaining.
    ///
    /// Returns false without broadcasting when the peer was already removed.
    pub async fn announce_departure(&self, peer: &Arc<Peer>) -> bool {
        let Some(roster) = self.directory.remove(peer).await else {
            return false;
        };
        self.metrics.peer_departed();
        info!(peer = %peer.id(), "Peer disconnected");

        self.broadcast(roster.others(), &ServerMessage::left(peer.id()))
            .await;
        true
    }

    /// Send one event to each recipient concurrently. A slow or broken
    /// recipient only costs its own write deadline.
    async fn broadcast(&self, recipients: &[Arc<Peer>], event: &ServerMessage) {
        futures::future::join_all(
            recipients
                .iter()
                .map(|recipient| self.deliver_presence(recipient, event)),
        )
        .await;
    }

    async fn deliver_presence(&self, recipient: &Peer, event: &ServerMessage) {
        match recipient.send_json(event).await {
            Ok(()) => self.metrics.presence_sent(),
            Err(e) => {
                self.metrics.delivery_failed();
                warn!(peer = %recipient.id(), "Failed to send presence event: {}", e);
            }
        }
    }
}

/// An admitted connection.
///
/// Releasing the session removes the peer from the directory and announces
/// its departure. Dropping an unreleased session does the same on a spawned
/// task, so every exit path tears down exactly once.
pub struct PeerSession {
    relay: Relay,
    peer: Arc<Peer>,
    released: bool,
}

impl PeerSession {
    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    pub fn id(&self) -> &PeerId {
        self.peer.id()
    }

    /// Tear the session down. Returns true only for the call that actually
    /// removed the peer and broadcast its departure.
    pub async fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        let departed = self.relay.announce_departure(&self.peer).await;
        self.released = true;
        departed
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let relay = self.relay.clone();
        let peer = self.peer.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    relay.announce_departure(&peer).await;
                });
            }
            Err(_) => {
                warn!(peer = %peer.id(), "No runtime available to release peer");
            }
        }
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", self.peer.id())
            .field("released", &self.released)
            .finish()
    }
}

/// Why a receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    Closed,
    ReadDeadline(Duration),
    Error(String),
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::Closed => write!(f, "connection closed"),
            Disconnect::ReadDeadline(wait) => write!(f, "no frame within {:?}", wait),
            Disconnect::Error(e) => write!(f, "read error: {}", e),
        }
    }
}

/// Ping `peer` every `interval` until cancelled or a ping fails.
///
/// A failed ping only ends this task; the receive loop notices the broken
/// connection on its own and performs teardown.
async fn run_heartbeat(
    peer: Arc<Peer>,
    interval: Duration,
    cancel: CancellationToken,
    metrics: Arc<RelayMetrics>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = peer.ping().await {
                    metrics.liveness_failed();
                    debug!(peer = %peer.id(), "Stopping heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}
