use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::peer::Outbound;
use crate::protocol::PeerId;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub id: Option<String>,
}

/// Upgrade `/ws?id=<peer>` into a signaling connection.
///
/// Missing and already-taken ids are refused here with a plain HTTP error.
/// The check is repeated atomically after the upgrade, which is what
/// actually guards against two racing claims of one id.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let id = match PeerId::parse(params.id.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            state.metrics.admission_rejected();
            debug!("Refusing connection: {}", e);
            return e.into_response();
        }
    };

    if state.relay.directory().contains(id.as_str()).await {
        state.metrics.admission_rejected();
        debug!(peer = %id, "Refusing connection: id in use");
        return RelayError::DuplicateIdentity(id).into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            state.metrics.upgrade_failed();
            warn!(peer = %id, "Upgrade refused: {}", rejection);
            return rejection.into_response();
        }
    };

    let relay = state.relay.clone();
    let metrics = state.metrics.clone();
    let failed_id = id.clone();

    ws.max_message_size(relay.config().max_message_bytes)
        .on_failed_upgrade(move |e: axum::Error| {
            metrics.upgrade_failed();
            warn!(peer = %failed_id, "{}", RelayError::UpgradeFailure(e.to_string()));
        })
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            let outbound: Outbound = Box::pin(sink);
            relay
                .serve(Some(id.as_str().to_string()), outbound, stream)
                .await;
        })
}
