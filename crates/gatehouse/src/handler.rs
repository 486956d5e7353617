//! Per-connection handler: decode, intercept, deliver.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Build a [`Session`] from the handshake attributes
//!   2. Loop: receive frame → interceptor → broker, or ERROR back
//!   3. On exit for any reason, release the session

use std::sync::Arc;

use gatehouse_protocol::{is_heartbeat, Command, Frame, FrameCodec};
use gatehouse_session::{IdentityStore, Session, TokenValidator};
use gatehouse_store::{EphemeralCache, GameStateService};
use gatehouse_transport::{Connection, WebSocketConnection};
use tracing::{debug, info};

use crate::server::ServerState;
use crate::{Broker, GatehouseError, Verdict};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, I, C, S, B>(
    conn: WebSocketConnection,
    state: Arc<ServerState<V, I, C, S, B>>,
) -> Result<(), GatehouseError>
where
    V: TokenValidator,
    I: IdentityStore,
    C: EphemeralCache,
    S: GameStateService,
    B: Broker,
{
    let mut session = Session::new(conn.attributes().clone());
    debug!(conn_id = %conn.id(), session_id = %session.id(), "handling new connection");

    let result = serve(&conn, &state, &mut session).await;

    // Teardown runs whether or not the client sent DISCONNECT.
    state.interceptor.release(&mut session).await;
    result
}

async fn serve<V, I, C, S, B>(
    conn: &WebSocketConnection,
    state: &ServerState<V, I, C, S, B>,
    session: &mut Session,
) -> Result<(), GatehouseError>
where
    V: TokenValidator,
    I: IdentityStore,
    C: EphemeralCache,
    S: GameStateService,
    B: Broker,
{
    let idle_timeout = state.interceptor.config().idle_timeout;

    loop {
        let data = match tokio::time::timeout(idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                info!(session_id = %session.id(), "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => {
                debug!(session_id = %session.id(), error = %e, "recv error");
                return Err(e.into());
            }
            Err(_) => {
                info!(session_id = %session.id(), "connection idle, closing");
                close_quietly(conn).await;
                return Ok(());
            }
        };

        if is_heartbeat(&data) {
            continue;
        }

        let frame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session.id(), error = %e, "failed to decode frame");
                let error = Frame::error(&format!("malformed frame: {e}"), None);
                send_frame(conn, state, &error).await?;
                close_quietly(conn).await;
                return Err(e.into());
            }
        };

        let command = frame.command;
        let receipt = frame.receipt().map(str::to_owned);

        match state.interceptor.intercept(frame, session).await {
            Verdict::Forward(frame) => {
                let replies = state.broker.deliver(session.id(), frame).await?;
                for reply in &replies {
                    send_frame(conn, state, reply).await?;
                }
                if command == Command::Disconnect {
                    info!(session_id = %session.id(), "client disconnected");
                    close_quietly(conn).await;
                    return Ok(());
                }
            }
            Verdict::Drop(e) => {
                let error = Frame::error(&e.to_string(), receipt.as_deref());
                send_frame(conn, state, &error).await?;
                if e.is_connection_fatal() {
                    close_quietly(conn).await;
                    return Err(e.into());
                }
            }
        }
    }
}

async fn send_frame<V, I, C, S, B>(
    conn: &WebSocketConnection,
    state: &ServerState<V, I, C, S, B>,
    frame: &Frame,
) -> Result<(), GatehouseError> {
    let bytes = state.codec.encode(frame);
    conn.send(&bytes).await?;
    Ok(())
}

async fn close_quietly(conn: &WebSocketConnection) {
    if let Err(e) = conn.close().await {
        debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
