//! WebSocket transport adapter
//!
//! Terminates client connections, binds the verified token subject to the
//! channel at handshake time, maps inbound event frames to matchmaker and
//! engine operations, and forwards outbound frames queued by the engine.
//!
//! Each connection is one spawned task running a `tokio::select!` loop
//! over the socket and the channel's outbound queue. The queue is drained
//! in order, so a session's terminal frame is flushed before the server
//! side ever closes the connection. A closed socket propagates as
//! `Disconnect` to the engine and a dequeue to the matchmaker.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use gridlink_shared::{ClientEvent, ServerEvent, UserId};

use crate::auth::TokenVerifier;
use crate::endpoints::EndpointPicker;
use crate::engine::{ChannelHandle, ChannelId, SessionEngine};
use crate::error::ServerError;
use crate::matchmaker::{EnqueueResult, Matchmaker};

/// Shared handles every connection task needs.
pub struct ServerState {
    pub engine: Arc<SessionEngine>,
    pub matchmaker: Arc<Matchmaker>,
    pub picker: Arc<EndpointPicker>,
    pub verifier: TokenVerifier,
}

/// Accept loop: one task per inbound connection.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), ServerError> {
    let mut next_channel: ChannelId = 1;
    loop {
        let (stream, addr) = listener.accept().await?;
        let channel = next_channel;
        next_channel += 1;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream, addr, channel).await {
                debug!("channel {} ({}): connection error: {}", channel, addr, e);
            }
        });
    }
}

async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    addr: SocketAddr,
    channel: ChannelId,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    // Authenticate during the upgrade; rejected sockets never reach the
    // matchmaker or the engine.
    let mut user: Option<UserId> = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        match extract_token(req).and_then(|t| state.verifier.verify(&t).ok()) {
            Some(verified) => {
                user = Some(verified);
                Ok(resp)
            }
            None => {
                warn!("channel {} ({}): handshake rejected", channel, addr);
                let mut resp = ErrorResponse::new(Some("unauthorized".to_string()));
                *resp.status_mut() = StatusCode::UNAUTHORIZED;
                Err(resp)
            }
        }
    })
    .await?;

    let Some(user) = user else {
        // The callback only accepts upgrades with a verified subject.
        return Ok(());
    };
    info!("channel {} connected from {} as {}", channel, addr, user);

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = ChannelHandle { channel, user, tx };
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("channel {}: failed to encode frame: {}", channel, e),
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => dispatch(&state, &handle, event).await,
                        Err(e) => warn!("channel {}: malformed frame ignored: {}", channel, e),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong: nothing to do
                    Some(Err(e)) => {
                        debug!("channel {}: read error: {}", channel, e);
                        break;
                    }
                }
            }
        }
    }

    // Flush frames queued before the socket went away, then tear down.
    while let Ok(event) = rx.try_recv() {
        if let Ok(text) = serde_json::to_string(&event) {
            let _ = sink.send(Message::Text(text)).await;
        }
    }
    state.engine.disconnect(channel).await;
    state.matchmaker.dequeue(channel);
    info!("channel {} disconnected", channel);
    Ok(())
}

/// Map one inbound event to its component operation.
async fn dispatch(state: &Arc<ServerState>, handle: &ChannelHandle, event: ClientEvent) {
    match event {
        ClientEvent::JoinQueue { difficulty } => {
            match state.matchmaker.enqueue(handle.clone(), difficulty) {
                EnqueueResult::Duplicate => {
                    warn!("channel {}: duplicate joinQueue ignored", handle.channel);
                }
                EnqueueResult::Queued(matches) => {
                    handle.send(ServerEvent::QueueJoined { difficulty });
                    for m in matches {
                        state.engine.create_multiplayer(m).await;
                    }
                }
            }
        }
        ClientEvent::LeaveQueue => {
            if state.matchmaker.dequeue(handle.channel) {
                handle.send(ServerEvent::QueueLeft);
            }
        }
        ClientEvent::StartSinglePlayerGame { difficulty } => {
            match state.picker.pick(difficulty) {
                Some((start_player, end_player)) => {
                    state
                        .engine
                        .create_single(handle.clone(), difficulty, start_player, end_player)
                        .await;
                }
                None => warn!(
                    "channel {}: no endpoints available for {:?}",
                    handle.channel, difficulty
                ),
            }
        }
        ClientEvent::PlayerReady { session_id } => {
            state.engine.ready(handle.channel, &session_id).await;
        }
        ClientEvent::SubmitPath { session_id, path } => {
            state
                .engine
                .submit_path(handle.channel, &session_id, path)
                .await;
        }
        ClientEvent::GiveUp { session_id } => {
            state.engine.give_up(handle.channel, &session_id).await;
        }
    }
}

/// Bearer token from the `Authorization` header, falling back to a
/// `token` query parameter for clients that cannot set headers.
fn extract_token<T>(req: &tokio_tungstenite::tungstenite::http::Request<T>) -> Option<String> {
    if let Some(value) = req.headers().get("authorization") {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    req.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token=").map(|token| token.to_string()))
    })
}
