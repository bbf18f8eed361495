//! Proximity stream endpoint.
//!
//! Every connection gets a greeting, then a reader and a writer:
//!
//! - the reader parses client frames and updates the connection's
//!   subscription in the registry. A connection that sends nothing valid
//!   within the idle grace period is dropped.
//! - the writer drains the connection's outbound channel onto the socket,
//!   gives up on a write that stalls past the write timeout, and sends a
//!   close frame when the server shuts down.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use portwatch_core::protocol::{ClientMessage, ServerMessage};
use portwatch_core::proximity::SearchRadius;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant};

use crate::now_ms;
use crate::registry::{ConnectionId, Delivery, Frame};
use crate::web::AppState;

pub const GREETING: &str = "Connected to proximity stream";
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// What a client frame did to its connection
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Configured(SearchRadius),
    Disabled,
    SnapshotRequested,
    /// Not applied; the message is sent back as an `error` frame
    Rejected(String),
}

pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, receiver) = socket.split();

    let greeting = match ServerMessage::connection(GREETING, now_ms()).to_json() {
        Ok(json) => json,
        Err(e) => {
            log::error!("Cannot encode greeting: {}", e);
            return;
        }
    };
    if let Err(e) = sender.send(Message::Text(greeting.into())).await {
        log::debug!("Connection lost before greeting: {}", e);
        return;
    }

    let registration = state.registry.register().await;
    let id = registration.id;
    let write_timeout = state.settings.write_timeout;

    let mut writer = tokio::spawn(write_frames(
        id,
        sender,
        registration.frames,
        registration.shutdown,
        write_timeout,
    ));

    tokio::select! {
        _ = &mut writer => {},
        _ = read_frames(id, receiver, &state) => {
            writer.abort();
        },
    }

    state.registry.unregister(id).await;
    log::debug!("Connection {} closed", id);
}

async fn read_frames(id: ConnectionId, mut receiver: SplitStream<WebSocket>, state: &AppState) {
    // Cleared by the first valid client frame
    let mut idle_deadline = Some(Instant::now() + state.settings.idle_grace);

    loop {
        let next = match idle_deadline {
            Some(deadline) => match timeout_at(deadline, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    log::info!("Connection {} sent nothing in time, dropping it", id);
                    return;
                }
            },
            None => receiver.next().await,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                log::debug!("Connection {} read error: {}", id, e);
                return;
            }
        };

        let outcome = apply_client_frame(state, id, text.as_str()).await;
        match outcome {
            FrameOutcome::Rejected(message) => {
                log::warn!("Connection {} rejected frame: {}", id, message);
                send_error(state, id, &message).await;
            }
            _ => idle_deadline = None,
        }
    }
}

async fn send_error(state: &AppState, id: ConnectionId, message: &str) {
    let json = match ServerMessage::error(message, now_ms()).to_json() {
        Ok(json) => json,
        Err(e) => {
            log::error!("Cannot encode error frame: {}", e);
            return;
        }
    };
    let delivery = state
        .registry
        .reply(id, Frame::from(json), state.settings.write_timeout)
        .await;
    if delivery != Delivery::Queued {
        log::debug!("Connection {} error frame not delivered: {:?}", id, delivery);
    }
}

/// Apply one client frame to the subscription of `id`.
///
/// A rejected frame leaves the previous subscription untouched.
pub async fn apply_client_frame(state: &AppState, id: ConnectionId, text: &str) -> FrameOutcome {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => return FrameOutcome::Rejected(e.to_string()),
    };

    match message {
        ClientMessage::TrackPortProximity { enabled: false, .. } => {
            state.registry.disable(id).await;
            log::debug!("Connection {} disabled proximity tracking", id);
            FrameOutcome::Disabled
        }
        ClientMessage::TrackPortProximity {
            enabled: true,
            radius,
        } => {
            let radius = match radius {
                None => state.settings.default_radius,
                Some(km) => match SearchRadius::new(km) {
                    Ok(radius) => radius,
                    Err(e) => return FrameOutcome::Rejected(e.to_string()),
                },
            };
            state.registry.configure(id, radius).await;
            log::debug!("Connection {} tracking at {} km", id, radius.km());
            FrameOutcome::Configured(radius)
        }
        ClientMessage::RequestVessels { all_vessels } => {
            state.registry.set_wants_all_vessels(id, all_vessels).await;
            match state
                .broadcaster
                .send_snapshot(id, state.settings.write_timeout)
                .await
            {
                Ok(Delivery::Queued) => {}
                Ok(delivery) => {
                    log::debug!("Connection {} snapshot not delivered: {:?}", id, delivery)
                }
                Err(e) => log::error!("Cannot build snapshot for connection {}: {}", id, e),
            }
            FrameOutcome::SnapshotRequested
        }
    }
}

async fn write_frames<S>(
    id: ConnectionId,
    mut sender: S,
    mut frames: mpsc::Receiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    // Registered after the shutdown signal went out
    if *shutdown.borrow_and_update() {
        send_close(id, &mut sender, write_timeout).await;
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                send_close(id, &mut sender, write_timeout).await;
                return;
            },
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // Shutdown also drops every outbound channel
                    if *shutdown.borrow() {
                        send_close(id, &mut sender, write_timeout).await;
                    }
                    return;
                };
                if !send_with_timeout(id, &mut sender, text_message(&frame), write_timeout).await {
                    return;
                }
            },
        }
    }
}

async fn send_close<S>(id: ConnectionId, sender: &mut S, write_timeout: Duration)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let close = Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: SHUTDOWN_REASON.into(),
    }));
    send_with_timeout(id, sender, close, write_timeout).await;
}

fn text_message(frame: &Arc<str>) -> Message {
    Message::Text(Utf8Bytes::from(&**frame))
}

async fn send_with_timeout<S>(
    id: ConnectionId,
    sender: &mut S,
    message: Message,
    write_timeout: Duration,
) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_timeout, sender.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!("Connection {} write failed: {}", id, e);
            false
        }
        Err(_) => {
            log::warn!(
                "Connection {} stalled for {:?}, closing it",
                id,
                write_timeout
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use portwatch_core::{Coordinate, Port, Vessel};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::config::Settings;
    use crate::registry::SubscriberRegistry;
    use crate::store::MemoryStore;
    use crate::web::router;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn fleet() -> MemoryStore {
        MemoryStore::new(
            vec![Vessel::new(1, "Gulf Pioneer").at(Coordinate::new(25.10, 56.00).unwrap())],
            vec![Port::new(9, "Fujairah", Coordinate::new(25.1164, 56.3269).unwrap())],
        )
    }

    fn state() -> AppState {
        AppState::new(Arc::new(fleet()), Settings::default(), Some(1))
    }

    fn short_grace() -> Settings {
        Settings {
            idle_grace: Duration::from_millis(300),
            ..Settings::default()
        }
    }

    async fn serve(settings: Settings) -> (AppState, String) {
        let state = AppState::new(Arc::new(fleet()), settings, Some(1));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/api/v1/stream", listener.local_addr().unwrap());
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (state, url)
    }

    // Connects and consumes the greeting
    async fn connect(url: &str) -> Client {
        let (mut client, _) = connect_async(url).await.unwrap();
        let greeting = client.next().await.unwrap().unwrap();
        match ServerMessage::from_json(greeting.to_text().unwrap()).unwrap() {
            ServerMessage::Connection { message, .. } => assert_eq!(message, GREETING),
            other => panic!("unexpected greeting {:?}", other),
        }
        client
    }

    async fn wait_registered(registry: &SubscriberRegistry, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.len().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection never registered");
    }

    // Text frames seen before the server ended the connection
    async fn read_until_closed(client: &mut Client, within: Duration) -> Vec<String> {
        let mut texts = Vec::new();
        tokio::time::timeout(within, async {
            loop {
                match client.next().await {
                    Some(Ok(WsMessage::Text(text))) => texts.push(text.as_str().to_owned()),
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await
        .expect("connection still open");
        texts
    }

    fn assert_shutdown_close(message: Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>) {
        match message {
            Some(Ok(WsMessage::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason.as_str(), SHUTDOWN_REASON);
            }
            other => panic!("expected a shutdown close frame, got {:?}", other),
        }
    }

    fn assert_writer_closed(sent: &[Message]) {
        match sent {
            [Message::Close(Some(frame))] => {
                assert_eq!(frame.code, close_code::AWAY);
                assert_eq!(frame.reason.as_str(), SHUTDOWN_REASON);
            }
            other => panic!("expected one close frame, got {:?}", other),
        }
    }

    /// Never accepts a write
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    fn radius(km: f64) -> SearchRadius {
        SearchRadius::new(km).unwrap()
    }

    #[tokio::test]
    async fn test_configure_is_last_write_wins() {
        let state = state();
        let mut reg = state.registry.register().await;

        let first = r#"{"type":"track_port_proximity","enabled":true,"radius":15}"#;
        let second = r#"{"type":"track_port_proximity","enabled":true,"radius":50}"#;
        assert_eq!(
            apply_client_frame(&state, reg.id, first).await,
            FrameOutcome::Configured(radius(15.0))
        );
        assert_eq!(
            apply_client_frame(&state, reg.id, second).await,
            FrameOutcome::Configured(radius(50.0))
        );

        state.broadcaster.run_pass().await.unwrap();
        let frame = reg.frames.recv().await.unwrap();
        match ServerMessage::from_json(&frame).unwrap() {
            ServerMessage::VesselUpdate(update) => {
                // ~31 km apart: only visible at 50 km
                assert_eq!(update.port_connections.len(), 1);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_radius_keeps_previous() {
        let state = state();
        let reg = state.registry.register().await;

        apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":true,"radius":15}"#,
        )
        .await;
        let outcome = apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":true,"radius":-3}"#,
        )
        .await;
        assert!(matches!(outcome, FrameOutcome::Rejected(_)));

        let outcome = apply_client_frame(&state, reg.id, "{not json").await;
        assert!(matches!(outcome, FrameOutcome::Rejected(_)));

        assert_eq!(
            state.registry.subscription(reg.id).await.unwrap().radius,
            Some(radius(15.0))
        );
    }

    #[tokio::test]
    async fn test_enable_without_radius_uses_default() {
        let state = state();
        let reg = state.registry.register().await;
        let outcome = apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":true}"#,
        )
        .await;
        assert_eq!(outcome, FrameOutcome::Configured(state.settings.default_radius));
    }

    #[tokio::test]
    async fn test_disable_removes_subscription() {
        let state = state();
        let reg = state.registry.register().await;
        apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":true,"radius":40}"#,
        )
        .await;
        let outcome = apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":false}"#,
        )
        .await;
        assert_eq!(outcome, FrameOutcome::Disabled);
        assert!(state.registry.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_request_vessels_sends_snapshot() {
        let state = state();
        let mut reg = state.registry.register().await;
        let outcome = apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"request_vessels","allVessels":true}"#,
        )
        .await;
        assert_eq!(outcome, FrameOutcome::SnapshotRequested);

        let frame = reg.frames.recv().await.unwrap();
        match ServerMessage::from_json(&frame).unwrap() {
            ServerMessage::VesselUpdate(update) => assert_eq!(update.vessels.len(), 1),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writer_closes_when_registry_shuts_down() {
        // Shutdown drops the outbound channel too; the close frame must still go out
        for _ in 0..50 {
            let registry = SubscriberRegistry::new();
            let reg = registry.register().await;
            registry.shutdown().await;

            let mut sent: Vec<Message> = Vec::new();
            write_frames(reg.id, &mut sent, reg.frames, reg.shutdown, Duration::from_secs(1)).await;
            assert_writer_closed(&sent);
        }
    }

    #[tokio::test]
    async fn test_writer_closes_when_registered_after_shutdown() {
        let registry = SubscriberRegistry::new();
        registry.shutdown().await;
        let reg = registry.register().await;

        let mut sent: Vec<Message> = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(1),
            write_frames(reg.id, &mut sent, reg.frames, reg.shutdown, Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_writer_closed(&sent);
    }

    #[tokio::test]
    async fn test_stalled_write_ends_writer() {
        let (tx, frames) = mpsc::channel(1);
        tx.send(Frame::from("{}")).await.unwrap();
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            write_frames(1, StalledSink, frames, shutdown, Duration::from_millis(50)),
        )
        .await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_frame() {
        for _ in 0..10 {
            let (state, url) = serve(Settings::default()).await;
            let mut client = connect(&url).await;
            wait_registered(&state.registry, 1).await;

            state.registry.shutdown().await;
            assert_shutdown_close(client.next().await);
        }
    }

    #[tokio::test]
    async fn test_connection_after_shutdown_is_closed() {
        let (state, url) = serve(Settings::default()).await;
        state.registry.shutdown().await;

        let mut client = connect(&url).await;
        assert_shutdown_close(client.next().await);
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped() {
        let (state, url) = serve(short_grace()).await;
        let mut client = connect(&url).await;
        wait_registered(&state.registry, 1).await;

        let texts = read_until_closed(&mut client, Duration::from_secs(3)).await;
        assert!(texts.is_empty());
        wait_registered(&state.registry, 0).await;
    }

    #[tokio::test]
    async fn test_rejected_frames_do_not_keep_connection() {
        let (state, url) = serve(short_grace()).await;
        let mut client = connect(&url).await;

        client.send(WsMessage::text("{not json")).await.unwrap();
        client
            .send(WsMessage::text(r#"{"type":"track_port_proximity","enabled":true,"radius":-3}"#))
            .await
            .unwrap();

        let texts = read_until_closed(&mut client, Duration::from_secs(3)).await;
        let errors = texts
            .iter()
            .filter(|t| matches!(ServerMessage::from_json(t), Ok(ServerMessage::Error { .. })))
            .count();
        assert_eq!(errors, 2);
        wait_registered(&state.registry, 0).await;
    }

    #[tokio::test]
    async fn test_valid_frame_keeps_connection_past_grace() {
        let (state, url) = serve(short_grace()).await;
        let mut client = connect(&url).await;

        client
            .send(WsMessage::text(r#"{"type":"track_port_proximity","enabled":false}"#))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(state.registry.len().await, 1);

        client
            .send(WsMessage::text(r#"{"type":"request_vessels","allVessels":true}"#))
            .await
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match ServerMessage::from_json(frame.to_text().unwrap()).unwrap() {
            ServerMessage::VesselUpdate(update) => assert_eq!(update.vessels.len(), 1),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_frame_not_lost_behind_pending_tick() {
        let state = state();
        let mut reg = state.registry.register().await;
        apply_client_frame(
            &state,
            reg.id,
            r#"{"type":"track_port_proximity","enabled":true,"radius":40}"#,
        )
        .await;
        // Periodic frame left unread
        state.broadcaster.run_pass().await.unwrap();

        let reject = {
            let state = state.clone();
            let id = reg.id;
            tokio::spawn(async move { send_error(&state, id, "bad frame").await })
        };

        let tick = reg.frames.recv().await.unwrap();
        assert!(matches!(ServerMessage::from_json(&tick).unwrap(), ServerMessage::VesselUpdate(_)));
        let error = reg.frames.recv().await.unwrap();
        match ServerMessage::from_json(&error).unwrap() {
            ServerMessage::Error { message, .. } => assert_eq!(message, "bad frame"),
            other => panic!("unexpected frame {:?}", other),
        }
        reject.await.unwrap();
    }
}
