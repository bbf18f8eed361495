//! Stream subscriber.
//!
//! Drives a [`ProximityClient`] over a real socket: the state machine decides
//! when to connect and what to send, this module owns the socket and the
//! clock.

use std::time::Duration;

use anyhow::Result;
use futures_util::{Sink, SinkExt, StreamExt};
use portwatch_core::client::{ClientAction, ClientState, ProximityClient};
use portwatch_core::protocol::{ClientMessage, ServerMessage};
use portwatch_core::proximity::SearchRadius;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Failed,
    Shutdown,
}

pub struct StreamWatcher {
    url: String,
    client: ProximityClient,
    started: Instant,
}

impl StreamWatcher {
    pub fn new(url: &str, radius: SearchRadius, reconnect_delay: Duration) -> Self {
        StreamWatcher {
            url: url.to_string(),
            client: ProximityClient::new(radius, millis(reconnect_delay)),
            started: Instant::now(),
        }
    }

    // Monotonic milliseconds for the state machine
    fn now_ms(&self) -> u64 {
        millis(self.started.elapsed())
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<()> {
        loop {
            match self.client.poll(self.now_ms()) {
                ClientAction::Wait(ms) => {
                    tokio::select! {
                        _ = subsys.on_shutdown_requested() => return Ok(()),
                        _ = sleep(Duration::from_millis(ms)) => {},
                    }
                }
                ClientAction::Connect => {
                    log::info!("Connecting to {}", self.url);
                    let connected = tokio::select! {
                        _ = subsys.on_shutdown_requested() => return Ok(()),
                        r = connect_async(self.url.as_str()) => r,
                    };

                    match connected {
                        Ok((stream, _)) => {
                            let end = self.session(stream, &subsys).await;
                            let now = self.now_ms();
                            match end {
                                SessionEnd::Shutdown => return Ok(()),
                                SessionEnd::Closed => self.client.on_closed(now),
                                SessionEnd::Failed => self.client.on_error(now),
                            }
                            log::info!("Disconnected from {}", self.url);
                        }
                        Err(e) => {
                            log::warn!("Cannot connect to {}: {}", self.url, e);
                            self.client.on_error(self.now_ms());
                        }
                    }
                }
            }
        }
    }

    async fn session(&mut self, stream: Stream, subsys: &SubsystemHandle) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        for message in self.client.on_connected() {
            if let Err(e) = send(&mut sink, &message).await {
                log::warn!("{}: cannot subscribe: {}", self.url, e);
                return SessionEnd::Failed;
            }
        }
        log::info!(
            "Subscribed to {} at {} km",
            self.url,
            self.client.radius().km()
        );

        loop {
            let next = tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutting down".into(),
                    }));
                    let _ = sink.send(close).await;
                    return SessionEnd::Shutdown;
                },
                next = source.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        log::info!(
                            "{}: server closed the stream: {} {}",
                            self.url,
                            frame.code,
                            frame.reason.as_str()
                        );
                    }
                    return SessionEnd::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("{}: stream error: {}", self.url, e);
                    return SessionEnd::Failed;
                }
                None => return SessionEnd::Closed,
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match self.client.on_message(text) {
            Ok(ServerMessage::Connection { message, .. }) => {
                log::debug!("{}: {}", self.url, message);
            }
            Ok(ServerMessage::VesselUpdate(update)) => {
                log::info!(
                    "Update #{}: {} vessels, {} port connections",
                    self.client.updates_received(),
                    update.vessels.len(),
                    update.port_connections.len()
                );
                for conn in &update.port_connections {
                    log::debug!(
                        "  vessel {} is {:.1} km from port {}",
                        conn.vessel_id,
                        conn.distance_km,
                        conn.port_id
                    );
                }
            }
            Ok(ServerMessage::Error { message, .. }) => {
                log::warn!("{}: server rejected a frame: {}", self.url, message);
            }
            Err(e) => log::warn!("{}: {}", self.url, e),
        }
    }

    pub fn state(&self) -> ClientState {
        self.client.state()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn send<S>(sink: &mut S, message: &ClientMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = message.to_json()?;
    sink.send(Message::text(json)).await?;
    Ok(())
}
