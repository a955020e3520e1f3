//! JSON-over-WebSocket bridge.
//!
//! [`WsBridge`]:
//!
//! 1. **Ingests** segment lists, velocity commands, switch toggles and filter
//!    configurations, from Rust callers or from WebSocket clients, and
//!    publishes them onto the [`EventBus`].
//!
//! 2. **Serves** a WebSocket endpoint that streams every outbound event (lane
//!    pose, in-lane flag, belief image, diagnostics, faults) to connected
//!    clients as JSON text frames.
//!
//! Client frames use a `{"topic": ..., "msg": {...}}` envelope:
//!
//! | `topic` | `msg` |
//! |---|---|
//! | `~segment_list` | `{"stamp"?, "segments": [{"points": [{x, y}, {x, y}], "color"}]}` |
//! | `~car_cmd` | `{"stamp"?, "v", "omega"}` |
//! | `~switch` | `{"enabled"}` |
//! | `~filter_config` | a (partial) filter configuration |
//!
//! A missing `stamp` is replaced by the arrival time. Anything else is
//! ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use laneloc_types::{
    Event, EventPayload, LaneError, LaneFilterConfig, Segment, SegmentBatch, VelocityCommand,
};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

const SOURCE: &str = "laneloc-middleware::ws";

#[derive(Debug, Deserialize)]
struct SegmentListMsg {
    #[serde(default)]
    stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct CarCmdMsg {
    #[serde(default)]
    stamp: Option<DateTime<Utc>>,
    v: f64,
    omega: f64,
}

#[derive(Debug, Deserialize)]
struct SwitchMsg {
    enabled: bool,
}

/// Bridge between WebSocket clients and the internal [`EventBus`].
#[derive(Clone)]
pub struct WsBridge {
    bus: Arc<EventBus>,
}

impl WsBridge {
    /// Create a new bridge backed by `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    // -----------------------------------------------------------------------
    // Ingest helpers
    // -----------------------------------------------------------------------

    /// Publish a frame's worth of segments on [`Topic::SegmentList`].
    pub fn ingest_segments(&self, batch: SegmentBatch) -> Result<usize, LaneError> {
        self.publish(EventPayload::SegmentList(batch))
    }

    /// Publish a velocity command on [`Topic::VelocityCommand`].
    pub fn ingest_velocity(&self, cmd: VelocityCommand) -> Result<usize, LaneError> {
        self.publish(EventPayload::VelocityCommand(cmd))
    }

    /// Publish an enable/disable toggle on [`Topic::Switch`].
    pub fn ingest_switch(&self, enabled: bool) -> Result<usize, LaneError> {
        self.publish(EventPayload::Switch { enabled })
    }

    /// Publish a new filter configuration on [`Topic::Configuration`].
    pub fn ingest_configuration(&self, config: LaneFilterConfig) -> Result<usize, LaneError> {
        self.publish(EventPayload::Configuration(Box::new(config)))
    }

    fn publish(&self, payload: EventPayload) -> Result<usize, LaneError> {
        self.bus.publish(Event::new(SOURCE, payload))
    }

    // -----------------------------------------------------------------------
    // WebSocket server
    // -----------------------------------------------------------------------

    /// Start a WebSocket server on `addr`.
    ///
    /// Every connecting client receives the outbound event stream and may
    /// send inbound frames. The server runs until it encounters a fatal bind
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::Serialization`] if the TCP listener cannot be
    /// bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), LaneError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LaneError::Serialization(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "websocket bridge listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), LaneError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| LaneError::Serialization(format!("ws handshake from {peer}: {e}")))?;
        debug!(%peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe_all();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) if Topic::of(&event.payload).is_outbound() => {
                            let json = serde_json::to_string(&event)
                                .map_err(|e| LaneError::Serialization(e.to_string()))?;
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming_ws_message(text.as_str());
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(%peer, "ws client disconnected");
        Ok(())
    }

    /// Parse one client frame and publish the matching inbound event.
    ///
    /// Frames that are not JSON, name an unknown topic, or carry a `msg` that
    /// does not fit the topic are dropped.
    fn handle_incoming_ws_message(&self, text: &str) {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(text) else {
            debug!("ignoring non-JSON ws frame");
            return;
        };
        let topic = json.get("topic").and_then(|t| t.as_str()).unwrap_or("");
        let msg = json.get("msg").cloned().unwrap_or(serde_json::Value::Null);

        let published = match topic {
            "~segment_list" => serde_json::from_value::<SegmentListMsg>(msg).map(|m| {
                self.ingest_segments(SegmentBatch {
                    stamp: m.stamp.unwrap_or_else(Utc::now),
                    segments: m.segments,
                })
            }),
            "~car_cmd" => serde_json::from_value::<CarCmdMsg>(msg).map(|m| {
                self.ingest_velocity(VelocityCommand {
                    stamp: m.stamp.unwrap_or_else(Utc::now),
                    v: m.v,
                    omega: m.omega,
                })
            }),
            "~switch" => {
                serde_json::from_value::<SwitchMsg>(msg).map(|m| self.ingest_switch(m.enabled))
            }
            "~filter_config" => serde_json::from_value::<LaneFilterConfig>(msg)
                .map(|cfg| self.ingest_configuration(cfg)),
            _ => {
                debug!(topic, "ignoring ws frame on unknown topic");
                return;
            }
        };

        match published {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(topic, error = %e, "ws frame had no listener"),
            Err(e) => warn!(topic, error = %e, "malformed ws frame"),
        }
    }
}
