// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Live reading stream over WebSocket.
//!
//! Each connection subscribes to the reading bus and forwards one JSON
//! frame per reading:
//!
//! ```json
//! {"type":"reading_update","data":{
//!    "device_id":1,"device_name":"Furnace A","temperature":30.0,
//!    "ambient_temp":null,"status":"OK",
//!    "timestamp":"2025-11-29T06:02:35.123456",
//!    "raw_hex":"01 03 02 01 2C B8 09","error_message":null}}
//! ```
//!
//! Client-to-server messages are ignored. A subscriber that cannot keep up
//! skips overwritten messages per the bus's drop-oldest policy; the
//! connection itself stays up. Disconnecting tears the subscription down.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use pyrowatch_core::timefmt;
use pyrowatch_core::types::{Reading, ReadingStatus};

use crate::state::AppState;

/// One websocket frame.
#[derive(Debug, Serialize)]
struct ReadingFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: FrameData<'a>,
}

#[derive(Debug, Serialize)]
struct FrameData<'a> {
    device_id: i64,
    device_name: &'a str,
    temperature: Option<f32>,
    ambient_temp: Option<f32>,
    status: ReadingStatus,
    timestamp: String,
    raw_hex: Option<&'a str>,
    error_message: Option<&'a str>,
}

impl<'a> ReadingFrame<'a> {
    fn new(reading: &'a Reading) -> Self {
        Self {
            kind: "reading_update",
            data: FrameData {
                device_id: reading.device_id.value(),
                device_name: &reading.device_name,
                temperature: reading.value,
                ambient_temp: reading.ambient_temp,
                status: reading.status,
                timestamp: timefmt::to_json(reading.timestamp),
                raw_hex: reading.raw_hex.as_deref(),
                error_message: reading.error_message.as_deref(),
            },
        }
    }
}

/// GET /api/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.live.subscribe();
    let (mut sender, mut receiver) = socket.split();

    debug!("websocket client connected");

    loop {
        tokio::select! {
            reading = subscription.recv() => {
                let reading = match reading {
                    Ok(reading) => reading,
                    Err(_) => break,
                };
                let frame = ReadingFrame::new(&reading);
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "reading frame serialization failed");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    // The protocol defines no client-to-server messages.
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!("websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pyrowatch_core::types::DeviceId;

    #[test]
    fn test_frame_shape() {
        let reading = Reading {
            id: None,
            device_id: DeviceId::new(3),
            device_name: "Furnace A".to_string(),
            timestamp: Utc::now(),
            value: Some(30.0),
            ambient_temp: None,
            status: ReadingStatus::Ok,
            raw_hex: Some("01 03 02 01 2C B8 09".to_string()),
            error_message: None,
        };

        let json = serde_json::to_value(ReadingFrame::new(&reading)).unwrap();
        assert_eq!(json["type"], "reading_update");
        assert_eq!(json["data"]["device_id"], 3);
        assert_eq!(json["data"]["temperature"], 30.0);
        assert_eq!(json["data"]["status"], "OK");
        // Absent fields serialize as null in the frame, not as omissions.
        assert!(json["data"]["ambient_temp"].is_null());
        assert!(json["data"]["error_message"].is_null());
    }
}
