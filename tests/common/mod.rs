//! Shared helpers for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sensor_logger::parser::{parse_frame, Reading};
use sensor_logger::session::StartRequest;
use sensor_logger::sink::TableSink;
use sensor_logger::transport::{Transport, TransportEvent};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Transport that replays a fixed script of events.
///
/// If the script does not end with `Closed`, the transport waits for the close
/// signal and then reports a client close, like a real socket would.
pub struct ScriptedTransport {
    script: Vec<TransportEvent>,
    closed_by_client: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<TransportEvent>) -> Self {
        Self {
            script,
            closed_by_client: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed_by_client.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn run(
        &self,
        _url: String,
        events: mpsc::Sender<TransportEvent>,
        close: oneshot::Receiver<()>,
    ) {
        let mut remote_closed = false;
        for event in self.script.clone() {
            remote_closed |= matches!(event, TransportEvent::Closed { .. });
            if events.send(event).await.is_err() {
                return;
            }
        }
        if remote_closed {
            return;
        }
        let _ = close.await;
        self.closed_by_client.store(true, Ordering::SeqCst);
        let _ = events
            .send(TransportEvent::Closed {
                code: Some(1000),
                reason: "closed by client".into(),
            })
            .await;
    }
}

pub fn frame(n: usize) -> String {
    format!("MPU6050: ax={n} ay=0 az=1\nMPU6050: gx=0 gy={n} gz=0\nBend Sensor: {}\n", 200 + n)
}

pub fn message(text: impl Into<String>) -> TransportEvent {
    TransportEvent::Message(text.into())
}

pub fn started_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap()
}

pub fn reading(n: usize) -> Reading {
    let raw = frame(n);
    let at = started_at() + chrono::Duration::seconds(n as i64);
    parse_frame(&raw).unwrap().stamp(at, raw)
}

pub fn start_request(dir: &Path, name: &str) -> StartRequest {
    StartRequest {
        url: "ws://sensor.test/ws".into(),
        custom_name: Some(name.into()),
        output_dir: dir.to_path_buf(),
        csv_enabled: true,
        xlsx_enabled: true,
        event_buffer: 64,
    }
}

/// Poll `sink` until it holds `expected` rows or five seconds pass.
pub async fn wait_for_rows(sink: &dyn TableSink, expected: usize) -> Vec<Vec<String>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(rows) = sink.rows() {
            if rows.len() >= expected {
                return rows;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {expected} rows in {}", sink.path().display());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
