//! # Sensor Logger Core Library
//!
//! This crate is the core library for the `sensor-logger` binary. It receives
//! composite sensor frames (IMU plus flex sensor lines) from a WebSocket endpoint,
//! validates and splits them, and appends every valid reading to a CSV log and an
//! XLSX workbook while the operator starts and stops the run from the terminal.
//!
//! ## Crate Structure
//!
//! - **`parser`**: Pure frame validation. Splits a frame into the `MPU6050` and
//!   `Bend Sensor` blocks or rejects it as incomplete.
//! - **`sink`**: The dual-sink writer. CSV rows are appended, the XLSX workbook is
//!   rewritten in full; failures are isolated per sink. A single queue worker
//!   persists readings off the control loop.
//! - **`transport`**: The `Transport` trait, its event enum, and the
//!   `tokio-tungstenite` WebSocket implementation.
//! - **`session`**: The `Idle -> Active -> Stopped` state machine that gates frames
//!   and owns the connection.
//! - **`command`**: Operator input (`q`, Ctrl-C) as a channel of commands.
//! - **`app`**: The control loop tying commands and transport events to the session.
//! - **`config`**: Layered configuration (defaults, TOML file, environment).
//! - **`error`**: The `LoggerError` enum.
//! - **`tracing_init`**: `tracing-subscriber` setup.

pub mod app;
pub mod command;
pub mod config;
pub mod error;
pub mod parser;
pub mod session;
pub mod sink;
pub mod tracing_init;
pub mod transport;
