//! # ROACH monitor-and-control client core
//!
//! Client-side core for monitoring and controlling a radio-astronomy
//! backend (ROACH FPGA boards with their RF front-end sections, IF
//! switches and sampler-clock synthesizers) through a remote supervisor
//! process. The crate deliberately contains no rendering: it maintains the
//! mirrored device state, turns control events into verified remote writes
//! and tells the presentation layer what changed and how to lay itself out.
//!
//! ## Crate structure
//!
//! - **`client`**: the top-level [`client::McClient`] owning the proxy,
//!   dispatcher and refresh timer; connection bootstrap lives here.
//! - **`proxy`**: the [`proxy::RemoteProxy`] seam to the supervisor, with a
//!   TCP JSON-line transport and an in-memory mock.
//! - **`cache`**: [`cache::DeviceStateCache`], the single source of truth
//!   for displayed state, refreshed wholesale and patched from readbacks.
//! - **`dispatch`**: [`dispatch::ActionDispatcher`], the one path from a
//!   control event to the device and back, with observer notifications.
//! - **`keys`**: board-name normalization and canonical column inference
//!   for laying heterogeneous boards out on one grid.
//! - **`layout`**: widget row descriptions and the grid planner consumed
//!   by the presentation layer.
//! - **`registers`**: named-register read / write-and-verify for one board.
//! - **`kurtosis`**: operations that understand the kurtosis spectrometer
//!   firmware.
//! - **`refresh`**: the non-overlapping cooperative refresh timer.
//! - **`config`** / **`error`** / **`state`**: settings, the central error
//!   type and the shared device-state records.
//!
//! The concurrency model is single-threaded and synchronous: every remote
//! call blocks until the supervisor answers or fails. Anything that moves
//! these calls onto workers must keep cache writes serialized.

pub mod cache;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod kurtosis;
pub mod layout;
pub mod proxy;
pub mod refresh;
pub mod registers;
pub mod state;

pub use error::{McError, McResult};
