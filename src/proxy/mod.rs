//! Remote supervisor proxy.
//!
//! [`RemoteProxy`] is the seam between the client core and the supervisor
//! process: a synchronous request/response surface of named RPC methods plus
//! a generic `request(expression)` evaluator for the odd corners of the
//! remote object graph (synthesizer status, firmware bookkeeping, DSP logic
//! hooks). Every call blocks until the remote responds or fails with a
//! communication error; there is no cancellation for an in-flight call.
//!
//! Two implementations ship with the crate: [`tcp::TcpProxy`], a
//! line-delimited JSON transport for a live supervisor, and
//! [`mock::MockSupervisor`], an in-memory simulation with a call journal
//! used by the test suites and the demo mode.

pub mod decode;
pub mod mock;
pub mod tcp;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::McResult;

/// Roach report from the supervisor: per-board addresses and firmware state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoachReport {
    #[serde(rename = "IP")]
    pub ip: BTreeMap<String, String>,
    pub alive: BTreeMap<String, bool>,
    /// Currently loaded bitfile per board (may be absent or null).
    #[serde(default)]
    pub bof: BTreeMap<String, Option<String>>,
    /// Bitfiles available to each board, in load-menu order.
    pub avail: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub power: BTreeMap<String, Option<bool>>,
}

/// Readback of one RF section after a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RfReadback {
    pub enabled: Option<bool>,
    pub gain: Option<f64>,
}

/// Synchronous proxy to the remote supervisor.
///
/// All methods may fail with `McError::Communication` (transport) or
/// `McError::Remote` (the supervisor raised an error for this call).
pub trait RemoteProxy {
    /// Connection probe; a refusal here is fatal at startup.
    fn ping(&mut self) -> McResult<()>;

    /// Evaluate an expression against the remote supervisor object.
    fn request(&mut self, expression: &str) -> McResult<Value>;

    /// Per-board IPs, liveness, power, loaded and available bitfiles.
    fn roach_report(&mut self) -> McResult<RoachReport>;

    /// Nested gain/enabled state for one board, keyed ADC then RF input.
    fn get_gains(&mut self, board: &str) -> McResult<Value>;

    /// Configure one RF section. `gain: None` retains the current gain.
    fn set_rf_section(
        &mut self,
        board: &str,
        adc: u32,
        rf: u32,
        gain: Option<f64>,
        enabled: bool,
    ) -> McResult<()>;

    /// Read back one RF section's enabled state and gain.
    fn get_rf_section(&mut self, board: &str, adc: u32, rf: u32) -> McResult<RfReadback>;

    /// Measured RF input levels, nested board-index → ADC → RF input.
    fn get_adc_levels(&mut self) -> McResult<Value>;

    /// Ambient/IC temperatures, nested board name → ADC.
    fn get_temperatures(&mut self) -> McResult<Value>;

    /// Input selection for each IF-switch output, in output order.
    fn get_switch_states(&mut self) -> McResult<Vec<u32>>;

    /// Select `input` on IF-switch `output`; returns the confirmed input.
    fn set_switch_state(&mut self, output: u32, input: u32) -> McResult<u32>;

    /// Fan tachometer readings, labelled.
    fn check_fans(&mut self) -> McResult<BTreeMap<String, f64>>;

    /// Monitor-board analog points: (voltages, temperatures), labelled.
    fn get_mms_analog(&mut self) -> McResult<(BTreeMap<String, f64>, BTreeMap<String, f64>)>;

    /// All register values for one board's loaded firmware.
    fn get_register_values(&mut self, board: &str) -> McResult<BTreeMap<String, i64>>;

    /// Opaque summary describing one firmware build.
    fn get_firmware_summary(&mut self, firmware: &str) -> McResult<Value>;

    /// Load `firmware` on `board` without software init; returns the bitfile.
    fn attach_roach(&mut self, board: &str, firmware: &str) -> McResult<String>;

    /// Read one named firmware register as a signed integer.
    fn fpga_read_int(&mut self, board: &str, register: &str) -> McResult<i64>;

    /// Write one named firmware register.
    fn fpga_write_int(&mut self, board: &str, register: &str, value: i64) -> McResult<()>;

    /// Raw ADC sample block for one RF input.
    fn get_adc_samples(&mut self, board: &str, adc: u32, rf: u32) -> McResult<Vec<f64>>;

    /// Accumulated spectra for one RF input, keyed by accumulator number.
    fn get_accumulations(&mut self, board_index: u32, adc: u32, rf: u32) -> McResult<Value>;

    /// Sorted register names for the designated boards' firmware.
    fn list_registers(&mut self, boards: &[u32]) -> McResult<Vec<String>>;
}
