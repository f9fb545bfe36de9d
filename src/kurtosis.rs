//! Control for the kurtosis spectrometer firmware.
//!
//! The dispatcher and register client can read and write any register
//! without knowing what it does; this module adds the operations that imply
//! understanding of the kurtosis firmware: sync source selection, snap
//! trigger, accumulation length, counter reset wiring, power-bit selection
//! and the DSP logic hooks. Every register-backed operation funnels through
//! the dispatcher's register path so it gets the same readback verification
//! and notifications as a raw register edit.

use log::debug;
use serde_json::Value;

use crate::cache::DeviceStateCache;
use crate::dispatch::{ActionDispatcher, ApplyOutcome};
use crate::error::{McError, McResult};
use crate::proxy::RemoteProxy;
use crate::state::{ControlValue, TargetPath};

/// Firmware identifiers this module understands.
pub const KURTOSIS_FIRMWARE: &[&str] = &["kurt_spec", "kurt_spec_r1", "kurt_spec_gain"];

/// True when `name` is a kurtosis firmware build.
pub fn is_kurtosis_firmware(name: &str) -> bool {
    KURTOSIS_FIRMWARE.contains(&name)
}

/// Kurtosis-firmware control scoped to one board.
#[derive(Clone, Debug)]
pub struct KurtosisClient {
    board: String,
}

impl KurtosisClient {
    /// Attach to `board`, which must currently run a kurtosis firmware.
    pub fn attach(cache: &DeviceStateCache, board: &str) -> McResult<Self> {
        match cache.firmware(board)? {
            Some(firmware) if is_kurtosis_firmware(firmware) => {
                debug!("attached kurtosis control to {board} ({firmware})");
                Ok(Self {
                    board: board.to_string(),
                })
            }
            other => Err(McError::Request(format!(
                "{board} runs {} which is not a kurtosis firmware",
                other.unwrap_or("no firmware")
            ))),
        }
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    fn write(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        register: &str,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        dispatcher.apply_change(
            proxy,
            &TargetPath::Register {
                board: self.board.clone(),
                name: register.to_string(),
            },
            ControlValue::Register(value),
        )
    }

    /// Select the source of the DSP sync pulse.
    pub fn set_sync_select(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "sync_in_sel", value)
    }

    /// Current sync source selection.
    pub fn sync_select(&self, proxy: &mut dyn RemoteProxy) -> McResult<i64> {
        proxy.fpga_read_int(&self.board, "sync_in_sel")
    }

    /// Select what triggers an ADC snapshot capture.
    pub fn set_adc_snap_trigger(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "adc_snap_trig", value)
    }

    /// Select what resets the seconds counter.
    pub fn set_reset_select(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "pkt_cnt_sec_rst_ctrl", value)
    }

    /// Select which bits of the accumulator feed the power readout.
    pub fn set_power_bits(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "select_bits_pow", value)
    }

    /// Accumulation length minus one, in spectra.
    pub fn set_acc_len(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "acc_len_m1", value)
    }

    /// Count raw packets in FPGA clocks (1) or packets (0).
    pub fn set_counter_units(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "raw_pkt_cnt_is_fpga_clocks", value)
    }

    /// Select what resets the raw packet counter.
    pub fn set_counter_reset(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "raw_pkt_cnt_rst_ctrl", value)
    }

    /// Select which counter feeds the gbe0 data stream.
    pub fn set_gbe0_source(
        &self,
        dispatcher: &mut ActionDispatcher,
        proxy: &mut dyn RemoteProxy,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        self.write(dispatcher, proxy, "bit_select_counter_out", value)
    }

    /// Trigger a DSP sync pulse.
    pub fn sync_dsp(&self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        proxy.request(&format!("self.roaches['{}'].logic.sync_DSP()", self.board))?;
        Ok(())
    }

    /// Reset the DSP pipeline.
    pub fn reset_dsp(&self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        proxy.request(&format!(
            "self.roaches['{}'].logic.dsp_user_reset()",
            self.board
        ))?;
        Ok(())
    }

    /// Reset the seconds counter.
    pub fn reset_seconds_counter(&self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        proxy.request(&format!(
            "self.roaches['{}'].logic.seconds_cntr_reset()",
            self.board
        ))?;
        Ok(())
    }

    /// State of the board's gbe0 network core.
    pub fn gbe0_state(&self, proxy: &mut dyn RemoteProxy) -> McResult<Value> {
        proxy.request(&format!(
            "self.roaches['{}'].get_gbe0_states()",
            self.board
        ))
    }
}
