//! In-memory simulated supervisor.
//!
//! `MockSupervisor` stands in for the remote process in the test suites and
//! in demo mode. It keeps a call journal (method name plus arguments, in
//! call order) so tests can assert RPC counts and ordering, can be told to
//! fail named methods, and reproduces the two remote behaviors the client
//! must handle: gain quantization on RF-section writes and bit masking on
//! register writes (both make a readback differ from the request).

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{McError, McResult};
use crate::proxy::{RemoteProxy, RfReadback, RoachReport};
use crate::state::{AdcTemps, SynthStatus};

/// One simulated RF section.
#[derive(Clone, Debug)]
pub struct MockRf {
    pub gain: Option<f64>,
    pub enabled: Option<bool>,
    /// Measured level is `base_level + gain` while the section is enabled.
    pub base_level: f64,
}

/// One simulated board.
#[derive(Clone, Debug)]
pub struct MockBoard {
    pub ip: String,
    pub alive: bool,
    pub power: Option<bool>,
    pub firmware: Option<String>,
    pub boffile: Option<String>,
    pub available: Vec<String>,
    pub registers: BTreeMap<String, i64>,
    pub rf: BTreeMap<(u32, u32), MockRf>,
    pub synth: SynthStatus,
    pub temps: BTreeMap<u32, AdcTemps>,
}

impl MockBoard {
    fn bare(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            alive: true,
            power: Some(true),
            firmware: None,
            boffile: None,
            available: vec!["kurt_spec".into(), "kurt_spec_r1".into(), "sao_spec".into()],
            registers: BTreeMap::new(),
            rf: BTreeMap::new(),
            synth: SynthStatus {
                frequency: 1020.0,
                rf_level: 3.0,
            },
            temps: BTreeMap::new(),
        }
    }
}

/// Register set a freshly loaded kurtosis bitfile exposes.
pub fn kurtosis_registers() -> BTreeMap<String, i64> {
    let mut registers = BTreeMap::new();
    for name in [
        "sync_in_sel",
        "adc_snap_trig",
        "pkt_cnt_sec_rst_ctrl",
        "select_bits_pow",
        "raw_pkt_cnt_is_fpga_clocks",
        "raw_pkt_cnt_rst_ctrl",
        "bit_select_counter_out",
    ] {
        registers.insert(name.to_string(), 0);
    }
    registers.insert("acc_len_m1".to_string(), 1023);
    registers
}

/// Simulated supervisor with a call journal.
pub struct MockSupervisor {
    pub boards: BTreeMap<String, MockBoard>,
    pub switch_states: Vec<u32>,
    pub switch_keys: Vec<String>,
    pub input_labels: Vec<String>,
    pub fans: BTreeMap<String, f64>,
    pub volts: BTreeMap<String, f64>,
    pub mms_temps: BTreeMap<String, f64>,
    /// Method-call journal, one `"method arg arg ..."` entry per RPC.
    pub calls: Vec<String>,
    /// Methods forced to fail with a communication error.
    pub fail_methods: BTreeSet<String>,
    /// Bit masks applied on register writes, keyed by register name.
    pub register_masks: BTreeMap<String, i64>,
    /// Remote gain resolution in dB; requested gains are rounded to it.
    pub gain_step: f64,
}

impl Default for MockSupervisor {
    fn default() -> Self {
        Self {
            boards: BTreeMap::new(),
            switch_states: Vec::new(),
            switch_keys: Vec::new(),
            input_labels: Vec::new(),
            fans: BTreeMap::new(),
            volts: BTreeMap::new(),
            mms_temps: BTreeMap::new(),
            calls: Vec::new(),
            fail_methods: BTreeSet::new(),
            register_masks: BTreeMap::new(),
            gain_step: 0.5,
        }
    }
}

impl MockSupervisor {
    /// The reference deployment: roach1 running kurtosis firmware with
    /// 2 ADCs x 2 RF inputs, roach2 powered but without firmware.
    pub fn two_boards() -> Self {
        let mut roach1 = MockBoard::bare("192.168.1.11");
        roach1.firmware = Some("kurt_spec".into());
        roach1.boffile = Some("kurt_spec".into());
        roach1.registers = kurtosis_registers();
        for adc in 0..2 {
            for rf in 0..2 {
                roach1.rf.insert(
                    (adc, rf),
                    MockRf {
                        gain: Some(-1.0 + f64::from(adc + rf)),
                        enabled: Some(true),
                        base_level: -3.0,
                    },
                );
            }
            roach1.temps.insert(
                adc,
                AdcTemps {
                    ambient: 24.0 + f64::from(adc),
                    chip: 42.5,
                },
            );
        }

        let roach2 = MockBoard::bare("192.168.1.12");

        let mut supervisor = Self::default();
        supervisor.boards.insert("roach1".into(), roach1);
        supervisor.boards.insert("roach2".into(), roach2);
        supervisor.switch_states = vec![0, 0, 0, 0];
        supervisor.switch_keys = (0..4).map(|n| format!("IF{n}")).collect();
        supervisor.input_labels = (0..24).map(|n| format!("Input {n}")).collect();
        supervisor.fans.insert("fan1".into(), 3200.0);
        supervisor.fans.insert("fan2".into(), 3150.0);
        supervisor.volts.insert("+5V".into(), 5.02);
        supervisor.volts.insert("+12V".into(), 11.96);
        supervisor.mms_temps.insert("PSU".into(), 31.5);
        supervisor
    }

    /// Journal entries for one method, in call order.
    pub fn calls_to(&self, method: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(method))
            .map(String::as_str)
            .collect()
    }

    fn record(&mut self, method: &str, detail: String) -> McResult<()> {
        if detail.is_empty() {
            self.calls.push(method.to_string());
        } else {
            self.calls.push(format!("{method} {detail}"));
        }
        if self.fail_methods.contains(method) {
            return Err(McError::Communication(format!("{method}: forced failure")));
        }
        Ok(())
    }

    fn board(&self, name: &str) -> McResult<&MockBoard> {
        self.boards
            .get(name)
            .ok_or_else(|| McError::Remote(format!("unknown board '{name}'")))
    }

    fn board_mut(&mut self, name: &str) -> McResult<&mut MockBoard> {
        self.boards
            .get_mut(name)
            .ok_or_else(|| McError::Remote(format!("unknown board '{name}'")))
    }

    fn board_names(&self) -> Vec<String> {
        self.boards.keys().cloned().collect()
    }

    fn level_of(rf: &MockRf) -> Value {
        match (rf.enabled, rf.gain) {
            (Some(true), gain) => json!(rf.base_level + gain.unwrap_or(0.0)),
            _ => Value::Null,
        }
    }
}

impl RemoteProxy for MockSupervisor {
    fn ping(&mut self) -> McResult<()> {
        self.record("ping", String::new())
    }

    fn request(&mut self, expression: &str) -> McResult<Value> {
        self.record("request", expression.to_string())?;
        if expression == "self.get_firmware_states()"
            || expression == "self.get_sampler_clocks_status()"
        {
            return Ok(Value::Null);
        }
        if expression == "self.firmware_states" {
            let states: Vec<i64> = self
                .boards
                .values()
                .map(|b| match (&b.boffile, &b.available) {
                    (Some(bof), avail) => avail
                        .iter()
                        .position(|a| a == bof)
                        .map(|i| i as i64)
                        .unwrap_or(-1),
                    (None, _) => -1,
                })
                .collect();
            return Ok(json!(states));
        }
        if let Some(rest) = expression.strip_prefix("self.firmware['") {
            let board = rest.trim_end_matches("']");
            let name = self
                .board(board)?
                .firmware
                .clone()
                .unwrap_or_else(|| "None".to_string());
            return Ok(json!(name));
        }
        if expression == "self.IFsw.channel.keys()" {
            return Ok(json!(self.switch_keys));
        }
        if expression == "self.IFsw.inputs.keys()" {
            return Ok(json!(self.input_labels));
        }
        if let Some(rest) = expression.strip_prefix("self.roaches['") {
            if let Some(board) = rest.strip_suffix("'].clock_synth.status") {
                let synth = self.board(board)?.synth;
                return Ok(json!({"frequency": synth.frequency, "rf_level": synth.rf_level}));
            }
            if let Some(board) = rest.strip_suffix("'].logic.sync_DSP()") {
                self.board(board)?;
                return Ok(Value::Null);
            }
            if let Some(board) = rest.strip_suffix("'].logic.dsp_user_reset()") {
                self.board(board)?;
                return Ok(Value::Null);
            }
            if let Some(board) = rest.strip_suffix("'].logic.seconds_cntr_reset()") {
                self.board(board)?;
                return Ok(Value::Null);
            }
            if let Some(board) = rest.strip_suffix("'].get_gbe0_states()") {
                self.board(board)?;
                return Ok(json!({"link_up": true, "tx_overflow": false}));
            }
        }
        if let Some(rest) = expression.strip_prefix("self.firmware_server.parse_registers('") {
            let firmware = rest.trim_end_matches("')");
            let mut details = serde_json::Map::new();
            for name in kurtosis_registers().keys() {
                details.insert(name.clone(), json!({"firmware": firmware, "width": 32}));
            }
            return Ok(Value::Object(details));
        }
        Err(McError::Remote(format!("cannot evaluate '{expression}'")))
    }

    fn roach_report(&mut self) -> McResult<RoachReport> {
        self.record("roach_report", String::new())?;
        let mut report = RoachReport::default();
        for (name, board) in &self.boards {
            report.ip.insert(name.clone(), board.ip.clone());
            report.alive.insert(name.clone(), board.alive);
            report.bof.insert(name.clone(), board.boffile.clone());
            report.avail.insert(name.clone(), board.available.clone());
            report.power.insert(name.clone(), board.power);
        }
        Ok(report)
    }

    fn get_gains(&mut self, board: &str) -> McResult<Value> {
        self.record("get_gains", board.to_string())?;
        let board = self.board(board)?;
        let mut adcs: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for ((adc, rf), section) in &board.rf {
            adcs.entry(adc.to_string()).or_default().insert(
                rf.to_string(),
                json!({"gain": section.gain, "enabled": section.enabled}),
            );
        }
        Ok(json!(adcs))
    }

    fn set_rf_section(
        &mut self,
        board: &str,
        adc: u32,
        rf: u32,
        gain: Option<f64>,
        enabled: bool,
    ) -> McResult<()> {
        self.record(
            "set_rf_section",
            format!("{board} {adc} {rf} {gain:?} {enabled}"),
        )?;
        let step = self.gain_step;
        let section = self
            .board_mut(board)?
            .rf
            .get_mut(&(adc, rf))
            .ok_or_else(|| McError::Remote(format!("no RF section {adc}/{rf} on {board}")))?;
        if let Some(gain) = gain {
            section.gain = Some((gain / step).round() * step);
        }
        section.enabled = Some(enabled);
        Ok(())
    }

    fn get_rf_section(&mut self, board: &str, adc: u32, rf: u32) -> McResult<RfReadback> {
        self.record("get_rf_section", format!("{board} {adc} {rf}"))?;
        let section = self
            .board(board)?
            .rf
            .get(&(adc, rf))
            .ok_or_else(|| McError::Remote(format!("no RF section {adc}/{rf} on {board}")))?;
        Ok(RfReadback {
            enabled: section.enabled,
            gain: section.gain,
        })
    }

    fn get_adc_levels(&mut self) -> McResult<Value> {
        self.record("get_adc_levels", String::new())?;
        let mut by_board: BTreeMap<String, Value> = BTreeMap::new();
        for (index, name) in self.board_names().iter().enumerate() {
            let board = &self.boards[name];
            if board.firmware.is_none() {
                continue;
            }
            let mut adcs: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
            for ((adc, rf), section) in &board.rf {
                adcs.entry(adc.to_string())
                    .or_default()
                    .insert(rf.to_string(), Self::level_of(section));
            }
            by_board.insert(index.to_string(), json!(adcs));
        }
        Ok(json!(by_board))
    }

    fn get_temperatures(&mut self) -> McResult<Value> {
        self.record("get_temperatures", String::new())?;
        let mut by_board: BTreeMap<String, Value> = BTreeMap::new();
        for (name, board) in &self.boards {
            let mut adcs: BTreeMap<String, Value> = BTreeMap::new();
            for (adc, temps) in &board.temps {
                adcs.insert(
                    adc.to_string(),
                    json!({"ambient": temps.ambient, "IC": temps.chip}),
                );
            }
            by_board.insert(name.clone(), json!(adcs));
        }
        Ok(json!(by_board))
    }

    fn get_switch_states(&mut self) -> McResult<Vec<u32>> {
        self.record("get_switch_states", String::new())?;
        Ok(self.switch_states.clone())
    }

    fn set_switch_state(&mut self, output: u32, input: u32) -> McResult<u32> {
        self.record("set_switch_state", format!("{output} {input}"))?;
        let slot = self
            .switch_states
            .get_mut(output as usize)
            .ok_or_else(|| McError::Remote(format!("no IF switch output {output}")))?;
        *slot = input;
        Ok(input)
    }

    fn check_fans(&mut self) -> McResult<BTreeMap<String, f64>> {
        self.record("check_fans", String::new())?;
        Ok(self.fans.clone())
    }

    fn get_mms_analog(&mut self) -> McResult<(BTreeMap<String, f64>, BTreeMap<String, f64>)> {
        self.record("get_mms_analog", String::new())?;
        Ok((self.volts.clone(), self.mms_temps.clone()))
    }

    fn get_register_values(&mut self, board: &str) -> McResult<BTreeMap<String, i64>> {
        self.record("get_register_values", board.to_string())?;
        Ok(self.board(board)?.registers.clone())
    }

    fn get_firmware_summary(&mut self, firmware: &str) -> McResult<Value> {
        self.record("get_firmware_summary", firmware.to_string())?;
        Ok(json!({"name": firmware, "channels": 1024, "bandwidth_mhz": 1020.0}))
    }

    fn attach_roach(&mut self, board: &str, firmware: &str) -> McResult<String> {
        self.record("attach_roach", format!("{board} {firmware}"))?;
        let firmware = firmware.to_string();
        let target = self.board_mut(board)?;
        if !target.available.iter().any(|a| a == &firmware) {
            return Err(McError::Remote(format!(
                "board '{board}' has no bitfile for '{firmware}'"
            )));
        }
        target.firmware = Some(firmware.clone());
        target.boffile = Some(firmware.clone());
        target.registers = kurtosis_registers();
        if target.rf.is_empty() {
            for rf in 0..2 {
                target.rf.insert(
                    (0, rf),
                    MockRf {
                        gain: Some(0.0),
                        enabled: Some(true),
                        base_level: -3.0,
                    },
                );
            }
        }
        Ok(firmware)
    }

    fn fpga_read_int(&mut self, board: &str, register: &str) -> McResult<i64> {
        self.record("fpga_read_int", format!("{board} {register}"))?;
        self.board(board)?
            .registers
            .get(register)
            .copied()
            .ok_or_else(|| McError::Remote(format!("no register '{register}' on {board}")))
    }

    fn fpga_write_int(&mut self, board: &str, register: &str, value: i64) -> McResult<()> {
        self.record("fpga_write_int", format!("{board} {register} {value}"))?;
        let stored = match self.register_masks.get(register) {
            Some(mask) => value & mask,
            None => value,
        };
        let registers = &mut self.board_mut(board)?.registers;
        if !registers.contains_key(register) {
            return Err(McError::Remote(format!(
                "no register '{register}' on {board}"
            )));
        }
        registers.insert(register.to_string(), stored);
        Ok(())
    }

    fn get_adc_samples(&mut self, board: &str, adc: u32, rf: u32) -> McResult<Vec<f64>> {
        self.record("get_adc_samples", format!("{board} {adc} {rf}"))?;
        self.board(board)?;
        let seed = u64::from(adc * 2 + rf);
        Ok((0..64)
            .map(|i| f64::from(((i * 7 + seed * 3) % 13) as u32) - 6.0)
            .collect())
    }

    fn get_accumulations(&mut self, board_index: u32, adc: u32, rf: u32) -> McResult<Value> {
        self.record(
            "get_accumulations",
            format!("{board_index} {adc} {rf}"),
        )?;
        let spectrum: Vec<f64> = (0..32).map(|i| f64::from(i % 8) + 1.0).collect();
        let kurtosis: Vec<f64> = (0..32).map(|_| 3.0).collect();
        Ok(json!({"2": spectrum, "4": kurtosis}))
    }

    fn list_registers(&mut self, boards: &[u32]) -> McResult<Vec<String>> {
        self.record(
            "list_registers",
            boards
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        )?;
        let names: BTreeSet<String> = self
            .boards
            .values()
            .flat_map(|b| b.registers.keys().cloned())
            .collect();
        Ok(names.into_iter().collect())
    }
}
