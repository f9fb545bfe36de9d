//! Client-side mirror of remote device state.
//!
//! [`DeviceStateCache`] is the single source of truth for everything the
//! presentation layer displays. It is repopulated wholesale on connect and
//! after a firmware change, and patched incrementally from readback values
//! after individual control actions. Refresh is per-field fault tolerant: a
//! failed query logs a warning and leaves the previous value of that field
//! in place, so one slow or broken subsystem never blanks its siblings.
//!
//! Reads distinguish "never populated" (an error) from "populated but
//! disabled/unmeasured" (`Ok(None)`).

use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{McError, McResult};
use crate::keys::{board_index, GridKey};
use crate::proxy::{decode, RemoteProxy};
use crate::state::{AdcTemps, BoardStatus, ControlKind, RfPath, SynthStatus, TargetPath};

/// Mirrored view of the deployment, keyed by board / ADC / RF input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceStateCache {
    boards: BTreeMap<String, BoardStatus>,
    /// Sorted board names; index order matches the remote's board indices.
    board_keys: Vec<String>,
    /// Loaded firmware identifier per board, `None` when unloaded/unknown.
    firmware: BTreeMap<String, Option<String>>,
    /// Index of the loaded bitfile in `available`, -1 when not found.
    firmware_index: BTreeMap<String, i32>,
    fw_details: BTreeMap<String, Option<Value>>,
    gain: BTreeMap<RfPath, Option<f64>>,
    rf_on: BTreeMap<RfPath, Option<bool>>,
    adc_levels: BTreeMap<RfPath, Option<f64>>,
    adc_source: BTreeMap<RfPath, Option<u32>>,
    temps: BTreeMap<(String, u32), AdcTemps>,
    synth: BTreeMap<String, SynthStatus>,
    switch_states: Vec<u32>,
    switch_keys: Vec<String>,
    input_labels: Vec<String>,
    fan_rpm: BTreeMap<String, f64>,
    volts: BTreeMap<String, f64>,
    mms_temps: BTreeMap<String, f64>,
    register_values: BTreeMap<String, BTreeMap<String, i64>>,
    register_details: BTreeMap<String, Value>,
}

impl DeviceStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------- wholesale refresh -------------------------

    /// Repopulate every mapping from the supervisor.
    ///
    /// Each field refresh that fails is logged and skipped; the previous
    /// value stays in place. Call [`refresh_boards`](Self::refresh_boards)
    /// directly first when a failure must be fatal (connection bootstrap).
    pub fn bulk_refresh(&mut self, proxy: &mut dyn RemoteProxy) {
        let fields: [(&str, fn(&mut Self, &mut dyn RemoteProxy) -> McResult<()>); 9] = [
            ("boards", Self::refresh_boards),
            ("temperatures", Self::refresh_temperatures),
            ("firmware", Self::refresh_firmware),
            ("gains", Self::refresh_gains),
            ("synthesizers", Self::refresh_synth),
            ("ADC levels", Self::refresh_adc_levels),
            ("IF switches", Self::refresh_switches),
            ("board monitor", Self::refresh_monitor),
            ("registers", Self::refresh_registers),
        ];
        for (field, refresh) in fields {
            if let Err(err) = refresh(self, proxy) {
                warn!("refresh of {field} failed, keeping previous values: {err}");
            }
        }
    }

    /// Board inventory: addresses, liveness, loaded/available bitfiles.
    pub fn refresh_boards(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        let report = proxy.roach_report()?;
        let mut boards = BTreeMap::new();
        let mut firmware_index = BTreeMap::new();
        for (name, alive) in &report.alive {
            let available = report.avail.get(name).cloned().unwrap_or_default();
            let boffile = report.bof.get(name).cloned().flatten();
            let index = match &boffile {
                Some(bof) => available
                    .iter()
                    .position(|a| a == bof)
                    .map(|i| i as i32)
                    .unwrap_or(-1),
                None => -1,
            };
            firmware_index.insert(name.clone(), index);
            boards.insert(
                name.clone(),
                BoardStatus {
                    ip: report.ip.get(name).cloned().unwrap_or_default(),
                    alive: *alive,
                    power: report.power.get(name).copied().flatten(),
                    boffile,
                    available,
                },
            );
        }
        self.board_keys = boards.keys().cloned().collect();
        debug!("boards: {:?}", self.board_keys);
        self.boards = boards;
        self.firmware_index = firmware_index;
        Ok(())
    }

    /// Loaded firmware names and their summaries.
    pub fn refresh_firmware(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        proxy.request("self.get_firmware_states()")?;
        let mut firmware = BTreeMap::new();
        let mut fw_details = BTreeMap::new();
        for board in &self.board_keys {
            let name: String =
                serde_json::from_value(proxy.request(&format!("self.firmware['{board}']"))?)?;
            let loaded = if name == "None" { None } else { Some(name) };
            let details = match &loaded {
                Some(fw) => match proxy.get_firmware_summary(fw) {
                    Ok(summary) => Some(summary),
                    Err(err) => {
                        warn!("no firmware summary for {board} ({fw}): {err}");
                        None
                    }
                },
                None => None,
            };
            debug!("{board} runs firmware {loaded:?}");
            firmware.insert(board.clone(), loaded);
            fw_details.insert(board.clone(), details);
        }
        self.firmware = firmware;
        self.fw_details = fw_details;
        Ok(())
    }

    /// RF section gains and enabled states for every board with firmware.
    ///
    /// Boards without firmware contribute no RF keys. The level map is
    /// extended so that every gain key has a (possibly unmeasured) level
    /// entry, keeping the three RF mappings over one key space.
    pub fn refresh_gains(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        let boards = self.board_keys.clone();
        for board in boards {
            if self.firmware.get(&board).cloned().flatten().is_none() {
                self.gain.retain(|path, _| path.board != board);
                self.rf_on.retain(|path, _| path.board != board);
                continue;
            }
            let payload = match proxy.get_gains(&board) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!("gain refresh for {board} failed: {err}");
                    continue;
                }
            };
            for (path, gain, enabled) in decode::rf_sections(&board, &payload)? {
                self.adc_levels.entry(path.clone()).or_insert(None);
                self.gain.insert(path.clone(), gain);
                self.rf_on.insert(path, enabled);
            }
        }
        Ok(())
    }

    /// Measured RF input levels.
    pub fn refresh_adc_levels(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        let payload = proxy.get_adc_levels()?;
        let levels = decode::adc_levels(&payload, &self.board_keys)?;
        for (path, level) in levels {
            self.adc_levels.insert(path, level);
        }
        Ok(())
    }

    /// ADC ambient and chip temperatures.
    pub fn refresh_temperatures(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        let payload = proxy.get_temperatures()?;
        self.temps = decode::temperatures(&payload)?;
        Ok(())
    }

    /// Sampler-clock synthesizer status per board.
    pub fn refresh_synth(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        proxy.request("self.get_sampler_clocks_status()").ok();
        let mut synth = BTreeMap::new();
        for board in &self.board_keys {
            let status = proxy.request(&format!("self.roaches['{board}'].clock_synth.status"))?;
            synth.insert(board.clone(), serde_json::from_value(status)?);
        }
        self.synth = synth;
        Ok(())
    }

    /// IF-switch states, output keys and input labels, and the derived
    /// signal source of every RF section.
    pub fn refresh_switches(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        self.switch_states = proxy.get_switch_states()?;
        let mut keys: Vec<String> =
            serde_json::from_value(proxy.request("self.IFsw.channel.keys()")?)?;
        keys.sort();
        self.switch_keys = keys;
        let mut labels: Vec<String> =
            serde_json::from_value(proxy.request("self.IFsw.inputs.keys()")?)?;
        labels.sort();
        self.input_labels = labels;
        self.rederive_sources()?;
        Ok(())
    }

    /// Fan tachometers and monitor-board analog points.
    pub fn refresh_monitor(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        self.fan_rpm = proxy.check_fans()?;
        let (volts, mms_temps) = proxy.get_mms_analog()?;
        self.volts = volts;
        self.mms_temps = mms_temps;
        Ok(())
    }

    /// Register values per board; boards without firmware get an empty map.
    pub fn refresh_registers(&mut self, proxy: &mut dyn RemoteProxy) -> McResult<()> {
        let boards = self.board_keys.clone();
        for board in boards {
            if self.firmware.get(&board).cloned().flatten().is_none() {
                self.register_values.insert(board, BTreeMap::new());
                continue;
            }
            match proxy.get_register_values(&board) {
                Ok(values) => {
                    self.register_values.insert(board, values);
                }
                Err(err) => warn!("register refresh for {board} failed: {err}"),
            }
        }
        Ok(())
    }

    /// Fetch and cache the register details for one board's firmware.
    pub fn fetch_register_details(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        board: &str,
    ) -> McResult<Value> {
        let firmware = self
            .firmware(board)?
            .ok_or_else(|| McError::Request(format!("{board} runs no firmware")))?
            .to_string();
        let details =
            proxy.request(&format!("self.firmware_server.parse_registers('{firmware}')"))?;
        self.register_details.insert(board.to_string(), details.clone());
        Ok(details)
    }

    fn rederive_sources(&mut self) -> McResult<()> {
        let mut sources = BTreeMap::new();
        for path in self.gain.keys() {
            let output = path.switch_output()? as usize;
            sources.insert(path.clone(), self.switch_states.get(output).copied());
        }
        self.adc_source = sources;
        Ok(())
    }

    // ------------------------- incremental patch -------------------------

    /// Apply one confirmed readback value to exactly the mapping addressed
    /// by `path` and `kind`.
    ///
    /// The value is the readback, never the request. `Value::Null` records a
    /// populated-but-disabled state. Patching a path that was never
    /// populated fails with `KeyNotFound` (registers are the exception: any
    /// name may appear under a board whose register map exists, since the
    /// readback is authoritative).
    pub fn apply_write_result(
        &mut self,
        path: &TargetPath,
        kind: ControlKind,
        value: &Value,
    ) -> McResult<()> {
        let missing = || McError::KeyNotFound(path.to_string());
        match (kind, path) {
            (ControlKind::Gain, TargetPath::Rf(rf)) => {
                let slot = self.gain.get_mut(rf).ok_or_else(missing)?;
                *slot = value.as_f64();
            }
            (ControlKind::Enable, TargetPath::Rf(rf)) => {
                let slot = self.rf_on.get_mut(rf).ok_or_else(missing)?;
                *slot = value.as_bool();
            }
            (ControlKind::Level, TargetPath::Rf(rf)) => {
                let slot = self.adc_levels.get_mut(rf).ok_or_else(missing)?;
                *slot = value.as_f64();
            }
            (ControlKind::SwitchState, TargetPath::Rf(rf)) => {
                let input = value
                    .as_u64()
                    .ok_or_else(|| McError::Payload(format!("non-integer switch state {value}")))?
                    as u32;
                let output = rf.switch_output()?;
                let slot = self
                    .switch_states
                    .get_mut(output as usize)
                    .ok_or_else(missing)?;
                *slot = input;
                for (path, source) in &mut self.adc_source {
                    if path.switch_output()? == output {
                        *source = Some(input);
                    }
                }
            }
            (ControlKind::Register, TargetPath::Register { board, name }) => {
                let readback = value
                    .as_i64()
                    .ok_or_else(|| McError::Payload(format!("non-integer register value {value}")))?;
                let registers = self.register_values.get_mut(board).ok_or_else(missing)?;
                registers.insert(name.clone(), readback);
            }
            (kind, path) => {
                return Err(McError::Request(format!(
                    "cannot apply a {kind} result at {path}"
                )));
            }
        }
        debug!("cache patched: {path} {kind} = {value}");
        Ok(())
    }

    // ------------------------------ reads --------------------------------

    /// Current value for a path/kind pair, rendered as JSON.
    pub fn current_value(&self, path: &TargetPath, kind: ControlKind) -> McResult<Value> {
        match (kind, path) {
            (ControlKind::Gain, TargetPath::Rf(rf)) => Ok(json!(self.gain(rf)?)),
            (ControlKind::Enable, TargetPath::Rf(rf)) => Ok(json!(self.rf_enabled(rf)?)),
            (ControlKind::Level, TargetPath::Rf(rf)) => Ok(json!(self.adc_level(rf)?)),
            (ControlKind::SwitchState, TargetPath::Rf(rf)) => Ok(json!(self.adc_source(rf)?)),
            (ControlKind::Register, TargetPath::Register { board, name }) => {
                Ok(json!(self.register(board, name)?))
            }
            (ControlKind::FirmwareSelect, TargetPath::Board(board)) => {
                Ok(json!(self.firmware(board)?))
            }
            (kind, path) => Err(McError::Request(format!("no {kind} value at {path}"))),
        }
    }

    pub fn board_keys(&self) -> &[String] {
        &self.board_keys
    }

    pub fn board(&self, name: &str) -> McResult<&BoardStatus> {
        self.boards
            .get(name)
            .ok_or_else(|| McError::KeyNotFound(name.to_string()))
    }

    pub fn firmware(&self, board: &str) -> McResult<Option<&str>> {
        self.firmware
            .get(board)
            .map(|fw| fw.as_deref())
            .ok_or_else(|| McError::KeyNotFound(board.to_string()))
    }

    pub fn firmware_index(&self, board: &str) -> McResult<i32> {
        self.firmware_index
            .get(board)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(board.to_string()))
    }

    /// Sorted union of the bitfiles available across all boards.
    pub fn firmware_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .boards
            .values()
            .flat_map(|b| b.available.iter().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn firmware_summary(&self, board: &str) -> McResult<Option<&Value>> {
        self.fw_details
            .get(board)
            .map(Option::as_ref)
            .ok_or_else(|| McError::KeyNotFound(board.to_string()))
    }

    pub fn gain(&self, path: &RfPath) -> McResult<Option<f64>> {
        self.gain
            .get(path)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(path.to_string()))
    }

    pub fn rf_enabled(&self, path: &RfPath) -> McResult<Option<bool>> {
        self.rf_on
            .get(path)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(path.to_string()))
    }

    pub fn adc_level(&self, path: &RfPath) -> McResult<Option<f64>> {
        self.adc_levels
            .get(path)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(path.to_string()))
    }

    pub fn adc_source(&self, path: &RfPath) -> McResult<Option<u32>> {
        self.adc_source
            .get(path)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(path.to_string()))
    }

    pub fn register(&self, board: &str, name: &str) -> McResult<i64> {
        self.register_values
            .get(board)
            .and_then(|regs| regs.get(name))
            .copied()
            .ok_or_else(|| McError::KeyNotFound(format!("{board}:{name}")))
    }

    pub fn registers(&self, board: &str) -> McResult<&BTreeMap<String, i64>> {
        self.register_values
            .get(board)
            .ok_or_else(|| McError::KeyNotFound(board.to_string()))
    }

    /// True when the board's register map was populated (even if empty).
    pub fn has_register_map(&self, board: &str) -> bool {
        self.register_values.contains_key(board)
    }

    /// Register details fetched earlier for this board, if any.
    pub fn cached_register_details(&self, board: &str) -> Option<&Value> {
        self.register_details.get(board)
    }

    pub fn temperatures(&self) -> &BTreeMap<(String, u32), AdcTemps> {
        &self.temps
    }

    pub fn synth_status(&self, board: &str) -> McResult<SynthStatus> {
        self.synth
            .get(board)
            .copied()
            .ok_or_else(|| McError::KeyNotFound(board.to_string()))
    }

    pub fn switch_states(&self) -> &[u32] {
        &self.switch_states
    }

    pub fn switch_keys(&self) -> &[String] {
        &self.switch_keys
    }

    pub fn input_labels(&self) -> &[String] {
        &self.input_labels
    }

    pub fn fan_rpm(&self) -> &BTreeMap<String, f64> {
        &self.fan_rpm
    }

    pub fn volts(&self) -> &BTreeMap<String, f64> {
        &self.volts
    }

    pub fn mms_temps(&self) -> &BTreeMap<String, f64> {
        &self.mms_temps
    }

    pub fn rf_paths(&self) -> impl Iterator<Item = &RfPath> {
        self.gain.keys()
    }

    // ------------------------- grid key producers ------------------------

    /// Depth-1 keys, one per board.
    pub fn board_grid_keys(&self) -> McResult<Vec<GridKey>> {
        self.board_keys
            .iter()
            .map(|b| Ok(GridKey::board(board_index(b)?)))
            .collect()
    }

    /// Depth-2 keys for every (board, ADC) with a temperature reading.
    pub fn adc_grid_keys(&self) -> McResult<Vec<GridKey>> {
        self.temps
            .keys()
            .map(|(board, adc)| Ok(GridKey::new(vec![board_index(board)?, *adc])))
            .collect()
    }

    /// Depth-3 keys for every RF section.
    pub fn rf_grid_keys(&self) -> McResult<Vec<GridKey>> {
        self.gain.keys().map(RfPath::grid_key).collect()
    }

    /// The RF path a depth-3 grid key addresses, if it names a real section.
    pub fn rf_path_for(&self, key: &GridKey) -> Option<RfPath> {
        if key.depth() != 3 {
            return None;
        }
        self.gain
            .keys()
            .find(|path| path.grid_key().ok().as_ref() == Some(key))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mock::MockSupervisor;

    fn populated() -> (DeviceStateCache, MockSupervisor) {
        let mut supervisor = MockSupervisor::two_boards();
        let mut cache = DeviceStateCache::new();
        cache.bulk_refresh(&mut supervisor);
        (cache, supervisor)
    }

    #[test]
    fn bulk_refresh_populates_every_mapping() {
        let (cache, _) = populated();
        assert_eq!(cache.board_keys(), ["roach1", "roach2"]);
        assert_eq!(cache.firmware("roach1").unwrap(), Some("kurt_spec"));
        assert_eq!(cache.firmware("roach2").unwrap(), None);
        assert_eq!(cache.firmware_index("roach1").unwrap(), 0);
        assert_eq!(cache.firmware_index("roach2").unwrap(), -1);
        assert_eq!(
            cache.gain(&RfPath::new("roach1", 0, 0)).unwrap(),
            Some(-1.0)
        );
        assert_eq!(
            cache.rf_enabled(&RfPath::new("roach1", 1, 1)).unwrap(),
            Some(true)
        );
        assert!(cache.adc_level(&RfPath::new("roach1", 0, 0)).unwrap().is_some());
        assert_eq!(cache.register("roach1", "acc_len_m1").unwrap(), 1023);
        assert!(cache.registers("roach2").unwrap().is_empty());
        assert_eq!(cache.switch_states().len(), 4);
        assert!(!cache.fan_rpm().is_empty());
    }

    #[test]
    fn bulk_refresh_is_idempotent() {
        let (mut cache, mut supervisor) = populated();
        let first = cache.clone();
        cache.bulk_refresh(&mut supervisor);
        assert_eq!(cache, first);
    }

    #[test]
    fn failed_field_keeps_previous_value() {
        let (mut cache, mut supervisor) = populated();
        let temps_before = cache.temperatures().clone();
        supervisor.boards.get_mut("roach1").unwrap().temps.clear();
        supervisor.fail_methods.insert("get_temperatures".into());
        supervisor.fail_methods.insert("check_fans".into());
        cache.bulk_refresh(&mut supervisor);
        assert_eq!(cache.temperatures(), &temps_before);
        assert!(!cache.fan_rpm().is_empty());
        // Fields behind the failing ones still refreshed.
        assert_eq!(cache.register("roach1", "acc_len_m1").unwrap(), 1023);
    }

    #[test]
    fn get_distinguishes_missing_from_disabled() {
        let (mut cache, _) = populated();
        let path = RfPath::new("roach1", 0, 0);
        cache
            .apply_write_result(
                &TargetPath::Rf(path.clone()),
                ControlKind::Gain,
                &Value::Null,
            )
            .unwrap();
        assert_eq!(cache.gain(&path).unwrap(), None);
        assert!(matches!(
            cache.gain(&RfPath::new("roach9", 0, 0)),
            Err(McError::KeyNotFound(_))
        ));
    }

    #[test]
    fn write_result_updates_only_named_mapping() {
        let (mut cache, _) = populated();
        let path = RfPath::new("roach1", 0, 1);
        let enabled_before = cache.rf_enabled(&path).unwrap();
        let level_before = cache.adc_level(&path).unwrap();
        cache
            .apply_write_result(&TargetPath::Rf(path.clone()), ControlKind::Gain, &json!(7.5))
            .unwrap();
        assert_eq!(cache.gain(&path).unwrap(), Some(7.5));
        assert_eq!(cache.rf_enabled(&path).unwrap(), enabled_before);
        assert_eq!(cache.adc_level(&path).unwrap(), level_before);
    }

    #[test]
    fn switch_patch_updates_sources_on_same_output() {
        let (mut cache, _) = populated();
        let path = RfPath::new("roach1", 0, 1);
        cache
            .apply_write_result(
                &TargetPath::Rf(path.clone()),
                ControlKind::SwitchState,
                &json!(17),
            )
            .unwrap();
        assert_eq!(cache.switch_states()[1], 17);
        assert_eq!(cache.adc_source(&path).unwrap(), Some(17));
        // Same output feeds ADC 1's RF 1 per the wiring convention.
        assert_eq!(
            cache.adc_source(&RfPath::new("roach1", 1, 1)).unwrap(),
            Some(17)
        );
        // Other outputs untouched.
        assert_eq!(
            cache.adc_source(&RfPath::new("roach1", 0, 0)).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn kind_and_path_must_agree() {
        let (mut cache, _) = populated();
        let err = cache.apply_write_result(
            &TargetPath::Board("roach1".into()),
            ControlKind::Gain,
            &json!(1.0),
        );
        assert!(matches!(err, Err(McError::Request(_))));
    }

    #[test]
    fn grid_keys_cover_rf_sections() {
        let (cache, _) = populated();
        let keys = cache.rf_grid_keys().unwrap();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&GridKey::new(vec![0, 1, 1])));
        let boards = cache.board_grid_keys().unwrap();
        assert_eq!(boards, vec![GridKey::board(0), GridKey::board(1)]);
    }
}
