//! Shared device-state records and addressing types.
//!
//! These are the value types mirrored from the remote supervisor and the key
//! types used to address them. A [`RfPath`] names one RF section (board,
//! ADC slot, RF input); a [`TargetPath`] extends that to the other control
//! targets (a whole board, or one named firmware register on a board).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::McResult;
use crate::keys::{board_index, GridKey};

/// Address of one RF section: board name, ZDOC slot of the ADC, RF input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RfPath {
    pub board: String,
    pub adc: u32,
    pub rf: u32,
}

impl RfPath {
    pub fn new(board: impl Into<String>, adc: u32, rf: u32) -> Self {
        Self {
            board: board.into(),
            adc,
            rf,
        }
    }

    /// Integer column key for this path, with the board name normalized.
    pub fn grid_key(&self) -> McResult<GridKey> {
        Ok(GridKey::new(vec![board_index(&self.board)?, self.adc, self.rf]))
    }

    /// IF-switch output feeding this RF section.
    ///
    /// Fixed wiring convention: output `2 * board_index + rf`. Each board has
    /// two RF chains patched to consecutive switch outputs.
    pub fn switch_output(&self) -> McResult<u32> {
        Ok(2 * board_index(&self.board)? + self.rf)
    }
}

impl fmt::Display for RfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/adc{}/rf{}", self.board, self.adc, self.rf)
    }
}

/// Target of a control action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetPath {
    /// A whole board (firmware selection).
    Board(String),
    /// One RF section (gain, enable, IF-switch selection).
    Rf(RfPath),
    /// One named firmware register on a board.
    Register { board: String, name: String },
}

impl TargetPath {
    pub fn board(&self) -> &str {
        match self {
            TargetPath::Board(board) => board,
            TargetPath::Rf(path) => &path.board,
            TargetPath::Register { board, .. } => board,
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPath::Board(board) => write!(f, "{board}"),
            TargetPath::Rf(path) => write!(f, "{path}"),
            TargetPath::Register { board, name } => write!(f, "{board}:{name}"),
        }
    }
}

/// New value carried by a control action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ControlValue {
    /// RF section gain in dB.
    Gain(f64),
    /// RF section pass/block state.
    Enabled(bool),
    /// IF-switch input number for the section's switch output.
    SwitchInput(u32),
    /// Raw value for a named firmware register.
    Register(i64),
    /// Firmware identifier to load on a board.
    Firmware(String),
}

impl ControlValue {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlValue::Gain(_) => ControlKind::Gain,
            ControlValue::Enabled(_) => ControlKind::Enable,
            ControlValue::SwitchInput(_) => ControlKind::SwitchState,
            ControlValue::Register(_) => ControlKind::Register,
            ControlValue::Firmware(_) => ControlKind::FirmwareSelect,
        }
    }
}

/// Kind discriminant used in notifications and cache patches.
///
/// `Level` never originates from a user action; it labels the measured
/// RF-level update that follows a gain, enable or switch change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Gain,
    Enable,
    SwitchState,
    Register,
    FirmwareSelect,
    Level,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlKind::Gain => "gain",
            ControlKind::Enable => "enable",
            ControlKind::SwitchState => "switch_state",
            ControlKind::Register => "register",
            ControlKind::FirmwareSelect => "firmware_select",
            ControlKind::Level => "level",
        };
        f.write_str(name)
    }
}

/// Static status of one board from the supervisor's roach report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardStatus {
    pub ip: String,
    pub alive: bool,
    pub power: Option<bool>,
    /// Loaded bitfile, `None` when the supervisor reports none.
    pub boffile: Option<String>,
    /// Ordered list of bitfiles this board can load.
    pub available: Vec<String>,
}

/// Ambient and chip temperature of one ADC, in Celsius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdcTemps {
    pub ambient: f64,
    pub chip: f64,
}

/// Sampler-clock synthesizer status for one board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthStatus {
    /// Output frequency in MHz.
    pub frequency: f64,
    /// Output power in dBm.
    pub rf_level: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rf_path_grid_key_normalizes_board_name() {
        let path = RfPath::new("roach2", 1, 0);
        assert_eq!(path.grid_key().unwrap(), GridKey::new(vec![1, 1, 0]));
    }

    #[test]
    fn switch_output_follows_wiring_convention() {
        assert_eq!(RfPath::new("roach1", 0, 0).switch_output().unwrap(), 0);
        assert_eq!(RfPath::new("roach1", 0, 1).switch_output().unwrap(), 1);
        assert_eq!(RfPath::new("roach2", 1, 1).switch_output().unwrap(), 3);
    }

    #[test]
    fn control_value_kind_mapping() {
        assert_eq!(ControlValue::Gain(2.0).kind(), ControlKind::Gain);
        assert_eq!(ControlValue::Register(5).kind(), ControlKind::Register);
        assert_eq!(
            ControlValue::Firmware("kurt_spec".into()).kind(),
            ControlKind::FirmwareSelect
        );
    }

    #[test]
    fn target_path_display() {
        let path = TargetPath::Register {
            board: "roach1".into(),
            name: "sync_in_sel".into(),
        };
        assert_eq!(path.to_string(), "roach1:sync_in_sel");
    }
}
