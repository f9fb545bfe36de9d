//! Presentation-neutral panel layout.
//!
//! A panel is described as an ordered list of rows, each a [`WidgetSpec`]
//! plus values keyed by [`GridKey`]. [`GridPlan::build`] runs column
//! inference once over all rows of the panel and places every widget:
//! a widget keyed shallower than the grid's deepest keys spans all the
//! columns sharing its key as a prefix (a board-level label spans the
//! board's whole block of RF columns). The plan carries no rendering
//! state; the presentation layer walks it to build whatever widget tree
//! it likes, and rebuilds it from scratch on a structural change.

use log::warn;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::cache::DeviceStateCache;
use crate::error::McResult;
use crate::keys::{canonical_keys, GridKey};

/// Kind of widget a row is made of.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetSpec {
    /// Text or formatted values.
    Label { format: Option<String> },
    /// On/off selection.
    Check,
    /// Action trigger.
    Push,
    /// Value within a range.
    Dial {
        min: f64,
        max: f64,
        format: String,
    },
    /// One-of-N selection backed by a pop-up; `labels` name the inputs.
    Switch {
        labels: Vec<String>,
        label_template: Option<String>,
    },
    /// Large-range value with fine control.
    SpinSlider { limits: Option<(i64, i64)> },
    /// Stepped value selection: (min, max, step).
    SpinBox { steps: Option<(i64, i64, i64)> },
    /// Panel-specific widget resolved by the presentation layer.
    Custom { variant: String },
}

/// One row of a panel description: widget kind plus per-key values.
/// A `None` value marks a present-but-disabled widget.
#[derive(Clone, Debug, PartialEq)]
pub struct RowSpec {
    pub name: String,
    pub widget: WidgetSpec,
    pub values: BTreeMap<GridKey, Option<Value>>,
}

/// A placed widget: grid column, number of columns spanned, and value.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCell {
    pub key: GridKey,
    pub column: usize,
    pub colspan: usize,
    pub value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedRow {
    pub name: String,
    pub widget: WidgetSpec,
    pub cells: Vec<PlannedCell>,
}

/// A fully laid-out panel: canonical column keys and placed rows.
#[derive(Clone, Debug, PartialEq)]
pub struct GridPlan {
    pub columns: Vec<GridKey>,
    pub rows: Vec<PlannedRow>,
}

impl GridPlan {
    /// Lay out `rows` on one shared column grid.
    ///
    /// Column inference runs once over the union of all rows' keys; a key
    /// set the inference cannot reconcile fails the whole panel (and only
    /// this panel). An empty panel yields no columns and no cells.
    pub fn build(rows: Vec<RowSpec>) -> McResult<GridPlan> {
        let sets: Vec<Vec<GridKey>> = rows
            .iter()
            .map(|row| row.values.keys().cloned().collect())
            .collect();
        let columns = canonical_keys(&sets)?;
        let rows = rows
            .into_iter()
            .map(|row| plan_row(&columns, row))
            .collect();
        Ok(GridPlan { columns, rows })
    }
}

fn plan_row(columns: &[GridKey], row: RowSpec) -> PlannedRow {
    let mut cells = Vec::with_capacity(row.values.len());
    for (key, value) in row.values {
        let colspan = columns.iter().filter(|c| key.is_prefix_of(c)).count();
        let column = columns.iter().position(|c| key.is_prefix_of(c));
        match (column, colspan) {
            (Some(column), colspan) if colspan > 0 => {
                cells.push(PlannedCell {
                    key,
                    column,
                    colspan,
                    value,
                });
            }
            _ => warn!("row '{}' key {key} matches no column, dropped", row.name),
        }
    }
    PlannedRow {
        name: row.name,
        widget: row.widget,
        cells,
    }
}

fn keyed<I, F>(iter: I, mut value: F) -> BTreeMap<GridKey, Option<Value>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> (McResult<GridKey>, Option<Value>),
{
    let mut map = BTreeMap::new();
    for item in iter {
        let (key, v) = value(item);
        match key {
            Ok(key) => {
                map.insert(key, v);
            }
            Err(err) => warn!("skipping unkeyable layout entry: {err}"),
        }
    }
    map
}

/// RF section gain limits in dB.
const GAIN_RANGE: (f64, f64) = (-11.5, 20.0);

/// The main overview panel, derived from the current cache contents.
///
/// Row set and order follow the control-room layout: board identity and
/// firmware selection first, then the signal chain (IF selection, RF
/// state, gain, measured level), then environment and synthesizers.
pub fn overview_rows(cache: &DeviceStateCache) -> McResult<Vec<RowSpec>> {
    use crate::keys::board_index;

    let board_values = keyed(cache.board_keys(), |board| {
        (
            board_index(board).map(GridKey::board),
            Some(json!(board)),
        )
    });
    let firmware_values = keyed(cache.board_keys(), |board| {
        (
            board_index(board).map(GridKey::board),
            cache.firmware_index(board).ok().map(|i| json!(i)),
        )
    });
    let bitfile_values = keyed(cache.board_keys(), |board| {
        let bof = cache
            .board(board)
            .ok()
            .and_then(|status| status.boffile.clone());
        (
            board_index(board).map(GridKey::board),
            bof.map(|b| json!(b)),
        )
    });
    let source_values = keyed(cache.rf_paths(), |path| {
        (
            path.grid_key(),
            cache.adc_source(path).ok().flatten().map(|s| json!(s)),
        )
    });
    let rf_on_values = keyed(cache.rf_paths(), |path| {
        (
            path.grid_key(),
            cache.rf_enabled(path).ok().flatten().map(|on| json!(on)),
        )
    });
    let gain_values = keyed(cache.rf_paths(), |path| {
        (
            path.grid_key(),
            cache.gain(path).ok().flatten().map(|g| json!(g)),
        )
    });
    let level_values = keyed(cache.rf_paths(), |path| {
        (
            path.grid_key(),
            cache.adc_level(path).ok().flatten().map(|l| json!(l)),
        )
    });
    let ambient_values = keyed(cache.temperatures(), |((board, adc), temps)| {
        (
            board_index(board).map(|b| GridKey::new(vec![b, *adc])),
            Some(json!(temps.ambient)),
        )
    });
    let chip_values = keyed(cache.temperatures(), |((board, adc), temps)| {
        (
            board_index(board).map(|b| GridKey::new(vec![b, *adc])),
            Some(json!(temps.chip)),
        )
    });
    let synth_freq_values = keyed(cache.board_keys(), |board| {
        (
            board_index(board).map(GridKey::board),
            cache.synth_status(board).ok().map(|s| json!(s.frequency)),
        )
    });
    let synth_pwr_values = keyed(cache.board_keys(), |board| {
        (
            board_index(board).map(GridKey::board),
            cache.synth_status(board).ok().map(|s| json!(s.rf_level)),
        )
    });

    Ok(vec![
        RowSpec {
            name: "Board".into(),
            widget: WidgetSpec::Label { format: None },
            values: board_values,
        },
        RowSpec {
            name: "Firmware".into(),
            widget: WidgetSpec::Switch {
                labels: cache.firmware_keys(),
                label_template: None,
            },
            values: firmware_values,
        },
        RowSpec {
            name: "Bit file".into(),
            widget: WidgetSpec::Label { format: None },
            values: bitfile_values,
        },
        RowSpec {
            name: "IF".into(),
            widget: WidgetSpec::Switch {
                labels: cache.input_labels().to_vec(),
                label_template: Some("Input ".into()),
            },
            values: source_values,
        },
        RowSpec {
            name: "RF on".into(),
            widget: WidgetSpec::Check,
            values: rf_on_values,
        },
        RowSpec {
            name: "Gain (dB)".into(),
            widget: WidgetSpec::Dial {
                min: GAIN_RANGE.0,
                max: GAIN_RANGE.1,
                format: "%6.1f".into(),
            },
            values: gain_values,
        },
        RowSpec {
            name: "RF level (dBm)".into(),
            widget: WidgetSpec::Label {
                format: Some("%5.2f".into()),
            },
            values: level_values,
        },
        RowSpec {
            name: "Ambient (C)".into(),
            widget: WidgetSpec::Label {
                format: Some("%4.1f".into()),
            },
            values: ambient_values,
        },
        RowSpec {
            name: "Chip (C)".into(),
            widget: WidgetSpec::Label {
                format: Some("%4.1f".into()),
            },
            values: chip_values,
        },
        RowSpec {
            name: "Synth (MHz)".into(),
            widget: WidgetSpec::SpinSlider {
                limits: Some((100, 2000)),
            },
            values: synth_freq_values,
        },
        RowSpec {
            name: "Synth (dBm)".into(),
            widget: WidgetSpec::SpinBox {
                steps: Some((-20, 10, 1)),
            },
            values: synth_pwr_values,
        },
    ])
}
