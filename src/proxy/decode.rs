//! Decoding of nested, string-keyed remote payloads into typed maps.
//!
//! The supervisor serializes its nested dictionaries with string keys even
//! where the semantics are integer indices. These helpers re-key them and
//! attach board names, failing with `Payload` on any shape mismatch instead
//! of silently dropping entries.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{McError, McResult};
use crate::state::{AdcTemps, RfPath};

fn object<'v>(value: &'v Value, what: &str) -> McResult<&'v serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| McError::Payload(format!("expected object for {what}, got {value}")))
}

/// Parse a string map key that carries an integer index.
pub fn index_key(raw: &str) -> McResult<u32> {
    raw.parse()
        .map_err(|_| McError::Payload(format!("non-integer index key '{raw}'")))
}

fn opt_f64(value: &Value, what: &str) -> McResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        other => other
            .as_f64()
            .map(Some)
            .ok_or_else(|| McError::Payload(format!("expected number for {what}, got {other}"))),
    }
}

fn opt_bool(value: &Value, what: &str) -> McResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        other => other
            .as_bool()
            .map(Some)
            .ok_or_else(|| McError::Payload(format!("expected bool for {what}, got {other}"))),
    }
}

/// Decode one board's `get_gains` payload into per-path (gain, enabled).
pub fn rf_sections(
    board: &str,
    value: &Value,
) -> McResult<Vec<(RfPath, Option<f64>, Option<bool>)>> {
    let mut sections = Vec::new();
    for (adc_key, rf_map) in object(value, "gain map")? {
        let adc = index_key(adc_key)?;
        for (rf_key, section) in object(rf_map, "RF map")? {
            let rf = index_key(rf_key)?;
            let section = object(section, "RF section")?;
            let gain = section
                .get("gain")
                .map(|v| opt_f64(v, "gain"))
                .transpose()?
                .flatten();
            let enabled = section
                .get("enabled")
                .map(|v| opt_bool(v, "enabled"))
                .transpose()?
                .flatten();
            sections.push((RfPath::new(board, adc, rf), gain, enabled));
        }
    }
    Ok(sections)
}

/// Decode the `get_adc_levels` payload, which is keyed by board index.
pub fn adc_levels(
    value: &Value,
    board_keys: &[String],
) -> McResult<BTreeMap<RfPath, Option<f64>>> {
    let mut levels = BTreeMap::new();
    for (board_key, adc_map) in object(value, "level map")? {
        let index = index_key(board_key)? as usize;
        let board = board_keys.get(index).ok_or_else(|| {
            McError::Payload(format!("level map names unknown board index {index}"))
        })?;
        for (adc_key, rf_map) in object(adc_map, "level ADC map")? {
            let adc = index_key(adc_key)?;
            for (rf_key, level) in object(rf_map, "level RF map")? {
                let rf = index_key(rf_key)?;
                levels.insert(
                    RfPath::new(board.clone(), adc, rf),
                    opt_f64(level, "RF level")?,
                );
            }
        }
    }
    Ok(levels)
}

/// Decode the `get_temperatures` payload into per-(board, ADC) readings.
pub fn temperatures(value: &Value) -> McResult<BTreeMap<(String, u32), AdcTemps>> {
    let mut temps = BTreeMap::new();
    for (board, adc_map) in object(value, "temperature map")? {
        for (adc_key, reading) in object(adc_map, "temperature ADC map")? {
            let adc = index_key(adc_key)?;
            let reading = object(reading, "temperature reading")?;
            let ambient = reading
                .get("ambient")
                .and_then(Value::as_f64)
                .ok_or_else(|| McError::Payload("temperature reading lacks 'ambient'".into()))?;
            let chip = reading
                .get("IC")
                .and_then(Value::as_f64)
                .ok_or_else(|| McError::Payload("temperature reading lacks 'IC'".into()))?;
            temps.insert((board.clone(), adc), AdcTemps { ambient, chip });
        }
    }
    Ok(temps)
}

/// Decode a flat labelled map of numbers (fans, monitor voltages).
pub fn f64_map(value: &Value) -> McResult<BTreeMap<String, f64>> {
    let mut map = BTreeMap::new();
    for (label, v) in object(value, "labelled number map")? {
        let number = v
            .as_f64()
            .ok_or_else(|| McError::Payload(format!("non-numeric value for '{label}'")))?;
        map.insert(label.clone(), number);
    }
    Ok(map)
}
