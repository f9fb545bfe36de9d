//! Panel planning from live cache contents.

use roach_mc::cache::DeviceStateCache;
use roach_mc::keys::GridKey;
use roach_mc::layout::{overview_rows, GridPlan, WidgetSpec};
use roach_mc::proxy::mock::MockSupervisor;
use roach_mc::proxy::RemoteProxy;

fn populated() -> DeviceStateCache {
    let mut supervisor = MockSupervisor::two_boards();
    let mut cache = DeviceStateCache::new();
    cache.bulk_refresh(&mut supervisor);
    cache
}

#[test]
fn overview_panel_gets_five_columns() {
    let cache = populated();
    let plan = GridPlan::build(overview_rows(&cache).unwrap()).unwrap();
    // Four RF columns for roach1 plus one synthesized column for roach2.
    assert_eq!(plan.columns.len(), 5);
    assert_eq!(*plan.columns.last().unwrap(), GridKey::new(vec![1, 0, 0]));
}

#[test]
fn board_rows_span_and_rf_rows_do_not() {
    let cache = populated();
    let plan = GridPlan::build(overview_rows(&cache).unwrap()).unwrap();

    let board_row = plan.rows.iter().find(|r| r.name == "Board").unwrap();
    assert_eq!(board_row.cells.len(), 2);
    assert_eq!(board_row.cells[0].colspan, 4);
    assert_eq!(board_row.cells[1].colspan, 1);
    assert_eq!(board_row.cells[1].column, 4);

    let gain_row = plan.rows.iter().find(|r| r.name == "Gain (dB)").unwrap();
    assert_eq!(gain_row.cells.len(), 4);
    assert!(gain_row.cells.iter().all(|c| c.colspan == 1));
}

#[test]
fn firmware_row_is_a_switch_over_available_builds() {
    let cache = populated();
    let rows = overview_rows(&cache).unwrap();
    let firmware = rows.iter().find(|r| r.name == "Firmware").unwrap();
    match &firmware.widget {
        WidgetSpec::Switch { labels, .. } => {
            assert!(labels.contains(&"kurt_spec".to_string()));
            assert!(labels.contains(&"sao_spec".to_string()));
        }
        other => panic!("firmware row should be a switch, got {other:?}"),
    }
    // roach1 runs the first available build, roach2 runs none.
    let values: Vec<_> = firmware.values.values().collect();
    assert_eq!(values[0], &Some(serde_json::json!(0)));
    assert_eq!(values[1], &Some(serde_json::json!(-1)));
}

#[test]
fn temperature_rows_sit_at_adc_depth() {
    let cache = populated();
    let plan = GridPlan::build(overview_rows(&cache).unwrap()).unwrap();
    let ambient = plan.rows.iter().find(|r| r.name == "Ambient (C)").unwrap();
    // roach1 has two ADCs; each temperature spans that ADC's two RF columns.
    assert_eq!(ambient.cells.len(), 2);
    assert!(ambient.cells.iter().all(|c| c.colspan == 2));
}

#[test]
fn panel_rebuild_after_firmware_load_adds_columns() {
    let mut supervisor = MockSupervisor::two_boards();
    let mut cache = DeviceStateCache::new();
    cache.bulk_refresh(&mut supervisor);
    let before = GridPlan::build(overview_rows(&cache).unwrap()).unwrap();

    supervisor.attach_roach("roach2", "kurt_spec").unwrap();
    cache.bulk_refresh(&mut supervisor);
    let after = GridPlan::build(overview_rows(&cache).unwrap()).unwrap();

    assert_eq!(before.columns.len(), 5);
    assert_eq!(after.columns.len(), 6);
}
