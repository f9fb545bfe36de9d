//! End-to-end dispatch flows against the simulated supervisor: RPC
//! ordering, readback authority and failure atomicity.

use roach_mc::cache::DeviceStateCache;
use roach_mc::dispatch::{ActionDispatcher, ApplyOutcome, ChangeObserver, Notification};
use roach_mc::proxy::mock::MockSupervisor;
use roach_mc::proxy::RemoteProxy;
use roach_mc::state::{ControlKind, ControlValue, RfPath, TargetPath};
use std::cell::RefCell;
use std::rc::Rc;

struct Recorder(Rc<RefCell<Vec<Notification>>>);

impl ChangeObserver for Recorder {
    fn notify(&mut self, event: &Notification) {
        self.0.borrow_mut().push(event.clone());
    }
}

fn harness() -> (
    ActionDispatcher,
    MockSupervisor,
    Rc<RefCell<Vec<Notification>>>,
) {
    let mut supervisor = MockSupervisor::two_boards();
    let mut cache = DeviceStateCache::new();
    cache.bulk_refresh(&mut supervisor);
    supervisor.calls.clear();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut dispatcher = ActionDispatcher::new(cache);
    dispatcher.subscribe(Box::new(Recorder(events.clone())));
    (dispatcher, supervisor, events)
}

#[test]
fn gain_change_issues_write_readback_level_reread_in_order() {
    let (mut dispatcher, mut supervisor, _) = harness();
    dispatcher
        .apply_change(
            &mut supervisor,
            &TargetPath::Rf(RfPath::new("roach1", 1, 0)),
            ControlValue::Gain(4.0),
        )
        .unwrap();
    let methods: Vec<&str> = supervisor
        .calls
        .iter()
        .map(|c| c.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(
        methods,
        vec!["set_rf_section", "get_rf_section", "get_adc_levels"]
    );
}

#[test]
fn enable_change_has_the_same_shape_as_gain() {
    let (mut dispatcher, mut supervisor, events) = harness();
    dispatcher
        .apply_change(
            &mut supervisor,
            &TargetPath::Rf(RfPath::new("roach1", 0, 0)),
            ControlValue::Enabled(false),
        )
        .unwrap();
    assert_eq!(supervisor.calls_to("set_rf_section").len(), 1);
    assert_eq!(supervisor.calls_to("get_rf_section").len(), 1);
    assert_eq!(supervisor.calls_to("get_adc_levels").len(), 1);
    // The level update is a second observable effect, not folded into the
    // state-change notification.
    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        Notification::Changed { kind: ControlKind::Enable, .. }
    ));
    assert!(matches!(
        events[1],
        Notification::Changed { kind: ControlKind::Level, .. }
    ));
}

#[test]
fn failed_write_is_atomic_and_reported() {
    let (mut dispatcher, mut supervisor, events) = harness();
    supervisor.fail_methods.insert("set_rf_section".into());
    let before = dispatcher.cache().clone();
    let outcome = dispatcher
        .apply_change(
            &mut supervisor,
            &TargetPath::Rf(RfPath::new("roach1", 0, 0)),
            ControlValue::Gain(9.5),
        )
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
    assert_eq!(dispatcher.cache(), &before);
    assert_eq!(events.borrow().len(), 1);
    assert!(matches!(
        events.borrow()[0],
        Notification::ApplyFailed { .. }
    ));
}

#[test]
fn register_mask_scenario_reports_unconfirmed_and_caches_readback() {
    // Writing 5 to sync_in_sel on a board whose firmware masks bit 0:
    // the device stores 4, the cache must follow the device.
    let (mut dispatcher, mut supervisor, events) = harness();
    supervisor.register_masks.insert("sync_in_sel".into(), !1);
    let path = TargetPath::Register {
        board: "roach1".into(),
        name: "sync_in_sel".into(),
    };
    let outcome = dispatcher
        .apply_change(&mut supervisor, &path, ControlValue::Register(5))
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Unconfirmed {
            requested: serde_json::json!(5),
            actual: serde_json::json!(4),
        }
    );
    assert_eq!(
        dispatcher.cache().register("roach1", "sync_in_sel").unwrap(),
        4
    );
    assert!(matches!(
        events.borrow()[0],
        Notification::Unconfirmed { kind: ControlKind::Register, .. }
    ));
}

#[test]
fn register_write_to_unpopulated_path_is_rejected() {
    let (mut dispatcher, mut supervisor, _) = harness();
    let path = TargetPath::Register {
        board: "roach1".into(),
        name: "no_such_register".into(),
    };
    assert!(dispatcher
        .apply_change(&mut supervisor, &path, ControlValue::Register(1))
        .is_err());
    assert!(supervisor.calls.is_empty());
}

#[test]
fn firmware_select_rebuilds_the_world() {
    let (mut dispatcher, mut supervisor, events) = harness();
    let before_keys = dispatcher.cache().rf_grid_keys().unwrap().len();
    dispatcher
        .apply_change(
            &mut supervisor,
            &TargetPath::Board("roach2".into()),
            ControlValue::Firmware("kurt_spec".into()),
        )
        .unwrap();
    assert_eq!(supervisor.calls_to("attach_roach").len(), 1);
    // Wholesale refresh followed the load.
    assert!(supervisor.calls_to("roach_report").len() >= 1);
    assert!(dispatcher.cache().rf_grid_keys().unwrap().len() > before_keys);
    let events = events.borrow();
    let last = events.last().unwrap();
    assert!(matches!(
        last,
        Notification::StructureChanged { board } if board == "roach2"
    ));
}

#[test]
fn switch_unconfirmed_when_device_reports_other_input() {
    struct PinnedSwitch(MockSupervisor);
    // A supervisor whose switch ignores the request and stays on input 2.
    impl RemoteProxy for PinnedSwitch {
        fn ping(&mut self) -> roach_mc::McResult<()> {
            self.0.ping()
        }
        fn request(&mut self, e: &str) -> roach_mc::McResult<serde_json::Value> {
            self.0.request(e)
        }
        fn roach_report(&mut self) -> roach_mc::McResult<roach_mc::proxy::RoachReport> {
            self.0.roach_report()
        }
        fn get_gains(&mut self, b: &str) -> roach_mc::McResult<serde_json::Value> {
            self.0.get_gains(b)
        }
        fn set_rf_section(
            &mut self,
            b: &str,
            a: u32,
            r: u32,
            g: Option<f64>,
            e: bool,
        ) -> roach_mc::McResult<()> {
            self.0.set_rf_section(b, a, r, g, e)
        }
        fn get_rf_section(
            &mut self,
            b: &str,
            a: u32,
            r: u32,
        ) -> roach_mc::McResult<roach_mc::proxy::RfReadback> {
            self.0.get_rf_section(b, a, r)
        }
        fn get_adc_levels(&mut self) -> roach_mc::McResult<serde_json::Value> {
            self.0.get_adc_levels()
        }
        fn get_temperatures(&mut self) -> roach_mc::McResult<serde_json::Value> {
            self.0.get_temperatures()
        }
        fn get_switch_states(&mut self) -> roach_mc::McResult<Vec<u32>> {
            self.0.get_switch_states()
        }
        fn set_switch_state(&mut self, output: u32, _input: u32) -> roach_mc::McResult<u32> {
            self.0.set_switch_state(output, 2)
        }
        fn check_fans(
            &mut self,
        ) -> roach_mc::McResult<std::collections::BTreeMap<String, f64>> {
            self.0.check_fans()
        }
        fn get_mms_analog(
            &mut self,
        ) -> roach_mc::McResult<(
            std::collections::BTreeMap<String, f64>,
            std::collections::BTreeMap<String, f64>,
        )> {
            self.0.get_mms_analog()
        }
        fn get_register_values(
            &mut self,
            b: &str,
        ) -> roach_mc::McResult<std::collections::BTreeMap<String, i64>> {
            self.0.get_register_values(b)
        }
        fn get_firmware_summary(&mut self, f: &str) -> roach_mc::McResult<serde_json::Value> {
            self.0.get_firmware_summary(f)
        }
        fn attach_roach(&mut self, b: &str, f: &str) -> roach_mc::McResult<String> {
            self.0.attach_roach(b, f)
        }
        fn fpga_read_int(&mut self, b: &str, r: &str) -> roach_mc::McResult<i64> {
            self.0.fpga_read_int(b, r)
        }
        fn fpga_write_int(&mut self, b: &str, r: &str, v: i64) -> roach_mc::McResult<()> {
            self.0.fpga_write_int(b, r, v)
        }
        fn get_adc_samples(&mut self, b: &str, a: u32, r: u32) -> roach_mc::McResult<Vec<f64>> {
            self.0.get_adc_samples(b, a, r)
        }
        fn get_accumulations(
            &mut self,
            b: u32,
            a: u32,
            r: u32,
        ) -> roach_mc::McResult<serde_json::Value> {
            self.0.get_accumulations(b, a, r)
        }
        fn list_registers(&mut self, b: &[u32]) -> roach_mc::McResult<Vec<String>> {
            self.0.list_registers(b)
        }
    }

    let mut pinned = PinnedSwitch(MockSupervisor::two_boards());
    let mut cache = DeviceStateCache::new();
    cache.bulk_refresh(&mut pinned);
    let mut dispatcher = ActionDispatcher::new(cache);
    let rf = RfPath::new("roach1", 0, 0);
    let outcome = dispatcher
        .apply_change(
            &mut pinned,
            &TargetPath::Rf(rf.clone()),
            ControlValue::SwitchInput(7),
        )
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Unconfirmed {
            requested: serde_json::json!(7),
            actual: serde_json::json!(2),
        }
    );
    // Cache follows the device, not the request.
    assert_eq!(dispatcher.cache().adc_source(&rf).unwrap(), Some(2));
}
