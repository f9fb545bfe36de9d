//! Translation of user-initiated changes into verified remote writes.
//!
//! [`ActionDispatcher`] is the single path from a control event (board, RF
//! section, new value) to the remote device and back: one write RPC, one
//! readback, a cache patch from the readback, and change notifications to
//! registered observers. Gain, enable and switch changes leave the measured
//! RF level stale, so each is followed by a level re-read reported as a
//! second observable effect. A firmware selection invalidates board-wide
//! structure and triggers a wholesale refresh plus a structural-rebuild
//! notification.
//!
//! Remote failures never escape as transport errors: a failed write is
//! reported as `ApplyFailed` with the cache untouched, and a readback that
//! disagrees with the request is reported as `Unconfirmed` with the cache
//! holding the readback (the readback is authoritative).

use log::{debug, error, warn};
use serde_json::{json, Value};

use crate::cache::DeviceStateCache;
use crate::error::{McError, McResult};
use crate::proxy::RemoteProxy;
use crate::registers::RegisterClient;
use crate::state::{ControlKind, ControlValue, RfPath, TargetPath};

/// Result of one `apply_change` call.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// Write confirmed by readback.
    Applied,
    /// Write accepted but the readback differs; the cache holds the
    /// readback value.
    Unconfirmed { requested: Value, actual: Value },
    /// The write RPC failed; the cache is unchanged.
    Failed { reason: String },
}

/// Event delivered to observers after a cache update.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Changed {
        path: TargetPath,
        kind: ControlKind,
        old: Value,
        new: Value,
    },
    Unconfirmed {
        path: TargetPath,
        kind: ControlKind,
        requested: Value,
        actual: Value,
    },
    ApplyFailed {
        path: TargetPath,
        kind: ControlKind,
        reason: String,
    },
    /// Firmware changed: column layout, registers and summaries are all
    /// invalid and the presentation layer must rebuild from scratch.
    StructureChanged { board: String },
}

/// Observer of dispatcher events; registration replaces ad hoc signal
/// wiring with an explicit list owned by the dispatcher.
pub trait ChangeObserver {
    fn notify(&mut self, event: &Notification);
}

/// Owns the device-state cache and the observer list; all control actions
/// and refreshes go through here.
pub struct ActionDispatcher {
    cache: DeviceStateCache,
    observers: Vec<Box<dyn ChangeObserver>>,
}

fn gain_differs(requested: f64, actual: Option<f64>) -> bool {
    match actual {
        Some(actual) => (requested - actual).abs() > 1e-9,
        None => true,
    }
}

impl ActionDispatcher {
    pub fn new(cache: DeviceStateCache) -> Self {
        Self {
            cache,
            observers: Vec::new(),
        }
    }

    pub fn cache(&self) -> &DeviceStateCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DeviceStateCache {
        &mut self.cache
    }

    /// Register an observer for change and rebuild notifications.
    pub fn subscribe(&mut self, observer: Box<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    /// Wholesale cache refresh (per-field fault tolerant).
    pub fn refresh(&mut self, proxy: &mut dyn RemoteProxy) {
        self.cache.bulk_refresh(proxy);
    }

    /// Apply one user-initiated change.
    ///
    /// The path must resolve to an existing cache entry (for firmware
    /// selection, to a known board and an available firmware); violations
    /// fail with an error before any RPC is issued. Remote failures are
    /// absorbed into the returned [`ApplyOutcome`].
    pub fn apply_change(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        path: &TargetPath,
        change: ControlValue,
    ) -> McResult<ApplyOutcome> {
        debug!("apply_change: {} {} -> {change:?}", path, change.kind());
        match (&change, path) {
            (ControlValue::Gain(gain), TargetPath::Rf(rf)) => {
                self.apply_rf(proxy, rf, Some(*gain), None)
            }
            (ControlValue::Enabled(enabled), TargetPath::Rf(rf)) => {
                self.apply_rf(proxy, rf, None, Some(*enabled))
            }
            (ControlValue::SwitchInput(input), TargetPath::Rf(rf)) => {
                self.apply_switch(proxy, rf, *input)
            }
            (ControlValue::Register(value), TargetPath::Register { board, name }) => {
                self.apply_register(proxy, board, name, *value)
            }
            (ControlValue::Firmware(firmware), TargetPath::Board(board)) => {
                self.apply_firmware(proxy, board, firmware)
            }
            (change, path) => Err(McError::Request(format!(
                "cannot apply {} at {path}",
                change.kind()
            ))),
        }
    }

    fn emit(&mut self, event: Notification) {
        debug!("notify: {event:?}");
        for observer in &mut self.observers {
            observer.notify(&event);
        }
    }

    fn fail(
        &mut self,
        path: &TargetPath,
        kind: ControlKind,
        err: &McError,
    ) -> McResult<ApplyOutcome> {
        error!("{kind} change at {path} failed: {err}");
        let reason = err.to_string();
        self.emit(Notification::ApplyFailed {
            path: path.clone(),
            kind,
            reason: reason.clone(),
        });
        Ok(ApplyOutcome::Failed { reason })
    }

    /// Gain or enable change on one RF section: write, readback, cache
    /// patch, then the level re-read.
    fn apply_rf(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        rf: &RfPath,
        gain: Option<f64>,
        enabled: Option<bool>,
    ) -> McResult<ApplyOutcome> {
        let kind = if gain.is_some() {
            ControlKind::Gain
        } else {
            ControlKind::Enable
        };
        let path = TargetPath::Rf(rf.clone());
        let old = self.cache.current_value(&path, kind)?;
        let effective_enabled = match enabled {
            Some(state) => state,
            // A pure gain change retains the section's current state.
            None => self.cache.rf_enabled(rf)?.unwrap_or(true),
        };

        if let Err(err) =
            proxy.set_rf_section(&rf.board, rf.adc, rf.rf, gain, effective_enabled)
        {
            return self.fail(&path, kind, &err);
        }
        let readback = match proxy.get_rf_section(&rf.board, rf.adc, rf.rf) {
            Ok(readback) => readback,
            Err(err) => return self.fail(&path, kind, &err),
        };

        let (requested, actual, confirmed) = match kind {
            ControlKind::Gain => {
                let requested = gain.unwrap_or_default();
                (
                    json!(requested),
                    json!(readback.gain),
                    !gain_differs(requested, readback.gain),
                )
            }
            _ => {
                let requested = enabled.unwrap_or_default();
                (
                    json!(requested),
                    json!(readback.enabled),
                    readback.enabled == Some(requested),
                )
            }
        };
        self.cache.apply_write_result(&path, kind, &actual)?;

        let outcome = if confirmed {
            self.emit(Notification::Changed {
                path: path.clone(),
                kind,
                old,
                new: actual,
            });
            ApplyOutcome::Applied
        } else {
            warn!("{kind} at {path} unconfirmed: requested {requested}, read back {actual}");
            self.emit(Notification::Unconfirmed {
                path: path.clone(),
                kind,
                requested: requested.clone(),
                actual: actual.clone(),
            });
            ApplyOutcome::Unconfirmed { requested, actual }
        };

        self.reread_levels(proxy, rf);
        Ok(outcome)
    }

    /// IF-switch selection for the output feeding one RF section. The
    /// write's return value is the confirmed state.
    fn apply_switch(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        rf: &RfPath,
        input: u32,
    ) -> McResult<ApplyOutcome> {
        let kind = ControlKind::SwitchState;
        let path = TargetPath::Rf(rf.clone());
        let old = self.cache.current_value(&path, kind)?;
        let output = rf.switch_output()?;
        if output as usize >= self.cache.switch_states().len() {
            return Err(McError::KeyNotFound(format!("IF switch output {output}")));
        }

        let confirmed = match proxy.set_switch_state(output, input) {
            Ok(confirmed) => confirmed,
            Err(err) => return self.fail(&path, kind, &err),
        };
        self.cache
            .apply_write_result(&path, kind, &json!(confirmed))?;

        let outcome = if confirmed == input {
            self.emit(Notification::Changed {
                path: path.clone(),
                kind,
                old,
                new: json!(confirmed),
            });
            ApplyOutcome::Applied
        } else {
            warn!("switch output {output} unconfirmed: requested {input}, now {confirmed}");
            self.emit(Notification::Unconfirmed {
                path: path.clone(),
                kind,
                requested: json!(input),
                actual: json!(confirmed),
            });
            ApplyOutcome::Unconfirmed {
                requested: json!(input),
                actual: json!(confirmed),
            }
        };

        self.reread_levels(proxy, rf);
        Ok(outcome)
    }

    /// Register write through the register client (write, readback, cache
    /// patch from readback).
    fn apply_register(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        board: &str,
        name: &str,
        value: i64,
    ) -> McResult<ApplyOutcome> {
        let kind = ControlKind::Register;
        let path = TargetPath::Register {
            board: board.to_string(),
            name: name.to_string(),
        };
        let old = json!(self.cache.register(board, name)?);

        let client = RegisterClient::new(board);
        let readback = match client.write_and_verify(proxy, &mut self.cache, name, value) {
            Ok(readback) => readback,
            Err(err) if err.is_remote_failure() => return self.fail(&path, kind, &err),
            Err(err) => return Err(err),
        };

        if readback == value {
            self.emit(Notification::Changed {
                path,
                kind,
                old,
                new: json!(readback),
            });
            Ok(ApplyOutcome::Applied)
        } else {
            warn!("register {board}:{name} unconfirmed: wrote {value}, read back {readback}");
            self.emit(Notification::Unconfirmed {
                path,
                kind,
                requested: json!(value),
                actual: json!(readback),
            });
            Ok(ApplyOutcome::Unconfirmed {
                requested: json!(value),
                actual: json!(readback),
            })
        }
    }

    /// Firmware selection: load, wholesale refresh, structural rebuild.
    fn apply_firmware(
        &mut self,
        proxy: &mut dyn RemoteProxy,
        board: &str,
        firmware: &str,
    ) -> McResult<ApplyOutcome> {
        let kind = ControlKind::FirmwareSelect;
        let path = TargetPath::Board(board.to_string());
        let status = self.cache.board(board)?;
        if !status.available.iter().any(|a| a == firmware) {
            return Err(McError::Request(format!(
                "firmware '{firmware}' is not available on {board}"
            )));
        }
        let old = self.cache.current_value(&path, kind)?;

        let bitfile = match proxy.attach_roach(board, firmware) {
            Ok(bitfile) => bitfile,
            Err(err) => return self.fail(&path, kind, &err),
        };
        debug!("{board} loaded bitfile {bitfile}");

        // Board-wide structure changed: registers, summaries and the column
        // layout are all stale.
        self.cache.bulk_refresh(proxy);
        let actual = self
            .cache
            .current_value(&path, kind)
            .unwrap_or(Value::Null);

        let outcome = if actual == json!(firmware) {
            self.emit(Notification::Changed {
                path: path.clone(),
                kind,
                old,
                new: actual,
            });
            ApplyOutcome::Applied
        } else {
            warn!("firmware on {board} unconfirmed: requested {firmware}, running {actual}");
            self.emit(Notification::Unconfirmed {
                path: path.clone(),
                kind,
                requested: json!(firmware),
                actual: actual.clone(),
            });
            ApplyOutcome::Unconfirmed {
                requested: json!(firmware),
                actual,
            }
        };

        self.emit(Notification::StructureChanged {
            board: board.to_string(),
        });
        Ok(outcome)
    }

    /// Second observable effect of a gain/enable/switch change: the RF
    /// level is stale and must be re-queried before being reported.
    fn reread_levels(&mut self, proxy: &mut dyn RemoteProxy, rf: &RfPath) {
        let path = TargetPath::Rf(rf.clone());
        let old = match self.cache.adc_level(rf) {
            Ok(level) => json!(level),
            Err(_) => Value::Null,
        };
        if let Err(err) = self.cache.refresh_adc_levels(proxy) {
            warn!("level re-read after change at {path} failed: {err}");
            return;
        }
        let new = match self.cache.adc_level(rf) {
            Ok(level) => json!(level),
            Err(_) => Value::Null,
        };
        self.emit(Notification::Changed {
            path,
            kind: ControlKind::Level,
            old,
            new,
        });
    }
}
