//! Top-level client: connection bootstrap, periodic refresh, data fetch.
//!
//! [`McClient`] owns the proxy, the dispatcher (which owns the cache) and
//! the refresh timer. Bootstrap pings the supervisor and populates the
//! board inventory; either failing is fatal, matching the rule that an
//! unreachable endpoint aborts startup while a mid-session per-field
//! failure only logs. Everything after bootstrap runs on one thread with
//! blocking calls.

use log::{debug, warn};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::cache::DeviceStateCache;
use crate::config::Settings;
use crate::dispatch::{ActionDispatcher, ApplyOutcome, ChangeObserver};
use crate::error::{McError, McResult};
use crate::keys::board_index;
use crate::kurtosis::KurtosisClient;
use crate::proxy::tcp::TcpProxy;
use crate::proxy::RemoteProxy;
use crate::refresh::RefreshTimer;
use crate::state::{ControlValue, TargetPath};

/// Monitor-and-control client for one supervisor.
pub struct McClient {
    proxy: Box<dyn RemoteProxy>,
    dispatcher: ActionDispatcher,
    timer: RefreshTimer,
}

impl McClient {
    /// Connect to the configured supervisor endpoint.
    pub fn connect(settings: &Settings) -> McResult<Self> {
        let proxy = TcpProxy::connect(
            &settings.supervisor_host,
            settings.supervisor_port,
            &settings.object_id,
            settings.call_timeout,
        )?;
        Self::start(Box::new(proxy), settings.refresh_interval)
    }

    /// Bootstrap over an already-built proxy (tests, demo mode).
    pub fn start(mut proxy: Box<dyn RemoteProxy>, interval: Duration) -> McResult<Self> {
        proxy
            .ping()
            .map_err(|err| McError::Communication(format!("{err}; is the supervisor running?")))?;
        let mut cache = DeviceStateCache::new();
        // Board enumeration is the one refresh that must succeed: without
        // it there is nothing to monitor.
        cache.refresh_boards(proxy.as_mut())?;
        cache.bulk_refresh(proxy.as_mut());
        debug!("client started with boards {:?}", cache.board_keys());
        Ok(Self {
            proxy,
            dispatcher: ActionDispatcher::new(cache),
            timer: RefreshTimer::new(interval),
        })
    }

    pub fn cache(&self) -> &DeviceStateCache {
        self.dispatcher.cache()
    }

    /// Register an observer for change and rebuild notifications.
    pub fn subscribe(&mut self, observer: Box<dyn ChangeObserver>) {
        self.dispatcher.subscribe(observer);
    }

    /// Split borrow for callers that drive the dispatcher directly (the
    /// kurtosis operations take dispatcher and proxy separately).
    pub fn parts_mut(&mut self) -> (&mut ActionDispatcher, &mut dyn RemoteProxy) {
        (&mut self.dispatcher, self.proxy.as_mut())
    }

    /// Wholesale refresh of the mirrored state.
    pub fn refresh(&mut self) {
        self.dispatcher.refresh(self.proxy.as_mut());
    }

    /// Timer-driven refresh: runs one refresh when due, drops stale ticks.
    /// Returns true when a refresh ran.
    pub fn tick(&mut self) -> bool {
        if !self.timer.try_begin(Instant::now()) {
            return false;
        }
        self.refresh();
        self.timer.complete(Instant::now());
        true
    }

    pub fn refresh_interval(&self) -> Duration {
        self.timer.interval()
    }

    /// Apply one user-initiated change (see [`ActionDispatcher`]).
    pub fn apply_change(
        &mut self,
        path: &TargetPath,
        change: ControlValue,
    ) -> McResult<ApplyOutcome> {
        self.dispatcher
            .apply_change(self.proxy.as_mut(), path, change)
    }

    /// Kurtosis-firmware control for a board running it.
    pub fn kurtosis(&self, board: &str) -> McResult<KurtosisClient> {
        KurtosisClient::attach(self.cache(), board)
    }

    /// Raw ADC samples for one RF input; a failed fetch logs and yields
    /// nothing rather than aborting the caller's loop.
    pub fn adc_samples(&mut self, board: &str, adc: u32, rf: u32) -> Option<Vec<f64>> {
        match self.proxy.get_adc_samples(board, adc, rf) {
            Ok(samples) => Some(samples),
            Err(err) => {
                warn!("no ADC samples for {board}/{adc}/{rf}: {err}");
                None
            }
        }
    }

    /// Accumulated spectra for one RF input, keyed by accumulator.
    pub fn accumulations(&mut self, board: &str, adc: u32, rf: u32) -> Option<Value> {
        let index = match board_index(board) {
            Ok(index) => index,
            Err(err) => {
                warn!("cannot fetch spectra: {err}");
                return None;
            }
        };
        match self.proxy.get_accumulations(index, adc, rf) {
            Ok(accums) => Some(accums),
            Err(err) => {
                warn!("no spectra for {board}/{adc}/{rf}: {err}");
                None
            }
        }
    }

    /// Sorted register names for one board's firmware.
    pub fn list_registers(&mut self, board: &str) -> McResult<Vec<String>> {
        let index = board_index(board)?;
        self.proxy.list_registers(&[index])
    }

    /// Fetch and cache the register details of one board's firmware.
    pub fn register_details(&mut self, board: &str) -> McResult<Value> {
        self.dispatcher
            .cache_mut()
            .fetch_register_details(self.proxy.as_mut(), board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mock::MockSupervisor;

    #[test]
    fn bootstrap_fails_fast_when_unreachable() {
        let mut supervisor = MockSupervisor::two_boards();
        supervisor.fail_methods.insert("ping".into());
        let err = McClient::start(Box::new(supervisor), Duration::from_secs(10));
        assert!(matches!(err, Err(McError::Communication(_))));
    }

    #[test]
    fn bootstrap_fails_without_board_inventory() {
        let mut supervisor = MockSupervisor::two_boards();
        supervisor.fail_methods.insert("roach_report".into());
        assert!(McClient::start(Box::new(supervisor), Duration::from_secs(10)).is_err());
    }

    #[test]
    fn started_client_mirrors_the_deployment() {
        let supervisor = MockSupervisor::two_boards();
        let client = McClient::start(Box::new(supervisor), Duration::from_secs(10)).unwrap();
        assert_eq!(client.cache().board_keys(), ["roach1", "roach2"]);
        assert_eq!(client.cache().firmware("roach1").unwrap(), Some("kurt_spec"));
    }

    #[test]
    fn tick_runs_at_most_one_refresh_per_interval() {
        let supervisor = MockSupervisor::two_boards();
        let mut client = McClient::start(Box::new(supervisor), Duration::from_secs(3600)).unwrap();
        assert!(client.tick());
        assert!(!client.tick());
    }

    #[test]
    fn sample_fetch_absorbs_remote_failure() {
        let mut supervisor = MockSupervisor::two_boards();
        supervisor.fail_methods.insert("get_adc_samples".into());
        let mut client = McClient::start(Box::new(supervisor), Duration::from_secs(10)).unwrap();
        assert!(client.adc_samples("roach1", 0, 0).is_none());
    }
}
