//! Named-register access for one board's firmware.
//!
//! Raw `fpga_read_int`/`fpga_write_int` RPCs with readback verification.
//! [`RegisterClient::write_and_verify`] is the sole mutation path for
//! firmware-specific control: every typed operation (sync select,
//! accumulation length, counter resets, ...) is this one call parameterized
//! by register name. Writes to related registers are independent round
//! trips; there is no multi-register transaction.

use log::debug;
use serde_json::json;

use crate::cache::DeviceStateCache;
use crate::error::McResult;
use crate::proxy::RemoteProxy;
use crate::state::{ControlKind, TargetPath};

/// Register access scoped to one board.
#[derive(Clone, Debug)]
pub struct RegisterClient {
    board: String,
}

impl RegisterClient {
    pub fn new(board: impl Into<String>) -> Self {
        Self {
            board: board.into(),
        }
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    /// Read one register.
    pub fn read(&self, proxy: &mut dyn RemoteProxy, name: &str) -> McResult<i64> {
        proxy.fpga_read_int(&self.board, name)
    }

    /// Write `value`, read it back, and patch the shared register cache
    /// from the readback. Returns the confirmed value, which may differ
    /// from the request when the firmware masks or clamps the register.
    pub fn write_and_verify(
        &self,
        proxy: &mut dyn RemoteProxy,
        cache: &mut DeviceStateCache,
        name: &str,
        value: i64,
    ) -> McResult<i64> {
        debug!("writing {value} to {} {name}", self.board);
        proxy.fpga_write_int(&self.board, name, value)?;
        let readback = proxy.fpga_read_int(&self.board, name)?;
        cache.apply_write_result(
            &TargetPath::Register {
                board: self.board.clone(),
                name: name.to_string(),
            },
            ControlKind::Register,
            &json!(readback),
        )?;
        debug!("{} {name} confirmed as {readback}", self.board);
        Ok(readback)
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
    fn write_and_verify_returns_and_caches_readback() {
        let (mut cache, mut supervisor) = populated();
        supervisor.register_masks.insert("sync_in_sel".into(), !1);
        let client = RegisterClient::new("roach1");
        let confirmed = client
            .write_and_verify(&mut supervisor, &mut cache, "sync_in_sel", 5)
            .unwrap();
        assert_eq!(confirmed, 4);
        assert_eq!(cache.register("roach1", "sync_in_sel").unwrap(), 4);
    }

    #[test]
    fn each_write_is_one_write_one_readback() {
        let (mut cache, mut supervisor) = populated();
        let client = RegisterClient::new("roach1");
        client
            .write_and_verify(&mut supervisor, &mut cache, "acc_len_m1", 2047)
            .unwrap();
        client
            .write_and_verify(&mut supervisor, &mut cache, "sync_in_sel", 1)
            .unwrap();
        assert_eq!(supervisor.calls_to("fpga_write_int").len(), 2);
        assert_eq!(supervisor.calls_to("fpga_read_int").len(), 2);
    }

    #[test]
    fn failed_write_leaves_cache_unchanged() {
        let (mut cache, mut supervisor) = populated();
        supervisor.fail_methods.insert("fpga_write_int".into());
        let before = cache.clone();
        let client = RegisterClient::new("roach1");
        assert!(client
            .write_and_verify(&mut supervisor, &mut cache, "acc_len_m1", 1)
            .is_err());
        assert_eq!(cache, before);
    }
}
