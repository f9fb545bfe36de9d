//! Line-delimited JSON transport to a live supervisor.
//!
//! Each call is one JSON object on one line: `{"id", "object", "method",
//! "params"}` out, `{"id", "value"}` or `{"id", "error"}` back. Calls are
//! strictly sequential on one connection; a response carrying the wrong id
//! is a protocol violation and surfaces as a communication error. The
//! supervisor-side exception text of a failed call comes back in `error`
//! and is reported as `McError::Remote`.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{McError, McResult};
use crate::proxy::{RemoteProxy, RfReadback, RoachReport};

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: u64,
    object: &'a str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Blocking JSON-line RPC connection to the supervisor.
pub struct TcpProxy {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    object_id: String,
    next_id: u64,
}

impl TcpProxy {
    /// Connect to `host:port` and address calls to `object_id`.
    ///
    /// `timeout` bounds the TCP connect and every subsequent read; a slow
    /// remote call past the read timeout surfaces as a communication error.
    pub fn connect(
        host: &str,
        port: u16,
        object_id: &str,
        timeout: Duration,
    ) -> McResult<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| McError::Communication(format!("cannot resolve {host}:{port}")))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| McError::Communication(format!("connect to {addr}: {e}")))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| McError::Communication(e.to_string()))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| McError::Communication(e.to_string()))?,
        );
        debug!("connected to supervisor object {object_id} at {addr}");
        Ok(Self {
            reader,
            writer: stream,
            object_id: object_id.to_string(),
            next_id: 1,
        })
    }

    fn call(&mut self, method: &str, params: Value) -> McResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = RpcRequest {
            id,
            object: &self.object_id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        trace!("-> {}", line.trim_end());
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| McError::Communication(format!("{method}: {e}")))?;

        let mut response = String::new();
        let n = self
            .reader
            .read_line(&mut response)
            .map_err(|e| McError::Communication(format!("{method}: {e}")))?;
        if n == 0 {
            return Err(McError::Communication(format!(
                "{method}: connection closed by supervisor"
            )));
        }
        trace!("<- {}", response.trim_end());
        let response: RpcResponse = serde_json::from_str(&response)
            .map_err(|e| McError::Payload(format!("{method}: {e}")))?;
        if response.id != id {
            return Err(McError::Communication(format!(
                "{method}: response id {} does not match request id {id}",
                response.id
            )));
        }
        match response.error {
            Some(error) => Err(McError::Remote(format!("{method}: {error}"))),
            None => Ok(response.value),
        }
    }

    fn typed<T: serde::de::DeserializeOwned>(&mut self, method: &str, params: Value) -> McResult<T> {
        let value = self.call(method, params)?;
        serde_json::from_value(value).map_err(|e| McError::Payload(format!("{method}: {e}")))
    }
}

impl RemoteProxy for TcpProxy {
    fn ping(&mut self) -> McResult<()> {
        self.call("ping", json!([]))?;
        Ok(())
    }

    fn request(&mut self, expression: &str) -> McResult<Value> {
        self.call("request", json!([expression]))
    }

    fn roach_report(&mut self) -> McResult<RoachReport> {
        self.typed("roach_report", json!([]))
    }

    fn get_gains(&mut self, board: &str) -> McResult<Value> {
        self.call("get_gains", json!([board]))
    }

    fn set_rf_section(
        &mut self,
        board: &str,
        adc: u32,
        rf: u32,
        gain: Option<f64>,
        enabled: bool,
    ) -> McResult<()> {
        self.call("set_RF_section", json!([board, adc, rf, gain, enabled]))?;
        Ok(())
    }

    fn get_rf_section(&mut self, board: &str, adc: u32, rf: u32) -> McResult<RfReadback> {
        self.typed("get_RF_section", json!([board, adc, rf]))
    }

    fn get_adc_levels(&mut self) -> McResult<Value> {
        self.call("get_ADC_levels", json!([]))
    }

    fn get_temperatures(&mut self) -> McResult<Value> {
        self.call("get_temperatures", json!([]))
    }

    fn get_switch_states(&mut self) -> McResult<Vec<u32>> {
        self.typed("get_switch_states", json!([]))
    }

    fn set_switch_state(&mut self, output: u32, input: u32) -> McResult<u32> {
        self.typed("set_IFsw_state", json!([output, input]))
    }

    fn check_fans(&mut self) -> McResult<BTreeMap<String, f64>> {
        self.typed("check_fans", json!([]))
    }

    fn get_mms_analog(&mut self) -> McResult<(BTreeMap<String, f64>, BTreeMap<String, f64>)> {
        self.typed("get_MMS_analog", json!([]))
    }

    fn get_register_values(&mut self, board: &str) -> McResult<BTreeMap<String, i64>> {
        self.typed("get_register_values", json!([board]))
    }

    fn get_firmware_summary(&mut self, firmware: &str) -> McResult<Value> {
        self.call("get_firmware_summary", json!([firmware]))
    }

    fn attach_roach(&mut self, board: &str, firmware: &str) -> McResult<String> {
        self.typed("attach_roach", json!([board, firmware]))
    }

    fn fpga_read_int(&mut self, board: &str, register: &str) -> McResult<i64> {
        self.typed("fpga_read_int", json!([board, register]))
    }

    fn fpga_write_int(&mut self, board: &str, register: &str, value: i64) -> McResult<()> {
        self.call("fpga_write_int", json!([board, register, value]))?;
        Ok(())
    }

    fn get_adc_samples(&mut self, board: &str, adc: u32, rf: u32) -> McResult<Vec<f64>> {
        self.typed("get_ADC_samples", json!([board, adc, rf]))
    }

    fn get_accumulations(&mut self, board_index: u32, adc: u32, rf: u32) -> McResult<Value> {
        self.call("get_spectra", json!([board_index, adc, rf]))
    }

    fn list_registers(&mut self, boards: &[u32]) -> McResult<Vec<String>> {
        self.typed("list_dev", json!([boards]))
    }
}
