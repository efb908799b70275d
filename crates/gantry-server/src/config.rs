use std::{fs, io, path::Path, time::Duration};

use gantry_network::ConnectionConfig;
use serde::Deserialize;

/// Server runtime configuration. Loadable from JSON; CLI flags override
/// individual fields.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP listener port.
    pub port: u16,
    /// Hostname advertised in the discovery URL.
    pub hostname: String,
    pub recv_buffer_size: usize,
    pub send_buffer_size: usize,
    /// Readiness budget per main-loop iteration, in milliseconds.
    pub process_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 16664,
            hostname: "localhost".to_owned(),
            recv_buffer_size: 65535,
            send_buffer_size: 65535,
            process_timeout_ms: 50,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> io::Result<ServerConfig> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn discovery_url(&self) -> String {
        format!("opc.tcp://{}:{}/", self.hostname, self.port)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            recv_buffer_size: self.recv_buffer_size,
            send_buffer_size: self.send_buffer_size,
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }
}
