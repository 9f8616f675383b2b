use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use updraft_core::Connectivity;

pub const DEFAULT_REACHABILITY_ADDRESSES: [&str; 2] = ["1.1.1.1:443", "8.8.8.8:443"];
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Treats the host as online when a TCP connection to any listed address
/// succeeds within the timeout.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    addresses: Vec<String>,
    timeout: Duration,
}

impl Default for TcpReachability {
    fn default() -> Self {
        Self {
            addresses: DEFAULT_REACHABILITY_ADDRESSES
                .iter()
                .map(ToString::to_string)
                .collect(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpReachability {
    pub fn new(addresses: impl IntoIterator<Item = impl Into<String>>, timeout: Duration) -> Self {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for TcpReachability {
    async fn is_connected(&self) -> bool {
        for address in &self.addresses {
            match tokio::time::timeout(self.timeout, TcpStream::connect(address.as_str())).await {
                Ok(Ok(_)) => return true,
                Ok(Err(error)) => debug!("Connection to {address} failed: {error}"),
                Err(_) => debug!("Connection to {address} timed out"),
            }
        }
        false
    }
}

/// Skips probing; for hosts that manage connectivity themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConnected;

#[async_trait]
impl Connectivity for AlwaysConnected {
    async fn is_connected(&self) -> bool {
        true
    }
}
