//! Worker identity, resolved once at startup.

use std::time::Duration;

use tracing::{debug, info, warn};

/// Placeholder used when the external address cannot be resolved.
const UNKNOWN_ADDRESS: &str = "ipv4address";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity the controller knows this worker by: `<external-ipv4>-<hostname>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    name: String,
}

impl WorkerIdentity {
    pub fn new(address: &str, hostname: &str) -> Self {
        Self {
            name: format!("{}-{}", address.trim(), hostname),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the external IPv4 address via `lookup_url` and combine it with
    /// the local host name. Falls back to a placeholder address on any error.
    pub async fn resolve(client: &reqwest::Client, lookup_url: &str) -> Self {
        let hostname = local_hostname();

        match lookup_address(client, lookup_url).await {
            Ok(address) if !address.trim().is_empty() => {
                let identity = Self::new(&address, &hostname);
                info!(worker = %identity.name, "Resolved worker identity");
                identity
            }
            Ok(_) => {
                warn!("External address lookup returned an empty body");
                Self::new(UNKNOWN_ADDRESS, &hostname)
            }
            Err(e) => {
                debug!(error = %e, url = lookup_url, "External address lookup failed");
                Self::new(UNKNOWN_ADDRESS, &hostname)
            }
        }
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

async fn lookup_address(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
