use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;

/// How long to wait for the server to answer.
const TIMEOUT: Duration = Duration::from_secs(5);

/// Checks that a server answers on the configured address.
///
/// Wildcard bind addresses are checked through the loopback interface.
pub async fn healthcheck(config: Config) -> Result<()> {
    let mut addr = config.http_addr;
    if addr.ip().is_unspecified() {
        match addr {
            std::net::SocketAddr::V4(_) => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            std::net::SocketAddr::V6(_) => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
        }
    }

    let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;
    let url = format!("http://{addr}/health");

    tracing::debug!("sending healthcheck request to {}", url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Bad Status: {}", response.status());
    }

    tracing::info!("OK");
    Ok(())
}
