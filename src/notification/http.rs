//! The shared outbound HTTP client.

use crate::config::TransportConfig;
use anyhow::{Context, Result};
use reqwest::{Client, NoProxy, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// Builds the client used by every destination.
///
/// Supports `http://`, `https://` and `socks5://` proxies with optional
/// `user:pass` credentials and a `no_proxy` host list. Without an explicit
/// proxy the environment's proxy variables apply unless `ignore_env_proxy`
/// is set.
pub fn build_client(transport: &TransportConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(transport.timeout_secs))
        .user_agent(concat!("runwatch/", env!("CARGO_PKG_VERSION")));

    if transport.ignore_env_proxy {
        builder = builder.no_proxy();
    }

    if let Some(url) = transport.proxy.as_deref().filter(|u| !u.is_empty()) {
        let scheme = url.split("://").next().unwrap_or_default().to_ascii_lowercase();
        if !matches!(scheme.as_str(), "http" | "https" | "socks5" | "socks5h") {
            anyhow::bail!("Unsupported proxy scheme in {} (use http(s):// or socks5://)", url);
        }

        let mut proxy = Proxy::all(url).with_context(|| format!("Invalid proxy URL: {}", url))?;
        if let Some(auth) = &transport.proxy_auth {
            let (user, pass) = auth
                .split_once(':')
                .context("Invalid proxy_auth format, expected user:pass")?;
            proxy = proxy.basic_auth(user, pass);
        }
        if let Some(hosts) = &transport.no_proxy {
            proxy = proxy.no_proxy(NoProxy::from_string(hosts));
        }
        info!(proxy = %url, "Routing notifications through proxy");
        builder = builder.proxy(proxy);
    }

    if transport.insecure {
        warn!("TLS certificate verification is disabled for notifications");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().context("Failed to build HTTP client")
}
