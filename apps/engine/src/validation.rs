//! Validation for roster input and engine settings.
//!
//! The tick itself never rejects a stored service; these checks guard the
//! places where services and configuration enter the system.

use std::net::IpAddr;

use anyhow::{Result, anyhow};
use url::Url;

/// Validates a service URL: http(s) only, with a host and a usable port.
///
/// Private and loopback hosts are refused unless `allow_private` is set, so a
/// hosted deployment cannot be pointed at its own network.
pub fn validate_service_url(target: &str, allow_private: bool) -> Result<Url> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Unsupported scheme for a monitored service: {}", other)),
    }

    let host = url.host_str().ok_or_else(|| anyhow!("URL has no host: {}", target))?;

    if !allow_private && is_private_or_local(host) {
        return Err(anyhow!("Private/local addresses are not allowed: {}", host));
    }

    if let Some(port) = url.port() {
        validate_port(port)?;
    }

    Ok(url)
}

/// Check if hostname/IP is private or localhost
fn is_private_or_local(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        match ip {
            IpAddr::V4(ipv4) => {
                ipv4.is_private()
                    || ipv4.is_loopback()
                    || ipv4.is_link_local()
                    || ipv4.is_broadcast()
                    || ipv4.is_documentation()
                    || ipv4.is_unspecified()
            }
            IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unspecified() || ipv6.is_multicast(),
        }
    } else {
        let host = host.to_ascii_lowercase();
        host.ends_with(".local") || host.ends_with(".internal") || host.ends_with(".localhost")
    }
}

fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port 0 is not valid"));
    }
    Ok(())
}

/// Validate a service check interval, in minutes
pub fn validate_check_interval(interval_minutes: u32) -> Result<()> {
    const MIN_INTERVAL: u32 = 1;
    const MAX_INTERVAL: u32 = 1440; // 24 hours

    if interval_minutes < MIN_INTERVAL {
        return Err(anyhow!(
            "Check interval too short: {} minutes (minimum: {})",
            interval_minutes,
            MIN_INTERVAL
        ));
    }

    if interval_minutes > MAX_INTERVAL {
        return Err(anyhow!(
            "Check interval too long: {} minutes (maximum: {})",
            interval_minutes,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    const MAX_CONCURRENCY: usize = 64;

    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(anyhow!(
            "Concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY,
            concurrency
        ));
    }
    Ok(())
}
