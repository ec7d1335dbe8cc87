//! Network link bootstrap, run at the start of every serving run.

use serbridge_core::config::WlanConfig;
use tracing::info;

pub trait LinkBootstrap {
    /// Bring the link up, or confirm it is up, before bridges are bound.
    fn bring_up(&mut self, wlan: Option<&WlanConfig>, device_name: &str) -> anyhow::Result<()>;
}

/// Host networking: association is handled by the operating system, so
/// this only reports what the configuration asks for.
pub struct HostNetwork;

impl LinkBootstrap for HostNetwork {
    fn bring_up(&mut self, wlan: Option<&WlanConfig>, device_name: &str) -> anyhow::Result<()> {
        for line in describe(wlan, device_name) {
            info!("{}", line);
        }
        Ok(())
    }
}

/// Human-readable summary of the wireless settings.
pub fn describe(wlan: Option<&WlanConfig>, device_name: &str) -> Vec<String> {
    let Some(wlan) = wlan else {
        return vec!["Network: using host configuration".to_string()];
    };

    let mut lines = Vec::new();
    if let Some(sta) = &wlan.sta {
        let attempts = if sta.connection_attempts < 0 {
            "unlimited".to_string()
        } else {
            sta.connection_attempts.to_string()
        };
        lines.push(format!(
            "Network: station ESSID {} ({} connection attempts)",
            sta.essid, attempts
        ));
    }
    if let Some(ap) = &wlan.ap {
        let essid = ap.essid.as_deref().unwrap_or(device_name);
        lines.push(format!(
            "Network: access point ESSID {} on channel {} ({}{})",
            essid,
            ap.channel,
            ap.authmode,
            if ap.hidden { ", hidden" } else { "" }
        ));
    }
    if lines.is_empty() {
        lines.push("Network: wlan section is empty, using host configuration".to_string());
    }
    lines
}
