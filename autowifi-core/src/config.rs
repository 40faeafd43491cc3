use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;

use crate::Result;
use crate::controller::LoopConfig;
use crate::traits::TargetNetwork;

#[derive(Deserialize)]
struct ConfigFile {
    ssid: String,
    passphrase: String,
    #[serde(default)]
    hidden: bool,
    #[serde(default = "default_interface")]
    interface: String,
    #[serde(default = "default_tick_interval")]
    tick_interval_secs: u64,
    #[serde(default = "default_enable_grace")]
    enable_grace_secs: u64,
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_tick_interval() -> u64 {
    3
}

fn default_enable_grace() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

/// Resolved daemon configuration: the target network plus loop timing.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target: TargetNetwork,
    pub interface: String,
    pub loop_config: LoopConfig,
}

impl From<ConfigFile> for AppConfig {
    fn from(file: ConfigFile) -> Self {
        AppConfig {
            target: TargetNetwork {
                ssid: file.ssid,
                passphrase: file.passphrase,
                hidden: file.hidden,
            },
            interface: file.interface,
            loop_config: LoopConfig {
                tick_interval: Duration::from_secs(file.tick_interval_secs),
                enable_grace: Duration::from_secs(file.enable_grace_secs),
                request_timeout: Duration::from_secs(file.request_timeout_secs),
            },
        }
    }
}

pub fn app_config_from_toml_str(s: &str) -> Result<AppConfig> {
    let parsed: ConfigFile = toml::from_str(s)?;
    Ok(AppConfig::from(parsed))
}

/// The compiled-in configuration. The target network is a static value, fixed
/// at build time like the rest of it.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    const CONFIG_TOML: &str = include_str!("../../configs/autowifi.toml");
    app_config_from_toml_str(CONFIG_TOML).expect("Failed to parse autowifi config TOML")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let cfg = app_config_from_toml_str(
            r#"
            ssid = "HomeNet"
            passphrase = "secret"
            hidden = true
            interface = "wlp2s0"
            tick_interval_secs = 5
            enable_grace_secs = 1
            request_timeout_secs = 20
            "#,
        )
        .unwrap();
        assert_eq!(cfg.target.ssid, "HomeNet");
        assert!(cfg.target.hidden);
        assert_eq!(cfg.interface, "wlp2s0");
        assert_eq!(cfg.loop_config.tick_interval, Duration::from_secs(5));
        assert_eq!(cfg.loop_config.enable_grace, Duration::from_secs(1));
        assert_eq!(cfg.loop_config.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = app_config_from_toml_str("ssid = \"HomeNet\"\npassphrase = \"\"\n").unwrap();
        assert!(!cfg.target.hidden);
        assert_eq!(cfg.interface, "wlan0");
        assert_eq!(cfg.loop_config.tick_interval, Duration::from_secs(3));
        assert_eq!(cfg.loop_config.enable_grace, Duration::from_secs(2));
        assert_eq!(cfg.loop_config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            app_config_from_toml_str("ssid = 42"),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn compiled_in_config_is_valid_toml() {
        app_config_from_toml_str(include_str!("../../configs/autowifi.toml")).unwrap();
    }
}
