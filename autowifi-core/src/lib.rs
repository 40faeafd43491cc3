//! Core library for the Wi-Fi auto-reconnect daemon.
//! This crate defines the core traits (interfaces) and data structures for the
//! reconnect loop, and provides different backend implementations (Wi-Fi control)
//! controlled by feature flags.

pub mod backends;
pub mod config;
pub mod controller;
pub mod factory;
pub mod probe;
pub mod ssid;
pub mod traits;

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Connection request rejected: {0}")]
    RequestRejected(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[cfg(feature = "backend_wpa_dbus")]
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[cfg(feature = "backend_wpa_dbus")]
    #[error("zvariant error: {0}")]
    Zvariant(#[from] zbus::zvariant::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
