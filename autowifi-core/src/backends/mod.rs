pub mod parsing;

#[cfg(feature = "backend_nmcli")]
pub mod nmcli;

#[cfg(feature = "backend_wpa_cli")]
pub mod wpa_cli;

#[cfg(feature = "backend_wpa_dbus")]
pub mod wpa_dbus;

#[cfg(any(test, feature = "backend_mock"))]
pub mod mock;
