//! Backend construction and the one-time capability probe.
//!
//! Platform tiers are a policy fork, not independent features: the modern
//! strategy (NetworkManager, one-shot connect requests) and the legacy
//! strategy (direct wpa_supplicant profile activation) implement the same
//! initiator interface, and which one runs is decided exactly once here.

use std::sync::Arc;

use crate::traits::{ConnectionInitiator, EventSource, RadioControl};

/// One backend's complete set of trait handles for the controller.
pub struct Backend {
    pub radio: Arc<dyn RadioControl>,
    pub initiator: Arc<dyn ConnectionInitiator>,
    pub events: Arc<dyn EventSource>,
}

impl Backend {
    pub fn from_arc<B>(backend: Arc<B>) -> Self
    where
        B: RadioControl + ConnectionInitiator + EventSource + 'static,
    {
        Self {
            radio: backend.clone(),
            initiator: backend.clone(),
            events: backend,
        }
    }
}

/// Which initiator strategy the platform supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityTier {
    /// NetworkManager owns the interface; use one-shot connect requests.
    Modern,
    /// Raw wpa_supplicant; add and activate a stored profile directly.
    Legacy,
}

/// Probes the platform once at startup. NetworkManager running means it owns
/// the interface, and talking to wpa_supplicant underneath it would fight
/// over control.
#[cfg(all(feature = "backend_nmcli", feature = "backend_wpa_cli"))]
pub async fn detect_capability() -> CapabilityTier {
    match tokio::process::Command::new("nmcli")
        .args(["-t", "-f", "RUNNING", "general"])
        .output()
        .await
    {
        Ok(out)
            if out.status.success()
                && String::from_utf8_lossy(&out.stdout).trim() == "running" =>
        {
            CapabilityTier::Modern
        }
        _ => CapabilityTier::Legacy,
    }
}

#[cfg(any(
    feature = "backend_nmcli",
    feature = "backend_wpa_cli",
    feature = "backend_wpa_dbus",
    feature = "backend_mock"
))]
pub async fn create_backend(cfg: &crate::config::AppConfig) -> crate::Result<Backend> {
    #[cfg(feature = "backend_mock")]
    {
        let _ = cfg;
        tracing::info!("🤖 Backend: Mock selected (for local development)");
        return Ok(Backend::from_arc(crate::backends::mock::MockBackend::new()));
    }

    #[cfg(all(feature = "backend_wpa_dbus", not(feature = "backend_mock")))]
    {
        tracing::info!("🚌 Backend: wpa_supplicant D-Bus selected (legacy tier)");
        let backend = crate::backends::wpa_dbus::WpaDbusBackend::new(cfg.interface.clone()).await?;
        return Ok(Backend::from_arc(Arc::new(backend)));
    }

    #[cfg(all(
        feature = "backend_nmcli",
        feature = "backend_wpa_cli",
        not(any(feature = "backend_wpa_dbus", feature = "backend_mock"))
    ))]
    {
        return Ok(match detect_capability().await {
            CapabilityTier::Modern => {
                tracing::info!("📡 Backend: NetworkManager detected, modern tier");
                Backend::from_arc(Arc::new(crate::backends::nmcli::NmcliBackend::new(
                    cfg.interface.clone(),
                    cfg.loop_config.request_timeout,
                )))
            }
            CapabilityTier::Legacy => {
                tracing::info!("🔧 Backend: no NetworkManager, legacy wpa_cli tier");
                Backend::from_arc(Arc::new(crate::backends::wpa_cli::WpaCliBackend::new(
                    cfg.interface.clone(),
                )))
            }
        });
    }

    #[cfg(all(
        feature = "backend_nmcli",
        not(any(
            feature = "backend_wpa_cli",
            feature = "backend_wpa_dbus",
            feature = "backend_mock"
        ))
    ))]
    {
        tracing::info!("📡 Backend: nmcli selected (modern tier)");
        return Ok(Backend::from_arc(Arc::new(
            crate::backends::nmcli::NmcliBackend::new(
                cfg.interface.clone(),
                cfg.loop_config.request_timeout,
            ),
        )));
    }

    #[cfg(all(
        feature = "backend_wpa_cli",
        not(any(
            feature = "backend_nmcli",
            feature = "backend_wpa_dbus",
            feature = "backend_mock"
        ))
    ))]
    {
        tracing::info!("🔧 Backend: wpa_cli selected (legacy tier)");
        return Ok(Backend::from_arc(Arc::new(
            crate::backends::wpa_cli::WpaCliBackend::new(cfg.interface.clone()),
        )));
    }
}
