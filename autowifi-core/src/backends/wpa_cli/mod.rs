use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::parsing;
use crate::ssid::Ssid;
use crate::traits::{
    ConnectionInitiator, ConnectivityEvent, EventSource, PendingRequest, RadioControl,
    TargetNetwork,
};
use crate::{Error, Result};

// 通过调用wpa_cli命令行工具实现的传统后端，直接操作wpa_supplicant的网络配置。
// Legacy tier: add-or-update a stored profile, enable it, reconnect. Rival
// profiles are left alone.

#[derive(Debug)]
pub struct WpaCliBackend {
    iface: String,
}

impl WpaCliBackend {
    pub fn new(iface: impl Into<String>) -> Self {
        Self { iface: iface.into() }
    }

    /// Runs one `wpa_cli -i <iface>` command and returns trimmed stdout.
    /// wpa_cli reports failures as a `FAIL` line with a zero exit code.
    async fn wpa(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("wpa_cli")
            .arg("-i")
            .arg(&self.iface)
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(parsing::classify_command_failure(
                &format!("wpa_cli {}", args.first().unwrap_or(&"")),
                &stderr,
            ));
        }
        let stdout = String::from_utf8(output.stdout)?.trim().to_string();
        if stdout == "FAIL" || stdout.starts_with("FAIL-") {
            return Err(Error::RequestRejected(format!(
                "wpa_cli {} returned {}",
                args.first().unwrap_or(&""),
                stdout
            )));
        }
        Ok(stdout)
    }

    /// Finds an existing profile for the target, or creates one.
    async fn add_or_update_profile(&self, target: &TargetNetwork) -> Result<u32> {
        let target_ssid = Ssid::parse(&target.ssid)
            .ok_or_else(|| Error::RequestRejected(format!("invalid target ssid '{}'", target.ssid)))?;

        let listing = self.wpa(&["list_networks"]).await?;
        let (id, newly_added) = match parsing::find_network_id(&listing, &target_ssid) {
            Some(id) => {
                debug!("🔧 [WpaCliBackend] Updating existing profile {id} for '{target_ssid}'");
                (id, false)
            }
            None => {
                let id = self.wpa(&["add_network"]).await?;
                let id = id.parse().map_err(|_| {
                    Error::RequestRejected(format!("add_network returned '{id}'"))
                })?;
                (id, true)
            }
        };
        let id_str = id.to_string();

        if let Err(e) = self.configure_profile(&id_str, target, &target_ssid).await {
            // A profile whose ssid was never set is invisible to the next
            // lookup; left behind, a fresh one would pile up every tick.
            if newly_added {
                let _ = self.wpa(&["remove_network", &id_str]).await;
            }
            return Err(e);
        }
        Ok(id)
    }

    async fn configure_profile(
        &self,
        id_str: &str,
        target: &TargetNetwork,
        target_ssid: &Ssid,
    ) -> Result<()> {
        self.wpa(&["set_network", id_str, "ssid", &target_ssid.quoted()]).await?;
        if target.passphrase.is_empty() {
            self.wpa(&["set_network", id_str, "key_mgmt", "NONE"]).await?;
        } else {
            let quoted_psk = format!("\"{}\"", target.passphrase);
            self.wpa(&["set_network", id_str, "psk", &quoted_psk]).await?;
        }
        if target.hidden {
            // Hidden networks need a directed probe.
            self.wpa(&["set_network", id_str, "scan_ssid", "1"]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RadioControl for WpaCliBackend {
    async fn is_radio_enabled(&self) -> Result<bool> {
        let output = Command::new("rfkill").arg("list").arg("wifi").output().await?;
        if !output.status.success() {
            // No rfkill on this system; assume the radio is up and let the
            // status query decide.
            return Ok(true);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(!parsing::rfkill_blocked(&stdout))
    }

    async fn request_radio_enable(&self) -> Result<()> {
        info!("🔧 [WpaCliBackend] Unblocking Wi-Fi radio via rfkill");
        let output = Command::new("rfkill").arg("unblock").arg("wifi").output().await?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "rfkill unblock failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn current_association(&self) -> Result<Option<Ssid>> {
        let output = self.wpa(&["status"]).await?;
        let status = parsing::parse_wpa_status(&output);
        if status.wpa_state != "COMPLETED" {
            return Ok(None);
        }
        Ok(status.ssid.as_deref().and_then(Ssid::parse))
    }
}

#[async_trait]
impl ConnectionInitiator for WpaCliBackend {
    async fn initiate(&self, target: &TargetNetwork) -> Result<PendingRequest> {
        info!("🔧 [WpaCliBackend] Activating profile for '{}'", target.ssid);
        let id = self.add_or_update_profile(target).await?;
        let id_str = id.to_string();
        self.wpa(&["enable_network", &id_str]).await?;
        self.wpa(&["select_network", &id_str]).await?;
        self.wpa(&["reconnect"]).await?;
        // The supplicant keeps retrying a selected network on its own, so the
        // request carries no timeout of ours.
        Ok(PendingRequest::new(None))
    }
}

impl EventSource for WpaCliBackend {
    /// Attaches an interactive `wpa_cli` session and maps its unsolicited
    /// `CTRL-EVENT-*` lines onto connectivity events.
    fn subscribe(&self) -> Result<mpsc::Receiver<ConnectivityEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let mut child = Command::new("wpa_cli")
            .arg("-i")
            .arg(&self.iface)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::CommandFailed("wpa_cli session produced no stdout".to_string())
        })?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(event) = classify_ctrl_event(&line) else {
                    continue;
                };
                debug!("🔧 [WpaCliBackend] event: {line}");
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            let _ = child.kill().await;
        });

        Ok(rx)
    }
}

fn classify_ctrl_event(line: &str) -> Option<ConnectivityEvent> {
    if line.contains("CTRL-EVENT-CONNECTED") || line.contains("CTRL-EVENT-DISCONNECTED") {
        Some(ConnectivityEvent::AssociationChanged)
    } else if line.contains("CTRL-EVENT-TERMINATING") {
        Some(ConnectivityEvent::RadioStateChanged)
    } else {
        None
    }
}
