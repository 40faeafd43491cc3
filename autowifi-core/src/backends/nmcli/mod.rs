use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::parsing;
use crate::ssid::Ssid;
use crate::traits::{
    ConnectionInitiator, ConnectivityEvent, EventSource, PendingRequest, RadioControl,
    TargetNetwork,
};
use crate::{Error, Result};

// 通过调用nmcli命令行工具实现的现代后端，适用于使用NetworkManager管理网络连接的Linux系统。
// Modern tier: a one-shot connect request per attempt, never a stored profile edit.

#[derive(Debug)]
pub struct NmcliBackend {
    iface: String,
    request_timeout: Duration,
}

impl NmcliBackend {
    pub fn new(iface: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            iface: iface.into(),
            request_timeout,
        }
    }

    async fn nmcli(args: &[&str]) -> Result<String> {
        let output = Command::new("nmcli").args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed(format!(
                "nmcli {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    async fn associated_with(iface: &str, ssid: &Ssid) -> bool {
        let output = Command::new("nmcli")
            .args(["-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "ifname", iface, "--rescan", "no"])
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                parsing::parse_nmcli_active_ssid(&stdout)
                    .and_then(|s| Ssid::parse(&s))
                    .as_ref()
                    == Some(ssid)
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RadioControl for NmcliBackend {
    async fn is_radio_enabled(&self) -> Result<bool> {
        let output = Self::nmcli(&["radio", "wifi"]).await?;
        Ok(parsing::parse_radio_state(&output))
    }

    async fn request_radio_enable(&self) -> Result<()> {
        info!("📡 [NmcliBackend] Enabling Wi-Fi radio");
        Self::nmcli(&["radio", "wifi", "on"]).await?;
        Ok(())
    }

    async fn current_association(&self) -> Result<Option<Ssid>> {
        let output = Self::nmcli(&[
            "-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "ifname", &self.iface,
            "--rescan", "no",
        ])
        .await?;
        Ok(parsing::parse_nmcli_active_ssid(&output).and_then(|s| Ssid::parse(&s)))
    }
}

#[async_trait]
impl ConnectionInitiator for NmcliBackend {
    async fn initiate(&self, target: &TargetNetwork) -> Result<PendingRequest> {
        info!("📡 [NmcliBackend] Issuing connect request for '{}'", target.ssid);

        let mut cmd = Command::new("nmcli");
        cmd.args(["device", "wifi", "connect", &target.ssid]);
        if !target.passphrase.is_empty() {
            cmd.args(["password", &target.passphrase]);
        }
        if target.hidden {
            cmd.args(["hidden", "yes"]);
        }
        cmd.args(["ifname", &self.iface]);
        // Nobody reads the child's output; a piped fd would back up once the
        // pipe buffer fills and wedge the activation.
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        // The request itself is fire-and-forget; the availability wait runs in
        // its own task so the loop keeps ticking.
        let mut child = cmd.spawn()?;
        let iface = self.iface.clone();
        let ssid = target.ssid.clone();
        let target_ssid = Ssid::parse(&target.ssid);
        let timeout = self.request_timeout;
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if tokio::time::Instant::now() >= deadline {
                    // Reap the child so a wedged nmcli does not linger.
                    let _ = child.kill().await;
                    warn!("📡 [NmcliBackend] '{ssid}' not available within {timeout:?}");
                    return;
                }
                if let Some(target_ssid) = &target_ssid {
                    if Self::associated_with(&iface, target_ssid).await {
                        info!("📡 [NmcliBackend] '{ssid}' became available");
                        return;
                    }
                }
                match child.try_wait() {
                    Ok(Some(status)) if !status.success() => {
                        warn!("📡 [NmcliBackend] connect request for '{ssid}' exited with {status}");
                        return;
                    }
                    Ok(Some(_)) | Ok(None) => {}
                    Err(e) => {
                        debug!("try_wait on nmcli connect failed: {e}");
                        return;
                    }
                }
            }
        });

        Ok(PendingRequest::new(Some(self.request_timeout)))
    }
}

impl EventSource for NmcliBackend {
    /// Spawns `nmcli monitor` and maps its line stream onto connectivity
    /// events. The reader task exits once the receiver is dropped or the
    /// monitor process ends.
    fn subscribe(&self) -> Result<mpsc::Receiver<ConnectivityEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let mut child = Command::new("nmcli")
            .arg("monitor")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::CommandFailed("nmcli monitor produced no stdout".to_string())
        })?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = classify_monitor_line(&line);
                let Some(event) = event else { continue };
                debug!("📡 [NmcliBackend] monitor: {line}");
                if tx.send(event).await.is_err() {
                    // Receiver gone: subscription was cancelled.
                    break;
                }
            }
            let _ = child.kill().await;
        });

        Ok(rx)
    }
}

fn classify_monitor_line(line: &str) -> Option<ConnectivityEvent> {
    let lowered = line.to_lowercase();
    if lowered.contains("radio") || lowered.contains("wifi enabled") || lowered.contains("wifi disabled") {
        Some(ConnectivityEvent::RadioStateChanged)
    } else if lowered.contains("connected") || lowered.contains("disconnected") {
        Some(ConnectivityEvent::AssociationChanged)
    } else {
        None
    }
}
