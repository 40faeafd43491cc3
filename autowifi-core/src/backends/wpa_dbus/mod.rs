use async_trait::async_trait;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use zbus::Connection;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus_macros::proxy;

use crate::ssid::Ssid;
use crate::traits::{
    ConnectionInitiator, ConnectivityEvent, EventSource, PendingRequest, RadioControl,
    TargetNetwork,
};
use crate::{Error, Result};

const WPA_S_SERVICE: &str = "fi.w1.wpa_supplicant1";
const WPA_S_PATH: &str = "/fi/w1/wpa_supplicant1";
const WPA_S_IFACE: &str = "fi.w1.wpa_supplicant1.Interface";

// Using zbus_macros to generate async proxy code for the interfaces we need.
#[proxy(interface = "org.freedesktop.DBus.Properties")]
trait Properties {
    // Return owned values to avoid lifetime issues inside the macro-generated code.
    fn get_all(&self, interface_name: &str) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[proxy(interface = "fi.w1.wpa_supplicant1")]
trait WpaSupplicant {
    #[zbus(property)]
    fn interfaces(&self) -> zbus::Result<Vec<String>>;
}

#[proxy(interface = "fi.w1.wpa_supplicant1.Interface")]
trait WpaInterface {
    fn add_network(&self, args: HashMap<String, OwnedValue>) -> zbus::Result<String>;
    fn remove_network(&self, path: &str) -> zbus::Result<()>;
    fn select_network(&self, path: &str) -> zbus::Result<()>;
    fn reconnect(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn state(&self) -> zbus::Result<String>;
}

/// Legacy-tier backend that drives wpa_supplicant over D-Bus instead of the
/// wpa_cli binary.
#[derive(Debug)]
pub struct WpaDbusBackend {
    connection: Connection,
    iface: String,
    // Network object path of the profile we last added; removed before
    // re-adding so profiles do not pile up in the supplicant.
    current_profile: Arc<Mutex<Option<String>>>,
}

impl WpaDbusBackend {
    pub async fn new(iface: impl Into<String>) -> Result<Self> {
        let connection = Connection::system().await?;
        Ok(Self {
            connection,
            iface: iface.into(),
            current_profile: Arc::new(Mutex::new(None)),
        })
    }

    /// Finds the D-Bus object path for our wireless interface (e.g., wlan0).
    async fn get_iface_proxy(&self) -> Result<WpaInterfaceProxy<'_>> {
        let supplicant_proxy =
            WpaSupplicantProxy::new(&self.connection, WPA_S_SERVICE, WPA_S_PATH).await?;
        let iface_paths = supplicant_proxy.interfaces().await?;

        for path in iface_paths {
            let obj_path = ObjectPath::try_from(path.as_str())?;
            let prop_proxy =
                PropertiesProxy::new(&self.connection, WPA_S_SERVICE, &obj_path).await?;
            let props = prop_proxy.get_all(WPA_S_IFACE).await?;
            if let Some(val) = props.get("Ifname") {
                if let Ok(ifname) = <OwnedValue as TryInto<String>>::try_into(val.clone()) {
                    if ifname == self.iface {
                        return Ok(WpaInterfaceProxy::new(
                            &self.connection,
                            WPA_S_SERVICE,
                            obj_path.into_owned(),
                        )
                        .await?);
                    }
                }
            }
        }
        Err(Error::CommandFailed(format!(
            "Wi-Fi interface '{}' not found on wpa_supplicant D-Bus",
            self.iface
        )))
    }

    /// Reads the SSID of the currently associated BSS, if any.
    async fn associated_ssid(&self) -> Result<Option<Ssid>> {
        let iface_proxy = self.get_iface_proxy().await?;
        if iface_proxy.state().await? != "completed" {
            return Ok(None);
        }
        let prop_proxy =
            PropertiesProxy::new(&self.connection, WPA_S_SERVICE, iface_proxy.inner().path())
                .await?;
        let props = prop_proxy.get_all(WPA_S_IFACE).await?;
        let Some(bss_val) = props.get("CurrentBSS") else {
            return Ok(None);
        };
        let bss_path: ObjectPath<'_> = bss_val.downcast_ref()?;
        if bss_path.as_str() == "/" {
            return Ok(None);
        }
        let bss_props = PropertiesProxy::new(&self.connection, WPA_S_SERVICE, &bss_path)
            .await?
            .get_all("fi.w1.wpa_supplicant1.BSS")
            .await?;
        let Some(ssid_val) = bss_props.get("SSID") else {
            return Ok(None);
        };
        let bytes: Vec<u8> = ssid_val.clone().try_into()?;
        let ssid = String::from_utf8(bytes)?;
        Ok(Ssid::parse(&ssid))
    }

    fn network_args(target: &TargetNetwork) -> Result<HashMap<String, OwnedValue>> {
        let mut args = HashMap::new();
        // Construct OwnedValue via intermediate Value then try_from.
        args.insert(
            "ssid".to_string(),
            OwnedValue::try_from(Value::new(target.ssid.as_bytes()))?,
        );
        if target.passphrase.is_empty() {
            args.insert(
                "key_mgmt".to_string(),
                OwnedValue::try_from(Value::new("NONE"))?,
            );
        } else {
            args.insert(
                "psk".to_string(),
                OwnedValue::try_from(Value::new(target.passphrase.as_str()))?,
            );
        }
        if target.hidden {
            args.insert(
                "scan_ssid".to_string(),
                OwnedValue::try_from(Value::new(1i32))?,
            );
        }
        Ok(args)
    }
}

#[async_trait]
impl RadioControl for WpaDbusBackend {
    async fn is_radio_enabled(&self) -> Result<bool> {
        match self.get_iface_proxy().await {
            Ok(proxy) => Ok(proxy.state().await? != "interface_disabled"),
            // Interface missing from the supplicant usually means the radio
            // is blocked or the driver is down.
            Err(_) => Ok(false),
        }
    }

    async fn request_radio_enable(&self) -> Result<()> {
        info!("🚌 [WpaDbusBackend] Unblocking Wi-Fi radio via rfkill");
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
        self.associated_ssid().await
    }
}

#[async_trait]
impl ConnectionInitiator for WpaDbusBackend {
    async fn initiate(&self, target: &TargetNetwork) -> Result<PendingRequest> {
        // A wedged supplicant would otherwise stall the loop indefinitely.
        const DBUS_CALL_TIMEOUT: Duration = Duration::from_secs(10);

        info!("🚌 [WpaDbusBackend] Selecting network '{}' via D-Bus", target.ssid);
        let activate = async {
            let iface_proxy = self.get_iface_proxy().await?;

            let mut current = self.current_profile.lock().await;
            if let Some(old) = current.take() {
                if let Err(e) = iface_proxy.remove_network(&old).await {
                    debug!("removing stale network profile failed: {e}");
                }
            }

            let args = Self::network_args(target)?;
            let path = iface_proxy
                .add_network(args)
                .await
                .map_err(|e| map_dbus_failure("AddNetwork", e))?;
            iface_proxy
                .select_network(&path)
                .await
                .map_err(|e| map_dbus_failure("SelectNetwork", e))?;
            iface_proxy.reconnect().await.map_err(|e| map_dbus_failure("Reconnect", e))?;
            *current = Some(path);
            Ok(())
        };

        match tokio::time::timeout(DBUS_CALL_TIMEOUT, activate).await {
            // As with wpa_cli, the supplicant owns the retry schedule once the
            // network is selected, so the request carries no timeout of ours.
            Ok(result) => result.map(|()| PendingRequest::new(None)),
            Err(_) => Err(Error::Timeout(DBUS_CALL_TIMEOUT)),
        }
    }
}

impl EventSource for WpaDbusBackend {
    /// Subscribes to the interface's `PropertiesChanged` signal. Setup is
    /// asynchronous, so it happens inside the spawned task; the channel is
    /// handed out immediately.
    fn subscribe(&self) -> Result<mpsc::Receiver<ConnectivityEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let connection = self.connection.clone();
        let iface = self.iface.clone();
        tokio::spawn(async move {
            let backend = WpaDbusBackend {
                connection,
                iface,
                current_profile: Arc::new(Mutex::new(None)),
            };
            let iface_proxy = match backend.get_iface_proxy().await {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!("🚌 [WpaDbusBackend] signal subscription failed: {e}");
                    return;
                }
            };
            // The interface emits PropertiesChanged(a{sv}) on every state or
            // BSS transition.
            let mut stream = match iface_proxy.inner().receive_signal("PropertiesChanged").await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("🚌 [WpaDbusBackend] signal subscription failed: {e}");
                    return;
                }
            };
            while let Some(signal) = stream.next().await {
                let relevant = match signal.body().deserialize::<HashMap<String, Value>>() {
                    Ok(changed) => {
                        changed.contains_key("State") || changed.contains_key("CurrentBSS")
                    }
                    Err(e) => {
                        debug!("ignoring malformed PropertiesChanged body: {e}");
                        false
                    }
                };
                if relevant
                    && tx.send(ConnectivityEvent::AssociationChanged).await.is_err()
                {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// wpa_supplicant rejects bad parameters with generic D-Bus errors; access
/// failures come back as authorization errors. Fold both into the loop's
/// taxonomy.
fn map_dbus_failure(context: &str, e: zbus::Error) -> Error {
    let text = e.to_string();
    if text.contains("AccessDenied") || text.contains("NotAuthorized") {
        Error::PermissionDenied(format!("{context}: {text}"))
    } else {
        Error::RequestRejected(format!("{context}: {text}"))
    }
}
