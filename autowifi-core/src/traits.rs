use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::ssid::Ssid;

// 在这里定义共享的数据类型，和为所有后端定义的 trait。

/// The network this daemon keeps the device associated with.
/// Fixed at configuration time; never mutated at runtime.
#[derive(Clone, PartialEq, Eq)]
pub struct TargetNetwork {
    pub ssid: String,
    pub passphrase: String,
    pub hidden: bool,
}

impl fmt::Debug for TargetNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetNetwork")
            .field("ssid", &self.ssid)
            .field("passphrase", &"********")
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Association status derived on each poll. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub associated: bool,
    pub matches_target: bool,
}

impl ConnectionState {
    pub const NOT_ASSOCIATED: ConnectionState = ConnectionState {
        associated: false,
        matches_target: false,
    };
}

/// One in-flight connection attempt issued by an initiator.
/// Discarded after success, failure, or timeout.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    issued_at: Instant,
    timeout: Option<Duration>,
}

impl PendingRequest {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            issued_at: Instant::now(),
            timeout,
        }
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// True once the request's timeout has elapsed. Requests without a
    /// timeout never expire on their own (legacy profile activation is
    /// retried by the supplicant itself).
    pub fn is_expired(&self) -> bool {
        match self.timeout {
            Some(timeout) => self.issued_at.elapsed() >= timeout,
            None => false,
        }
    }
}

/// Out-of-band connectivity notification from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Radio was switched on or off.
    RadioStateChanged,
    /// Association came up, went down, or moved to another network.
    AssociationChanged,
}

/// Radio / association queries against the platform network stack.
#[async_trait]
pub trait RadioControl: Send + Sync {
    /// Whether the Wi-Fi radio is currently enabled.
    async fn is_radio_enabled(&self) -> crate::Result<bool>;

    /// Ask the platform to enable the radio. Returns once the request is
    /// issued; the radio may take a while to actually come up.
    async fn request_radio_enable(&self) -> crate::Result<()>;

    /// The SSID the device is currently associated with, if any.
    async fn current_association(&self) -> crate::Result<Option<Ssid>>;
}

/// Issues a request to associate with the target network.
///
/// One interface, two strategy families, selected once at startup by a
/// capability probe (see [`crate::factory`]):
/// - modern tier: a one-shot connect request with a bounded availability wait
/// - legacy tier: add-or-update a stored profile, enable it and reconnect
#[async_trait]
pub trait ConnectionInitiator: Send + Sync {
    async fn initiate(&self, target: &TargetNetwork) -> crate::Result<PendingRequest>;
}

/// Presentation-only status reporting (the foreground-notification seam).
/// Called after every probe/initiate outcome; must never block the loop.
pub trait StatusSink: Send + Sync {
    fn update_status(&self, text: &str);
}

/// Subscription to OS connectivity-change notifications.
///
/// The returned receiver feeds the controller's out-of-band trigger.
/// Cancellation is defined by dropping the receiver: the backend's monitor
/// task notices the closed channel and exits.
pub trait EventSource: Send + Sync {
    fn subscribe(&self) -> crate::Result<mpsc::Receiver<ConnectivityEvent>>;
}
