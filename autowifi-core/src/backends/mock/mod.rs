use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ssid::Ssid;
use crate::traits::{
    ConnectionInitiator, ConnectivityEvent, EventSource, PendingRequest, RadioControl,
    TargetNetwork,
};
use crate::{Error, Result};

/// What a scripted `initiate` call should do.
#[derive(Debug, Clone)]
pub enum InitiateOutcome {
    Accept,
    Reject(String),
    Deny(String),
}

#[derive(Debug)]
struct MockState {
    radio_enabled: bool,
    radio_query_fails: bool,
    association: Option<String>,
    association_query_fails: bool,
    initiate_outcome: InitiateOutcome,
    pending_timeout: Option<Duration>,
    enable_requests: u32,
    initiate_calls: Vec<String>,
    event_tx: Option<mpsc::Sender<ConnectivityEvent>>,
}

/// A scripted backend for testing and development.
/// Simulates radio state and association without any real hardware interaction,
/// and records every enable request and initiation call.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                radio_enabled: true,
                radio_query_fails: false,
                association: None,
                association_query_fails: false,
                initiate_outcome: InitiateOutcome::Accept,
                pending_timeout: None,
                enable_requests: 0,
                initiate_calls: Vec::new(),
                event_tx: None,
            }),
        })
    }

    pub fn set_radio_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().radio_enabled = enabled;
    }

    pub fn fail_radio_queries(&self, fail: bool) {
        self.state.lock().unwrap().radio_query_fails = fail;
    }

    /// Sets the raw association string a status query would report
    /// (quoting and placeholder quirks included).
    pub fn set_association(&self, ssid: Option<&str>) {
        self.state.lock().unwrap().association = ssid.map(str::to_string);
    }

    pub fn fail_association_queries(&self, fail: bool) {
        self.state.lock().unwrap().association_query_fails = fail;
    }

    pub fn set_initiate_outcome(&self, outcome: InitiateOutcome) {
        self.state.lock().unwrap().initiate_outcome = outcome;
    }

    pub fn set_pending_timeout(&self, timeout: Option<Duration>) {
        self.state.lock().unwrap().pending_timeout = timeout;
    }

    pub fn enable_requests(&self) -> u32 {
        self.state.lock().unwrap().enable_requests
    }

    pub fn initiate_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().initiate_calls.clone()
    }

    /// Pushes a connectivity event into the subscribed channel, as the OS
    /// notification path would.
    pub fn emit(&self, event: ConnectivityEvent) {
        let tx = self.state.lock().unwrap().event_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.try_send(event);
        }
    }
}

#[async_trait]
impl RadioControl for MockBackend {
    async fn is_radio_enabled(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.radio_query_fails {
            return Err(Error::CommandFailed("simulated radio query failure".to_string()));
        }
        Ok(state.radio_enabled)
    }

    async fn request_radio_enable(&self) -> Result<()> {
        debug!("🤖 [MockBackend] Radio enable requested");
        self.state.lock().unwrap().enable_requests += 1;
        Ok(())
    }

    async fn current_association(&self) -> Result<Option<Ssid>> {
        let state = self.state.lock().unwrap();
        if state.association_query_fails {
            return Err(Error::CommandFailed("simulated status query failure".to_string()));
        }
        Ok(state.association.as_deref().and_then(Ssid::parse))
    }
}

#[async_trait]
impl ConnectionInitiator for MockBackend {
    async fn initiate(&self, target: &TargetNetwork) -> Result<PendingRequest> {
        debug!("🤖 [MockBackend] Initiate requested for '{}'", target.ssid);
        let mut state = self.state.lock().unwrap();
        state.initiate_calls.push(target.ssid.clone());
        match state.initiate_outcome.clone() {
            InitiateOutcome::Accept => Ok(PendingRequest::new(state.pending_timeout)),
            InitiateOutcome::Reject(msg) => Err(Error::RequestRejected(msg)),
            InitiateOutcome::Deny(msg) => Err(Error::PermissionDenied(msg)),
        }
    }
}

impl EventSource for MockBackend {
    fn subscribe(&self) -> Result<mpsc::Receiver<ConnectivityEvent>> {
        let (tx, rx) = mpsc::channel(8);
        self.state.lock().unwrap().event_tx = Some(tx);
        Ok(rx)
    }
}
