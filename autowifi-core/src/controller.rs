//! The reconnect loop.
//!
//! A single timer drives all work; probe and initiation run sequentially on the
//! loop task. A connectivity-change subscription is a second trigger converging
//! on the same serialized cycle, so a tick and an event can never issue
//! duplicate requests: the in-flight `PendingRequest` is the guard.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::Error;
use crate::probe::StatusProbe;
use crate::traits::{
    ConnectionInitiator, ConnectivityEvent, PendingRequest, RadioControl, StatusSink,
    TargetNetwork,
};

/// Timing knobs of the loop. Fixed period, no jitter, no backoff.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Period between scheduled checks.
    pub tick_interval: Duration,
    /// How long to hold off initiation after asking for the radio to come up.
    pub enable_grace: Duration,
    /// Upper bound on a modern-tier availability wait.
    pub request_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            enable_grace: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The two effective states of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Radio up and association with the target confirmed.
    Idle,
    /// Radio down, or associated with a different/no network.
    Reconnecting,
}

pub struct ReconnectController {
    radio: Arc<dyn RadioControl>,
    initiator: Arc<dyn ConnectionInitiator>,
    status: Arc<dyn StatusSink>,
    probe: StatusProbe,
    target: TargetNetwork,
    config: LoopConfig,
    state: LoopState,
    in_flight: Option<PendingRequest>,
    grace_until: Option<Instant>,
}

/// Handle to a spawned controller; `stop` cancels the timer, drops the event
/// subscription and joins the loop task.
pub struct ControllerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl ReconnectController {
    pub fn new(
        radio: Arc<dyn RadioControl>,
        initiator: Arc<dyn ConnectionInitiator>,
        status: Arc<dyn StatusSink>,
        target: TargetNetwork,
        config: LoopConfig,
    ) -> Self {
        let probe = StatusProbe::new(radio.clone(), &target);
        Self {
            radio,
            initiator,
            status,
            probe,
            target,
            config,
            state: LoopState::Reconnecting,
            in_flight: None,
            grace_until: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Spawns the loop onto the runtime and returns a stop handle.
    pub fn spawn(self, events: mpsc::Receiver<ConnectivityEvent>) -> ControllerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(events, shutdown_rx));
        ControllerHandle { shutdown, task }
    }

    /// Runs until the shutdown channel flips. No terminal state otherwise.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ConnectivityEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_closed = false;
        info!("🔁 Reconnect loop started for '{}'", self.target.ssid);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                event = events.recv(), if !events_closed => {
                    match event {
                        Some(event) => {
                            debug!("connectivity change ({event:?}), running out-of-band check");
                            self.cycle().await;
                        }
                        // Subscription ended; the timer keeps the loop alive.
                        None => events_closed = true,
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("🔁 Reconnect loop stopped");
    }

    /// One probe/initiate cycle. Invoked from the timer tick and from
    /// out-of-band connectivity events, never concurrently.
    async fn cycle(&mut self) {
        // An in-flight request suppresses everything except noticing that it
        // either succeeded or expired. Every request is bounded: by its own
        // timeout if it carries one, and by the loop's request_timeout ceiling
        // either way, so a stalled legacy activation cannot park the loop.
        if let Some(request) = &self.in_flight {
            let expired = request.is_expired()
                || request.issued_at().elapsed() >= self.config.request_timeout;
            if expired {
                warn!("⏱️ Connection request for '{}' timed out, will retry", self.target.ssid);
                self.in_flight = None;
            } else {
                if self.probe.probe().await.matches_target {
                    self.in_flight = None;
                    self.enter_idle();
                } else {
                    debug!("request in flight, skipping cycle");
                }
                return;
            }
        }

        match self.radio.is_radio_enabled().await {
            Ok(false) => {
                info!("📴 Radio disabled, requesting enable");
                self.status.update_status("Wi-Fi radio disabled, requesting enable");
                if let Err(e) = self.radio.request_radio_enable().await {
                    warn!("radio enable request failed: {e}");
                }
                // Give the radio a moment before the next initiation attempt.
                self.grace_until = Some(Instant::now() + self.config.enable_grace);
                self.state = LoopState::Reconnecting;
                return;
            }
            // Radio coming up ends the grace early.
            Ok(true) => self.grace_until = None,
            Err(e) => debug!("radio state query failed: {e}"),
        }

        if let Some(deadline) = self.grace_until {
            if Instant::now() < deadline {
                debug!("within enable grace period, deferring initiation");
                return;
            }
            self.grace_until = None;
        }

        if self.probe.probe().await.matches_target {
            self.enter_idle();
            return;
        }

        if self.state != LoopState::Reconnecting {
            info!("📡 Not associated with '{}', reconnecting", self.target.ssid);
        }
        self.state = LoopState::Reconnecting;
        self.status
            .update_status(&format!("Reconnecting to {}...", self.target.ssid));
        match self.initiator.initiate(&self.target).await {
            Ok(request) => {
                debug!("connection request issued at {:?}", request.issued_at());
                self.in_flight = Some(request);
            }
            Err(Error::PermissionDenied(msg)) => {
                warn!("🔒 Permission denied issuing connection request: {msg}");
                self.status.update_status("Permission denied, cannot reconnect");
            }
            Err(e) => {
                warn!("connection request failed ({e}), retrying next tick");
            }
        }
    }

    fn enter_idle(&mut self) {
        if self.state != LoopState::Idle {
            info!("✅ Associated with '{}'", self.target.ssid);
        }
        self.state = LoopState::Idle;
        self.status
            .update_status(&format!("Connected to {}", self.target.ssid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{InitiateOutcome, MockBackend};
    use crate::traits::EventSource;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<String>>);

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn last(&self) -> String {
            self.0.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    impl StatusSink for RecordingSink {
        fn update_status(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn target() -> TargetNetwork {
        TargetNetwork {
            ssid: "HomeNet".to_string(),
            passphrase: "secret".to_string(),
            hidden: true,
        }
    }

    fn controller(
        backend: &Arc<MockBackend>,
        sink: &Arc<RecordingSink>,
    ) -> ReconnectController {
        ReconnectController::new(
            backend.clone(),
            backend.clone(),
            sink.clone(),
            target(),
            LoopConfig::default(),
        )
    }

    #[tokio::test]
    async fn associated_tick_never_initiates() {
        let backend = MockBackend::new();
        backend.set_association(Some("HomeNet"));
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;

        assert_eq!(backend.initiate_calls(), Vec::<String>::new());
        assert_eq!(ctl.state(), LoopState::Idle);
        assert_eq!(sink.last(), "Connected to HomeNet");
    }

    #[tokio::test]
    async fn radio_disabled_requests_enable_and_defers() {
        let backend = MockBackend::new();
        backend.set_radio_enabled(false);
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;

        assert_eq!(backend.enable_requests(), 1);
        assert!(backend.initiate_calls().is_empty());
        assert_eq!(ctl.state(), LoopState::Reconnecting);
        assert_eq!(sink.last(), "Wi-Fi radio disabled, requesting enable");

        // Still disabled on the next tick: one more enable request, still no
        // initiation.
        ctl.cycle().await;
        assert_eq!(backend.enable_requests(), 2);
        assert!(backend.initiate_calls().is_empty());
    }

    #[tokio::test]
    async fn radio_coming_up_ends_grace_early() {
        let backend = MockBackend::new();
        backend.set_radio_enabled(false);
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        assert!(backend.initiate_calls().is_empty());

        // Radio came up before the grace deadline; the next trigger initiates.
        backend.set_radio_enabled(true);
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls(), vec!["HomeNet".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_defers_initiation_when_radio_state_is_unknown() {
        let backend = MockBackend::new();
        backend.set_radio_enabled(false);
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        backend.fail_radio_queries(true);

        // Radio state unknown inside the grace window: defer.
        ctl.cycle().await;
        assert!(backend.initiate_calls().is_empty());

        time::advance(Duration::from_secs(3)).await;
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);
    }

    #[tokio::test]
    async fn mismatch_initiates_with_the_target() {
        let backend = MockBackend::new();
        backend.set_association(Some("OfficeNet"));
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;

        assert_eq!(backend.initiate_calls(), vec!["HomeNet".to_string()]);
        assert_eq!(ctl.state(), LoopState::Reconnecting);
        assert_eq!(sink.last(), "Reconnecting to HomeNet...");
    }

    #[tokio::test]
    async fn at_most_one_request_in_flight() {
        let backend = MockBackend::new();
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        // A timer tick and an out-of-band event land inside the same window;
        // the second cycle must not issue a duplicate request.
        ctl.cycle().await;
        ctl.cycle().await;

        assert_eq!(backend.initiate_calls().len(), 1);
    }

    #[tokio::test]
    async fn in_flight_request_clears_on_success() {
        let backend = MockBackend::new();
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);

        backend.set_association(Some("HomeNet"));
        ctl.cycle().await;
        assert_eq!(ctl.state(), LoopState::Idle);
        assert_eq!(sink.last(), "Connected to HomeNet");

        // Idle now; no further requests.
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_request_unblocks_the_next_attempt() {
        let backend = MockBackend::new();
        backend.set_pending_timeout(Some(Duration::from_secs(30)));
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);

        time::advance(Duration::from_secs(10)).await;
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);

        time::advance(Duration::from_secs(25)).await;
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_request_is_bounded_by_the_loop() {
        let backend = MockBackend::new();
        backend.set_association(Some("OfficeNet"));
        // Legacy-style activation: the request carries no timeout of its own.
        backend.set_pending_timeout(None);
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 1);

        // The target never comes up; the loop must keep re-issuing instead of
        // parking on the stale request.
        for _ in 0..10 {
            time::advance(Duration::from_secs(60)).await;
            ctl.cycle().await;
        }
        assert_eq!(backend.initiate_calls().len(), 11);
    }

    #[tokio::test]
    async fn rejected_request_is_retried_next_tick() {
        let backend = MockBackend::new();
        backend.set_initiate_outcome(InitiateOutcome::Reject("busy".to_string()));
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;
        assert_eq!(ctl.state(), LoopState::Reconnecting);

        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 2);
    }

    #[tokio::test]
    async fn permission_denied_abandons_the_cycle() {
        let backend = MockBackend::new();
        backend.set_initiate_outcome(InitiateOutcome::Deny("missing capability".to_string()));
        let sink = RecordingSink::new();
        let mut ctl = controller(&backend, &sink);

        ctl.cycle().await;

        assert_eq!(backend.initiate_calls().len(), 1);
        assert_eq!(sink.last(), "Permission denied, cannot reconnect");
        // Not fatal: the next tick tries again.
        ctl.cycle().await;
        assert_eq!(backend.initiate_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_and_stops() {
        let backend = MockBackend::new();
        backend.set_association(Some("HomeNet"));
        let sink = RecordingSink::new();
        let ctl = controller(&backend, &sink);

        let events = backend.subscribe().unwrap();
        let handle = ctl.spawn(events);

        // Three tick periods of paused time; the loop stays idle throughout.
        time::sleep(Duration::from_secs(10)).await;
        handle.stop().await;

        assert!(backend.initiate_calls().is_empty());
        assert_eq!(sink.last(), "Connected to HomeNet");
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_event_triggers_out_of_band_cycle() {
        let backend = MockBackend::new();
        backend.set_association(Some("HomeNet"));
        let sink = RecordingSink::new();
        let ctl = controller(&backend, &sink);

        let events = backend.subscribe().unwrap();
        let handle = ctl.spawn(events);

        // Let the first tick run, drop the association, then signal the
        // change in between scheduled ticks.
        time::sleep(Duration::from_millis(100)).await;
        backend.set_association(None);
        backend.emit(ConnectivityEvent::AssociationChanged);
        time::sleep(Duration::from_millis(100)).await;

        assert_eq!(backend.initiate_calls(), vec!["HomeNet".to_string()]);
        handle.stop().await;
    }
}
