use std::sync::Arc;
use tracing::debug;

use crate::ssid::Ssid;
use crate::traits::{ConnectionState, RadioControl, TargetNetwork};

/// Answers "is the device currently associated with the target network?".
///
/// Side-effect free. When the underlying query is unavailable the probe
/// degrades to "not associated" instead of failing the loop.
pub struct StatusProbe {
    radio: Arc<dyn RadioControl>,
    target: Option<Ssid>,
}

impl StatusProbe {
    pub fn new(radio: Arc<dyn RadioControl>, target: &TargetNetwork) -> Self {
        Self {
            radio,
            target: Ssid::parse(&target.ssid),
        }
    }

    pub async fn probe(&self) -> ConnectionState {
        let association = match self.radio.current_association().await {
            Ok(association) => association,
            Err(e) => {
                debug!("association query unavailable: {e}");
                return ConnectionState::NOT_ASSOCIATED;
            }
        };
        match association {
            Some(current) => ConnectionState {
                associated: true,
                matches_target: self.target.as_ref() == Some(&current),
            },
            None => ConnectionState::NOT_ASSOCIATED,
        }
    }
}
