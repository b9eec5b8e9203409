// MessageRouter — single entry point for (device, payload) events
//
// Both the GATT write path and the passive scanner land here. The router
// always logs the event; whether the sender is verified first depends on
// the configured AuthPolicy.

use thiserror::Error;
use tokio::sync::broadcast;

use super::{InboundMessage, Payload};
use crate::config::AuthPolicy;
use crate::identity::IdentityVerifier;

/// Capacity of the inbound message broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors for routing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Device {device} is not authorized")]
    Unauthorized { device: String },
}

/// Routes inbound messages to the identity check and to subscribers
pub struct MessageRouter {
    verifier: IdentityVerifier,
    policy: AuthPolicy,
    events: broadcast::Sender<InboundMessage>,
}

impl MessageRouter {
    /// Create a new router
    pub fn new(verifier: IdentityVerifier, policy: AuthPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            verifier,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    pub fn verifier(&self) -> &IdentityVerifier {
        &self.verifier
    }

    /// Subscribe to accepted messages
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.events.subscribe()
    }

    /// Handle one event. Never blocks.
    pub fn handle(&self, device: &str, payload: Payload) -> Result<InboundMessage, RouteError> {
        tracing::info!(
            device,
            origin = ?payload.origin(),
            payload = %payload,
            "Message received"
        );

        let verified = match self.policy {
            AuthPolicy::Disabled => None,
            AuthPolicy::Audit | AuthPolicy::Enforce => Some(self.verifier.verify(device)),
        };

        if self.policy == AuthPolicy::Enforce && verified == Some(false) {
            tracing::warn!(device, "Rejecting message from unverified device");
            return Err(RouteError::Unauthorized {
                device: device.to_string(),
            });
        }

        let message = InboundMessage {
            device: device.to_string(),
            payload,
            verified,
        };
        // No subscribers is fine
        let _ = self.events.send(message.clone());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &str = "AA:BB:CC:DD:EE:FF";

    fn router(policy: AuthPolicy) -> MessageRouter {
        MessageRouter::new(IdentityVerifier::new([KNOWN]), policy)
    }

    #[test]
    fn test_disabled_policy_skips_verification() {
        let router = router(AuthPolicy::Disabled);
        let msg = router
            .handle("unknown-device", Payload::Text("hi".into()))
            .expect("Accepted");
        assert_eq!(msg.verified, None);
        assert_eq!(msg.device, "unknown-device");
    }

    #[test]
    fn test_audit_policy_records_verdict() {
        let router = router(AuthPolicy::Audit);
        let ok = router
            .handle("aabbccddeeff", Payload::Token(5))
            .expect("Accepted");
        assert_eq!(ok.verified, Some(true));

        let stranger = router
            .handle("11:22:33:44:55:66", Payload::Token(5))
            .expect("Audit never rejects");
        assert_eq!(stranger.verified, Some(false));
    }

    #[test]
    fn test_enforce_policy_rejects_strangers() {
        let router = router(AuthPolicy::Enforce);
        let result = router.handle("11:22:33:44:55:66", Payload::Text("x".into()));
        assert_eq!(
            result,
            Err(RouteError::Unauthorized {
                device: "11:22:33:44:55:66".into()
            })
        );
        assert!(router.handle(KNOWN, Payload::Text("x".into())).is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_receive_accepted_messages_only() {
        let router = router(AuthPolicy::Enforce);
        let mut rx = router.subscribe();

        let _ = router.handle("00:00:00:00:00:01", Payload::Token(1));
        router
            .handle(KNOWN, Payload::Text("ABC".into()))
            .expect("Accepted");

        let msg = rx.recv().await.expect("Message published");
        assert_eq!(msg.payload, Payload::Text("ABC".into()));
        assert_eq!(msg.verified, Some(true));
        assert!(rx.try_recv().is_err());
    }
}
