//! Allow/deny decisions for inbound requests

use crate::error::AdmissionError;
use crate::registry::{ClientRegistry, RegistryConfig};
use governor::clock::{Clock, DefaultClock};
use governor::Quota;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Token-bucket settings applied to every client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Sustained requests per second
    pub rps: f64,
    /// Maximum burst
    pub burst: u32,
    /// Whether admission control is applied at all
    pub enabled: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

impl LimiterConfig {
    /// Check that the settings describe a usable bucket
    pub fn validate(&self) -> Result<(), AdmissionError> {
        self.quota().map(|_| ())
    }

    /// Build the governor quota: one token every `1/rps` seconds, up to `burst`
    pub fn quota(&self) -> Result<Quota, AdmissionError> {
        if !self.rps.is_finite() || self.rps <= 0.0 {
            return Err(AdmissionError::InvalidConfig(format!(
                "rps must be a positive number, got {}",
                self.rps
            )));
        }
        let burst = NonZeroU32::new(self.burst)
            .ok_or_else(|| AdmissionError::InvalidConfig("burst must be greater than zero".into()))?;

        let period = Duration::try_from_secs_f64(1.0 / self.rps)
            .map_err(|e| AdmissionError::InvalidConfig(format!("rps {} is out of range: {}", self.rps, e)))?;

        Quota::with_period(period)
            .map(|quota| quota.allow_burst(burst))
            .ok_or_else(|| AdmissionError::InvalidConfig(format!("rps {} is too large", self.rps)))
    }
}

/// Outcome of an admission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        self == Admission::Allowed
    }
}

/// Extract the client identity (IP address, port stripped) from a peer
/// address such as `"203.0.113.9:52811"` or `"[::1]:8080"`.
pub fn client_identity(peer: &str) -> Result<String, AdmissionError> {
    peer.parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .map_err(|e| AdmissionError::InvalidPeerAddress {
            addr: peer.to_string(),
            reason: e.to_string(),
        })
}

/// Decides whether a request may proceed, one bucket per client.
pub struct AdmissionController<C: Clock = DefaultClock> {
    enabled: bool,
    registry: Arc<ClientRegistry<C>>,
}

impl AdmissionController<DefaultClock> {
    /// Build a controller and its registry from configuration
    pub fn from_config(
        limiter: &LimiterConfig,
        registry: RegistryConfig,
    ) -> Result<Self, AdmissionError> {
        let quota = limiter.quota()?;
        Ok(Self::new(
            limiter.enabled,
            Arc::new(ClientRegistry::new(quota, registry)),
        ))
    }
}

impl<C> AdmissionController<C>
where
    C: Clock + Clone,
{
    pub fn new(enabled: bool, registry: Arc<ClientRegistry<C>>) -> Self {
        Self { enabled, registry }
    }

    /// Whether checks are applied
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The registry backing this controller
    pub fn registry(&self) -> &Arc<ClientRegistry<C>> {
        &self.registry
    }

    /// Decide for an already extracted identity. Never blocks.
    pub fn admit(&self, identity: &str) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        if self.registry.try_acquire(identity) {
            Admission::Allowed
        } else {
            debug!(client = identity, "rate limit exceeded");
            Admission::Denied
        }
    }

    /// Decide for a connected peer
    pub fn admit_addr(&self, peer: SocketAddr) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }
        self.admit(&peer.ip().to_string())
    }

    /// Decide for a textual peer address; a malformed address is an error.
    pub fn admit_peer(&self, peer: &str) -> Result<Admission, AdmissionError> {
        if !self.enabled {
            return Ok(Admission::Allowed);
        }
        let identity = client_identity(peer)?;
        Ok(self.admit(&identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use rstest::rstest;

    fn controller(enabled: bool, clock: &FakeRelativeClock) -> AdmissionController<FakeRelativeClock> {
        let quota = LimiterConfig {
            rps: 2.0,
            burst: 4,
            enabled,
        }
        .quota()
        .unwrap();
        let registry = ClientRegistry::with_clock(quota, RegistryConfig::default(), clock.clone());
        AdmissionController::new(enabled, Arc::new(registry))
    }

    #[test]
    fn test_burst_then_refill() {
        let clock = FakeRelativeClock::default();
        let admission = controller(true, &clock);

        for _ in 0..4 {
            assert_eq!(admission.admit("10.0.0.1"), Admission::Allowed);
        }
        assert_eq!(admission.admit("10.0.0.1"), Admission::Denied);

        // One token accrues every 1/rps seconds.
        clock.advance(Duration::from_millis(500));
        assert_eq!(admission.admit("10.0.0.1"), Admission::Allowed);
        assert_eq!(admission.admit("10.0.0.1"), Admission::Denied);
    }

    #[test]
    fn test_denial_does_not_affect_other_clients() {
        let clock = FakeRelativeClock::default();
        let admission = controller(true, &clock);

        while admission.admit("10.0.0.1").is_allowed() {}

        assert_eq!(admission.admit("10.0.0.2"), Admission::Allowed);
    }

    #[test]
    fn test_denied_request_still_refreshes_activity() {
        let clock = FakeRelativeClock::default();
        let quota = LimiterConfig {
            rps: 0.001,
            burst: 1,
            enabled: true,
        }
        .quota()
        .unwrap();
        let registry = ClientRegistry::with_clock(quota, RegistryConfig::default(), clock.clone());
        let admission = AdmissionController::new(true, Arc::new(registry));

        assert!(admission.admit("10.0.0.1").is_allowed());
        clock.advance(Duration::from_secs(170));
        assert_eq!(admission.admit("10.0.0.1"), Admission::Denied);

        // Past the staleness window measured from the first request, but not
        // from the denied one.
        clock.advance(Duration::from_secs(20));
        assert_eq!(admission.registry().sweep(), 0);
        assert!(admission.registry().contains("10.0.0.1"));
    }

    #[test]
    fn test_disabled_skips_registry() {
        let clock = FakeRelativeClock::default();
        let admission = controller(false, &clock);

        for _ in 0..100 {
            assert_eq!(admission.admit_peer("10.0.0.1:4000").unwrap(), Admission::Allowed);
        }
        assert!(admission.registry().is_empty());
    }

    #[test]
    fn test_peer_port_is_stripped() {
        let clock = FakeRelativeClock::default();
        let admission = controller(true, &clock);

        for port in 0..4 {
            let peer = format!("10.0.0.1:{}", 50000 + port);
            assert!(admission.admit_peer(&peer).unwrap().is_allowed());
        }
        assert_eq!(admission.admit_peer("10.0.0.1:1").unwrap(), Admission::Denied);
        assert_eq!(admission.registry().len(), 1);
    }

    #[rstest]
    #[case("10.0.0.1:80", "10.0.0.1")]
    #[case("[::1]:8080", "::1")]
    fn test_client_identity(#[case] peer: &str, #[case] expected: &str) {
        assert_eq!(client_identity(peer).unwrap(), expected);
    }

    #[rstest]
    #[case("10.0.0.1")]
    #[case("not-an-address:80")]
    #[case("")]
    fn test_malformed_peer_is_an_error(#[case] peer: &str) {
        let clock = FakeRelativeClock::default();
        let admission = controller(true, &clock);

        let err = admission.admit_peer(peer).unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidPeerAddress { .. }));
    }

    #[rstest]
    #[case(0.0, 4)]
    #[case(-1.0, 4)]
    #[case(f64::NAN, 4)]
    #[case(f64::INFINITY, 4)]
    #[case(2.0, 0)]
    fn test_invalid_config(#[case] rps: f64, #[case] burst: u32) {
        let config = LimiterConfig {
            rps,
            burst,
            enabled: true,
        };
        assert!(matches!(config.validate(), Err(AdmissionError::InvalidConfig(_))));
    }

    #[test]
    fn test_fractional_rate() {
        let config = LimiterConfig {
            rps: 0.5,
            burst: 1,
            enabled: true,
        };
        assert!(config.validate().is_ok());
    }
}
