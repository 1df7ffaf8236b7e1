//! Per-client rate limiter registry with idle eviction
//!
//! Every client identity (the peer IP address) owns one token-bucket limiter.
//! Entries are created on first sight and dropped by a periodic sweep once
//! they have been idle for longer than the staleness window, which keeps the
//! map bounded even though the set of identities is not.
//!
//! ```text
//!   touch("10.0.0.1") ──┐
//!   touch("10.0.0.2") ──┼──► DashMap<identity, ClientEntry> ◄── sweep (every 60s)
//!   touch("10.0.0.1") ──┘          │
//!                                  ▼
//!                      limiter + last_seen per identity
//! ```
//!
//! Creation, refresh and removal of one identity all happen under the map's
//! shard lock, so a sweep can never remove an entry a concurrent `touch` is
//! about to use, and two racing first requests share one limiter.

use crate::shutdown::ShutdownState;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default interval between eviction sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle time after which a client is evicted (3x the sweep interval)
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3 * 60);

/// Token-bucket limiter owned by a single client
pub type ClientLimiter<C = DefaultClock> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Eviction settings
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    /// How often the sweep runs
    pub sweep_interval: Duration,
    /// Idle time after which an entry is removed
    pub stale_after: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Counters describing the registry
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct RegistryStats {
    /// Identities currently tracked
    pub tracked: usize,
    /// Limiters created since startup
    pub created: u64,
    /// Entries removed by sweeps since startup
    pub evicted: u64,
}

struct ClientEntry<C: Clock> {
    limiter: Arc<ClientLimiter<C>>,
    last_seen: C::Instant,
}

/// Mapping from client identity to its limiter.
pub struct ClientRegistry<C: Clock = DefaultClock> {
    clients: DashMap<String, ClientEntry<C>>,
    quota: Quota,
    clock: C,
    config: RegistryConfig,
    created: AtomicU64,
    evicted: AtomicU64,
}

impl ClientRegistry<DefaultClock> {
    /// Create a registry handing out limiters with the given quota
    pub fn new(quota: Quota, config: RegistryConfig) -> Self {
        Self::with_clock(quota, config, DefaultClock::default())
    }
}

impl<C> ClientRegistry<C>
where
    C: Clock + Clone,
{
    /// Create a registry driven by a custom clock
    pub fn with_clock(quota: Quota, config: RegistryConfig, clock: C) -> Self {
        Self {
            clients: DashMap::new(),
            quota,
            clock,
            config,
            created: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Return the limiter for `identity`, creating it if absent, and record
    /// the current time as its last activity.
    pub fn touch(&self, identity: &str) -> Arc<ClientLimiter<C>> {
        self.with_entry(identity, |entry| Arc::clone(&entry.limiter))
    }

    /// Refresh `identity` and try to take one token from its bucket.
    ///
    /// The token is taken while the entry is still locked, so the decision is
    /// always made against the entry that is live in the map.
    pub fn try_acquire(&self, identity: &str) -> bool {
        self.with_entry(identity, |entry| entry.limiter.check().is_ok())
    }

    fn with_entry<R>(&self, identity: &str, f: impl FnOnce(&ClientEntry<C>) -> R) -> R {
        let now = self.clock.now();

        if let Some(mut entry) = self.clients.get_mut(identity) {
            entry.last_seen = now;
            return f(entry.value());
        }

        let mut entry = self
            .clients
            .entry(identity.to_owned())
            .or_insert_with(|| {
                self.created.fetch_add(1, Ordering::Relaxed);
                debug!(client = identity, "tracking new client");
                ClientEntry {
                    limiter: Arc::new(RateLimiter::direct_with_clock(
                        self.quota,
                        self.clock.clone(),
                    )),
                    last_seen: now,
                }
            });
        entry.last_seen = now;
        f(entry.value())
    }

    /// Remove every entry idle for longer than the staleness window.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let stale_after = self.config.stale_after;
        let mut removed = 0;

        self.clients.retain(|_, entry| {
            let idle = Duration::from(now.duration_since(entry.last_seen));
            let keep = idle <= stale_after;
            if !keep {
                removed += 1;
            }
            keep
        });

        self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Whether `identity` currently has an entry
    pub fn contains(&self, identity: &str) -> bool {
        self.clients.contains_key(identity)
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no identity is tracked
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Current counters
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            tracked: self.clients.len(),
            created: self.created.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Eviction settings
    pub fn config(&self) -> RegistryConfig {
        self.config
    }
}

impl<C> ClientRegistry<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Run the eviction sweep every `sweep_interval` until the process leaves
    /// the running state.
    pub fn spawn_sweeper(self: Arc<Self>, mut lifecycle: watch::Receiver<ShutdownState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            debug!(removed, tracked = self.len(), "evicted idle clients");
                        }
                    }
                    _ = lifecycle.wait_for(|state| *state != ShutdownState::Running) => break,
                }
            }

            info!(stats = ?self.stats(), "client sweeper stopped");
        })
    }
}
