//! Circuit breaker interceptor.
//!
//! Requests are routed to a named circuit (one per `scheme://host[:port]`) obtained
//! from a [`CircuitManager`]. The circuit decides whether the call runs and
//! records its outcome; a rejected call fails with [`Error::CircuitOpen`].
//!
//! The breaking policy belongs to the manager, and any [`CircuitManager`] can
//! be plugged in with [`CircuitBreakerOption::new`]. [`CircuitRegistry`] is only
//! the default one, used by [`CircuitBreakerOption::with_config`]. It hands out
//! [`ConsecutiveFailureBreaker`]s:
//!
//! ```text
//! Closed --(failure_threshold consecutive errors)--> Open
//! Open --(open_duration elapsed)--> HalfOpen
//! HalfOpen --(success_threshold successes)--> Closed
//! HalfOpen --(any error)--> Open
//! ```
//!
//! Only errors returned by the wrapped call count as failures; a response of
//! any status is a success.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::{Error, Interceptor, Next, Request, Response, Result};

/// The guarded call handed to a [`Circuit`].
pub type CircuitWork<'a> = BoxFuture<'a, Result<Response>>;

/// A named circuit gating calls.
pub trait Circuit: Send + Sync {
    /// Run `work` if the circuit allows it and record the outcome.
    ///
    /// A rejection must be reported as [`Error::CircuitOpen`]; errors of `work`
    /// are returned unchanged.
    fn execute<'a>(&'a self, work: CircuitWork<'a>) -> BoxFuture<'a, Result<Response>>;
}

/// Resolves circuit names to circuits.
pub trait CircuitManager: Send + Sync {
    /// The circuit called `name`, created on first use.
    fn circuit(&self, name: &str) -> Arc<dyn Circuit>;
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected immediately.
    Open,
    /// Circuit is half-open, probing whether the endpoint recovered.
    HalfOpen,
}

/// Configuration for [`ConsecutiveFailureBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration the circuit stays open before transitioning to half-open.
    pub open_duration: Duration,
    /// Number of successful requests needed to close the circuit from half-open.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the open duration.
    #[must_use]
    pub const fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

const CLOSED: u32 = 0;
const OPEN: u32 = 1;
const HALF_OPEN: u32 = 2;

/// Default [`Circuit`]: opens after a run of consecutive failures.
#[derive(Debug)]
pub struct ConsecutiveFailureBreaker {
    name: String,
    state: AtomicU32,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    // Millis since `epoch`.
    opened_at: AtomicU64,
    epoch: Instant,
    config: CircuitBreakerConfig,
}

impl ConsecutiveFailureBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: AtomicU32::new(CLOSED),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            epoch: Instant::now(),
            config,
        }
    }

    /// Circuit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn open(&self) {
        self.state.store(OPEN, Ordering::SeqCst);
        self.opened_at.store(self.now_millis(), Ordering::SeqCst);
        warn!(circuit = %self.name, "circuit opened");
    }

    fn should_allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.load(Ordering::SeqCst);
                let elapsed = Duration::from_millis(self.now_millis().saturating_sub(opened_at));
                if elapsed < self.config.open_duration {
                    return false;
                }
                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.success_count.store(0, Ordering::SeqCst);
                    debug!(circuit = %self.name, "circuit half-open");
                }
                true
            }
        }
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => self.failure_count.store(0, Ordering::SeqCst),
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.success_threshold {
                    self.state.store(CLOSED, Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    debug!(circuit = %self.name, "circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }
}

impl Circuit for ConsecutiveFailureBreaker {
    fn execute<'a>(&'a self, work: CircuitWork<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            if !self.should_allow_request() {
                debug!(circuit = %self.name, "request rejected by open circuit");
                return Err(Error::circuit_open(self.name.clone()));
            }

            let result = work.await;
            match &result {
                Ok(_) => self.record_success(),
                Err(_) => self.record_failure(),
            }
            result
        })
    }
}

/// Default [`CircuitManager`]: one [`ConsecutiveFailureBreaker`] per name.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, Arc<ConsecutiveFailureBreaker>>>,
}

impl CircuitRegistry {
    /// Create a registry whose breakers use `config`.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::default(),
        }
    }

    /// The breaker called `name`, created on first use.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Arc<ConsecutiveFailureBreaker> {
        let mut circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = circuits.entry(name.to_string()).or_insert_with(|| {
            Arc::new(ConsecutiveFailureBreaker::new(name, self.config.clone()))
        });
        Arc::clone(breaker)
    }
}

impl CircuitManager for CircuitRegistry {
    fn circuit(&self, name: &str) -> Arc<dyn Circuit> {
        self.breaker(name)
    }
}

/// Lower-cased `scheme://host[:port]` of `url`.
#[must_use]
pub fn circuit_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let key = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };
    key.to_lowercase()
}

/// Circuit breaker configuration. Disabled until a manager is set.
#[derive(Clone, Default)]
pub struct CircuitBreakerOption {
    /// Circuit source.
    pub manager: Option<Arc<dyn CircuitManager>>,
}

impl fmt::Debug for CircuitBreakerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerOption")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl CircuitBreakerOption {
    /// Take circuits from `manager`.
    #[must_use]
    pub fn new(manager: impl CircuitManager + 'static) -> Self {
        Self {
            manager: Some(Arc::new(manager)),
        }
    }

    /// Use a [`CircuitRegistry`] built from `config`.
    #[must_use]
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::new(CircuitRegistry::new(config))
    }

    /// Whether the client should install the circuit breaker interceptor.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }
}

/// Interceptor routing each call through its host's circuit.
/// See [`CircuitBreakerOption`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerInterceptor {
    option: CircuitBreakerOption,
}

impl CircuitBreakerInterceptor {
    /// Create a circuit breaker interceptor.
    #[must_use]
    pub fn new(option: CircuitBreakerOption) -> Self {
        Self { option }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let Some(manager) = &self.option.manager else {
            return next.run(request).await;
        };

        let circuit = manager.circuit(&circuit_key(request.url()));
        circuit.execute(next.run(request)).await
    }
}

impl Interceptor for CircuitBreakerInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}
