//! Reservation lifecycle (§4.9.4): the client side of "hold a slot on
//! this relay," including the renewal window and the exponential
//! backoff-with-jitter retry policy used on both initial reservation and
//! renewal failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dep_core::NodeId;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};

/// Initial and post-renewal TTL (§4.9.4).
pub const RESERVATION_TTL: Duration = Duration::from_secs(3600);
/// Renewal is attempted once the reservation has this long left.
pub const RENEWAL_WINDOW: Duration = Duration::from_secs(5 * 60);
/// After this many consecutive renewal failures, the client must
/// reconnect and re-reserve from scratch rather than keep renewing.
pub const MAX_RENEWAL_FAILURES: u32 = 3;

/// Retry policy: `base * 2^attempt` capped at `cap`, ±`jitter_fraction`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 5,
            jitter_fraction: 0.2,
        }
    }
}

/// The unjittered delay before attempt `attempt` (0-indexed), capped.
fn base_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let scaled = config.base.saturating_mul(1u32 << attempt.min(20));
    scaled.min(config.cap)
}

/// Apply ±`jitter_fraction` jitter to `delay` using `rng`.
fn with_jitter(delay: Duration, jitter_fraction: f64, rng: &mut impl Rng) -> Duration {
    let factor = 1.0 + rng.random_range(-jitter_fraction..=jitter_fraction);
    delay.mul_f64(factor.max(0.0))
}

/// Run `attempt_fn` until it succeeds or the retry budget (§4.9.4) is
/// exhausted.
pub async fn retry_with_backoff<T, F, Fut>(config: BackoffConfig, mut attempt_fn: F) -> RelayResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RelayResult<T>>,
{
    let mut rng = rand::rng();
    for attempt in 0..config.max_attempts {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 == config.max_attempts => {
                warn!(error = %e, attempts = attempt + 1, "reservation retries exhausted");
                return Err(RelayError::ReservationFailed);
            }
            Err(e) => {
                let delay = with_jitter(base_delay(&config, attempt), config.jitter_fraction, &mut rng);
                debug!(attempt, ?delay, error = %e, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(RelayError::ReservationFailed)
}

/// A client's view of its own reservation with one relay.
#[derive(Debug, Clone)]
pub struct ReservationState {
    pub relay_id: NodeId,
    pub expires_at: DateTime<Utc>,
    pub renewal_failures: u32,
}

impl ReservationState {
    pub fn new(relay_id: NodeId, ttl: Duration) -> Self {
        Self {
            relay_id,
            expires_at: Utc::now() + chrono_duration(ttl),
            renewal_failures: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True once we've entered the renewal window (§4.9.4).
    pub fn needs_renewal(&self) -> bool {
        Utc::now() >= self.expires_at - chrono_duration(RENEWAL_WINDOW)
    }

    pub fn on_renewal_success(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + chrono_duration(ttl);
        self.renewal_failures = 0;
    }

    /// Record a renewal failure. Returns `true` if the failure count has
    /// hit [`MAX_RENEWAL_FAILURES`] and the client must reconnect and
    /// re-reserve rather than keep renewing (§4.9.4).
    pub fn on_renewal_failure(&mut self) -> bool {
        self.renewal_failures += 1;
        self.renewal_failures >= MAX_RENEWAL_FAILURES
    }

    pub fn ensure_valid(&self) -> RelayResult<()> {
        if self.is_expired() {
            Err(RelayError::ReservationExpired)
        } else {
            Ok(())
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_id() -> NodeId {
        NodeId::from_public_key_bytes(&[7u8; 32])
    }

    #[test]
    fn backoff_delay_doubles_then_caps() {
        let config = BackoffConfig::default();
        assert_eq!(base_delay(&config, 0), Duration::from_secs(1));
        assert_eq!(base_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(base_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(base_delay(&config, 10), config.cap);
    }

    #[test]
    fn fresh_reservation_does_not_need_renewal() {
        let state = ReservationState::new(relay_id(), RESERVATION_TTL);
        assert!(!state.needs_renewal());
        assert!(!state.is_expired());
    }

    #[test]
    fn reservation_inside_renewal_window_needs_renewal() {
        let mut state = ReservationState::new(relay_id(), RESERVATION_TTL);
        state.expires_at = Utc::now() + chrono::Duration::seconds(60);
        assert!(state.needs_renewal());
    }

    #[test]
    fn three_consecutive_failures_trigger_reconnect() {
        let mut state = ReservationState::new(relay_id(), RESERVATION_TTL);
        assert!(!state.on_renewal_failure());
        assert!(!state.on_renewal_failure());
        assert!(state.on_renewal_failure());
    }

    #[test]
    fn successful_renewal_resets_failure_count() {
        let mut state = ReservationState::new(relay_id(), RESERVATION_TTL);
        state.on_renewal_failure();
        state.on_renewal_success(RESERVATION_TTL);
        assert_eq!(state.renewal_failures, 0);
    }

    #[tokio::test]
    async fn retry_succeeds_without_sleeping_on_first_try() {
        let config = BackoffConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            max_attempts: 3,
            jitter_fraction: 0.0,
        };
        let result: RelayResult<u32> = retry_with_backoff(config, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retry_exhausts_and_fails() {
        let config = BackoffConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_attempts: 3,
            jitter_fraction: 0.0,
        };
        let result: RelayResult<u32> =
            retry_with_backoff(config, || async { Err(RelayError::NoReservation) }).await;
        assert!(matches!(result, Err(RelayError::ReservationFailed)));
    }
}
