//! Limits policy (§4.9.5). Default stance: don't limit. The provider's
//! physical bandwidth is the natural ceiling; operators opt into tighter
//! limits rather than the other way around.

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy)]
pub struct LimitsPolicy {
    /// Bytes/sec per circuit. `0` means unbounded.
    pub max_bandwidth: u64,
    pub max_connections: usize,
    /// `0` means unbounded.
    pub max_connections_per_peer: usize,
    /// `0` means no idle cutoff.
    pub idle_timeout_secs: u64,
}

impl Default for LimitsPolicy {
    fn default() -> Self {
        Self {
            max_bandwidth: 0,
            max_connections: 1024,
            max_connections_per_peer: 0,
            idle_timeout_secs: 0,
        }
    }
}

impl LimitsPolicy {
    pub fn check_connection_budget(&self, active_connections: usize) -> RelayResult<()> {
        if self.max_connections != 0 && active_connections >= self.max_connections {
            return Err(RelayError::ConnectionLimitReached);
        }
        Ok(())
    }

    pub fn check_per_peer_budget(&self, peer_connections: usize) -> RelayResult<()> {
        if self.max_connections_per_peer != 0 && peer_connections >= self.max_connections_per_peer {
            return Err(RelayError::ConnectionLimitReached);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_unbounded_except_total_connections() {
        let limits = LimitsPolicy::default();
        assert_eq!(limits.max_bandwidth, 0);
        assert_eq!(limits.max_connections, 1024);
        assert_eq!(limits.max_connections_per_peer, 0);
        assert_eq!(limits.idle_timeout_secs, 0);
    }

    #[test]
    fn connection_budget_is_enforced_at_the_configured_ceiling() {
        let limits = LimitsPolicy { max_connections: 2, ..LimitsPolicy::default() };
        assert!(limits.check_connection_budget(1).is_ok());
        assert!(matches!(limits.check_connection_budget(2), Err(RelayError::ConnectionLimitReached)));
    }

    #[test]
    fn zero_means_unbounded() {
        let limits = LimitsPolicy { max_connections: 0, ..LimitsPolicy::default() };
        assert!(limits.check_connection_budget(1_000_000).is_ok());
    }
}
