//! The materialized chart and dimension state.
//!
//! This mirrors what the emission layer currently has on screen: which
//! chart instances and dimensions exist and when each was last fed. The
//! planner is the only writer and only mutates it while committing a
//! successful cycle, so an aborted cycle leaves the mirror untouched.

use std::collections::BTreeMap;

use chartgen_template::Lifecycle;

/// All materialized chart instances, keyed by chart ID.
#[derive(Debug, Default)]
pub(crate) struct MaterializedState {
    pub charts: BTreeMap<String, ChartState>,
    /// The build sequence of the last committed plan; zero before the
    /// first one.
    pub last_seq: u64,
}

/// One materialized chart instance.
#[derive(Debug)]
pub(crate) struct ChartState {
    /// The template (or synthetic fallback) chart that produced it.
    pub template_id: String,
    pub lifecycle: Lifecycle,
    /// The build sequence this instance last received a value in.
    pub last_seen_seq: u64,
    pub dims: BTreeMap<String, DimState>,
}

/// One materialized dimension.
#[derive(Debug)]
pub(crate) struct DimState {
    pub last_seen_seq: u64,
}

/// Decides whether something last fed at `last_seen_seq` has gone
/// unobserved long enough to expire at `current_seq`.
///
/// `expire_after_cycles` of zero disables expiry; so does a last-seen
/// sequence of zero, which means "never fed".
pub fn should_expire(last_seen_seq: u64, current_seq: u64, expire_after_cycles: u64) -> bool {
    expire_after_cycles > 0
        && last_seen_seq > 0
        && current_seq > last_seen_seq
        && current_seq - last_seen_seq >= expire_after_cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundaries() {
        // Removed on the first cycle that completes the quota.
        assert!(!should_expire(10, 14, 5));
        assert!(should_expire(10, 15, 5));
        assert!(should_expire(10, 16, 5));

        // One unseen cycle suffices with a quota of one.
        assert!(!should_expire(1, 1, 1));
        assert!(should_expire(1, 2, 1));
    }

    #[test]
    fn test_zero_disables_expiry() {
        assert!(!should_expire(1, 100, 0));
        assert!(!should_expire(0, 100, 5));
    }
}
