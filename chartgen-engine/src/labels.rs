//! Chart-scope label promotion.
//!
//! Per-series labels get promoted to the chart instance when every series
//! routed to that instance this cycle agrees on the value. Promotion only
//! ever narrows: the first series seeds the candidate set and later series
//! can remove candidates, never add them, so the result is independent of
//! series order.

use std::collections::BTreeSet;

use chartgen_template::{LabelPolicy, Labels, PromotionMode};

/// Reserved by the emission layer, never promoted.
const RESERVED_KEY: &str = "_collect_job";

/// Accumulates the promoted label set of one chart instance over the
/// series of a single cycle.
#[derive(Debug)]
pub(crate) struct LabelAccumulator {
    promote: Option<Vec<String>>,
    excluded: BTreeSet<String>,
    seeded: bool,
    values: Labels,
}

impl LabelAccumulator {
    pub fn new(policy: &LabelPolicy) -> Self {
        let promote = match &policy.mode {
            PromotionMode::Auto => None,
            PromotionMode::Explicit(keys) => Some(keys.clone()),
        };
        Self {
            promote,
            excluded: policy.excluded.clone(),
            seeded: false,
            values: Labels::new(),
        }
    }

    /// Additionally excludes one key, e.g. the label a dimension name was
    /// read from.
    pub fn exclude(&mut self, key: &str) {
        self.excluded.insert(key.to_owned());
        self.values.remove(key);
    }

    /// Folds one series' labels in. `identity` holds the instance-key
    /// labels, which are carried on the chart separately.
    pub fn observe(&mut self, series_labels: &Labels, identity: &Labels) {
        if !self.seeded {
            self.seeded = true;
            for (key, value) in series_labels {
                if self.qualifies(key, identity) {
                    self.values.insert(key.clone(), value.clone());
                }
            }
            return;
        }

        self.values
            .retain(|key, value| series_labels.get(key) == Some(value));
    }

    fn qualifies(&self, key: &str, identity: &Labels) -> bool {
        if key == RESERVED_KEY || identity.contains_key(key) || self.excluded.contains(key) {
            return false;
        }
        match &self.promote {
            Some(keys) => keys.iter().any(|k| k == key),
            None => true,
        }
    }

    /// The agreed-on label set.
    pub fn finish(self) -> Labels {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn auto_policy(excluded: &[&str]) -> LabelPolicy {
        LabelPolicy {
            mode: PromotionMode::Auto,
            excluded: excluded.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_promotes_the_value_intersection() {
        let mut acc = LabelAccumulator::new(&auto_policy(&[]));
        let identity = labels(&[("nic", "eth0")]);

        acc.observe(&labels(&[("nic", "eth0"), ("zone", "a"), ("speed", "1g")]), &identity);
        acc.observe(&labels(&[("nic", "eth0"), ("zone", "a"), ("speed", "10g")]), &identity);

        // zone agrees, speed diverges, nic is identity.
        assert_eq!(acc.finish(), labels(&[("zone", "a")]));
    }

    #[test]
    fn test_missing_key_in_later_series_drops_the_candidate() {
        let mut acc = LabelAccumulator::new(&auto_policy(&[]));
        let identity = Labels::new();

        acc.observe(&labels(&[("zone", "a")]), &identity);
        acc.observe(&labels(&[]), &identity);
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_keys_never_join_after_the_seed() {
        let mut acc = LabelAccumulator::new(&auto_policy(&[]));
        let identity = Labels::new();

        acc.observe(&labels(&[]), &identity);
        acc.observe(&labels(&[("zone", "a")]), &identity);
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_explicit_mode_promotes_only_listed_keys() {
        let policy = LabelPolicy {
            mode: PromotionMode::Explicit(vec!["zone".to_owned()]),
            excluded: BTreeSet::new(),
        };
        let mut acc = LabelAccumulator::new(&policy);

        acc.observe(&labels(&[("zone", "a"), ("speed", "1g")]), &Labels::new());
        assert_eq!(acc.finish(), labels(&[("zone", "a")]));
    }

    #[test]
    fn test_exclusions_and_reserved_keys() {
        let mut acc = LabelAccumulator::new(&auto_policy(&["direction"]));
        acc.exclude("le");

        acc.observe(
            &labels(&[
                ("direction", "in"),
                ("le", "1"),
                ("_collect_job", "job1"),
                ("zone", "a"),
            ]),
            &Labels::new(),
        );
        assert_eq!(acc.finish(), labels(&[("zone", "a")]));
    }
}
