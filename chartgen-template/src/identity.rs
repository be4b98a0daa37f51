//! Chart instance identity rendering.
//!
//! Turns a chart's identity rule plus one series' label set into a stable
//! chart instance ID. Rendering is a pure function; a missing required
//! instance label means the series simply does not materialize an instance,
//! which is not an error.

use crate::program::{ChartIdentity, InstanceToken, Labels};

/// The outcome of rendering a chart identity for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedIdentity {
    /// The rendered chart instance ID.
    pub chart_id: String,
    /// The instance-key labels and their raw values, attached to the chart
    /// when it materializes.
    pub instance_labels: Labels,
}

/// Renders the chart instance ID for one series.
///
/// Explicit keys contribute in declared order, then a wildcard token adds
/// all remaining non-excluded label keys lexicographically. Keys starting
/// with `_` are reserved for the emission layer and never contribute.
/// Returns `None` when an explicit key is missing from the series' labels.
pub fn render_chart_id(identity: &ChartIdentity, labels: &Labels) -> Option<RenderedIdentity> {
    if identity.is_static() {
        return Some(RenderedIdentity {
            chart_id: identity.id_template.clone(),
            instance_labels: Labels::new(),
        });
    }

    let mut keys: Vec<&str> = Vec::new();
    let mut include_all = false;
    let mut excluded: Vec<&str> = Vec::new();

    for token in &identity.tokens {
        match token {
            InstanceToken::Key(key) => {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
            InstanceToken::IncludeAll => include_all = true,
            InstanceToken::Exclude(key) => excluded.push(key),
        }
    }

    if include_all {
        // Labels iterates in key order, which keeps the expansion
        // lexicographic without an extra sort.
        for key in labels.keys() {
            if keys.contains(&key.as_str())
                || excluded.contains(&key.as_str())
                || key.starts_with('_')
            {
                continue;
            }
            keys.push(key);
        }
    }

    let mut chart_id = identity.id_template.clone();
    let mut instance_labels = Labels::new();
    for key in keys {
        let value = labels.get(key)?;
        chart_id.push('_');
        chart_id.push_str(&sanitize_id_value(value));
        instance_labels.insert(key.to_owned(), value.clone());
    }

    Some(RenderedIdentity {
        chart_id,
        instance_labels,
    })
}

/// Replaces wire-protocol-unsafe characters in an ID fragment.
///
/// Spaces and backslashes become `_`, single quotes are stripped.
pub fn sanitize_id_value(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            ' ' | '\\' => Some('_'),
            '\'' => None,
            c => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(tokens: Vec<InstanceToken>) -> ChartIdentity {
        ChartIdentity {
            id_template: "chart".to_owned(),
            tokens,
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_static_identity() {
        let rendered = render_chart_id(&identity(vec![]), &labels(&[("a", "b")])).unwrap();
        assert_eq!(rendered.chart_id, "chart");
        assert!(rendered.instance_labels.is_empty());
    }

    #[test]
    fn test_explicit_keys_in_declared_order() {
        let id = identity(vec![
            InstanceToken::Key("zone".to_owned()),
            InstanceToken::Key("nic".to_owned()),
        ]);
        let rendered =
            render_chart_id(&id, &labels(&[("nic", "eth0"), ("zone", "a")])).unwrap();
        assert_eq!(rendered.chart_id, "chart_a_eth0");
        assert_eq!(rendered.instance_labels, labels(&[("nic", "eth0"), ("zone", "a")]));
    }

    #[test]
    fn test_missing_explicit_key_drops_series() {
        let id = identity(vec![InstanceToken::Key("nic".to_owned())]);
        assert_eq!(render_chart_id(&id, &labels(&[("zone", "a")])), None);
    }

    #[test]
    fn test_wildcard_with_exclusion() {
        let id = identity(vec![
            InstanceToken::IncludeAll,
            InstanceToken::Exclude("le".to_owned()),
        ]);
        let rendered = render_chart_id(
            &id,
            &labels(&[("service", "api"), ("zone", "a"), ("le", "1")]),
        )
        .unwrap();
        assert_eq!(rendered.chart_id, "chart_api_a");
    }

    #[test]
    fn test_wildcard_skips_reserved_keys() {
        let id = identity(vec![InstanceToken::IncludeAll]);
        let rendered = render_chart_id(
            &id,
            &labels(&[("_collect_job", "job1"), ("nic", "eth0")]),
        )
        .unwrap();
        assert_eq!(rendered.chart_id, "chart_eth0");
    }

    #[test]
    fn test_explicit_key_dedup_before_wildcard() {
        let id = identity(vec![
            InstanceToken::Key("nic".to_owned()),
            InstanceToken::Key("nic".to_owned()),
            InstanceToken::IncludeAll,
        ]);
        let rendered =
            render_chart_id(&id, &labels(&[("nic", "eth0"), ("zone", "a")])).unwrap();
        assert_eq!(rendered.chart_id, "chart_eth0_a");
    }

    #[test]
    fn test_sanitization() {
        assert_eq!(sanitize_id_value("a b"), "a_b");
        assert_eq!(sanitize_id_value(r"a\b"), "a_b");
        assert_eq!(sanitize_id_value("it's"), "its");

        let id = identity(vec![InstanceToken::Key("path".to_owned())]);
        let rendered = render_chart_id(&id, &labels(&[("path", r"C:\Program Files")])).unwrap();
        assert_eq!(rendered.chart_id, "chart_C:_Program_Files");
        // Instance labels keep the raw value.
        assert_eq!(rendered.instance_labels["path"], r"C:\Program Files");
    }
}
