use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a registered metric: a hierarchical dotted name plus an unordered set
/// of key/value tags.
///
/// Two identities are equal iff the name and the tag set match; the order in which tags
/// were attached does not matter. Untagged metrics simply carry an empty tag set.
///
/// # Example
///
/// ```
/// use meterbox::MetricId;
///
/// let a = MetricId::new("executor.submitted")
///     .with_tag("name", "scheduler")
///     .with_tag("region", "eu");
/// let b = MetricId::new("executor.submitted")
///     .with_tag("region", "eu")
///     .with_tag("name", "scheduler");
///
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetricId {
    name: Arc<str>,

    // Sorted map so that equality and hashing are insertion-order independent.
    tags: BTreeMap<Arc<str>, Arc<str>>,
}

impl MetricId {
    /// Creates an untagged identity from a metric name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            tags: BTreeMap::new(),
        }
    }

    /// Attaches one tag, replacing any previous value for the same key.
    #[must_use]
    pub fn with_tag(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.tags
            .insert(Arc::from(key.as_ref()), Arc::from(value.as_ref()));
        self
    }

    /// The metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tags, in key order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(|(key, value)| (key.as_ref(), value.as_ref()))
    }

    /// Whether this identity carries any tags.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}

impl From<&str> for MetricId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;

        if !self.tags.is_empty() {
            f.write_str("[")?;

            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }

                write!(f, "{key}={value}")?;
            }

            f.write_str("]")?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(id: &MetricId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn tag_order_does_not_affect_identity() {
        let a = MetricId::new("cache.hit.ratio")
            .with_tag("cache", "sessions")
            .with_tag("shard", "3");
        let b = MetricId::new("cache.hit.ratio")
            .with_tag("shard", "3")
            .with_tag("cache", "sessions");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_tag_values_are_different_identities() {
        let a = MetricId::new("cache.hit.ratio").with_tag("cache", "sessions");
        let b = MetricId::new("cache.hit.ratio").with_tag("cache", "tokens");

        assert_ne!(a, b);
    }

    #[test]
    fn untagged_and_tagged_are_different_identities() {
        let untagged = MetricId::new("cache.hit.ratio");
        let tagged = MetricId::new("cache.hit.ratio").with_tag("cache", "sessions");

        assert_ne!(untagged, tagged);
        assert!(!untagged.is_tagged());
        assert!(tagged.is_tagged());
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let id = MetricId::new("x").with_tag("k", "old").with_tag("k", "new");

        assert_eq!(id.tags().collect::<Vec<_>>(), vec![("k", "new")]);
    }

    #[test]
    fn display_renders_name_and_sorted_tags() {
        let id = MetricId::new("executor.submitted")
            .with_tag("name", "scheduler")
            .with_tag("az", "b");

        assert_eq!(id.to_string(), "executor.submitted[az=b,name=scheduler]");
        assert_eq!(MetricId::new("plain").to_string(), "plain");
    }

    static_assertions::assert_impl_all!(MetricId: Send, Sync);
}
