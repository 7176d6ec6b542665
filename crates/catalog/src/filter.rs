/// A pure predicate deciding catalog inclusion of a shard.
pub trait ShardFilter: Send + Sync + 'static {
    /// Whether the shard at `shard_path` of `dataset` is included.
    fn accept(&self, dataset: &str, shard_path: &str) -> bool;
}

/// Accepts every shard of every dataset.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl ShardFilter for AcceptAll {
    fn accept(&self, _dataset: &str, _shard_path: &str) -> bool {
        true
    }
}

/// Accepts shards of datasets whose name starts with a prefix.
#[derive(Clone, Debug)]
pub struct DatasetPrefix {
    prefix: String,
}

impl DatasetPrefix {
    /// Create a filter for the given dataset-name prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ShardFilter for DatasetPrefix {
    fn accept(&self, dataset: &str, _shard_path: &str) -> bool {
        dataset.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.accept("any", "any/shard"));
    }

    #[test]
    fn test_dataset_prefix() {
        let filter = DatasetPrefix::new("prod_");
        assert!(filter.accept("prod_events", "prod_events/shard.0"));
        assert!(!filter.accept("staging_events", "staging_events/shard.0"));
    }
}
