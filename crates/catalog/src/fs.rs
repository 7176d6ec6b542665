//! Filesystem-backed shard catalog

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::{CatalogError, Shard, ShardCatalog, ShardFilter};

/// Shard catalog over a dataset root directory.
///
/// Datasets are the directories directly under the root; shards are the
/// directories under a dataset. Non-directory entries are ignored. Results are
/// sorted so re-enumeration is deterministic.
#[derive(Clone)]
pub struct FsShardCatalog {
    root: PathBuf,
    filter: Arc<dyn ShardFilter>,
}

impl FsShardCatalog {
    /// Create a catalog over `root`, including only shards accepted by
    /// `filter`.
    pub fn new(root: impl Into<PathBuf>, filter: impl ShardFilter) -> Self {
        Self {
            root: root.into(),
            filter: Arc::new(filter),
        }
    }

    async fn list_dirs(path: &PathBuf) -> Result<Vec<String>, CatalogError> {
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| CatalogError::Io("error reading directory", e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CatalogError::Io("error reading directory entry", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CatalogError::Io("error reading entry type", e))?;
            if !file_type.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for FsShardCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsShardCatalog")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ShardCatalog for FsShardCatalog {
    type Error = CatalogError;

    async fn datasets(&self) -> Result<Vec<String>, Self::Error> {
        Self::list_dirs(&self.root).await
    }

    async fn shards(&self, dataset: &str) -> Result<Vec<Shard>, Self::Error> {
        let dataset_dir = self.root.join(dataset);
        let names = Self::list_dirs(&dataset_dir).await?;

        let shards = names
            .into_iter()
            .map(|name| Shard::new(dataset, format!("{dataset}/{name}")))
            .filter(|shard| self.filter.accept(dataset, &shard.path))
            .collect::<Vec<_>>();

        debug!("enumerated {} shards for dataset {}", shards.len(), dataset);
        Ok(shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcceptAll;

    async fn make_tree(root: &std::path::Path, layout: &[(&str, &[&str])]) {
        for (dataset, shards) in layout {
            for shard in *shards {
                fs::create_dir_all(root.join(dataset).join(shard))
                    .await
                    .unwrap();
            }
            if shards.is_empty() {
                fs::create_dir_all(root.join(dataset)).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_enumerates_datasets_and_shards() {
        let dir = tempfile::tempdir().unwrap();
        make_tree(
            dir.path(),
            &[
                ("events", &["shard.0", "shard.1"]),
                ("metrics", &["shard.0"]),
            ],
        )
        .await;

        let catalog = FsShardCatalog::new(dir.path(), AcceptAll);

        assert_eq!(catalog.datasets().await.unwrap(), vec!["events", "metrics"]);
        assert_eq!(
            catalog.shards("events").await.unwrap(),
            vec![
                Shard::new("events", "events/shard.0"),
                Shard::new("events", "events/shard.1"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ignores_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        make_tree(dir.path(), &[("events", &["shard.0"])]).await;
        fs::write(dir.path().join("events").join("MANIFEST"), b"x")
            .await
            .unwrap();
        fs::write(dir.path().join("README"), b"x").await.unwrap();

        let catalog = FsShardCatalog::new(dir.path(), AcceptAll);

        assert_eq!(catalog.datasets().await.unwrap(), vec!["events"]);
        assert_eq!(
            catalog.shards("events").await.unwrap(),
            vec![Shard::new("events", "events/shard.0")]
        );
    }

    #[tokio::test]
    async fn test_filter_excludes_shards() {
        let dir = tempfile::tempdir().unwrap();
        make_tree(dir.path(), &[("events", &["shard.0"]), ("tmp", &["shard.0"])]).await;

        let catalog = FsShardCatalog::new(dir.path(), crate::DatasetPrefix::new("events"));

        assert!(catalog.shards("tmp").await.unwrap().is_empty());
        assert_eq!(catalog.shards("events").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FsShardCatalog::new(dir.path(), AcceptAll);
        assert!(catalog.shards("vanished").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_dataset_has_no_shards() {
        let dir = tempfile::tempdir().unwrap();
        make_tree(dir.path(), &[("empty", &[])]).await;

        let catalog = FsShardCatalog::new(dir.path(), AcceptAll);
        assert!(catalog.shards("empty").await.unwrap().is_empty());
    }
}
