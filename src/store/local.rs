use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use glob::glob;
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::Builder;
use tokio::{fs, task};
use tracing::{debug, warn};

use super::BlobStore;

/// Blob store backed by a local directory: `<root>/<container>/<path>`.
///
/// Each `put` writes its own hidden `.<name>.<random>.tmp` sibling and renames
/// it over the target, so readers never see a half-written object. Concurrent
/// writers to the same path are not coordinated; the last rename wins.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn object_path(&self, container: &str, path: &str) -> PathBuf {
        path.split('/')
            .filter(|seg| !seg.is_empty())
            .fold(self.container_dir(container), |acc, seg| acc.join(seg))
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, container: &str, path: &str) -> Result<Bytes> {
        let full = self.object_path(container, path);
        let data = fs::read(&full)
            .await
            .with_context(|| format!("reading {}/{} from {}", container, path, full.display()))?;
        debug!(container, path, bytes = data.len(), "read object");
        Ok(Bytes::from(data))
    }

    async fn put(&self, container: &str, path: &str, data: Bytes) -> Result<()> {
        let full = self.object_path(container, path);
        let parent = full
            .parent()
            .with_context(|| format!("object path {} has no parent", full.display()))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {}", parent.display()))?;

        let file_name = full
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("object path {} has no file name", full.display()))?;
        let prefix = format!(".{}.", file_name);
        let dir = parent.to_path_buf();
        let target = full.clone();
        let payload = data.clone();

        task::spawn_blocking(move || -> Result<()> {
            let mut tmp = Builder::new()
                .prefix(&prefix)
                .suffix(".tmp")
                .tempfile_in(&dir)
                .with_context(|| format!("creating temp file in {}", dir.display()))?;
            tmp.write_all(&payload)
                .with_context(|| format!("writing {}", tmp.path().display()))?;
            tmp.as_file()
                .sync_all()
                .with_context(|| format!("syncing {}", tmp.path().display()))?;
            tmp.persist(&target)
                .with_context(|| format!("renaming temp file -> {}", target.display()))?;
            Ok(())
        })
        .await
        .context("blob write task panicked")??;

        debug!(container, path, bytes = data.len(), "wrote object");
        Ok(())
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.container_dir(container);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut out = Vec::new();
        for entry in glob(&pattern).context("invalid glob pattern for blob listing")? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "cannot read glob entry");
                    continue;
                }
            };
            if !path.is_file() || is_temp(&path) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&dir) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                out.push(key);
            }
        }
        out.sort();
        Ok(out)
    }
}
