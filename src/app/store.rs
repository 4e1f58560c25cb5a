use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::formats::{MonitoredTarget, PageVersion};

#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Returns the target registered for `url`, creating it if needed.
    async fn register(&self, url: &str) -> anyhow::Result<MonitoredTarget>;
    async fn get(&self, target_id: &str) -> anyhow::Result<Option<MonitoredTarget>>;
    async fn find_by_url(&self, url: &str) -> anyhow::Result<Option<MonitoredTarget>>;
    async fn list(&self) -> anyhow::Result<Vec<MonitoredTarget>>;
    async fn put(&self, target: &MonitoredTarget) -> anyhow::Result<()>;
    async fn append_version(&self, version: &PageVersion) -> anyhow::Result<()>;
    /// Appends `version` and saves `target` as one unit: when the target
    /// cannot be saved the version is removed again.
    async fn commit_change(
        &self,
        target: &MonitoredTarget,
        version: &PageVersion,
    ) -> anyhow::Result<()>;
    /// Newest first.
    async fn versions(&self, target_id: &str) -> anyhow::Result<Vec<PageVersion>>;
    async fn version(
        &self,
        target_id: &str,
        version_id: &str,
    ) -> anyhow::Result<Option<PageVersion>>;
    /// Removes the target and its history. Returns whether it existed.
    async fn delete(&self, target_id: &str) -> anyhow::Result<bool>;
}

#[derive(Debug)]
pub struct LocalFsTargetStore {
    base_dir: PathBuf,
    register_lock: Mutex<()>,
}

impl LocalFsTargetStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            register_lock: Mutex::new(()),
        }
    }

    fn targets_dir(&self) -> PathBuf {
        self.base_dir.join("targets")
    }

    fn target_dir(&self, target_id: &str) -> PathBuf {
        self.targets_dir().join(target_id)
    }

    fn target_json_path(&self, target_id: &str) -> PathBuf {
        self.target_dir(target_id).join("target.json")
    }

    fn versions_dir(&self, target_id: &str) -> PathBuf {
        self.target_dir(target_id).join("versions")
    }

    fn version_json_path(&self, version: &PageVersion) -> PathBuf {
        let stamp = version.created_at.format("%Y%m%dT%H%M%S%.6fZ");
        self.versions_dir(&version.target_id)
            .join(format!("{stamp}-{}.json", version.version_id))
    }

    /// Fails unless `target_id` names a registered target.
    async fn ensure_registered(&self, target_id: &str) -> anyhow::Result<()> {
        anyhow::ensure!(is_record_id(target_id), "invalid target id: {target_id:?}");
        let path = self.target_json_path(target_id);
        let exists = fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?;
        anyhow::ensure!(exists, "target not found: {target_id}");
        Ok(())
    }
}

#[async_trait]
impl TargetStore for LocalFsTargetStore {
    async fn register(&self, url: &str) -> anyhow::Result<MonitoredTarget> {
        let _guard = self.register_lock.lock().await;
        if let Some(existing) = self.find_by_url(url).await? {
            return Ok(existing);
        }

        let target = MonitoredTarget::new(url);
        write_json_atomic(&self.target_json_path(&target.id), &target)
            .await
            .context("save new target")?;
        tracing::info!(target_id = %target.id, url, "registered target");
        Ok(target)
    }

    async fn get(&self, target_id: &str) -> anyhow::Result<Option<MonitoredTarget>> {
        if !is_record_id(target_id) {
            return Ok(None);
        }
        let path = self.target_json_path(target_id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn find_by_url(&self, url: &str) -> anyhow::Result<Option<MonitoredTarget>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|target| target.url == url))
    }

    async fn list(&self) -> anyhow::Result<Vec<MonitoredTarget>> {
        let dir = self.targets_dir();
        let mut targets = Vec::new();
        for entry_path in list_dir(&dir).await? {
            let path = entry_path.join("target.json");
            let target: Option<MonitoredTarget> = read_json(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?;
            targets.extend(target);
        }
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(targets)
    }

    async fn put(&self, target: &MonitoredTarget) -> anyhow::Result<()> {
        self.ensure_registered(&target.id).await?;
        write_json_atomic(&self.target_json_path(&target.id), target)
            .await
            .context("write target.json")?;
        Ok(())
    }

    async fn append_version(&self, version: &PageVersion) -> anyhow::Result<()> {
        anyhow::ensure!(
            is_record_id(&version.version_id),
            "invalid version id: {:?}",
            version.version_id
        );
        self.ensure_registered(&version.target_id).await?;
        write_json_atomic(&self.version_json_path(version), version)
            .await
            .context("write version json")?;
        Ok(())
    }

    async fn commit_change(
        &self,
        target: &MonitoredTarget,
        version: &PageVersion,
    ) -> anyhow::Result<()> {
        self.append_version(version).await?;
        if let Err(err) = self.put(target).await {
            let path = self.version_json_path(version);
            if let Err(cleanup_err) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), ?cleanup_err, "remove orphaned version");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn versions(&self, target_id: &str) -> anyhow::Result<Vec<PageVersion>> {
        if !is_record_id(target_id) {
            return Ok(Vec::new());
        }
        let dir = self.versions_dir(target_id);
        let mut versions = Vec::new();
        for path in list_dir(&dir).await? {
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let version: Option<PageVersion> = read_json(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?;
            versions.extend(version);
        }
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version_id.cmp(&a.version_id))
        });
        Ok(versions)
    }

    async fn version(
        &self,
        target_id: &str,
        version_id: &str,
    ) -> anyhow::Result<Option<PageVersion>> {
        Ok(self
            .versions(target_id)
            .await?
            .into_iter()
            .find(|version| version.version_id == version_id))
    }

    async fn delete(&self, target_id: &str) -> anyhow::Result<bool> {
        if !is_record_id(target_id) {
            return Ok(false);
        }
        let dir = self.target_dir(target_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove: {}", dir.display())),
        }
    }
}

/// Ids are simple-format uuids: 32 lowercase hex digits.
fn is_record_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Entries of `dir`, sorted by path. A missing directory is empty.
async fn list_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read dir: {}", dir.display())),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read dir entry: {}", dir.display()))?
    {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
