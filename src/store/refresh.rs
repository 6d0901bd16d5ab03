//! Snapshot refresh from the upstream galaxy archive
//!
//! The whole corpus is rebuilt in one pass: download the zipped galaxy
//! repository, extract the category files under the cache directory, parse
//! every non-deprecated category and atomically replace the snapshot.
//! Concurrent refreshers are serialized by an OS advisory file lock; the
//! lock is released by the OS if the holder dies, so a crashed refresher
//! cannot wedge later ones.

use crate::cluster::{Cluster, RelatedEdge};
use crate::config::{Config, UpstreamConfig};
use crate::error::{GalaxyError, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Where the archive bytes come from
///
/// Production uses HTTP; tests hand in archives built in memory.
pub trait ArchiveSource {
    fn fetch(&self) -> Result<Vec<u8>>;
}

/// Blocking HTTP download of the galaxy archive
pub struct HttpArchiveSource {
    url: String,
    timeout: Duration,
}

impl HttpArchiveSource {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            url: upstream.archive_url.clone(),
            timeout: Duration::from_secs(upstream.timeout_secs),
        }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        tracing::info!("Downloading galaxy archive from {}", self.url);
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.get(&self.url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

/// What a refresh call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot was within the freshness window, nothing fetched
    Fresh,
    /// Snapshot was rebuilt with this many clusters
    Rebuilt(usize),
    /// Rebuild failed, the previous snapshot stays in place
    KeptPrevious,
}

/// Rebuilds the local snapshot when it is absent or stale
pub struct Refresher {
    cache_dir: PathBuf,
    snapshot_path: PathBuf,
    lock_path: PathBuf,
    archive_root: String,
    max_age: Duration,
}

impl Refresher {
    pub fn new(config: &Config) -> Self {
        Self {
            cache_dir: config.cache.dir.clone(),
            snapshot_path: config.cache.snapshot_path(),
            lock_path: config.cache.lock_path(),
            archive_root: config.upstream.archive_root.clone(),
            max_age: config.cache.max_age(),
        }
    }

    /// Refresh the snapshot if it is absent or older than the freshness
    /// window; `force` rebuilds unconditionally
    ///
    /// Blocks while another refresher holds the lock, then re-checks
    /// freshness so a waiter does not fetch what the holder just wrote.
    /// An unusable cache directory is the only hard failure when a previous
    /// snapshot exists.
    pub fn refresh(&self, source: &dyn ArchiveSource, force: bool) -> Result<RefreshOutcome> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!(
                "Failed to create cache directory: {}",
                self.cache_dir.display()
            ),
        })?;

        if !force && self.is_fresh()? {
            return Ok(RefreshOutcome::Fresh);
        }

        let _guard = SnapshotLock::acquire(&self.lock_path)?;

        // another process may have refreshed while we waited on the lock
        if !force && self.is_fresh()? {
            return Ok(RefreshOutcome::Fresh);
        }

        match self.rebuild(source) {
            Ok(count) => {
                tracing::info!("Galaxy snapshot rebuilt with {} clusters", count);
                Ok(RefreshOutcome::Rebuilt(count))
            }
            Err(e) if self.snapshot_path.exists() => {
                tracing::warn!("Snapshot rebuild failed, keeping previous snapshot: {}", e);
                Ok(RefreshOutcome::KeptPrevious)
            }
            Err(e) => Err(e),
        }
    }

    fn is_fresh(&self) -> Result<bool> {
        let metadata = match fs::metadata(&self.snapshot_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(GalaxyError::Io {
                    source: e,
                    context: format!(
                        "Failed to stat snapshot: {}",
                        self.snapshot_path.display()
                    ),
                })
            }
        };
        let modified = metadata.modified().map_err(|e| GalaxyError::Io {
            source: e,
            context: format!(
                "Failed to read snapshot mtime: {}",
                self.snapshot_path.display()
            ),
        })?;
        // an mtime in the future counts as fresh
        Ok(modified
            .elapsed()
            .map(|age| age < self.max_age)
            .unwrap_or(true))
    }

    fn rebuild(&self, source: &dyn ArchiveSource) -> Result<usize> {
        let bytes = source.fetch()?;
        self.extract(&bytes)?;
        let clusters = self.parse_categories()?;
        self.write_snapshot(&clusters)?;
        Ok(clusters.len())
    }

    /// Extract the category payload of the archive under the cache directory
    fn extract(&self, bytes: &[u8]) -> Result<()> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            // enclosed_name rejects entries escaping the extraction root
            let Some(relative) = entry.enclosed_name() else {
                continue;
            };
            if !is_category_file(&relative) {
                continue;
            }
            let dest = self.cache_dir.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| GalaxyError::Io {
                    source: e,
                    context: format!("Failed to create directory: {}", parent.display()),
                })?;
            }
            let mut out = fs::File::create(&dest).map_err(|e| GalaxyError::Io {
                source: e,
                context: format!("Failed to create file: {}", dest.display()),
            })?;
            std::io::copy(&mut entry, &mut out).map_err(|e| GalaxyError::Io {
                source: e,
                context: format!("Failed to extract: {}", dest.display()),
            })?;
        }
        Ok(())
    }

    /// Parse every category into the uuid -> cluster map
    ///
    /// A category that fails to parse is skipped with a warning; the others
    /// still load. The map is ordered so the written snapshot is
    /// byte-identical across rebuilds of the same archive.
    fn parse_categories(&self) -> Result<BTreeMap<Uuid, Cluster>> {
        let clusters_dir = self.cache_dir.join(&self.archive_root).join("clusters");
        let galaxies_dir = self.cache_dir.join(&self.archive_root).join("galaxies");

        let mut category_files = Vec::new();
        let entries = fs::read_dir(&clusters_dir).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!(
                "Failed to read clusters directory: {}",
                clusters_dir.display()
            ),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| GalaxyError::Io {
                source: e,
                context: "Failed to read clusters directory entry".to_string(),
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                category_files.push(path);
            }
        }
        category_files.sort();

        let mut map = BTreeMap::new();
        for clusters_file in category_files {
            let descriptor_file = clusters_file
                .file_name()
                .map(|name| galaxies_dir.join(name))
                .unwrap_or_default();
            match parse_category(&clusters_file, &descriptor_file) {
                Ok(clusters) => {
                    for cluster in clusters {
                        map.insert(cluster.uuid, cluster);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed category {}: {}",
                        clusters_file.display(),
                        e
                    );
                }
            }
        }
        Ok(map)
    }

    /// Write the snapshot via temp file + rename, as atomic as the
    /// filesystem allows
    fn write_snapshot(&self, clusters: &BTreeMap<Uuid, Cluster>) -> Result<()> {
        let data = serde_json::to_vec(clusters).map_err(|e| GalaxyError::Json {
            source: e,
            context: "Failed to serialize snapshot".to_string(),
        })?;

        let temp_path = self.snapshot_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to create temp snapshot: {}", temp_path.display()),
        })?;
        file.write_all(&data).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to write snapshot data: {}", temp_path.display()),
        })?;
        file.sync_all().map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to sync snapshot: {}", temp_path.display()),
        })?;
        drop(file);

        fs::rename(&temp_path, &self.snapshot_path).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!(
                "Failed to rename snapshot into place: {} -> {}",
                temp_path.display(),
                self.snapshot_path.display()
            ),
        })?;
        Ok(())
    }
}

fn is_category_file(relative: &Path) -> bool {
    if relative.extension().map_or(true, |ext| ext != "json") {
        return false;
    }
    relative
        .components()
        .any(|c| c.as_os_str() == "clusters" || c.as_os_str() == "galaxies")
}

/// RAII advisory lock on the snapshot
struct SnapshotLock {
    file: fs::File,
}

impl SnapshotLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| GalaxyError::Io {
                source: e,
                context: format!("Failed to open snapshot lock: {}", path.display()),
            })?;
        file.lock_exclusive().map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to acquire snapshot lock: {}", path.display()),
        })?;
        Ok(Self { file })
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Shape of a `clusters/<category>.json` file
#[derive(Debug, serde::Deserialize)]
struct RawClusterFile {
    #[serde(rename = "type")]
    galaxy_type: String,
    values: Vec<RawClusterEntry>,
}

/// Shape of the sibling `galaxies/<category>.json` descriptor
#[derive(Debug, serde::Deserialize)]
struct RawGalaxyDescriptor {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RawClusterEntry {
    #[serde(default)]
    uuid: Option<Uuid>,
    value: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    meta: Option<RawMeta>,
    #[serde(default)]
    related: Vec<RelatedEdge>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawMeta {
    #[serde(default)]
    uuid: Vec<Uuid>,
    #[serde(default)]
    synonyms: Vec<String>,
}

impl RawClusterEntry {
    /// Identifier of the entry: top-level uuid, or the first of the
    /// multi-valued meta field, read without consuming it
    fn identifier(&self) -> Option<Uuid> {
        self.uuid
            .or_else(|| self.meta.as_ref().and_then(|m| m.uuid.first().copied()))
    }
}

/// Parse one category (cluster list + galaxy descriptor) into records
///
/// Deprecated categories are dropped wholesale; entries without an
/// identifier are skipped.
fn parse_category(clusters_file: &Path, descriptor_file: &Path) -> Result<Vec<Cluster>> {
    let list: RawClusterFile = read_json(clusters_file)?;
    let descriptor: RawGalaxyDescriptor = read_json(descriptor_file)?;

    if descriptor.namespace.as_deref() == Some("deprecated") {
        return Ok(Vec::new());
    }

    let mut clusters = Vec::new();
    for raw in list.values {
        let Some(uuid) = raw.identifier() else {
            continue;
        };
        let synonyms = raw.meta.map(|m| m.synonyms).unwrap_or_default();
        clusters.push(Cluster {
            uuid,
            tag_name: Cluster::tag_name_for(&list.galaxy_type, &raw.value),
            value: raw.value,
            description: raw.description,
            cluster_type: list.galaxy_type.clone(),
            icon: descriptor.icon.clone(),
            synonyms,
            related: raw.related,
        });
    }
    Ok(clusters)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path).map_err(|e| GalaxyError::Io {
        source: e,
        context: format!("Failed to read category file: {}", path.display()),
    })?;
    serde_json::from_slice(&content).map_err(|e| GalaxyError::Json {
        source: e,
        context: format!("Failed to parse category file: {}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GalaxyStore;
    use std::cell::Cell;
    use tempfile::TempDir;

    const ACTOR_UUID: &str = "7cdff317-a673-4474-84ec-4f1754947823";
    const TOOL_UUID: &str = "d7247cf9-13b6-4781-b789-a5f33521633b";

    struct StaticSource(Vec<u8>);

    impl ArchiveSource for StaticSource {
        fn fetch(&self) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct CountingSource {
        bytes: Vec<u8>,
        calls: Cell<usize>,
    }

    impl ArchiveSource for CountingSource {
        fn fetch(&self) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.bytes.clone())
        }
    }

    struct FailingSource;

    impl ArchiveSource for FailingSource {
        fn fetch(&self) -> Result<Vec<u8>> {
            Err(GalaxyError::Config("no network".to_string()))
        }
    }

    fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn sample_archive() -> Vec<u8> {
        let actors = format!(
            r#"{{"type": "threat-actor", "values": [
                {{"uuid": "{ACTOR_UUID}", "value": "APT28",
                  "meta": {{"synonyms": ["Sofacy", "Fancy Bear"]}},
                  "related": [{{"dest-uuid": "{TOOL_UUID}", "type": "uses"}}]}}
            ]}}"#
        );
        let tools = format!(
            r#"{{"type": "tool", "values": [
                {{"uuid": "{TOOL_UUID}", "value": "X-Agent"}}
            ]}}"#
        );
        build_archive(&[
            ("misp-galaxy-main/clusters/threat-actor.json", &actors),
            (
                "misp-galaxy-main/galaxies/threat-actor.json",
                r#"{"namespace": "misp", "icon": "user-secret"}"#,
            ),
            ("misp-galaxy-main/clusters/tool.json", &tools),
            (
                "misp-galaxy-main/galaxies/tool.json",
                r#"{"namespace": "misp", "icon": "wrench"}"#,
            ),
        ])
    }

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.cache.dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_rebuild_creates_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        let outcome = refresher
            .refresh(&StaticSource(sample_archive()), false)
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Rebuilt(2));

        let store = GalaxyStore::load(&config.cache.snapshot_path()).unwrap();
        assert_eq!(store.len(), 2);

        let actor = store.get(&ACTOR_UUID.parse().unwrap()).unwrap();
        assert_eq!(actor.value, "APT28");
        assert_eq!(actor.tag_name, "misp-galaxy:threat-actor=\"APT28\"");
        assert_eq!(actor.icon.as_deref(), Some("user-secret"));
        assert_eq!(actor.synonyms, vec!["Sofacy", "Fancy Bear"]);
        assert_eq!(actor.related.len(), 1);
    }

    #[test]
    fn test_deprecated_category_dropped() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        let archive = build_archive(&[
            (
                "misp-galaxy-main/clusters/old.json",
                r#"{"type": "old", "values": [
                    {"uuid": "11111111-1111-1111-1111-111111111111", "value": "Relic"}
                ]}"#,
            ),
            (
                "misp-galaxy-main/galaxies/old.json",
                r#"{"namespace": "deprecated"}"#,
            ),
        ]);
        let outcome = refresher.refresh(&StaticSource(archive), false).unwrap();
        assert_eq!(outcome, RefreshOutcome::Rebuilt(0));
    }

    #[test]
    fn test_malformed_category_skips_only_itself() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        let tools = format!(
            r#"{{"type": "tool", "values": [{{"uuid": "{TOOL_UUID}", "value": "X-Agent"}}]}}"#
        );
        let archive = build_archive(&[
            ("misp-galaxy-main/clusters/broken.json", "{not json"),
            (
                "misp-galaxy-main/galaxies/broken.json",
                r#"{"namespace": "misp"}"#,
            ),
            ("misp-galaxy-main/clusters/tool.json", &tools),
            (
                "misp-galaxy-main/galaxies/tool.json",
                r#"{"namespace": "misp"}"#,
            ),
        ]);
        let outcome = refresher.refresh(&StaticSource(archive), false).unwrap();
        assert_eq!(outcome, RefreshOutcome::Rebuilt(1));
    }

    #[test]
    fn test_entry_identifier_from_meta_is_nondestructive() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        let archive = build_archive(&[
            (
                "misp-galaxy-main/clusters/tagged.json",
                r#"{"type": "tool", "values": [
                    {"value": "Implant",
                     "meta": {"uuid": ["22222222-2222-2222-2222-222222222222",
                                       "33333333-3333-3333-3333-333333333333"]}}
                ]}"#,
            ),
            (
                "misp-galaxy-main/galaxies/tagged.json",
                r#"{"namespace": "misp"}"#,
            ),
        ]);
        refresher.refresh(&StaticSource(archive), false).unwrap();

        let store = GalaxyStore::load(&config.cache.snapshot_path()).unwrap();
        let uuid: Uuid = "22222222-2222-2222-2222-222222222222".parse().unwrap();
        assert_eq!(store.get(&uuid).unwrap().value, "Implant");
    }

    #[test]
    fn test_fresh_snapshot_skips_fetch() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        let source = CountingSource {
            bytes: sample_archive(),
            calls: Cell::new(0),
        };
        refresher.refresh(&source, false).unwrap();
        assert_eq!(source.calls.get(), 1);

        let outcome = refresher.refresh(&source, false).unwrap();
        assert_eq!(outcome, RefreshOutcome::Fresh);
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn test_forced_rebuild_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        refresher
            .refresh(&StaticSource(sample_archive()), false)
            .unwrap();
        let first = fs::read(config.cache.snapshot_path()).unwrap();

        refresher
            .refresh(&StaticSource(sample_archive()), true)
            .unwrap();
        let second = fs::read(config.cache.snapshot_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fetch_failure_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        refresher
            .refresh(&StaticSource(sample_archive()), false)
            .unwrap();
        let before = fs::read(config.cache.snapshot_path()).unwrap();

        let outcome = refresher.refresh(&FailingSource, true).unwrap();
        assert_eq!(outcome, RefreshOutcome::KeptPrevious);

        let after = fs::read(config.cache.snapshot_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_fetch_failure_without_snapshot_errors() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let refresher = Refresher::new(&config);

        assert!(refresher.refresh(&FailingSource, false).is_err());
    }
}
