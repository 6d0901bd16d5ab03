//! Local galaxy cluster store
//!
//! An explicit context object holding the uuid -> cluster map loaded from the
//! JSON snapshot under the cache directory. The store is read-only once
//! loaded; refresh rebuilds the snapshot wholesale and a new store is opened
//! to pick it up.

use crate::cluster::Cluster;
use crate::config::Config;
use crate::error::{GalaxyError, Result};
use ahash::AHashMap;
use std::path::Path;
use uuid::Uuid;

mod refresh;
mod search;

pub use refresh::{ArchiveSource, HttpArchiveSource, RefreshOutcome, Refresher};
pub use search::WildcardPattern;

/// The lookup keys a caller may hand us, tried in declaration order
#[derive(Debug, Clone, Default)]
pub struct ClusterSelector {
    pub uuid: Option<Uuid>,
    pub tag_name: Option<String>,
    pub name: Option<String>,
}

/// In-memory view of the galaxy snapshot
pub struct GalaxyStore {
    clusters: AHashMap<Uuid, Cluster>,
    tag_index: AHashMap<String, Uuid>,
}

impl GalaxyStore {
    /// Open the store, refreshing the snapshot from the upstream archive if
    /// it is absent or stale
    pub fn open(config: &Config) -> Result<Self> {
        let source = HttpArchiveSource::new(&config.upstream);
        Self::open_with_source(config, &source)
    }

    /// Open the store with an explicit archive source (used by tests)
    pub fn open_with_source(config: &Config, source: &dyn ArchiveSource) -> Result<Self> {
        let refresher = Refresher::new(config);
        match refresher.refresh(source, false) {
            Ok(outcome) => tracing::debug!("Snapshot state: {:?}", outcome),
            // fail open: a stale snapshot still answers lookups
            Err(e) => tracing::warn!("Snapshot refresh failed, using previous data: {}", e),
        }
        Self::load(&config.cache.snapshot_path())
    }

    /// Load the store from an existing snapshot without refreshing
    ///
    /// A missing or corrupt snapshot degrades to an empty store; only an
    /// unreadable file propagates as an error.
    pub fn load(snapshot_path: &Path) -> Result<Self> {
        let clusters: AHashMap<Uuid, Cluster> = match std::fs::read(snapshot_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Snapshot is corrupt, starting empty: {}", e);
                    AHashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "No snapshot at {}, starting empty",
                    snapshot_path.display()
                );
                AHashMap::new()
            }
            Err(e) => {
                return Err(GalaxyError::Io {
                    source: e,
                    context: format!("Failed to read snapshot: {}", snapshot_path.display()),
                })
            }
        };

        let tag_index = clusters
            .values()
            .map(|c| (c.tag_name.clone(), c.uuid))
            .collect();

        Ok(Self {
            clusters,
            tag_index,
        })
    }

    /// Number of clusters in the store
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Look up a cluster by identifier
    pub fn get(&self, uuid: &Uuid) -> Option<&Cluster> {
        self.clusters.get(uuid)
    }

    /// Look up a cluster by its derived tag name
    pub fn get_by_tag(&self, tag: &str) -> Option<&Cluster> {
        self.tag_index.get(tag).and_then(|uuid| self.get(uuid))
    }

    /// Resolve a selector: uuid first, then tag name, then display name
    /// (names are matched against the tag index the same way tags are)
    pub fn resolve(&self, selector: &ClusterSelector) -> Option<&Cluster> {
        if let Some(uuid) = &selector.uuid {
            return self.get(uuid);
        }
        if let Some(tag) = &selector.tag_name {
            return self.get_by_tag(tag);
        }
        if let Some(name) = &selector.name {
            return self.get_by_tag(name);
        }
        None
    }

    /// Iterate over every cluster
    pub fn all(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Lazily yield clusters matching a wildcard keyword
    ///
    /// A record matching via several synonyms is yielded once per synonym;
    /// callers dedup if they need to.
    pub fn search<'a>(&'a self, keyword: &str) -> impl Iterator<Item = &'a Cluster> + 'a {
        let pattern = WildcardPattern::parse(keyword);
        self.clusters
            .values()
            .flat_map(move |c| std::iter::repeat(c).take(pattern.match_count(c)))
    }

    /// Lazily yield every cluster declaring an outbound edge to `uuid`
    pub fn relating_to<'a>(&'a self, uuid: &Uuid) -> impl Iterator<Item = &'a Cluster> + 'a {
        let uuid = *uuid;
        self.clusters
            .values()
            .filter(move |c| c.related.iter().any(|edge| edge.dest_uuid == uuid))
    }

    /// One hop of graph expansion in both directions: resolvable outbound
    /// edges first, then clusters pointing back at this one
    pub fn neighbors(&self, cluster: &Cluster) -> Vec<&Cluster> {
        let mut found: Vec<&Cluster> = cluster
            .related
            .iter()
            .filter_map(|edge| self.get(&edge.dest_uuid))
            .collect();
        found.extend(self.relating_to(&cluster.uuid));
        found
    }
}
