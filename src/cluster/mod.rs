//! Galaxy cluster record model and normalization
//!
//! A cluster is one node of the mostly-static galaxy knowledge graph. Records
//! are immutable after the snapshot is built; normalization always produces a
//! fresh display-ready copy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod mappings;

pub use mappings::{icon_url, output_kind, OutputKind};

/// One outbound edge to another cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEdge {
    /// Destination cluster identifier
    #[serde(rename = "dest-uuid")]
    pub dest_uuid: Uuid,
    /// Relationship qualifier, e.g. "similar" or "uses"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// A galaxy cluster as stored in the local snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable unique identifier
    pub uuid: Uuid,
    /// Canonical display name
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Taxonomy category, e.g. "threat-actor" or "mitre-attack-pattern"
    #[serde(rename = "type")]
    pub cluster_type: String,
    /// Derived secondary lookup key: misp-galaxy:<type>="<value>"
    pub tag_name: String,
    /// Icon name carried by the galaxy descriptor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Alternate names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Outbound relation edges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedEdge>,
}

impl Cluster {
    /// Synthesize the tag form of a cluster, used as a secondary lookup key
    pub fn tag_name_for(galaxy_type: &str, value: &str) -> String {
        format!("misp-galaxy:{}=\"{}\"", galaxy_type, value)
    }

    /// Two-line display value rendered by graph consumers
    pub fn display_value(&self) -> String {
        format!("{}\n{}", self.cluster_type, self.value)
    }

    /// Produce a display-ready copy of this cluster
    ///
    /// Pure function of the record: the same cluster normalizes to the same
    /// shape no matter how often it is called. Table misses yield a missing
    /// icon or the generic galaxy kind, never an error.
    pub fn normalize(&self) -> NormalizedCluster {
        NormalizedCluster {
            uuid: self.uuid,
            value: self.value.clone(),
            cluster_type: self.cluster_type.clone(),
            description: self.description.clone(),
            synonyms: self.synonyms.join(", "),
            tag_name: self.tag_name.clone(),
            icon_url: self.icon.as_deref().and_then(icon_url),
            kind: output_kind(&self.cluster_type),
        }
    }
}

/// Display-ready projection of a cluster
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedCluster {
    pub uuid: Uuid,
    pub value: String,
    pub cluster_type: String,
    pub description: Option<String>,
    /// Comma-joined synonyms for display; the list form stays on `Cluster`
    pub synonyms: String,
    pub tag_name: String,
    pub icon_url: Option<String>,
    /// Output entity category selected from the galaxy type
    pub kind: OutputKind,
}

impl NormalizedCluster {
    pub fn display_value(&self) -> String {
        format!("{}\n{}", self.cluster_type, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cluster() -> Cluster {
        Cluster {
            uuid: Uuid::new_v4(),
            value: "APT28".to_string(),
            description: Some("Fancy Bear".to_string()),
            cluster_type: "threat-actor".to_string(),
            tag_name: Cluster::tag_name_for("threat-actor", "APT28"),
            icon: Some("user-secret".to_string()),
            synonyms: vec!["Sofacy".to_string(), "Sednit".to_string()],
            related: Vec::new(),
        }
    }

    #[test]
    fn test_tag_name_shape() {
        assert_eq!(
            Cluster::tag_name_for("tool", "Mimikatz"),
            "misp-galaxy:tool=\"Mimikatz\""
        );
    }

    #[test]
    fn test_normalize_joins_synonyms() {
        let normalized = sample_cluster().normalize();
        assert_eq!(normalized.synonyms, "Sofacy, Sednit");
        assert_eq!(normalized.kind, OutputKind::ThreatActor);
        assert!(normalized.icon_url.is_some());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let cluster = sample_cluster();
        let first = cluster.normalize();
        let second = cluster.normalize();
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.synonyms, second.synonyms);
        assert_eq!(first.tag_name, second.tag_name);
        // the source record is untouched
        assert_eq!(cluster.synonyms.len(), 2);
    }

    #[test]
    fn test_normalize_table_misses_do_not_fail() {
        let mut cluster = sample_cluster();
        cluster.cluster_type = "some-future-category".to_string();
        cluster.icon = Some("no-such-icon".to_string());
        let normalized = cluster.normalize();
        assert_eq!(normalized.kind, OutputKind::Galaxy);
        assert!(normalized.icon_url.is_none());
    }
}
