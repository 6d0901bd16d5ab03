//! Projection of normalized clusters onto a host graph sink
//!
//! The store itself only ever returns plain records; this module is the thin
//! adapter that writes them onto whatever entity sink the host application
//! exposes. The CLI's text output and the tests both implement `GraphSink`.

use crate::cluster::NormalizedCluster;

/// Minimal surface of a host response builder
///
/// Property and note setters apply to the most recently added entity.
pub trait GraphSink {
    fn add_entity(&mut self, kind: &str, display_value: &str);
    fn add_property(&mut self, name: &str, display_name: &str, value: &str);
    fn set_note(&mut self, note: &str);
    fn set_icon_url(&mut self, url: &str);
    fn set_bookmark(&mut self, color: i32);
    /// Emit a user-facing informational message
    fn message(&mut self, text: &str);
}

/// Write one cluster onto the sink as a typed entity with its properties
pub fn emit_cluster(cluster: &NormalizedCluster, sink: &mut dyn GraphSink) {
    sink.add_entity(cluster.kind.entity_name(), &cluster.display_value());
    sink.add_property("uuid", "uuid", &cluster.uuid.to_string());
    sink.add_property("cluster_type", "cluster_type", &cluster.cluster_type);
    sink.add_property("cluster_value", "cluster_value", &cluster.value);
    sink.add_property("synonyms", "synonyms", &cluster.synonyms);
    sink.add_property("tag_name", "tag_name", &cluster.tag_name);
    if let Some(description) = &cluster.description {
        sink.add_property("description", "description", description);
    }
    if let Some(url) = &cluster.icon_url {
        sink.set_icon_url(url);
    }
}

/// Informational message shown when an identifier resolves to nothing
pub fn emit_lookup_miss(sink: &mut dyn GraphSink) {
    sink.message(
        "Galaxy cluster not found in the local mapping. \
         Refresh the local cache; non-public clusters are not supported.",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSink {
        entities: Vec<(String, String)>,
        properties: Vec<(String, String)>,
        icons: Vec<String>,
        messages: Vec<String>,
    }

    impl GraphSink for RecordingSink {
        fn add_entity(&mut self, kind: &str, display_value: &str) {
            self.entities.push((kind.to_string(), display_value.to_string()));
        }
        fn add_property(&mut self, name: &str, _display_name: &str, value: &str) {
            self.properties.push((name.to_string(), value.to_string()));
        }
        fn set_note(&mut self, _note: &str) {}
        fn set_icon_url(&mut self, url: &str) {
            self.icons.push(url.to_string());
        }
        fn set_bookmark(&mut self, _color: i32) {}
        fn message(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }
    }

    #[test]
    fn test_emit_cluster_writes_typed_entity() {
        let cluster = Cluster {
            uuid: Uuid::new_v4(),
            value: "APT28".to_string(),
            description: None,
            cluster_type: "threat-actor".to_string(),
            tag_name: Cluster::tag_name_for("threat-actor", "APT28"),
            icon: Some("user-secret".to_string()),
            synonyms: vec!["Sofacy".to_string()],
            related: Vec::new(),
        };

        let mut sink = RecordingSink::default();
        emit_cluster(&cluster.normalize(), &mut sink);

        assert_eq!(sink.entities.len(), 1);
        assert_eq!(sink.entities[0].0, "ThreatActor");
        assert!(sink.entities[0].1.contains("APT28"));
        assert!(sink
            .properties
            .iter()
            .any(|(name, value)| name == "synonyms" && value == "Sofacy"));
        assert_eq!(sink.icons.len(), 1);
    }

    #[test]
    fn test_lookup_miss_is_informational() {
        let mut sink = RecordingSink::default();
        emit_lookup_miss(&mut sink);
        assert_eq!(sink.messages.len(), 1);
        assert_eq!(sink.entities.len(), 0);
    }
}
