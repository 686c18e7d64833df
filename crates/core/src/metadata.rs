//! Folds package metadata into the output archive's metadata shape:
//! namespace → tag → scheme → values.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::package::{MetadataValue, Namespace, NamespacedMetadata};

pub const DEFAULT_SERVER: &str = "www.booki.cc";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputMetadata(BTreeMap<Namespace, BTreeMap<String, BTreeMap<String, Vec<String>>>>);

impl OutputMetadata {
    pub fn push(&mut self, ns: Namespace, tag: &str, scheme: &str, value: impl Into<String>) {
        self.bucket(ns, tag)
            .entry(scheme.to_string())
            .or_default()
            .push(value.into());
    }

    /// Values under one scheme, in encounter order.
    pub fn get(&self, ns: &Namespace, tag: &str, scheme: &str) -> &[String] {
        self.0
            .get(ns)
            .and_then(|tags| tags.get(tag))
            .and_then(|schemes| schemes.get(scheme))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn schemes(&self, ns: &Namespace, tag: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        self.0.get(ns).and_then(|tags| tags.get(tag))
    }

    fn bucket(&mut self, ns: Namespace, tag: &str) -> &mut BTreeMap<String, Vec<String>> {
        self.0.entry(ns).or_default().entry(tag.to_string()).or_default()
    }
}

/// Where the primary identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdProvenance {
    /// The first Dublin-Core identifier of the source.
    Source,
    /// Made up from the output name and the conversion time.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMetadata {
    pub metadata: OutputMetadata,
    pub primary_id: String,
    pub provenance: IdProvenance,
}

pub fn merge(
    store: &NamespacedMetadata,
    source_id: Option<&str>,
    output_name: &str,
) -> MergedMetadata {
    merge_with(store, source_id, output_name, DEFAULT_SERVER, Local::now())
}

pub fn merge_with(
    store: &NamespacedMetadata,
    source_id: Option<&str>,
    output_name: &str,
    default_server: &str,
    now: DateTime<Local>,
) -> MergedMetadata {
    let mut metadata = OutputMetadata::default();
    metadata.bucket(Namespace::FlossManuals, "book");
    metadata.bucket(Namespace::FlossManuals, "server");
    metadata.0.entry(Namespace::DublinCore).or_default();

    for (ns, tags) in store.iter() {
        for (tag, values) in tags {
            for value in values {
                metadata.push(ns.clone(), tag, scheme_of(value), value.value.clone());
            }
        }
    }

    let (primary_id, provenance) = match store
        .dc("identifier")
        .first()
        .map(|v| v.value.as_str())
        .filter(|id| !id.is_empty())
    {
        Some(id) => (id.to_string(), IdProvenance::Source),
        None => (
            format!("{}-{}", output_name, now.format("%Y.%m.%d-%H.%M.%S")),
            IdProvenance::Synthesized,
        ),
    };
    if !primary_id.is_ascii() {
        warn!(%primary_id, "primary identifier is not ASCII");
    }
    info!(%primary_id, ?provenance, "selected primary identifier");

    let book = metadata.bucket(Namespace::FlossManuals, "book");
    if book.is_empty() {
        let slug: String = primary_id.chars().filter(|c| c.is_alphanumeric()).collect();
        book.insert(String::new(), vec![slug]);
    }
    let server = metadata.bucket(Namespace::FlossManuals, "server");
    if server.is_empty() {
        server.insert(String::new(), vec![default_server.to_string()]);
    }

    if let (IdProvenance::Source, Some(source_id)) = (provenance, source_id) {
        let ids = metadata.bucket(Namespace::DublinCore, "identifier");
        ids.entry(source_id.to_string())
            .or_insert_with(|| vec![primary_id.clone()]);
    }

    MergedMetadata {
        metadata,
        primary_id,
        provenance,
    }
}

/// `scheme`, else `role`, else empty.
fn scheme_of(value: &MetadataValue) -> &str {
    value
        .extra
        .get("scheme")
        .or_else(|| value.extra.get("role"))
        .map(String::as_str)
        .unwrap_or_default()
}

/// Attribution attached to every entry of the output archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credits {
    pub rightsholders: Vec<String>,
    pub contributors: Vec<String>,
}

/// Rightsholders are the creators; contributors are the creators followed
/// by the contributors.
pub fn credits(store: &NamespacedMetadata) -> Credits {
    let rightsholders: Vec<String> = store
        .dc("creator")
        .iter()
        .map(|v| v.value.clone())
        .collect();
    let contributors = rightsholders
        .iter()
        .cloned()
        .chain(store.dc("contributor").iter().map(|v| v.value.clone()))
        .collect();
    Credits {
        rightsholders,
        contributors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
    }

    fn store_with_creators() -> NamespacedMetadata {
        let mut store = NamespacedMetadata::new();
        store.add(
            Namespace::DublinCore,
            "creator",
            MetadataValue::new("Ann").with_extra("role", "aut"),
        );
        store.add(Namespace::DublinCore, "creator", MetadataValue::new("Bob"));
        store
    }

    #[test]
    fn buckets_values_by_role() {
        let merged = merge_with(&store_with_creators(), None, "out", DEFAULT_SERVER, fixed_time());
        let creators = merged
            .metadata
            .schemes(&Namespace::DublinCore, "creator")
            .unwrap();
        assert_eq!(creators.len(), 2);
        assert_eq!(creators["aut"], ["Ann"]);
        assert_eq!(creators[""], ["Bob"]);
    }

    #[test]
    fn scheme_wins_over_role() {
        let mut store = NamespacedMetadata::new();
        store.add(
            Namespace::DublinCore,
            "identifier",
            MetadataValue::new("978-0")
                .with_extra("scheme", "ISBN")
                .with_extra("role", "ignored"),
        );
        store.add(Namespace::DublinCore, "identifier", MetadataValue::new("x-1").with_extra("scheme", "ISBN"));
        let merged = merge_with(&store, None, "out", DEFAULT_SERVER, fixed_time());
        assert_eq!(
            merged.metadata.get(&Namespace::DublinCore, "identifier", "ISBN"),
            ["978-0", "x-1"]
        );
    }

    #[test]
    fn synthesizes_primary_id_without_identifier() {
        let merged = merge_with(&store_with_creators(), Some("archive.org"), "my-book", DEFAULT_SERVER, fixed_time());
        assert_eq!(merged.primary_id, "my-book-2024.03.05-07.08.09");
        assert_eq!(merged.provenance, IdProvenance::Synthesized);
        assert_eq!(
            merged.metadata.get(&Namespace::FlossManuals, "book", ""),
            ["mybook20240305070809"]
        );
        // without a source identifier the source id is not recorded
        assert_eq!(merged.metadata.get(&Namespace::DublinCore, "identifier", "archive.org"), [] as [&str; 0]);
    }

    #[test]
    fn records_source_id_reverse_lookup() {
        let mut store = NamespacedMetadata::new();
        store.add(Namespace::DublinCore, "identifier", MetadataValue::new("urn:isbn:123"));
        let merged = merge_with(&store, Some("archive.org"), "out", DEFAULT_SERVER, fixed_time());
        assert_eq!(merged.primary_id, "urn:isbn:123");
        assert_eq!(merged.provenance, IdProvenance::Source);
        assert_eq!(
            merged.metadata.get(&Namespace::DublinCore, "identifier", "archive.org"),
            ["urn:isbn:123"]
        );
        assert_eq!(merged.metadata.get(&Namespace::DublinCore, "identifier", ""), ["urn:isbn:123"]);
    }

    #[test]
    fn existing_source_bucket_is_left_alone() {
        let mut store = NamespacedMetadata::new();
        store.add(Namespace::DublinCore, "identifier", MetadataValue::new("primary"));
        store.add(
            Namespace::DublinCore,
            "identifier",
            MetadataValue::new("theirs").with_extra("scheme", "archive.org"),
        );
        let merged = merge_with(&store, Some("archive.org"), "out", DEFAULT_SERVER, fixed_time());
        assert_eq!(
            merged.metadata.get(&Namespace::DublinCore, "identifier", "archive.org"),
            ["theirs"]
        );
    }

    #[test]
    fn fills_floss_manuals_defaults() {
        let merged = merge_with(&NamespacedMetadata::new(), None, "out", "books.example.org", fixed_time());
        assert_eq!(
            merged.metadata.get(&Namespace::FlossManuals, "server", ""),
            ["books.example.org"]
        );

        let mut store = NamespacedMetadata::new();
        store.add(Namespace::FlossManuals, "server", MetadataValue::new("mine.example.org"));
        let merged = merge_with(&store, None, "out", DEFAULT_SERVER, fixed_time());
        assert_eq!(
            merged.metadata.get(&Namespace::FlossManuals, "server", ""),
            ["mine.example.org"]
        );
    }

    #[test]
    fn serializes_namespaces_as_uris() {
        let merged = merge_with(&store_with_creators(), None, "out", DEFAULT_SERVER, fixed_time());
        let json = serde_json::to_value(&merged.metadata).unwrap();
        assert_eq!(
            json["http://purl.org/dc/elements/1.1/"]["creator"]["aut"],
            serde_json::json!(["Ann"])
        );
        assert!(json["http://booki.cc/"]["book"].is_object());
    }

    #[test]
    fn credits_list_creators_then_contributors() {
        let mut store = store_with_creators();
        store.add(Namespace::DublinCore, "contributor", MetadataValue::new("Cy"));
        let credits = credits(&store);
        assert_eq!(credits.rightsholders, ["Ann", "Bob"]);
        assert_eq!(credits.contributors, ["Ann", "Bob", "Cy"]);
    }
}
