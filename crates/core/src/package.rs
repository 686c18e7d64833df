//! Package document (OPF) parsing: namespaced metadata, manifest, spine,
//! guide, and the rename map for resources copied into the output archive.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::error::PackageError;
use crate::markup::{local_part, Element};
use crate::paths;

pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const OPF_NS: &str = "http://www.idpf.org/2007/opf";
pub const FM_NS: &str = "http://booki.cc/";

/// Media types whose documents are merged into chapters rather than copied.
pub const MARKUP_TYPES: &[&str] = &[
    "application/xhtml+xml",
    "text/html",
    "application/x-dtbncx+xml",
];

const DEPRECATED_GROUPS: &[&str] = &["dc-metadata", "x-metadata"];

/// The namespaces metadata is bucketed under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    DublinCore,
    Opf,
    FlossManuals,
    /// Any other namespace URI, or the empty string for unqualified names.
    Other(String),
}

impl Namespace {
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            DC_NS => Self::DublinCore,
            OPF_NS => Self::Opf,
            FM_NS => Self::FlossManuals,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::DublinCore => DC_NS,
            Self::Opf => OPF_NS,
            Self::FlossManuals => FM_NS,
            Self::Other(uri) => uri,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.uri())
    }
}

/// One metadata value plus the other attributes of the element it came from,
/// keyed by local attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataValue {
    pub value: String,
    pub extra: BTreeMap<String, String>,
}

impl MetadataValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NamespacedMetadata(BTreeMap<Namespace, BTreeMap<String, Vec<MetadataValue>>>);

impl NamespacedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value; repeated tags accumulate in encounter order.
    pub fn add(&mut self, ns: Namespace, tag: impl Into<String>, value: MetadataValue) {
        self.0
            .entry(ns)
            .or_default()
            .entry(tag.into())
            .or_default()
            .push(value);
    }

    pub fn get(&self, ns: &Namespace, tag: &str) -> &[MetadataValue] {
        self.0
            .get(ns)
            .and_then(|tags| tags.get(tag))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dc(&self, tag: &str) -> &[MetadataValue] {
        self.get(&Namespace::DublinCore, tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, &BTreeMap<String, Vec<MetadataValue>>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestItem {
    pub id: String,
    /// Archive path, resolved against the package directory.
    pub path: String,
    pub mimetype: String,
}

impl ManifestItem {
    pub fn is_markup(&self) -> bool {
        MARKUP_TYPES.contains(&self.mimetype.as_str())
    }

    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    by_id: HashMap<String, usize>,
}

impl Manifest {
    /// Insert an item; a repeated id replaces the earlier item in place.
    pub fn insert(&mut self, item: ManifestItem) {
        match self.by_id.get(&item.id) {
            Some(&index) => {
                warn!(id = %item.id, "manifest declares the same id twice; keeping the last");
                self.items[index] = item;
            }
            None => {
                self.by_id.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&index| &self.items[index])
    }

    /// Look up an id that some other structure refers to.
    pub fn require(&self, id: &str) -> Result<&ManifestItem, PackageError> {
        self.get(id)
            .ok_or_else(|| PackageError::DanglingReference(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.items.iter().map(|item| (&item.id, item)))
    }
}

/// Original path → `static/<name>` for every non-markup resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MediaRenameMap(BTreeMap<String, String>);

impl MediaRenameMap {
    pub fn build(manifest: &Manifest) -> Self {
        let mut map = BTreeMap::new();
        let mut taken: HashSet<String> = HashSet::new();

        for item in manifest.iter().filter(|item| !item.is_markup()) {
            if map.contains_key(&item.path) {
                continue;
            }
            let mut name = paths::basename(&item.path).to_string();
            let mut target = format!("static/{}", name);
            let mut clashed = false;
            while taken.contains(&target) {
                clashed = true;
                name.insert(0, '_');
                target = format!("static/{}", name);
            }
            if clashed {
                debug!(from = %item.path, to = %target, "renamed clashing resource");
            }
            taken.insert(target.clone());
            map.insert(item.path.clone(), target);
        }

        Self(map)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Spine {
    /// Manifest ids in reading order.
    pub items: Vec<String>,
    /// Manifest id of the navigation document.
    pub toc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideReference {
    pub href: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub metadata: NamespacedMetadata,
    pub manifest: Manifest,
    pub spine: Spine,
    #[serde(skip)]
    pub media_map: MediaRenameMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide: Option<Vec<GuideReference>>,
    #[serde(skip)]
    pub path: String,
}

impl Package {
    pub fn parse(tree: &Element, package_path: &str) -> Result<Self, PackageError> {
        if !tree.is("package") {
            return Err(PackageError::MissingRoot(tree.name.clone()));
        }
        let dir = paths::dirname(package_path);

        let metadata_el = tree
            .find_child("metadata")
            .ok_or(PackageError::MissingSection("metadata"))?;
        let manifest_el = tree
            .find_child("manifest")
            .ok_or(PackageError::MissingSection("manifest"))?;
        let spine_el = tree
            .find_child("spine")
            .ok_or(PackageError::MissingSection("spine"))?;

        let mut scope: Vec<(Option<String>, String)> = tree.namespace_decls.clone();
        let metadata = parse_metadata(metadata_el, &mut scope);
        let manifest = parse_manifest(manifest_el, dir);
        let media_map = MediaRenameMap::build(&manifest);
        let spine = parse_spine(spine_el);
        let guide = tree.find_child("guide").map(parse_guide);

        info!(
            manifest = manifest.len(),
            spine = spine.items.len(),
            media = media_map.len(),
            "parsed package document"
        );

        Ok(Self {
            metadata,
            manifest,
            spine,
            media_map,
            guide,
            path: package_path.to_string(),
        })
    }

    /// Directory the package document lives in.
    pub fn dir(&self) -> &str {
        paths::dirname(&self.path)
    }

    /// First declared Dublin-Core language, lowercased. `und` and empty
    /// values are ignored; conflicting declarations are logged.
    pub fn language(&self) -> Option<String> {
        let languages: Vec<String> = self
            .metadata
            .dc("language")
            .iter()
            .map(|v| v.value.to_lowercase())
            .filter(|lang| !lang.is_empty() && lang != "und")
            .collect();

        let first = languages.first()?;
        if languages.iter().any(|lang| lang != first) {
            warn!(?languages, "metadata declares more than one language; using the first");
        }
        Some(first.clone())
    }
}

fn parse_metadata(
    metadata: &Element,
    scope: &mut Vec<(Option<String>, String)>,
) -> NamespacedMetadata {
    let mut store = NamespacedMetadata::new();
    scope.extend(metadata.namespace_decls.iter().cloned());
    let base = scope.len();
    for child in &metadata.children {
        collect_metadata(child, scope, &mut store);
    }
    scope.truncate(base);
    store
}

fn collect_metadata(
    el: &Element,
    scope: &mut Vec<(Option<String>, String)>,
    store: &mut NamespacedMetadata,
) {
    let base = scope.len();
    scope.extend(el.namespace_decls.iter().cloned());

    if let (true, Some(name), Some(content)) = (el.is("meta"), el.get("name"), el.get("content")) {
        let (prefix, tag) = match name.split_once(':') {
            Some((prefix, tag)) => (Some(prefix), tag),
            None => (None, name),
        };
        let ns = match lookup_prefix(scope, prefix) {
            Some(uri) => Namespace::from_uri(uri),
            None => {
                let prefix = prefix.unwrap_or_default();
                warn!(prefix, name, "meta name uses an undeclared namespace prefix");
                Namespace::Other(prefix.to_string())
            }
        };
        let extra = el
            .attributes
            .iter()
            .filter(|(k, _)| k != "name" && k != "content")
            .map(|(k, v)| (local_part(k).to_string(), v.clone()))
            .collect();
        store.add(
            ns,
            tag,
            MetadataValue {
                value: content.to_string(),
                extra,
            },
        );
    } else if DEPRECATED_GROUPS.contains(&el.name.as_str()) {
        debug!(element = %el.name, "descending into deprecated metadata grouping element");
    } else {
        let ns = Namespace::from_uri(el.namespace.as_deref().unwrap_or_default());
        let value = el.text.as_deref().map(str::trim).unwrap_or_default();
        let extra = el
            .attributes
            .iter()
            .map(|(k, v)| (local_part(k).to_string(), v.clone()))
            .collect();
        store.add(
            ns,
            el.name.clone(),
            MetadataValue {
                value: value.to_string(),
                extra,
            },
        );
    }

    for child in &el.children {
        collect_metadata(child, scope, store);
    }
    scope.truncate(base);
}

fn lookup_prefix<'a>(scope: &'a [(Option<String>, String)], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn parse_manifest(manifest: &Element, dir: &str) -> Manifest {
    let mut items = Manifest::default();
    for item in manifest.children_named("item") {
        let (Some(id), Some(href)) = (item.get("id"), item.get("href")) else {
            warn!(?item.attributes, "skipping manifest item without id or href");
            continue;
        };
        items.insert(ManifestItem {
            id: id.to_string(),
            path: paths::join_path(dir, href),
            mimetype: item.get("media-type").unwrap_or_default().to_string(),
        });
    }
    items
}

fn parse_spine(spine: &Element) -> Spine {
    Spine {
        items: spine
            .children_named("itemref")
            .filter_map(|itemref| itemref.get("idref"))
            .map(str::to_string)
            .collect(),
        toc: spine.get("toc").map(str::to_string),
    }
}

fn parse_guide(guide: &Element) -> Vec<GuideReference> {
    guide
        .children_named("reference")
        .map(|r| GuideReference {
            href: r.get("href").map(str::to_string),
            kind: r.get("type").map(str::to_string),
            title: r.get("title").map(str::to_string),
        })
        .collect()
}
