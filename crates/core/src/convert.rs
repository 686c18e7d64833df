//! Conversion driver: container → package and navigation → assembled
//! document → chapters → bookizip archive.

use std::io::Write;
use std::path::Path;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use crate::assemble::{self, AssembleOptions};
use crate::chapters::{self, ChapterBreaks};
use crate::container::{Container, DocumentSource};
use crate::error::{ConvertError, PackageError};
use crate::markup::{self, Element, ParserProfile};
use crate::metadata::{self, IdProvenance, DEFAULT_SERVER};
use crate::navigation::NavTree;
use crate::package::{GuideReference, Manifest, NamespacedMetadata, Package, Spine};
use crate::paths;
use crate::security::SecurityLimits;
use crate::split::{self, Chapter};
use crate::toc::{self, chapter_url};
use crate::writers::{ArchiveSink, BookInfo, BookiZip};

/// Root attributes that do not belong in a chapter file.
const STRIPPED_ROOT_ATTRIBUTES: &[&str] = &["xmlns", "version", "xml:lang"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub info_markers: bool,
    pub strict_anchors: bool,
    /// Fallback for the FLOSS-Manuals `server` metadata.
    pub default_server: String,
    pub security: SecurityLimits,
    /// Identifier the originating system knows this book by.
    pub source_id: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            info_markers: false,
            strict_anchors: false,
            default_server: DEFAULT_SERVER.to_string(),
            security: SecurityLimits::default(),
            source_id: None,
        }
    }
}

/// What a finished conversion produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub primary_id: String,
    pub provenance: IdProvenance,
    /// Ids of the chapters written, in output order.
    pub chapters: Vec<String>,
    pub dropped_chapters: usize,
    pub media: usize,
}

/// An opened EPUB with its package and navigation documents parsed.
pub struct Epub {
    container: Container,
    pub package: Package,
    pub nav: NavTree,
    /// Archive path of the navigation document.
    pub nav_path: String,
    options: ConvertOptions,
}

#[derive(Serialize)]
struct RawDump<'a> {
    metadata: &'a NamespacedMetadata,
    manifest: &'a Manifest,
    spine: &'a Spine,
    ncx: &'a NavTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    guide: Option<&'a Vec<GuideReference>>,
}

impl Epub {
    pub fn open(bytes: Vec<u8>, options: &ConvertOptions) -> Result<Self, ConvertError> {
        let container = Container::open(bytes, &options.security)?;
        let package_path = container.resolve_root_document()?;
        let package_tree = container.get_tree(&package_path, ParserProfile::Xml)?;
        let package = Package::parse(&package_tree, &package_path)?;

        let toc_id = package.spine.toc.as_deref().ok_or(PackageError::MissingToc)?;
        let nav_tree = container.get_tree_by_id(&package.manifest, toc_id, ParserProfile::Xml)?;
        let nav = NavTree::parse(&nav_tree, &options.security)?;
        let nav_path = package.manifest.require(toc_id)?.path.clone();

        info!(
            package = %package_path,
            navigation = %nav_path,
            points = nav.points().len(),
            "opened epub"
        );

        Ok(Self {
            container,
            package,
            nav,
            nav_path,
            options: options.clone(),
        })
    }

    pub fn open_path(path: &Path, options: &ConvertOptions) -> Result<Self, ConvertError> {
        let bytes = std::fs::read(path)?;
        Self::open(bytes, options)
    }

    /// Remember the id the originating system uses for this book.
    pub fn register_source_id(&mut self, source_id: impl Into<String>) {
        self.options.source_id = Some(source_id.into());
    }

    pub fn language(&self) -> Option<String> {
        self.package.language()
    }

    /// Navigation points in document order, and the breaks each spine file holds.
    pub fn find_probable_chapters(&self) -> ChapterBreaks<'_> {
        chapters::resolve(self.nav.points(), paths::dirname(&self.nav_path))
    }

    /// Every spine document joined into one, with split markers in place.
    pub fn concat_document(&self) -> Result<Element, ConvertError> {
        let lang = self.language();
        let breaks = self.find_probable_chapters();
        let opts = AssembleOptions {
            info_markers: self.options.info_markers,
            strict_anchors: self.options.strict_anchors,
        };
        assemble::assemble(&self.container, &self.package, &breaks, lang.as_deref(), &opts)
    }

    /// Split the book into chapters and write them, the media, the TOC and
    /// the merged metadata to `sink`.
    pub fn make_bookizip<S: ArchiveSink>(
        &self,
        mut sink: S,
        output_name: &str,
    ) -> Result<(S::Output, ConversionSummary), ConvertError> {
        let doc = self.concat_document()?;
        let chapters = split::split_tree(doc);
        let total = chapters.len();
        let chapters = split::drop_empty_chapters(chapters);
        let credits = metadata::credits(&self.package.metadata);

        let mut spine = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            let id = chapter.id.clone();
            let html = markup::to_html_string(&chapter_document(chapter));
            sink.add_entry(&id, &chapter_url(&id), html.as_bytes(), "text/html", &credits)?;
            spine.push(id);
        }

        let mut media = 0;
        for item in self.package.manifest.iter().filter(|item| !item.is_markup()) {
            let Some(target) = self.package.media_map.get(&item.path) else {
                continue;
            };
            let bytes = self.container.read_entry(&item.path)?;
            sink.add_entry(&item.id, target, &bytes, &item.mimetype, &credits)?;
            media += 1;
        }

        let lang = self.language();
        let toc = toc::build(self.nav.points(), &spine, lang.as_deref());
        let merged = metadata::merge_with(
            &self.package.metadata,
            self.options.source_id.as_deref(),
            output_name,
            &self.options.default_server,
            Local::now(),
        );

        let summary = ConversionSummary {
            primary_id: merged.primary_id,
            provenance: merged.provenance,
            dropped_chapters: total - spine.len(),
            chapters: spine.clone(),
            media,
        };
        sink.set_info(BookInfo::new(spine, toc, merged.metadata));
        let output = sink.finalize()?;

        info!(
            chapters = summary.chapters.len(),
            dropped = summary.dropped_chapters,
            media = summary.media,
            "wrote bookizip"
        );
        Ok((output, summary))
    }

    /// Convert into a bookizip file at `path`. The file stem names the book
    /// when the package declares no identifier.
    pub fn write_bookizip(&self, path: &Path) -> Result<ConversionSummary, ConvertError> {
        let output_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bookizip".to_string());
        let sink = BookiZip::create(path)?;
        let (mut file, summary) = self.make_bookizip(sink, &output_name)?;
        file.flush()?;
        Ok(summary)
    }

    /// Metadata, manifest, spine, navigation and guide as pretty JSON.
    pub fn raw_json(&self) -> Result<String, ConvertError> {
        let dump = RawDump {
            metadata: &self.package.metadata,
            manifest: &self.package.manifest,
            spine: &self.package.spine,
            ncx: &self.nav,
            guide: self.package.guide.as_ref(),
        };
        Ok(serde_json::to_string_pretty(&dump)?)
    }
}

/// Turn a chapter tree into a standalone file: drop the root attributes a
/// chapter file should not carry and title it after its chapter.
fn chapter_document(chapter: Chapter) -> Element {
    let Chapter { id, title, tree, .. } = chapter;
    let mut root = tree;
    for attr in STRIPPED_ROOT_ATTRIBUTES {
        root.remove(attr);
    }
    root.namespace_decls.clear();

    if let Some(title) = title {
        if root.find_child("head").is_none() {
            root.children.insert(0, Element::new("head"));
        }
        if let Some(head) = root.children.iter_mut().find(|c| c.is("head")) {
            head.children.retain(|c| !c.is("title"));
            let mut el = Element::new("title");
            el.text = Some(title);
            head.children.insert(0, el);
        }
    } else {
        debug!(%id, "chapter has no title");
    }
    root
}
