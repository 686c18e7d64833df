//! Bookizip writer: stored `mimetype` first, one deflated entry per chapter or
//! resource, and `info.json` describing spine, TOC, metadata and manifest.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::WriteError;
use crate::metadata::Credits;
use crate::writers::{ArchiveSink, BookInfo};

pub const BOOKIZIP_MIMETYPE: &str = "application/x-booki+zip";
pub const INFO_PATH: &str = "info.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub url: String,
    pub mimetype: String,
    pub contributors: Vec<String>,
    pub rightsholders: Vec<String>,
}

#[derive(Serialize)]
struct InfoDocument<'a> {
    #[serde(flatten)]
    info: &'a BookInfo,
    manifest: &'a BTreeMap<String, ManifestEntry>,
}

pub struct BookiZip<W: Write + Seek> {
    zip: ZipWriter<W>,
    manifest: BTreeMap<String, ManifestEntry>,
    paths: HashSet<String>,
    info: Option<BookInfo>,
}

impl BookiZip<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, WriteError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> BookiZip<W> {
    pub fn new(writer: W) -> Result<Self, WriteError> {
        let mut zip = ZipWriter::new(writer);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("mimetype", stored)?;
        zip.write_all(BOOKIZIP_MIMETYPE.as_bytes())?;

        Ok(Self {
            zip,
            manifest: BTreeMap::new(),
            paths: HashSet::from(["mimetype".to_string(), INFO_PATH.to_string()]),
            info: None,
        })
    }

    pub fn manifest(&self) -> &BTreeMap<String, ManifestEntry> {
        &self.manifest
    }
}

impl<W: Write + Seek> ArchiveSink for BookiZip<W> {
    type Output = W;

    fn add_entry(
        &mut self,
        id: &str,
        path: &str,
        content: &[u8],
        mimetype: &str,
        credits: &Credits,
    ) -> Result<(), WriteError> {
        if !self.paths.insert(path.to_string()) {
            return Err(WriteError::DuplicatePath(path.to_string()));
        }

        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(path, deflated)?;
        self.zip.write_all(content)?;

        let entry = ManifestEntry {
            url: path.to_string(),
            mimetype: mimetype.to_string(),
            contributors: credits.contributors.clone(),
            rightsholders: credits.rightsholders.clone(),
        };
        if self.manifest.insert(id.to_string(), entry).is_some() {
            warn!(id, path, "archive manifest id reused; the later entry wins");
        }
        debug!(id, path, bytes = content.len(), "added archive entry");
        Ok(())
    }

    fn set_info(&mut self, info: BookInfo) {
        self.info = Some(info);
    }

    fn finalize(mut self) -> Result<W, WriteError> {
        let info = self.info.take().ok_or(WriteError::MissingInfo)?;
        let document = InfoDocument {
            info: &info,
            manifest: &self.manifest,
        };
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(INFO_PATH, deflated)?;
        serde_json::to_writer_pretty(&mut self.zip, &document)?;
        Ok(self.zip.finish()?)
    }
}
