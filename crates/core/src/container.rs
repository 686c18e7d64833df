//! Zip container access: trailer repair, entry reads under security limits,
//! and resolution of the package document through `META-INF/container.xml`.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ContainerError, ConvertError};
use crate::markup::{self, Element, ParserProfile};
use crate::package::Manifest;
use crate::security::{self, SecurityLimits};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

const EOCD_SIGNATURE: &[u8] = b"PK\x05\x06";
const EOCD_LEN: usize = 22;

/// Anything that can hand out archive entries by path.
pub trait DocumentSource {
    fn read_entry(&self, path: &str) -> Result<Vec<u8>, ContainerError>;

    /// Deepest element nesting a parsed entry may have.
    fn max_nesting_depth(&self) -> u32 {
        markup::DEFAULT_MAX_DEPTH
    }

    /// Read one entry and parse it. Each call re-reads the entry.
    fn get_tree(&self, path: &str, profile: ParserProfile) -> Result<Element, ContainerError> {
        let bytes = self.read_entry(path)?;
        markup::parse_with_limit(&bytes, profile, self.max_nesting_depth()).map_err(|source| {
            ContainerError::Parse {
                path: path.to_string(),
                source,
            }
        })
    }

    /// Parse the entry a manifest item points at. An unknown id fails with
    /// `PackageError::DanglingReference`.
    fn get_tree_by_id(
        &self,
        manifest: &Manifest,
        id: &str,
        profile: ParserProfile,
    ) -> Result<Element, ConvertError> {
        let item = manifest.require(id)?;
        Ok(self.get_tree(&item.path, profile)?)
    }
}

pub struct Container {
    archive: ZipArchive<Cursor<Arc<[u8]>>>,
    limits: SecurityLimits,
}

impl Container {
    /// Open a container from its raw bytes. Junk after a valid
    /// end-of-central-directory record is cut off; a missing record fails.
    pub fn open(bytes: Vec<u8>, limits: &SecurityLimits) -> Result<Self, ContainerError> {
        let bytes = repair_trailer(bytes)?;
        let archive = ZipArchive::new(Cursor::new(Arc::<[u8]>::from(bytes)))?;
        security::check_file_count(archive.len() as u64, limits)?;

        let container = Self {
            archive,
            limits: limits.clone(),
        };

        if container.contains(ENCRYPTION_PATH) {
            let encryption = container.read_entry(ENCRYPTION_PATH)?;
            security::check_epub_drm(&String::from_utf8_lossy(&encryption))?;
        }

        debug!(entries = container.archive.len(), "opened container");
        Ok(container)
    }

    pub fn open_path(path: &Path, limits: &SecurityLimits) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::open(bytes, limits)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.archive.index_for_name(path).is_some()
    }

    /// Path of the package document, taken from the first `rootfile` whose
    /// media type is the package type.
    pub fn resolve_root_document(&self) -> Result<String, ContainerError> {
        let tree = self.get_tree(CONTAINER_PATH, ParserProfile::Xml)?;
        tree.descendants()
            .filter(|e| e.is("rootfile"))
            .find(|e| e.get("media-type") == Some(PACKAGE_MEDIA_TYPE))
            .and_then(|e| e.get("full-path"))
            .map(str::to_string)
            .ok_or(ContainerError::NoRootDocument)
    }
}

impl DocumentSource for Container {
    fn max_nesting_depth(&self) -> u32 {
        self.limits.max_nesting_depth
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
        security::check_path_traversal(path)?;

        // Clones share the central directory and the underlying buffer.
        let mut archive = self.archive.clone();
        let mut file = match archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(ContainerError::MissingEntry(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        security::check_resource_size(path, file.size(), &self.limits)?;

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Truncate anything after the last end-of-central-directory record and its comment.
fn repair_trailer(mut bytes: Vec<u8>) -> Result<Vec<u8>, ContainerError> {
    let start = bytes
        .windows(EOCD_SIGNATURE.len())
        .rposition(|w| w == EOCD_SIGNATURE)
        .filter(|&pos| pos + EOCD_LEN <= bytes.len())
        .or_else(|| {
            // the last signature may sit inside the junk itself
            bytes[..bytes.len().saturating_sub(EOCD_LEN)]
                .windows(EOCD_SIGNATURE.len())
                .rposition(|w| w == EOCD_SIGNATURE)
        })
        .ok_or(ContainerError::MissingEndOfCentralDirectory)?;

    let comment_len = u16::from_le_bytes([bytes[start + 20], bytes[start + 21]]) as usize;
    let end = (start + EOCD_LEN + comment_len).min(bytes.len());
    if end < bytes.len() {
        warn!(
            trailing = bytes.len() - end,
            "discarding bytes after zip end-of-central-directory record"
        );
        bytes.truncate(end);
    }
    Ok(bytes)
}
