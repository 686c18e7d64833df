//! Output archive writers.

pub mod bookizip;

use serde::Serialize;

use crate::error::WriteError;
use crate::metadata::{Credits, OutputMetadata};
use crate::toc::TocNode;

pub use bookizip::BookiZip;

/// Archive-level description of a converted book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookInfo {
    /// Chapter ids in reading order.
    pub spine: Vec<String>,
    #[serde(rename = "TOC")]
    pub toc: Vec<TocNode>,
    pub metadata: OutputMetadata,
    pub version: String,
}

impl BookInfo {
    pub const VERSION: &'static str = "1";

    pub fn new(spine: Vec<String>, toc: Vec<TocNode>, metadata: OutputMetadata) -> Self {
        Self {
            spine,
            toc,
            metadata,
            version: Self::VERSION.to_string(),
        }
    }
}

/// Destination for converted entries.
pub trait ArchiveSink {
    type Output;

    /// Add one entry. `id` names it in the archive manifest, `path` is its
    /// location inside the archive.
    fn add_entry(
        &mut self,
        id: &str,
        path: &str,
        content: &[u8],
        mimetype: &str,
        credits: &Credits,
    ) -> Result<(), WriteError>;

    fn set_info(&mut self, info: BookInfo);

    fn finalize(self) -> Result<Self::Output, WriteError>
    where
        Self: Sized;
}
