pub mod assemble;
pub mod chapters;
pub mod config;
pub mod container;
pub mod convert;
pub mod error;
pub mod markup;
pub mod metadata;
pub mod navigation;
pub mod package;
pub mod paths;
pub mod security;
pub mod split;
pub mod toc;
pub mod writers;

pub mod prelude {
    pub use crate::convert::{ConversionSummary, ConvertOptions, Epub};
    pub use crate::error::*;
    pub use crate::writers::{ArchiveSink, BookInfo, BookiZip};
}
