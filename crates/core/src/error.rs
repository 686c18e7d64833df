/// Top-level error type for a conversion. Every stage error converts into it.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("Navigation nesting depth {depth} exceeds limit of {limit}")]
    ExcessiveNesting { depth: u32, limit: u32 },

    #[error("DRM protected container ({drm_type})")]
    DrmProtected { drm_type: String },
}

/// Failures of the markup parser collaborator.
#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Element <{0}> is never closed")]
    Unclosed(String),

    #[error("XML/HTML nesting depth {depth} exceeds limit of {limit}")]
    TooDeep { depth: u32, limit: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("No zip end-of-central-directory record found")]
    MissingEndOfCentralDirectory,

    #[error("Invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Missing archive entry: {0}")]
    MissingEntry(String),

    #[error("No package document declared in container descriptor")]
    NoRootDocument,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: MarkupError,
    },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Package document root is <{0}>, expected <package>")]
    MissingRoot(String),

    #[error("Package document has no <{0}> section")]
    MissingSection(&'static str),

    #[error("Spine has no toc attribute naming the navigation document")]
    MissingToc,

    #[error("Manifest has no item with id '{0}'")]
    DanglingReference(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("Navigation document root is <{0}>, expected <ncx>")]
    MissingRoot(String),

    #[error("Navigation document has no <navMap>")]
    MissingNavMap,

    #[error(transparent)]
    Security(#[from] SecurityError),
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("No <body> element in {0}")]
    MissingBody(String),

    #[error("No element with id '{fragment}' in {path}")]
    MissingAnchor { path: String, fragment: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Archive write failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to encode archive info: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive already holds an entry at {0}")]
    DuplicatePath(String),

    #[error("Archive finalized before its spine, TOC and metadata were set")]
    MissingInfo,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
