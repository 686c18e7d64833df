//! Limits applied while reading untrusted containers: entry names, sizes,
//! markup and navigation nesting, and DRM detection.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;
use crate::markup::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum number of entries allowed in an archive.
    pub max_file_count: u64,
    /// Maximum decompressed size of a single archive entry in bytes.
    pub max_resource_size_bytes: u64,
    /// Maximum element nesting of any parsed document.
    pub max_nesting_depth: u32,
    /// Maximum nesting depth of navigation points.
    pub max_nav_depth: u32,
}


impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_file_count: 10_000,
            max_resource_size_bytes: 200 * 1024 * 1024, // 200 MB
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            max_nav_depth: 1000,
        }
    }
}

/// Reject entry names that are absolute or climb out of the archive root.
pub fn check_path_traversal(entry_path: &str) -> Result<(), SecurityError> {
    let traversal = || SecurityError::PathTraversal {
        path: entry_path.to_string(),
    };

    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(traversal());
    }

    // C:\ and friends
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(traversal());
    }

    if Path::new(entry_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(traversal());
    }

    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

pub fn check_resource_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_resource_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size_bytes / (1024 * 1024),
            limit_mb: limits.max_resource_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

pub fn check_nav_depth(depth: u32, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if depth > limits.max_nav_depth {
        return Err(SecurityError::ExcessiveNesting {
            depth,
            limit: limits.max_nav_depth,
        });
    }
    Ok(())
}

/// Inspect `META-INF/encryption.xml`. Font obfuscation is allowed, anything
/// else that encrypts content is treated as DRM.
pub fn check_epub_drm(encryption_xml: &str) -> Result<(), SecurityError> {
    let drm = |drm_type: &str| SecurityError::DrmProtected {
        drm_type: drm_type.to_string(),
    };

    if encryption_xml.contains("http://ns.adobe.com/adept")
        || encryption_xml.contains("http://ns.adobe.com/digitaleditions")
    {
        return Err(drm("Adobe DRM"));
    }

    if encryption_xml.contains("http://www.apple.com/ibooks") || encryption_xml.contains("sinf") {
        return Err(drm("Apple FairPlay"));
    }

    if encryption_xml.contains("EncryptedData") {
        let is_font_obfuscation = encryption_xml.contains("http://www.idpf.org/2008/embedding")
            || encryption_xml.contains("http://ns.adobe.com/pdf/enc#RC");
        if !is_font_obfuscation {
            return Err(drm("Unknown DRM"));
        }
    }

    Ok(())
}
