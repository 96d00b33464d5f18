// crates/control-path-transport/src/path.rs
// ============================================================================
// Module: Path-Safe File Loading
// Description: Canonicalized, scoped, size-bounded file reads.
// Purpose: Reject hostile paths before any bytes are read.
// Dependencies: std::fs, std::io
// ============================================================================

//! ## Overview
//! File loads reject empty paths, NUL bytes, and any path whose canonical
//! form still contains `..`. When an allowed directory is configured (call
//! argument or the `AST_DIRECTORY` environment variable), the canonical
//! path must be a descendant of it. Reads are capped at the caller's byte
//! limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::TransportError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Environment variable constraining artifact file loads when no explicit
/// allowed directory is passed.
pub const ALLOWED_DIRECTORY_ENV: &str = "AST_DIRECTORY";

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// Reads a file under path-safety rules and a byte limit.
///
/// # Errors
///
/// Returns [`TransportError::PathInvalid`] for empty, NUL-bearing, or
/// non-normalizable paths, [`TransportError::PathOutOfScope`] when the
/// canonical path escapes the allowed directory, and
/// [`TransportError::Failed`] for I/O errors or oversized files.
pub fn read_file_limited(
    path: &str,
    max_bytes: usize,
    allowed_directory: Option<&Path>,
) -> Result<Vec<u8>, TransportError> {
    let canonical = canonicalize_checked(path)?;
    enforce_scope(&canonical, allowed_directory)?;
    read_limited(&canonical, max_bytes)
}

/// Validates and canonicalizes a path string.
fn canonicalize_checked(path: &str) -> Result<PathBuf, TransportError> {
    if path.is_empty() {
        return Err(TransportError::PathInvalid("path is empty".to_string()));
    }
    if path.contains('\0') {
        return Err(TransportError::PathInvalid("path contains NUL bytes".to_string()));
    }
    let canonical = fs::canonicalize(path)
        .map_err(|err| TransportError::Failed(format!("unable to resolve path `{path}`: {err}")))?;
    if canonical.components().any(|part| matches!(part, Component::ParentDir)) {
        return Err(TransportError::PathInvalid(format!(
            "path `{path}` still contains `..` after canonicalization"
        )));
    }
    Ok(canonical)
}

/// Enforces the allowed-directory scope when one is configured.
fn enforce_scope(
    canonical: &Path,
    allowed_directory: Option<&Path>,
) -> Result<(), TransportError> {
    let Some(allowed) = resolve_allowed_directory(allowed_directory)? else {
        return Ok(());
    };
    if !canonical.starts_with(&allowed) {
        return Err(TransportError::PathOutOfScope(format!(
            "`{}` is not inside the allowed directory `{}`",
            canonical.display(),
            allowed.display()
        )));
    }
    Ok(())
}

/// Resolves the allowed directory from the argument or the environment.
///
/// The environment variable is read once per load call so hosts can adjust
/// it between loads without restarting.
fn resolve_allowed_directory(
    allowed_directory: Option<&Path>,
) -> Result<Option<PathBuf>, TransportError> {
    let configured = match allowed_directory {
        Some(dir) => Some(dir.to_path_buf()),
        None => env::var(ALLOWED_DIRECTORY_ENV).ok().filter(|v| !v.is_empty()).map(PathBuf::from),
    };
    let Some(configured) = configured else {
        return Ok(None);
    };
    let canonical = fs::canonicalize(&configured).map_err(|err| {
        TransportError::Failed(format!(
            "unable to resolve allowed directory `{}`: {err}",
            configured.display()
        ))
    })?;
    Ok(Some(canonical))
}

/// Reads at most `max_bytes` from a file, rejecting anything larger.
fn read_limited(path: &Path, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
    let file = File::open(path)
        .map_err(|err| TransportError::Failed(format!("unable to open file: {err}")))?;
    let limit = u64::try_from(max_bytes)
        .map_err(|_| TransportError::Failed("byte limit exceeds u64".to_string()))?
        .saturating_add(1);
    let mut buffer = Vec::new();
    file.take(limit)
        .read_to_end(&mut buffer)
        .map_err(|err| TransportError::Failed(format!("unable to read file: {err}")))?;
    if buffer.len() > max_bytes {
        return Err(TransportError::Failed(format!("file exceeds {max_bytes} bytes")));
    }
    Ok(buffer)
}
