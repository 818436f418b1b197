//! Path Validation module for blob names and local image paths
//!
//! Blob names arrive from HTTP clients and end up as file names inside the
//! store's directories, so every name is reduced to a single safe path
//! component before use:
//!
//! - Directory components and traversal sequences are removed
//! - Only ASCII letters, digits, `.`, `_` and `-` survive sanitizing
//! - Reserved device names (CON, PRN, ...) are rejected
//! - Only allow-listed image extensions are accepted
//!
//! ## Usage Examples
//!
//! ```rust
//! use otsu_relay::path_validation::{processed_name, secure_filename};
//!
//! assert_eq!(secure_filename("../../etc/my scan.png"), "etc_my_scan.png");
//! assert_eq!(processed_name("scan.png"), "otsu_scan.png");
//! assert_eq!(processed_name("otsu_scan.png"), "otsu_scan.png");
//! ```

use std::path::Path;

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// Path contains dangerous traversal sequences (..)
    PathTraversal,
    /// Path contains null bytes
    NullByte,
    /// Name contains separators or invalid characters
    InvalidCharacters,
    /// Filename is too long
    FilenameTooLong,
    /// Filename uses reserved name
    ReservedName,
    /// Extension is not one of the accepted image types
    DisallowedExtension(String),
    /// Empty path provided
    EmptyPath,
    /// Path does not exist
    NotFound(String),
    /// Path exists but is not a regular file
    NotAFile(String),
}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed filename length (255 bytes on most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Prefix that marks a blob as processed
pub const PROCESSED_PREFIX: &str = "otsu_";

/// Image extensions accepted by the store
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Reserved filenames that should not be used (Windows compatibility)
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9._-]` is dropped and leading/trailing `.`/`_` are
/// trimmed. Returns `"unnamed_file"` when nothing survives.
///
/// # Examples
///
/// ```rust
/// use otsu_relay::path_validation::secure_filename;
///
/// assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
/// assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
/// assert_eq!(secure_filename("..."), "unnamed_file");
/// ```
pub fn secure_filename(filename: &str) -> String {
    let separated = filename.replace(['/', '\\'], " ");
    let joined = separated.split_whitespace().collect::<Vec<_>>().join("_");

    let mut sanitized: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    sanitized = sanitized.trim_matches(|c| c == '.' || c == '_').to_string();

    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    // Limit length, preserving the extension
    if sanitized.len() > MAX_FILENAME_LENGTH {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let name = &sanitized[..dot_pos];
            let ext = &sanitized[dot_pos..];
            let max_name_len = MAX_FILENAME_LENGTH.saturating_sub(ext.len());
            sanitized = format!("{}{}", &name[..max_name_len.min(name.len())], ext);
        } else {
            sanitized.truncate(MAX_FILENAME_LENGTH);
        }
    }

    sanitized
}

/// Lower-cased extension of a filename, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Check that `filename` has one of the `allowed` extensions (case-insensitive).
pub fn has_allowed_extension<S: AsRef<str>>(filename: &str, allowed: &[S]) -> bool {
    match extension_of(filename) {
        Some(ext) => allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Name under which a processed blob is stored.
///
/// Adds [`PROCESSED_PREFIX`] unless the name already carries it, so
/// re-processing an already processed blob does not stack prefixes.
pub fn processed_name(filename: &str) -> String {
    if filename.starts_with(PROCESSED_PREFIX) {
        filename.to_string()
    } else {
        format!("{}{}", PROCESSED_PREFIX, filename)
    }
}

/// Validate a name used to look up a stored blob.
///
/// Unlike [`secure_filename`] this does not rewrite anything: a lookup name
/// must already be a single safe component.
pub fn validate_blob_name(name: &str) -> PathValidationResult<()> {
    if name.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if name.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if contains_path_traversal(name) {
        return Err(PathValidationError::PathTraversal);
    }

    if name.contains('/') || name.contains('\\') {
        return Err(PathValidationError::InvalidCharacters);
    }

    validate_filename(name)
}

/// Check if a path contains path traversal sequences
fn contains_path_traversal(path: &str) -> bool {
    if path.contains("..") {
        for component in Path::new(path).components() {
            if let std::path::Component::ParentDir = component {
                return true;
            }
        }
        if path == ".." {
            return true;
        }
    }

    // Check for encoded traversal (URL encoded)
    let lowered = path.to_ascii_lowercase();
    lowered.contains("%2e%2e") || lowered.contains("%2f") || lowered.contains("%5c")
}

/// Validate a filename for security issues
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }

    if filename.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    // Check for reserved names (case-insensitive)
    let filename_upper = filename.to_uppercase();
    let name_without_ext = filename_upper.split('.').next().unwrap_or("");

    if RESERVED_NAMES.contains(&name_without_ext) {
        return Err(PathValidationError::ReservedName);
    }

    if filename
        .chars()
        .any(|c| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    Ok(())
}

/// Check that a local path names an existing regular file.
pub fn validate_path_for_reading(path: &Path) -> PathValidationResult<()> {
    if path.as_os_str().is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if !path.exists() {
        return Err(PathValidationError::NotFound(path.display().to_string()));
    }

    if !path.is_file() {
        return Err(PathValidationError::NotAFile(path.display().to_string()));
    }

    Ok(())
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::PathTraversal => {
                write!(f, "Path contains directory traversal sequences")
            }
            PathValidationError::NullByte => write!(f, "Path contains null bytes"),
            PathValidationError::InvalidCharacters => write!(f, "Path contains invalid characters"),
            PathValidationError::FilenameTooLong => write!(f, "Filename is too long"),
            PathValidationError::ReservedName => write!(f, "Filename uses reserved name"),
            PathValidationError::DisallowedExtension(ext) => {
                write!(f, "File type not allowed: '{}'", ext)
            }
            PathValidationError::EmptyPath => write!(f, "Path is empty"),
            PathValidationError::NotFound(path) => write!(f, "No image found at {}", path),
            PathValidationError::NotAFile(path) => write!(f, "{} is not a regular file", path),
        }
    }
}

impl std::error::Error for PathValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("safe_file.jpg"), "safe_file.jpg");
        assert_eq!(secure_filename("file with spaces.jpg"), "file_with_spaces.jpg");
        assert_eq!(secure_filename("unsafe<name>.jpg"), "unsafename.jpg");
        assert_eq!(secure_filename("C:\\Users\\me\\scan.png"), "C_Users_me_scan.png");
        assert_eq!(secure_filename(".hidden.png"), "hidden.png");
        assert_eq!(secure_filename(""), "unnamed_file");
        assert_eq!(secure_filename("ñ"), "unnamed_file");
    }

    #[test]
    fn test_secure_filename_length_limit() {
        let long = format!("{}.png", "a".repeat(MAX_FILENAME_LENGTH + 20));
        let sanitized = secure_filename(&long);
        assert_eq!(sanitized.len(), MAX_FILENAME_LENGTH);
        assert!(sanitized.ends_with(".png"));
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("scan.PNG", DEFAULT_ALLOWED_EXTENSIONS));
        assert!(has_allowed_extension("scan.jpeg", DEFAULT_ALLOWED_EXTENSIONS));
        assert!(!has_allowed_extension("scan.bmp", DEFAULT_ALLOWED_EXTENSIONS));
        assert!(!has_allowed_extension("scan", DEFAULT_ALLOWED_EXTENSIONS));
    }

    #[test]
    fn test_processed_name_is_idempotent() {
        let once = processed_name("scan.png");
        assert_eq!(once, "otsu_scan.png");
        assert_eq!(processed_name(&once), once);
    }

    #[test]
    fn test_validate_blob_name() {
        assert!(validate_blob_name("abc_scan.png").is_ok());
        assert_eq!(
            validate_blob_name("../secret.png").unwrap_err(),
            PathValidationError::PathTraversal
        );
        assert_eq!(
            validate_blob_name("dir/scan.png").unwrap_err(),
            PathValidationError::InvalidCharacters
        );
        assert_eq!(
            validate_blob_name("%2e%2e%2fpasswd").unwrap_err(),
            PathValidationError::PathTraversal
        );
        assert_eq!(validate_blob_name("").unwrap_err(), PathValidationError::EmptyPath);
        assert_eq!(
            validate_blob_name("con.png").unwrap_err(),
            PathValidationError::ReservedName
        );
    }

    #[test]
    fn test_validate_path_for_reading() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("scan.png");
        std::fs::write(&file, b"x").expect("write test file");

        assert!(validate_path_for_reading(&file).is_ok());
        assert!(matches!(
            validate_path_for_reading(&dir.path().join("missing.png")),
            Err(PathValidationError::NotFound(_))
        ));
        assert!(matches!(
            validate_path_for_reading(dir.path()),
            Err(PathValidationError::NotAFile(_))
        ));
    }
}
