//! Object key generation

use crate::{Result, StorageError};
use std::path::Path;

/// Content types that say nothing about the payload format
const OPAQUE_CONTENT_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Derive a file extension (without the leading dot) for an upload.
///
/// When the content type is known, the file name's own extension is kept if
/// the type allows it, else the type's first registered extension is used.
/// Without a usable content type the file name's extension is used, lowercased.
pub fn file_extension(file_name: &str, content_type: Option<&str>) -> Option<String> {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase());

    let allowed = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && !OPAQUE_CONTENT_TYPES.contains(&ct.as_str()))
        .and_then(|ct| mime_guess::get_mime_extensions_str(&ct))
        .filter(|exts| !exts.is_empty());

    match (allowed, from_name) {
        (Some(exts), Some(name_ext)) if exts.contains(&name_ext.as_str()) => Some(name_ext),
        (Some(exts), _) => exts.first().map(|ext| ext.to_string()),
        (None, from_name) => from_name,
    }
}

/// Generate a unique object key of the form `<unix-seconds>-<random>.<ext>`.
pub fn object_key(file_name: &str, content_type: Option<&str>) -> Result<String> {
    let extension = file_extension(file_name, content_type)
        .ok_or_else(|| StorageError::UnknownExtension(file_name.to_string()))?;

    Ok(format!(
        "{}-{}.{}",
        chrono::Utc::now().timestamp(),
        uuid::Uuid::new_v4().simple(),
        extension
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("banner.PNG", None, Some("png"))]
    #[case("photo", Some("image/png"), Some("png"))]
    #[case("photo.jpeg", Some("application/octet-stream"), Some("jpeg"))]
    #[case("photo.gif", Some("image/png; charset=binary"), Some("png"))]
    #[case("README", None, None)]
    #[case("README", Some(""), None)]
    #[case("photo.jpg", Some("image/jpeg"), Some("jpg"))]
    #[case("photo.JPEG", Some("image/jpeg"), Some("jpeg"))]
    #[case("photo.png", Some("image/jpeg"), Some("jfif"))]
    fn test_file_extension(
        #[case] name: &str,
        #[case] content_type: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(file_extension(name, content_type).as_deref(), expected);
    }

    #[test]
    fn test_object_keys_are_unique() {
        let a = object_key("chair.png", None).unwrap();
        let b = object_key("chair.png", None).unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn test_object_key_without_extension() {
        let err = object_key("chair", None).unwrap_err();
        assert!(matches!(err, StorageError::UnknownExtension(name) if name == "chair"));
    }
}
