//! Object key validation.
//!
//! Object stores have a flat namespace, but keys are treated as `/`-separated
//! paths everywhere in cloudsync. These helpers make sure a key (or key
//! prefix) can never escape the namespace it was configured for.

use crate::error::{ErrorKind, Result};

/// Validates and normalizes an object key.
///
/// Empty segments and `.` segments are dropped, `..` pops the previous
/// segment, and the result is re-joined with `/`.
///
/// > **Note:** Backslashes are **not** treated as separators; they are valid
/// >           (if unusual) characters in an object key. Null bytes are
/// >           explicitly rejected.
///
/// # Examples
///
/// ```
/// use cloudsync_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("assets/logo.png").is_ok());
/// assert!(validate_key("a/../file.txt").is_ok()); // (never leaves the namespace)
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/../../b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("/wrong/../still-wrong/.././correct//./file.txt/").unwrap(), "correct/file.txt");
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            s if s.contains('\0') => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            s => segments.push(s),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}

/// Joins a relative key onto an optional prefix.
///
/// An empty prefix means the bucket root. Both halves are validated, so the
/// result is always a normalized key.
pub fn join(prefix: &str, relative: impl AsRef<str>) -> Result<String> {
    let relative = validate(relative)?;
    match prefix.trim_matches('/') {
        "" => Ok(relative),
        prefix => Ok(format!("{}/{}", validate(prefix)?, relative)),
    }
}

/// The listing prefix for a key prefix: `None` for the bucket root, otherwise
/// the normalized prefix with a trailing `/` so that `docs` never matches
/// `docs-old/readme.md`.
pub fn namespace(prefix: &str) -> Result<Option<String>> {
    match prefix.trim_matches('/') {
        "" => Ok(None),
        prefix => Ok(Some(format!("{}/", validate(prefix)?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("assets/logo.png", "assets/logo.png")]
    #[case("a/b/c/file.txt", "a/b/c/file.txt")]
    #[case("simple.txt", "simple.txt")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("/leading/slash", "leading/slash")]
    #[case("a/b/..", "a")]
    #[case("Fandom1///", "Fandom1")]
    fn test_valid_keys(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), expected);
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("../..")]
    #[case("a\0b")]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    fn test_invalid_keys(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_backslash_is_not_a_separator() {
        assert_eq!(validate("a\\b").unwrap(), "a\\b");
    }

    #[rstest]
    #[case("", "README.md", "README.md")]
    #[case("/", "README.md", "README.md")]
    #[case("site", "README.md", "site/README.md")]
    #[case("site/", "css/main.css", "site/css/main.css")]
    #[case("a/b", "./c.txt", "a/b/c.txt")]
    fn test_join(#[case] prefix: &str, #[case] relative: &str, #[case] expected: &str) {
        assert_eq!(join(prefix, relative).unwrap(), expected);
    }

    #[test]
    fn test_join_rejects_escape() {
        assert!(join("site", "../outside.txt").is_err());
        assert!(join("../site", "inside.txt").is_err());
    }

    #[rstest]
    #[case("", None)]
    #[case("/", None)]
    #[case("docs", Some("docs/"))]
    #[case("docs/", Some("docs/"))]
    #[case("a//b", Some("a/b/"))]
    fn test_namespace(#[case] prefix: &str, #[case] expected: Option<&str>) {
        assert_eq!(namespace(prefix).unwrap().as_deref(), expected);
    }
}
