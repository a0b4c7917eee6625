use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path is absolute")]
    Absolute,
    #[error("path contains an empty segment")]
    EmptySegment,
    #[error("path contains a '.' or '..' segment")]
    DotSegment,
    #[error("path contains a backslash")]
    Backslash,
    #[error("path contains a NUL byte")]
    Nul,
}

pub struct TreePath;

impl TreePath {
    /// Check a snapshot path: slash separated, relative, with no empty,
    /// `.` or `..` segments. This is the "Wire Format" for index keys.
    pub fn validate(rel_path: &str) -> Result<(), PathError> {
        if rel_path.is_empty() {
            return Err(PathError::Empty);
        }
        if rel_path.starts_with('/') {
            return Err(PathError::Absolute);
        }
        if rel_path.contains('\\') {
            return Err(PathError::Backslash);
        }
        if rel_path.contains('\0') {
            return Err(PathError::Nul);
        }
        // A leading drive prefix ("C:", "c:dir") replaces the base in a
        // Windows join.
        if let [drive, b':', ..] = rel_path.as_bytes() {
            if drive.is_ascii_alphabetic() {
                return Err(PathError::Absolute);
            }
        }
        for seg in rel_path.split('/') {
            match seg {
                "" => return Err(PathError::EmptySegment),
                "." | ".." => return Err(PathError::DotSegment),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn is_safe(rel_path: &str) -> bool {
        Self::validate(rel_path).is_ok()
    }

    /// A walk root may be relative or absolute, but must not climb out of
    /// its base with `..`.
    pub fn verify_root(root: &Path) -> bool {
        !root.as_os_str().is_empty()
            && !root
                .components()
                .any(|c| matches!(c, Component::ParentDir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_paths() {
        assert_eq!(TreePath::validate("a"), Ok(()));
        assert_eq!(TreePath::validate("a/b/c.txt"), Ok(()));
        assert_eq!(TreePath::validate(".hidden/file"), Ok(()));
        assert_eq!(TreePath::validate("dir/..file"), Ok(()));
        assert_eq!(TreePath::validate("a/b:"), Ok(()));
        assert_eq!(TreePath::validate("1:"), Ok(()));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(TreePath::validate(""), Err(PathError::Empty));
        assert_eq!(TreePath::validate("/etc/passwd"), Err(PathError::Absolute));
        assert_eq!(TreePath::validate("a//b"), Err(PathError::EmptySegment));
        assert_eq!(TreePath::validate("a/"), Err(PathError::EmptySegment));
        assert_eq!(TreePath::validate("./a"), Err(PathError::DotSegment));
        assert_eq!(TreePath::validate("a/../../b"), Err(PathError::DotSegment));
        assert_eq!(TreePath::validate("a\\b"), Err(PathError::Backslash));
        assert_eq!(TreePath::validate("C:/x"), Err(PathError::Absolute));
        assert_eq!(TreePath::validate("z:"), Err(PathError::Absolute));
        assert_eq!(TreePath::validate("c:dir/x"), Err(PathError::Absolute));
    }

    #[test]
    fn roots_cannot_escape() {
        assert!(TreePath::verify_root(Path::new(".")));
        assert!(TreePath::verify_root(Path::new("/srv/mirror")));
        assert!(TreePath::verify_root(Path::new("data/site")));
        assert!(!TreePath::verify_root(Path::new("../elsewhere")));
        assert!(!TreePath::verify_root(Path::new("data/../../x")));
        assert!(!TreePath::verify_root(Path::new("")));
    }
}
