use std::path::{Path, PathBuf};

use crate::error::KeyPathError;

/// Local location of one object: the file to write and the directory that
/// must exist before writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    pub file: PathBuf,
    pub dir: PathBuf,
}

/// Map an object key onto the local tree under `root`.
///
/// Leading separators are stripped so the result always stays under `root`;
/// every remaining `/` becomes one level of directory nesting. Empty and `.`
/// segments are dropped (`a//b` and `a/./b` both map to `a/b`). A key without a
/// final file name segment, or one containing `..`, is rejected.
pub fn map_key_to_path(root: &Path, key: &str) -> Result<DestinationPath, KeyPathError> {
    if key.ends_with('/') {
        return Err(KeyPathError::NoFileName(key.to_string()));
    }
    let mut segments = Vec::new();
    for seg in key.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return Err(KeyPathError::EscapesRoot(key.to_string())),
            s => segments.push(s),
        }
    }
    let Some((file_name, parents)) = segments.split_last() else {
        return Err(KeyPathError::NoFileName(key.to_string()));
    };
    let mut dir = root.to_path_buf();
    for seg in parents {
        dir.push(seg);
    }
    let file = dir.join(file_name);
    Ok(DestinationPath { file, dir })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_separator_and_nests() {
        let d = map_key_to_path(Path::new("/dest"), "/a/prefix/subdir/b-file").unwrap();
        assert_eq!(d.file, Path::new("/dest").join("a").join("prefix").join("subdir").join("b-file"));
        assert_eq!(d.dir, Path::new("/dest").join("a").join("prefix").join("subdir"));
    }

    #[test]
    fn key_without_separator_maps_directly_under_root() {
        let d = map_key_to_path(Path::new("out"), "file.txt").unwrap();
        assert_eq!(d.file, Path::new("out").join("file.txt"));
        assert_eq!(d.dir, PathBuf::from("out"));
    }

    #[test]
    fn mapping_is_deterministic() {
        let root = Path::new("/r");
        let a = map_key_to_path(root, "//x/./y//z").unwrap();
        let b = map_key_to_path(root, "//x/./y//z").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, map_key_to_path(root, "x/y/z").unwrap());
    }

    #[test]
    fn empty_and_root_only_keys_have_no_file_name() {
        for key in ["", "/", "///", "a/b/", "./"] {
            assert_eq!(
                map_key_to_path(Path::new("/r"), key),
                Err(KeyPathError::NoFileName(key.to_string())),
                "key {:?}",
                key
            );
        }
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert_eq!(
            map_key_to_path(Path::new("/r"), "a/../../etc/passwd"),
            Err(KeyPathError::EscapesRoot("a/../../etc/passwd".to_string()))
        );
    }

    #[test]
    fn trailing_backslash_is_part_of_the_file_name() {
        let d = map_key_to_path(Path::new("/r"), "dir/a\\").unwrap();
        assert_eq!(d.file, Path::new("/r").join("dir").join("a\\"));
        assert_eq!(d.dir, Path::new("/r").join("dir"));
    }

    #[test]
    fn relative_root_stays_relative() {
        let d = map_key_to_path(Path::new("data"), "/LC08/01/x_MTL.txt").unwrap();
        assert!(d.file.is_relative());
        assert!(d.file.starts_with("data"));
    }
}
