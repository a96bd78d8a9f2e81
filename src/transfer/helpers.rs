// Lightweight path display wrapper that renders with forward slashes.
pub(crate) struct DisplayPath<'a>(pub(crate) &'a std::path::Path);

impl std::fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.to_string_lossy();
        f.write_str(&normalize_path(&s, true))
    }
}

pub(crate) fn display_path(p: &std::path::Path) -> DisplayPath<'_> {
    DisplayPath(p)
}

/// Normalize a path-like string:
/// - converts backslashes to forward slashes
/// - collapses repeated slashes
/// - optionally preserves a trailing slash (a trailing `/` on a key marks a directory placeholder)
pub fn normalize_path(p: &str, preserve_trailing_slash: bool) -> String {
    if p.is_empty() {
        return String::new();
    }
    let mut s = p.replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    if !preserve_trailing_slash {
        // Strip trailing slashes, but keep root "/"
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
    }
    s
}

/// Prefix as handed to the store: leading separators removed, so `/a/prefix`
/// and `a/prefix` list the same objects and `/` lists the whole bucket.
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_empty() {
        assert_eq!(normalize_path("", true), "");
        assert_eq!(normalize_path("", false), "");
    }

    #[test]
    fn preserve_and_strip_trailing_slash() {
        assert_eq!(normalize_path("/a/b/", true), "/a/b/");
        assert_eq!(normalize_path("/a/b/", false), "/a/b");
        assert_eq!(normalize_path("/", false), "/");
    }

    #[test]
    fn collapse_repeated_slashes_and_backslashes() {
        assert_eq!(normalize_path("//a///b//c", false), "/a/b/c");
        assert_eq!(normalize_path("C:\\data\\out", false), "C:/data/out");
    }

    #[test]
    fn prefix_loses_leading_separators_only() {
        assert_eq!(normalize_prefix("/a/prefix"), "a/prefix");
        assert_eq!(normalize_prefix("//a/prefix/"), "a/prefix/");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn display_path_uses_forward_slashes() {
        let p = std::path::Path::new("C:\\some\\path\\");
        assert_eq!(format!("{}", display_path(p)), "C:/some/path/");
    }
}
