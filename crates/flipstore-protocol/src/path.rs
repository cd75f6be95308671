//! Device path handling.
//!
//! Device paths are absolute, `/`-separated strings such as `/ext/apps`.
//! Every path that goes on the wire passes through [`normalize`], so
//! joined or user-supplied paths never carry doubled separators.

/// Normalize a device path.
///
/// Collapses runs of `/`, ensures a leading `/`, and strips a trailing `/`
/// (except for the root itself).
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Join a child name onto a parent path.
pub fn join(parent: &str, name: &str) -> String {
    normalize(&format!("{}/{}", parent, name))
}

/// Get the final component of a path (empty for the root).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// Get the parent of a path (`None` for the root).
pub fn parent(path: &str) -> Option<String> {
    let normalized = normalize(path);
    if normalized == "/" {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize("//ext///apps//"), "/ext/apps");
        assert_eq!(normalize("ext/apps"), "/ext/apps");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_normalize_keeps_spaces_in_names() {
        assert_eq!(normalize("/ext/My Files/a b.txt"), "/ext/My Files/a b.txt");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "ext"), "/ext");
        assert_eq!(join("/ext/", "apps"), "/ext/apps");
        assert_eq!(join("/ext", "/apps/"), "/ext/apps");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("/ext/apps/x.fap"), "x.fap");
        assert_eq!(file_name("/"), "");
        assert_eq!(parent("/ext/apps"), Some("/ext".to_string()));
        assert_eq!(parent("/ext"), Some("/".to_string()));
        assert_eq!(parent("/"), None);
    }
}
