//! Virtual-path discipline.
//!
//! Every path stored in the projection is absolute, forward-slash
//! separated, with no trailing slash (except the root itself) and no
//! characters the downstream drivers cannot represent.

/// Characters stripped from virtual paths, per the Windows-reserved set.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Sanitize a rule-produced path into canonical virtual form.
///
/// Backslashes become separators, reserved characters are stripped (a
/// leading drive prefix like `X:` survives), empty segments collapse, and
/// the result is rooted with a single leading `/`.
pub fn sanitize(raw: &str) -> String {
    let raw = raw.replace('\\', "/");

    // A drive prefix keeps its colon; everything after is filtered.
    let (drive, rest) = match raw.as_bytes() {
        [a, b':', ..] if a.is_ascii_alphabetic() => (&raw[..2], &raw[2..]),
        _ => ("", raw.as_str()),
    };

    let cleaned: String = rest.chars().filter(|c| !FORBIDDEN.contains(c)).collect();

    let mut path = String::from("/");
    path.push_str(drive);
    for segment in cleaned.split('/').filter(|s| !s.is_empty()) {
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(segment);
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of an absolute path; the root has none.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final component of an absolute path.
pub fn basename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Non-empty components of an absolute path, in order.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Resolve a stored `filePath` to its absolute upstream location.
///
/// Relative paths land under the files root; absolute paths that escaped
/// the root are pulled back under it.
pub fn resolve_source_path(files_root: &str, file_path: &str) -> String {
    let root = files_root.trim_end_matches('/');
    if file_path.starts_with(&format!("{root}/")) || file_path == root {
        return file_path.to_string();
    }
    let relative = file_path.trim_start_matches('/');
    format!("{root}/{relative}")
}

/// Build the external share URL for a path below the files root, encoding
/// each segment independently so separators survive.
pub fn share_url(base: &str, relative_path: &str) -> String {
    let base = base.trim_end_matches('/');
    let encoded: Vec<String> = relative_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{base}/{}", encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== sanitize ====================

    #[test]
    fn test_sanitize_prepends_root() {
        assert_eq!(sanitize("Movies/Inception.mkv"), "/Movies/Inception.mkv");
    }

    #[test]
    fn test_sanitize_strips_forbidden_chars() {
        assert_eq!(sanitize("Mov<ies>/What?.mkv"), "/Movies/What.mkv");
        assert_eq!(sanitize("a\"b|c*d"), "/abcd");
    }

    #[test]
    fn test_sanitize_strips_interior_colons_keeps_drive() {
        assert_eq!(sanitize("X:/Movies/12:08.mkv"), "/X:/Movies/1208.mkv");
        assert_eq!(sanitize("Movies/12:08.mkv"), "/Movies/1208.mkv");
    }

    #[test]
    fn test_sanitize_collapses_empty_segments() {
        assert_eq!(sanitize("a//b///c"), "/a/b/c");
    }

    #[test]
    fn test_sanitize_trailing_slash() {
        assert_eq!(sanitize("Movies/"), "/Movies");
        assert_eq!(sanitize("/"), "/");
        assert_eq!(sanitize(""), "/");
    }

    #[test]
    fn test_sanitize_backslashes_become_separators() {
        assert_eq!(sanitize("TV Shows\\Breaking Bad"), "/TV Shows/Breaking Bad");
    }

    #[test]
    fn test_sanitize_already_absolute() {
        assert_eq!(sanitize("/Movies/A.mkv"), "/Movies/A.mkv");
    }

    // ==================== join / parent / basename ====================

    #[test]
    fn test_join() {
        assert_eq!(join("/", "Movies"), "/Movies");
        assert_eq!(join("/Movies", "A.mkv"), "/Movies/A.mkv");
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/Movies"), Some("/"));
        assert_eq!(parent_of("/Movies/A.mkv"), Some("/Movies"));
    }

    #[test]
    fn test_basename_of() {
        assert_eq!(basename_of("/Movies/A.mkv"), "A.mkv");
        assert_eq!(basename_of("/Movies"), "Movies");
    }

    #[test]
    fn test_components() {
        let parts: Vec<&str> = components("/TV Shows/Breaking Bad/S01").collect();
        assert_eq!(parts, vec!["TV Shows", "Breaking Bad", "S01"]);
    }

    // ==================== source resolution ====================

    #[test]
    fn test_resolve_source_relative() {
        assert_eq!(
            resolve_source_path("/files", "Movies/Inception.mkv"),
            "/files/Movies/Inception.mkv"
        );
    }

    #[test]
    fn test_resolve_source_already_under_root() {
        assert_eq!(
            resolve_source_path("/files", "/files/Movies/A.mkv"),
            "/files/Movies/A.mkv"
        );
    }

    #[test]
    fn test_resolve_source_absolute_outside_root() {
        assert_eq!(
            resolve_source_path("/files", "/mnt/other/A.mkv"),
            "/files/mnt/other/A.mkv"
        );
    }

    #[test]
    fn test_resolve_source_trailing_slash_root() {
        assert_eq!(resolve_source_path("/files/", "A.mkv"), "/files/A.mkv");
    }

    // ==================== share URLs ====================

    #[test]
    fn test_share_url_encodes_per_segment() {
        assert_eq!(
            share_url("http://share:8080/dav", "TV Shows/S01 E01.mkv"),
            "http://share:8080/dav/TV%20Shows/S01%20E01.mkv"
        );
    }

    #[test]
    fn test_share_url_trims_base_slash() {
        assert_eq!(share_url("http://s/dav/", "a.mkv"), "http://s/dav/a.mkv");
    }
}
