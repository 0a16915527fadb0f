/// Normalises a user supplied remote path to an absolute, clean form.
///
/// `docs/./a/` and `/docs//a` both become `/docs/a`; `..` never climbs above `/`.
pub fn clean_remote_path(path: &str) -> String {
    path_clean::clean(&format!("/{path}"))
}

/// Byte length to strip from a child's path to show it relative to `dir`.
///
/// `dir` must be clean. The root has no separator of its own to skip.
pub fn child_prefix_len(dir: &str) -> usize {
    if dir == "/" {
        1
    } else {
        dir.len() + 1
    }
}

/// Splits a clean remote path into its parent directory and final name.
pub fn parent_and_name(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}

pub fn join_remote(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Whether `path` lies strictly below `dir`.
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.len() > dir.len() + 1 && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_clean_remote_paths() {
        assert_eq!("/", clean_remote_path(""));
        assert_eq!("/", clean_remote_path("/"));
        assert_eq!("/docs/a", clean_remote_path("docs/./a/"));
        assert_eq!("/docs/a", clean_remote_path("/docs//a"));
        assert_eq!("/a", clean_remote_path("/../../a"));
    }

    #[test]
    fn should_skip_parent_and_separator() {
        assert_eq!(1, child_prefix_len("/"));
        assert_eq!(6, child_prefix_len("/docs"));
        assert_eq!("readme.md", &"/docs/readme.md"[child_prefix_len("/docs")..]);
        assert_eq!("readme.md", &"/readme.md"[child_prefix_len("/")..]);
    }

    #[test]
    fn should_split_parent_and_name() {
        assert_eq!(("/", "a.txt"), parent_and_name("/a.txt"));
        assert_eq!(("/docs", "a.txt"), parent_and_name("/docs/a.txt"));
        assert_eq!("/docs/a.txt", join_remote("/docs", "a.txt"));
        assert_eq!("/a.txt", join_remote("/", "a.txt"));
    }

    #[test]
    fn should_only_match_paths_below_directory() {
        assert!(is_within("/docs/a", "/docs"));
        assert!(is_within("/docs", "/"));
        assert!(!is_within("/docs", "/docs"));
        assert!(!is_within("/docsx/a", "/docs"));
        assert!(!is_within("/", "/"));
    }
}
