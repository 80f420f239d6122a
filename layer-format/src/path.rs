//! Archive member path handling.
//!
//! Every path stored in an [`Index`](crate::Index) is relative, uses `/` as
//! its separator and has had `.` and `..` chunks collapsed. The archive root is
//! spelled [`ROOT`].

use relative_path::RelativePath;

/// Path of the synthetic root directory.
pub const ROOT: &str = ".";

/// The separator used between path chunks, independent of platform.
pub const PATH_SEP: char = '/';

/// Normalizes an archive member name or a lookup path.
///
/// Leading separators and `./` prefixes are dropped, `.` and `..` chunks are
/// collapsed and a trailing separator is removed. A name that collapses to
/// nothing refers to the root.
pub fn normalize(name: &str) -> String {
    let normalized = RelativePath::new(name.trim_start_matches(PATH_SEP)).normalize();

    match normalized.as_str() {
        "" => ROOT.to_string(),
        s => s.to_string(),
    }
}

/// The path of the directory containing `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }

    match path.rsplit_once(PATH_SEP) {
        Some((parent, _)) => Some(parent),
        None => Some(ROOT),
    }
}

/// The last chunk of `path`.
pub fn file_name(path: &str) -> &str {
    path.rsplit(PATH_SEP).next().unwrap_or(path)
}

/// Joins a child name onto a normalized directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        name.to_string()
    } else {
        format!("{}{}{}", dir, PATH_SEP, name)
    }
}
