//! Path algebra over archive-relative inner paths
//!
//! Inner paths are `/`-separated and never absolute; `""` is the archive root.
//! None of these functions touch storage and none of them fail.

/// Normalizes an inner path: drops empty and `.` segments, so leading,
/// trailing and doubled slashes disappear.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True iff `b` starts with `a` followed immediately by `/`.
/// The root (`""`) is an ancestor of everything.
pub fn is_ancestor(a: &str, b: &str) -> bool {
    if a.is_empty() {
        return true;
    }
    b.len() > a.len() && b.starts_with(a) && b.as_bytes()[a.len()] == b'/'
}

/// True iff `b` is exactly one segment below `a`.
pub fn is_immediate_parent(a: &str, b: &str) -> bool {
    let rest = if a.is_empty() {
        b
    } else if is_ancestor(a, b) {
        &b[a.len() + 1..]
    } else {
        return false;
    };
    !rest.is_empty() && !rest.contains('/')
}

/// Last segment of an entry name, ignoring one trailing `/`.
pub fn simple_name(entry_name: &str) -> &str {
    let trimmed = entry_name.strip_suffix('/').unwrap_or(entry_name);
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

pub fn join(parent: &str, name: &str) -> String {
    let name = normalize(name);
    if parent.is_empty() {
        name
    } else if name.is_empty() {
        parent.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent of an inner path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    })
}

/// The first segment of `descendant` below `ancestor`, as a full path.
///
/// `child_segment("a", "a/b/c.txt")` is `Some("a/b")`.
pub fn child_segment<'a>(ancestor: &str, descendant: &'a str) -> Option<&'a str> {
    if !is_ancestor(ancestor, descendant) || ancestor == descendant {
        return None;
    }
    let start = if ancestor.is_empty() { 0 } else { ancestor.len() + 1 };
    Some(match descendant[start..].find('/') {
        Some(offset) => &descendant[..start + offset],
        None => descendant,
    })
}

/// Moves `path` from below `from` to below `to`; `None` if `path` is outside `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if from.is_empty() {
        return Some(join(to, path));
    }
    if !is_ancestor(from, path) {
        return None;
    }
    Some(join(to, &path[from.len() + 1..]))
}
