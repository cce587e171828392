/// Path normalisation — turns user-supplied path strings into cache keys.
///
/// A key always uses `/` as separator, has no empty, `.` or `..` segments,
/// upper-cases a leading drive letter and never ends with a separator
/// unless it is a root (`/` or `X:/`). Filesystem calls go through
/// [`to_native`] so the platform separator is used there.
use std::io;
use std::path::PathBuf;

/// Token that callers may use to mean "the primary volume".
pub const ROOT_TOKEN: &str = "root";

/// Root of the platform's primary volume, in key form.
pub fn primary_root() -> &'static str {
    if cfg!(windows) {
        "C:/"
    } else {
        "/"
    }
}

/// Canonicalise `user_path` into a cache key.
///
/// Total (never fails) and idempotent: `normalize(&normalize(x)) == normalize(x)`.
/// Purely lexical: symlinks are not resolved and the current directory is
/// never consulted, so relative inputs stay relative (see [`absolute_key`]). Whitespace inside the
/// path is preserved; only a blank input or the bare `root` token is special.
pub fn normalize(user_path: &str) -> String {
    if is_root_token(user_path) {
        return primary_root().to_string();
    }
    let lexical = lexical_form(user_path);
    if is_root_token(&lexical) {
        primary_root().to_string()
    } else {
        lexical
    }
}

/// Empty, whitespace-only or the `root` token.
fn is_root_token(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ROOT_TOKEN)
}

fn lexical_form(path: &str) -> String {
    let unified = path.replace('\\', "/");

    // Split off the root part: "X:" drive prefix and/or a leading slash.
    let (mut drive, rest) = split_drive(&unified);
    let absolute = drive.is_some() || rest.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    // Relative paths keep leading `..` so the key stays faithful.
                    segments.push("..");
                }
                // `..` above an absolute root is dropped.
            }
            other => segments.push(other),
        }
    }

    // `./c:` collapses to a bare drive segment, which reads back as a drive.
    if !absolute {
        if let Some(letter) = segments.first().and_then(|first| bare_drive(first)) {
            drive = Some(letter);
            segments.remove(0);
        }
    }

    let joined = segments.join("/");
    match drive {
        Some(letter) => format!("{}:/{joined}", letter.to_ascii_uppercase()),
        None if absolute => format!("/{joined}"),
        None if joined.is_empty() => ".".to_string(),
        None => joined,
    }
}

/// The letter of a segment that is exactly `X:`.
fn bare_drive(segment: &str) -> Option<char> {
    match split_drive(segment) {
        (Some(letter), "") => Some(letter),
        _ => None,
    }
}

/// Split a leading `X:` drive designator off a `/`-separated path.
fn split_drive(path: &str) -> (Option<char>, &str) {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            let rest = &path[2..];
            if rest.is_empty() || rest.starts_with('/') {
                (Some(letter), rest)
            } else {
                (None, path)
            }
        }
        _ => (None, path),
    }
}

/// `true` for keys rooted at `/` or a drive.
pub fn is_absolute_key(key: &str) -> bool {
    key.starts_with('/') || split_drive(key).0.is_some()
}

/// Cache key for `user_path` with relative input anchored at the current
/// directory. This is what the engine keys on: a relative key would name a
/// different directory whenever the working directory changes.
pub fn absolute_key(user_path: &str) -> io::Result<String> {
    let key = normalize(user_path);
    if is_absolute_key(&key) {
        return Ok(key);
    }
    let anchored = std::path::absolute(to_native(&key))?;
    Ok(normalize(&anchored.to_string_lossy()))
}

/// Convert a key back into a path using the platform-native separator.
pub fn to_native(key: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(key.replace('/', "\\"))
    } else {
        PathBuf::from(key)
    }
}

/// `true` if `key` names the root of a volume (`/` or `X:/`).
pub fn is_volume_root(key: &str) -> bool {
    key == "/" || (key.len() == 3 && key.ends_with(":/") && split_drive(key).0.is_some())
}

/// Parent key, or `None` for a root or a single relative segment.
pub fn parent_key(key: &str) -> Option<String> {
    if is_volume_root(key) || key == "." {
        return None;
    }
    let idx = key.rfind('/')?;
    let parent = &key[..idx];
    if parent.is_empty() {
        Some("/".to_string())
    } else if parent.len() == 2 && parent.ends_with(':') {
        Some(format!("{parent}/"))
    } else {
        Some(parent.to_string())
    }
}

/// All ancestors of `key`, nearest first, ending with the volume root.
pub fn ancestors(key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent_key(key);
    while let Some(parent) = current {
        current = parent_key(&parent);
        out.push(parent);
    }
    out
}

/// `true` if `candidate` lies strictly below `ancestor`.
pub fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if candidate.len() <= ancestor.len() || !candidate.starts_with(ancestor) {
        return false;
    }
    ancestor.ends_with('/') || candidate.as_bytes()[ancestor.len()] == b'/'
}

/// `true` if `candidate` equals `ancestor` or lies below it.
pub fn is_same_or_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate == ancestor || is_descendant(candidate, ancestor)
}

/// Name shown for the node at `key`: last segment, or the root itself
/// (`/`, `C:`).
pub fn display_name(key: &str) -> String {
    if key == "/" {
        return "/".to_string();
    }
    if is_volume_root(key) {
        return key.trim_end_matches('/').to_string();
    }
    key.rsplit('/').next().unwrap_or(key).to_string()
}
