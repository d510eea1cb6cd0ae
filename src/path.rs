//! Tar entry path helpers.
//!
//! Archives produced by different tools spell the same file differently
//! (`./Dockerfile`, `/Dockerfile`, `Dockerfile`). Everything in the pipeline
//! compares names in the normalized form produced here.

/// Normalizes a tar entry name.
///
/// - `./Dockerfile` -> `Dockerfile`
/// - `/Dockerfile` -> `Dockerfile`
/// - `./a/b/Dockerfile` -> `a/b/Dockerfile`
/// - `a/./b//c/../Dockerfile` -> `a/b/Dockerfile`
/// - `../Dockerfile` -> `../Dockerfile`
///
/// Backslashes are treated as separators. The archive root (`.`, `./`, `/`)
/// normalizes to the empty string.
pub fn normalize_tar_entry(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    parts.join("/")
}

/// Returns the final path component.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns true if the path has no directory component.
pub fn is_top_level(path: &str) -> bool {
    !path.contains('/')
}

/// Returns the extension of the final path component, without the dot.
///
/// `test/Dockerfile.armv7hf` -> `Some("armv7hf")`, `Dockerfile` -> `None`.
pub fn extension(path: &str) -> Option<&str> {
    let base = basename(path);
    base.rfind('.').map(|idx| &base[idx + 1..])
}

/// Removes the extension of the final path component.
///
/// `test/Dockerfile.template` -> `test/Dockerfile`. Paths without an
/// extension are returned unchanged; dots in directory names are ignored.
pub fn remove_extension(path: &str) -> String {
    let base_start = path.len() - basename(path).len();
    match path[base_start..].rfind('.') {
        Some(idx) if idx > 0 => path[..base_start + idx].to_string(),
        _ => path.to_string(),
    }
}
