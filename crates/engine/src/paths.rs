//! Destination-path handling for names received over the wire.
//!
//! Every inbound name is untrusted: it may carry either separator style,
//! `..` components, characters the local filesystem rejects, or collide
//! with a file that already exists. The pipeline is normalize → sanitize
//! per segment → join under the base → resolve collisions; by construction
//! the result can never escape the base directory.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Longest final path segment, in bytes.
const MAX_SEGMENT_BYTES: usize = 255;

/// Name substituted when sanitizing leaves nothing.
const FALLBACK_NAME: &str = "unnamed_file";

/// Highest `_N` suffix tried before giving up on a collision.
const MAX_COLLISION_ATTEMPTS: u32 = 9999;

/// Replaces filesystem-hostile characters and trims decoration.
///
/// `<>:"/\|?*` become `_`, surrounding spaces and dots are stripped, an
/// empty result becomes [`FALLBACK_NAME`], and the name is truncated to
/// 255 bytes on a char boundary with the extension preserved.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches([' ', '.']);
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_owned();
    }

    truncate_segment(trimmed)
}

/// Normalizes separators: back-slashes become forward slashes, runs of
/// slashes collapse, leading slashes are stripped.
#[must_use]
pub fn normalize_separators(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut out = String::with_capacity(forward.len());
    let mut prev_slash = true; // also strips leading slashes
    for c in forward.chars() {
        if c == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    if out.ends_with('/') {
        out.pop();
    }
    out
}

/// Builds a safe absolute path for the untrusted `relative` under `base`.
///
/// Empty, `.` and dot-only segments (including `..`) are dropped, every
/// remaining segment is sanitized, and an existing destination gets a
/// `_1`, `_2`, … suffix. A name that sanitizes to nothing at all becomes
/// [`FALLBACK_NAME`] directly under `base`.
#[must_use]
pub fn create_safe_path(base: &Path, relative: &str) -> PathBuf {
    let normalized = normalize_separators(relative);

    let mut path = base.to_path_buf();
    let mut pushed = false;
    for segment in normalized.split('/') {
        if segment.is_empty() || segment.chars().all(|c| c == '.' || c == ' ') {
            continue;
        }
        path.push(sanitize_file_name(segment));
        pushed = true;
    }
    if !pushed {
        path.push(FALLBACK_NAME);
    }

    resolve_collision(path)
}

/// Returns `path` unchanged when free, else the first `stem_N.ext` variant
/// that does not exist yet. After [`MAX_COLLISION_ATTEMPTS`] the original
/// path is reused so the transfer still lands somewhere.
#[must_use]
pub fn resolve_collision(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);

    for counter in 1..=MAX_COLLISION_ATTEMPTS {
        let candidate_name = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            info!(
                original = %path.display(),
                resolved = %candidate.display(),
                "destination collision resolved"
            );
            return candidate;
        }
    }

    warn!(path = %path.display(), "collision unresolved after {MAX_COLLISION_ATTEMPTS} attempts, reusing path");
    path
}

/// Creates `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Describes a transfer source: `(root_name, is_directory)`.
///
/// A file has no root name; a directory contributes its basename so the
/// receiver can recreate the top-level folder.
pub fn describe_source(source: &Path) -> io::Result<(String, bool)> {
    let metadata = std::fs::metadata(source)?;
    if metadata.is_dir() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((name, true))
    } else {
        Ok((String::new(), false))
    }
}

/// Truncates to [`MAX_SEGMENT_BYTES`] keeping the extension and never
/// splitting a UTF-8 character.
fn truncate_segment(name: &str) -> String {
    if name.len() <= MAX_SEGMENT_BYTES {
        return name.to_owned();
    }

    let (stem, ext) = match name.rfind('.') {
        // A leading dot is a hidden-file prefix, not an extension.
        Some(idx) if idx > 0 && name.len() - idx < MAX_SEGMENT_BYTES => {
            (&name[..idx], &name[idx..])
        }
        _ => (name, ""),
    };

    let budget = MAX_SEGMENT_BYTES - ext.len();
    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostile_characters_become_underscores() {
        assert_eq!(sanitize_file_name("weird<name>.bin"), "weird_name_.bin");
        assert_eq!(sanitize_file_name("a:b|c?d*e"), "a_b_c_d_e");
        assert_eq!(sanitize_file_name("quo\"te"), "quo_te");
    }

    #[test]
    fn decoration_is_trimmed() {
        assert_eq!(sanitize_file_name("  spaced.txt  "), "spaced.txt");
        assert_eq!(sanitize_file_name("...dots..."), "dots");
    }

    #[test]
    fn empty_results_fall_back() {
        assert_eq!(sanitize_file_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(" . . "), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(".."), FALLBACK_NAME);
    }

    #[test]
    fn long_names_keep_their_extension() {
        let name = format!("{}.tar.gz", "x".repeat(300));
        let sanitized = sanitize_file_name(&name);
        assert!(sanitized.len() <= MAX_SEGMENT_BYTES);
        assert!(sanitized.ends_with(".gz"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = "é".repeat(200); // 400 bytes of two-byte chars
        let sanitized = sanitize_file_name(&name);
        assert!(sanitized.len() <= MAX_SEGMENT_BYTES);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn separators_normalize() {
        assert_eq!(normalize_separators("a\\b\\c"), "a/b/c");
        assert_eq!(normalize_separators("//a///b/"), "a/b");
        assert_eq!(normalize_separators("/leading"), "leading");
    }

    #[test]
    fn safe_paths_stay_inside_the_base() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let base = tmp.path();

        for hostile in [
            "../escape.txt",
            "..\\..\\escape.txt",
            "/etc/passwd",
            "a/../../b.txt",
            "....//....//x",
        ] {
            let safe = create_safe_path(base, hostile);
            assert!(safe.starts_with(base), "{hostile} escaped to {}", safe.display());
            for component in safe.strip_prefix(base).expect("inside base").components() {
                let text = component.as_os_str().to_string_lossy();
                assert!(!text.contains(['<', '>', ':', '"', '/', '\\', '|', '?', '*']));
                assert_ne!(text, "..");
            }
        }
    }

    #[test]
    fn nested_names_create_nested_paths() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let safe = create_safe_path(tmp.path(), "photos\\2024/summer.jpg");
        assert_eq!(safe, tmp.path().join("photos").join("2024").join("summer.jpg"));
    }

    #[test]
    fn fully_hostile_name_lands_on_fallback() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let safe = create_safe_path(tmp.path(), "../..");
        assert_eq!(safe, tmp.path().join(FALLBACK_NAME));
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let base = tmp.path();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..25 {
            let path = create_safe_path(base, "data.txt");
            std::fs::write(&path, b"x").expect("create");
            assert!(seen.insert(path.clone()), "duplicate path {}", path.display());
        }
        assert!(base.join("data.txt").exists());
        assert!(base.join("data_1.txt").exists());
        assert!(base.join("data_24.txt").exists());
    }

    #[test]
    fn collision_suffix_goes_before_the_extension() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("a.tar.gz"), b"x").expect("create");
        let resolved = resolve_collision(tmp.path().join("a.tar.gz"));
        assert_eq!(resolved, tmp.path().join("a.tar_1.gz"));
    }

    #[test]
    fn describe_source_distinguishes_files_and_dirs() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("f.bin");
        std::fs::write(&file, b"x").expect("create");

        assert_eq!(describe_source(&file).expect("file"), (String::new(), false));
        let (name, is_dir) = describe_source(tmp.path()).expect("dir");
        assert!(is_dir);
        assert!(!name.is_empty());
        assert!(describe_source(&tmp.path().join("missing")).is_err());
    }
}
