//! Include resolver: maps a header-name to a filesystem path.
//!
//! The quoted form probes the including file's directory first, then each
//! configured `-I` directory in order; the angled form skips the including
//! file's directory entirely. Pulled out as a trait (rather than a free
//! function on `Preprocessor`) so embedders can swap in a virtual
//! filesystem for tests without touching disk.

use std::path::{Path, PathBuf};

/// Resolves a `#include` header-name to a concrete path. `current_dir` is
/// the directory of the file containing the `#include`; `search_dirs` is
/// the `-I` list in command-line order.
pub trait IncludeResolver {
    fn resolve(
        &self,
        name: &str,
        angled: bool,
        current_dir: &Path,
        search_dirs: &[PathBuf],
    ) -> Option<PathBuf>;
}

/// Default resolver: filesystem-exists probing in the quoted/angled order
/// described above.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResolver;

impl IncludeResolver for FsResolver {
    fn resolve(
        &self,
        name: &str,
        angled: bool,
        current_dir: &Path,
        search_dirs: &[PathBuf],
    ) -> Option<PathBuf> {
        if !angled {
            let candidate = current_dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        for dir in search_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn quoted_form_prefers_current_dir() {
        let dir = std::env::temp_dir().join("redsea_pp_resolver_test_quoted");
        let inc_dir = dir.join("inc");
        fs::create_dir_all(&inc_dir).unwrap();
        fs::write(dir.join("a.h"), "// current\n").unwrap();
        fs::write(inc_dir.join("a.h"), "// include dir\n").unwrap();

        let resolver = FsResolver;
        let found = resolver
            .resolve("a.h", false, &dir, &[inc_dir.clone()])
            .unwrap();
        assert_eq!(found, dir.join("a.h"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn angled_form_skips_current_dir() {
        let dir = std::env::temp_dir().join("redsea_pp_resolver_test_angled");
        let inc_dir = dir.join("inc");
        fs::create_dir_all(&inc_dir).unwrap();
        fs::write(dir.join("b.h"), "// current\n").unwrap();
        fs::write(inc_dir.join("b.h"), "// include dir\n").unwrap();

        let resolver = FsResolver;
        let found = resolver
            .resolve("b.h", true, &dir, &[inc_dir.clone()])
            .unwrap();
        assert_eq!(found, inc_dir.join("b.h"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_header_resolves_to_none() {
        let resolver = FsResolver;
        let dir = std::env::temp_dir();
        assert!(resolver
            .resolve("definitely_missing_header.h", false, &dir, &[])
            .is_none());
    }
}
