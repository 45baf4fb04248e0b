//! Storage quota: how many KB the next dump may use.

use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::QuotaPolicy;
use crate::error::{DumpError, DumpResult};

/// Sums every regular file under `dir`, each rounded up to whole KB.
///
/// A missing directory counts as empty. Unreadable entries are skipped.
pub fn directory_size_kb(dir: &Path) -> u64 {
    if !dir.exists() {
        return 0;
    }
    let mut total = 0u64;
    for item in WalkDir::new(dir).follow_links(false) {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "skipping unreadable entry while sizing");
                continue;
            }
        };
        if !item.file_type().is_file() {
            continue;
        }
        match item.metadata() {
            Ok(meta) => total = total.saturating_add(meta.len().div_ceil(1024)),
            Err(e) => debug!(path = %item.path().display(), error = %e, "no metadata while sizing"),
        }
    }
    total
}

/// Computes the size budget for a new dump.
///
/// `used_kb` is the current usage of the dump root. While the space left is
/// below `policy.min_kb`, a rotating policy calls `evict` to delete the
/// oldest dump; `evict` returns the KB it freed, or `None` when nothing is
/// left to delete. The result never exceeds `policy.max_kb`.
pub fn allowed_size_kb<F>(policy: &QuotaPolicy, used_kb: u64, mut evict: F) -> DumpResult<u64>
where
    F: FnMut() -> Option<u64>,
{
    let mut used = used_kb;
    let mut available = policy.allocated_kb.saturating_sub(used);

    while available < policy.min_kb {
        if !policy.rotate {
            warn!(
                available_kb = available,
                min_kb = policy.min_kb,
                "not enough space for a new dump"
            );
            return Err(DumpError::QuotaExceeded {
                reason: "Delete old dumps".to_string(),
            });
        }
        match evict() {
            Some(freed) => {
                used = used.saturating_sub(freed);
                available = policy.allocated_kb.saturating_sub(used);
                info!(freed_kb = freed, available_kb = available, "rotated oldest dump");
            }
            None => {
                warn!(
                    available_kb = available,
                    min_kb = policy.min_kb,
                    "nothing left to rotate"
                );
                return Err(DumpError::QuotaExceeded {
                    reason: "no dumps left to rotate".to_string(),
                });
            }
        }
    }

    Ok(available.min(policy.max_kb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(rotate: bool) -> QuotaPolicy {
        QuotaPolicy {
            max_kb: 500,
            min_kb: 100,
            allocated_kb: 1000,
            rotate,
        }
    }

    #[test]
    fn test_empty_dir_clamps_to_max() {
        let size = allowed_size_kb(&policy(false), 0, || None).unwrap();
        assert_eq!(size, 500);
    }

    #[test]
    fn test_partial_usage_below_max() {
        let size = allowed_size_kb(&policy(false), 700, || None).unwrap();
        assert_eq!(size, 300);
    }

    #[test]
    fn test_oversized_usage_without_rotation_fails() {
        let err = allowed_size_kb(&policy(false), 5000, || None).unwrap_err();
        assert!(matches!(err, DumpError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_rotation_evicts_until_min() {
        let mut freed = vec![50u64, 100, 200];
        let mut calls = 0;
        let size = allowed_size_kb(&policy(true), 950, || {
            calls += 1;
            if freed.is_empty() {
                None
            } else {
                Some(freed.remove(0))
            }
        })
        .unwrap();
        // one 50 KB eviction reaches the minimum
        assert_eq!(calls, 1);
        assert_eq!(size, 100);
    }

    #[test]
    fn test_rotation_exhausted_fails() {
        let err = allowed_size_kb(&policy(true), 1000, || None).unwrap_err();
        assert!(matches!(err, DumpError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_no_eviction_when_enough_space() {
        let size = allowed_size_kb(&policy(true), 0, || panic!("should not evict")).unwrap();
        assert_eq!(size, 500);
    }

    #[test]
    fn test_directory_size_rounds_up_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 1]).unwrap();
        std::fs::create_dir(dir.path().join("7")).unwrap();
        std::fs::write(dir.path().join("7").join("b"), vec![0u8; 1025]).unwrap();
        std::fs::write(dir.path().join("c"), Vec::<u8>::new()).unwrap();
        // links are not followed and their own length is not counted
        std::os::unix::fs::symlink(dir.path().join("7").join("b"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", dir.path().join("dangling")).unwrap();
        assert_eq!(directory_size_kb(dir.path()), 3);
    }

    #[test]
    fn test_directory_size_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(directory_size_kb(&dir.path().join("absent")), 0);
    }
}
