/// Bounded size estimator for directories the exact walk will not enter.
///
/// Walks at most `depth` levels and `entry_budget` entries with `jwalk`,
/// summing the file sizes it sees. Whatever lies beyond either limit is
/// not counted, so a truncated estimate is a lower bound. Reserved and
/// user-excluded trees are pruned before they are read.
use crate::classify::PathClassifier;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub bytes: u64,
    /// `true` if depth or entry budget cut the walk short.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Estimator {
    depth: usize,
    entry_budget: usize,
}

impl Estimator {
    pub fn new(depth: usize, entry_budget: usize) -> Self {
        Self {
            depth: depth.max(1),
            entry_budget: entry_budget.max(1),
        }
    }

    pub fn estimate(&self, dir: &Path, classifier: &PathClassifier) -> Estimate {
        let pruner = classifier.clone();
        // Serial: the estimator already runs on a scanner rayon worker, and a
        // jwalk iterator blocking on the same pool can starve it.
        let walker = jwalk::WalkDir::new(dir)
            .skip_hidden(false)
            .follow_links(false)
            .max_depth(self.depth)
            .parallelism(jwalk::Parallelism::Serial)
            .process_read_dir(move |_depth, _dir, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => !pruner.is_off_limits(&entry.path()),
                    Err(_) => true,
                });
            });

        let mut bytes: u64 = 0;
        let mut visited: usize = 0;
        let mut truncated = false;

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    debug!("estimator skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.depth == 0 {
                continue;
            }

            visited += 1;
            if visited > self.entry_budget {
                truncated = true;
                break;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if entry.depth >= self.depth {
                    truncated = true;
                }
            } else if let Ok(meta) = std::fs::symlink_metadata(entry.path()) {
                bytes += meta.len();
            }
        }

        Estimate { bytes, truncated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::fs;

    fn write_bytes(path: &Path, n: usize) {
        fs::write(path, vec![0u8; n]).unwrap();
    }

    #[test]
    fn shallow_tree_is_counted_exactly() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        write_bytes(&tmp.path().join("top.bin"), 10);
        write_bytes(&tmp.path().join("a/inner.bin"), 20);

        let est = Estimator::new(4, 1_000).estimate(tmp.path(), &PathClassifier::default());
        assert_eq!(est, Estimate { bytes: 30, truncated: false });
    }

    #[test]
    fn depth_limit_truncates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        write_bytes(&tmp.path().join("a/one.bin"), 5);
        write_bytes(&deep.join("far.bin"), 500);

        let est = Estimator::new(2, 1_000).estimate(tmp.path(), &PathClassifier::default());
        assert_eq!(est.bytes, 5);
        assert!(est.truncated);
    }

    #[test]
    fn entry_budget_truncates() {
        let tmp = tempfile::TempDir::new().unwrap();
        for i in 0..10 {
            write_bytes(&tmp.path().join(format!("f{i}")), 1);
        }
        let est = Estimator::new(3, 4).estimate(tmp.path(), &PathClassifier::default());
        assert!(est.truncated);
        assert_eq!(est.bytes, 4);
    }

    #[test]
    fn excluded_trees_are_pruned() {
        let tmp = tempfile::TempDir::new().unwrap();
        let excluded = tmp.path().join("skip");
        fs::create_dir_all(&excluded).unwrap();
        write_bytes(&excluded.join("big.bin"), 1_000);
        write_bytes(&tmp.path().join("keep.bin"), 7);

        let classifier = PathClassifier::new(&Settings {
            excluded_paths: vec![excluded.to_string_lossy().into_owned()],
            ..Settings::default()
        });
        let est = Estimator::new(3, 1_000).estimate(tmp.path(), &classifier);
        assert_eq!(est.bytes, 7);
    }
}
