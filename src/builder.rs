use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checkout::{Checkout, CheckoutError};
use crate::diff::comments::CommentTable;
use crate::diff::filter::PathFilter;
use crate::diff::DiffSource;
use crate::records::{DiffRecord, TestMeta, TestRecord};
use crate::settings::{Settings, UnresolvedPolicy};
use crate::statblock;

/// Why a record produced no dataset row.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("record has no commit")]
    MissingCommit,
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error("changed file {0:?} is outside the search-code filter")]
    OutsideFilter(String),
    #[error("commit changes no files")]
    NoChanges,
    #[error("no search-code changes")]
    EmptyDiff,
}

impl SkipReason {
    pub fn is_unresolved(&self) -> bool {
        match self {
            SkipReason::MissingCommit => true,
            SkipReason::Checkout(e) => e.is_unresolved(),
            _ => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    /// Written rows whose filtered diff came out empty.
    pub empty: usize,
}

impl BuildStats {
    pub fn print(&self) {
        println!(
            "{} records: {} written ({} with empty diff), {} skipped.",
            self.total, self.written, self.empty, self.skipped,
        );
    }
}

pub struct Builder<'a> {
    repos_dir: &'a Path,
    settings: &'a Settings,
    filter: PathFilter,
    comments: CommentTable,
}

impl<'a> Builder<'a> {
    pub fn new(repos_dir: &'a Path, settings: &'a Settings) -> Result<Self> {
        let filter = PathFilter::new(&settings.filter_paths)
            .with_context(|| format!("Invalid filter pattern in {:?}", settings.filter_paths))?;
        Ok(Builder {
            repos_dir,
            settings,
            filter,
            comments: CommentTable::new(&settings.comment_syntax),
        })
    }

    /// Join every record with its diff, in input order. Unresolvable records
    /// are skipped unless the policy says to fail.
    pub fn build(
        &self,
        records: &[TestRecord],
        pb: &ProgressBar,
    ) -> Result<(Vec<DiffRecord>, BuildStats)> {
        let mut rows = Vec::with_capacity(records.len());
        let mut stats = BuildStats {
            total: records.len(),
            ..Default::default()
        };

        for (i, record) in records.iter().enumerate() {
            debug!(
                "Processing record {}/{}: {} ({} @ {})",
                i + 1,
                records.len(),
                record.id,
                record.repo,
                record.commit
            );
            match self.process(record) {
                Ok(row) => {
                    if row.diff.is_empty() {
                        stats.empty += 1;
                    }
                    rows.push(row);
                }
                Err(reason)
                    if reason.is_unresolved()
                        && self.settings.on_unresolved == UnresolvedPolicy::Fail =>
                {
                    bail!(
                        "Record {:?} (commit {:?}) could not be resolved: {}",
                        record.id,
                        record.commit,
                        reason
                    );
                }
                Err(reason) => {
                    warn!(id = %record.id, commit = %record.commit, "Skipping record: {}", reason);
                    stats.skipped += 1;
                }
            }
            pb.inc(1);
        }

        stats.written = rows.len();
        info!(
            total = stats.total,
            written = stats.written,
            skipped = stats.skipped,
            empty = stats.empty,
            "Dataset built"
        );
        Ok((rows, stats))
    }

    pub fn process(&self, record: &TestRecord) -> Result<DiffRecord, SkipReason> {
        let commit_rev = record.commit_rev().ok_or(SkipReason::MissingCommit)?;
        let checkout = Checkout::open(self.repos_dir, &record.repo)?;
        let head = checkout.resolve(commit_rev)?;
        let base = match record.base_rev() {
            Some(rev) => Some(checkout.resolve(rev)?),
            None => checkout.first_parent(head)?,
        };

        let changed = if base == Some(head) {
            Vec::new()
        } else {
            checkout.changed_files(base, head)?
        };

        let files = if self.settings.exclusive {
            if changed.is_empty() && !self.filter.accepts_all() {
                return Err(SkipReason::NoChanges);
            }
            if let Some(outside) = self.filter.first_rejected(&changed) {
                return Err(SkipReason::OutsideFilter(outside.to_string()));
            }
            changed
        } else {
            changed
                .into_iter()
                .filter(|f| self.filter.matches(f))
                .collect()
        };

        let source = DiffSource {
            checkout: &checkout,
            base,
            head,
            files: &files,
        };
        let diff = if self.settings.remove_comments {
            source.stripped(&self.comments)?
        } else {
            source.raw()?
        };
        if diff.is_empty() && self.settings.skip_empty {
            return Err(SkipReason::EmptyDiff);
        }

        let (old_file_versions, new_file_versions) = if self.settings.include_file_versions {
            let table = self.settings.remove_comments.then_some(&self.comments);
            let (old, new) = source.versions(table)?;
            (Some(old), Some(new))
        } else {
            (None, None)
        };

        Ok(DiffRecord {
            id: record.id.clone(),
            repo: record.repo.clone(),
            commit: head.to_string(),
            base: base.map(|b| b.to_string()),
            meta: with_results(&record.id, &record.meta),
            files,
            diff,
            old_file_versions,
            new_file_versions,
        })
    }
}

/// Fill `results` from the statblock when the extractor left it empty.
fn with_results(id: &str, meta: &TestMeta) -> TestMeta {
    let mut meta = meta.clone();
    if meta.results.is_none() {
        if let Some(block) = meta.statblock.as_deref().filter(|s| !s.trim().is_empty()) {
            match statblock::parse_statblock(block) {
                Ok(results) => meta.results = Some(results),
                Err(e) => debug!("Statblock of {} not parsed: {}", id, e),
            }
        }
    }
    meta
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use git2::Oid;

    use super::*;
    use crate::records::{parse_records, to_json};
    use crate::testutil::{commit, delete_object, init_repo};

    const README_V1: &str = "# Engine\n";
    const README_V2: &str = "# Engine\n\nNow stronger.\n";
    const SEARCH_V1: &str = "int search(int depth) {\n    return depth;\n}\n";
    const SEARCH_V2: &str =
        "int search(int depth) {\n    // null move pruning\n    return depth - 3; /* R=3 */\n}\n";

    struct Fixture {
        dir: tempfile::TempDir,
        base: Oid,
        head: Oid,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo = init_repo(&dir.path().join("enginerepo"));
            let base = commit(
                &repo,
                None,
                &[("README.md", README_V1), ("src/search.cpp", SEARCH_V1)],
                "base",
            );
            let head = commit(
                &repo,
                Some(base),
                &[("README.md", README_V2), ("src/search.cpp", SEARCH_V2)],
                "nmp",
            );
            Fixture { dir, base, head }
        }

        fn short(&self) -> String {
            self.head.to_string()[..7].to_string()
        }

        fn run(&self, input: &str, settings: &Settings) -> Result<(Vec<DiffRecord>, BuildStats)> {
            let records = parse_records(input).unwrap();
            let builder = Builder::new(self.dir.path(), settings).unwrap();
            builder.build(&records, &ProgressBar::hidden())
        }
    }

    fn input(id: &str, repo: &str, commit: &str) -> String {
        format!(r#"[{{"id": "{id}", "repo": "{repo}", "commit": "{commit}"}}]"#)
    }

    #[test]
    fn only_search_code_reaches_the_diff() {
        let fx = Fixture::new();
        let (rows, stats) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &Settings::default())
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, "t1");
        assert_eq!(row.commit, fx.head.to_string());
        assert_eq!(row.base, Some(fx.base.to_string()));
        assert_eq!(row.files, vec!["src/search.cpp".to_string()]);
        assert!(row.diff.contains("src/search.cpp"));
        assert!(row.diff.contains("+    return depth - 3; /* R=3 */"));
        assert!(!row.diff.contains("README"));
        assert_eq!(stats, BuildStats { total: 1, written: 1, skipped: 0, empty: 0 });
    }

    #[test]
    fn missing_commit_is_skipped() {
        let fx = Fixture::new();
        let (rows, stats) = fx
            .run(&input("t1", "enginerepo", "abc123f"), &Settings::default())
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(stats.skipped, 1);
        assert_eq!(to_json(&rows).unwrap(), "[]\n");
    }

    #[test]
    fn missing_checkout_does_not_abort_the_run() {
        let fx = Fixture::new();
        let text = format!(
            r#"[
                {{"id": "gone", "repo": "otherrepo", "commit": "{c}"}},
                {{"id": "t1", "repo": "enginerepo", "commit": "{c}"}},
                {{"id": "blank", "repo": "enginerepo", "commit": ""}}
            ]"#,
            c = fx.short()
        );
        let (rows, stats) = fx.run(&text, &Settings::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "t1");
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn fail_policy_aborts() {
        let fx = Fixture::new();
        let settings = Settings {
            on_unresolved: UnresolvedPolicy::Fail,
            ..Settings::default()
        };
        let err = fx
            .run(&input("t1", "enginerepo", "abc123f"), &settings)
            .unwrap_err();
        assert!(err.to_string().contains("could not be resolved"));
    }

    #[test]
    fn damaged_checkout_is_skipped_even_under_fail_policy() {
        let fx = Fixture::new();
        let broken = init_repo(&fx.dir.path().join("brokenrepo"));
        let head = commit(&broken, None, &[("search.cpp", "int x;\n")], "init");
        delete_object(&broken, broken.find_commit(head).unwrap().tree_id());

        let text = format!(
            r#"[
                {{"id": "broken", "repo": "brokenrepo", "commit": "{head}"}},
                {{"id": "ok", "repo": "enginerepo", "commit": "{c}"}}
            ]"#,
            c = fx.short()
        );
        let records = parse_records(&text).unwrap();
        let settings = Settings {
            on_unresolved: UnresolvedPolicy::Fail,
            ..Settings::default()
        };
        let builder = Builder::new(fx.dir.path(), &settings).unwrap();

        let reason = builder.process(&records[0]).unwrap_err();
        assert!(matches!(reason, SkipReason::Checkout(CheckoutError::Git { .. })));
        assert!(!reason.is_unresolved());

        let (rows, stats) = builder.build(&records, &ProgressBar::hidden()).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
        assert_eq!(stats, BuildStats { total: 2, written: 1, skipped: 1, empty: 0 });
    }

    #[test]
    fn exclusive_mode_rejects_mixed_commits() {
        let fx = Fixture::new();
        let settings = Settings {
            exclusive: true,
            ..Settings::default()
        };
        let (rows, stats) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &settings)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(stats.skipped, 1);

        // Same commit passes once README is allowed too.
        let settings = Settings {
            exclusive: true,
            filter_paths: vec!["*search.*".into(), "README.md".into()],
            ..Settings::default()
        };
        let (rows, _) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &settings)
            .unwrap();
        assert_eq!(rows[0].files.len(), 2);
        assert!(rows[0].diff.contains("README.md"));
    }

    #[test]
    fn remove_comments() {
        let fx = Fixture::new();
        let settings = Settings {
            remove_comments: true,
            ..Settings::default()
        };
        let (rows, _) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &settings)
            .unwrap();
        let diff = &rows[0].diff;
        assert!(diff.contains("+    return depth - 3;\n"));
        assert!(!diff.contains("null move"));
        assert!(!diff.contains("R=3"));
    }

    #[test]
    fn empty_diffs_kept_or_skipped() {
        let fx = Fixture::new();
        let readme_only = Settings {
            filter_paths: vec!["*eval.*".into()],
            ..Settings::default()
        };
        let (rows, stats) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &readme_only)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].diff.is_empty());
        assert!(rows[0].files.is_empty());
        assert_eq!(stats.empty, 1);

        let settings = Settings {
            skip_empty: true,
            ..readme_only
        };
        let (rows, stats) = fx
            .run(&input("t1", "enginerepo", &fx.short()), &settings)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn explicit_base_and_file_versions() {
        let fx = Fixture::new();
        let text = format!(
            r#"[{{"id": "t1", "repo": "enginerepo", "new_hash": "{h}", "base_hash": "{h}"}}]"#,
            h = fx.head
        );
        let settings = Settings {
            include_file_versions: true,
            ..Settings::default()
        };
        let (rows, _) = fx.run(&text, &settings).unwrap();
        assert!(rows[0].diff.is_empty());
        assert_eq!(rows[0].base, Some(fx.head.to_string()));
        assert_eq!(rows[0].old_file_versions, Some(vec![]));

        let text = format!(
            r#"[{{"id": "t1", "repo": "enginerepo", "commit": "{h}", "base": "{b}"}}]"#,
            h = fx.head,
            b = fx.base
        );
        let (rows, _) = fx.run(&text, &settings).unwrap();
        let old = rows[0].old_file_versions.as_ref().unwrap();
        let new = rows[0].new_file_versions.as_ref().unwrap();
        assert_eq!(old[0].content.as_deref(), Some(SEARCH_V1));
        assert_eq!(new[0].content.as_deref(), Some(SEARCH_V2));
    }

    #[test]
    fn results_filled_from_statblock() {
        let fx = Fixture::new();
        let text = format!(
            r#"[{{"testname": "nmp", "url": "enginerepo", "new_hash": "{c}",
                 "statblock": "LLR: 2.96 (-2.94, 2.94) [0.00, 5.00]\nGames: 3584 W: 1020 L: 889 D: 1675"}}]"#,
            c = fx.short()
        );
        let (rows, _) = fx.run(&text, &Settings::default()).unwrap();
        let results = rows[0].meta.results.as_ref().unwrap();
        assert_eq!(results.wins, 1020);
        assert!(results.pentanomial.is_empty());
    }

    #[test]
    fn identical_inputs_identical_output() {
        let fx = Fixture::new();
        let text = format!(
            r#"[
                {{"id": "b", "repo": "enginerepo", "commit": "{h}", "user": "x", "date": 1717245296}},
                {{"id": "a", "repo": "enginerepo", "commit": "{p}"}}
            ]"#,
            h = fx.short(),
            p = fx.base
        );
        let out = fx.dir.path().join("out").join("dataset.json");

        let (rows, _) = fx.run(&text, &Settings::default()).unwrap();
        crate::records::write_dataset(&out, &rows).unwrap();
        let first = std::fs::read(&out).unwrap();

        let (rows, _) = fx.run(&text, &Settings::default()).unwrap();
        crate::records::write_dataset(&out, &rows).unwrap();
        let second = std::fs::read(&out).unwrap();

        assert_eq!(first, second);
        // input order, not sorted by id
        assert_eq!(rows[0].id, "b");
        assert_eq!(rows[1].id, "a");
        // root commit: diffed against the empty tree
        assert_eq!(rows[1].base, None);
        assert!(rows[1].diff.contains("+int search(int depth) {"));
    }
}
