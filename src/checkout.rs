use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use git2::{Diff, DiffOptions, ErrorCode, ObjectType, Oid, Patch, Repository, Tree};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

static GITHUB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)github\.com[:/]([^/]+)/([^/?#]+)").unwrap());

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cannot derive a checkout path from {0:?}")]
    BadRepoRef(String),
    #[error("no checkout at {0:?}")]
    NotFound(PathBuf),
    #[error("revision {rev:?} not found in {path:?}")]
    MissingRevision { rev: String, path: PathBuf },
    #[error("git failure in {path:?}: {source}")]
    Git {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
}

impl CheckoutError {
    /// The repository or revision simply isn't there (as opposed to a broken checkout).
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, CheckoutError::Git { .. })
    }
}

/// Where a repo reference lives relative to the repos dir.
///
/// GitHub URLs (including `/compare/a..b` links) map to `owner/name`, anything
/// else is taken as a relative path such as `enginerepo`.
pub fn relative_checkout_path(repo: &str) -> Option<PathBuf> {
    let repo = repo.trim();
    if let Some(caps) = GITHUB_RE.captures(repo) {
        let name = caps[2].trim_end_matches(".git");
        if name.is_empty() {
            return None;
        }
        return Some(Path::new(&caps[1]).join(name));
    }
    if repo.is_empty()
        || repo.contains("://")
        || Path::new(repo).is_absolute()
        || repo.split(['/', '\\']).any(|part| part == "..")
    {
        return None;
    }
    Some(PathBuf::from(repo))
}

fn with_git_suffix(path: &Path) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(".git");
    PathBuf::from(s)
}

/// An operator-provided clone (bare or with a worktree) under the repos dir.
pub struct Checkout {
    repo: Repository,
    path: PathBuf,
}

impl Checkout {
    pub fn open(repos_dir: &Path, repo_ref: &str) -> Result<Self, CheckoutError> {
        let rel = relative_checkout_path(repo_ref)
            .ok_or_else(|| CheckoutError::BadRepoRef(repo_ref.to_string()))?;
        let path = repos_dir.join(rel);

        for candidate in [path.clone(), with_git_suffix(&path)] {
            if !candidate.is_dir() {
                continue;
            }
            match Repository::open(&candidate) {
                Ok(repo) => return Ok(Checkout { repo, path: candidate }),
                Err(e) => debug!("{:?} is not a git repository: {}", candidate, e.message()),
            }
        }
        Err(CheckoutError::NotFound(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn git(&self, source: git2::Error) -> CheckoutError {
        CheckoutError::Git {
            path: self.path.clone(),
            source,
        }
    }

    /// Resolve any revspec (full or short hash, ref name) to a commit id.
    pub fn resolve(&self, rev: &str) -> Result<Oid, CheckoutError> {
        let missing = || CheckoutError::MissingRevision {
            rev: rev.to_string(),
            path: self.path.clone(),
        };
        let object = match self.repo.revparse_single(rev) {
            Ok(object) => object,
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidSpec
                ) =>
            {
                return Err(missing())
            }
            Err(e) => return Err(self.git(e)),
        };
        object.peel_to_commit().map(|c| c.id()).map_err(|_| missing())
    }

    pub fn first_parent(&self, commit: Oid) -> Result<Option<Oid>, CheckoutError> {
        let commit = self.repo.find_commit(commit).map_err(|e| self.git(e))?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        commit.parent_id(0).map(Some).map_err(|e| self.git(e))
    }

    /// Load the commit's tree; a `Git` error means the object store is damaged.
    pub fn check_tree(&self, commit: Oid) -> Result<(), CheckoutError> {
        self.tree(commit).map(drop).map_err(|e| self.git(e))
    }

    fn tree(&self, commit: Oid) -> Result<Tree<'_>, git2::Error> {
        self.repo.find_commit(commit)?.tree()
    }

    /// `base = None` diffs against the empty tree. A non-empty `paths` limits
    /// the diff to exactly those paths.
    fn tree_diff(
        &self,
        base: Option<Oid>,
        head: Oid,
        paths: &[String],
    ) -> Result<Diff<'_>, git2::Error> {
        let old = base.map(|b| self.tree(b)).transpose()?;
        let new = self.tree(head)?;
        let mut opts = DiffOptions::new();
        if !paths.is_empty() {
            for p in paths {
                opts.pathspec(p.as_str());
            }
            opts.disable_pathspec_match(true);
        }
        self.repo
            .diff_tree_to_tree(old.as_ref(), Some(&new), Some(&mut opts))
    }

    /// Repository-relative paths touched between `base` and `head`, sorted.
    pub fn changed_files(&self, base: Option<Oid>, head: Oid) -> Result<Vec<String>, CheckoutError> {
        let diff = self.tree_diff(base, head, &[]).map_err(|e| self.git(e))?;
        let mut files: Vec<String> = diff
            .deltas()
            .filter_map(|d| d.new_file().path().or_else(|| d.old_file().path()).map(path_string))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Unified diff (`diff --git a/.. b/..` format) restricted to `files`.
    pub fn unified_diff(
        &self,
        base: Option<Oid>,
        head: Oid,
        files: &[String],
    ) -> Result<String, CheckoutError> {
        if files.is_empty() {
            return Ok(String::new());
        }
        let diff = self.tree_diff(base, head, files).map_err(|e| self.git(e))?;
        let mut text = String::new();
        for idx in 0..diff.deltas().len() {
            let Some(mut patch) = Patch::from_diff(&diff, idx).map_err(|e| self.git(e))? else {
                continue;
            };
            let buf = patch.to_buf().map_err(|e| self.git(e))?;
            text.push_str(&String::from_utf8_lossy(&buf));
        }
        Ok(text)
    }

    /// Blob content of `path` at `commit`; `None` if the path is absent or not a file.
    pub fn file_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, CheckoutError> {
        let tree = self.tree(commit).map_err(|e| self.git(e))?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(self.git(e)),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = self.repo.find_blob(entry.id()).map_err(|e| self.git(e))?;
        Ok(Some(blob.content().to_vec()))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ── Tests ──
