pub mod comments;
pub mod filter;

use std::path::Path;

use git2::{Oid, Patch};

use crate::checkout::{Checkout, CheckoutError};
use crate::records::FileContent;
use comments::{strip_comments, CommentTable};

/// Diff between two commits of one checkout over an already-filtered file list.
pub struct DiffSource<'a> {
    pub checkout: &'a Checkout,
    pub base: Option<Oid>,
    pub head: Oid,
    pub files: &'a [String],
}

impl DiffSource<'_> {
    /// The diff as git sees it.
    pub fn raw(&self) -> Result<String, CheckoutError> {
        self.checkout.unified_diff(self.base, self.head, self.files)
    }

    /// Comments are stripped from both sides of every file first, then the
    /// diff is regenerated, so comment-only edits vanish.
    pub fn stripped(&self, table: &CommentTable) -> Result<String, CheckoutError> {
        let mut text = String::new();
        for file in self.files {
            let old = self.side(self.base, file, Some(table))?;
            let new = self.side(Some(self.head), file, Some(table))?;
            if old.is_none() && new.is_none() {
                continue;
            }
            let old = old.unwrap_or_default();
            let new = new.unwrap_or_default();
            if old == new {
                continue;
            }
            text.push_str(&buffer_diff(file, &old, &new).map_err(|source| CheckoutError::Git {
                path: self.checkout.path().to_path_buf(),
                source,
            })?);
        }
        Ok(text)
    }

    /// Per-file contents at base and head, stripped when `table` is given.
    pub fn versions(
        &self,
        table: Option<&CommentTable>,
    ) -> Result<(Vec<FileContent>, Vec<FileContent>), CheckoutError> {
        let mut old_versions = Vec::with_capacity(self.files.len());
        let mut new_versions = Vec::with_capacity(self.files.len());
        for file in self.files {
            old_versions.push(FileContent {
                filepath: file.clone(),
                content: self.side(self.base, file, table)?.map(lossy),
            });
            new_versions.push(FileContent {
                filepath: file.clone(),
                content: self.side(Some(self.head), file, table)?.map(lossy),
            });
        }
        Ok((old_versions, new_versions))
    }

    fn side(
        &self,
        commit: Option<Oid>,
        file: &str,
        table: Option<&CommentTable>,
    ) -> Result<Option<Vec<u8>>, CheckoutError> {
        let Some(commit) = commit else {
            return Ok(None);
        };
        let Some(content) = self.checkout.file_at(commit, file)? else {
            return Ok(None);
        };
        let syntax = table.and_then(|t| t.syntax_for(file));
        Ok(Some(match (syntax, std::str::from_utf8(&content)) {
            (Some(syntax), Ok(text)) => strip_comments(text, syntax).into_bytes(),
            _ => content,
        }))
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Unified diff of two in-memory versions of `path`.
pub fn buffer_diff(path: &str, old: &[u8], new: &[u8]) -> Result<String, git2::Error> {
    let p = Path::new(path);
    let mut patch = Patch::from_buffers(old, Some(p), new, Some(p), None)?;
    let buf = patch.to_buf()?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
