use std::fmt;
use std::path::Path;

use crate::checkout::{Checkout, CheckoutError};
use crate::records::TestRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NoCommit,
    NoCheckout,
    BadRepo,
    GitError,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::NoCommit => "no commit",
            Status::NoCheckout => "no checkout",
            Status::BadRepo => "bad repo",
            Status::GitError => "git error",
        };
        f.pad(s)
    }
}

/// Whether a record's checkout, commit and (explicit) base all resolve locally,
/// and the commit's tree is readable.
pub fn status_of(repos_dir: &Path, record: &TestRecord) -> Status {
    let Some(commit) = record.commit_rev() else {
        return Status::NoCommit;
    };
    let checkout = match Checkout::open(repos_dir, &record.repo) {
        Ok(c) => c,
        Err(e) => return status_from(&e),
    };
    let resolved = checkout.resolve(commit).and_then(|head| {
        if let Some(base) = record.base_rev() {
            checkout.resolve(base)?;
        }
        checkout.check_tree(head)
    });
    match resolved {
        Ok(()) => Status::Ok,
        Err(e) => status_from(&e),
    }
}

fn status_from(err: &CheckoutError) -> Status {
    match err {
        CheckoutError::BadRepoRef(_) => Status::BadRepo,
        CheckoutError::NotFound(_) => Status::NoCheckout,
        CheckoutError::MissingRevision { .. } => Status::NoCommit,
        CheckoutError::Git { .. } => Status::GitError,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub ok: usize,
    pub no_commit: usize,
    pub no_checkout: usize,
    pub other: usize,
}

impl CheckSummary {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::NoCommit => self.no_commit += 1,
            Status::NoCheckout => self.no_checkout += 1,
            Status::BadRepo | Status::GitError => self.other += 1,
        }
    }
}
