//! Throwaway git repositories for tests, built directly through libgit2.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{Commit, Oid, Repository, Signature};

pub fn init_repo(path: &Path) -> Repository {
    Repository::init(path).unwrap()
}

pub fn init_bare(path: &Path) -> Repository {
    Repository::init_bare(path).unwrap()
}

/// Commit a full snapshot: `files` is the complete tree, so anything absent
/// from it counts as deleted relative to `parent`. No ref is moved.
pub fn commit(repo: &Repository, parent: Option<Oid>, files: &[(&str, &str)], message: &str) -> Oid {
    let tree = repo.find_tree(write_tree(repo, files)).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parents: Vec<Commit> = parent
        .map(|p| repo.find_commit(p).unwrap())
        .into_iter()
        .collect();
    let parent_refs: Vec<&Commit> = parents.iter().collect();
    repo.commit(None, &sig, &sig, message, &tree, &parent_refs).unwrap()
}

fn write_tree(repo: &Repository, files: &[(&str, &str)]) -> Oid {
    let mut blobs: BTreeMap<&str, &str> = BTreeMap::new();
    let mut dirs: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for &(path, content) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, content)),
            None => {
                blobs.insert(path, content);
            }
        }
    }

    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in blobs {
        let oid = repo.blob(content.as_bytes()).unwrap();
        builder.insert(name, oid, 0o100644).unwrap();
    }
    for (name, children) in dirs {
        let oid = write_tree(repo, &children);
        builder.insert(name, oid, 0o040000).unwrap();
    }
    builder.write().unwrap()
}

/// Remove a loose object from the store, leaving anything that points at it dangling.
pub fn delete_object(repo: &Repository, oid: Oid) {
    let hex = oid.to_string();
    let path = repo.path().join("objects").join(&hex[..2]).join(&hex[2..]);
    std::fs::remove_file(path).unwrap();
}
