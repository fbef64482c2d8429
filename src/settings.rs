use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::diff::comments::CommentSyntax;
use crate::diff::filter::DEFAULT_FILTER_PATHS;

const ENV_PREFIX: &str = "DIFFSET";

/// What to do with a record whose checkout or commit cannot be found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Glob allow-list for "search code" paths; empty accepts everything.
    pub filter_paths: Vec<String>,
    pub remove_comments: bool,
    /// Skip a record unless every changed file matches `filter_paths`.
    pub exclusive: bool,
    pub skip_empty: bool,
    pub include_file_versions: bool,
    pub on_unresolved: UnresolvedPolicy,
    /// Extra extension → syntax entries, layered over the built-in table.
    pub comment_syntax: BTreeMap<String, CommentSyntax>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            filter_paths: DEFAULT_FILTER_PATHS.iter().map(|p| p.to_string()).collect(),
            remove_comments: false,
            exclusive: false,
            skip_empty: false,
            include_file_versions: false,
            on_unresolved: UnresolvedPolicy::Skip,
            comment_syntax: BTreeMap::new(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("filter_paths")
}

/// Defaults, then the optional TOML file, then `DIFFSET_*` variables.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    load_layers(path, environment())
}

fn load_layers(path: Option<&Path>, env: Environment) -> Result<Settings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let settings: Settings = builder
        .add_source(env)
        .build()
        .with_context(|| format!("Failed to load settings (config file: {:?})", path))?
        .try_deserialize()
        .context("Invalid settings")?;
    Ok(settings)
}
