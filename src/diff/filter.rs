use glob::{Pattern, PatternError};

/// File name shapes that hold the search routine across the engines on
/// open bench and fishtest.
pub const DEFAULT_FILTER_PATHS: &[&str] = &[
    "*search.*",
    "*searches.*",
    "*negamax.*",
    "*mybot.*",
    "*alphabeta.*",
    "*pvs.*",
    "*search_manager.*",
    "*search_worker.*",
    "*searcher.*",
    "*chess_search.*",
    "*Searcher.*",
    "*caps.*",
    "*engine.*",
    "*IterativeSearch.*",
    "*main.*",
    "*BasicSearch.*",
    "*search/mod.*",
    "*search/engine.*",
];

/// Glob allow-list over repository-relative paths. `*` also matches `/`.
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<Pattern>,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self, PatternError> {
        let patterns = globs
            .iter()
            .map(|g| Pattern::new(g.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PathFilter { patterns })
    }

    pub fn accepts_all(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.accepts_all() || self.patterns.iter().any(|p| p.matches(path))
    }

    /// First path no pattern accepts, if any.
    pub fn first_rejected<'a>(&self, paths: &'a [String]) -> Option<&'a str> {
        paths
            .iter()
            .find(|p| !self.matches(p))
            .map(String::as_str)
    }
}
