use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::records::SprtResults;

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s|\\n").unwrap());
static LLR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LLR:([-\d.]+)\(([-\d.]+),([-\d.]+)\)\[([-\d.]+),([-\d.]+)\]").unwrap()
});
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Total|Games):(\d+)W:(\d+)L:(\d+)D:(\d+)").unwrap());
static PTNML_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ptnml\(0-2\):(\d+),(\d+),(\d+),(\d+),(\d+)").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum StatblockError {
    #[error("no LLR group")]
    MissingLlr,
    #[error("no game totals")]
    MissingTotals,
    #[error("not a number: {0:?}")]
    Number(String),
    #[error("{total} games reported but W+L+D = {sum}")]
    Inconsistent { total: u64, sum: u64 },
}

fn num<T: FromStr>(caps: &Captures, idx: usize) -> Result<T, StatblockError> {
    let raw = &caps[idx];
    raw.parse().map_err(|_| StatblockError::Number(raw.to_string()))
}

/// Parse an open bench SPRT block:
///
/// ```text
/// LLR: 2.96 (-2.94, 2.94) [0.00, 5.00]
/// Games: 3584 W: 1020 L: 889 D: 1675
/// Ptnml(0-2): 78, 405, 696, 469, 144
/// ```
///
/// The pentanomial line is optional.
pub fn parse_statblock(text: &str) -> Result<SprtResults, StatblockError> {
    let cleaned = NOISE_RE.replace_all(text, "");

    let llr = LLR_RE.captures(&cleaned).ok_or(StatblockError::MissingLlr)?;
    let totals = TOTAL_RE.captures(&cleaned).ok_or(StatblockError::MissingTotals)?;

    let pentanomial = match PTNML_RE.captures(&cleaned) {
        Some(caps) => (1..=5).map(|i| num(&caps, i)).collect::<Result<Vec<u64>, _>>()?,
        None => Vec::new(),
    };

    let results = SprtResults {
        llr: num(&llr, 1)?,
        lower_bound: num(&llr, 2)?,
        upper_bound: num(&llr, 3)?,
        elo0: num(&llr, 4)?,
        elo1: num(&llr, 5)?,
        pentanomial,
        wins: num(&totals, 2)?,
        losses: num(&totals, 3)?,
        draws: num(&totals, 4)?,
    };

    let total: u64 = num(&totals, 1)?;
    let sum = results
        .wins
        .checked_add(results.losses)
        .and_then(|s| s.checked_add(results.draws));
    match sum {
        Some(sum) if sum == total => Ok(results),
        Some(sum) => Err(StatblockError::Inconsistent { total, sum }),
        None => Err(StatblockError::Inconsistent { total, sum: u64::MAX }),
    }
}
