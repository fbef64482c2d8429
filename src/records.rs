use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Input ──

/// One test run as emitted by the open bench / fishtest extractors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestRecord {
    #[serde(alias = "testname")]
    pub id: String,
    /// Bare checkout name or a GitHub URL.
    #[serde(alias = "url")]
    pub repo: String,
    #[serde(alias = "new_hash", default)]
    pub commit: String,
    #[serde(alias = "base_hash", default)]
    pub base: Option<String>,
    #[serde(flatten)]
    pub meta: TestMeta,
}

impl TestRecord {
    /// Explicit base revision, if the record carries a non-empty one.
    pub fn base_rev(&self) -> Option<&str> {
        self.base.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }

    pub fn commit_rev(&self) -> Option<&str> {
        Some(self.commit.trim()).filter(|c| !c.is_empty())
    }
}

/// Metadata carried through from the extractors untouched (except `results`,
/// which the builder may fill from `statblock`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TestMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statblock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<SprtResults>,
    #[serde(
        default,
        deserialize_with = "deserialize_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SprtResults {
    pub llr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub elo0: f64,
    pub elo1: f64,
    #[serde(default)]
    pub pentanomial: Vec<u64>,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

/// Accepts both a bare array and the extractors' `{"list": [...]}` wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Bare(Vec<TestRecord>),
    Wrapped { list: Vec<TestRecord> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Seconds(f64),
    Text(String),
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let Some(raw) = Option::<RawDate>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw {
        RawDate::Seconds(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", secs)))
        }
        RawDate::Text(text) => parse_date_text(&text)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognised date: {}", text))),
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // Naive timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

pub fn parse_records(text: &str) -> serde_json::Result<Vec<TestRecord>> {
    let file: RecordFile = serde_json::from_str(text)?;
    Ok(match file {
        RecordFile::Bare(list) | RecordFile::Wrapped { list } => list,
    })
}

pub fn load_records(path: &Path) -> Result<Vec<TestRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {:?}", path))?;
    parse_records(&text).with_context(|| format!("Malformed test records in {:?}", path))
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileContent {
    pub filepath: String,
    pub content: Option<String>,
}

/// One dataset row: a test record joined with its filtered diff.
#[derive(Debug, Clone, Serialize)]
pub struct DiffRecord {
    pub id: String,
    pub repo: String,
    pub commit: String,
    /// `None` when the commit was diffed against the empty tree.
    pub base: Option<String>,
    #[serde(flatten)]
    pub meta: TestMeta,
    pub files: Vec<String>,
    pub diff: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_file_versions: Option<Vec<FileContent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_file_versions: Option<Vec<FileContent>>,
}

pub fn to_json(records: &[DiffRecord]) -> Result<String> {
    let mut json = serde_json::to_string_pretty(records)?;
    json.push('\n');
    Ok(json)
}

/// Write the whole dataset in one go, replacing whatever was at `path`.
pub fn write_dataset(path: &Path, records: &[DiffRecord]) -> Result<()> {
    let json = to_json(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    fs::write(path, json).with_context(|| format!("Failed to write output file {:?}", path))?;
    Ok(())
}

// ── Tests ──
