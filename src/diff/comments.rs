use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSyntax {
    /// `// line` and `/* block */`
    CStyle,
    /// C-style where block comments nest (Rust)
    CStyleNested,
    /// `# line`
    Hash,
    /// `# line` plus nesting `#[ block ]#` and `##[ doc ]##`
    Nim,
}

impl CommentSyntax {
    /// Length of the block comment opener at `i`, if there is one.
    fn block_open(self, chars: &[char], i: usize) -> Option<usize> {
        let at = |pat: &str| starts_with(chars, i, pat).then(|| pat.len());
        match self {
            CommentSyntax::CStyle | CommentSyntax::CStyleNested => at("/*"),
            CommentSyntax::Nim => at("##[").or_else(|| at("#[")),
            CommentSyntax::Hash => None,
        }
    }

    fn block_close(self, chars: &[char], i: usize) -> Option<usize> {
        let at = |pat: &str| starts_with(chars, i, pat).then(|| pat.len());
        match self {
            CommentSyntax::CStyle | CommentSyntax::CStyleNested => at("*/"),
            CommentSyntax::Nim => at("]##").or_else(|| at("]#")),
            CommentSyntax::Hash => None,
        }
    }

    fn nests(self) -> bool {
        matches!(self, CommentSyntax::CStyleNested | CommentSyntax::Nim)
    }
}

const C_STYLE_EXTENSIONS: &[&str] = &[
    "c", "cpp", "h", "hpp", "cc", "cxx", "c++", "h++", "cs", "m", "mm", "java", "js", "jsx",
    "ts", "tsx", "proto", "swift", "kt", "go",
];
const HASH_EXTENSIONS: &[&str] = &["py", "sh", "rb"];

/// Maps lowercase file extensions to the comment syntax used for stripping.
#[derive(Debug, Clone)]
pub struct CommentTable {
    by_ext: BTreeMap<String, CommentSyntax>,
}

impl CommentTable {
    pub fn new(overrides: &BTreeMap<String, CommentSyntax>) -> Self {
        let mut by_ext = BTreeMap::new();
        for ext in C_STYLE_EXTENSIONS {
            by_ext.insert(ext.to_string(), CommentSyntax::CStyle);
        }
        for ext in HASH_EXTENSIONS {
            by_ext.insert(ext.to_string(), CommentSyntax::Hash);
        }
        by_ext.insert("rs".to_string(), CommentSyntax::CStyleNested);
        by_ext.insert("nim".to_string(), CommentSyntax::Nim);
        for (ext, syntax) in overrides {
            by_ext.insert(ext.trim_start_matches('.').to_lowercase(), *syntax);
        }
        CommentTable { by_ext }
    }

    pub fn syntax_for(&self, path: &str) -> Option<CommentSyntax> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        self.by_ext.get(&ext.to_lowercase()).copied()
    }
}

/// Remove comments from `source`. Lines left blank by the removal are dropped
/// entirely; trailing comments are cut and the line right-trimmed. Other lines
/// come through byte for byte. Backtick literals (Go raw strings, JS
/// templates) may span lines and are copied whole.
pub fn strip_comments(source: &str, syntax: CommentSyntax) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut line = String::new();
    let mut had_comment = false;
    let mut depth = 0usize;
    let mut in_backtick = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            flush_line(&mut out, &mut line, had_comment, true);
            had_comment = depth > 0;
            i += 1;
            continue;
        }

        if depth > 0 {
            if let Some(len) = syntax.block_close(&chars, i) {
                depth -= 1;
                i += len;
            } else if let Some(len) = syntax.block_open(&chars, i).filter(|_| syntax.nests()) {
                depth += 1;
                i += len;
            } else {
                i += 1;
            }
            continue;
        }

        if in_backtick {
            line.push(c);
            match (c, next) {
                ('\\', Some(escaped)) if escaped != '\n' => {
                    line.push(escaped);
                    i += 2;
                    continue;
                }
                ('`', _) => in_backtick = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        if let Some(len) = syntax.block_open(&chars, i) {
            had_comment = true;
            depth = 1;
            i += len;
            continue;
        }

        match syntax {
            CommentSyntax::CStyle | CommentSyntax::CStyleNested => match (c, next) {
                ('/', Some('/')) => {
                    had_comment = true;
                    i = skip_to_eol(&chars, i);
                    continue;
                }
                ('`', _) => {
                    line.push(c);
                    in_backtick = true;
                    i += 1;
                    continue;
                }
                ('"', _) => {
                    i = copy_string(&chars, i, '"', &mut line);
                    continue;
                }
                ('\'', _) => {
                    if let Some(end) = char_literal_end(&chars, i) {
                        line.extend(&chars[i..=end]);
                        i = end + 1;
                        continue;
                    }
                }
                _ => {}
            },
            CommentSyntax::Hash | CommentSyntax::Nim => match c {
                '#' => {
                    had_comment = true;
                    i = skip_to_eol(&chars, i);
                    continue;
                }
                '"' | '\'' => {
                    i = copy_string(&chars, i, c, &mut line);
                    continue;
                }
                _ => {}
            },
        }

        line.push(c);
        i += 1;
    }

    if !line.is_empty() {
        flush_line(&mut out, &mut line, had_comment, false);
    }
    out
}

fn flush_line(out: &mut String, line: &mut String, had_comment: bool, newline: bool) {
    if had_comment {
        let kept = line.trim_end();
        if kept.is_empty() {
            line.clear();
            return;
        }
        out.push_str(kept);
    } else {
        out.push_str(line);
    }
    if newline {
        out.push('\n');
    }
    line.clear();
}

fn starts_with(chars: &[char], i: usize, pat: &str) -> bool {
    pat.chars()
        .enumerate()
        .all(|(k, p)| chars.get(i + k) == Some(&p))
}

fn skip_to_eol(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

/// Copy a quoted literal starting at `start`; returns the index after it.
/// Unterminated literals end at the newline.
fn copy_string(chars: &[char], start: usize, quote: char, line: &mut String) -> usize {
    line.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            return i;
        }
        line.push(c);
        if c == '\\' {
            if let Some(&escaped) = chars.get(i + 1).filter(|&&e| e != '\n') {
                line.push(escaped);
                i += 2;
                continue;
            }
        } else if c == quote {
            return i + 1;
        }
        i += 1;
    }
    i
}

/// `'x'` or a short escape like `'\n'` / `'\u{1F600}'`. A lone `'` (Rust
/// lifetimes, apostrophes) is not a literal.
fn char_literal_end(chars: &[char], start: usize) -> Option<usize> {
    match *chars.get(start + 1)? {
        '\n' | '\'' => None,
        '\\' => (start + 2..chars.len().min(start + 12))
            .take_while(|&j| chars[j] != '\n')
            .find(|&j| j > start + 2 && chars[j] == '\''),
        _ => (chars.get(start + 2) == Some(&'\'')).then_some(start + 2),
    }
}
