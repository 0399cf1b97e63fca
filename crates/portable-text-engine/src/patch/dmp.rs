//! Diff-match-patch patch text, the payload of `diffMatchPatch` patches.
//!
//! The text format is the one produced by the diff-match-patch library:
//!
//! ```text
//! @@ -1,6 +1,9 @@
//!  he
//! +XYZ
//!  llo
//! ```
//!
//! Coordinates are 1-based in the header (`start,length`, with the length
//! omitted when it is 1 and `start,0` naming the position before an empty
//! range), every hunk carries up to [`PATCH_MARGIN`] characters of context on
//! each side, and line bodies are URI-escaped with spaces left literal.
//!
//! Offsets and lengths count `char`s. Character diffs come from `similar`.

use std::sync::OnceLock;

use regex::Regex;
use similar::{ChangeTag, TextDiff};

/// Characters of context kept around every hunk
pub const PATCH_MARGIN: usize = 4;
/// Longest pattern the context-growing loop will build
const MATCH_MAX_BITS: usize = 32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DmpError {
    #[error("Invalid patch header: {0}")]
    InvalidHeader(String),
    #[error("Invalid patch mode '{mode}' in line: {line}")]
    InvalidMode { mode: char, line: String },
    #[error("Invalid escape sequence in patch line: {0}")]
    InvalidEscape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Delete,
    Equal,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub op: DiffOp,
    pub text: String,
}

impl Diff {
    fn new(op: DiffOp, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One `@@ ... @@` section of a patch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hunk {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl Hunk {
    /// Text this hunk expects to find (context plus deletions)
    pub fn source_text(&self) -> String {
        self.diffs
            .iter()
            .filter(|d| d.op != DiffOp::Insert)
            .map(|d| d.text.as_str())
            .collect()
    }

    /// Text this hunk leaves behind (context plus insertions)
    pub fn target_text(&self) -> String {
        self.diffs
            .iter()
            .filter(|d| d.op != DiffOp::Delete)
            .map(|d| d.text.as_str())
            .collect()
    }

    /// Net change in length when the hunk is applied
    pub fn delta(&self) -> isize {
        self.length2 as isize - self.length1 as isize
    }

    /// The edited region, context excluded, in the coordinates the hunk was made against
    pub fn edit_range(&self) -> std::ops::Range<usize> {
        let leading: usize = self
            .diffs
            .iter()
            .take_while(|d| d.op == DiffOp::Equal)
            .map(Diff::char_len)
            .sum();
        let trailing: usize = if self.diffs.iter().all(|d| d.op == DiffOp::Equal) {
            0
        } else {
            self.diffs
                .iter()
                .rev()
                .take_while(|d| d.op == DiffOp::Equal)
                .map(Diff::char_len)
                .sum()
        };
        let start = self.start1 + leading;
        let end = (self.start1 + self.length1).saturating_sub(trailing).max(start);
        start..end
    }
}

/// Character-level diff of two strings, with runs of the same kind merged
pub fn diff(text1: &str, text2: &str) -> Vec<Diff> {
    let text_diff = TextDiff::from_chars(text1, text2);
    let mut diffs: Vec<Diff> = Vec::new();
    for change in text_diff.iter_all_changes() {
        let op = match change.tag() {
            ChangeTag::Equal => DiffOp::Equal,
            ChangeTag::Delete => DiffOp::Delete,
            ChangeTag::Insert => DiffOp::Insert,
        };
        match diffs.last_mut() {
            Some(last) if last.op == op => last.text.push_str(change.value()),
            _ => diffs.push(Diff::new(op, change.value())),
        }
    }
    diffs
}

fn substring(text: &[char], start: usize, end: usize) -> &[char] {
    let end = end.min(text.len());
    let start = start.min(end);
    &text[start..end]
}

fn index_of(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn last_index_of(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Grow the hunk's context until its pattern is unique in `text`
fn add_context(hunk: &mut Hunk, text: &[char]) {
    if text.is_empty() {
        return;
    }
    let mut pattern = substring(text, hunk.start2, hunk.start2 + hunk.length1);
    let mut padding = 0;
    while index_of(text, pattern) != last_index_of(text, pattern)
        && pattern.len() < MATCH_MAX_BITS - PATCH_MARGIN - PATCH_MARGIN
    {
        padding += PATCH_MARGIN;
        pattern = substring(
            text,
            hunk.start2.saturating_sub(padding),
            hunk.start2 + hunk.length1 + padding,
        );
    }
    padding += PATCH_MARGIN;

    let prefix: String = substring(text, hunk.start2.saturating_sub(padding), hunk.start2)
        .iter()
        .collect();
    let suffix: String = substring(
        text,
        hunk.start2 + hunk.length1,
        hunk.start2 + hunk.length1 + padding,
    )
    .iter()
    .collect();
    let prefix_len = prefix.chars().count();
    let suffix_len = suffix.chars().count();

    if !prefix.is_empty() {
        hunk.diffs.insert(0, Diff::new(DiffOp::Equal, prefix));
    }
    if !suffix.is_empty() {
        hunk.diffs.push(Diff::new(DiffOp::Equal, suffix));
    }
    hunk.start1 -= prefix_len;
    hunk.start2 -= prefix_len;
    hunk.length1 += prefix_len + suffix_len;
    hunk.length2 += prefix_len + suffix_len;
}

/// Build the hunks turning `text1` into `text2`
pub fn make(text1: &str, text2: &str) -> Vec<Hunk> {
    let diffs = diff(text1, text2);
    if diffs.iter().all(|d| d.op == DiffOp::Equal) {
        return Vec::new();
    }

    let mut hunks = Vec::new();
    let mut hunk = Hunk::default();
    let mut char_count1 = 0;
    let mut char_count2 = 0;
    let mut prepatch: Vec<char> = text1.chars().collect();
    let mut postpatch = prepatch.clone();

    for (index, d) in diffs.iter().enumerate() {
        let len = d.char_len();
        if hunk.diffs.is_empty() && d.op != DiffOp::Equal {
            hunk.start1 = char_count1;
            hunk.start2 = char_count2;
        }

        match d.op {
            DiffOp::Insert => {
                hunk.diffs.push(d.clone());
                hunk.length2 += len;
                postpatch.splice(char_count2..char_count2, d.text.chars());
            }
            DiffOp::Delete => {
                hunk.length1 += len;
                hunk.diffs.push(d.clone());
                postpatch.drain(char_count2..char_count2 + len);
            }
            DiffOp::Equal => {
                if len <= 2 * PATCH_MARGIN && !hunk.diffs.is_empty() && index + 1 != diffs.len() {
                    // Small equality inside a hunk
                    hunk.diffs.push(d.clone());
                    hunk.length1 += len;
                    hunk.length2 += len;
                } else if len >= 2 * PATCH_MARGIN && !hunk.diffs.is_empty() {
                    add_context(&mut hunk, &prepatch);
                    hunks.push(std::mem::take(&mut hunk));
                    // Later hunks are expressed against the text with earlier hunks applied
                    prepatch = postpatch.clone();
                    char_count1 = char_count2;
                }
            }
        }

        if d.op != DiffOp::Insert {
            char_count1 += len;
        }
        if d.op != DiffOp::Delete {
            char_count2 += len;
        }
    }

    if !hunk.diffs.is_empty() {
        add_context(&mut hunk, &prepatch);
        hunks.push(hunk);
    }
    hunks
}

/// Characters `encodeURI` leaves alone besides alphanumerics and `-_.~`
const URI_RESERVED: &[u8] = b"!#$&'()*+,/:;=?@ ";

fn encode(text: &str) -> String {
    let encoded = urlencoding::encode(text);
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(encoded.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = encoded.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
            && URI_RESERVED.contains(&byte)
        {
            out.push(byte as char);
            i += 3;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn decode(line: &str) -> Result<String, DmpError> {
    urlencoding::decode(line)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DmpError::InvalidEscape(line.to_string()))
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

pub fn to_text(hunks: &[Hunk]) -> String {
    let mut text = String::new();
    for hunk in hunks {
        text.push_str(&format!(
            "@@ -{} +{} @@\n",
            coords(hunk.start1, hunk.length1),
            coords(hunk.start2, hunk.length2)
        ));
        for d in &hunk.diffs {
            text.push(match d.op {
                DiffOp::Insert => '+',
                DiffOp::Delete => '-',
                DiffOp::Equal => ' ',
            });
            text.push_str(&encode(&d.text));
            text.push('\n');
        }
    }
    text
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@$").expect("Invalid patch header regex")
    })
}

fn parse_coords(line: &str, start: &str, length: &str) -> Result<(usize, usize), DmpError> {
    let invalid = || DmpError::InvalidHeader(line.to_string());
    let start: usize = start.parse().map_err(|_| invalid())?;
    match length {
        "" => Ok((start.checked_sub(1).ok_or_else(invalid)?, 1)),
        "0" => Ok((start, 0)),
        length => {
            let length = length.parse().map_err(|_| invalid())?;
            Ok((start.checked_sub(1).ok_or_else(invalid)?, length))
        }
    }
}

pub fn from_text(text: &str) -> Result<Vec<Hunk>, DmpError> {
    let mut hunks = Vec::new();
    let mut lines = text.split('\n').peekable();

    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }
        let caps = header_regex()
            .captures(line)
            .ok_or_else(|| DmpError::InvalidHeader(line.to_string()))?;
        let (start1, length1) = parse_coords(line, &caps[1], &caps[2])?;
        let (start2, length2) = parse_coords(line, &caps[3], &caps[4])?;
        let mut hunk = Hunk {
            diffs: Vec::new(),
            start1,
            start2,
            length1,
            length2,
        };

        while let Some(&body) = lines.peek() {
            let Some(mode) = body.chars().next() else {
                lines.next();
                continue;
            };
            if mode == '@' {
                break;
            }
            let content = decode(&body[mode.len_utf8()..])?;
            let op = match mode {
                '-' => DiffOp::Delete,
                '+' => DiffOp::Insert,
                ' ' => DiffOp::Equal,
                _ => {
                    return Err(DmpError::InvalidMode {
                        mode,
                        line: body.to_string(),
                    });
                }
            };
            hunk.diffs.push(Diff::new(op, content));
            lines.next();
        }
        hunks.push(hunk);
    }
    Ok(hunks)
}

fn matches_at(text: &[char], at: usize, pattern: &[char]) -> bool {
    at + pattern.len() <= text.len() && &text[at..at + pattern.len()] == pattern
}

fn nearest_occurrence(text: &[char], pattern: &[char], expected: usize) -> Option<usize> {
    if pattern.is_empty() {
        return Some(expected.min(text.len()));
    }
    text.windows(pattern.len())
        .enumerate()
        .filter(|(_, w)| *w == pattern)
        .map(|(at, _)| at)
        .min_by_key(|at| at.abs_diff(expected))
}

/// Apply hunks to `text`, returning the new text and which hunks applied.
///
/// A hunk applies where its source text sits exactly at the expected location
/// or, failing that, at the nearest exact occurrence. A hunk whose target text
/// is already in place at the expected location counts as applied without
/// changing anything, so applying the same patch twice is harmless.
pub fn apply(hunks: &[Hunk], text: &str) -> (String, Vec<bool>) {
    let mut chars: Vec<char> = text.chars().collect();
    let mut results = Vec::with_capacity(hunks.len());
    let mut drift: isize = 0;

    for hunk in hunks {
        let expected = (hunk.start2 as isize + drift).max(0) as usize;
        let source: Vec<char> = hunk.source_text().chars().collect();
        let target: Vec<char> = hunk.target_text().chars().collect();

        let source_here = matches_at(&chars, expected, &source);
        let target_here = matches_at(&chars, expected, &target);
        // When both images fit, the longer one is the more specific match
        if source == target || (target_here && (!source_here || target.len() > source.len())) {
            results.push(true);
            continue;
        }

        let location = if source_here {
            Some(expected)
        } else {
            nearest_occurrence(&chars, &source, expected)
        };

        match location {
            Some(at) => {
                chars.splice(at..at + source.len(), target);
                drift = at as isize - hunk.start2 as isize;
                results.push(true);
            }
            None => {
                drift -= hunk.delta();
                results.push(false);
            }
        }
    }

    (chars.into_iter().collect(), results)
}

/// Patch text turning `text1` into `text2`; empty when they are equal
pub fn make_patch_text(text1: &str, text2: &str) -> String {
    to_text(&make(text1, text2))
}

/// Parse and apply a patch text in one go
pub fn apply_patch_text(patch_text: &str, text: &str) -> Result<(String, Vec<bool>), DmpError> {
    let hunks = from_text(patch_text)?;
    Ok(apply(&hunks, text))
}
