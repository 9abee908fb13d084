//! Header/body splitting and metadata extraction.
//!
//! Public-domain archive texts carry a licensing preamble terminated by a
//! line containing `*** START OF ...` and a trailer opened by `*** END OF
//! ...`. The splitter keeps everything before the start line as the header
//! and everything from the start line up to (not including) the end line as
//! the body. Matching is case-insensitive; a document without markers is all
//! body.

use once_cell::sync::Lazy;
use regex::Regex;

const START_MARKER: &str = "*** start of";
const END_MARKER: &str = "*** end of";

#[derive(Debug, Clone, PartialEq)]
pub struct SplitDocument {
    pub header: String,
    pub body: String,
}

/// Splits a raw document into header and body.
pub fn split_header_body(text: &str) -> SplitDocument {
    let Some(start) = find_marker_line(text, START_MARKER, 0) else {
        return SplitDocument {
            header: String::new(),
            body: text.trim().to_string(),
        };
    };

    let header = &text[..start.line_start];
    let after_start = start.line_end;
    let body = match find_marker_line(text, END_MARKER, after_start) {
        Some(end) if end.line_start > start.line_start => &text[start.line_start..end.line_start],
        _ => &text[start.line_start..],
    };

    SplitDocument {
        header: header.trim().to_string(),
        body: body.trim().to_string(),
    }
}

struct MarkerHit {
    line_start: usize,
    line_end: usize,
}

/// Finds the first line at or after byte offset `from` that contains
/// `marker` (which must be lowercase), case-insensitively. Returns the byte
/// offsets of that line's start and of the following line.
fn find_marker_line(text: &str, marker: &str, from: usize) -> Option<MarkerHit> {
    let mut offset = from;
    for line in text[from..].split_inclusive('\n') {
        if line.to_lowercase().contains(marker) {
            return Some(MarkerHit {
                line_start: offset,
                line_end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

/// Metadata fields parsed from a document header. Absent or empty fields
/// stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub year: Option<u32>,
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*Title:[ \t]*(.+)$").unwrap());
static AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*Author:[ \t]*(.+)$").unwrap());
static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*Language:[ \t]*(.+)$").unwrap());
static RELEASE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*Release Date:[ \t]*(.+)$").unwrap());
static EBOOK_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[ebook\s*#\d+\]").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})").unwrap());

/// Extracts the standard metadata fields from a header.
pub fn extract_metadata(header: &str) -> HeaderMetadata {
    let release_date = capture_field(&RELEASE_DATE_RE, header).map(|value| {
        EBOOK_TAG_RE.replace_all(&value, "").trim().to_string()
    });
    let release_date = release_date.filter(|value| !value.is_empty());
    let year = release_date
        .as_deref()
        .and_then(|value| YEAR_RE.captures(value))
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok());

    HeaderMetadata {
        title: capture_field(&TITLE_RE, header),
        author: capture_field(&AUTHOR_RE, header),
        language: capture_field(&LANGUAGE_RE, header),
        release_date,
        year,
    }
}

fn capture_field(re: &Regex, header: &str) -> Option<String> {
    re.captures(header)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}
