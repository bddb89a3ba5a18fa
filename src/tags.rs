//! Streamed-tag parsing
//!
//! Recognises `<tag attr="value">...</tag>` regions in text that is still
//! arriving, so a consumer can route partial output to the right section
//! before the response is complete. An open tag with no closing tag yet is
//! reported as an incomplete region running to the end of the text.
//!
//! Parsing re-scans the whole buffer on every fragment. That is quadratic in
//! the number of fragments, which is fine for responses of a few KB; an
//! incremental scanner would be needed for unbounded output.

use crate::models::ParsedTag;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref TAG_OPEN: Regex = Regex::new(r"<(?P<tag>\w+)(?P<attr>[^>]*)>").unwrap();
    static ref TAG_ATTR: Regex = Regex::new(r#"(\w+)="(.*?)""#).unwrap();
    static ref ANSWER: Regex = Regex::new(r"(?s)<Answer>(.*?)</Answer>").unwrap();
}

/// Parse every top-level tagged region in `text`
pub fn parse_streamed_tags(text: &str) -> Vec<ParsedTag> {
    let mut pos = 0;
    let mut tags = Vec::new();

    while let Some(cap) = TAG_OPEN.captures(&text[pos..]) {
        let (Some(whole), Some(tag)) = (cap.get(0), cap.name("tag")) else {
            break;
        };
        let tag = tag.as_str();
        let attr = cap.name("attr").map_or("", |m| m.as_str()).trim();

        let attributes: HashMap<String, String> = TAG_ATTR
            .captures_iter(attr)
            .map(|a| (a[1].to_string(), a[2].to_string()))
            .collect();

        let content_start = pos + whole.end();
        let (content_end, is_complete) = match find_closing_tag(text, content_start, tag) {
            Some(end) => {
                pos = end;
                (end - closing(tag).len(), true)
            }
            None => {
                pos = text.len();
                (text.len(), false)
            }
        };

        tags.push(ParsedTag {
            tag: tag.to_string(),
            attributes,
            content: text[content_start..content_end].trim().to_string(),
            is_complete,
        });
    }

    tags
}

fn closing(tag: &str) -> String {
    format!("</{}>", tag)
}

/// Byte offset just past the `</tag>` matching an already-open `<tag`
fn find_closing_tag(text: &str, start: usize, tag: &str) -> Option<usize> {
    let open = format!("<{}", tag);
    let close = closing(tag);

    let mut pos = start;
    let mut depth = 1;

    while depth > 0 {
        let next_open = find_open(text, pos, &open);
        let next_close = text[pos..].find(&close).map(|i| i + pos)?;

        match next_open {
            Some(o) if o < next_close => {
                depth += 1;
                pos = o + open.len();
            }
            _ => {
                depth -= 1;
                pos = next_close + close.len();
            }
        }
    }

    Some(pos)
}

/// Next `<tag` that opens the same tag, not a longer name like `<tags`
fn find_open(text: &str, from: usize, open: &str) -> Option<usize> {
    let mut pos = from;

    while let Some(i) = text[pos..].find(open) {
        let at = pos + i;
        let after = at + open.len();
        match text[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => return Some(at),
            Some(_) => pos = after,
            None => return None,
        }
    }

    None
}

/// Keep only the `<Answer>` region of a peer response
///
/// The last region wins when a peer emits several. Without one, the whole
/// response is the answer.
pub fn extract_answer(response: &str) -> String {
    ANSWER
        .captures_iter(response)
        .last()
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| response.to_string())
}

/// Accumulates fragments and re-parses on every push
#[derive(Debug, Default)]
pub struct StreamedTagParser {
    buffer: String,
    tags: Vec<ParsedTag>,
}

impl StreamedTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> &[ParsedTag] {
        self.buffer.push_str(fragment);
        self.tags = parse_streamed_tags(&self.buffer);
        &self.tags
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }
}

//
// ================= Section Tracking =================
//

pub const MAIN_AGENT_TAG: &str = "main_agent";
pub const PEER_AGENT_TAG: &str = "agent";

/// Who is speaking in a region of orchestrator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Main,
    Peer(String),
    Other(String),
}

impl Section {
    fn of(tag: &ParsedTag) -> Self {
        match tag.tag.as_str() {
            MAIN_AGENT_TAG => Section::Main,
            PEER_AGENT_TAG => Section::Peer(
                tag.attributes
                    .get("name")
                    .cloned()
                    .unwrap_or_else(|| "Agent".to_string()),
            ),
            other => Section::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionUpdate {
    /// Position of the region among all regions seen so far
    pub block: usize,
    pub section: Section,
    pub content: String,
    pub is_complete: bool,
    /// True the first time this block is reported
    pub opened: bool,
}

/// Turns orchestrator chunk text into per-section display updates
#[derive(Debug, Default)]
pub struct SectionTracker {
    parser: StreamedTagParser,
    seen: usize,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every section it touched, in order
    ///
    /// The previously current section is reported again so its tail is not
    /// lost when the same chunk closes it and opens later ones.
    pub fn push(&mut self, fragment: &str) -> Vec<SectionUpdate> {
        let seen = self.seen;
        let tags = self.parser.push(fragment);
        let count = tags.len();

        let updates: Vec<SectionUpdate> = tags
            .iter()
            .enumerate()
            .skip(seen.saturating_sub(1))
            .map(|(block, tag)| SectionUpdate {
                block,
                section: Section::of(tag),
                content: tag.content.clone(),
                is_complete: tag.is_complete,
                opened: block >= seen,
            })
            .collect();

        self.seen = seen.max(count);
        updates
    }
}
