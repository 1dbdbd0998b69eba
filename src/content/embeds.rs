//! Embed tokenizer for lesson markdown.
//!
//! Lessons reference interactive widgets through HTML-comment tokens:
//!
//! ```text
//! <!-- exercise:ex-01 -->
//! <!-- dataset:cities -->
//! <!-- colab:intro-notebook -->
//! ```
//!
//! Parsing splits a document into an ordered sequence of markdown and
//! embed segments. Tokens that do not match the exact shape (unknown type
//! keyword, disallowed characters in the id) are not recognized and pass
//! through untouched as ordinary markdown text.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EMBED_PATTERN: OnceLock<Regex> = OnceLock::new();

fn embed_pattern() -> &'static Regex {
    EMBED_PATTERN.get_or_init(|| {
        Regex::new(r"<!--\s*(exercise|dataset|colab):([a-zA-Z0-9_-]+)\s*-->")
            .expect("embed pattern is a valid regex")
    })
}

/// The closed set of embeddable widget kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedType {
    Exercise,
    Dataset,
    Colab,
}

impl EmbedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedType::Exercise => "exercise",
            EmbedType::Dataset => "dataset",
            EmbedType::Colab => "colab",
        }
    }
}

impl fmt::Display for EmbedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized embed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEmbed {
    #[serde(rename = "type")]
    pub kind: EmbedType,
    pub id: String,
    /// The original token text, byte-for-byte as it appeared in the source.
    pub raw: String,
}

/// One span of a parsed document, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentSegment {
    Markdown { content: String },
    Embed { content: String, embed: ParsedEmbed },
}

impl ContentSegment {
    pub fn content(&self) -> &str {
        match self {
            ContentSegment::Markdown { content } => content,
            ContentSegment::Embed { content, .. } => content,
        }
    }
}

/// Result of tokenizing one markdown document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub segments: Vec<ContentSegment>,
    pub embeds: Vec<ParsedEmbed>,
}

fn push_markdown(segments: &mut Vec<ContentSegment>, span: &str) {
    let trimmed = span.trim();
    if !trimmed.is_empty() {
        segments.push(ContentSegment::Markdown {
            content: trimmed.to_string(),
        });
    }
}

/// Tokenizes markdown into segments and discovered embeds, both in
/// first-occurrence order.
///
/// Markdown spans are trimmed at segment boundaries; spans that are empty
/// after trimming are dropped, so back-to-back embeds produce no spurious
/// markdown segment between them.
pub fn parse_embeds(markdown: &str) -> ParsedContent {
    let mut segments = Vec::new();
    let mut embeds = Vec::new();
    let mut last_end = 0;

    for captures in embed_pattern().captures_iter(markdown) {
        let token = captures.get(0).expect("match always has a group 0");
        let kind = match &captures[1] {
            "exercise" => EmbedType::Exercise,
            "dataset" => EmbedType::Dataset,
            _ => EmbedType::Colab,
        };

        push_markdown(&mut segments, &markdown[last_end..token.start()]);

        let embed = ParsedEmbed {
            kind,
            id: captures[2].to_string(),
            raw: token.as_str().to_string(),
        };
        embeds.push(embed.clone());
        segments.push(ContentSegment::Embed {
            content: token.as_str().to_string(),
            embed,
        });

        last_end = token.end();
    }

    push_markdown(&mut segments, &markdown[last_end..]);

    ParsedContent { segments, embeds }
}

/// Reports whether the document contains any embed without allocating
/// segment lists. Used for fast-path rendering decisions.
pub fn has_embeds(markdown: &str) -> bool {
    embed_pattern().is_match(markdown)
}

/// All embed ids in first-occurrence order.
pub fn embed_ids(markdown: &str) -> Vec<String> {
    embed_pattern()
        .captures_iter(markdown)
        .map(|captures| captures[2].to_string())
        .collect()
}

/// Ids of embeds of one kind, in first-occurrence order. Used to pre-fetch
/// exercise dependencies without walking the whole document twice.
pub fn ids_of_type(markdown: &str, kind: EmbedType) -> Vec<String> {
    embed_pattern()
        .captures_iter(markdown)
        .filter(|captures| &captures[1] == kind.as_str())
        .map(|captures| captures[2].to_string())
        .collect()
}

/// Builds the canonical token for an embed reference.
pub fn embed_token(kind: EmbedType, id: &str) -> String {
    format!("<!-- {}:{} -->", kind, id)
}
