//! Lexical pre/post-transform around parsing.
//!
//! Some GNU C found in preprocessed verification tasks trips the parser.
//! Before parsing, those constructs are replaced by stand-ins the parser
//! accepts; every replacement records a whitespace-insensitive pattern for the
//! stand-in and the text it hid. After instrumentation the patterns are applied
//! to the output, in the order they were recorded, to put the originals back.
//!
//! Masking steps, in order:
//! 1. Declarations containing `__extension__` become `extern <signature>;`
//!    stubs. A brace scan that cannot be resolved abandons this step only.
//! 2. `__inline` / `__restrict` become `inline` / `restrict` when the plain
//!    spelling never occurs in the file.
//! 3. `extern` declarations lose their `__attribute__((...))` and `__const`
//!    annotations.
//!
//! Comments are stripped first. Every step keeps line numbers unchanged, so
//! trace records refer to the lines of the original file.

use std::borrow::Cow;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{InstrumentError, Result};

const EXTENSION_MARKER: &str = r"\b__extension__\b";
const NORMALIZED_KEYWORDS: &[&str] = &["inline", "restrict"];
const ATTRIBUTE_OR_CONST: &str = r"(__attribute__ *\(\([a-zA-Z0-9_, ]*\)\)|__const )";
const DECLARATION_BODY: &str = r"[a-zA-Z0-9()_*, \n]*";

/// What to do when a recorded pattern no longer matches the output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Keep the stand-in text and log a warning
    #[default]
    LeaveMasked,
    /// Fail the file with `InstrumentError::RestorationMiss`
    Abort,
}

/// A recorded substitution: `pattern` matches the stand-in, `original` is the
/// text it replaced.
#[derive(Debug, Clone)]
pub struct Restoration {
    pub pattern: Regex,
    pub original: String,
    /// Replace every match instead of the first one only
    pub every_match: bool,
}

impl Restoration {
    fn first(pattern: &str, original: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            original: original.into(),
            every_match: false,
        })
    }

    fn every(pattern: &str, original: impl Into<String>) -> Result<Self> {
        Ok(Self {
            every_match: true,
            ..Self::first(pattern, original)?
        })
    }
}

/// The text handed to the parser, plus what is needed to undo the masking.
#[derive(Debug, Clone)]
pub struct MaskedSource {
    text: String,
    restorations: Vec<Restoration>,
}

impl MaskedSource {
    /// Pass `source` through untouched.
    pub fn unmasked(source: &str) -> Self {
        Self {
            text: source.to_string(),
            restorations: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn restorations(&self) -> &[Restoration] {
        &self.restorations
    }

    /// Put every masked construct back into `output`.
    pub fn restore(&self, output: &str, policy: RestorePolicy) -> Result<String> {
        let mut text = output.to_string();
        for restoration in &self.restorations {
            let original = NoExpand(&restoration.original);
            let limit = if restoration.every_match { 0 } else { 1 };
            let restored = match restoration.pattern.replacen(&text, limit, original) {
                Cow::Owned(restored) => Some(restored),
                Cow::Borrowed(_) => None,
            };
            if let Some(restored) = restored {
                text = restored;
                continue;
            }
            match policy {
                RestorePolicy::LeaveMasked => warn!(
                    "no match for restoration pattern `{}`; leaving the masked text in place",
                    restoration.pattern
                ),
                RestorePolicy::Abort => {
                    return Err(InstrumentError::RestorationMiss {
                        pattern: restoration.pattern.as_str().to_string(),
                    })
                }
            }
        }
        Ok(text)
    }
}

/// Strip comments and mask every construct the parser cannot accept.
pub fn mask(source: &str) -> Result<MaskedSource> {
    let stripped = strip_comments(source)?;
    let mut restorations = Vec::new();

    let mut segments = match mask_extensions(&stripped)? {
        Some((segments, stubs)) => {
            restorations.extend(stubs);
            segments
        }
        None => {
            warn!("unbalanced braces around __extension__; extension masking skipped");
            vec![Segment::plain(stripped.clone())]
        }
    };

    let normalized = normalize_keywords(&stripped, &mut segments, &mut restorations)?;
    strip_extern_attributes(&mut segments, &normalized, &mut restorations)?;

    let text: String = segments.into_iter().map(|segment| segment.text).collect();
    debug!("masked {} construct(s)", restorations.len());
    Ok(MaskedSource { text, restorations })
}

/// Replace each comment by a space followed by the newlines it spanned.
pub fn strip_comments(source: &str) -> Result<String> {
    let tokens = Regex::new(
        r#"//[^\n]*|/\*(?s:.*?)\*/|'(?:\\(?s:.)|[^\\'\n])*'|"(?:\\(?s:.)|[^\\"\n])*""#,
    )?;
    let stripped = tokens.replace_all(source, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        if token.starts_with('/') {
            let mut blank = String::from(" ");
            blank.extend(token.chars().filter(|c| *c == '\n'));
            blank
        } else {
            token.to_string()
        }
    });
    Ok(stripped.into_owned())
}

/// A regular expression matching `code` with any change of whitespace that
/// keeps its tokens apart.
pub fn fingerprint(code: &str) -> Result<String> {
    let tokens = Regex::new(r"\w+|[^\w\s]")?;
    let mut pattern = String::new();
    let mut previous_word = None;
    for token in tokens.find_iter(code) {
        let is_word = token.as_str().chars().all(|c| c.is_alphanumeric() || c == '_');
        if let Some(previous_word) = previous_word {
            pattern.push_str(if previous_word && is_word { r"\s+" } else { r"\s*" });
        }
        pattern.push_str(&regex::escape(token.as_str()));
        previous_word = Some(is_word);
    }
    Ok(pattern)
}

/// A piece of the masked text. Stubs are left alone by later steps.
#[derive(Debug)]
struct Segment {
    text: String,
    stub: bool,
}

impl Segment {
    fn plain(text: String) -> Self {
        Self { text, stub: false }
    }
}

/// A brace-delimited block at file scope and where its declaration begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TopLevelBlock {
    declaration: usize,
    open: usize,
    /// One past the closing brace, or past the `;` when declarators follow
    /// the block
    end: usize,
}

/// Collapse every declaration holding an `__extension__` marker into an
/// `extern` stub. `None` when the braces cannot be matched up.
fn mask_extensions(text: &str) -> Result<Option<(Vec<Segment>, Vec<Restoration>)>> {
    let marker = Regex::new(EXTENSION_MARKER)?;
    if !marker.is_match(text) {
        return Ok(Some((vec![Segment::plain(text.to_string())], Vec::new())));
    }
    let Some(blocks) = top_level_blocks(text) else {
        return Ok(None);
    };

    let mut targets: Vec<TopLevelBlock> = Vec::new();
    for found in marker.find_iter(text) {
        let at = found.start();
        let Some(block) = blocks.iter().find(|block| block.end > at) else {
            debug!("__extension__ at byte {at} has no block; left in place");
            continue;
        };
        if at < block.declaration {
            debug!("__extension__ at byte {at} ends without a block; left in place");
            continue;
        }
        if targets.last() != Some(block) {
            targets.push(*block);
        }
    }

    let mut segments = Vec::new();
    let mut restorations = Vec::new();
    let mut copied = 0;
    for block in targets {
        let leading = text[block.declaration..block.open].len()
            - text[block.declaration..block.open].trim_start().len();
        let start = block.declaration + leading;
        let original = &text[start..block.end];
        let signature = text[start..block.open].trim_end();

        let padding = "\n".repeat(newlines(original) - newlines(signature));
        let head = format!("extern {signature};");

        segments.push(Segment::plain(text[copied..start].to_string()));
        segments.push(Segment {
            text: format!("{head}{padding}"),
            stub: true,
        });
        restorations.push(Restoration::first(
            &format!("{}{}", fingerprint(&head)?, padding),
            original,
        )?);
        copied = block.end;
    }
    segments.push(Segment::plain(text[copied..].to_string()));

    Ok(Some((segments, restorations)))
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// File-scope blocks in document order. String and character literals and
/// preprocessor lines are skipped. A block that opens an aggregate or an
/// initializer extends through the `;` ending its declaration, so
/// `typedef struct {...} name;` is one unit. `None` on unbalanced braces.
fn top_level_blocks(text: &str) -> Option<Vec<TopLevelBlock>> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut declaration = 0;
    let mut open = 0;
    // Set while a closed block waits for the `;` of its declaration
    let mut pending = false;
    let mut at_line_start = true;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if at_line_start && byte == b'#' {
            i = preprocessor_line_end(bytes, i);
            if depth == 0 && !pending {
                declaration = i;
            }
            continue;
        }
        if !byte.is_ascii_whitespace() {
            at_line_start = false;
        }
        match byte {
            b'\n' => at_line_start = true,
            b'"' | b'\'' => {
                i = literal_end(bytes, i);
                continue;
            }
            b'{' => {
                if depth == 0 && !pending {
                    open = i;
                }
                depth += 1;
            }
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 && !pending {
                    if continues_past_block(&text[declaration..open]) {
                        pending = true;
                    } else {
                        blocks.push(TopLevelBlock {
                            declaration,
                            open,
                            end: i + 1,
                        });
                        declaration = i + 1;
                    }
                }
            }
            b';' if depth == 0 => {
                if pending {
                    blocks.push(TopLevelBlock {
                        declaration,
                        open,
                        end: i + 1,
                    });
                    pending = false;
                }
                declaration = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    (depth == 0 && !pending).then_some(blocks)
}

/// Whether the block opened after `signature` belongs to a struct, union or
/// enum specifier or to an initializer, rather than to a function body.
fn continues_past_block(signature: &str) -> bool {
    let signature = signature.trim_end();
    if signature.ends_with('=') {
        return true;
    }
    if signature.ends_with(')') {
        return false;
    }
    signature
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .rev()
        .take(2)
        .any(|word| matches!(word, "struct" | "union" | "enum"))
}

/// Index just past the newline ending the directive at `start`, following
/// backslash continuations.
fn preprocessor_line_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn literal_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Rewrite `__inline`/`__restrict` tokens outside stubs. Returns the
/// keywords that were rewritten.
fn normalize_keywords(
    source: &str,
    segments: &mut [Segment],
    restorations: &mut Vec<Restoration>,
) -> Result<Vec<&'static str>> {
    let mut normalized = Vec::new();
    for keyword in NORMALIZED_KEYWORDS {
        let underscored = Regex::new(&format!(r"\b__{keyword}\b"))?;
        let plain = Regex::new(&format!(r"\b{keyword}\b"))?;
        if plain.is_match(source) {
            continue;
        }

        let mut occurrences = 0;
        for segment in segments.iter_mut().filter(|segment| !segment.stub) {
            occurrences += underscored.find_iter(&segment.text).count();
            segment.text = underscored
                .replace_all(&segment.text, NoExpand(keyword))
                .into_owned();
        }
        if occurrences == 0 {
            continue;
        }

        restorations.push(Restoration::every(plain.as_str(), format!("__{keyword}"))?);
        normalized.push(*keyword);
    }
    Ok(normalized)
}

/// Remove attribute and `__const` annotations from `extern` declarations
/// outside stubs.
///
/// Keyword restorations run first, so the recorded pattern and original use
/// the underscored spelling of every normalized keyword.
fn strip_extern_attributes(
    segments: &mut [Segment],
    normalized: &[&str],
    restorations: &mut Vec<Restoration>,
) -> Result<()> {
    let declaration = Regex::new(&format!(
        "extern{DECLARATION_BODY}{ATTRIBUTE_OR_CONST}{DECLARATION_BODY};"
    ))?;
    let annotation = Regex::new(ATTRIBUTE_OR_CONST)?;
    let spellings = normalized
        .iter()
        .map(|keyword| -> Result<(Regex, String)> {
            Ok((Regex::new(&format!(r"\b{keyword}\b"))?, format!("__{keyword}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let underscored = |text: &str| {
        spellings.iter().fold(text.to_string(), |text, (plain, original)| {
            plain.replace_all(&text, NoExpand(original)).into_owned()
        })
    };

    for segment in segments.iter_mut().filter(|segment| !segment.stub) {
        while let Some(found) = declaration.find(&segment.text) {
            let range = found.range();
            let original = found.as_str().to_string();
            let stripped = annotation.replace_all(&original, " ").into_owned();

            restorations.push(Restoration::first(
                &fingerprint(&underscored(&stripped))?,
                underscored(&original),
            )?);
            segment.text.replace_range(range, &stripped);
        }
    }
    Ok(())
}
