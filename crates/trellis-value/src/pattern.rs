//! Pattern matching and stenciling.
//!
//! A pattern can `match_text` a candidate, capturing wildcard stems, and
//! `stencil` concrete text back out of a stem sequence. The two are
//! inverses: matching a candidate and stenciling the captured stems
//! reproduces the candidate exactly.
//!
//! "Does not apply" is `Ok(None)`, never an error.

use crate::error::ValueError;
use crate::value::{Kind, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A successful match: the consumed text plus captured stems in
/// left-to-right textual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub text: String,
    pub stems: Vec<String>,
}

fn glob_regexes() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Translate a shell glob into an anchored regex. `*` and `?` stay within
/// one path component.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    out.push(inner);
                }
                out.push(']');
            }
            '.' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '+' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('$');
    out
}

fn glob_match(glob: &str, candidate: &str) -> Result<bool, ValueError> {
    let mut cache = glob_regexes().lock().expect("glob cache lock poisoned");
    if !cache.contains_key(glob) {
        let compiled =
            Regex::new(&glob_to_regex(glob)).map_err(|err| ValueError::BadPattern {
                pattern: glob.to_string(),
                message: err.to_string(),
            })?;
        cache.insert(glob.to_string(), compiled);
    }
    Ok(cache[glob].is_match(candidate))
}

fn literal_text(value: &Value) -> Result<String, ValueError> {
    if matches!(value.kind(), Kind::None) {
        Ok(String::new())
    } else {
        value.strval()
    }
}

impl Value {
    /// Whether this value participates in pattern matching. A path counts
    /// when any segment does.
    pub fn is_pattern(&self) -> bool {
        match self.kind() {
            Kind::PercPattern { .. }
            | Kind::GlobPattern(_)
            | Kind::GlobRange(_)
            | Kind::GlobMeta(_)
            | Kind::RegexpPattern(_) => true,
            Kind::Path(segments) => segments.iter().any(|s| s.is_pattern()),
            _ => false,
        }
    }

    /// The bare `%` wildcard: both prefix and suffix are the none
    /// placeholder.
    pub(crate) fn is_empty_perc(&self) -> bool {
        matches!(
            self.kind(),
            Kind::PercPattern { prefix, suffix }
                if matches!(prefix.kind(), Kind::None) && matches!(suffix.kind(), Kind::None)
        )
    }

    /// The `%%` multi-segment wildcard: a none-prefixed pattern whose
    /// suffix is the bare `%`.
    pub(crate) fn is_double_perc(&self) -> bool {
        matches!(
            self.kind(),
            Kind::PercPattern { prefix, suffix }
                if matches!(prefix.kind(), Kind::None) && suffix.is_empty_perc()
        )
    }

    /// How many stems this pattern captures (and stenciling consumes).
    pub fn stem_count(&self) -> usize {
        match self.kind() {
            Kind::PercPattern { suffix, .. } => {
                1 + if suffix.is_pattern() {
                    suffix.stem_count()
                } else {
                    0
                }
            }
            Kind::Path(segments) => segments
                .iter()
                .map(|s| if s.is_double_perc() { 1 } else { s.stem_count() })
                .sum(),
            _ => 0,
        }
    }

    /// Match the whole candidate against this pattern. `Ok(Some)` means
    /// the entire candidate was consumed; non-patterns match by literal
    /// equality.
    pub fn match_text(&self, candidate: &str) -> Result<Option<Match>, ValueError> {
        match self.kind() {
            Kind::PercPattern { prefix, suffix } => {
                match_perc(prefix, suffix, candidate)
            }
            // Glob stems are an explicit gap: a glob match reports the
            // matched text but captures nothing.
            Kind::GlobPattern(_) | Kind::GlobRange(_) | Kind::GlobMeta(_) => {
                let glob = self.to_string();
                Ok(glob_match(&glob, candidate)?.then(|| Match {
                    text: candidate.to_string(),
                    stems: Vec::new(),
                }))
            }
            Kind::RegexpPattern(_) => Err(ValueError::Unimplemented {
                what: format!("regexp pattern matching ({self})"),
            }),
            Kind::Path(_) => Ok(self.match1(candidate)?.and_then(|m| {
                m.remainder.is_empty().then(|| Match {
                    text: candidate.to_string(),
                    stems: m.stems,
                })
            })),
            _ => {
                let text = self.strval()?;
                Ok((text == candidate).then(|| Match {
                    text: text.clone(),
                    stems: Vec::new(),
                }))
            }
        }
    }

    /// Regenerate concrete text from a stem sequence. Consumes exactly
    /// [`Value::stem_count`] stems from the front and returns the rest.
    pub fn stencil(&self, stems: &[String]) -> Result<(String, Vec<String>), ValueError> {
        match self.kind() {
            Kind::PercPattern { prefix, suffix } => stencil_perc(self, prefix, suffix, stems),
            Kind::GlobPattern(_) | Kind::GlobRange(_) | Kind::GlobMeta(_) => {
                Err(ValueError::Unimplemented {
                    what: format!("glob stenciling ({self}): glob stems are never captured"),
                })
            }
            Kind::RegexpPattern(_) => Err(ValueError::Unimplemented {
                what: format!("regexp stenciling ({self})"),
            }),
            Kind::Path(segments) => stencil_path(segments, stems),
            _ => Ok((self.strval()?, stems.to_vec())),
        }
    }
}

fn match_perc(
    prefix: &Value,
    suffix: &Value,
    candidate: &str,
) -> Result<Option<Match>, ValueError> {
    let prefix_text = literal_text(prefix)?;
    let Some(rest) = candidate.strip_prefix(prefix_text.as_str()) else {
        return Ok(None);
    };

    if suffix.is_pattern() {
        // Earliest split point wins: the shortest stem that lets the
        // nested pattern consume the remainder.
        for i in (0..=rest.len()).filter(|&i| rest.is_char_boundary(i)) {
            if let Some(inner) = suffix.match_text(&rest[i..])? {
                let mut stems = vec![rest[..i].to_string()];
                stems.extend(inner.stems);
                return Ok(Some(Match {
                    text: candidate.to_string(),
                    stems,
                }));
            }
        }
        return Ok(None);
    }

    let suffix_text = literal_text(suffix)?;
    let Some(stem) = rest.strip_suffix(suffix_text.as_str()) else {
        return Ok(None);
    };
    Ok(Some(Match {
        text: candidate.to_string(),
        stems: vec![stem.to_string()],
    }))
}

fn stencil_perc(
    whole: &Value,
    prefix: &Value,
    suffix: &Value,
    stems: &[String],
) -> Result<(String, Vec<String>), ValueError> {
    let Some((stem, rest)) = stems.split_first() else {
        return Err(ValueError::StemUnderflow {
            pattern: whole.to_string(),
            need: whole.stem_count(),
            have: stems.len(),
        });
    };
    let mut out = literal_text(prefix)?;
    out.push_str(stem);
    if suffix.is_pattern() {
        let (tail, remaining) = suffix.stencil(rest)?;
        out.push_str(&tail);
        Ok((out, remaining))
    } else {
        out.push_str(&literal_text(suffix)?);
        Ok((out, rest.to_vec()))
    }
}

fn stencil_path(
    segments: &[Value],
    stems: &[String],
) -> Result<(String, Vec<String>), ValueError> {
    let mut remaining = stems.to_vec();
    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.is_double_perc() {
            // One multi-segment stem, not the two a nested `%` would eat.
            let Some((stem, rest)) = remaining.split_first() else {
                return Err(ValueError::StemUnderflow {
                    pattern: segment.to_string(),
                    need: 1,
                    have: 0,
                });
            };
            parts.push(stem.clone());
            remaining = rest.to_vec();
        } else if segment.is_pattern() {
            let (text, rest) = segment.stencil(&remaining)?;
            parts.push(text);
            remaining = rest;
        } else {
            parts.push(segment.strval()?);
        }
    }
    Ok((parts.join("/"), remaining))
}
