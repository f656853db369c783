//! Path matching: a path is itself a pattern when any segment is one.
//!
//! Candidate components are matched left-to-right. Ordinary pattern
//! segments consume exactly one component; the `%%` wildcard consumes a
//! multi-segment span, scanning greedily for the next literal anchor. A
//! full match consumes every component; a partial match reports the
//! unconsumed remainder and callers decide (traversal treats any
//! remainder as a non-match).

use crate::error::ValueError;
use crate::value::{Kind, Value};

/// Result of matching a candidate against a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub stems: Vec<String>,
    /// Candidate components left unconsumed. Empty means a full match.
    pub remainder: Vec<String>,
}

fn flatten_segments<'a>(segments: &'a [Value], out: &mut Vec<&'a Value>) {
    for segment in segments {
        match segment.kind() {
            Kind::Path(nested) => flatten_segments(nested, out),
            _ => out.push(segment),
        }
    }
}

fn components(candidate: &str) -> Vec<&str> {
    candidate
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect()
}

/// First literal component of a segment, used as the `%%` anchor.
fn anchor_component(segment: &Value) -> Result<Option<String>, ValueError> {
    if segment.is_pattern() {
        return Ok(None);
    }
    let text = segment.strval()?;
    Ok(components(&text).first().map(|c| c.to_string()))
}

impl Value {
    /// Match a candidate path against this value's segments.
    ///
    /// Non-path values match as a single segment. `Ok(None)` is "does not
    /// apply"; `Ok(Some)` with a non-empty remainder is a partial match.
    pub fn match1(&self, candidate: &str) -> Result<Option<PathMatch>, ValueError> {
        let Kind::Path(segments) = self.kind() else {
            return Ok(self.match_text(candidate)?.map(|m| PathMatch {
                stems: m.stems,
                remainder: Vec::new(),
            }));
        };

        let mut segs = Vec::new();
        flatten_segments(segments, &mut segs);
        let comps = components(candidate);

        let mut stems = Vec::new();
        let mut i = 0usize;
        let mut k = 0usize;
        while k < segs.len() {
            let segment = segs[k];

            if segment.is_double_perc() {
                if k + 1 == segs.len() {
                    // Final `%%` absorbs everything left.
                    stems.push(comps[i..].join("/"));
                    i = comps.len();
                    k += 1;
                    continue;
                }
                // Greedy: commit the stem at the *last* occurrence of the
                // next literal anchor, so the stem spans as many
                // components as possible. A `%%` followed by a
                // non-literal segment has no anchor and does not apply.
                let Some(anchor) = anchor_component(segs[k + 1])? else {
                    return Ok(None);
                };
                let Some(j) = (i + 1..comps.len())
                    .rev()
                    .find(|&j| comps[j] == anchor)
                else {
                    return Ok(None);
                };
                stems.push(comps[i..j].join("/"));
                i = j;
                k += 1;
                continue;
            }

            if segment.is_pattern() {
                if i >= comps.len() {
                    return Ok(None);
                }
                match segment.match_text(comps[i])? {
                    Some(m) => {
                        stems.extend(m.stems);
                        i += 1;
                        k += 1;
                    }
                    None => return Ok(None),
                }
                continue;
            }

            // Literal segment; may span several components itself.
            let text = segment.strval()?;
            for part in components(&text) {
                if i >= comps.len() || comps[i] != part {
                    return Ok(None);
                }
                i += 1;
            }
            k += 1;
        }

        Ok(Some(PathMatch {
            stems,
            remainder: comps[i..].iter().map(|c| c.to_string()).collect(),
        }))
    }
}
