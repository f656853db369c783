//! Lazy two-phase expansion.
//!
//! Expansion runs under a mode bitmask: disclose closures, reveal
//! delegates, invoke argumented callers, normalize paths, expand pair
//! values. Composites expand element-wise and keep a change count; when
//! no child changed the composite returns *itself* (same `Arc`), which is
//! what makes `expand` idempotent and lets callers test "did anything
//! change" with [`Value::ptr_eq`].

use crate::error::ValueError;
use crate::scope::ScopeStack;
use crate::value::{Kind, Value};
use std::ops::{BitOr, BitOrAssign};

/// Expansion mode bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expand(u8);

impl Expand {
    pub const NONE: Expand = Expand(0);
    /// Invoke resolved delegates.
    pub const REVEAL: Expand = Expand(1);
    /// Resolve closure names against the scope chain.
    pub const DISCLOSE: Expand = Expand(1 << 1);
    /// Apply argumented callers and run executable targets.
    pub const INVOKE: Expand = Expand(1 << 2);
    /// Resolve `.`/`..` and collapse separators in paths.
    pub const NORMALIZE: Expand = Expand(1 << 3);
    /// Expand the value side of pairs (left raw for argument binding
    /// otherwise).
    pub const PAIR_VALUE: Expand = Expand(1 << 4);
    pub const ALL: Expand = Expand(0b1_1111);

    pub fn has(self, flag: Expand) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for Expand {
    type Output = Expand;

    fn bitor(self, rhs: Expand) -> Expand {
        Expand(self.0 | rhs.0)
    }
}

impl BitOrAssign for Expand {
    fn bitor_assign(&mut self, rhs: Expand) {
        self.0 |= rhs.0;
    }
}

/// Expand a slice element-wise, reporting whether anything changed.
pub(crate) fn expand_values(
    items: &[Value],
    mask: Expand,
    scope: &ScopeStack,
) -> Result<(Vec<Value>, bool), ValueError> {
    let mut changed = 0usize;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let expanded = item.expand(mask, scope)?;
        if !expanded.ptr_eq(item) {
            changed += 1;
        }
        out.push(expanded);
    }
    Ok((out, changed > 0))
}

impl Value {
    /// Expand under the given mode bitmask.
    ///
    /// Idempotent: expanding a fully-expanded value returns the value
    /// itself, same allocation.
    pub fn expand(&self, mask: Expand, scope: &ScopeStack) -> Result<Value, ValueError> {
        match self.kind() {
            Kind::Barecomp(items) => {
                let (out, changed) = expand_values(items, mask, scope)?;
                Ok(if changed { Value::barecomp(out) } else { self.clone() })
            }
            Kind::Compound(items) => {
                let (out, changed) = expand_values(items, mask, scope)?;
                Ok(if changed { Value::compound(out) } else { self.clone() })
            }
            Kind::List(items) => {
                let (out, changed) = expand_values(items, mask, scope)?;
                Ok(if changed { Value::list(out) } else { self.clone() })
            }
            Kind::Group(items) => {
                let (out, changed) = expand_values(items, mask, scope)?;
                Ok(if changed { Value::group(out) } else { self.clone() })
            }
            Kind::Path(segments) => {
                let (expanded, mut changed) = expand_values(segments, mask, scope)?;
                let segments = if mask.has(Expand::NORMALIZE) {
                    match normalize_segments(&expanded) {
                        Some(normalized) => {
                            changed = true;
                            normalized
                        }
                        None => expanded,
                    }
                } else {
                    expanded
                };
                Ok(if changed { Value::path(segments) } else { self.clone() })
            }
            Kind::Pair { key, value } => {
                let new_key = key.expand(mask, scope)?;
                let new_value = if mask.has(Expand::PAIR_VALUE) {
                    value.expand(mask, scope)?
                } else {
                    value.clone()
                };
                if new_key.ptr_eq(key) && new_value.ptr_eq(value) {
                    Ok(self.clone())
                } else {
                    Ok(Value::pair(new_key, new_value))
                }
            }
            Kind::PercPattern { prefix, suffix } => {
                let new_prefix = prefix.expand(mask, scope)?;
                let new_suffix = suffix.expand(mask, scope)?;
                if new_prefix.ptr_eq(prefix) && new_suffix.ptr_eq(suffix) {
                    Ok(self.clone())
                } else {
                    Ok(Value::perc(new_prefix, new_suffix))
                }
            }
            Kind::Closure { name, args } => {
                if mask.has(Expand::DISCLOSE) {
                    self.disclose(mask, scope)
                } else {
                    let (out, changed) = expand_values(args, mask, scope)?;
                    Ok(if changed {
                        Value::closure(name.clone(), out)
                    } else {
                        self.clone()
                    })
                }
            }
            Kind::Delegate { binding, args, name } => {
                if mask.has(Expand::REVEAL) {
                    self.reveal(mask, scope)
                } else {
                    let (out, changed) = expand_values(args, mask, scope)?;
                    Ok(if changed {
                        Value::delegate(binding.clone(), out, name.clone())
                    } else {
                        self.clone()
                    })
                }
            }
            Kind::Selection { base, field } => {
                let new_base = base.expand(mask, scope)?;
                if mask.has(Expand::DISCLOSE)
                    && let Some((binding, label)) =
                        crate::closure::resolve_in_base(&new_base, field)
                {
                    let delegate = Value::delegate(binding, Vec::new(), label);
                    return if mask.has(Expand::REVEAL) {
                        delegate.reveal(mask, scope)
                    } else {
                        Ok(delegate)
                    };
                }
                if new_base.ptr_eq(base) {
                    Ok(self.clone())
                } else {
                    Ok(Value::selection(new_base, field.clone()))
                }
            }
            Kind::Argumented { value, args } => {
                let inner = value.expand(mask, scope)?;
                let (new_args, args_changed) = expand_values(args, mask, scope)?;
                if mask.has(Expand::INVOKE) {
                    match inner.kind() {
                        Kind::Closure { name, args: held } => {
                            let mut combined = held.clone();
                            combined.extend(new_args.iter().cloned());
                            let closure = Value::closure(name.clone(), combined);
                            return if mask.has(Expand::DISCLOSE) {
                                closure.disclose(mask, scope)
                            } else {
                                Ok(closure)
                            };
                        }
                        Kind::Delegate {
                            binding,
                            args: held,
                            name,
                        } => {
                            let mut combined = held.clone();
                            combined.extend(new_args.iter().cloned());
                            let delegate =
                                Value::delegate(binding.clone(), combined, name.clone());
                            return if mask.has(Expand::REVEAL) {
                                delegate.reveal(mask, scope)
                            } else {
                                Ok(delegate)
                            };
                        }
                        _ => {}
                    }
                }
                if inner.ptr_eq(value) && !args_changed {
                    Ok(self.clone())
                } else {
                    Ok(Value::argumented(inner, new_args))
                }
            }
            Kind::Negative(inner) => {
                let expanded = inner.expand(mask, scope)?;
                if expanded.ptr_eq(inner) {
                    Ok(self.clone())
                } else {
                    Ok(Value::negative(expanded))
                }
            }
            // Scalars, files, and leaf patterns are already fully expanded.
            _ => Ok(self.clone()),
        }
    }
}

fn segment_text(segment: &Value) -> Option<&str> {
    match segment.kind() {
        Kind::PathSeg(s) | Kind::Str(s) | Kind::Bareword(s) => Some(s),
        _ => None,
    }
}

/// Lexical path normalization over literal segments. Pattern segments are
/// opaque and left in place. Returns `None` when nothing changed.
fn normalize_segments(segments: &[Value]) -> Option<Vec<Value>> {
    let mut out: Vec<Value> = Vec::new();
    let mut changed = false;
    for (i, segment) in segments.iter().enumerate() {
        match segment_text(segment) {
            Some(".") => changed = true,
            Some("..") => {
                let poppable = out
                    .last()
                    .and_then(segment_text)
                    .is_some_and(|t| t != ".." && !t.is_empty());
                if poppable {
                    out.pop();
                    changed = true;
                } else {
                    out.push(segment.clone());
                }
            }
            // A leading empty segment is the root marker; later ones are
            // doubled separators.
            Some("") if i > 0 => changed = true,
            _ => out.push(segment.clone()),
        }
    }
    changed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_scope() -> ScopeStack {
        ScopeStack::new()
    }

    #[test]
    fn fully_expanded_values_come_back_identical() {
        let value = Value::list(vec![
            Value::int(1),
            Value::str("two"),
            Value::group(vec![Value::flag("-g")]),
        ]);
        let expanded = value.expand(Expand::ALL, &empty_scope()).expect("expand");
        assert!(expanded.ptr_eq(&value));
    }

    #[test]
    fn expansion_is_idempotent_for_every_mask() {
        let value = Value::compound(vec![Value::str("a"), Value::int(2)]);
        for mask in [
            Expand::NONE,
            Expand::REVEAL,
            Expand::DISCLOSE,
            Expand::REVEAL | Expand::DISCLOSE,
            Expand::NORMALIZE | Expand::PAIR_VALUE,
            Expand::ALL,
        ] {
            let once = value.expand(mask, &empty_scope()).expect("first pass");
            let twice = once.expand(mask, &empty_scope()).expect("second pass");
            assert!(twice.ptr_eq(&once), "mask {mask:?} not idempotent");
        }
    }

    #[test]
    fn pair_value_stays_raw_without_the_mode_bit() {
        let pair = Value::pair(
            Value::bareword("src"),
            Value::path(vec![Value::path_seg("a"), Value::path_seg("."), Value::path_seg("b")]),
        );
        let kept = pair
            .expand(Expand::NORMALIZE, &empty_scope())
            .expect("expand without PAIR_VALUE");
        assert!(kept.ptr_eq(&pair));

        let expanded = pair
            .expand(Expand::NORMALIZE | Expand::PAIR_VALUE, &empty_scope())
            .expect("expand with PAIR_VALUE");
        assert_eq!(expanded.to_string(), "src=a/b");
    }

    #[test]
    fn normalize_resolves_dots_and_doubled_separators() {
        let path = Value::path(vec![
            Value::path_seg(""),
            Value::path_seg("usr"),
            Value::path_seg("."),
            Value::path_seg("lib"),
            Value::path_seg(".."),
            Value::path_seg("bin"),
        ]);
        let normalized = path
            .expand(Expand::NORMALIZE, &empty_scope())
            .expect("normalize");
        assert_eq!(normalized.to_string(), "/usr/bin");

        let again = normalized
            .expand(Expand::NORMALIZE, &empty_scope())
            .expect("renormalize");
        assert!(again.ptr_eq(&normalized));
    }

    #[test]
    fn leading_parent_refs_survive_normalization() {
        let path = Value::path(vec![Value::path_seg(".."), Value::path_seg("obj")]);
        let normalized = path
            .expand(Expand::NORMALIZE, &empty_scope())
            .expect("normalize");
        assert_eq!(normalized.to_string(), "../obj");
    }

    #[test]
    fn mask_bits_compose() {
        let mask = Expand::REVEAL | Expand::DISCLOSE;
        assert!(mask.has(Expand::REVEAL));
        assert!(mask.has(Expand::DISCLOSE));
        assert!(!mask.has(Expand::INVOKE));
        assert!(Expand::ALL.has(Expand::PAIR_VALUE));
    }
}
