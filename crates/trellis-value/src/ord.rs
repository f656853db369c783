//! Three-way value comparison.
//!
//! Heterogeneous pairs are not an error: they compare as [`Cmp::Unknown`].
//! The one sanctioned cross-variant case is the boolean presentation
//! family (Boolean/Answer/Switch), which compares by truth value.

use crate::value::{Kind, Value};
use std::cmp::Ordering;

/// Outcome of a comparison. `Unknown` means the variants are not
/// comparable — deliberately distinct from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Smaller,
    Equal,
    Greater,
    Unknown,
}

impl Cmp {
    fn of<T: Ord>(a: &T, b: &T) -> Cmp {
        match a.cmp(b) {
            Ordering::Less => Cmp::Smaller,
            Ordering::Equal => Cmp::Equal,
            Ordering::Greater => Cmp::Greater,
        }
    }
}

fn truth_of(value: &Value) -> Option<bool> {
    match value.kind() {
        Kind::Boolean(b) | Kind::Answer(b) | Kind::Switch(b) => Some(*b),
        _ => None,
    }
}

/// Element-wise lexicographic comparison over equal-variant sequences.
///
/// The common prefix decides when it differs; identical prefixes with
/// unequal lengths are `Unknown` rather than ordered — sequence length is
/// not a ranking here.
fn cmp_elements(a: &[Value], b: &[Value]) -> Cmp {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp_value(y) {
            Cmp::Equal => continue,
            decided => return decided,
        }
    }
    if a.len() == b.len() {
        Cmp::Equal
    } else {
        Cmp::Unknown
    }
}

impl Value {
    /// Three-way compare against another value.
    pub fn cmp_value(&self, other: &Value) -> Cmp {
        // Boolean presentation forms compare across variants by truth.
        if let (Some(a), Some(b)) = (truth_of(self), truth_of(other)) {
            return Cmp::of(&a, &b);
        }

        match (self.kind(), other.kind()) {
            (Kind::None, Kind::None) | (Kind::Nil, Kind::Nil) => Cmp::Equal,
            (Kind::Bin(a), Kind::Bin(b))
            | (Kind::Oct(a), Kind::Oct(b))
            | (Kind::Int(a), Kind::Int(b))
            | (Kind::Hex(a), Kind::Hex(b)) => Cmp::of(a, b),
            (Kind::Float(a), Kind::Float(b)) => match a.partial_cmp(b) {
                Some(Ordering::Less) => Cmp::Smaller,
                Some(Ordering::Equal) => Cmp::Equal,
                Some(Ordering::Greater) => Cmp::Greater,
                None => Cmp::Unknown,
            },
            (Kind::DateTime(a), Kind::DateTime(b)) => Cmp::of(a, b),
            (Kind::Date(a), Kind::Date(b)) => Cmp::of(a, b),
            (Kind::Time(a), Kind::Time(b)) => Cmp::of(a, b),
            (Kind::Str(a), Kind::Str(b))
            | (Kind::Bareword(a), Kind::Bareword(b))
            | (Kind::Qualiword(a), Kind::Qualiword(b))
            | (Kind::Raw(a), Kind::Raw(b))
            | (Kind::PathSeg(a), Kind::PathSeg(b))
            | (Kind::Url(a), Kind::Url(b))
            | (Kind::Flag(a), Kind::Flag(b)) => Cmp::of(a, b),
            (Kind::List(a), Kind::List(b))
            | (Kind::Group(a), Kind::Group(b))
            | (Kind::Path(a), Kind::Path(b)) => cmp_elements(a, b),
            (Kind::Pair { key: ka, value: va }, Kind::Pair { key: kb, value: vb }) => {
                match ka.cmp_value(kb) {
                    Cmp::Equal => va.cmp_value(vb),
                    decided => decided,
                }
            }
            (Kind::File(a), Kind::File(b)) => {
                if a.same_record(b) {
                    Cmp::Equal
                } else {
                    Cmp::of(&a.canon(), &b.canon())
                }
            }
            _ => Cmp::Unknown,
        }
    }
}
