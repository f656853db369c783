//! The trellis value model.
//!
//! Every expression in a build tree evaluates to a [`Value`]: a shared,
//! immutable-by-convention node over the closed [`Kind`] sum. Values are
//! cheap `Arc` clones, and [`Value::ptr_eq`] is meaningful: expansion
//! returns the *same* node when nothing changed, so callers detect no-op
//! expansion by identity instead of deep comparison.

use crate::error::ValueError;
use crate::scope::{Binding, Scope};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::sync::Arc;
use trellis_fs::{FileCache, FileHandle};

/// Opaque foreign payload carried through the value model untouched.
///
/// A payload may optionally expose a scope, which lets dotted selections
/// (`obj.field`) resolve into it during disclosure.
pub trait Opaque: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;
    fn render(&self) -> String;
    fn as_scope(&self) -> Option<&dyn Scope> {
        None
    }
}

/// Three-way existence probe. `Matterless` means "not file-like, don't
/// ask" — distinct from a file that is definitely absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Matterless,
    Confirmed,
    Negated,
}

/// The closed variant sum behind [`Value`].
#[derive(Debug)]
pub enum Kind {
    /// Absence by default — an unset slot.
    None,
    /// Explicit nothing, deliberately written.
    Nil,
    Boolean(bool),
    /// Truth rendered as "yes"/"no".
    Answer(bool),
    /// Truth rendered as "on"/"off".
    Switch(bool),
    Bin(i64),
    Oct(i64),
    Int(i64),
    Hex(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Str(String),
    Bareword(String),
    Qualiword(String),
    Raw(String),
    /// Juxtaposed concatenation, `a$(b)c`.
    Barecomp(Vec<Value>),
    /// Quoted interpolation, `"a $(b) c"`.
    Compound(Vec<Value>),
    List(Vec<Value>),
    /// Parenthesized list.
    Group(Vec<Value>),
    Pair {
        key: Value,
        value: Value,
    },
    Path(Vec<Value>),
    PathSeg(String),
    Url(String),
    Flag(String),
    File(FileHandle),
    /// `%`-wildcard: literal (or None) prefix, suffix that may itself be
    /// a nested pattern.
    PercPattern {
        prefix: Value,
        suffix: Value,
    },
    GlobPattern(String),
    /// A character range like `[a-c]`, stored with brackets.
    GlobRange(String),
    GlobMeta(char),
    /// Explicit gap: matching and stenciling are unimplemented.
    RegexpPattern(String),
    /// Unresolved symbolic reference plus arguments.
    Closure {
        name: Value,
        args: Vec<Value>,
    },
    /// A closure after disclosure: resolved binding, pending invocation.
    Delegate {
        binding: Binding,
        args: Vec<Value>,
        name: String,
    },
    /// Dotted access into another object's scope.
    Selection {
        base: Value,
        field: String,
    },
    /// A value with call arguments applied to it.
    Argumented {
        value: Value,
        args: Vec<Value>,
    },
    Negative(Value),
    Any(Arc<dyn Opaque>),
}

/// A shared expression node. Clones are pointer copies.
#[derive(Debug, Clone)]
pub struct Value(Arc<Kind>);

impl Value {
    pub fn from_kind(kind: Kind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn kind(&self) -> &Kind {
        &self.0
    }

    /// Identity comparison — the no-op-expansion probe.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // Constructors, one per variant family.

    pub fn none() -> Self {
        Self::from_kind(Kind::None)
    }

    pub fn nil() -> Self {
        Self::from_kind(Kind::Nil)
    }

    pub fn boolean(b: bool) -> Self {
        Self::from_kind(Kind::Boolean(b))
    }

    pub fn answer(b: bool) -> Self {
        Self::from_kind(Kind::Answer(b))
    }

    pub fn switch(b: bool) -> Self {
        Self::from_kind(Kind::Switch(b))
    }

    pub fn int(i: i64) -> Self {
        Self::from_kind(Kind::Int(i))
    }

    pub fn hex(i: i64) -> Self {
        Self::from_kind(Kind::Hex(i))
    }

    pub fn oct(i: i64) -> Self {
        Self::from_kind(Kind::Oct(i))
    }

    pub fn bin(i: i64) -> Self {
        Self::from_kind(Kind::Bin(i))
    }

    pub fn float(x: f64) -> Self {
        Self::from_kind(Kind::Float(x))
    }

    pub fn datetime(dt: DateTime<Utc>) -> Self {
        Self::from_kind(Kind::DateTime(dt))
    }

    pub fn date(d: NaiveDate) -> Self {
        Self::from_kind(Kind::Date(d))
    }

    pub fn time(t: NaiveTime) -> Self {
        Self::from_kind(Kind::Time(t))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Str(s.into()))
    }

    pub fn bareword(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Bareword(s.into()))
    }

    pub fn qualiword(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Qualiword(s.into()))
    }

    pub fn raw(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Raw(s.into()))
    }

    pub fn barecomp(parts: Vec<Value>) -> Self {
        Self::from_kind(Kind::Barecomp(parts))
    }

    pub fn compound(parts: Vec<Value>) -> Self {
        Self::from_kind(Kind::Compound(parts))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::from_kind(Kind::List(items))
    }

    pub fn group(items: Vec<Value>) -> Self {
        Self::from_kind(Kind::Group(items))
    }

    pub fn pair(key: Value, value: Value) -> Self {
        Self::from_kind(Kind::Pair { key, value })
    }

    pub fn path(segments: Vec<Value>) -> Self {
        Self::from_kind(Kind::Path(segments))
    }

    pub fn path_seg(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::PathSeg(s.into()))
    }

    pub fn url(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Url(s.into()))
    }

    pub fn flag(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::Flag(s.into()))
    }

    pub fn file(handle: FileHandle) -> Self {
        Self::from_kind(Kind::File(handle))
    }

    pub fn perc(prefix: Value, suffix: Value) -> Self {
        Self::from_kind(Kind::PercPattern { prefix, suffix })
    }

    pub fn glob(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::GlobPattern(s.into()))
    }

    pub fn glob_range(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::GlobRange(s.into()))
    }

    pub fn glob_meta(c: char) -> Self {
        Self::from_kind(Kind::GlobMeta(c))
    }

    pub fn regexp(s: impl Into<String>) -> Self {
        Self::from_kind(Kind::RegexpPattern(s.into()))
    }

    pub fn closure(name: Value, args: Vec<Value>) -> Self {
        Self::from_kind(Kind::Closure { name, args })
    }

    pub fn delegate(binding: Binding, args: Vec<Value>, name: impl Into<String>) -> Self {
        Self::from_kind(Kind::Delegate {
            binding,
            args,
            name: name.into(),
        })
    }

    pub fn selection(base: Value, field: impl Into<String>) -> Self {
        Self::from_kind(Kind::Selection {
            base,
            field: field.into(),
        })
    }

    pub fn argumented(value: Value, args: Vec<Value>) -> Self {
        Self::from_kind(Kind::Argumented { value, args })
    }

    pub fn negative(inner: Value) -> Self {
        Self::from_kind(Kind::Negative(inner))
    }

    pub fn any(payload: Arc<dyn Opaque>) -> Self {
        Self::from_kind(Kind::Any(payload))
    }

    /// Variant name, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            Kind::None => "none",
            Kind::Nil => "nil",
            Kind::Boolean(_) => "boolean",
            Kind::Answer(_) => "answer",
            Kind::Switch(_) => "switch",
            Kind::Bin(_) => "bin",
            Kind::Oct(_) => "oct",
            Kind::Int(_) => "int",
            Kind::Hex(_) => "hex",
            Kind::Float(_) => "float",
            Kind::DateTime(_) => "datetime",
            Kind::Date(_) => "date",
            Kind::Time(_) => "time",
            Kind::Str(_) => "string",
            Kind::Bareword(_) => "bareword",
            Kind::Qualiword(_) => "qualiword",
            Kind::Raw(_) => "raw",
            Kind::Barecomp(_) => "barecomp",
            Kind::Compound(_) => "compound",
            Kind::List(_) => "list",
            Kind::Group(_) => "group",
            Kind::Pair { .. } => "pair",
            Kind::Path(_) => "path",
            Kind::PathSeg(_) => "pathseg",
            Kind::Url(_) => "url",
            Kind::Flag(_) => "flag",
            Kind::File(_) => "file",
            Kind::PercPattern { .. } => "percpattern",
            Kind::GlobPattern(_) => "globpattern",
            Kind::GlobRange(_) => "globrange",
            Kind::GlobMeta(_) => "globmeta",
            Kind::RegexpPattern(_) => "regexppattern",
            Kind::Closure { .. } => "closure",
            Kind::Delegate { .. } => "delegate",
            Kind::Selection { .. } => "selection",
            Kind::Argumented { .. } => "argumented",
            Kind::Negative(_) => "negative",
            Kind::Any(_) => "any",
        }
    }

    /// Immediate child values, for the transitive probes.
    pub(crate) fn children(&self) -> Vec<&Value> {
        match self.kind() {
            Kind::Barecomp(items)
            | Kind::Compound(items)
            | Kind::List(items)
            | Kind::Group(items)
            | Kind::Path(items) => items.iter().collect(),
            Kind::Pair { key, value } => vec![key, value],
            Kind::PercPattern { prefix, suffix } => vec![prefix, suffix],
            Kind::Closure { name, args } => {
                let mut out = vec![name];
                out.extend(args.iter());
                out
            }
            Kind::Delegate { binding, args, .. } => {
                let mut out: Vec<&Value> = Vec::with_capacity(args.len() + 1);
                if let crate::scope::BindingTarget::Plain(value) = &binding.target {
                    out.push(value);
                }
                out.extend(args.iter());
                out
            }
            Kind::Selection { base, .. } => vec![base],
            Kind::Argumented { value, args } => {
                let mut out = vec![value];
                out.extend(args.iter());
                out
            }
            Kind::Negative(inner) => vec![inner],
            _ => Vec::new(),
        }
    }

    /// Does this value transitively contain (or equal) `other`?
    ///
    /// Used to block self-referential delegation before it recurses.
    pub fn refs(&self, other: &Value) -> bool {
        self.ptr_eq(other) || self.children().iter().any(|child| child.refs(other))
    }

    /// Does this value still contain an unresolved closure?
    pub fn closured(&self) -> bool {
        matches!(self.kind(), Kind::Closure { .. })
            || self.children().iter().any(|child| child.closured())
    }

    /// Does this value trace back to a definition of the given origin?
    pub fn refdef(&self, origin: crate::scope::Origin) -> bool {
        if let Kind::Delegate { binding, .. } = self.kind()
            && binding.origin == origin
        {
            return true;
        }
        self.children().iter().any(|child| child.refdef(origin))
    }

    /// Coerce to a plain string. Unresolved control forms refuse.
    pub fn strval(&self) -> Result<String, ValueError> {
        match self.kind() {
            Kind::Closure { .. }
            | Kind::Delegate { .. }
            | Kind::Selection { .. }
            | Kind::Argumented { .. } => Err(self.coerce_err("string")),
            _ => Ok(self.to_string()),
        }
    }

    /// Coerce to an integer. Text follows standard literal rules
    /// (`0x`/`0o`/`0b` prefixes, optional sign); anything non-numeric is
    /// a type error.
    pub fn intval(&self) -> Result<i64, ValueError> {
        match self.kind() {
            Kind::Bin(i) | Kind::Oct(i) | Kind::Int(i) | Kind::Hex(i) => Ok(*i),
            Kind::Float(x) if x.fract() == 0.0 => Ok(*x as i64),
            Kind::Str(s) | Kind::Bareword(s) | Kind::Raw(s) => {
                parse_int(s).ok_or_else(|| self.coerce_err("int"))
            }
            Kind::Barecomp(_) | Kind::Compound(_) => {
                let text = self.strval()?;
                parse_int(&text).ok_or_else(|| self.coerce_err("int"))
            }
            _ => Err(self.coerce_err("int")),
        }
    }

    /// Coerce to a float.
    pub fn floatval(&self) -> Result<f64, ValueError> {
        match self.kind() {
            Kind::Bin(i) | Kind::Oct(i) | Kind::Int(i) | Kind::Hex(i) => Ok(*i as f64),
            Kind::Float(x) => Ok(*x),
            Kind::Str(s) | Kind::Bareword(s) | Kind::Raw(s) => {
                if let Some(i) = parse_int(s) {
                    return Ok(i as f64);
                }
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| self.coerce_err("float"))
            }
            Kind::Barecomp(_) | Kind::Compound(_) => {
                let text = self.strval()?;
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| self.coerce_err("float"))
            }
            _ => Err(self.coerce_err("float")),
        }
    }

    /// Truthiness. Empty text, zero, "no"/"off"/"false" are false.
    /// List-like composites are an OR over elements, short-circuiting on
    /// the first true or the first error.
    pub fn truth(&self) -> Result<bool, ValueError> {
        match self.kind() {
            Kind::None | Kind::Nil => Ok(false),
            Kind::Boolean(b) | Kind::Answer(b) | Kind::Switch(b) => Ok(*b),
            Kind::Bin(i) | Kind::Oct(i) | Kind::Int(i) | Kind::Hex(i) => Ok(*i != 0),
            Kind::Float(x) => Ok(*x != 0.0),
            Kind::DateTime(_) | Kind::Date(_) | Kind::Time(_) => Ok(true),
            Kind::Str(s) | Kind::Bareword(s) | Kind::Qualiword(s) | Kind::Raw(s) => {
                Ok(text_truth(s))
            }
            Kind::Barecomp(items)
            | Kind::Compound(items)
            | Kind::List(items)
            | Kind::Group(items) => {
                for item in items {
                    if item.truth()? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Kind::Pair { value, .. } => value.truth(),
            Kind::Path(segments) => Ok(!segments.is_empty()),
            Kind::PathSeg(s) | Kind::Url(s) | Kind::Flag(s) => Ok(!s.is_empty()),
            Kind::File(handle) => Ok(handle.exists()),
            Kind::PercPattern { .. }
            | Kind::GlobPattern(_)
            | Kind::GlobRange(_)
            | Kind::GlobMeta(_)
            | Kind::RegexpPattern(_) => Ok(true),
            Kind::Negative(inner) => Ok(!inner.truth()?),
            Kind::Closure { .. }
            | Kind::Delegate { .. }
            | Kind::Selection { .. }
            | Kind::Argumented { .. } => Err(self.coerce_err("boolean")),
            Kind::Any(_) => Ok(true),
        }
    }

    /// Existence probe. Only file-like values answer; everything else is
    /// `Matterless`.
    pub fn presence(&self) -> Presence {
        match self.kind() {
            Kind::File(handle) => {
                if handle.exists() {
                    Presence::Confirmed
                } else {
                    Presence::Negated
                }
            }
            Kind::Path(_) => {
                let text = self.to_string();
                match FileCache::global().stat(&text, "", "", None) {
                    Ok(handle) if handle.exists() => Presence::Confirmed,
                    _ => Presence::Negated,
                }
            }
            _ => Presence::Matterless,
        }
    }

    /// Cached modification time of a file-like value.
    pub fn modtime(&self) -> Result<DateTime<Utc>, ValueError> {
        match self.kind() {
            Kind::File(handle) => Ok(handle.mtime()?),
            Kind::Path(_) => {
                let text = self.to_string();
                let handle = FileCache::global().stat(&text, "", "", None)?;
                Ok(handle.mtime()?)
            }
            _ => Err(ValueError::NoModTime {
                what: format!("{} {self}", self.kind_name()),
            }),
        }
    }

    /// Refresh cached filesystem metadata. Composites return every file
    /// they touched.
    pub fn stamp(&self) -> Result<Vec<FileHandle>, ValueError> {
        match self.kind() {
            Kind::File(handle) => {
                handle.stamp()?;
                Ok(vec![handle.clone()])
            }
            Kind::Path(_) => {
                let text = self.to_string();
                let handle = FileCache::global().stat(&text, "", "", None)?;
                handle.stamp()?;
                Ok(vec![handle])
            }
            Kind::Barecomp(items)
            | Kind::Compound(items)
            | Kind::List(items)
            | Kind::Group(items) => {
                let mut touched = Vec::new();
                for item in items {
                    touched.extend(item.stamp()?);
                }
                Ok(touched)
            }
            Kind::Pair { value, .. } => value.stamp(),
            _ => Ok(Vec::new()),
        }
    }

    /// Merge with another value into one flat list. Nested lists flatten
    /// recursively; plain iteration elsewhere preserves raw structure.
    pub fn merged(&self, other: &Value) -> Value {
        let mut items = Vec::new();
        self.flatten_into(&mut items);
        other.flatten_into(&mut items);
        Value::list(items)
    }

    fn flatten_into(&self, out: &mut Vec<Value>) {
        match self.kind() {
            Kind::List(items) | Kind::Group(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            Kind::None => {}
            _ => out.push(self.clone()),
        }
    }

    pub(crate) fn coerce_err(&self, to: &'static str) -> ValueError {
        ValueError::Coerce {
            from: self.kind_name(),
            to,
            text: self.to_string(),
        }
    }
}

fn text_truth(s: &str) -> bool {
    let trimmed = s.trim();
    !(trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("off")
        || trimmed.eq_ignore_ascii_case("false"))
}

fn parse_int(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::None => Ok(()),
            Kind::Nil => write!(f, "nil"),
            Kind::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Kind::Answer(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            Kind::Switch(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            Kind::Bin(i) => write!(f, "0b{i:b}"),
            Kind::Oct(i) => write!(f, "0o{i:o}"),
            Kind::Int(i) => write!(f, "{i}"),
            Kind::Hex(i) => write!(f, "0x{i:x}"),
            Kind::Float(x) => write!(f, "{x}"),
            Kind::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Kind::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Kind::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Kind::Str(s) | Kind::Bareword(s) | Kind::Qualiword(s) | Kind::Raw(s) => {
                write!(f, "{s}")
            }
            Kind::Barecomp(items) | Kind::Compound(items) => {
                for item in items {
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Kind::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Kind::Group(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Kind::Pair { key, value } => write!(f, "{key}={value}"),
            Kind::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        write!(f, "/")?;
                    }
                    write!(f, "{segment}")?;
                }
                Ok(())
            }
            Kind::PathSeg(s) | Kind::Url(s) | Kind::Flag(s) => write!(f, "{s}"),
            Kind::File(handle) => write!(f, "{}", handle.stub().join().display()),
            Kind::PercPattern { prefix, suffix } => write!(f, "{prefix}%{suffix}"),
            Kind::GlobPattern(s) => write!(f, "{s}"),
            Kind::GlobRange(s) => write!(f, "{s}"),
            Kind::GlobMeta(c) => write!(f, "{c}"),
            Kind::RegexpPattern(s) => write!(f, "{s}"),
            Kind::Closure { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Kind::Delegate { name, args, .. } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Kind::Selection { base, field } => write!(f, "{base}.{field}"),
            Kind::Argumented { value, args } => {
                write!(f, "{value}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Kind::Negative(inner) => write!(f, "!{inner}"),
            Kind::Any(payload) => write!(f, "{}", payload.render()),
        }
    }
}
