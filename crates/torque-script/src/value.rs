//! The dynamic value type threading through parser, compiler, and VM.
//!
//! Deliberately far simpler than a Python-style value (no heap arena, no
//! manual refcounting): TorqueScript's only shared-mutable-container need is
//! console-object field storage, which is owned by the object registry, not
//! by `Value` itself. `Ref` is therefore a small `Copy` index, dereferenced
//! through the execution state at use time rather than a borrowed pointer —
//! see DESIGN.md's grounding note on `namespace.rs`'s "indices, not raw
//! pointers" rationale.

use std::fmt;
use std::rc::Rc;

use crate::intern::StringId;
use crate::object::ObjectId;

/// Kind tag for a `MemoryRef`'s host-owned storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Integer,
    Float,
    Bool,
}

/// Host-owned primitive storage a `Value::MemoryRef` reads and writes
/// through. Concrete implementations live on the host side of the embedding
/// boundary (spec.md §1 names the host platform as out of scope); this trait
/// is the minimal seam the Value model needs.
pub trait MemoryCell {
    fn read(&self) -> Value;
    fn write(&self, value: Value);
}

impl fmt::Debug for dyn MemoryCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<memory cell>")
    }
}

/// An lvalue handle: a non-owning reference to another Value's storage
/// location, addressed by index rather than raw pointer.
///
/// The "register file" named in spec.md §3 is modeled here as a per-frame
/// slot map keyed by interned name rather than a dense positional array: the
/// array-name-folding rule (`$a[1,2,3]` and `$a_1_2_3` are the same
/// variable, spec.md §4.4/§8) requires resolving a *runtime-constructed*
/// name to the same storage a plain `%a`/`$a` reference would use, which a
/// purely compile-time-assigned positional index cannot support without a
/// parallel name-to-slot table anyway. Keying directly by `StringId`
/// collapses both access paths onto one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    /// A local variable slot in the current frame, addressed by its interned
    /// (case-folded) name.
    Local(StringId),
    /// A global variable slot, addressed by its interned name.
    Global(StringId),
    /// A tagged field on a console object.
    Field { object: ObjectId, field: StringId },
}

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i32),
    Float(f32),
    String(Rc<str>),
    MemoryRef(Rc<dyn MemoryCell>, PrimitiveKind),
    Ref(RefTarget),
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Dereferences one level if this is a `MemoryRef`; `Ref` values must be
    /// resolved by the VM (it alone has access to the execution state the
    /// index addresses into).
    #[must_use]
    pub fn materialize_memory(&self) -> Value {
        match self {
            Self::MemoryRef(cell, _) => cell.read(),
            other => other.clone(),
        }
    }

    #[must_use]
    pub fn to_integer(&self) -> i32 {
        match self {
            Self::Integer(i) => *i,
            Self::Float(f) => *f as i32,
            Self::String(s) => parse_leading_number(s).map_or(0, |n| n as i32),
            Self::MemoryRef(cell, _) => cell.read().to_integer(),
            Self::Ref(_) => 0,
        }
    }

    #[must_use]
    pub fn to_float(&self) -> f32 {
        match self {
            Self::Integer(i) => *i as f32,
            Self::Float(f) => *f,
            Self::String(s) => parse_leading_number(s).unwrap_or(0.0) as f32,
            Self::MemoryRef(cell, _) => cell.read().to_float(),
            Self::Ref(_) => 0.0,
        }
    }

    #[must_use]
    pub fn to_torque_string(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::String(s) => s.to_string(),
            Self::MemoryRef(cell, _) => cell.read().to_torque_string(),
            Self::Ref(_) => String::new(),
        }
    }

    /// "Nonzero integer" truthiness, via `to_integer`.
    #[must_use]
    pub fn to_bool(&self) -> bool {
        self.to_integer() != 0
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Ref(_) | Self::MemoryRef(..))
    }
}

fn format_float(f: f32) -> String {
    if f == f.trunc() && f.abs() < 1e9 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Parses a leading numeric prefix the way `atof`/`atoi` do: leading
/// whitespace, optional sign, digits, optional fractional part. Anything
/// that fails to match yields `None` (the caller substitutes 0/0.0 per
/// spec.md §3's "parse failure yields 0 silently").
fn parse_leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
        end = i;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        let mut j = i + 1;
        let mut saw_frac_digit = false;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
            saw_frac_digit = true;
        }
        if saw_frac_digit {
            end = j;
        }
    }
    if !saw_digit || end == 0 {
        return None;
    }
    trimmed[..end].parse().ok()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => self.to_float() == other.to_float(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_number_parse_failure_yields_zero() {
        assert_eq!(Value::string("not a number").to_integer(), 0);
        assert_eq!(Value::string("not a number").to_float(), 0.0);
    }

    #[test]
    fn string_to_number_parses_leading_numeric_prefix() {
        assert_eq!(Value::string("42abc").to_integer(), 42);
        assert_eq!(Value::string("3.5").to_float(), 3.5);
    }

    #[test]
    fn to_bool_is_nonzero_integer() {
        assert!(Value::Integer(1).to_bool());
        assert!(!Value::Integer(0).to_bool());
        assert!(Value::Float(2.5).to_bool());
        assert!(!Value::Float(0.0).to_bool());
    }

    #[test]
    fn integer_and_float_format_without_exponent_for_whole_numbers() {
        assert_eq!(Value::Float(10.0).to_torque_string(), "10.0");
        assert_eq!(Value::Integer(10).to_torque_string(), "10");
    }
}
