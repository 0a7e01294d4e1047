use std::fmt;

use crate::quran::{Chapter, VerseKey};

/// Value that may appear as one positional component of a [`CacheKey`].
pub trait KeyPart {
    fn render(&self) -> String;
}

/// Deterministic cache key: `operation_part1_part2_…`.
///
/// Operation names never contain `_`, and every part escapes `%` and `_`,
/// so the first `_` always ends the operation name and each later `_` is a
/// separator. Two different parameter tuples therefore never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    parts: Vec<String>,
}

impl CacheKey {
    pub fn new(operation: &'static str) -> Self {
        debug_assert!(
            !operation.contains('_') && !operation.contains('%'),
            "operation names must not contain '_' or '%': {operation}"
        );
        Self {
            operation,
            parts: Vec::new(),
        }
    }

    pub fn part(mut self, value: impl KeyPart) -> Self {
        self.parts.push(value.render());
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation)?;
        for part in &self.parts {
            write!(f, "_{part}")?;
        }
        Ok(())
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            c => out.push(c),
        }
    }
    out
}

impl KeyPart for &str {
    fn render(&self) -> String {
        escape(self)
    }
}

impl KeyPart for String {
    fn render(&self) -> String {
        escape(self)
    }
}

impl KeyPart for &String {
    fn render(&self) -> String {
        escape(self)
    }
}

macro_rules! numeric_key_part {
    ($($ty:ty),*) => {
        $(impl KeyPart for $ty {
            fn render(&self) -> String {
                self.to_string()
            }
        })*
    };
}

numeric_key_part!(u16, u32, u64, bool);

impl KeyPart for Chapter {
    fn render(&self) -> String {
        self.number().to_string()
    }
}

impl KeyPart for VerseKey {
    fn render(&self) -> String {
        self.to_string()
    }
}

/// Absent values render as `%-`, which no escaped string can produce.
impl<T: KeyPart> KeyPart for Option<T> {
    fn render(&self) -> String {
        match self {
            Some(value) => value.render(),
            None => "%-".to_string(),
        }
    }
}

impl KeyPart for &[u32] {
    fn render(&self) -> String {
        self.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
    }
}
