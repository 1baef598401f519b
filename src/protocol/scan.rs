//! Tiny cursor used by the line grammars.
//!
//! Each grammar is written as a sequence of cursor steps that either advance
//! or bail out with `None`. [`search`] retries a grammar at every occurrence
//! of its anchor so a form may appear anywhere inside a line.

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    pub(crate) fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }

    /// One or more ASCII digits.
    pub(crate) fn unsigned(&mut self) -> Option<i64> {
        let end = self.rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if end == 0 {
            return None;
        }
        let value = self.rest[..end].parse().ok()?;
        self.rest = &self.rest[end..];
        Some(value)
    }

    /// Optional `-` followed by digits.
    pub(crate) fn signed(&mut self) -> Option<i64> {
        let mut probe = *self;
        let negative = probe.literal("-").is_some();
        let magnitude = probe.unsigned()?;
        *self = probe;
        Some(if negative { -magnitude } else { magnitude })
    }

    /// Exactly one ASCII digit.
    pub(crate) fn digit(&mut self) -> Option<u8> {
        let b = *self.rest.as_bytes().first()?;
        if !b.is_ascii_digit() {
            return None;
        }
        self.rest = &self.rest[1..];
        Some(b - b'0')
    }

    /// At least `min` whitespace characters.
    pub(crate) fn spaces(&mut self, min: usize) -> Option<()> {
        let trimmed = self.rest.trim_start();
        let skipped = self.rest[..self.rest.len() - trimmed.len()].chars().count();
        if skipped < min {
            return None;
        }
        self.rest = trimmed;
        Some(())
    }

    pub(crate) fn one_of<'w>(&mut self, words: &[&'w str]) -> Option<&'w str> {
        let word = words.iter().find(|w| self.rest.starts_with(**w))?;
        self.rest = &self.rest[word.len()..];
        Some(*word)
    }
}

/// Try `grammar` at each occurrence of `anchor`, returning the first match.
pub(crate) fn search<'a, T>(
    haystack: &'a str,
    anchor: &str,
    mut grammar: impl FnMut(&mut Cursor<'a>) -> Option<T>,
) -> Option<T> {
    haystack
        .match_indices(anchor)
        .find_map(|(at, _)| grammar(&mut Cursor::new(&haystack[at..])))
}
