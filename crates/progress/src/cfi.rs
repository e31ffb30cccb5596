//! EPUB Canonical Fragment Identifiers.
//!
//! A CFI addresses a location inside a packaged publication:
//!
//! ```text
//! epubcfi(/6/4[chap01ref]!/4[body01]/10[para05]/3:10)
//!         └─┬─┘└────┬────┘ └──────────┬──────────┘└┬┘
//!        spine   itemref      path inside the      character
//!       element  (spine step)  content document      offset
//! ```
//!
//! Only the structural path is used here; the content tree itself is never
//! consulted. Range CFIs (`epubcfi(parent,start,end)`) are accepted and resolve
//! to their start. Temporal (`~`) and spatial (`@`) offsets are accepted and
//! dropped.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Why a string was rejected as a CFI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CfiParseError {
    /// Not wrapped in `epubcfi(` ... `)`
    #[error("missing epubcfi(...) envelope")]
    MissingEnvelope,

    /// No steps below the spine step
    #[error("CFI has no step path")]
    EmptyPath,

    /// Unexpected character where a step, offset or separator was expected
    #[error("malformed step at byte {position}")]
    MalformedStep {
        /// Byte offset inside the CFI body
        position: usize,
    },

    /// Step token is not a non-negative integer
    #[error("step index {token:?} is not a non-negative integer")]
    InvalidStepIndex {
        /// The offending token
        token: String,
    },

    /// Odd (text) step before the end of the path
    #[error("odd step index {index} is only allowed as the last step")]
    OddStepNotAtLeaf {
        /// The offending index
        index: u32,
    },

    /// Spine step is zero or odd
    #[error("spine step {index} must be a positive even number")]
    InvalidSpineStep {
        /// The offending index
        index: u32,
    },

    /// Character offset is not a non-negative integer
    #[error("character offset {token:?} is not a non-negative integer")]
    MalformedOffset {
        /// The offending token
        token: String,
    },

    /// `[` without a matching `]`
    #[error("unterminated [assertion]")]
    UnterminatedAssertion,

    /// Range form without exactly parent, start and end
    #[error("range CFI must have exactly parent, start and end parts")]
    MalformedRange,
}

/// One `/N[assertion]` step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfiStep {
    /// Child index; even for elements, odd for text
    pub index: u32,
    /// Optional `[id]` assertion
    pub assertion: Option<String>,
}

impl CfiStep {
    /// A step without assertion.
    pub fn new(index: u32) -> Self {
        Self { index, assertion: None }
    }

    /// A step with an id assertion.
    pub fn with_assertion(index: u32, assertion: impl Into<String>) -> Self {
        Self {
            index,
            assertion: Some(assertion.into()),
        }
    }
}

/// A parsed CFI position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfiAddress {
    spine_step: CfiStep,
    path: Vec<CfiStep>,
    offset: Option<u32>,
}

impl CfiAddress {
    /// Parse a CFI string.
    ///
    /// Range CFIs resolve to their start position.
    pub fn parse(raw: &str) -> Result<Self, CfiParseError> {
        let body = strip_envelope(raw)?;
        let parts = split_top_level(body, ',')?;
        match parts.len() {
            1 => {
                let location = Location::parse(body, 0)?;
                Self::from_location(location)
            }
            3 => CfiRange::from_parts(body, &parts).map(|range| range.start),
            _ => Err(CfiParseError::MalformedRange),
        }
    }

    /// Whether `raw` parses as a CFI.
    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    /// Raw spine step (`/4` in `/6/4!/...`).
    pub fn spine_step_index(&self) -> u32 {
        self.spine_step.index
    }

    /// Zero-based index of the spine item this position is in.
    pub fn spine_index(&self) -> usize {
        (self.spine_step.index / 2) as usize - 1
    }

    /// Id assertion on the spine step, usually the itemref id.
    pub fn spine_assertion(&self) -> Option<&str> {
        self.spine_step.assertion.as_deref()
    }

    /// Steps inside the content document.
    pub fn path(&self) -> &[CfiStep] {
        &self.path
    }

    /// Character offset within the final text node.
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    /// Whether this position comes strictly before `other`.
    pub fn is_before(&self, other: &CfiAddress) -> bool {
        self < other
    }

    /// Whether this position comes strictly after `other`.
    pub fn is_after(&self, other: &CfiAddress) -> bool {
        self > other
    }

    fn from_location(location: Location) -> Result<Self, CfiParseError> {
        let Location { mut segments, offset } = location;

        let (spine_step, path) = if segments.len() > 1 {
            let package = segments.remove(0);
            // Leading package steps (the spine element) must be elements.
            let Some((spine_step, leading)) = package.split_last() else {
                return Err(CfiParseError::EmptyPath);
            };
            if let Some(odd) = leading.iter().find(|s| s.index % 2 == 1) {
                return Err(CfiParseError::OddStepNotAtLeaf { index: odd.index });
            }
            (spine_step.clone(), segments.into_iter().flatten().collect::<Vec<_>>())
        } else {
            let mut steps = segments.into_iter().flatten();
            let Some(spine_step) = steps.next() else {
                return Err(CfiParseError::EmptyPath);
            };
            (spine_step, steps.collect::<Vec<_>>())
        };

        if spine_step.index == 0 || spine_step.index % 2 == 1 {
            return Err(CfiParseError::InvalidSpineStep { index: spine_step.index });
        }

        let Some((_, inner)) = path.split_last() else {
            return Err(CfiParseError::EmptyPath);
        };
        if let Some(odd) = inner.iter().find(|s| s.index % 2 == 1) {
            return Err(CfiParseError::OddStepNotAtLeaf { index: odd.index });
        }

        Ok(Self { spine_step, path, offset })
    }

    fn assertions(&self) -> impl Iterator<Item = Option<&str>> {
        std::iter::once(self.spine_step.assertion.as_deref())
            .chain(self.path.iter().map(|s| s.assertion.as_deref()))
    }
}

impl Ord for CfiAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.spine_step
            .index
            .cmp(&other.spine_step.index)
            .then_with(|| {
                self.path
                    .iter()
                    .map(|s| s.index)
                    .cmp(other.path.iter().map(|s| s.index))
            })
            .then_with(|| self.offset.cmp(&other.offset))
            // Keeps the order consistent with Eq; assertions never reorder positions.
            .then_with(|| self.assertions().cmp(other.assertions()))
    }
}

impl PartialOrd for CfiAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CfiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epubcfi(/6")?;
        write_step(f, &self.spine_step)?;
        f.write_str("!")?;
        for step in &self.path {
            write_step(f, step)?;
        }
        if let Some(offset) = self.offset {
            write!(f, ":{}", offset)?;
        }
        f.write_str(")")
    }
}

impl FromStr for CfiAddress {
    type Err = CfiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A range CFI: `epubcfi(parent,start,end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiRange {
    /// First position covered
    pub start: CfiAddress,
    /// Last position covered
    pub end: CfiAddress,
}

impl CfiRange {
    /// Parse a range CFI.
    pub fn parse(raw: &str) -> Result<Self, CfiParseError> {
        let body = strip_envelope(raw)?;
        let parts = split_top_level(body, ',')?;
        if parts.len() != 3 {
            return Err(CfiParseError::MalformedRange);
        }
        Self::from_parts(body, &parts)
    }

    /// Whether `addr` falls inside the range, ends included.
    pub fn contains(&self, addr: &CfiAddress) -> bool {
        &self.start <= addr && addr <= &self.end
    }

    fn from_parts(body: &str, parts: &[(usize, usize)]) -> Result<Self, CfiParseError> {
        let [parent, start, end] = parts else {
            return Err(CfiParseError::MalformedRange);
        };
        let parent = Location::parse(&body[parent.0..parent.1], parent.0)?;
        if parent.offset.is_some() {
            return Err(CfiParseError::MalformedRange);
        }
        let start = Location::parse(&body[start.0..start.1], start.0)?;
        let end = Location::parse(&body[end.0..end.1], end.0)?;

        let start = CfiAddress::from_location(parent.clone().join(start))?;
        let end = CfiAddress::from_location(parent.join(end))?;
        Ok(Self { start, end })
    }
}

/// Steps grouped by `!` indirection plus the trailing offset.
#[derive(Debug, Clone)]
struct Location {
    segments: Vec<Vec<CfiStep>>,
    offset: Option<u32>,
}

impl Location {
    /// Parse a location; `base` is the byte position of `text` in the body,
    /// used for error positions.
    fn parse(text: &str, base: usize) -> Result<Self, CfiParseError> {
        let mut scanner = Scanner::new(text, base);
        let mut segments = vec![Vec::new()];
        let mut offset = None;

        while let Some(c) = scanner.peek() {
            match c {
                '/' => {
                    scanner.bump();
                    let step = scanner.step()?;
                    if let Some(current) = segments.last_mut() {
                        current.push(step);
                    }
                }
                '!' => {
                    scanner.bump();
                    if segments.last().is_some_and(|s| s.is_empty()) {
                        return Err(CfiParseError::MalformedStep { position: scanner.position() });
                    }
                    segments.push(Vec::new());
                }
                ':' => {
                    scanner.bump();
                    offset = Some(scanner.offset()?);
                    scanner.trailing_offsets()?;
                    break;
                }
                '~' | '@' => {
                    scanner.trailing_offsets()?;
                    break;
                }
                _ => return Err(CfiParseError::MalformedStep { position: scanner.position() }),
            }
        }

        if !scanner.is_done() {
            return Err(CfiParseError::MalformedStep { position: scanner.position() });
        }
        if segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
            return Err(CfiParseError::EmptyPath);
        }

        Ok(Self { segments, offset })
    }

    /// Append a range part to a range parent.
    fn join(mut self, local: Location) -> Location {
        let mut local_segments = local.segments.into_iter();
        if let (Some(last), Some(first)) = (self.segments.last_mut(), local_segments.next()) {
            last.extend(first);
        }
        self.segments.extend(local_segments);
        self.offset = local.offset;
        self
    }
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Self { text, pos: 0, base }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn position(&self) -> usize {
        self.base + self.pos
    }

    fn is_done(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn token(&mut self, stops: &[char]) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn step(&mut self) -> Result<CfiStep, CfiParseError> {
        let position = self.position();
        let token = self.token(&['/', '[', '!', ':', '~', '@']);
        if token.is_empty() {
            return Err(CfiParseError::MalformedStep { position });
        }
        let index = parse_index(token).ok_or_else(|| CfiParseError::InvalidStepIndex {
            token: token.to_string(),
        })?;

        let assertion = if self.peek() == Some('[') {
            Some(self.assertion()?)
        } else {
            None
        };

        Ok(CfiStep { index, assertion })
    }

    fn offset(&mut self) -> Result<u32, CfiParseError> {
        let token = self.token(&['[', '~', '@']);
        let offset = parse_index(token).ok_or_else(|| CfiParseError::MalformedOffset {
            token: token.to_string(),
        })?;
        if self.peek() == Some('[') {
            // Text location assertion; not needed for positioning.
            self.assertion()?;
        }
        Ok(offset)
    }

    /// `~temporal` and `@x:y` offsets, accepted and dropped.
    fn trailing_offsets(&mut self) -> Result<(), CfiParseError> {
        while let Some(c) = self.peek() {
            if c != '~' && c != '@' {
                break;
            }
            self.bump();
            let position = self.position();
            let token = self.token(&['~', '@', '[']);
            let numeric = !token.is_empty()
                && token.split(':').all(|n| !n.is_empty() && n.parse::<f64>().is_ok());
            if !numeric {
                return Err(CfiParseError::MalformedStep { position });
            }
            if self.peek() == Some('[') {
                self.assertion()?;
            }
        }
        Ok(())
    }

    /// Read `[value;param=...]`, returning the unescaped value.
    fn assertion(&mut self) -> Result<String, CfiParseError> {
        self.bump();
        let mut value = String::new();
        let mut in_params = false;
        loop {
            match self.bump() {
                None => return Err(CfiParseError::UnterminatedAssertion),
                Some('^') => match self.bump() {
                    Some(escaped) if !in_params => value.push(escaped),
                    Some(_) => {}
                    None => return Err(CfiParseError::UnterminatedAssertion),
                },
                Some(']') => break,
                Some(';') => in_params = true,
                Some(c) if !in_params => value.push(c),
                Some(_) => {}
            }
        }
        Ok(value)
    }
}

fn parse_index(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn strip_envelope(raw: &str) -> Result<&str, CfiParseError> {
    let body = raw
        .trim()
        .strip_prefix("epubcfi(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or(CfiParseError::MissingEnvelope)?;
    if body.is_empty() {
        return Err(CfiParseError::EmptyPath);
    }
    Ok(body)
}

/// Byte spans of `body` separated by `sep` outside assertions.
fn split_top_level(body: &str, sep: char) -> Result<Vec<(usize, usize)>, CfiParseError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_assertion = false;
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '^' => {
                chars.next();
            }
            '[' => in_assertion = true,
            ']' => in_assertion = false,
            c if c == sep && !in_assertion => {
                parts.push((start, i));
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if in_assertion {
        return Err(CfiParseError::UnterminatedAssertion);
    }
    parts.push((start, body.len()));
    Ok(parts)
}

fn write_step(f: &mut fmt::Formatter<'_>, step: &CfiStep) -> fmt::Result {
    write!(f, "/{}", step.index)?;
    if let Some(assertion) = &step.assertion {
        f.write_str("[")?;
        for c in assertion.chars() {
            if matches!(c, '^' | '[' | ']' | '(' | ')' | ',' | ';' | '=') {
                f.write_str("^")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str("]")?;
    }
    Ok(())
}
