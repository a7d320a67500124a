//! Versioned inline marker format and its state-machine parser.
//!
//! A marker stands in for one removed segment:
//!
//! ```text
//! ⟦hr1|<category code>|<original chars>|<hash length>:<hash>⟧
//! ```
//!
//! Anything that does not complete this grammar is ordinary text.

use headroom_core::Category;
use std::fmt;

pub const MARKER_OPEN: char = '⟦';
pub const MARKER_CLOSE: char = '⟧';
pub const MARKER_VERSION: &str = "hr1";

const HEADER: [char; 4] = ['h', 'r', '1', '|'];
const MAX_COUNT_DIGITS: usize = 19;
const MAX_HASH_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub category: Category,
    pub original_chars: usize,
    pub hash: String,
}

impl Marker {
    pub fn new(category: Category, original_chars: usize, hash: impl Into<String>) -> Self {
        Self {
            category,
            original_chars,
            hash: hash.into(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MARKER_OPEN}{MARKER_VERSION}|{}|{}|{}:{}{MARKER_CLOSE}",
            self.category.code(),
            self.original_chars,
            self.hash.len(),
            self.hash
        )
    }
}

/// A marker located in text; `start..end` is its byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
    pub marker: Marker,
}

#[derive(Debug)]
enum State {
    Idle,
    Header(usize),
    Code,
    CodeEnd(Category),
    Chars {
        category: Category,
        value: usize,
        digits: usize,
    },
    HashLen {
        category: Category,
        chars: usize,
        value: usize,
        digits: usize,
    },
    Hash {
        category: Category,
        chars: usize,
        len: usize,
        hash: String,
    },
    Close(Marker),
}

enum Step {
    Next(State),
    Done(Marker),
    Reject,
}

fn push_digit(value: usize, digits: usize, c: char) -> Option<(usize, usize)> {
    let d = c.to_digit(10)? as usize;
    if digits >= MAX_COUNT_DIGITS {
        return None;
    }
    Some((value.checked_mul(10)?.checked_add(d)?, digits + 1))
}

fn advance(state: State, c: char) -> Step {
    match state {
        State::Idle => Step::Reject,
        State::Header(n) => {
            if c != HEADER[n] {
                Step::Reject
            } else if n + 1 == HEADER.len() {
                Step::Next(State::Code)
            } else {
                Step::Next(State::Header(n + 1))
            }
        }
        State::Code => match Category::from_code(c) {
            Some(category) => Step::Next(State::CodeEnd(category)),
            None => Step::Reject,
        },
        State::CodeEnd(category) => {
            if c == '|' {
                Step::Next(State::Chars {
                    category,
                    value: 0,
                    digits: 0,
                })
            } else {
                Step::Reject
            }
        }
        State::Chars {
            category,
            value,
            digits,
        } => {
            if c == '|' && digits > 0 {
                return Step::Next(State::HashLen {
                    category,
                    chars: value,
                    value: 0,
                    digits: 0,
                });
            }
            match push_digit(value, digits, c) {
                Some((value, digits)) => Step::Next(State::Chars {
                    category,
                    value,
                    digits,
                }),
                None => Step::Reject,
            }
        }
        State::HashLen {
            category,
            chars,
            value,
            digits,
        } => {
            if c == ':' && value > 0 {
                return Step::Next(State::Hash {
                    category,
                    chars,
                    len: value,
                    hash: String::with_capacity(value),
                });
            }
            match push_digit(value, digits, c) {
                Some((value, digits)) if value <= MAX_HASH_LEN => Step::Next(State::HashLen {
                    category,
                    chars,
                    value,
                    digits,
                }),
                _ => Step::Reject,
            }
        }
        State::Hash {
            category,
            chars,
            len,
            mut hash,
        } => {
            if !c.is_ascii_hexdigit() {
                return Step::Reject;
            }
            hash.push(c);
            if hash.len() == len {
                Step::Next(State::Close(Marker::new(category, chars, hash)))
            } else {
                Step::Next(State::Hash {
                    category,
                    chars,
                    len,
                    hash,
                })
            }
        }
        State::Close(marker) => {
            if c == MARKER_CLOSE {
                Step::Done(marker)
            } else {
                Step::Reject
            }
        }
    }
}

/// Locate every well-formed marker in `text`, in order of appearance
pub fn find_markers(text: &str) -> Vec<MarkerSpan> {
    let mut spans = Vec::new();
    let mut state = State::Idle;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        state = match advance(state, c) {
            Step::Next(next) => next,
            Step::Done(marker) => {
                spans.push(MarkerSpan {
                    start,
                    end: i + c.len_utf8(),
                    marker,
                });
                State::Idle
            }
            Step::Reject if c == MARKER_OPEN => {
                start = i;
                State::Header(0)
            }
            Step::Reject => State::Idle,
        };
    }

    spans
}

/// Parse `text` as exactly one marker
pub fn parse_marker(text: &str) -> Option<Marker> {
    let mut spans = find_markers(text);
    match spans.as_slice() {
        [span] if span.start == 0 && span.end == text.len() => spans.pop().map(|s| s.marker),
        _ => None,
    }
}

pub fn contains_marker(text: &str) -> bool {
    !find_markers(text).is_empty()
}
