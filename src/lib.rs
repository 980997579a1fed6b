#![allow(clippy::module_inception)]

use std::sync::Arc;

use serde::Serialize;

use crate::errors::errors::{Error, ErrorTip};

pub mod ast;
pub mod config;
pub mod errors;
pub mod lexer;
pub mod logging;
pub mod macros;
pub mod parser;
pub mod scope;
pub mod type_checker;

extern crate regex;

/// A byte offset into a named source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position(pub u32, pub Arc<String>);

impl Position {
    pub fn null() -> Self {
        Position(0, Arc::new(String::from("<null>")))
    }
}

/// A half-open range of positions in a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start.0 <= end.0, "span start after its end");
        Span { start, end }
    }

    /// Returns a span from the start of `self` to the end of `other`.
    pub fn cover(&self, other: &Span) -> Span {
        debug_assert!(self.start.1 == other.start.1, "incompatible locations");
        Span::new(self.start.clone(), other.end.clone())
    }

    /// Combines two optional spans, keeping whichever side is present.
    pub fn merge(left: Option<&Span>, right: Option<&Span>) -> Option<Span> {
        match (left, right) {
            (Some(a), Some(b)) => Some(a.cover(b)),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        }
    }

    pub fn file(&self) -> &str {
        &self.start.1
    }
}

/// Returns the 1-based line number, the line's text and the column of `position` in `content`.
pub fn get_line_at_position(content: &str, position: u32) -> Option<(usize, String, usize)> {
    let pos = position as usize;

    if pos > content.len() {
        return None;
    }

    let mut start = 0;
    let mut line_number = 1;

    for line in content.split_inclusive('\n') {
        let end = start + line.len();

        if (start..end).contains(&pos) {
            let line_pos = pos - start;
            return Some((line_number, line.to_string(), line_pos));
        }

        start = end;
        line_number += 1;
    }

    // End of input: point just past the last character.
    content
        .split_inclusive('\n')
        .last()
        .map(|line| (line_number - 1, line.to_string(), line.trim_end_matches('\n').len()))
}


/// Renders a diagnostic with the offending source line, e.g.
///
/// ```text
/// Error: TypeMatchError (Expected type `Int`, received `String`)
/// -> main.lang
///    |
/// 20 | return "s";
///    | -------^
/// ```
pub fn render_error(error: &Error, source: &str) -> String {
    let mut out = String::new();

    if let ErrorTip::None = error.get_tip() {
        out.push_str(&format!("Error: {}\n", error.get_error_name()));
    } else {
        out.push_str(&format!(
            "Error: {} ({})\n",
            error.get_error_name(),
            error.get_tip()
        ));
    }

    let position = error.get_position();
    out.push_str(&format!("-> {}\n", position.1));

    let Some((line, line_text, line_pos)) = get_line_at_position(source, position.0) else {
        return out;
    };

    let line_string = line.to_string();
    let padding = line_string.len() + 2;

    out.push_str(&format!("{:>padding$}\n", "|"));

    let (line_text_removed, removed_whitespace) = remove_starting_whitespace(&line_text);
    out.push_str(&format!("{} | {}\n", line_string, line_text_removed.trim_end()));

    let arrows = line_pos.saturating_sub(removed_whitespace) + 1;
    out.push_str(&format!("{:>padding$} {:->arrows$}\n", "|", "^"));

    out
}

fn remove_starting_whitespace(string: &str) -> (String, usize) {
    let start = string
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .count();

    (String::from(&string[start..]), start)
}
