// spl-validator - a static analyzer for SPL search queries.
// Copyright (C) 2026 Romain Durban
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Diagnostics.
//!
//! Every problem the analyzer finds in a query (an illegal character, a
//! syntax error, an unknown argument, ...) is recorded as a [Diagnostic] in a
//! [Diagnostics] store.  The store deduplicates by source position and
//! offending value, so that the same mistake reported from several grammar
//! paths surfaces once, and it preserves first-insertion order.

use std::fmt::{Display, Formatter, Result as FmtResult, Write as _};

use indexmap::IndexMap;
use serde::{Serialize, Serializer, ser::SerializeMap};

/// The token a diagnostic is attached to, if any.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticToken {
    /// Byte offset of the token in the analyzed text.
    pub lexpos: usize,

    /// The token's value, rendered as text.
    pub value: String,

    /// Stable token-kind identifier (`NAME`, `NUMBER`, `CMD_STATS`, ...).
    #[serde(rename = "type")]
    pub kind: String,
}

/// One recorded problem.
///
/// Positions are byte offsets into the analyzed text.  Negative positions are
/// offsets from the end of the text; they occur only for end-of-query errors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub start_pos: i64,
    pub end_pos: i64,
    pub message: String,
    pub token: Option<DiagnosticToken>,
}

impl Diagnostic {
    /// The deduplication key: `{lexpos}_{value}` when a token is attached,
    /// `{start}_{end}_{value}` otherwise.
    fn key(&self, value: Option<&str>) -> String {
        match &self.token {
            Some(token) => format!("{}_{}", token.lexpos, token.value),
            None => format!(
                "{}_{}_{}",
                self.start_pos,
                self.end_pos,
                value.unwrap_or_default()
            ),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "[{}->{}] {}",
            self.start_pos, self.end_pos, self.message
        )?;
        if let Some(token) = &self.token {
            write!(f, " : for value '{}' of type {}", token.value, token.kind)?;
        }
        Ok(())
    }
}

/// Insertion-ordered, deduplicating diagnostic store.
///
/// Serializes as `{"list": [id, ...], "ref": {id: [diagnostic, ...]}}`: the
/// id list in insertion order, and per id every diagnostic recorded under it.
#[derive(Debug, Default)]
pub struct Diagnostics(IndexMap<String, Vec<Diagnostic>>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `diagnostic`, deduplicating as described in
    /// [Diagnostic::key].  `value` participates in the key for token-less
    /// diagnostics only.
    pub fn report(&mut self, diagnostic: Diagnostic, value: Option<&str>) {
        let key = diagnostic.key(value);
        self.0.entry(key).or_default().push(diagnostic);
    }

    /// Number of distinct diagnostic ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last diagnostic recorded under each id, in id insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.values().filter_map(|group| group.last())
    }

    /// Renders every diagnostic against the text it was produced from,
    /// resolving negative positions as offsets from the end of `text`.
    pub fn render(&self, text: &str) -> String {
        let mut out = String::new();
        for diagnostic in self.iter() {
            let (start, end) = resolve_span(diagnostic, text.len());
            let _ = write!(out, "{diagnostic}");
            let snippet = match &diagnostic.token {
                // Token diagnostics show a few characters of trailing context.
                Some(_) => slice_lossy(text, start, (end + 10).min(text.len())),
                None => slice_lossy(text, start, end),
            };
            let _ = writeln!(out, "\n\t{snippet}");
        }
        out
    }

    /// Prints [render](Self::render) output to standard error.
    pub fn print(&self, text: &str) {
        eprint!("{}", self.render(text));
    }
}

impl Serialize for Diagnostics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("list", &self.0.keys().collect::<Vec<_>>())?;
        map.serialize_entry("ref", &self.0)?;
        map.end()
    }
}

fn resolve_span(diagnostic: &Diagnostic, text_len: usize) -> (usize, usize) {
    let resolve = |pos: i64| {
        if pos < 0 {
            (text_len as i64 + pos).max(0) as usize
        } else {
            (pos as usize).min(text_len)
        }
    };
    (
        resolve(diagnostic.start_pos),
        resolve(diagnostic.end_pos),
    )
}

/// Byte-range slice that tolerates range ends inside a UTF-8 sequence.
fn slice_lossy(text: &str, mut start: usize, mut end: usize) -> &str {
    start = start.min(text.len());
    end = end.clamp(start, text.len());
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(start: i64, end: i64, message: &str, token: Option<DiagnosticToken>) -> Diagnostic {
        Diagnostic {
            start_pos: start,
            end_pos: end,
            message: message.into(),
            token,
        }
    }

    #[test]
    fn dedup_by_token_identity() {
        let mut diagnostics = Diagnostics::new();
        let token = DiagnosticToken {
            lexpos: 4,
            value: String::from("oops"),
            kind: String::from("NAME"),
        };
        diagnostics.report(diag(0, 8, "first", Some(token.clone())), None);
        diagnostics.report(diag(2, 8, "second", Some(token)), None);
        assert_eq!(diagnostics.len(), 1);
        // The rendered diagnostic is the most recent one for the key.
        assert_eq!(diagnostics.iter().next().unwrap().message, "second");
    }

    #[test]
    fn dedup_by_span_and_value() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(diag(0, 5, "a", None), Some("x"));
        diagnostics.report(diag(0, 5, "b", None), Some("y"));
        diagnostics.report(diag(0, 5, "c", None), Some("x"));
        assert_eq!(diagnostics.len(), 2);
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["c", "b"]);
    }

    #[test]
    fn negative_positions_resolve_from_end() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(diag(-20, -1, "Unexpected end of query", None), None);
        let rendered = diagnostics.render("index=main | stats count");
        assert!(rendered.contains("Unexpected end of query"));
        // The snippet is the last 20 bytes of the query, short of the end.
        assert!(rendered.contains("stats coun"));
    }

    #[test]
    fn serialized_shape() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(diag(1, 2, "m", None), Some("v"));
        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json["list"][0], "1_2_v");
        assert_eq!(json["ref"]["1_2_v"][0]["message"], "m");
        assert!(json["ref"]["1_2_v"][0]["token"].is_null());
    }
}
