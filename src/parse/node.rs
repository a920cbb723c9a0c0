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

//! Parse-result nodes and field-flow bookkeeping.
//!
//! Every command reduces to a [Node] carrying the same envelope: the fields
//! it reads, the fields it emits, opaque content strings (lookup names,
//! regexes, expression text), the operators seen, and a [FieldsEffect]
//! describing how it alters the downstream field universe.  Pipelines fold
//! nodes left to right with [apply_effect].
//!
//! Field collections are ordered sets: first-insertion order is observable
//! in the analysis result, so they must never become hash sets.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// How a command alters the downstream field set.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldsEffect {
    /// Leaves the field universe untouched (filters, sorts, ...).
    #[default]
    None,

    /// Adds columns.
    Extend,

    /// Replaces the whole universe with its outputs.
    Replace,

    /// Drops its outputs from the universe.
    Remove,

    /// Renames inputs to outputs.
    Rename,

    /// Creates rows (and their columns) from nothing.
    Generate,
}

/// An insertion-ordered set of field names.  Empty names are silently
/// dropped: several grammar corners produce placeholder empty fields and the
/// result invariant is that no output contains one.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldSet(IndexSet<String>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !name.is_empty() {
            self.0.insert(name);
        }
    }

    pub fn extend_from<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend_from(iter);
        set
    }
}

/// `*`-wildcard match, the only wildcard SPL field names use.
pub fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    fn matches(pattern: &[u8], candidate: &[u8]) -> bool {
        match pattern.split_first() {
            None => candidate.is_empty(),
            Some((b'*', rest)) => (0..=candidate.len())
                .any(|skip| matches(rest, &candidate[skip..])),
            Some((&b, rest)) => {
                candidate.first() == Some(&b) && matches(rest, &candidate[1..])
            }
        }
    }
    matches(pattern.as_bytes(), candidate.as_bytes())
}

/// Expands `pattern` against `universe`, in universe order.
fn expand_wildcard<'a>(universe: &'a FieldSet, pattern: &str) -> Vec<&'a str> {
    universe
        .iter()
        .filter(|field| wildcard_match(pattern, field))
        .collect()
}

/// The field-set composition law at a pipe boundary: `prev` is the running
/// output of the pipeline, and the next command contributes
/// (`effect`, `input`, `output`).
pub fn apply_effect(
    prev: &FieldSet,
    effect: FieldsEffect,
    input: &FieldSet,
    output: &FieldSet,
) -> FieldSet {
    match effect {
        FieldsEffect::None | FieldsEffect::Extend | FieldsEffect::Generate => {
            let mut result = prev.clone();
            result.extend_from(output.iter());
            result
        }
        FieldsEffect::Replace => {
            let mut result = FieldSet::new();
            for field in output.iter() {
                if field.contains('*') {
                    result.extend_from(expand_wildcard(prev, field));
                } else {
                    result.push(field);
                }
            }
            result
        }
        FieldsEffect::Remove => {
            let mut removed = FieldSet::new();
            for field in output.iter() {
                if field.contains('*') {
                    removed.extend_from(expand_wildcard(prev, field));
                } else {
                    removed.push(field);
                }
            }
            prev.iter().filter(|f| !removed.contains(f)).collect()
        }
        FieldsEffect::Rename => {
            let mut result: FieldSet =
                prev.iter().filter(|f| !input.contains(f)).collect();
            result.extend_from(output.iter());
            result
        }
    }
}

/// An argument value: single, or accumulated when the same name is given
/// several times.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    One(String),
    Many(Vec<String>),
}

impl ArgValue {
    /// All values, in order of appearance.
    pub fn values(&self) -> &[String] {
        match self {
            ArgValue::One(value) => std::slice::from_ref(value),
            ArgValue::Many(values) => values,
        }
    }

    /// The value, when given exactly once.  Checks against a repeated
    /// argument deliberately fail, as a list never equals a string.
    pub fn as_one(&self) -> Option<&str> {
        match self {
            ArgValue::One(value) => Some(value),
            ArgValue::Many(_) => None,
        }
    }
}

/// Collected `name=value` arguments with extend-dict accumulation: the
/// second occurrence of a name turns the entry into a list, later ones
/// append.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgMap(IndexMap<String, ArgValue>);

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.0.entry(name.into()) {
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(ArgValue::One(value));
            }
            indexmap::map::Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                match slot {
                    ArgValue::One(first) => {
                        let first = std::mem::take(first);
                        *slot = ArgValue::Many(vec![first, value]);
                    }
                    ArgValue::Many(values) => values.push(value),
                }
            }
        }
    }

    /// Folds `other` in with the same accumulation rules.
    pub fn merge(&mut self, other: ArgMap) {
        for (name, value) in other.0 {
            for v in value.values() {
                self.insert(name.clone(), v.clone());
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// The single value of `name`, when present exactly once.
    pub fn one(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(ArgValue::as_one)
    }

    /// All values recorded under `name`.
    pub fn values(&self, name: &str) -> &[String] {
        self.0.get(name).map(ArgValue::values).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn remove(&mut self, name: &str) -> Option<ArgValue> {
        self.0.shift_remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The uniform envelope every command reduction produces.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub kind: &'static str,
    pub input: FieldSet,
    pub output: FieldSet,
    pub content: Vec<String>,
    pub op: Vec<String>,
    pub fields_effect: FieldsEffect,
}

impl Node {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn command(effect: FieldsEffect) -> Self {
        Self {
            kind: "command",
            fields_effect: effect,
            ..Self::default()
        }
    }

    pub fn push_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        if !content.is_empty() {
            self.content.push(content);
        }
    }
}

/// A completed search expression: the head filters plus the command
/// pipeline, with the per-command effect trail.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SearchNode {
    #[serde(rename = "type")]
    pub kind: &'static str,

    pub input: FieldSet,
    pub output: FieldSet,

    #[serde(rename = "fields-effect")]
    pub fields_effect: Vec<FieldsEffect>,

    pub content: Vec<String>,
}

/// A recorded subsearch: the nesting level it completed at, and its search
/// expression.
#[derive(Clone, Debug, Serialize)]
pub struct Subsearch {
    pub level: u32,
    pub data: SearchNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> FieldSet {
        names.iter().copied().collect()
    }

    #[test]
    fn field_sets_dedup_and_keep_order() {
        let mut set = FieldSet::new();
        set.push("b");
        set.push("a");
        set.push("b");
        set.push("");
        assert_eq!(set.to_vec(), ["b", "a"]);
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("a*", "abc"));
        assert!(wildcard_match("*c", "abc"));
        assert!(wildcard_match("a*c", "abc"));
        assert!(wildcard_match("*", "anything"));
        assert!(!wildcard_match("a*", "bc"));
        assert!(!wildcard_match("ab", "abc"));
    }

    #[test]
    fn replace_expands_wildcards_against_previous() {
        let prev = fields(&["status", "status_code", "host"]);
        let out = apply_effect(
            &prev,
            FieldsEffect::Replace,
            &FieldSet::new(),
            &fields(&["status*", "new"]),
        );
        assert_eq!(out.to_vec(), ["status", "status_code", "new"]);
    }

    #[test]
    fn remove_drops_matches() {
        let prev = fields(&["a", "b", "ab"]);
        let out = apply_effect(
            &prev,
            FieldsEffect::Remove,
            &FieldSet::new(),
            &fields(&["a*"]),
        );
        assert_eq!(out.to_vec(), ["b"]);
    }

    #[test]
    fn rename_swaps_in_place_fields() {
        let prev = fields(&["a", "b", "c"]);
        let out = apply_effect(
            &prev,
            FieldsEffect::Rename,
            &fields(&["a", "c"]),
            &fields(&["x", "y"]),
        );
        assert_eq!(out.to_vec(), ["b", "x", "y"]);
    }

    #[test]
    fn extend_unions_preserving_first_appearance() {
        let prev = fields(&["a", "b"]);
        let out = apply_effect(
            &prev,
            FieldsEffect::Extend,
            &FieldSet::new(),
            &fields(&["b", "c"]),
        );
        assert_eq!(out.to_vec(), ["a", "b", "c"]);
    }

    #[test]
    fn arg_map_accumulates_duplicates() {
        let mut args = ArgMap::new();
        args.insert("index", "a");
        assert_eq!(args.one("index"), Some("a"));
        args.insert("index", "b");
        assert_eq!(args.one("index"), None);
        args.insert("index", "c");
        assert_eq!(args.values("index"), ["a", "b", "c"]);
    }
}
