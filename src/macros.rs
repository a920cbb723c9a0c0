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

//! Macro expansion.
//!
//! SPL macros are text-substitution templates invoked as `` `name` `` or
//! `` `name(arg, ...)` `` and defined in `macros.conf`-style files: each
//! stanza is keyed `name` for a parameterless macro or `name(N)` for a macro
//! of `N` arguments, with a `definition` body (where `$param$` marks a
//! substitution point) and, for parameterized macros, an `args` list of
//! parameter names.
//!
//! Expansion happens on the raw query text before lexing and iterates to a
//! fixed point: a macro body may itself invoke macros.  The loop is capped at
//! 100 rounds and stops early on a round that expands nothing, so macros that
//! reference themselves or undefined names terminate with the unexpanded
//! calls left verbatim.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex},
};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error as ThisError;
use unicase::UniCase;

/// Error reading a macro definition file.
#[derive(Debug, ThisError)]
#[error("cannot read macro file {path}: {source}")]
pub struct MacroFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// One macro definition stanza.
#[derive(Clone, Debug, Default, PartialEq)]
struct MacroDef {
    /// The body, with one layer of surrounding double quotes stripped.
    definition: String,

    /// Declared parameter names, in positional order.
    args: Vec<String>,
}

/// The stanzas of one definition file, keyed case-insensitively by stanza
/// name.
type MacroFile = IndexMap<UniCase<String>, MacroDef>;

// Files already read this process.  Macro files are shared configuration;
// re-analyzing with the same paths must not hit the filesystem again.
static FILE_CACHE: LazyLock<Mutex<HashMap<PathBuf, Arc<MacroFile>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Result of [MacroSet::expand].
#[derive(Debug, Default, PartialEq)]
pub struct Expansion {
    /// The text with every resolvable macro call substituted.
    pub text: String,

    /// Distinct macro calls seen, accumulated over expansion rounds.
    pub unique_macros_found: usize,

    /// Distinct macro calls expanded, accumulated over expansion rounds.
    pub unique_macros_expanded: usize,
}

/// An ordered collection of macro definition files.
///
/// Lookup order is load order: the first file defining a stanza wins.
#[derive(Debug, Default)]
pub struct MacroSet {
    files: Vec<Arc<MacroFile>>,
}

impl MacroSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the definition file at `path`, reusing the process-wide cache
    /// when the same path was loaded before.
    pub fn load_path(&mut self, path: &Path) -> Result<(), MacroFileError> {
        let mut cache = FILE_CACHE.lock().unwrap();
        let file = match cache.get(path) {
            Some(file) => Arc::clone(file),
            None => {
                let content = fs::read_to_string(path).map_err(|source| MacroFileError {
                    path: path.to_path_buf(),
                    source,
                })?;
                let file = Arc::new(parse_conf(&content));
                cache.insert(path.to_path_buf(), Arc::clone(&file));
                file
            }
        };
        self.files.push(file);
        Ok(())
    }

    /// Loads definitions from in-memory text.
    pub fn load_str(&mut self, content: &str) {
        self.files.push(Arc::new(parse_conf(content)));
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Expands every macro call in `text` to a fixed point.
    pub fn expand(&self, text: &str) -> Expansion {
        let mut result = Expansion {
            text: text.to_string(),
            ..Expansion::default()
        };
        let mut calls = find_calls(&result.text);
        let mut rounds = 1;
        while !calls.is_empty() && rounds < 100 {
            let mut substitutions: IndexMap<String, String> = IndexMap::new();
            for file in &self.files {
                for call in &calls {
                    if !substitutions.contains_key(call.as_str()) {
                        if let Some(body) = expand_call(call, file) {
                            substitutions.insert(call.clone(), body);
                        }
                    }
                }
            }
            result.unique_macros_found += calls.len();
            result.unique_macros_expanded += substitutions.len();
            if substitutions.is_empty() {
                break;
            }
            let mut text = result.text.clone();
            for (call, body) in &substitutions {
                text = text.replace(&format!("`{call}`"), body);
            }
            result.text = text;
            calls = find_calls(&result.text);
            rounds += 1;
        }
        result
    }
}

/// Collects the distinct inner texts of every `` `...` `` pair, left to
/// right, non-overlapping.  The inner text may not contain a backtick.
fn find_calls(text: &str) -> IndexSet<String> {
    let mut calls = IndexSet::new();
    let mut rest = text;
    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        let Some(len) = after.find('`') else { break };
        if len > 0 {
            calls.insert(after[..len].to_string());
        }
        rest = &after[len + 1..];
    }
    calls
}

/// A parsed macro invocation: its name and, when present, its arguments.
#[derive(Debug, PartialEq)]
struct MacroCall<'a> {
    name: &'a str,
    args: Vec<&'a str>,
}

impl<'a> MacroCall<'a> {
    /// The stanza name this call resolves against.
    fn stanza(&self) -> String {
        if self.args.is_empty() {
            self.name.to_string()
        } else {
            format!("{}({})", self.name, self.args.len())
        }
    }
}

/// Parses a call of the form `name` or `name(arg, ...)`; arguments may not
/// contain commas or parentheses, and each may be `value` or `name=value`.
fn parse_call(call: &str) -> Option<MacroCall<'_>> {
    let start = call.find(|c: char| c.is_ascii_alphabetic())?;
    let rest = &call[start..];
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    let rest = &rest[name_len..];

    let mut args = Vec::new();
    if let Some(inner) = rest.strip_prefix('(') {
        let inner = inner.strip_suffix(')').or_else(|| {
            inner.find(')').map(|end| &inner[..end])
        })?;
        for arg in inner.split(',') {
            let arg = arg.trim();
            if arg.is_empty() || arg.contains(['(', ')']) {
                return None;
            }
            args.push(arg);
        }
    }
    Some(MacroCall { name, args })
}

/// Expands one call against one definition file; `None` when the stanza is
/// missing or the call is unparsable (the call site is then left verbatim).
fn expand_call(call: &str, file: &MacroFile) -> Option<String> {
    let call = parse_call(call)?;
    let def = file.get(&UniCase::new(call.stanza()))?;
    if call.args.is_empty() {
        return Some(def.definition.clone());
    }

    // `name=value` bindings take precedence, then positional fill-in.
    let mut bindings: IndexMap<&str, &str> = IndexMap::new();
    for arg in &call.args {
        if let Some((name, value)) = arg.split_once('=') {
            if def.args.iter().any(|a| a == name) {
                bindings.insert(name, value);
            }
        }
    }
    for (index, param) in def.args.iter().enumerate() {
        if !bindings.contains_key(param.as_str()) {
            if let Some(value) = call.args.get(index) {
                bindings.insert(param.as_str(), *value);
            }
        }
    }

    let mut body = def.definition.clone();
    for (param, value) in &bindings {
        body = body.replace(&format!("${param}$"), value);
    }
    Some(body)
}

/// Parses a `macros.conf`-style file.
///
/// A trailing `\` continues the value on the next line; the rewrite to a
/// newline plus indentation folds such lines into their stanza before
/// line-oriented parsing.  Continuation lines are joined with a newline,
/// quote stripping happens on the fully folded value.  Keys are matched
/// case-insensitively.
fn parse_conf(content: &str) -> MacroFile {
    let content = content.replace("\\\n", "\n\t");
    let mut raw: IndexMap<UniCase<String>, IndexMap<UniCase<String>, String>> = IndexMap::new();
    let mut stanza: Option<UniCase<String>> = None;
    let mut key: Option<UniCase<String>> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            let name = UniCase::new(header.trim().to_string());
            raw.entry(name.clone()).or_default();
            stanza = Some(name);
            key = None;
            continue;
        }
        let Some(stanza) = &stanza else { continue };
        if line.starts_with([' ', '\t']) {
            // Continuation of the previous value.
            if let Some(key) = &key {
                if let Some(value) = raw.entry(stanza.clone()).or_default().get_mut(key) {
                    value.push('\n');
                    value.push_str(trimmed);
                }
            }
            continue;
        }
        let Some((name, value)) = trimmed.split_once('=') else {
            continue;
        };
        let name = UniCase::new(name.trim().to_string());
        raw.entry(stanza.clone())
            .or_default()
            .insert(name.clone(), value.trim().to_string());
        key = Some(name);
    }

    let mut file = MacroFile::new();
    let definition_key = UniCase::new(String::from("definition"));
    let args_key = UniCase::new(String::from("args"));
    for (name, values) in raw {
        let definition = values
            .get(&definition_key)
            .map(|value| strip_quotes(value).to_string())
            .unwrap_or_default();
        let args = values
            .get(&args_key)
            .map(|value| split_args(value))
            .unwrap_or_default();
        file.insert(name, MacroDef { definition, args });
    }
    file
}

fn split_args(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect()
}

/// Strips one layer of surrounding double quotes.
fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &str = r#"
[uri_filter]
definition = "uri_path=/api/* status=200"

[m(2)]
args = arg1, arg2
definition = "src=$arg1$ dst=$arg2$"

[a]
definition = "`b`"

[b]
definition = "c"

[loop]
definition = "`loop`"
"#;

    fn set() -> MacroSet {
        let mut set = MacroSet::new();
        set.load_str(DEFS);
        set
    }

    #[test]
    fn parameterless_expansion() {
        let result = set().expand("`uri_filter` | stats count");
        assert_eq!(result.text, "uri_path=/api/* status=200 | stats count");
        assert_eq!(result.unique_macros_found, 1);
        assert_eq!(result.unique_macros_expanded, 1);
    }

    #[test]
    fn positional_and_named_arguments() {
        let result = set().expand("`m(1,2)` index=i");
        assert_eq!(result.text, "src=1 dst=2 index=i");
        assert_eq!(result.unique_macros_expanded, 1);

        let named = set().expand("`m(arg1=1,arg2=9)`");
        assert_eq!(named.text, "src=1 dst=9");
    }

    #[test]
    fn chains_expand_to_fixed_point() {
        let result = set().expand("`a`");
        assert_eq!(result.text, "c");
        assert!(result.unique_macros_expanded >= 2);
    }

    #[test]
    fn unknown_calls_left_verbatim() {
        let result = set().expand("`nosuch(1)` x=y");
        assert_eq!(result.text, "`nosuch(1)` x=y");
        assert_eq!(result.unique_macros_found, 1);
        assert_eq!(result.unique_macros_expanded, 0);
    }

    #[test]
    fn self_reference_terminates() {
        let result = set().expand("`loop`");
        assert_eq!(result.text, "`loop`");
    }

    #[test]
    fn arity_selects_the_stanza() {
        // `m` without arguments does not match the two-argument stanza.
        let result = set().expand("`m`");
        assert_eq!(result.text, "`m`");
        assert_eq!(result.unique_macros_expanded, 0);
    }

    #[test]
    fn continuation_lines_fold() {
        let mut set = MacroSet::new();
        set.load_str("[long]\ndefinition = \"index=main \\\nsourcetype=x\"\n");
        let result = set.expand("`long`");
        assert_eq!(result.text, "index=main\nsourcetype=x");
    }

    #[test]
    fn first_file_wins() {
        let mut set = MacroSet::new();
        set.load_str("[m]\ndefinition = \"first\"\n");
        set.load_str("[m]\ndefinition = \"second\"\n");
        assert_eq!(set.expand("`m`").text, "first");
    }
}
