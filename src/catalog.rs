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

//! The command catalog.
//!
//! The catalog is the declarative table behind the whole analyzer: it
//! enumerates every recognized command, the argument names the command
//! accepts, the fields it creates, and command-specific enumerations (search
//! modes, selectors, metadata types).  The lexer consults it to turn bare
//! identifiers into command tokens, and the semantic checks consult it for
//! argument validation and created-field application.
//!
//! The default catalog ships embedded as `spl_commands.json` and is parsed
//! once per process.  Command names match case-insensitively, so the table is
//! keyed by [UniCase].  Aliases (`bucket` for `bin`, `af` for
//! `analyzefields`, `run` for `script`) are separate entries sharing a
//! `token_name`.

use std::{fs, path::Path, sync::LazyLock};

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use thiserror::Error as ThisError;
use unicase::UniCase;

/// Error loading a catalog.
#[derive(Debug, ThisError)]
pub enum CatalogError {
    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The fields a command adds to (or substitutes into) the result stream.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CreatedFields {
    #[default]
    None,

    /// A single field name.
    One(String),

    /// A plain list of field names.
    List(Vec<String>),

    /// Lists selected by the value of one of the command's arguments
    /// (e.g. `makeresults` with and without `annotate`).
    ByKey(IndexMap<String, Vec<String>>),
}

impl CreatedFields {
    /// The plain list, when the command has an unconditional one.
    pub fn list(&self) -> &[String] {
        match self {
            CreatedFields::List(fields) => fields,
            _ => &[],
        }
    }

    /// The list selected by `key`, for keyed created-field tables.
    pub fn keyed(&self, key: &str) -> &[String] {
        match self {
            CreatedFields::ByKey(map) => map.get(key).map(Vec::as_slice).unwrap_or_default(),
            _ => &[],
        }
    }

    /// The single field name, for commands that create exactly one.
    pub fn one(&self) -> Option<&str> {
        match self {
            CreatedFields::One(field) => Some(field),
            _ => None,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Deserialize)]
pub struct CommandSpec {
    /// Stable token identifier, e.g. `CMD_STATS`.  Grammar dispatch keys on
    /// this, so aliases share it.
    pub token_name: String,

    /// Recognized `name=value` argument names.
    #[serde(default)]
    pub args: IndexSet<String>,

    /// Fields the command creates.
    #[serde(default)]
    pub created_fields: CreatedFields,

    /// Valid positional modes (`findtypes`).
    #[serde(default)]
    pub modes: IndexSet<String>,

    /// Valid `type=` values and the field each one yields (`metadata`).
    #[serde(default)]
    pub types: IndexMap<String, String>,

    /// Valid search modes (`datamodel`).
    #[serde(default)]
    pub search_modes: IndexSet<String>,

    /// Valid bare selectors (`multikv`).
    #[serde(default)]
    pub selectors: IndexSet<String>,
}

impl CommandSpec {
    pub fn accepts_arg(&self, name: &str) -> bool {
        self.args.contains(name)
    }

    /// Human-readable list of the accepted argument names, for diagnostics.
    pub fn expected_args(&self) -> String {
        format!("[{}]", {
            use itertools::Itertools;
            self.args.iter().map(|arg| format!("'{arg}'")).join(", ")
        })
    }
}

/// The full command table, keyed case-insensitively by command name.
#[derive(Debug)]
pub struct Catalog {
    commands: IndexMap<UniCase<String>, CommandSpec>,
}

static GLOBAL: LazyLock<Catalog> = LazyLock::new(|| {
    Catalog::from_str(include_str!("spl_commands.json"))
        .expect("embedded spl_commands.json is well-formed")
});

impl Catalog {
    /// The embedded default catalog, parsed once per process.
    pub fn global() -> &'static Catalog {
        &GLOBAL
    }

    pub fn from_str(json: &str) -> Result<Self, CatalogError> {
        let commands: IndexMap<String, CommandSpec> = serde_json::from_str(json)?;
        Ok(Self {
            commands: commands
                .into_iter()
                .map(|(name, spec)| (UniCase::new(name), spec))
                .collect(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        Self::from_str(&fs::read_to_string(path)?)
    }

    /// Looks up a command by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(&UniCase::new(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&UniCase::new(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_catalog_loads() {
        let catalog = Catalog::global();
        assert!(catalog.len() > 100);
        assert!(catalog.contains("stats"));
        // Lookup is case-insensitive.
        assert!(catalog.contains("STATS"));
        assert!(!catalog.contains("frobnicate"));
    }

    #[test]
    fn aliases_share_tokens() {
        let catalog = Catalog::global();
        assert_eq!(catalog.get("bucket").unwrap().token_name, "CMD_BIN");
        assert_eq!(catalog.get("bin").unwrap().token_name, "CMD_BIN");
        assert_eq!(
            catalog.get("af").unwrap().token_name,
            catalog.get("analyzefields").unwrap().token_name
        );
    }

    #[test]
    fn created_field_shapes() {
        let catalog = Catalog::global();
        assert!(matches!(
            catalog.get("geom").unwrap().created_fields,
            CreatedFields::One(_)
        ));
        assert!(
            !catalog
                .get("makeresults")
                .unwrap()
                .created_fields
                .keyed("default")
                .is_empty()
        );
        assert!(
            !catalog
                .get("metasearch")
                .unwrap()
                .created_fields
                .list()
                .is_empty()
        );
    }

    #[test]
    fn enum_tables() {
        let catalog = Catalog::global();
        assert!(catalog.get("metadata").unwrap().types.contains_key("hosts"));
        assert!(catalog.get("findtypes").unwrap().modes.contains("notcovered"));
        assert!(catalog.get("multikv").unwrap().selectors.contains("filter"));
        assert!(
            catalog
                .get("datamodel")
                .unwrap()
                .search_modes
                .contains("search")
        );
    }
}
