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

//! Per-command parsing and semantics.
//!
//! After the pipeline parser has recognized a command token it hands the
//! cursor to this module.  Dispatch keys on the catalog's stable token
//! identifier so that aliases (`bucket`, `af`, `run`) share a body; the
//! individual parsers live in the submodules, grouped by what the commands do
//! to the field universe.
//!
//! Most commands share one of a few argument shapes (argument terms and field
//! lists in flexible positions, an optional `by` clause); the shared walkers
//! live here, as does [check_args] and the created-fields application that
//! several of the flexible-shape commands need.

pub mod aggregate;
pub mod control;
pub mod enrich;
pub mod fields;
pub mod generate;

use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};
use crate::lex::{Punct, Reserved, Token};

/// The command being parsed: its typed (lowercased) name and the byte
/// position of the command token, the anchor for its diagnostics.
pub(crate) struct Cmd<'a> {
    pub name: &'a str,
    pub start: usize,
}

impl Cmd<'_> {
    /// Reports a command-scoped diagnostic spanning from the command token
    /// to the last consumed token.
    pub(crate) fn report(&self, p: &mut Parser, message: String, value: &str) {
        let end = p.last_pos() as i64;
        p.report(self.start as i64, end, message, Some(value));
    }
}

/// Parses the body of `name`, the command whose token was just consumed.
pub(crate) fn parse_command_body(p: &mut Parser, name: &str, start: usize) -> Node {
    let cmd = Cmd { name, start };
    let token_name = p
        .catalog
        .get(name)
        .map(|spec| spec.token_name.clone())
        .unwrap_or_default();
    match token_name.as_str() {
        // Filters and structure.
        "CMD_SEARCH" => control::search(p, &cmd),
        "CMD_METASEARCH" => control::metasearch(p, &cmd),
        "CMD_APPEND" | "CMD_APPENDCOLS" => control::append(p, &cmd),
        "CMD_APPENDPIPE" => control::appendpipe(p, &cmd),
        "CMD_JOIN" => control::join(p, &cmd),
        "CMD_MULTISEARCH" => control::multisearch(p, &cmd),
        "CMD_FOREACH" => control::foreach(p, &cmd),
        "CMD_MAP" => control::map(p, &cmd),
        "CMD_MULTIKV" => control::multikv(p, &cmd),

        // Aggregation.
        "CMD_STATS" => aggregate::stats(p, &cmd),
        "CMD_EVENTSTATS" => aggregate::eventstats(p, &cmd),
        "CMD_STREAMSTATS" => aggregate::streamstats(p, &cmd),
        "CMD_MSTATS" => aggregate::mstats(p, &cmd),
        "CMD_GEOSTATS" => aggregate::geostats(p, &cmd),
        "CMD_CHART" => aggregate::chart(p, &cmd),
        "CMD_TIMECHART" => aggregate::timechart(p, &cmd),
        "CMD_TOP" | "CMD_RARE" => aggregate::top(p, &cmd),

        // Field manipulation.
        "CMD_FIELDS" => fields::fields(p, &cmd),
        "CMD_TABLE" => fields::table(p, &cmd),
        "CMD_HIGHLIGHT" => fields::highlight(p, &cmd),
        "CMD_ICONIFY" => fields::iconify(p, &cmd),
        "CMD_RENAME" => fields::rename(p, &cmd),
        "CMD_SORT" => fields::sort(p, &cmd),
        "CMD_DEDUP" => fields::dedup(p, &cmd),
        "CMD_ACCUM" => fields::accum(p, &cmd),
        "CMD_AUTOREGRESS" => fields::autoregress(p, &cmd),
        "CMD_BIN" => fields::bin(p, &cmd),
        "CMD_CONVERT" => fields::convert(p, &cmd),
        "CMD_DELTA" => fields::delta(p, &cmd),
        "CMD_GAUGE" => fields::gauge(p, &cmd),
        "CMD_COFILTER" => fields::cofilter(p, &cmd),
        "CMD_CONTINGENCY" => fields::contingency(p, &cmd),
        "CMD_FIELDFORMAT" => fields::fieldformat(p, &cmd),
        "CMD_REPLACE" => fields::replace(p, &cmd),
        "CMD_EXPAND" | "CMD_FLATTEN" | "CMD_NOMV" => fields::single_field(p, &cmd),

        // Enrichment.
        "CMD_EVAL" => enrich::eval(p, &cmd),
        "CMD_WHERE" => enrich::where_(p, &cmd),
        "CMD_LOOKUP" => enrich::lookup(p, &cmd),
        "CMD_REX" => enrich::rex(p, &cmd),
        "CMD_EREX" => enrich::erex(p, &cmd),
        "CMD_REGEX" => enrich::regex(p, &cmd),
        "CMD_EXTRACT" => enrich::extract(p, &cmd),
        "CMD_IPLOCATION" => enrich::iplocation(p, &cmd),
        "CMD_GEOM" => enrich::geom(p, &cmd),
        "CMD_PREDICT" => enrich::predict(p, &cmd),
        "CMD_RANGEMAP" => enrich::rangemap(p, &cmd),
        "CMD_ANOMALIES" => enrich::anomalies(p, &cmd),
        "CMD_HEAD" => enrich::head(p, &cmd),
        "CMD_FINDTYPES" => enrich::findtypes(p, &cmd),
        "CMD_MAKEMV" | "CMD_MAKECONTINUOUS" | "CMD_MVCOMBINE" | "CMD_MVEXPAND" => {
            enrich::single_field_with_args(p, &cmd)
        }

        // Generators.
        "CMD_INPUTLOOKUP" | "CMD_INPUTCSV" => generate::inputlookup(p, &cmd),
        "CMD_OUTPUTLOOKUP" | "CMD_OUTPUTCSV" => generate::outputlookup(p, &cmd),
        "CMD_LOADJOB" => generate::loadjob(p, &cmd),
        "CMD_SAVEDSEARCH" => generate::savedsearch(p, &cmd),
        "CMD_FROM" => generate::from(p, &cmd),
        "CMD_DATAMODEL" => generate::datamodel(p, &cmd),
        "CMD_REST" => generate::rest(p, &cmd),
        "CMD_RETURN" => generate::return_(p, &cmd),
        "CMD_SEARCHTXN" => generate::searchtxn(p, &cmd),
        "CMD_PIVOT" => generate::pivot(p, &cmd),
        "CMD_FORMAT" => generate::format(p, &cmd),
        "CMD_REDISTRIBUTE" => generic_with_by(p, &cmd),

        // Everything else shares the flexible fields-or-args shape plus the
        // per-command created-fields profile.
        _ => generic(p, &cmd),
    }
}

/// Validates collected argument names against the catalog.
pub(crate) fn check_args(p: &mut Parser, cmd: &Cmd, args: &ArgMap) {
    let catalog = p.catalog;
    let Some(spec) = catalog.get(cmd.name) else {
        return;
    };
    let unexpected: Vec<String> = args
        .keys()
        .filter(|arg| !spec.accepts_arg(arg))
        .map(str::to_string)
        .collect();
    let expected = spec.expected_args();
    for arg in unexpected {
        cmd.report(
            p,
            format!("Unexpected argument '{arg}' in {}, expected {}", cmd.name, expected),
            &arg,
        );
    }
}

/// Argument terms and field names in any interleaving (the
/// `command_params_fields_or_args` shape).
pub(crate) fn fields_or_args(p: &mut Parser) -> (ArgMap, Vec<String>) {
    let mut args = ArgMap::new();
    let mut fields = Vec::new();
    loop {
        if let Some(more) = p.parse_args_term() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                fields.push(field);
                p.eat_punct(Punct::Comma);
                continue;
            }
        }
        break;
    }
    (args, fields)
}

/// [fields_or_args] plus an optional trailing `by <fields>` clause with
/// arguments on either side.
pub(crate) fn by_and_fields_or_args(p: &mut Parser) -> (ArgMap, Vec<String>, Vec<String>) {
    let (mut args, fields) = fields_or_args(p);
    let mut by = Vec::new();
    if p.eat_reserved(Reserved::By) {
        if let Some(list) = p.parse_fields_list() {
            by = list;
        }
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
        }
    }
    (args, fields, by)
}

/// The flexible-shape commands: arguments and/or fields in any order, an
/// effect of `none` unless the command's profile below says otherwise.
pub(crate) fn generic(p: &mut Parser, cmd: &Cmd) -> Node {
    let (args, fields) = fields_or_args(p);
    let mut node = Node::command(FieldsEffect::None);
    node.input.extend_from(fields);
    check_args(p, cmd, &args);
    apply_profile(p, cmd, &args, &mut node);
    node
}

/// [generic] plus an optional `by <fields>` clause (`redistribute`).
pub(crate) fn generic_with_by(p: &mut Parser, cmd: &Cmd) -> Node {
    let (args, fields, by) = by_and_fields_or_args(p);
    let mut node = Node::command(FieldsEffect::None);
    node.input.extend_from(fields);
    node.input.extend_from(by);
    check_args(p, cmd, &args);
    apply_profile(p, cmd, &args, &mut node);
    node
}

/// Per-command created-fields and required-argument rules that the catalog
/// alone cannot express (the command's "profile").
pub(crate) fn apply_profile(p: &mut Parser, cmd: &Cmd, args: &ArgMap, node: &mut Node) {
    let catalog = p.catalog;
    let created = catalog
        .get(cmd.name)
        .map(|spec| &spec.created_fields);
    match cmd.name {
        "anomalydetection" => {
            let Some(created) = created else { return };
            match args.one("action") {
                Some("summary") => {
                    node.output.extend_from(created.keyed("summary").iter().cloned());
                    node.fields_effect = FieldsEffect::Replace;
                }
                Some("filter") | Some("annotate") | None => {
                    node.output
                        .extend_from(created.keyed("annotate_filter").iter().cloned());
                    node.fields_effect = FieldsEffect::Extend;
                }
                Some(_) => {
                    node.output
                        .extend_from(created.keyed("annotate_filter").iter().cloned());
                    node.fields_effect = FieldsEffect::Extend;
                }
            }
        }
        "af" | "analyzefields" => {
            let Some(created) = created else { return };
            node.input = args
                .iter()
                .flat_map(|(_, value)| value.values())
                .cloned()
                .collect();
            node.output.extend_from(created.list().iter().cloned());
            node.fields_effect = FieldsEffect::Replace;
        }
        "associate" => {
            let Some(created) = created else { return };
            node.output.extend_from(created.list().iter().cloned());
            node.fields_effect = FieldsEffect::Replace;
        }
        "bucketdir" => {
            if let Some(pathfield) = args.one("pathfield") {
                node.input.push(pathfield);
            }
        }
        "cluster" => {
            if let Some(field) = args.one("field") {
                node.input.push(field);
            }
        }
        "dbinspect" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Replace;
            node.output.extend_from(created.list().iter().cloned());
            if args.contains("index") {
                node.input.push("index");
                for index in args.values("index") {
                    node.push_content(index.clone());
                }
            }
        }
        "diff" => {
            if let Some(attribute) = args.one("attribute") {
                node.input.push(attribute);
            }
        }
        "eventcount" => {
            for index in args.values("index") {
                node.push_content(index.clone());
            }
        }
        "makeresults" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Generate;
            let key = match args.one("annotate") {
                Some("t") | Some("true") | Some("TRUE") | Some("True") => "annotate",
                _ => "default",
            };
            node.output.extend_from(created.keyed(key).iter().cloned());
        }
        "fieldsummary" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Replace;
            node.output.extend_from(created.list().iter().cloned());
        }
        "gentimes" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Generate;
            node.output.extend_from(created.list().iter().cloned());
        }
        "history" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Generate;
            let key = match args.one("events") {
                Some("true") | Some("t") | Some("True") => "true",
                _ => "false",
            };
            node.output.extend_from(created.keyed(key).iter().cloned());
        }
        "kmeans" => {
            if let Some(cfield) = args.one("cfield") {
                node.output.push(cfield);
            } else if let Some(created) = created {
                node.output.extend_from(created.list().iter().cloned());
                node.fields_effect = FieldsEffect::Extend;
            }
        }
        "kvform" => {
            if let Some(field) = args.one("field") {
                node.input.push(field);
            }
        }
        "mcollect" | "meventcollect" => {
            if !args.contains("index") {
                cmd.report(
                    p,
                    format!("Missing index argument in command {}", cmd.name),
                    "index",
                );
            }
        }
        "metadata" => {
            node.fields_effect = FieldsEffect::Generate;
            let types = catalog
                .get(cmd.name)
                .map(|spec| spec.types.clone())
                .unwrap_or_default();
            match args.one("type") {
                None => cmd.report(
                    p,
                    format!("Missing type argument in command {}", cmd.name),
                    "type",
                ),
                Some(value) => match types.get(value) {
                    Some(field) => node.output.push(field.clone()),
                    None => {
                        let expected: Vec<&String> = types.keys().collect();
                        let value = value.to_string();
                        cmd.report(
                            p,
                            format!(
                                "Invalid type {value} in command {}, expected {expected:?}",
                                cmd.name
                            ),
                            &value,
                        );
                    }
                },
            }
            for index in args.values("index") {
                node.push_content(index.clone());
            }
            if let Some(created) = created {
                node.output.extend_from(created.list().iter().cloned());
            }
        }
        "mpreview" => {
            node.fields_effect = FieldsEffect::Generate;
            for index in args.values("index") {
                node.push_content(index.clone());
            }
            if let Some(filter) = args.one("filter") {
                node.push_content(filter);
            }
        }
        "outputtext" | "relevancy" | "reltime" => {
            let Some(created) = created else { return };
            node.fields_effect = FieldsEffect::Extend;
            node.output.extend_from(created.list().iter().cloned());
        }
        "script" | "run" => {
            let inputs = node.input.to_vec();
            node.input = Default::default();
            for field in inputs {
                node.push_content(field);
            }
        }
        "sendemail" => {
            if !args.contains("to") {
                cmd.report(
                    p,
                    format!("Missing 'to' argument in command {}", cmd.name),
                    "to",
                );
            }
        }
        _ => (),
    }
}

/// Consumes an optional leading integer (`top 5`, `dedup 3`, ...).
pub(crate) fn eat_count(p: &mut Parser) {
    if matches!(p.peek(), Some(Token::Number(_))) {
        p.bump();
    }
}
