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

//! Commands that compute or look up new columns.

use crate::lex::{Punct, Reserved, Token};
use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};

use super::{Cmd, check_args};

/// One `field = expression` assignment.
pub(crate) struct EvalAssign {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub content: Vec<String>,
}

pub(crate) fn parse_eval_assign(p: &mut Parser) -> Option<EvalAssign> {
    let mark = p.mark();
    let field = p.parse_field_name()?;
    if !p.eat_punct(Punct::Eq) {
        p.reset(mark);
        return None;
    }
    let Some(expr) = p.parse_expression() else {
        p.reset(mark);
        return None;
    };
    let mut inputs = vec![field.clone()];
    inputs.extend(expr.inputs);
    Some(EvalAssign {
        inputs,
        outputs: vec![field],
        content: vec![expr.text],
    })
}

/// `eval a=expr, b=expr, ...`: each assignment adds its left-hand field.
pub(super) fn eval(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    while let Some(assign) = parse_eval_assign(p) {
        node.input.extend_from(assign.inputs);
        node.output.extend_from(assign.outputs);
        for content in assign.content {
            node.push_content(content);
        }
        if !p.eat_punct(Punct::Comma) {
            break;
        }
    }
    node
}

/// `where <expression>`.
pub(super) fn where_(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    if let Some(expr) = p.parse_expression() {
        node.input.extend_from(expr.inputs);
        node.push_content(expr.text);
    }
    node
}

/// `lookup [args] <table> <in-fields> [OUTPUT|OUTPUTNEW <out-fields>]`.
pub(super) fn lookup(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    if let Some(args) = p.parse_args_list() {
        check_args(p, cmd, &args);
    }
    if let Some(table) = p.parse_field_name() {
        node.push_content(table);
    }
    if let Some((inputs, outputs)) = p.parse_any_fields_list() {
        node.input.extend_from(inputs);
        node.input.extend_from(outputs);
    }
    if p.eat_reserved(Reserved::Output) || p.eat_reserved(Reserved::OutputNew) {
        if let Some((outputs, _renames)) = p.parse_any_fields_list() {
            node.output.extend_from(outputs);
        }
    }
    node
}

/// `rex [args] "<pattern>" [args]`: outputs are the pattern's named capture
/// groups.
pub(super) fn rex(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if let Some(Token::Str(pattern)) = p.peek() {
            let pattern = pattern.clone();
            p.bump();
            for group in named_groups(&pattern) {
                node.output.push(group);
            }
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// Scans a regex for `?<name>` named groups.
fn named_groups(pattern: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut rest = pattern;
    while let Some(start) = rest.find("?<") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('>') else { break };
        if end > 0 {
            groups.push(after[..end].to_string());
        }
        rest = &after[end + 1..];
    }
    groups
}

/// `erex [args] <field> [args]`: the positional name is the new column,
/// `fromfield=` is the source.
pub(super) fn erex(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                node.output.push(field);
                continue;
            }
        }
        break;
    }
    if let Some(fromfield) = args.one("fromfield") {
        node.input.push(fromfield);
    }
    check_args(p, cmd, &args);
    node
}

/// `regex <field> =|!= "<re>"` or `regex "<re>"`.
pub(super) fn regex(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    if let Some(Token::Str(pattern)) = p.peek() {
        let pattern = pattern.clone();
        p.bump();
        node.push_content(pattern);
        return node;
    }
    if let Some(field) = p.parse_field_name() {
        node.input.push(field);
    }
    let _ = p.eat_punct(Punct::Eq) || p.eat_punct(Punct::Neq);
    if let Some(Token::Str(pattern)) = p.peek() {
        let pattern = pattern.clone();
        p.bump();
        node.push_content(pattern);
    }
    node
}

/// `extract [args] [<value>] [args]`: always reads `_raw`.
pub(super) fn extract(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    node.input.push("_raw");
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_boundary() {
            break;
        }
        if let Some(value) = p.parse_value() {
            node.push_content(value);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `iplocation [args] <field> [args]`: adds the geo columns, honoring
/// `allfields` and `prefix`.
pub(super) fn iplocation(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field);
                continue;
            }
        }
        break;
    }
    let created = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.created_fields.clone())
        .unwrap_or_default();
    let mut created_fields: Vec<String> = created.keyed("default").to_vec();
    if matches!(args.one("allfields"), Some("true") | Some("t") | Some("True")) {
        created_fields.extend(created.keyed("extended").iter().cloned());
    }
    let prefix = args.one("prefix").unwrap_or_default().to_string();
    for field in created_fields {
        node.output.push(format!("{prefix}{field}"));
    }
    check_args(p, cmd, &args);
    node
}

/// `geom [args] [<featureCollection>] [args]`.
pub(super) fn geom(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    if let Some(spec) = p.catalog.get(cmd.name) {
        if let Some(field) = spec.created_fields.one() {
            node.output.push(field.to_string());
        }
    }
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(collection) = p.parse_field_name() {
                node.push_content(collection);
                continue;
            }
        }
        break;
    }
    match args.one("featureidfield") {
        Some(field) => node.input.push(field),
        None => node.input.push("featureId"),
    }
    check_args(p, cmd, &args);
    node
}

/// `predict <fields-or-renames> [args]`: confidence-bound argument names
/// (`upper95`) normalize to the catalog's `upperXX`, and their values are
/// new columns.
pub(super) fn predict(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if let Some((from, to)) = p.parse_rfield_term() {
            node.input.push(from);
            node.output.push(to);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field);
                continue;
            }
        }
        break;
    }

    let mut normalized = ArgMap::new();
    for (name, value) in args.iter() {
        if let Some(stem) = confidence_bound_stem(name) {
            for v in value.values() {
                node.output.push(v.clone());
                normalized.insert(format!("{stem}XX"), v.clone());
            }
        } else {
            for v in value.values() {
                normalized.insert(name.to_string(), v.clone());
            }
        }
        if matches!(name, "correlate" | "suppress") {
            for v in value.values() {
                node.input.push(v.clone());
            }
        }
    }
    check_args(p, cmd, &normalized);
    node
}

/// `upper95` → `upper`, `lower50` → `lower`.
fn confidence_bound_stem(name: &str) -> Option<&'static str> {
    for stem in ["upper", "lower"] {
        if let Some(digits) = name.strip_prefix(stem) {
            if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Some(stem);
            }
        }
    }
    None
}

/// `rangemap field=x <name>=<range>...`: argument names outside the catalog
/// are user-defined range outputs.
pub(super) fn rangemap(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let args = p.parse_args_list().unwrap_or_default();
    let known = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.args.clone())
        .unwrap_or_default();
    for (name, value) in args.iter() {
        if !known.contains(name) {
            node.input.push(name);
        } else if name == "field" {
            for v in value.values() {
                node.input.push(v.clone());
            }
        }
        for v in value.values() {
            node.push_content(v.clone());
        }
    }
    node
}

/// `anomalies [args] [by <fields>]`.
pub(super) fn anomalies(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let args = p.parse_args_list();
    if p.eat_reserved(Reserved::By) {
        p.parse_fields_list();
    }
    if let Some(args) = &args {
        if let Some(field) = args.one("field") {
            node.input.push(field);
        }
    }
    if let Some(spec) = p.catalog.get(cmd.name) {
        node.output.extend_from(spec.created_fields.list().iter().cloned());
    }
    if let Some(args) = args {
        check_args(p, cmd, &args);
    }
    node
}

/// `head [args] [<expression>] [args]`.
pub(super) fn head(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_boundary() {
            break;
        }
        if let Some(expr) = p.parse_expression() {
            node.push_content(expr.text);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `findtypes [args] [<mode>...]`: positional modes come from the catalog.
pub(super) fn findtypes(p: &mut Parser, cmd: &Cmd) -> Node {
    let node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    let modes = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.modes.clone())
        .unwrap_or_default();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(mode) = p.parse_field_name() {
                if !modes.contains(&mode) {
                    cmd.report(
                        p,
                        format!(
                            "Unexpected argument '{mode}' in {}, expected {:?}",
                            cmd.name,
                            modes.iter().collect::<Vec<_>>()
                        ),
                        &mode,
                    );
                }
                continue;
            }
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `makemv [args] <field> [args]` and friends: a single field plus options.
pub(super) fn single_field_with_args(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field);
                continue;
            }
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}
