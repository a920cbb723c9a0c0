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

//! Commands that filter the stream or combine it with other searches.

use crate::lex::{Punct, Reserved, Token};
use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};

use super::{Cmd, check_args, enrich};

/// `search <filters>`: filter inputs become command inputs, filter values go
/// to content.
pub(super) fn search(p: &mut Parser, _cmd: &Cmd) -> Node {
    let filters = p.parse_filters();
    let mut node = Node::command(FieldsEffect::None);
    node.input = filters.input;
    node.content = filters.content;
    node.op = filters.op;
    node
}

/// `metasearch [<filters>]`: generates the metadata columns.
pub(super) fn metasearch(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    if let Some(spec) = p.catalog.get(cmd.name) {
        node.output.extend_from(spec.created_fields.list().iter().cloned());
    }
    if !p.at_boundary() {
        let filters = p.parse_filters();
        node.input = filters.input;
        node.content = filters.content;
    }
    node
}

/// `append [args] <subsearch>` / `appendcols ...`: the subsearch's fields
/// extend the stream.
pub(super) fn append(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    if let Some(args) = p.parse_args_list() {
        check_args(p, cmd, &args);
    }
    if let Some(sub) = p.parse_subsearch() {
        node.input = sub.input;
        node.output = sub.output;
    }
    node
}

/// `appendpipe [args] <subpipeline>`.
pub(super) fn appendpipe(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    if let Some(args) = p.parse_args_term() {
        check_args(p, cmd, &args);
    }
    if let Some(sub) = p.parse_subpipeline() {
        node.input = sub.input;
        node.output = sub.output;
    }
    node
}

/// `join [args] [<fields>] <subsearch> [args]`: the joined search's outputs
/// merge into the visible fields.
pub(super) fn join(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.check_punct(Punct::LBrack) {
            if let Some(sub) = p.parse_subsearch() {
                node.input.extend_from(sub.input.iter());
                node.output.extend_from(sub.output.iter());
                node.content.extend(sub.content);
            }
            continue;
        }
        if p.at_field_name() {
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
                continue;
            }
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `multisearch <subsearch>+`: generates the union of its subsearches.
pub(super) fn multisearch(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    while p.check_punct(Punct::LBrack) {
        let Some(sub) = p.parse_subsearch() else { break };
        node.input.extend_from(sub.input.iter());
        node.output.extend_from(sub.output.iter());
        node.content.extend(sub.content);
    }
    node
}

/// `foreach [args] <fields|*> [args] [ eval ... ]`.
pub(super) fn foreach(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.eat_punct(Punct::Times) {
            node.input.push("*");
            continue;
        }
        if p.check_punct(Punct::LBrack) {
            // The template subsearch holds a single eval assignment.
            let mark = p.mark();
            p.bump();
            if matches!(p.peek(), Some(Token::Command(name)) if name == "eval") {
                p.bump();
                if let Some(assign) = enrich::parse_eval_assign(p) {
                    node.input.extend_from(assign.inputs);
                    node.content.extend(assign.content);
                }
                p.eat_punct(Punct::RBrack);
                continue;
            }
            p.reset(mark);
            break;
        }
        if p.at_field_name() {
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
                continue;
            }
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `map [args] <query> [args]`.
pub(super) fn map(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if let Some(value) = p.parse_value() {
            node.push_content(value);
            continue;
        }
        break;
    }
    if let Some(search) = args.one("search") {
        node.push_content(search);
    }
    check_args(p, cmd, &args);
    node
}

/// `multikv [args] [fields <list>] [filter <values>] [args]`; bare selector
/// names are validated against the catalog.
pub(super) fn multikv(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    let selectors = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.selectors.clone())
        .unwrap_or_default();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if matches!(p.peek(), Some(Token::Command(name)) if name == "fields") {
            p.bump();
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
            }
            continue;
        }
        if p.eat_reserved(Reserved::Filter) {
            node.content.extend(p.parse_values_list());
            continue;
        }
        if let Some(Token::Name(selector)) = p.peek() {
            let selector = selector.clone();
            p.bump();
            if !selectors.contains(&selector) {
                cmd.report(
                    p,
                    format!(
                        "Unexpected selector {selector} in {}, expected {:?}",
                        cmd.name,
                        selectors.iter().collect::<Vec<_>>()
                    ),
                    &selector,
                );
            }
            node.content.extend(p.parse_values_list());
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}
