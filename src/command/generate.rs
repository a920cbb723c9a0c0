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

//! Commands that produce events from something other than the incoming
//! stream: lookups, saved searches, datasets, REST endpoints.

use crate::lex::{Punct, Reserved, Token};
use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};

use super::{Cmd, check_args, eat_count};

/// `inputlookup [args] <name> [where <expression>]` / `inputcsv ...`.
pub(super) fn inputlookup(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let args = p.parse_args_list();
    if let Some(name) = p.parse_field_name() {
        node.push_content(name);
    }
    if matches!(p.peek(), Some(Token::Command(name)) if name == "where") {
        p.bump();
        if let Some(expr) = p.parse_expression() {
            node.push_content(expr.text);
        }
    }
    if let Some(args) = args {
        check_args(p, cmd, &args);
    }
    node
}

/// `outputlookup [args] <name> [args]` / `outputcsv ...`.
pub(super) fn outputlookup(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(name) = p.parse_field_name() {
                node.push_content(name);
                continue;
            }
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `loadjob <sid> [args]`.
pub(super) fn loadjob(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
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
    if let Some(saved) = args.one("savedsearch") {
        node.push_content(saved);
    }
    check_args(p, cmd, &args);
    node
}

/// `savedsearch [args] <name> [args]`: unknown arguments are macro-style
/// substitutions, captured rather than rejected.
pub(super) fn savedsearch(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(name) = p.parse_field_name() {
                node.push_content(name);
                continue;
            }
        }
        break;
    }
    let known = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.args.clone())
        .unwrap_or_default();
    for (name, value) in args.iter() {
        if !known.contains(name) {
            for v in value.values() {
                node.push_content(v.clone());
            }
        }
    }
    node
}

/// `from <type>:<name>` or `from <type> <name>`: a single positional must
/// contain the `:` separator.
pub(super) fn from(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let Some(first) = p.parse_field_name() else {
        return node;
    };
    if p.eat_punct(Punct::Colon) {
        if let Some(second) = p.parse_field_name() {
            node.input.push(format!("{first}:{second}"));
        }
        return node;
    }
    if p.at_field_name() {
        if let Some(second) = p.parse_field_name() {
            node.input.push(format!("{first}:{second}"));
        }
        return node;
    }
    if first.contains(':') {
        node.input.push(first);
    } else {
        cmd.report(
            p,
            format!(
                "Malformated dataset information '{first}' in {}, expected <dataset_type>:<dataset_name>",
                cmd.name
            ),
            &first,
        );
    }
    node
}

/// `datamodel [<model> [<object> [<mode>]]] [args]`: a third positional is
/// a search mode and must come from the catalog.
pub(super) fn datamodel(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let mut args = ArgMap::new();
    let mut positionals = Vec::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                positionals.push(field);
                continue;
            }
        }
        break;
    }
    if positionals.len() == 3 {
        let mode = positionals[2].clone();
        let modes = p
            .catalog
            .get(cmd.name)
            .map(|spec| spec.search_modes.clone())
            .unwrap_or_default();
        if !modes.contains(&mode) {
            cmd.report(
                p,
                format!(
                    "Unexpected datamode search mode '{mode}', expected {:?}",
                    modes.iter().collect::<Vec<_>>()
                ),
                &mode,
            );
        }
    }
    node.output.extend_from(positionals);
    check_args(p, cmd, &args);
    node
}

/// `rest [args] <endpoint> [args]`: non-catalog arguments are field
/// filters, their values are reads.
pub(super) fn rest(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.at_field_name() {
            if let Some(endpoint) = p.parse_field_name() {
                node.push_content(endpoint);
                continue;
            }
        }
        break;
    }
    let known = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.args.clone())
        .unwrap_or_default();
    for (name, value) in args.iter() {
        if !known.contains(name) {
            for v in value.values() {
                node.input.push(v.clone());
            }
        }
    }
    node
}

/// `return [N] [<args>|<fields>]`: emits a `search` field; `$field` strips
/// its sigil.
pub(super) fn return_(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    node.output.push("search");
    eat_count(p);
    loop {
        if let Some(args) = p.parse_args_list() {
            for (name, _) in args.iter() {
                node.input.push(name);
            }
            continue;
        }
        if p.at_field_name() {
            if let Some(fields) = p.parse_fields_list() {
                for field in fields {
                    node.input.push(field.strip_prefix('$').unwrap_or(field.as_str()));
                }
                continue;
            }
        }
        break;
    }
    node
}

/// `searchtxn <name> <filters>`: filter fields that are not transaction
/// options are reads.
pub(super) fn searchtxn(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    if let Some(name) = p.parse_field_name() {
        node.push_content(name);
    }
    let filters = p.parse_filters();
    let known = p
        .catalog
        .get(cmd.name)
        .map(|spec| spec.args.clone())
        .unwrap_or_default();
    for field in filters.input.iter() {
        if !known.contains(field) {
            node.input.push(field);
        }
    }
    node
}

/// `pivot <model> <object> <element>`.
pub(super) fn pivot(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let mut args = ArgMap::new();
    for _ in 0..2 {
        if let Some(name) = p.parse_field_name() {
            node.push_content(name);
        }
    }

    // Cell value: `fun(field) [as alias]`.
    if matches!(p.peek(), Some(Token::Name(_)))
        && matches!(p.peek_at(1), Some(Token::Punct(Punct::LParen)))
    {
        p.bump();
        p.bump();
        if let Some(field) = p.parse_field_name() {
            node.input.push(field);
        }
        p.eat_punct(Punct::RParen);
        if p.eat_reserved(Reserved::As) {
            if let Some(alias) = p.parse_field_name() {
                node.output.push(alias);
            }
        }
    }

    // Splits and element terms, loosely comma-separated.
    loop {
        p.eat_punct(Punct::Comma);
        match p.peek() {
            Some(Token::Reserved(Reserved::SplitRow | Reserved::SplitCol)) => {
                p.bump();
                pivot_split(p, &mut node, &mut args);
            }
            Some(Token::Reserved(Reserved::Filter)) => {
                p.bump();
                if let Some(field) = p.parse_field_name() {
                    node.input.push(field);
                }
                // The comparator may be an operator token or a word.
                if !(p.eat_punct(Punct::Lt)
                    || p.eat_punct(Punct::Le)
                    || p.eat_punct(Punct::Gt)
                    || p.eat_punct(Punct::Ge)
                    || p.eat_reserved(Reserved::In)
                    || matches!(p.bump().map(|lex| lex.token), Some(Token::Name(_))))
                {
                    break;
                }
                p.parse_value();
            }
            Some(Token::Reserved(Reserved::Limit)) => {
                p.bump();
                if let Some(field) = p.parse_field_name() {
                    node.input.push(field);
                }
                if p.eat_reserved(Reserved::By) {
                    let top = matches!(p.peek(), Some(Token::Command(name)) if name == "top");
                    if top || p.check_reserved(Reserved::Bottom) {
                        p.bump();
                    }
                    eat_count(p);
                    if matches!(p.peek(), Some(Token::Name(_)))
                        && matches!(p.peek_at(1), Some(Token::Punct(Punct::LParen)))
                    {
                        p.bump();
                        p.bump();
                        if let Some(field) = p.parse_field_name() {
                            node.input.push(field);
                        }
                        p.eat_punct(Punct::RParen);
                    }
                }
            }
            Some(Token::Reserved(
                Reserved::RowSummary | Reserved::ColSummary | Reserved::ShowOther,
            )) => {
                p.bump();
                p.bump();
            }
            Some(Token::Command(name)) if name == "sort" => {
                p.bump();
                eat_count(p);
                if let Some(fields) = p.parse_sort_clause() {
                    node.input.extend_from(fields);
                }
                if matches!(p.peek(), Some(Token::Name(_))) {
                    p.bump();
                }
            }
            _ => break,
        }
    }
    check_args(p, cmd, &args);
    node
}

/// One `splitrow`/`splitcol` clause.
fn pivot_split(p: &mut Parser, node: &mut Node, args: &mut ArgMap) {
    let Some(field) = p.parse_field_name() else {
        return;
    };
    node.input.push(field.clone());
    let mut output = field;
    if p.eat_reserved(Reserved::As) {
        if let Some(alias) = p.parse_field_name() {
            output = alias;
        }
    }
    node.output.push(output);
    match p.peek() {
        Some(Token::Reserved(Reserved::Range)) => {
            p.bump();
            if let Some(more) = p.parse_args_list() {
                args.merge(more);
            }
        }
        Some(Token::Reserved(Reserved::Period)) => {
            p.bump();
            if let Some(Token::Name(period)) = p.peek() {
                let period = period.clone();
                p.bump();
                node.push_content(period);
            }
        }
        Some(Token::Reserved(Reserved::TrueLabel)) => {
            p.bump();
            if let Some(label) = p.parse_field_name() {
                node.push_content(label);
            }
            if p.eat_reserved(Reserved::FalseLabel) {
                if let Some(label) = p.parse_field_name() {
                    node.push_content(label);
                }
            }
        }
        Some(Token::Reserved(Reserved::FalseLabel)) => {
            p.bump();
            if let Some(label) = p.parse_field_name() {
                node.push_content(label);
            }
        }
        _ => (),
    }
}

/// `format [args] ["<row prefix>" ... six template strings] [args]`.
pub(super) fn format(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if let Some(Token::Str(template)) = p.peek() {
            let template = template.clone();
            p.bump();
            node.push_content(template);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}
