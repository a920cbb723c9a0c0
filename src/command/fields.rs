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

//! Commands that select, reorder, rename or derive columns.

use crate::lex::{Punct, Reserved, Token};
use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};

use super::{Cmd, check_args, eat_count};

/// `fields [+] <list>` keeps (replace); `fields - <list>` removes.
pub(super) fn fields(p: &mut Parser, _cmd: &Cmd) -> Node {
    let effect = if p.eat_punct(Punct::Minus) {
        FieldsEffect::Remove
    } else {
        p.eat_punct(Punct::Plus);
        FieldsEffect::Replace
    };
    let mut node = Node::command(effect);
    if let Some(list) = p.parse_fields_list() {
        node.input.extend_from(list.iter().cloned());
        node.output.extend_from(list);
    }
    node
}

/// `table <list>`: the listed fields become the whole universe.
pub(super) fn table(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    if let Some(list) = p.parse_fields_list() {
        node.input.extend_from(list.iter().cloned());
        node.output.extend_from(list);
    }
    node
}

/// `highlight <list>`: the fields are display terms, not reads.
pub(super) fn highlight(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    for field in p.parse_fields_list().unwrap_or_default() {
        node.push_content(field);
    }
    node
}

/// `iconify <list>`.
pub(super) fn iconify(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    if let Some(list) = p.parse_fields_list() {
        node.input.extend_from(list);
    }
    node
}

/// `rename a as b, ...`.
pub(super) fn rename(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Rename);
    if let Some((from, to)) = p.parse_rfields_list() {
        node.input.extend_from(from);
        node.output.extend_from(to);
    }
    node
}

/// `sort [N] [+|-]<field>, ... [desc]`.
pub(super) fn sort(p: &mut Parser, _cmd: &Cmd) -> Node {
    eat_count(p);
    let mut node = Node::command(FieldsEffect::None);
    if let Some(fields) = p.parse_sort_clause() {
        node.input.extend_from(fields);
    }
    // Trailing order word (`desc`).
    if matches!(p.peek(), Some(Token::Name(_))) {
        p.bump();
    }
    node
}

/// `dedup [N] <fields> [args] [sortby <sort_clause>]`.
pub(super) fn dedup(p: &mut Parser, cmd: &Cmd) -> Node {
    eat_count(p);
    let mut node = Node::command(FieldsEffect::None);
    if let Some(fields) = p.parse_fields_list() {
        node.input.extend_from(fields);
    }
    if let Some(args) = p.parse_args_list() {
        check_args(p, cmd, &args);
    }
    if p.eat_reserved(Reserved::SortBy) {
        if let Some(fields) = p.parse_sort_clause() {
            node.input.extend_from(fields);
        }
    }
    node
}

/// `accum <field> [as <field>]`.
pub(super) fn accum(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let Some(field) = p.parse_field_name() else {
        return node;
    };
    node.input.push(field);
    if p.eat_reserved(Reserved::As) {
        if let Some(alias) = p.parse_field_name() {
            node.output.push(alias);
            node.fields_effect = FieldsEffect::Extend;
        }
    }
    node
}

/// `autoregress <field>[ as <field>] [p=N]`.
pub(super) fn autoregress(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    if let Some((from, to)) = p.parse_rfield_term() {
        node.input.push(from);
        node.output.push(to);
        node.fields_effect = FieldsEffect::Extend;
    } else if let Some(field) = p.parse_field_name() {
        node.input.push(field);
    }
    if let Some(args) = p.parse_args_list() {
        check_args(p, cmd, &args);
    }
    node
}

/// `bin [args] <field> [args] [as <field>] [args]`: the alias, when given,
/// is the new column.
pub(super) fn bin(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    if let Some(more) = p.parse_args_list() {
        args.merge(more);
    }
    if let Some((from, to)) = p.parse_rfield_term() {
        node.input.push(from);
        node.output.push(to);
    } else if let Some(field) = p.parse_field_name() {
        node.input.push(field);
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
        }
        if p.eat_reserved(Reserved::As) {
            if let Some(alias) = p.parse_field_name() {
                node.output.push(alias);
            }
        }
    }
    if let Some(more) = p.parse_args_list() {
        args.merge(more);
    }
    check_args(p, cmd, &args);
    node
}

/// `convert [timeformat=...] <fun>(<field>|*)[ as <field>], ...`.
pub(super) fn convert(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let mut args = ArgMap::new();
    if let Some(more) = p.parse_args_term() {
        args.merge(more);
    }
    loop {
        let convertible = matches!(p.peek(), Some(Token::Name(_)))
            && matches!(p.peek_at(1), Some(Token::Punct(Punct::LParen)));
        if !convertible {
            break;
        }
        p.bump(); // function name
        p.bump(); // `(`
        let field = if p.eat_punct(Punct::Times) {
            Some(String::from("*"))
        } else {
            p.parse_field_name()
        };
        let Some(field) = field else { break };
        if !p.eat_punct(Punct::RParen) {
            break;
        }
        node.input.push(field);
        if p.eat_reserved(Reserved::As) {
            if let Some(alias) = p.parse_field_name() {
                node.output.push(alias);
            }
        }
        p.eat_punct(Punct::Comma);
    }
    check_args(p, cmd, &args);
    node
}

/// `delta [args] <field> [as <field>] [args]`: without an alias the new
/// column is `delta(field)`.
pub(super) fn delta(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_term() {
            args.merge(more);
            continue;
        }
        if p.eat_reserved(Reserved::As) {
            if let Some(alias) = p.parse_field_name() {
                node.output.push(alias);
            }
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                if node.input.is_empty() {
                    node.input.push(field);
                } else {
                    node.output.push(field);
                }
                continue;
            }
        }
        break;
    }
    if node.output.is_empty() {
        if let Some(first) = node.input.iter().next() {
            let derived = format!("{}({first})", cmd.name);
            node.output.push(derived);
        }
    }
    check_args(p, cmd, &args);
    node
}

/// `gauge <field_or_num>...`: emits `x` plus one `y` column per range
/// boundary beyond the first (default range contributes two).
pub(super) fn gauge(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    node.output.push("x");
    let mut values = 0usize;
    loop {
        if matches!(p.peek(), Some(Token::Number(_))) {
            p.bump();
            values += 1;
            continue;
        }
        if matches!(p.peek(), Some(Token::Punct(Punct::Minus)))
            && matches!(p.peek_at(1), Some(Token::Number(_)))
        {
            p.bump();
            p.bump();
            values += 1;
            continue;
        }
        if p.at_field_name() {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field);
                values += 1;
                continue;
            }
        }
        break;
    }
    if values > 1 {
        for i in 1..values {
            node.output.push(format!("y{i}"));
        }
    } else {
        // Default range is 0 to 100.
        node.output.push("y1");
        node.output.push("y2");
    }
    node
}

/// `cofilter <field> <field>`.
pub(super) fn cofilter(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    for _ in 0..2 {
        if let Some(field) = p.parse_field_name() {
            node.input.push(field);
        }
    }
    node
}

/// `contingency [args] <field> <field>... [args]`: the first field appears
/// in the result alongside the second field's values.
pub(super) fn contingency(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
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
    if let Some(first) = node.input.iter().next() {
        let first = first.to_string();
        node.output.push(first);
    }
    check_args(p, cmd, &args);
    node
}

/// `fieldformat <field> = <expression>`.
pub(super) fn fieldformat(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    let Some(field) = p.parse_field_name() else {
        return node;
    };
    node.input.push(field);
    if p.eat_punct(Punct::Eq) {
        if let Some(expr) = p.parse_expression() {
            node.input.extend_from(expr.inputs);
            node.push_content(expr.text);
        }
    }
    node
}

/// `replace <value> with <value>, ... [in <fields>]`.
pub(super) fn replace(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    loop {
        let Some(from) = p.parse_value() else { break };
        node.push_content(from);
        if !p.eat_reserved(Reserved::With) {
            break;
        }
        let Some(to) = p.parse_value() else { break };
        node.push_content(to);
        if !p.eat_punct(Punct::Comma) {
            break;
        }
    }
    if p.eat_reserved(Reserved::In) {
        if let Some(fields) = p.parse_fields_list() {
            node.input.extend_from(fields);
        }
    }
    node
}

/// `expand <field>` / `flatten <field>` / `nomv <field>`.
pub(super) fn single_field(p: &mut Parser, _cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::None);
    if let Some(field) = p.parse_field_name() {
        node.input.push(field);
    }
    node
}
