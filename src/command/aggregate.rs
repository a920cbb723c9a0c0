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

//! The statistics family: aggregation terms, grouping clauses, charting.

use crate::lex::{Punct, Reserved, Token};
use crate::parse::{
    Parser,
    node::{ArgMap, FieldsEffect, Node},
};

use super::{Cmd, by_and_fields_or_args, check_args, eat_count};

/// `stats [args] <agg_terms> [by <fields>]`: replaces the field universe
/// with the group-by columns plus the aggregates.  A duplicate output column
/// is an error.
pub(super) fn stats(p: &mut Parser, cmd: &Cmd) -> Node {
    let args = p.parse_args_list();
    let mut node = Node::command(FieldsEffect::Replace);
    let agg = p.parse_agg_terms_list();
    let mut by = Vec::new();
    if p.eat_reserved(Reserved::By) {
        by = p.parse_fields_list().unwrap_or_default();
    }

    for field in &by {
        node.input.push(field.clone());
        node.output.push(field.clone());
    }
    if let Some(agg) = agg {
        node.input.extend_from(agg.inputs);
        for field in agg.outputs {
            if node.output.contains(&field) {
                cmd.report(
                    p,
                    format!("Duplicate field '{field}' in stats"),
                    &field,
                );
            } else {
                node.output.push(field);
            }
        }
    }
    if let Some(args) = args {
        check_args(p, cmd, &args);
    }
    node
}

/// `eventstats [args] <agg_terms> [args] [by <fields>] [args]`: like stats
/// but extends instead of replacing.
pub(super) fn eventstats(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.eat_reserved(Reserved::By) {
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
            }
            continue;
        }
        if let Some(agg) = p.parse_agg_terms_list() {
            node.input.extend_from(agg.inputs);
            node.output.extend_from(agg.outputs);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `streamstats [args] <agg_terms> [args] [by <fields>] [args]`.  Argument
/// values may be parenthesized expressions quoted as `"(" expr ")"`.
pub(super) fn streamstats(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Extend);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = streamstats_args(p) {
            args.merge(more);
            continue;
        }
        if p.eat_reserved(Reserved::By) {
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
            }
            continue;
        }
        if let Some(agg) = p.parse_agg_terms_list() {
            node.input.extend_from(agg.inputs);
            node.output.extend_from(agg.outputs);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `args_term | name = "(" expr ")"`, comma- or space-separated.
fn streamstats_args(p: &mut Parser) -> Option<ArgMap> {
    let mut args = ArgMap::new();
    loop {
        let quoted_expr = matches!(p.peek(), Some(Token::Name(_)))
            && matches!(p.peek_at(1), Some(Token::Punct(Punct::Eq)))
            && matches!(p.peek_at(2), Some(Token::Punct(Punct::QlParen)));
        if quoted_expr {
            let name = p.bump().unwrap().token.value_text().to_ascii_lowercase();
            p.bump(); // `=`
            p.bump(); // `"("`
            let Some(expr) = p.parse_expression() else { break };
            if !p.eat_punct(Punct::QrParen) {
                break;
            }
            args.insert(name, format!("\"(\"{}\")\"", expr.text));
        } else if let Some(more) = p.parse_args_term() {
            args.merge(more);
        } else {
            break;
        }
        p.eat_punct(Punct::Comma);
    }
    (!args.is_empty()).then_some(args)
}

/// `mstats [args] <agg_terms> [args] [where <filters>] [by <fields>]`:
/// generates from metric stores.
pub(super) fn mstats(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Generate);
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if matches!(p.peek(), Some(Token::Command(name)) if name == "where") {
            p.bump();
            let filters = p.parse_filters();
            node.input.extend_from(filters.input.iter());
            node.content.extend(filters.content);
            continue;
        }
        if p.eat_reserved(Reserved::By) || p.eat_reserved(Reserved::GroupBy) {
            if let Some(fields) = p.parse_fields_list() {
                node.input.extend_from(fields);
            }
            continue;
        }
        if let Some(agg) = p.parse_agg_terms_list() {
            node.input.extend_from(agg.inputs);
            node.output.extend_from(agg.outputs);
            node.content.extend(agg.content);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `geostats [args] <agg_terms> [by <field>] [args]`: replaces with the
/// geographic bin column plus the aggregates.
pub(super) fn geostats(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    if let Some(spec) = p.catalog.get(cmd.name) {
        if let Some(bin) = spec.created_fields.one() {
            node.output.push(bin.to_string());
        }
    }
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.eat_reserved(Reserved::By) {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field);
            }
            continue;
        }
        if let Some(agg) = p.parse_agg_terms_list() {
            node.input.extend_from(agg.inputs);
            node.output.extend_from(agg.outputs);
            node.content.extend(agg.content);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `chart [args] <agg_or_eval> [over <field>] [by <field> [<field>]]
/// [where ...] [args]`: the first by-field becomes an output column.
pub(super) fn chart(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    let mut args = ArgMap::new();

    if let Some(more) = p.parse_args_list() {
        args.merge(more);
    }
    if let Some(agg) = p.parse_agg_or_eval_list() {
        node.input.extend_from(agg.inputs);
        node.output.extend_from(agg.outputs);
        node.content.extend(agg.content);
    }

    // The second half: over/by clauses plus optional where-clauses.
    let mut clause_fields = Vec::new();
    let mut has_by = false;
    if p.eat_reserved(Reserved::Over) {
        if let Some(field) = p.parse_field_name() {
            clause_fields.push(field);
        }
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
        }
    }
    if p.eat_reserved(Reserved::By) {
        has_by = true;
        for _ in 0..2 {
            if !p.at_field_name() {
                break;
            }
            if let Some(field) = p.parse_field_name() {
                clause_fields.push(field);
            }
            if let Some(more) = p.parse_args_list() {
                args.merge(more);
            }
        }
        if let Some(fields) = chart_where_clause(p) {
            clause_fields.extend(fields);
        }
    }
    if let Some(more) = p.parse_args_list() {
        args.merge(more);
    }

    node.input.extend_from(clause_fields.iter().cloned());
    if has_by {
        node.output.extend_from(clause_fields);
    }
    check_args(p, cmd, &args);
    node
}

/// `agg_term (in|notin) (top|bottom) N` or `agg_term <op> N`: the where
/// clause of charting commands.  Returns the fields the clause reads.
pub(super) fn chart_where_clause(p: &mut Parser) -> Option<Vec<String>> {
    let mark = p.mark();
    if !matches!(p.peek(), Some(Token::Name(_))) {
        return None;
    }
    let Some(agg) = p.parse_agg_terms_list() else {
        p.reset(mark);
        return None;
    };

    let in_or_notin = p.check_reserved(Reserved::In) || p.check_reserved(Reserved::NotIn);
    let top_or_bottom = matches!(p.peek_at(1), Some(Token::Command(name)) if name == "top")
        || matches!(p.peek_at(1), Some(Token::Reserved(Reserved::Bottom)));
    if in_or_notin && top_or_bottom {
        p.bump();
        p.bump();
        if matches!(p.peek(), Some(Token::Number(_))) {
            p.bump();
            return Some(agg.inputs);
        }
        p.reset(mark);
        return None;
    }
    if p.peek().is_some_and(Token::is_comp_op)
        && matches!(p.peek_at(1), Some(Token::Number(_) | Token::Float(_)))
    {
        p.bump();
        p.bump();
        return Some(agg.inputs);
    }
    p.reset(mark);
    None
}

/// `timechart [args] <agg_or_eval> [by <field>] [where ...] [args]`:
/// `_time` always leads the outputs.
pub(super) fn timechart(p: &mut Parser, cmd: &Cmd) -> Node {
    let mut node = Node::command(FieldsEffect::Replace);
    node.output.push("_time");
    let mut args = ArgMap::new();
    loop {
        if let Some(more) = p.parse_args_list() {
            args.merge(more);
            continue;
        }
        if p.eat_reserved(Reserved::By) {
            if let Some(field) = p.parse_field_name() {
                node.input.push(field.clone());
                node.output.push(field);
            }
            continue;
        }
        if matches!(p.peek(), Some(Token::Command(name)) if name == "where") {
            p.bump();
            chart_where_clause(p);
            continue;
        }
        if let Some(agg) = p.parse_agg_or_eval_list() {
            node.input.extend_from(agg.inputs);
            node.output.extend_from(agg.outputs);
            node.content.extend(agg.content);
            continue;
        }
        break;
    }
    check_args(p, cmd, &args);
    node
}

/// `top [N] <fields> [by <fields>] [args]` / `rare ...`: reads fields,
/// changes nothing downstream.
pub(super) fn top(p: &mut Parser, cmd: &Cmd) -> Node {
    eat_count(p);
    let (args, fields, by) = by_and_fields_or_args(p);
    let mut node = Node::command(FieldsEffect::None);
    node.input.extend_from(fields);
    node.input.extend_from(by);
    check_args(p, cmd, &args);
    node
}
