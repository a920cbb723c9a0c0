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

//! The SPL parser.
//!
//! A query is a pipeline: an optional filter clause, then pipe-separated
//! commands.  The top structure and the filter/expression sublanguages are
//! parsed by recursive descent over the scanner's token stream; each command
//! body is handed to its per-command parser ([crate::command]), which
//! produces a [Node] with the command's field effect.  Commands compose left
//! to right with [apply_effect].
//!
//! Error recovery is boundary-based: a malformed command body or an unknown
//! command name reports one diagnostic and skips to the next `|` or `]` at
//! the current bracket depth, so the rest of the pipeline still parses.

pub mod node;

use crate::{
    catalog::Catalog,
    command,
    lex::{LexToken, Punct, Reserved, Scanner, Token},
    message::{Diagnostic, DiagnosticToken, Diagnostics},
};

use node::{FieldSet, FieldsEffect, Node, SearchNode, Subsearch, apply_effect};

/// Everything one parse produced.
#[derive(Debug)]
pub struct ParseOutcome {
    pub main: SearchNode,
    pub subsearches: Vec<Subsearch>,
    pub diagnostics: Diagnostics,
}

/// Parses `text` against `catalog`.
pub fn parse(text: &str, catalog: &Catalog) -> ParseOutcome {
    let mut diagnostics = Diagnostics::new();
    let tokens = Scanner::tokenize(text, catalog, |pos, ch| {
        diagnostics.report(
            Diagnostic {
                start_pos: pos as i64,
                end_pos: (pos + ch.len_utf8()) as i64,
                message: format!("Illegal character {ch}"),
                token: None,
            },
            Some(&ch.to_string()),
        );
    });

    let mut parser = Parser {
        tokens,
        pos: 0,
        catalog,
        diagnostics,
        subsearches: Vec::new(),
        scope_level: 0,
    };
    let main = parser.parse_main();
    ParseOutcome {
        main,
        subsearches: parser.subsearches,
        diagnostics: parser.diagnostics,
    }
}

/// A parsed expression: its reconstructed text plus the bare identifiers it
/// references (which feed a command's input set).
#[derive(Debug, Default, Clone)]
pub struct Expr {
    pub text: String,
    pub inputs: Vec<String>,
}

/// Aggregation terms (`count`, `dc(host) as eid`, ...): the fields they read
/// and the columns they produce.
#[derive(Debug, Default)]
pub struct AggTerms {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub content: Vec<String>,
}

pub struct Parser<'a> {
    tokens: Vec<LexToken>,
    pos: usize,
    pub(crate) catalog: &'a Catalog,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) subsearches: Vec<Subsearch>,
    scope_level: u32,
}

// Cursor primitives.
impl Parser<'_> {
    pub(crate) fn peek_lex(&self) -> Option<&LexToken> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.peek_lex().map(|lex| &lex.token)
    }

    pub(crate) fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|lex| &lex.token)
    }

    pub(crate) fn bump(&mut self) -> Option<LexToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn mark(&self) -> usize {
        self.pos
    }

    pub(crate) fn reset(&mut self, mark: usize) {
        self.pos = mark;
    }

    pub(crate) fn check_punct(&self, punct: Punct) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    pub(crate) fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn check_reserved(&self, reserved: Reserved) -> bool {
        matches!(self.peek(), Some(Token::Reserved(r)) if *r == reserved)
    }

    pub(crate) fn eat_reserved(&mut self, reserved: Reserved) -> bool {
        if self.check_reserved(reserved) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// True at a pipe, a closing bracket, or the end of input: the places a
    /// command body ends.
    pub(crate) fn at_boundary(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Punct(Punct::Pipe | Punct::RBrack))
        )
    }

    /// Byte position of the last consumed token.
    pub(crate) fn last_pos(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|lex| lex.pos)
            .unwrap_or(0)
    }

    /// Skips to the next command boundary, balancing brackets on the way.
    pub(crate) fn skip_to_boundary(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Punct(Punct::Pipe) if depth == 0 => return,
                Token::Punct(Punct::RBrack) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.pos += 1;
                }
                Token::Punct(Punct::LBrack) => {
                    depth += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }
}

// Diagnostics.
impl Parser<'_> {
    pub(crate) fn report(&mut self, start: i64, end: i64, message: String, value: Option<&str>) {
        self.diagnostics.report(
            Diagnostic {
                start_pos: start,
                end_pos: end,
                message,
                token: None,
            },
            value,
        );
    }

    pub(crate) fn report_token(&mut self, start: i64, message: String, lex: &LexToken) {
        let token = DiagnosticToken {
            lexpos: lex.pos,
            value: lex.token.value_text(),
            kind: lex.token.type_name(self.catalog),
        };
        self.diagnostics.report(
            Diagnostic {
                start_pos: start,
                end_pos: lex.pos as i64,
                message,
                token: Some(token),
            },
            None,
        );
    }
}

// Top structure.
impl Parser<'_> {
    fn parse_main(&mut self) -> SearchNode {
        if self.tokens.is_empty() {
            self.report(-20, -1, String::from("Unexpected end of query"), None);
            return SearchNode {
                kind: "mainsearch",
                ..SearchNode::default()
            };
        }
        let mut main = self.parse_search_exp(false);
        main.kind = "mainsearch";

        // Anything left over did not belong to any production.
        if let Some(stray) = self.peek_lex().cloned() {
            let start = (stray.pos as i64 - 10).max(0);
            self.report_token(start, String::from("Unexpected symbol"), &stray);
            self.pos = self.tokens.len();
        }
        main
    }

    /// `search_exp := filters | filters '|' commands | '|' commands`.
    ///
    /// Inside brackets (`bare_commands`) the body may also start directly
    /// with a command, as in `[search x | stats count]`.
    ///
    /// When this completes inside brackets (scope level > 0) the expression
    /// is recorded as a subsearch, inside-out.
    fn parse_search_exp(&mut self, bare_commands: bool) -> SearchNode {
        let mut result = SearchNode {
            kind: "search_exp",
            ..SearchNode::default()
        };

        let starts_with_command = bare_commands
            && matches!(self.peek(), Some(Token::Command(_)))
            && !self.at_filter_start();
        let filters = if self.check_punct(Punct::Pipe) || starts_with_command {
            None
        } else {
            Some(self.parse_filters())
        };
        let commands = if starts_with_command || self.eat_punct(Punct::Pipe) {
            Some(self.parse_commands())
        } else {
            None
        };

        if let Some(filters) = &filters {
            result.input.extend_from(filters.input.iter());
            result.content.extend(filters.content.iter().cloned());
        }
        if let Some(commands) = &commands {
            result.input.extend_from(commands.input.iter());
            result.output.extend_from(commands.output.iter());
            result.fields_effect = commands.effects.clone();
            result.content.extend(commands.node_content.iter().cloned());
        }

        if self.scope_level > 0 {
            self.subsearches.push(Subsearch {
                level: self.scope_level,
                data: result.clone(),
            });
        }
        result
    }

    /// `subsearch := '[' search_exp ']'`, bumping the scope level around the
    /// body.  Returns a node carrying the body's fields and content.
    pub(crate) fn parse_subsearch(&mut self) -> Option<Node> {
        if !self.eat_punct(Punct::LBrack) {
            return None;
        }
        self.scope_level += 1;
        let inner = self.parse_search_exp(true);
        self.scope_level -= 1;
        if !self.eat_punct(Punct::RBrack) {
            match self.peek_lex().cloned() {
                Some(stray) => {
                    let start = (stray.pos as i64 - 10).max(0);
                    self.report_token(start, String::from("Unexpected symbol"), &stray);
                    self.skip_to_boundary();
                    self.eat_punct(Punct::RBrack);
                }
                None => self.report(-20, -1, String::from("Unexpected end of query"), None),
            }
        }
        let mut node = Node::new("subsearch");
        node.input = inner.input;
        node.output = inner.output;
        node.content = inner.content;
        Some(node)
    }

    /// `subpipeline := '[' commands ']'`: like a subsearch but without scope
    /// bookkeeping (used by `appendpipe`).
    pub(crate) fn parse_subpipeline(&mut self) -> Option<Node> {
        if !self.eat_punct(Punct::LBrack) {
            return None;
        }
        self.eat_punct(Punct::Pipe);
        let commands = self.parse_commands();
        if !self.eat_punct(Punct::RBrack) {
            if let Some(stray) = self.peek_lex().cloned() {
                let start = (stray.pos as i64 - 10).max(0);
                self.report_token(start, String::from("Unexpected symbol"), &stray);
                self.skip_to_boundary();
                self.eat_punct(Punct::RBrack);
            }
        }
        let mut node = Node::new("subpipeline");
        node.input = commands.input;
        node.output = commands.output;
        Some(node)
    }
}

/// The folded state of a command pipeline.
pub(crate) struct PipelineNode {
    pub input: FieldSet,
    pub output: FieldSet,
    pub effects: Vec<FieldsEffect>,
    pub node_content: Vec<String>,
}

// Commands.
impl Parser<'_> {
    /// `commands := command ('|' command)*`, folding field sets with
    /// [apply_effect].
    fn parse_commands(&mut self) -> PipelineNode {
        let mut pipeline = PipelineNode {
            input: FieldSet::new(),
            output: FieldSet::new(),
            effects: Vec::new(),
            node_content: Vec::new(),
        };
        let mut pipe_pos = self.last_pos();
        loop {
            if let Some(node) = self.parse_command(pipe_pos) {
                pipeline.input.extend_from(node.input.iter());
                pipeline.output =
                    apply_effect(&pipeline.output, node.fields_effect, &node.input, &node.output);
                pipeline.effects.push(node.fields_effect);
                pipeline.node_content.extend(node.content.iter().cloned());
            }
            if self.check_punct(Punct::Pipe) {
                pipe_pos = self.peek_lex().map(|lex| lex.pos).unwrap_or(0);
                self.pos += 1;
            } else {
                break;
            }
        }
        pipeline
    }

    /// One command body.  `None` when the command could not be parsed at
    /// all; the pipeline then continues after the reported diagnostic.
    fn parse_command(&mut self, pipe_pos: usize) -> Option<Node> {
        let Some(lex) = self.peek_lex().cloned() else {
            // A trailing pipe with nothing after it.
            self.report(-20, -1, String::from("Unexpected end of query"), None);
            return None;
        };
        let name = match &lex.token {
            Token::Command(name) => name.clone(),
            _ => {
                self.report_token(pipe_pos as i64, String::from("Unknown command name"), &lex);
                self.skip_to_boundary();
                return None;
            }
        };
        self.bump();
        let node = command::parse_command_body(self, &name, lex.pos);

        if !self.at_boundary() {
            let stray = self.peek_lex().cloned();
            if let Some(stray) = stray {
                self.report_token(
                    pipe_pos as i64,
                    format!("Syntax error in command {name}"),
                    &stray,
                );
            }
            self.skip_to_boundary();
        }
        Some(node)
    }
}

// Filters.
impl Parser<'_> {
    /// Can the current token begin a filter?  Command tokens can, but only
    /// for the `field = value` shape (e.g. `eval=x` filters on a field that
    /// happens to be named like a command).
    fn at_filter_start(&self) -> bool {
        match self.peek() {
            Some(
                Token::Name(_)
                | Token::Pattern(_)
                | Token::Str(_)
                | Token::Number(_)
                | Token::Float(_)
                | Token::Date(_)
                | Token::TimeSpecifier(_),
            ) => true,
            Some(Token::Punct(Punct::LParen | Punct::LBrack | Punct::Times | Punct::Quote)) => true,
            Some(Token::Punct(Punct::Minus)) => matches!(
                self.peek_at(1),
                Some(Token::Number(_) | Token::Float(_) | Token::Name(_))
            ),
            Some(Token::Reserved(Reserved::Not | Reserved::Case | Reserved::Term)) => true,
            Some(Token::Reserved(r)) => r.is_op_name(),
            Some(Token::Command(_)) => matches!(
                self.peek_at(1),
                Some(Token::Punct(
                    Punct::Eq | Punct::Neq | Punct::Lt | Punct::Le | Punct::Gt | Punct::Ge
                )) | Some(Token::Reserved(Reserved::In))
            ),
            _ => false,
        }
    }

    /// The filter lattice: OR-chains of AND-chains, with parenthesization,
    /// NOT, and implicit AND on juxtaposition.
    pub(crate) fn parse_filters(&mut self) -> Node {
        let mut node = self.parse_filters_term();
        while self.eat_reserved(Reserved::Or) {
            let rhs = self.parse_filters_term();
            node.op.push(String::from("or"));
            merge_filter(&mut node, rhs);
        }
        node.kind = "filters";
        node
    }

    fn parse_filters_term(&mut self) -> Node {
        let mut node = self.parse_filters_factor();
        loop {
            let explicit =
                self.eat_reserved(Reserved::And) || self.eat_punct(Punct::Comma);
            if !explicit && !self.at_filter_start() {
                break;
            }
            let rhs = self.parse_filters_factor();
            node.op.push(String::from("and"));
            merge_filter(&mut node, rhs);
        }
        node
    }

    fn parse_filters_factor(&mut self) -> Node {
        if self.eat_reserved(Reserved::Not) {
            let mut node = self.parse_filters_factor();
            node.op.insert(0, String::from("not"));
            return node;
        }
        if self.eat_punct(Punct::LParen) {
            let node = self.parse_filters();
            if !self.eat_punct(Punct::RParen) {
                self.report_filter_error();
            }
            return node;
        }
        match self.parse_filter() {
            Some(node) => node,
            None => {
                self.report_filter_error();
                Node::new("filter")
            }
        }
    }

    fn report_filter_error(&mut self) {
        match self.peek_lex().cloned() {
            Some(stray) => {
                self.report_token(
                    stray.pos as i64,
                    String::from("Syntax error in a filter"),
                    &stray,
                );
                // Never consume a boundary: the enclosing pipeline needs it.
                if !self.at_boundary() {
                    self.bump();
                }
            }
            None => self.report(-20, -1, String::from("Unexpected end of query"), None),
        }
    }

    /// One atomic filter.
    fn parse_filter(&mut self) -> Option<Node> {
        let mut node = Node::new("filter");

        // Subsearch as a filter: its outputs feed the enclosing search.
        if self.check_punct(Punct::LBrack) {
            let sub = self.parse_subsearch()?;
            node.kind = "filter_subsearch";
            node.input.extend_from(sub.output.iter());
            return Some(node);
        }

        // `CASE(...)` / `TERM(...)` phrase filters.
        for (reserved, op) in [(Reserved::Case, "case"), (Reserved::Term, "term")] {
            if self.check_reserved(reserved) && matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen))) {
                self.bump();
                self.bump();
                let value = self.parse_value()?;
                if !self.eat_punct(Punct::RParen) {
                    return None;
                }
                node.kind = "filter_phrase";
                node.op.push(op.into());
                node.push_content(value);
                return Some(node);
            }
        }

        // Bare `*`.
        if self.eat_punct(Punct::Times) {
            node.push_content("*");
            return Some(node);
        }

        // `NUMBER <op> field`.
        if matches!(self.peek(), Some(Token::Number(_) | Token::Float(_)))
            && self.peek_at(1).is_some_and(Token::is_comp_op)
        {
            let value = self.bump().unwrap().token.value_text();
            let op = self.bump().unwrap().token.value_text();
            let field = self.parse_field_name()?;
            node.input.push(field);
            node.op.push(op);
            node.push_content(value);
            return Some(node);
        }

        // `field <op> ...` or a bare value.
        let mark = self.mark();
        if let Some(field) = self.parse_field_name() {
            if self.eat_punct(Punct::Eq) || self.eat_punct(Punct::Neq) {
                let op = self.tokens[self.pos - 1].token.value_text();
                let value = if self.eat_punct(Punct::Times) {
                    String::from("*")
                } else {
                    match self.parse_value() {
                        Some(value) => value,
                        None => return None,
                    }
                };
                node.input.push(field);
                node.op.push(op);
                node.push_content(value);
                return Some(node);
            }
            if self.peek().is_some_and(Token::is_comp_op) {
                if matches!(self.peek_at(1), Some(Token::Number(_) | Token::Float(_))) {
                    let op = self.bump().unwrap().token.value_text();
                    let value = self.bump().unwrap().token.value_text();
                    node.input.push(field);
                    node.op.push(op);
                    node.push_content(value);
                    return Some(node);
                }
                return None;
            }
            if self.check_reserved(Reserved::In)
                && matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen)))
            {
                self.bump();
                self.bump();
                let values = self.parse_values_list();
                if !self.eat_punct(Punct::RParen) {
                    return None;
                }
                node.input.push(field);
                node.op.push(String::from("in"));
                for value in values {
                    node.push_content(value);
                }
                return Some(node);
            }
            // Not a field position after all: re-parse as a bare value.
            self.reset(mark);
        }

        let value = self.parse_value()?;
        node.push_content(value);
        Some(node)
    }
}

fn merge_filter(node: &mut Node, rhs: Node) {
    node.input.extend_from(rhs.input.iter());
    node.output.extend_from(rhs.output.iter());
    node.content.extend(rhs.content);
    node.op.extend(rhs.op);
}

// Values and field names.
impl Parser<'_> {
    /// A single literal value, rendered as text.
    pub(crate) fn parse_value(&mut self) -> Option<String> {
        match self.peek()? {
            Token::Number(_)
            | Token::Float(_)
            | Token::Name(_)
            | Token::Pattern(_)
            | Token::Date(_)
            | Token::TimeSpecifier(_) => Some(self.bump().unwrap().token.value_text()),
            Token::Str(s) => {
                let s = s.clone();
                self.bump();
                Some(s)
            }
            Token::Reserved(r) if r.is_op_name() => {
                Some(self.bump().unwrap().token.value_text())
            }
            Token::Punct(Punct::Minus) => match self.peek_at(1) {
                Some(Token::Number(_) | Token::Float(_) | Token::Name(_)) => {
                    self.bump();
                    Some(format!("-{}", self.bump().unwrap().token.value_text()))
                }
                _ => None,
            },
            // An unbalanced quote pair around a name.
            Token::Punct(Punct::Quote) => {
                let mark = self.mark();
                self.bump();
                if self.eat_punct(Punct::Quote) {
                    return Some(String::new());
                }
                if let Some(Token::Name(name)) = self.peek() {
                    let name = name.clone();
                    self.bump();
                    if self.eat_punct(Punct::Quote) {
                        return Some(name);
                    }
                }
                self.reset(mark);
                None
            }
            Token::Punct(Punct::LBrack) => {
                self.parse_subsearch()?;
                Some(String::from("[...]"))
            }
            _ => None,
        }
    }

    /// `value (',' value)*`.
    pub(crate) fn parse_values_list(&mut self) -> Vec<String> {
        let mut values = Vec::new();
        while let Some(value) = self.parse_value() {
            values.push(value);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        values
    }

    /// A field name: identifier, pattern, string, a command or operator
    /// keyword used as a field, or the `fun(field)` form produced by naming
    /// a field after an aggregation.
    pub(crate) fn parse_field_name(&mut self) -> Option<String> {
        match self.peek()? {
            Token::Name(name) => {
                let name = name.clone();
                self.bump();
                if self.check_punct(Punct::LParen) {
                    let mark = self.mark();
                    self.bump();
                    if let Some(inner) = self.parse_field_name() {
                        if self.eat_punct(Punct::RParen) {
                            return Some(format!("{name}({inner})"));
                        }
                    }
                    self.reset(mark);
                }
                Some(name)
            }
            Token::Pattern(_) => Some(self.bump().unwrap().token.value_text()),
            // A command keyword is usable as a field name, except `where`,
            // which stays a clause keyword everywhere.
            Token::Command(name) if name != "where" => {
                Some(self.bump().unwrap().token.value_text())
            }
            Token::Str(s) => {
                let s = s.clone();
                self.bump();
                Some(s)
            }
            Token::Reserved(r) if r.is_op_name() => {
                Some(self.bump().unwrap().token.value_text())
            }
            _ => None,
        }
    }

    /// `field (','? field)*`.
    pub(crate) fn parse_fields_list(&mut self) -> Option<Vec<String>> {
        if self.at_args_term() {
            return None;
        }
        let mut fields = vec![self.parse_field_name()?];
        loop {
            let mark = self.mark();
            let had_comma = self.eat_punct(Punct::Comma);
            match self.at_field_name().then(|| self.parse_field_name()).flatten() {
                Some(field) => fields.push(field),
                None => {
                    if had_comma {
                        self.reset(mark);
                    }
                    break;
                }
            }
        }
        Some(fields)
    }

    /// Can the current token continue a field list?  Reserved words never
    /// can, even the ones usable as a single field name: at list position
    /// they introduce clauses (`OUTPUT`, `filter ...`, `sortby ...`).
    pub(crate) fn at_field_name(&self) -> bool {
        match self.peek() {
            Some(Token::Pattern(_) | Token::Str(_)) => true,
            // An identifier is a field name unless it introduces an argument
            // (`name=value`); `where` always starts a clause instead.
            Some(Token::Name(_)) => {
                !matches!(self.peek_at(1), Some(Token::Punct(Punct::Eq)))
            }
            Some(Token::Command(name)) => {
                name != "where" && !matches!(self.peek_at(1), Some(Token::Punct(Punct::Eq)))
            }
            _ => false,
        }
    }

    /// `field AS field`, or `None` (with the cursor restored).
    pub(crate) fn parse_rfield_term(&mut self) -> Option<(String, String)> {
        let mark = self.mark();
        let from = self.parse_field_name()?;
        if self.eat_reserved(Reserved::As) {
            if let Some(to) = self.parse_field_name() {
                return Some((from, to));
            }
        }
        self.reset(mark);
        None
    }

    /// `field AS field (','? field AS field)*` — the rename list.
    pub(crate) fn parse_rfields_list(&mut self) -> Option<(Vec<String>, Vec<String>)> {
        let (from, to) = self.parse_rfield_term()?;
        let (mut inputs, mut outputs) = (vec![from], vec![to]);
        loop {
            let mark = self.mark();
            self.eat_punct(Punct::Comma);
            match self.parse_rfield_term() {
                Some((from, to)) => {
                    inputs.push(from);
                    outputs.push(to);
                }
                None => {
                    self.reset(mark);
                    break;
                }
            }
        }
        Some((inputs, outputs))
    }

    /// A list mixing plain fields and `a AS b` renames (`lookup` fields).
    pub(crate) fn parse_any_fields_list(&mut self) -> Option<(Vec<String>, Vec<String>)> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        loop {
            if let Some((from, to)) = self.parse_rfield_term() {
                inputs.push(from);
                outputs.push(to);
            } else if self.at_field_name() && !self.at_args_term() {
                match self.parse_field_name() {
                    Some(field) => inputs.push(field),
                    None => break,
                }
            } else {
                break;
            }
            let mark = self.mark();
            if self.eat_punct(Punct::Comma) && !self.at_field_name() {
                self.reset(mark);
                break;
            }
        }
        (!inputs.is_empty()).then_some((inputs, outputs))
    }

    /// `(+|-)? field (',' (+|-)? field)*` — sort terms, comma-separated.
    pub(crate) fn parse_sort_clause(&mut self) -> Option<Vec<String>> {
        let mut fields = Vec::new();
        loop {
            let _ = self.eat_punct(Punct::Plus) || self.eat_punct(Punct::Minus);
            fields.push(self.parse_field_name()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Some(fields)
    }
}

// Arguments.
impl Parser<'_> {
    /// True when the cursor sits on `name=value`.  `where` never introduces
    /// an argument: it doubles as a clause keyword inside several commands.
    pub(crate) fn at_args_term(&self) -> bool {
        let named = match self.peek() {
            Some(Token::Name(_)) => true,
            Some(Token::Command(name)) => name != "where",
            Some(Token::Reserved(r)) => r.is_op_name(),
            _ => false,
        };
        named && matches!(self.peek_at(1), Some(Token::Punct(Punct::Eq)))
    }

    /// A single `name=value`; argument names are lowercased.
    pub(crate) fn parse_args_term(&mut self) -> Option<node::ArgMap> {
        if !self.at_args_term() {
            return None;
        }
        let name = self.bump().unwrap().token.value_text().to_ascii_lowercase();
        self.bump(); // `=`
        let value = self.parse_args_value()?;
        let mut args = node::ArgMap::new();
        args.insert(name, value);
        Some(args)
    }

    /// One or more space-separated `name=value` terms.
    pub(crate) fn parse_args_list(&mut self) -> Option<node::ArgMap> {
        let mut args = self.parse_args_term()?;
        while let Some(more) = self.parse_args_term() {
            args.merge(more);
        }
        Some(args)
    }

    /// An argument value: a literal, `*`, an operator or command keyword, a
    /// function call, an `eval(...)` expression, or `top|bottom N`.
    fn parse_args_value(&mut self) -> Option<String> {
        if self.eat_punct(Punct::Times) {
            return Some(String::from("*"));
        }
        // `top 5` / `bottom 5` limits.
        let limit = match self.peek() {
            Some(Token::Command(name)) if name == "top" => Some("top"),
            Some(Token::Reserved(Reserved::Bottom)) => Some("bottom"),
            _ => None,
        };
        if let Some(limit) = limit {
            if let Some(Token::Number(n)) = self.peek_at(1) {
                let n = *n;
                self.bump();
                self.bump();
                return Some(format!("{limit} {n}"));
            }
        }
        // Function calls, including `eval(...)`.
        if matches!(self.peek(), Some(Token::Name(_) | Token::Command(_)))
            && matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen)))
        {
            let mark = self.mark();
            if let Some(expr) = self.parse_expr_primary() {
                return Some(expr.text);
            }
            self.reset(mark);
        }
        match self.peek() {
            Some(Token::Command(name)) if name != "where" => {
                Some(self.bump().unwrap().token.value_text())
            }
            _ => self.parse_value(),
        }
    }
}

// Aggregation terms.
impl Parser<'_> {
    /// `agg_term (','? agg_term)*`.
    pub(crate) fn parse_agg_terms_list(&mut self) -> Option<AggTerms> {
        let mut terms = AggTerms::default();
        if !self.parse_agg_term(&mut terms) {
            return None;
        }
        loop {
            let mark = self.mark();
            self.eat_punct(Punct::Comma);
            if !self.parse_agg_term(&mut terms) {
                self.reset(mark);
                break;
            }
        }
        Some(terms)
    }

    /// One aggregation term: `fun(arg) [as alias]`, `fun [as alias]`, or a
    /// bare function name.
    fn parse_agg_term(&mut self, terms: &mut AggTerms) -> bool {
        let mark = self.mark();
        let Some(Token::Name(name)) = self.peek() else {
            return false;
        };
        let name = name.clone();
        // An argument term is never an aggregation.
        if self.at_args_term() {
            return false;
        }
        self.bump();

        if self.eat_punct(Punct::LParen) {
            // `fun(field|*|eval(...))`.
            let arg = if self.eat_punct(Punct::Times) {
                Some(String::from("*"))
            } else if matches!(self.peek(), Some(Token::Command(c)) if c == "eval") {
                let mark = self.mark();
                self.bump();
                if self.eat_punct(Punct::LParen) {
                    let expr = self.parse_expression();
                    if self.eat_punct(Punct::RParen) {
                        expr.map(|e| {
                            terms.content.push(e.text.clone());
                            format!("eval({})", e.text)
                        })
                    } else {
                        self.reset(mark);
                        None
                    }
                } else {
                    self.reset(mark);
                    None
                }
            } else {
                self.parse_field_name()
            };
            let Some(arg) = arg else {
                self.reset(mark);
                return false;
            };
            if !self.eat_punct(Punct::RParen) {
                self.reset(mark);
                return false;
            }
            let is_field = !arg.contains('(') && arg != "*";
            if is_field {
                terms.inputs.push(arg.clone());
            }
            if self.eat_reserved(Reserved::As) {
                if self.eat_punct(Punct::Times) {
                    terms.outputs.push(String::from("*"));
                } else if let Some(alias) = self.parse_field_name() {
                    terms.outputs.push(alias);
                } else {
                    self.reset(mark);
                    return false;
                }
            } else {
                terms.outputs.push(format!("{name}({arg})"));
            }
            return true;
        }

        if self.eat_reserved(Reserved::As) {
            if self.eat_punct(Punct::Times) {
                terms.inputs.push(name);
                terms.outputs.push(String::from("*"));
            } else if let Some(alias) = self.parse_field_name() {
                terms.inputs.push(name);
                terms.outputs.push(alias);
            } else {
                self.reset(mark);
                return false;
            }
            return true;
        }

        // Bare aggregation (`count`): produces a column, reads nothing.
        terms.outputs.push(name);
        true
    }

    /// `agg_terms | eval-expression-with-alias` (charting commands).
    pub(crate) fn parse_agg_or_eval_list(&mut self) -> Option<AggTerms> {
        if matches!(self.peek(), Some(Token::Command(c)) if c == "eval") {
            let mark = self.mark();
            self.bump();
            if self.eat_punct(Punct::LParen) {
                if let Some(expr) = self.parse_expression() {
                    if self.eat_punct(Punct::RParen) {
                        let mut terms = AggTerms {
                            content: vec![expr.text],
                            ..AggTerms::default()
                        };
                        if self.eat_reserved(Reserved::As) {
                            if let Some(alias) = self.parse_field_name() {
                                terms.outputs.push(alias);
                            }
                        }
                        return Some(terms);
                    }
                }
            }
            self.reset(mark);
            return None;
        }
        self.parse_agg_terms_list()
    }
}

// Expressions.
impl Parser<'_> {
    /// A full boolean/arithmetic expression; returns its reconstructed text
    /// and referenced identifiers.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        let mut expr = self.parse_expr_term()?;
        while self.check_reserved(Reserved::Or) {
            self.bump();
            let rhs = self.parse_expr_term()?;
            expr.text = format!("{} or {}", expr.text, rhs.text);
            expr.inputs.extend(rhs.inputs);
        }
        Some(expr)
    }

    fn parse_expr_term(&mut self) -> Option<Expr> {
        let mut expr = self.parse_expr_factor()?;
        loop {
            if self.eat_reserved(Reserved::And) {
                let rhs = self.parse_expr_factor()?;
                expr.text = format!("{} and {}", expr.text, rhs.text);
                expr.inputs.extend(rhs.inputs);
                continue;
            }
            // Juxtaposition, except where the next token opens an argument.
            if self.at_expr_start() && !self.at_args_term() {
                let rhs = self.parse_expr_factor()?;
                expr.text = format!("{} {}", expr.text, rhs.text);
                expr.inputs.extend(rhs.inputs);
                continue;
            }
            break;
        }
        Some(expr)
    }

    fn at_expr_start(&self) -> bool {
        match self.peek() {
            Some(
                Token::Name(_)
                | Token::Number(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Pattern(_)
                | Token::Date(_)
                | Token::TimeSpecifier(_),
            ) => true,
            Some(Token::Punct(Punct::LParen)) => true,
            Some(Token::Punct(Punct::Minus)) => true,
            Some(Token::Reserved(Reserved::Not | Reserved::Case)) => true,
            Some(Token::Command(_)) => {
                matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen)))
            }
            _ => false,
        }
    }

    fn parse_expr_factor(&mut self) -> Option<Expr> {
        if self.eat_reserved(Reserved::Not) {
            let inner = self.parse_expr_factor()?;
            return Some(Expr {
                text: format!("not {}", inner.text),
                inputs: inner.inputs,
            });
        }
        let mut expr = self.parse_expr_value()?;
        // `value IN (v1, v2, ...)`.
        if self.check_reserved(Reserved::In)
            && matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen)))
        {
            self.bump();
            self.bump();
            let values = self.parse_values_list();
            if !self.eat_punct(Punct::RParen) {
                return None;
            }
            expr.text = format!("{} IN ({})", expr.text, values.join(","));
        }
        Some(expr)
    }

    /// A binary-operator chain over primaries.  Operator text is embedded
    /// without surrounding spaces; adjacency with a PATTERN (the lexer's
    /// rendering of unspaced `*`) concatenates directly.
    fn parse_expr_value(&mut self) -> Option<Expr> {
        let mut expr = self.parse_expr_primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(Punct::Plus)) => "+",
                Some(Token::Punct(Punct::Minus)) => "-",
                Some(Token::Punct(Punct::Times)) => "*",
                Some(Token::Punct(Punct::Divide)) => "/",
                Some(Token::Punct(Punct::Mod)) => "%",
                Some(Token::Punct(Punct::Dot)) => ".",
                Some(Token::Punct(Punct::Deq)) => "==",
                Some(Token::Punct(Punct::Eq)) => "=",
                Some(Token::Punct(Punct::Neq)) => "!=",
                Some(Token::Punct(Punct::Lt)) => "<",
                Some(Token::Punct(Punct::Le)) => "<=",
                Some(Token::Punct(Punct::Gt)) => ">",
                Some(Token::Punct(Punct::Ge)) => ">=",
                Some(Token::Pattern(_)) => {
                    let pattern = self.bump().unwrap().token.value_text();
                    expr.text.push_str(&pattern);
                    continue;
                }
                _ => break,
            };
            self.bump();
            let rhs = self.parse_expr_primary()?;
            expr.text = format!("{}{op}{}", expr.text, rhs.text);
            expr.inputs.extend(rhs.inputs);
        }
        Some(expr)
    }

    fn parse_expr_primary(&mut self) -> Option<Expr> {
        // Parenthesized subexpression.
        if self.eat_punct(Punct::LParen) {
            let inner = self.parse_expression()?;
            if !self.eat_punct(Punct::RParen) {
                return None;
            }
            return Some(Expr {
                text: format!("({})", inner.text),
                inputs: inner.inputs,
            });
        }
        // Function call: `name(...)`, `case(...)`, or a command keyword used
        // as a function name.
        let callable = match self.peek() {
            Some(Token::Name(name)) => Some(name.clone()),
            Some(Token::Command(name)) => Some(name.clone()),
            Some(Token::Reserved(Reserved::Case)) => Some(String::from("case")),
            _ => None,
        };
        if let Some(name) = callable {
            if matches!(self.peek_at(1), Some(Token::Punct(Punct::LParen))) {
                self.bump();
                self.bump();
                if self.eat_punct(Punct::RParen) {
                    return Some(Expr {
                        text: format!("{name}()"),
                        inputs: Vec::new(),
                    });
                }
                let mut inputs = Vec::new();
                let mut args = Vec::new();
                loop {
                    let arg = self.parse_expression()?;
                    args.push(arg.text);
                    inputs.extend(arg.inputs);
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                if !self.eat_punct(Punct::RParen) {
                    return None;
                }
                return Some(Expr {
                    text: format!("{name}({})", args.join(",")),
                    inputs,
                });
            }
        }
        // Literals and identifiers.
        match self.peek()? {
            Token::Name(name) => {
                let name = name.clone();
                self.bump();
                Some(Expr {
                    text: name.clone(),
                    inputs: vec![name],
                })
            }
            Token::Number(_) | Token::Float(_) | Token::Date(_) | Token::TimeSpecifier(_) => {
                Some(Expr {
                    text: self.bump().unwrap().token.value_text(),
                    inputs: Vec::new(),
                })
            }
            Token::Str(s) => {
                let text = format!("\"{s}\"");
                self.bump();
                Some(Expr {
                    text,
                    inputs: Vec::new(),
                })
            }
            Token::Pattern(_) => Some(Expr {
                text: self.bump().unwrap().token.value_text(),
                inputs: Vec::new(),
            }),
            Token::Punct(Punct::Minus) => {
                self.bump();
                let inner = self.parse_expr_primary()?;
                Some(Expr {
                    text: format!("-{}", inner.text),
                    inputs: inner.inputs,
                })
            }
            _ => None,
        }
    }
}
