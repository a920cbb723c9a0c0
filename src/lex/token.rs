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

use std::fmt::{Display, Formatter, Result as FmtResult};

use unicase::UniCase;

use crate::catalog::Catalog;

/// An SPL token.
///
/// A bare identifier is context-sensitive: whenever its lowercased lexeme
/// names a cataloged command it becomes [Token::Command], whenever it names a
/// reserved word it becomes [Token::Reserved], and purely numeric lexemes are
/// retagged as numbers.  The scanner performs that rewriting, so the parser
/// never sees a [Token::Name] that collides with a keyword.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Integer literal.
    Number(i64),

    /// Floating-point literal.
    Float(f64),

    /// Quoted string, quotes stripped.
    Str(String),

    /// Bare identifier (including `.`, `{`, `}`, `/`, `-`, `:` and `<<...>>`
    /// template forms).
    Name(String),

    /// Identifier with a leading and/or trailing `*`.
    Pattern(String),

    /// `d/m/y` or `d/m/y:h:m:s` date literal.
    Date(String),

    /// Relative time specifier such as `-1d@h`.
    TimeSpecifier(String),

    /// Name of a cataloged command, lowercased.
    Command(String),

    /// Reserved word, lowercased.
    Reserved(Reserved),

    /// Operator or punctuation.
    Punct(Punct),
}

impl Token {
    /// The stable token-kind identifier used in serialized diagnostics.
    /// Command tokens take their identifier from the catalog.
    pub fn type_name(&self, catalog: &Catalog) -> String {
        match self {
            Token::Number(_) => "NUMBER".into(),
            Token::Float(_) => "FLOAT".into(),
            Token::Str(_) => "STRING".into(),
            Token::Name(_) => "NAME".into(),
            Token::Pattern(_) => "PATTERN".into(),
            Token::Date(_) => "DATE".into(),
            Token::TimeSpecifier(_) => "TIMESPECIFIER".into(),
            Token::Command(name) => catalog
                .get(name)
                .map(|spec| spec.token_name.clone())
                .unwrap_or_else(|| "NAME".into()),
            Token::Reserved(reserved) => reserved.token_name().into(),
            Token::Punct(punct) => punct.token_name().into(),
        }
    }

    /// The token's value as it appears in diagnostics and reconstructed
    /// expression text.
    pub fn value_text(&self) -> String {
        match self {
            Token::Number(number) => number.to_string(),
            Token::Float(float) => float.to_string(),
            Token::Str(s)
            | Token::Name(s)
            | Token::Pattern(s)
            | Token::Date(s)
            | Token::TimeSpecifier(s)
            | Token::Command(s) => s.clone(),
            Token::Reserved(reserved) => reserved.as_str().into(),
            Token::Punct(punct) => punct.as_str().into(),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Name(name) => Some(name),
            _ => None,
        }
    }

    /// True for `<`, `<=`, `>`, `>=`.
    pub fn is_comp_op(&self) -> bool {
        matches!(
            self,
            Token::Punct(Punct::Lt | Punct::Le | Punct::Gt | Punct::Ge)
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.value_text())
    }
}

/// Reserved words.  Like command names these are matched on the lowercased
/// lexeme.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reserved {
    As,
    By,
    GroupBy,
    SortBy,
    Or,
    And,
    Not,
    Output,
    OutputNew,
    In,
    With,
    NotIn,
    Case,
    Term,
    Over,
    Bottom,
    SplitRow,
    SplitCol,
    Filter,
    Limit,
    RowSummary,
    ColSummary,
    ShowOther,
    NumCols,
    Range,
    Period,
    TrueLabel,
    FalseLabel,
}

/// Every reserved word paired with its variant, for case-insensitive lookup.
const RESERVED_WORDS: &[(&str, Reserved)] = &[
    ("as", Reserved::As),
    ("by", Reserved::By),
    ("groupby", Reserved::GroupBy),
    ("sortby", Reserved::SortBy),
    ("or", Reserved::Or),
    ("and", Reserved::And),
    ("not", Reserved::Not),
    ("output", Reserved::Output),
    ("outputnew", Reserved::OutputNew),
    ("in", Reserved::In),
    ("with", Reserved::With),
    ("notin", Reserved::NotIn),
    ("case", Reserved::Case),
    ("term", Reserved::Term),
    ("over", Reserved::Over),
    ("bottom", Reserved::Bottom),
    ("splitrow", Reserved::SplitRow),
    ("splitcol", Reserved::SplitCol),
    ("filter", Reserved::Filter),
    ("limit", Reserved::Limit),
    ("rowsummary", Reserved::RowSummary),
    ("colsummary", Reserved::ColSummary),
    ("showother", Reserved::ShowOther),
    ("numcols", Reserved::NumCols),
    ("range", Reserved::Range),
    ("period", Reserved::Period),
    ("truelabel", Reserved::TrueLabel),
    ("falselabel", Reserved::FalseLabel),
];

impl Reserved {
    /// Looks up a lexeme, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = UniCase::new(name);
        RESERVED_WORDS
            .iter()
            .copied()
            .find(|(word, _)| UniCase::new(*word) == name)
            .map(|(_, reserved)| reserved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::As => "as",
            Self::By => "by",
            Self::GroupBy => "groupby",
            Self::SortBy => "sortby",
            Self::Or => "or",
            Self::And => "and",
            Self::Not => "not",
            Self::Output => "output",
            Self::OutputNew => "outputnew",
            Self::In => "in",
            Self::With => "with",
            Self::NotIn => "notin",
            Self::Case => "case",
            Self::Term => "term",
            Self::Over => "over",
            Self::Bottom => "bottom",
            Self::SplitRow => "splitrow",
            Self::SplitCol => "splitcol",
            Self::Filter => "filter",
            Self::Limit => "limit",
            Self::RowSummary => "rowsummary",
            Self::ColSummary => "colsummary",
            Self::ShowOther => "showother",
            Self::NumCols => "numcols",
            Self::Range => "range",
            Self::Period => "period",
            Self::TrueLabel => "truelabel",
            Self::FalseLabel => "falselabel",
        }
    }

    pub fn token_name(&self) -> &'static str {
        match self {
            Self::As => "AS_CLAUSE",
            Self::By => "BY_CLAUSE",
            Self::GroupBy => "GROUPBY_CLAUSE",
            Self::SortBy => "SORTBY_CLAUSE",
            Self::Or => "OR_OP",
            Self::And => "AND_OP",
            Self::Not => "NOT_OP",
            Self::Output => "OUTPUT_OP",
            Self::OutputNew => "OUTPUT_NEW_OP",
            Self::In => "IN_OP",
            Self::With => "WITH_OP",
            Self::NotIn => "NOTIN_OP",
            Self::Case => "CASE_OP",
            Self::Term => "TERM_OP",
            Self::Over => "OVER_OP",
            Self::Bottom => "BOTTOM_OP",
            Self::SplitRow => "SPLITROW_OP",
            Self::SplitCol => "SPLITCOL_OP",
            Self::Filter => "FILTER_OP",
            Self::Limit => "LIMIT_OP",
            Self::RowSummary => "ROWSUMMARY_OP",
            Self::ColSummary => "COLSUMMARY_OP",
            Self::ShowOther => "SHOWOTHER_OP",
            Self::NumCols => "NUMCOLS_OP",
            Self::Range => "RANGE_OP",
            Self::Period => "PERIOD_OP",
            Self::TrueLabel => "TRUELABEL_OP",
            Self::FalseLabel => "FALSELABEL_OP",
        }
    }

    /// The reserved words usable as ordinary field/argument names and
    /// argument values (`op_names` in the grammar).  The boolean and clause
    /// operators are deliberately not in this set.
    pub fn is_op_name(&self) -> bool {
        matches!(
            self,
            Self::SortBy
                | Self::Output
                | Self::OutputNew
                | Self::Case
                | Self::Term
                | Self::Over
                | Self::Bottom
                | Self::SplitRow
                | Self::SplitCol
                | Self::Filter
                | Self::Limit
                | Self::RowSummary
                | Self::ColSummary
                | Self::ShowOther
                | Self::NumCols
                | Self::Range
                | Self::Period
                | Self::TrueLabel
                | Self::FalseLabel
        )
    }
}

impl Display for Reserved {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Operators and punctuation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Punct {
    /// `==`.
    Deq,

    /// `=`.
    Eq,

    /// `!=`.
    Neq,

    /// `+`.
    Plus,

    /// `-`.
    Minus,

    /// `*`.
    Times,

    /// `/`.
    Divide,

    /// `%`.
    Mod,

    /// `(`.
    LParen,

    /// `)`.
    RParen,

    /// `"("` (a quoted opening parenthesis).
    QlParen,

    /// `")"` (a quoted closing parenthesis).
    QrParen,

    /// `[`.
    LBrack,

    /// `]`.
    RBrack,

    /// `|`.
    Pipe,

    /// `,`.
    Comma,

    /// A lone `"` from an unbalanced quote.
    Quote,

    /// `<`.
    Lt,

    /// `<=`.
    Le,

    /// `>`.
    Gt,

    /// `>=`.
    Ge,

    /// `.`.
    Dot,

    /// `:`.
    Colon,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deq => "==",
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::Divide => "/",
            Self::Mod => "%",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::QlParen => "\"(\"",
            Self::QrParen => "\")\"",
            Self::LBrack => "[",
            Self::RBrack => "]",
            Self::Pipe => "|",
            Self::Comma => ",",
            Self::Quote => "\"",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Dot => ".",
            Self::Colon => ":",
        }
    }

    pub fn token_name(&self) -> &'static str {
        match self {
            Self::Deq => "DEQ",
            Self::Eq => "EQ",
            Self::Neq => "NEQ",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Times => "TIMES",
            Self::Divide => "DIVIDE",
            Self::Mod => "MOD",
            Self::LParen => "LPAREN",
            Self::RParen => "RPAREN",
            Self::QlParen => "QLPAREN",
            Self::QrParen => "QRPAREN",
            Self::LBrack => "LBRACK",
            Self::RBrack => "RBRACK",
            Self::Pipe => "PIPE",
            Self::Comma => "COMMA",
            Self::Quote => "QUOTE",
            Self::Lt | Self::Le | Self::Gt | Self::Ge => "COMP_OP",
            Self::Dot => "DOT",
            Self::Colon => "COLON",
        }
    }
}

impl Display for Punct {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
