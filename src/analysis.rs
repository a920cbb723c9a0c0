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

//! The analyzer entry point.
//!
//! [analyze] runs the whole pipeline over one query: macro expansion (when
//! macro definition files are supplied), scanning, parsing with interleaved
//! semantic checks, and diagnostic collection.  All mutable state lives in
//! per-call values; the command catalog and macro-file cache are the only
//! process-wide, read-only state.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error as ThisError;

use crate::{
    catalog::Catalog,
    macros::{MacroFileError, MacroSet},
    message::Diagnostics,
    parse::{
        self,
        node::{SearchNode, Subsearch},
    },
};

/// Options for [analyze_with].
#[derive(Debug, Default)]
pub struct AnalyzeOptions {
    /// Dump the analysis to standard error as it is produced.
    pub verbose: bool,

    /// Render diagnostics to standard error after the parse.
    pub print_errs: bool,

    /// Macro definition files, in lookup order.
    pub macro_files: Vec<PathBuf>,
}

/// Error from [analyze_with]; only input-loading can fail, a query itself
/// always produces an analysis.
#[derive(Debug, ThisError)]
pub enum AnalyzeError {
    #[error(transparent)]
    MacroFile(#[from] MacroFileError),
}

/// The parsed pipeline: the main search expression plus every subsearch,
/// recorded inside-out with its nesting level.
#[derive(Debug, Serialize)]
pub struct AnalysisData {
    pub main: SearchNode,
    pub subsearches: Vec<Subsearch>,
}

/// The full result of analyzing one query.
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub data: AnalysisData,
    pub errors: Diagnostics,
    pub errors_count: usize,
}

/// Analyzes `text` with default options (no macros, nothing printed).
pub fn analyze(text: &str) -> Analysis {
    analyze_with(text, &AnalyzeOptions::default())
        .expect("analysis without macro files cannot fail")
}

/// Analyzes `text` after expanding macros from `options.macro_files`.
pub fn analyze_with(text: &str, options: &AnalyzeOptions) -> Result<Analysis, AnalyzeError> {
    let mut macros = MacroSet::new();
    for path in &options.macro_files {
        macros.load_path(path)?;
    }
    let expanded;
    let text = if macros.is_empty() {
        text
    } else {
        let expansion = macros.expand(text);
        if options.verbose && expansion.unique_macros_found > 0 {
            eprintln!(
                "{} unique macros found and {} were expanded",
                expansion.unique_macros_found, expansion.unique_macros_expanded
            );
        }
        expanded = expansion.text;
        &expanded
    };

    let outcome = parse::parse(text, Catalog::global());
    let analysis = Analysis {
        errors_count: outcome.diagnostics.len(),
        data: AnalysisData {
            main: outcome.main,
            subsearches: outcome.subsearches,
        },
        errors: outcome.diagnostics,
    };
    if options.print_errs {
        analysis.errors.print(text);
    }
    if options.verbose {
        eprintln!("{:#?}", analysis.data.main);
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::node::FieldsEffect;

    fn inputs(analysis: &Analysis) -> Vec<String> {
        analysis.data.main.input.to_vec()
    }

    fn outputs(analysis: &Analysis) -> Vec<String> {
        analysis.data.main.output.to_vec()
    }

    fn messages(analysis: &Analysis) -> Vec<String> {
        analysis
            .errors
            .iter()
            .map(|diagnostic| diagnostic.message.clone())
            .collect()
    }

    #[test]
    fn filters_and_stats() {
        let analysis = analyze("index=idx sourcetype=a | stats count by host");
        assert_eq!(inputs(&analysis), ["index", "sourcetype", "host"]);
        assert_eq!(outputs(&analysis), ["host", "count"]);
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn generate_then_remove() {
        let analysis = analyze("| inputlookup t where x>0 | fields - y");
        assert_eq!(
            analysis.data.main.fields_effect,
            [FieldsEffect::Generate, FieldsEffect::Remove]
        );
        assert!(!outputs(&analysis).iter().any(|f| f == "y"));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn rename_drops_sources_and_appends_targets() {
        let analysis = analyze("index=i | table a, x, c | rename a as b, c as d");
        assert_eq!(outputs(&analysis), ["x", "b", "d"]);
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn duplicate_stats_output_is_reported() {
        let analysis = analyze("index=i | stats count as n, count as n by x");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("Duplicate field 'n'"));
    }

    #[test]
    fn sendemail_requires_to() {
        let analysis = analyze("index=i | sendemail format=html");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("Missing 'to' argument"));
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["errors"]["list"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn quoted_values_stay_out_of_fields() {
        let analysis = analyze(r#"f="v""#);
        assert_eq!(inputs(&analysis), ["f"]);
        assert!(outputs(&analysis).is_empty());
        assert!(analysis.data.main.content.contains(&String::from("v")));
    }

    #[test]
    fn nested_subsearches_record_inside_out() {
        let analysis = analyze("[[ a ]]");
        let levels: Vec<u32> = analysis
            .data
            .subsearches
            .iter()
            .map(|sub| sub.level)
            .collect();
        assert_eq!(levels, [2, 1]);
    }

    #[test]
    fn subsearch_in_filters_feeds_inputs() {
        let analysis = analyze("index=i [ | inputlookup hosts | fields host ] | stats count by host");
        assert_eq!(
            analysis.data.subsearches.len(),
            1,
        );
        assert_eq!(analysis.data.subsearches[0].level, 1);
        assert!(inputs(&analysis).contains(&String::from("host")));
    }

    #[test]
    fn subsearch_body_may_start_with_a_command() {
        let analysis = analyze("index=idx [search partitions=2 index=idx2] | stats count");
        assert_eq!(analysis.errors_count, 0);
        assert_eq!(analysis.data.subsearches.len(), 1);
        assert!(
            analysis.data.subsearches[0]
                .data
                .input
                .contains("partitions")
        );
    }

    #[test]
    fn appendpipe_extends_with_subpipeline_fields() {
        let analysis =
            analyze("index=i | stats count by host | appendpipe [stats sum(count) as total]");
        assert_eq!(analysis.errors_count, 0);
        assert_eq!(outputs(&analysis), ["host", "count", "total"]);
    }

    #[test]
    fn unknown_command_reports_and_recovers() {
        let analysis = analyze("index=i | frobnicate x | stats count");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("Unknown command name"));
        // The pipeline still carries the stats output.
        assert_eq!(outputs(&analysis), ["count"]);
    }

    #[test]
    fn unexpected_argument_reports_each_name_once() {
        let analysis = analyze("index=i | dedup host bogus=1 bogus=2");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("Unexpected argument 'bogus'"));
        assert!(messages(&analysis)[0].contains("keepevents"));
    }

    #[test]
    fn eval_extends_with_assigned_fields() {
        let analysis = analyze("index=i | eval a=b+1, c=\"x\"");
        assert_eq!(outputs(&analysis), ["a", "c"]);
        assert!(inputs(&analysis).contains(&String::from("b")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn where_tracks_expression_identifiers() {
        let analysis = analyze("index=i | where status>500 and host!=\"web\"");
        assert!(inputs(&analysis).contains(&String::from("status")));
        assert!(inputs(&analysis).contains(&String::from("host")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn fields_replace_expands_wildcards() {
        let analysis = analyze("index=i | table status status_code host | fields status*");
        assert_eq!(outputs(&analysis), ["status", "status_code"]);
    }

    #[test]
    fn lookup_extends_with_output_fields() {
        let analysis = analyze("index=i | lookup geo ip OUTPUT city, country");
        assert_eq!(outputs(&analysis), ["city", "country"]);
        assert!(inputs(&analysis).contains(&String::from("ip")));
        assert!(analysis.data.main.content.contains(&String::from("geo")));
    }

    #[test]
    fn timechart_output_leads_with_time() {
        let analysis = analyze("index=i | timechart span=1h count by host");
        assert_eq!(outputs(&analysis)[0], "_time");
        assert!(outputs(&analysis).contains(&String::from("host")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn anomalydetection_summary_replaces() {
        let analysis = analyze("index=i | anomalydetection action=summary");
        assert_eq!(
            *analysis.data.main.fields_effect.last().unwrap(),
            FieldsEffect::Replace
        );
        assert!(outputs(&analysis).contains(&String::from("num_anomalies")));

        let annotate = analyze("index=i | anomalydetection");
        assert_eq!(
            *annotate.data.main.fields_effect.last().unwrap(),
            FieldsEffect::Extend
        );
    }

    #[test]
    fn makeresults_annotate_switches_output_set() {
        let plain = analyze("| makeresults count=5");
        assert_eq!(outputs(&plain), ["_time"]);

        let annotated = analyze("| makeresults annotate=true");
        assert!(outputs(&annotated).contains(&String::from("sourcetype")));
    }

    #[test]
    fn iplocation_prefix_applies_to_outputs() {
        let analysis = analyze("index=i | iplocation prefix=ip_ clientip");
        assert!(outputs(&analysis).contains(&String::from("ip_City")));
        assert!(inputs(&analysis).contains(&String::from("clientip")));
    }

    #[test]
    fn metadata_validates_type() {
        let missing = analyze("| metadata index=main");
        assert!(messages(&missing)[0].contains("Missing type argument"));

        let invalid = analyze("| metadata type=bogus");
        assert!(messages(&invalid)[0].contains("Invalid type bogus"));

        let valid = analyze("| metadata type=hosts");
        assert!(outputs(&valid).contains(&String::from("host")));
        assert_eq!(valid.errors_count, 0);
    }

    #[test]
    fn datamodel_validates_search_mode() {
        let analysis = analyze("| datamodel internal server bogus_mode");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("search mode"));

        let ok = analyze("| datamodel internal server search");
        assert_eq!(ok.errors_count, 0);
    }

    #[test]
    fn from_requires_dataset_separator() {
        let analysis = analyze("| from datamodel internal");
        assert_eq!(analysis.errors_count, 0);
        assert!(inputs(&analysis).contains(&String::from("datamodel:internal")));

        let missing = analyze("| from internal");
        assert_eq!(missing.errors_count, 1);
        assert!(messages(&missing)[0].contains("Malformated dataset information"));

        let inline = analyze("| from datamodel:internal");
        assert_eq!(inline.errors_count, 0);
    }

    #[test]
    fn rex_outputs_named_groups() {
        let analysis = analyze(r#"index=i | rex field=_raw "user=(?<user>\w+) ip=(?<ip>\S+)""#);
        assert_eq!(outputs(&analysis), ["user", "ip"]);
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn multikv_validates_selectors() {
        let ok = analyze("index=i | multikv fields host user filter web");
        assert_eq!(ok.errors_count, 0);

        let bad = analyze("index=i | multikv bogus web");
        assert_eq!(bad.errors_count, 1);
        assert!(messages(&bad)[0].contains("Unexpected selector"));
    }

    #[test]
    fn mcollect_requires_index() {
        let analysis = analyze("index=i | mcollect split=true");
        assert_eq!(analysis.errors_count, 1);
        assert!(messages(&analysis)[0].contains("Missing index argument"));
    }

    #[test]
    fn append_extends_with_subsearch_fields() {
        let analysis = analyze("index=i | stats count by host | append [ | inputlookup t | fields a ]");
        assert_eq!(
            analysis.data.main.fields_effect,
            [FieldsEffect::Replace, FieldsEffect::Extend]
        );
        assert!(outputs(&analysis).contains(&String::from("a")));
    }

    #[test]
    fn join_merges_subsearch_outputs() {
        let analysis = analyze("index=i | join type=inner host [ | inputlookup t | fields host, owner ]");
        assert!(inputs(&analysis).contains(&String::from("host")));
        assert!(outputs(&analysis).contains(&String::from("owner")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn trailing_pipe_reports_end_of_query() {
        let analysis = analyze("index=i |");
        assert_eq!(analysis.errors_count, 1);
        let diagnostic = analysis.errors.iter().next().unwrap();
        assert_eq!(diagnostic.start_pos, -20);
        assert_eq!(diagnostic.end_pos, -1);
        assert!(diagnostic.message.contains("Unexpected end of query"));
    }

    #[test]
    fn illegal_character_is_reported_and_skipped() {
        let analysis = analyze("index=i ; | stats count");
        assert!(messages(&analysis).iter().any(|m| m.contains("Illegal character")));
        assert_eq!(outputs(&analysis), ["count"]);
    }

    #[test]
    fn effect_composition_matches_apply() {
        use crate::parse::node::apply_effect;

        let first = analyze("index=i | table a b c");
        let whole = analyze("index=i | table a b c | fields - b");
        let removed: crate::parse::node::FieldSet = ["b"].into_iter().collect();
        let expected = apply_effect(
            &first.data.main.output,
            FieldsEffect::Remove,
            &removed,
            &removed,
        );
        assert_eq!(whole.data.main.output, expected);
    }

    #[test]
    fn streamstats_quoted_expression_argument() {
        let analysis = analyze(
            "index=i | streamstats reset_before=\"(\" count>5 \")\" count as events_count by host",
        );
        assert_eq!(analysis.errors_count, 0);
        assert!(outputs(&analysis).contains(&String::from("events_count")));
    }

    #[test]
    fn top_reads_fields_and_by_clause() {
        let analysis = analyze(
            "sourcetype=access_* | top 1 showperc=f productName countfield=total by categoryId",
        );
        assert!(inputs(&analysis).contains(&String::from("productName")));
        assert!(inputs(&analysis).contains(&String::from("categoryId")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn foreach_template_reads_fields() {
        let analysis = analyze("index=i | foreach a b [ eval total=total+1 ]");
        assert!(inputs(&analysis).contains(&String::from("a")));
        assert!(inputs(&analysis).contains(&String::from("total")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn chart_by_field_becomes_output() {
        let analysis = analyze("index=i | chart count over host by status");
        assert!(outputs(&analysis).contains(&String::from("status")));
        assert!(inputs(&analysis).contains(&String::from("host")));
        assert_eq!(analysis.errors_count, 0);
    }

    #[test]
    fn complex_pipeline_parses_cleanly() {
        let analysis = analyze(
            "index=\"idx\" sourcetype=\"stats_\" event_id IN (1,\"3\") (a OR ( b AND c) d) \
             | stats count, values(event_id) as eid, dc(host) by index, sourcetype \
             | eval desc=\"This is a message\", value = -1 + ( 2 * 3) \
             | search value=yes \
             | dedup 5 host,sourcetype keepevents=true",
        );
        assert_eq!(analysis.errors_count, 0);
        assert!(outputs(&analysis).contains(&String::from("eid")));
        assert!(outputs(&analysis).contains(&String::from("desc")));
    }

    #[test]
    fn macro_expansion_feeds_the_parser() {
        use crate::macros::MacroSet;

        let mut set = MacroSet::new();
        set.load_str("[m(2)]\nargs = arg1, arg2\ndefinition = \"src=$arg1$ dst=$arg2$\"\n");
        let expansion = set.expand("`m(1,2)` index=i");
        assert_eq!(expansion.text, "src=1 dst=2 index=i");
        assert_eq!(expansion.unique_macros_expanded, 1);

        let analysis = analyze(&expansion.text);
        assert_eq!(inputs(&analysis), ["src", "dst", "index"]);
    }
}
