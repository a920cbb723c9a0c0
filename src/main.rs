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

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use spl_validator::analysis::{AnalyzeOptions, analyze_with};

/// Static analyzer for SPL search queries.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The query to analyze, or `@path` to read it from a file.
    query: String,

    /// Macro definition file; may be given several times, lookup order is
    /// argument order.
    #[arg(long = "macros", value_name = "FILE")]
    macro_files: Vec<PathBuf>,

    /// Print the full analysis as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Verbose progress output on standard error.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let query = match cli.query.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?,
        None => cli.query.clone(),
    };

    let options = AnalyzeOptions {
        verbose: cli.verbose,
        print_errs: !cli.json,
        macro_files: cli.macro_files,
    };
    let analysis = analyze_with(&query, &options)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("input fields:  {:?}", analysis.data.main.input.to_vec());
        println!("output fields: {:?}", analysis.data.main.output.to_vec());
        println!("subsearches:   {}", analysis.data.subsearches.len());
        println!("errors:        {}", analysis.errors_count);
    }
    Ok(())
}
