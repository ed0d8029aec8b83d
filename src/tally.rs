use log::{info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use stv_voting::{
    run_election, ElectionError, ElectionResult, ElectionRules, TiebreakStage, TotalTiePolicy,
};

use crate::args::Args;
use crate::tally::io_gforms::RoleTable;

pub mod io_gforms;

#[derive(Debug, Snafu)]
pub enum TallyError {
    #[snafu(display("Error opening file {path}"))]
    CsvOpen {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Malformed CSV on line {lineno}"))]
    CsvLine { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno} has fewer columns than the header"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("The input has no rows"))]
    EmptyInput {},
    #[snafu(display("No vote columns found (vote headers look like 'Role [Candidate]')"))]
    NoVoteColumns {},
    #[snafu(display("Cannot read '{value}' on line {lineno} as a preference"))]
    BadCell { value: String, lineno: usize },
    #[snafu(display("Role {role} not found in the input"))]
    RoleNotFound { role: String },
    #[snafu(display("Counting failed for role {role}: {source}"))]
    Counting { source: ElectionError, role: String },
    #[snafu(display(""))]
    OpeningJson { source: std::io::Error },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    WritingSummary { source: std::io::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TallyResult<T> = Result<T, TallyError>;

fn rules_for(args: &Args, single_role: bool) -> ElectionRules {
    ElectionRules {
        // Seats and exclusions are meaningful for one role at a time.
        seats: if single_role { args.seats } else { 1 },
        excluded: if single_role {
            args.exclude.clone()
        } else {
            Vec::new()
        },
        total_tie_policy: match args.random_seed {
            Some(seed) => TotalTiePolicy::RandomDraw { seed },
            None => TotalTiePolicy::Fail,
        },
    }
}

pub fn run_tally(args: &Args) -> TallyResult<()> {
    let tables = io_gforms::read_form_csv(&args.input)?;
    let roles: Vec<&String> = tables.iter().map(|t| &t.role).collect();
    info!("Roles found: {:?}", roles);

    let single_role = args.role != "all";
    let selected: Vec<&RoleTable> = if single_role {
        let t = tables
            .iter()
            .find(|t| t.role == args.role)
            .context(RoleNotFoundSnafu {
                role: args.role.clone(),
            })?;
        vec![t]
    } else {
        tables.iter().collect()
    };

    let rules = rules_for(args, single_role);
    let mut summaries: Vec<JSValue> = Vec::new();
    for table in selected {
        info!(
            "Counting role {:?}, candidates: {:?}",
            table.role, table.candidates
        );
        match run_election(&table.ballots, &table.candidates, &rules) {
            Ok(result) => {
                print_transcript(&table.role, &rules, &result);
                summaries.push(result_to_json(&table.role, &result));
            }
            Err(e) if !single_role => {
                // One failing role does not block the others.
                warn!("Counting failed for role {}: {}", table.role, e);
                eprintln!("Role {}: {}", table.role, e);
            }
            Err(e) => {
                return Err(e).context(CountingSnafu {
                    role: table.role.clone(),
                })
            }
        }
    }

    let summary_js = json!({ "elections": summaries });
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    match args.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => fs::write(path, &pretty_js_stats).context(WritingSummarySnafu {})?,
        None => {}
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        let contents = fs::read_to_string(summary_p).context(OpeningJsonSnafu {})?;
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&js).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary");
        }
    }

    Ok(())
}

// The transcript is rebuilt entirely from the returned round stats; nothing
// here re-runs any part of the count.
fn print_transcript(role: &str, rules: &ElectionRules, result: &ElectionResult) {
    println!(
        "Role: {} ({} seat(s), quota {})",
        role, rules.seats, result.quota
    );
    if result.informal_ballots > 0 {
        println!(
            "  Discarded {} informal ballot(s).",
            result.informal_ballots
        );
    }
    for rs in result.round_stats.iter() {
        println!("  Round {}", rs.round);
        for (name, total) in rs.tally.iter() {
            println!("    {:>10} {}", format_total(*total), name);
        }
        if let Some(tb) = &rs.tiebreak {
            println!(
                "    Tie between {} resolved by {}.",
                tb.tied.join(", "),
                describe_stage(tb.stage)
            );
        }
        for name in rs.elected.iter() {
            println!("    {} elected.", name);
        }
        if let Some(name) = &rs.eliminated {
            println!("    {} eliminated.", name);
        }
    }
    println!("  Winners: {}", result.winners.join(", "));
}

fn describe_stage(stage: TiebreakStage) -> String {
    match stage {
        TiebreakStage::PriorRound { round } => format!("the totals of round {}", round),
        TiebreakStage::RawPreference { level } => {
            format!("raw preferences at level {}", level)
        }
        TiebreakStage::RandomDraw => "a seeded random draw".to_string(),
    }
}

// Totals are integral until a surplus transfer happens; print them as whole
// numbers while they are.
fn format_total(total: f64) -> String {
    if total.fract() == 0.0 {
        format!("{}", total as i64)
    } else {
        format!("{:.3}", total)
    }
}

fn stage_to_json(stage: TiebreakStage) -> JSValue {
    match stage {
        TiebreakStage::PriorRound { round } => json!({ "priorRound": round }),
        TiebreakStage::RawPreference { level } => json!({ "rawPreferenceLevel": level }),
        TiebreakStage::RandomDraw => json!("randomDraw"),
    }
}

fn result_to_json(role: &str, result: &ElectionResult) -> JSValue {
    let mut rounds: Vec<JSValue> = Vec::new();
    for round_stat in result.round_stats.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (name, total) in round_stat.tally.iter() {
            tally.insert(name.clone(), json!(total));
        }

        let mut tally_results: Vec<JSValue> = Vec::new();
        for name in round_stat.elected.iter() {
            tally_results.push(json!({ "elected": name }));
        }
        if let Some(name) = &round_stat.eliminated {
            let mut entry: JSMap<String, JSValue> = JSMap::new();
            entry.insert("eliminated".to_string(), json!(name));
            if let Some(tb) = &round_stat.tiebreak {
                entry.insert(
                    "tiebreak".to_string(),
                    json!({ "tied": tb.tied, "stage": stage_to_json(tb.stage) }),
                );
            }
            tally_results.push(JSValue::Object(entry));
        }

        rounds.push(json!({
            "round": round_stat.round,
            "tally": tally,
            "tallyResults": tally_results
        }));
    }
    json!({
        "role": role,
        "quota": result.quota,
        "informalBallots": result.informal_ballots,
        "winners": result.winners,
        "results": rounds
    })
}
