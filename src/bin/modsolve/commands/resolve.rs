//! `modsolve resolve` command

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::ResolveArgs;
use modsolve::diagnosis::{report_log_text, ErrorReport};
use modsolve::ops::{format_resolution, resolve_documents, ResolveOptions, ResolveOutcome, ResolveReport};
use modsolve::solver::SelectedMod;
use modsolve::util::diagnostic::{emit, ResolutionFailedError, ResolutionHaltedError};
use modsolve::util::GlobalContext;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum JsonOutcome<'a> {
    Resolved { mods: Vec<SelectedMod> },
    Failed { errors: &'a [ErrorReport] },
    Halted { reason: &'a str },
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    outcome: JsonOutcome<'a>,
    cycles: usize,
    warnings: Vec<String>,
}

pub fn execute(args: ResolveArgs, ctx: &GlobalContext) -> Result<()> {
    let options = ResolveOptions {
        candidates: ctx.find_candidates(args.documents.candidates.as_deref())?,
        overrides: args.documents.overrides,
        config: ctx.load_config(args.config.as_deref())?,
    };

    let run = resolve_documents(&options)?;
    let report = run.report;

    if let ResolveOutcome::Failed(reports) = &report.outcome {
        if let Some(path) = &args.report_log {
            std::fs::write(path, report_log_text(reports))
                .with_context(|| format!("failed to write report log: {}", path.display()))?;
        }
    }

    if args.json {
        print_json(&report)?;
    } else {
        for warning in &report.warnings {
            emit(warning, ctx.color());
        }
        match &report.outcome {
            ResolveOutcome::Resolved(result) => print!("{}", format_resolution(result)),
            ResolveOutcome::Failed(reports) => {
                for failure in reports {
                    emit(&failure.to_diagnostic(), ctx.color());
                    eprintln!();
                }
            }
            ResolveOutcome::Halted { .. } => {}
        }
    }

    match report.outcome {
        ResolveOutcome::Resolved(_) => Ok(()),
        ResolveOutcome::Failed(reports) => Err(ResolutionFailedError {
            count: reports.len(),
        }
        .into()),
        ResolveOutcome::Halted { reason } => Err(ResolutionHaltedError { reason }.into()),
    }
}

fn print_json(report: &ResolveReport) -> Result<()> {
    let outcome = match &report.outcome {
        ResolveOutcome::Resolved(result) => JsonOutcome::Resolved {
            mods: result.selections(),
        },
        ResolveOutcome::Failed(reports) => JsonOutcome::Failed { errors: reports },
        ResolveOutcome::Halted { reason } => JsonOutcome::Halted { reason },
    };
    let json = JsonReport {
        outcome,
        cycles: report.cycles,
        warnings: report.warnings.iter().map(|w| w.message.clone()).collect(),
    };

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
