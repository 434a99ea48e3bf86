//! `modsolve check` command

use anyhow::Result;

use crate::cli::CheckArgs;
use modsolve::ops::{check, format_report, CheckOptions};
use modsolve::util::diagnostic::emit;
use modsolve::util::GlobalContext;

pub fn execute(args: CheckArgs, ctx: &GlobalContext) -> Result<()> {
    let options = CheckOptions {
        candidates: ctx.find_candidates(args.documents.candidates.as_deref())?,
        overrides: args.documents.overrides,
    };

    let report = check(&options)?;
    for warning in &report.warnings {
        emit(warning, ctx.color());
    }
    print!("{}", format_report(&report));

    Ok(())
}
