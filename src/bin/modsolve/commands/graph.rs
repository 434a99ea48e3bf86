//! `modsolve graph` command
//!
//! Dumps the rule/option graph of the first failed solve, for replay in
//! tests or inspection by other tools.

use anyhow::{bail, Context, Result};

use crate::cli::GraphArgs;
use modsolve::ops::{resolve_documents, ResolveOptions};
use modsolve::util::GlobalContext;

pub fn execute(args: GraphArgs, ctx: &GlobalContext) -> Result<()> {
    let options = ResolveOptions {
        candidates: ctx.find_candidates(args.documents.candidates.as_deref())?,
        overrides: args.documents.overrides,
        config: ctx.load_config(args.config.as_deref())?,
    };

    let run = resolve_documents(&options)?;
    let Some(graph) = run.graph else {
        bail!("the mod set resolved; there is no failure to graph");
    };

    let json = serde_json::to_string_pretty(&graph)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write graph: {}", path.display()))?,
        None => println!("{}", json),
    }

    Ok(())
}
