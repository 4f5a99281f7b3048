//! Standalone CLI tool for locating elements by role, name, title or value.
//!
//! Prints one line per match, or a JSON array with `--json`.  Exits `2`
//! when nothing matched (or `--wait` ran out), `3` without accessibility
//! permission.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use uiax_cli::{init_logging, report, shutdown, ScopeArgs, SelectorArgs};
use uiax_core::tree::{self, ElementSnapshot};
use uiax_core::{CancelToken, Element, Finder, Selector, UiaxError};

#[derive(Parser)]
#[command(name = "uiax-find", about = "Find UI elements matching a set of predicates")]
struct Args {
    #[command(flatten)]
    scope: ScopeArgs,

    #[command(flatten)]
    selector: SelectorArgs,

    /// Print every match instead of the first
    #[arg(long, conflicts_with = "wait")]
    all: bool,

    /// Poll up to this many milliseconds for the first match
    #[arg(long, value_name = "MS")]
    wait: Option<u64>,

    /// Emit JSON snapshots
    #[arg(long)]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, short)]
    verbose: bool,
}

fn search(args: &Args, finder: &Finder, selector: &Selector) -> Result<String, UiaxError> {
    let cancel = CancelToken::new();

    let found: Vec<Arc<Element>> = if let Some(ms) = args.wait {
        vec![args.scope.wait_for(finder, selector, Duration::from_millis(ms), &cancel)?]
    } else {
        let root = if args.scope.is_focused() {
            None
        } else {
            Some(args.scope.resolve(finder)?)
        };
        if args.all {
            finder.find_all_in(root.as_ref(), selector, &cancel)?
        } else {
            vec![finder.find_in(root.as_ref(), selector, &cancel)?]
        }
    };

    if args.json {
        let snaps: Vec<ElementSnapshot> = found
            .iter()
            .map(|e| tree::snapshot(e, 1, &cancel))
            .collect::<Result<_, _>>()?;
        return serde_json::to_string_pretty(&snaps)
            .map_err(|e| UiaxError::generic(-1, format!("JSON serialization failed: {e}")));
    }
    Ok(found
        .iter()
        .map(|e| format!("{}\t{}: {} [{}]", e.id(), e.role(), e.label(), e.bounds()))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let selector = match args.selector.to_selector() {
        Ok(selector) => selector,
        Err(e) => return report("uiax-find", &e),
    };
    log::debug!("selector: {selector:?}");

    let finder = match Finder::new() {
        Ok(finder) => finder,
        Err(e) => return report("uiax-find", &e),
    };
    let result = search(&args, &finder, &selector);
    shutdown(finder);

    match result {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => report("uiax-find", &e),
    }
}
