//! Standalone CLI tool for dumping an application's accessibility tree.

use std::process::ExitCode;

use clap::Parser;
use uiax_cli::{init_logging, report, shutdown, ScopeArgs};
use uiax_core::tree;
use uiax_core::{CancelToken, Finder, UiaxError};

#[derive(Parser)]
#[command(name = "uiax-tree", about = "Print an application's accessibility tree")]
struct Args {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Maximum tree depth (0 = unlimited)
    #[arg(long, default_value = "0")]
    depth: usize,

    /// Emit a JSON snapshot instead of the box-drawn tree
    #[arg(long)]
    json: bool,

    /// Compact JSON output (no pretty-printing)
    #[arg(long, requires = "json")]
    compact: bool,

    /// Debug logging on stderr
    #[arg(long, short)]
    verbose: bool,
}

fn render(args: &Args, finder: &Finder) -> Result<String, UiaxError> {
    let root = args.scope.resolve(finder)?;
    let cancel = CancelToken::new();

    if !args.json {
        return tree::print_tree(&root, args.depth, &cancel);
    }
    let snap = tree::snapshot(&root, args.depth, &cancel)?;
    log::debug!("captured {} nodes", snap.node_count());
    let json = if args.compact {
        serde_json::to_string(&snap)
    } else {
        serde_json::to_string_pretty(&snap)
    };
    json.map_err(|e| UiaxError::generic(-1, format!("JSON serialization failed: {e}")))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let finder = match Finder::new() {
        Ok(finder) => finder,
        Err(e) => return report("uiax-tree", &e),
    };
    let result = render(&args, &finder);
    shutdown(finder);

    match result {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => report("uiax-tree", &e),
    }
}
