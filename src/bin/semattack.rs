use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use semattack::analysis::{CombinedAnalysis, Verdict};
use semattack::attack::AttackContext;
use semattack::depgraph;
use semattack::evaluator::{CancellationToken, EvalConfig};

/// Contexts checked when none are given on the command line.
const DEFAULT_CONTEXTS: [AttackContext; 4] = [
    AttackContext::Html,
    AttackContext::HtmlAttr,
    AttackContext::JavaScript,
    AttackContext::Url,
];

#[derive(Parser)]
#[command(author, version, about = "Detect XSS bypasses in sanitizer dependency graphs")]
struct Cli {
    /// Dependency graph file (plain text node/edge format)
    depgraph: PathBuf,

    /// The untrusted input field to analyze
    field: String,

    /// Attack context to check; may be repeated (default: Html, HtmlAttr,
    /// JavaScript, Url)
    #[arg(long = "context", value_name = "CONTEXT")]
    contexts: Vec<String>,

    /// Directory for DOT and witness output
    #[arg(long, value_name = "DIR")]
    outdir: Option<PathBuf>,

    /// Widening threshold for cyclic graphs
    #[arg(long, value_name = "INT", default_value_t = 3)]
    widening_threshold: usize,

    /// Abort once an automaton exceeds this many states
    #[arg(long, value_name = "INT", default_value_t = 100_000)]
    max_states: usize,

    /// Log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> Result<Verdict> {
    let text = std::fs::read_to_string(&cli.depgraph)
        .wrap_err_with(|| format!("cannot read {}", cli.depgraph.display()))?;
    let graph = depgraph::parse(&text).wrap_err("cannot load dependency graph")?;
    log::info!(
        "loaded dependency graph with {} nodes from {}",
        graph.num_nodes(),
        cli.depgraph.display()
    );

    let contexts: Vec<AttackContext> = if cli.contexts.is_empty() {
        DEFAULT_CONTEXTS.to_vec()
    } else {
        cli.contexts
            .iter()
            .map(|s| s.parse())
            .collect::<semattack::Result<_>>()?
    };

    let config = EvalConfig {
        widening_threshold: cli.widening_threshold,
        max_states: cli.max_states,
        ..EvalConfig::default()
    };

    let mut combined = CombinedAnalysis::run(&graph, &cli.field, None, config, CancellationToken::new())?;
    log::info!(
        "post-image at sink: {} states",
        combined.forward().post_image().num_states()
    );

    for context in contexts {
        let result = combined.add_backward_analysis(&graph, context)?;
        match result.backward() {
            Some(backward) if backward.is_vulnerable() => {
                let witness = backward.witness().unwrap_or_default();
                println!(
                    "{}: {} (witness: {:?})",
                    result.name(),
                    result.verdict(),
                    String::from_utf8_lossy(&witness)
                );
            }
            _ => println!("{}: {}", result.name(), result.verdict()),
        }
    }

    if let Some(outdir) = &cli.outdir {
        combined
            .write_results(outdir)
            .wrap_err_with(|| format!("cannot write results to {}", outdir.display()))?;
        log::info!("results written to {}", outdir.display());
    }

    Ok(combined.overall_verdict())
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Warn,
        1 => simplelog::LevelFilter::Info,
        _ => simplelog::LevelFilter::Debug,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    match run(&cli) {
        Ok(Verdict::Safe) => Ok(ExitCode::SUCCESS),
        Ok(Verdict::Vulnerable) => Ok(ExitCode::from(1)),
        // Out of resources: neither safe nor provably vulnerable.
        Ok(Verdict::Unknown) => Ok(ExitCode::from(2)),
        Err(e) => {
            log::error!("{:#}", e);
            Ok(ExitCode::from(2))
        }
    }
}
