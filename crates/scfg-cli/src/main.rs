//! scfg - restructure and render control flow graphs
//!
//! Usage:
//!   scfg <graph.yaml> restructure     Restructure and print the YAML form
//!   scfg <graph.yaml> render          Print Graphviz DOT (add --restructured)
//!   scfg <graph.yaml> check           Validate the graph and report dead code

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scfg_core::Scfg;
use scfg_render::ScfgRenderer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scfg")]
#[command(about = "Restructure and render control flow graphs", long_about = None)]
struct Cli {
    /// Path to the YAML graph file
    input: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply loop and branch restructuring, print the resulting YAML
    Restructure,
    /// Print the graph in Graphviz DOT format
    Render {
        /// Restructure before rendering
        #[arg(long)]
        restructured: bool,
    },
    /// Parse and validate the graph, flag unreachable blocks
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let mut scfg = Scfg::from_yaml(&text).context("parsing graph")?;

    match cli.command {
        Commands::Restructure => {
            scfg_restructure::restructure(&mut scfg).context("restructuring")?;
            print!("{}", scfg.to_yaml());
        }
        Commands::Render { restructured } => {
            if restructured {
                scfg_restructure::restructure(&mut scfg).context("restructuring")?;
            }
            print!("{}", ScfgRenderer::new(&scfg).render());
        }
        Commands::Check => {
            let head = scfg.find_head().context("finding head")?;
            let unreachable = scfg.unreachable_blocks().context("reachability")?;
            println!("blocks: {}", scfg.len());
            println!("head: {head}");
            if unreachable.is_empty() {
                println!("unreachable: none");
            } else {
                println!("unreachable: {}", unreachable.join(", "));
            }
        }
    }
    Ok(())
}
