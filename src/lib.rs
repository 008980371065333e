pub mod aggregate;
pub mod analyse;
pub mod client;
pub mod contract;
pub mod harvest;
pub mod load_config;
pub mod sink;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use analyse::analyse;
use client::GithubHost;
use load_config::load_config;
use sink::CsvSink;

#[derive(Parser)]
#[clap(
    name = "repo-metrics",
    version,
    about = "Harvest commit/PR/issue activity from a GitHub repository into per-developer CSV metrics"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest and aggregate one repository using the given config file
    Analyse {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Analyse { config } => {
            let loaded = load_config(config)?;
            let host = GithubHost::new(loaded.token)?;
            let sink = CsvSink::new(&loaded.analyse.output_dir);
            println!("Analyse starting...");
            match analyse(&loaded.analyse, &host, &sink).await {
                Ok(report) => {
                    println!("Analyse complete.\nReport:");
                    println!("{report:#?}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Analysis failed: {e}");
                    Err(e.into())
                }
            }
        }
    }
}
