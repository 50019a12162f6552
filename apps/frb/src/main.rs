//! # frb - FRB Follow-up Status Engine
//!
//! The main binary for tracking Fast Radio Burst host-galaxy follow-up.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              apps/frb (THE BINARY)          │
//! │                                             │
//! │  ┌─────────────┐        ┌───────────────┐   │
//! │  │    CLI      │        │  TOML config  │   │
//! │  │   (clap)    │        │    (seed)     │   │
//! │  └──────┬──────┘        └───────┬───────┘   │
//! │         └───────────┬───────────┘           │
//! │                     ▼                       │
//! │             ┌───────────────┐               │
//! │             │   frb-core    │               │
//! │             │  (THE LOGIC)  │               │
//! │             └───────────────┘               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! frb init
//! frb seed -c frb.toml
//! frb add-transient FRB20230718A CRAFT 128.68 -40.45 --tags CRAFT-ICS
//! frb ingest-plan -f plan.json -r Keck-LRIS-2024A
//! frb summary
//! ```

use clap::Parser;
use frb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // FRB_LOG sets the filter; FRB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("FRB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("FRB_LOG")
        .unwrap_or_else(|_| "frb=info,frb_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  FRB follow-up v{}
  host association | imaging | spectroscopy | redshift
"#,
        env!("CARGO_PKG_VERSION")
    );
}
