//! # FRB CLI Module
//!
//! This module implements the CLI interface for the follow-up engine.
//!
//! ## Available Commands
//!
//! - `init` - Initialize new database
//! - `seed` - Seed sample criteria and resources from a TOML file
//! - `add-transient` / `add-galaxy` - Register objects
//! - `tag` / `untag` - Manage sample tags
//! - `path` / `host` - Record PATH results and the host galaxy
//! - `recompute` - Refresh statuses
//! - `criteria` / `show` / `summary` - Inspect the catalog
//! - `ingest-plan` / `ingest-log` / `ingest-z` - Bulk ingestion from JSON
//! - `export` / `import` - Catalog snapshot files

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use frb_core::FrbError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// FRB follow-up status engine
///
/// Tracks every FRB from localization through host association, imaging and
/// spectroscopy to a secure redshift.
#[derive(Parser, Debug)]
#[command(name = "frb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the catalog database
    #[arg(short = 'D', long, global = true, default_value = "frb.db")]
    pub database: PathBuf,

    /// Storage backend: "file" (snapshot file) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Seed sample criteria and follow-up resources from a TOML file
    Seed {
        /// Path to the configuration file
        #[arg(short, long, default_value = "frb.toml")]
        config: PathBuf,
    },

    /// Register a new FRB transient
    AddTransient {
        /// TNS name, e.g. FRB20230718A
        name: String,
        /// Discovering survey
        survey: String,
        /// Right ascension (deg)
        ra: f64,
        /// Declination (deg)
        #[arg(allow_hyphen_values = true)]
        dec: f64,

        /// Localization semi-major axis (arcsec)
        #[arg(long, default_value = "0")]
        a_err: f64,

        /// Localization semi-minor axis (arcsec)
        #[arg(long, default_value = "0")]
        b_err: f64,

        /// Localization position angle (deg)
        #[arg(long, default_value = "0")]
        theta: f64,

        /// Dispersion measure (pc cm^-3)
        #[arg(long, default_value = "0")]
        dm: f64,

        /// Galactic E(B-V)
        #[arg(long, default_value = "0")]
        ebv: f64,

        /// Bright-star flag (unset means not yet checked)
        #[arg(long)]
        bright_star: Option<bool>,

        /// Comma-separated sample tags
        #[arg(short, long)]
        tags: Option<String>,
    },

    /// Register a candidate host galaxy
    AddGalaxy {
        /// Galaxy name, e.g. J083036-402755
        name: String,
        /// Right ascension (deg)
        ra: f64,
        /// Declination (deg)
        #[arg(allow_hyphen_values = true)]
        dec: f64,

        /// r-band magnitude
        #[arg(long, requires = "instrument")]
        mag: Option<f64>,

        /// Telescope-instrument of the photometry, e.g. Blanco-DECam
        #[arg(long)]
        instrument: Option<String>,

        /// Photometric band
        #[arg(long, default_value = "r")]
        band: String,

        /// Redshift
        #[arg(long, requires = "z_source")]
        z: Option<f64>,

        /// Redshift source, e.g. Keck-LRIS-2024A
        #[arg(long)]
        z_source: Option<String>,
    },

    /// Attach sample tags to a transient
    Tag {
        /// TNS name
        name: String,
        /// Comma-separated tags
        tags: String,
    },

    /// Detach a sample tag from a transient
    Untag {
        /// TNS name
        name: String,
        /// Tag to remove
        tag: String,
    },

    /// Record PATH results
    Path {
        /// TNS name
        name: String,

        /// Candidates as GALAXY=P_Ox pairs, comma-separated
        #[arg(short, long)]
        candidates: String,

        /// P(U|x), the unseen-host probability
        #[arg(long)]
        pux: Option<f64>,
    },

    /// Assign (or clear) the preferred host galaxy
    Host {
        /// TNS name
        name: String,

        /// Galaxy name; omit to clear
        galaxy: Option<String>,
    },

    /// Recompute one transient's status, or every status
    Recompute {
        /// TNS name; omit to recompute all
        name: Option<String>,
    },

    /// Show the per-tag criteria of a transient
    Criteria {
        /// TNS name
        name: String,
    },

    /// Show a transient
    Show {
        /// TNS name
        name: String,
    },

    /// Count transients per status
    Summary,

    /// Ingest an observing plan (JSON rows)
    IngestPlan {
        /// Path to the JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Resource the plan is for
        #[arg(short, long)]
        resource: String,

        /// Skip the status prerequisites
        #[arg(long = "override")]
        override_checks: bool,
    },

    /// Ingest an observing log (JSON rows)
    IngestLog {
        /// Path to the JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Reference time for validity windows (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Skip the status prerequisites
        #[arg(long = "override")]
        override_checks: bool,
    },

    /// Ingest a redshift table (JSON rows)
    IngestZ {
        /// Path to the JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export the catalog snapshot
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import a catalog snapshot into an empty database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), FrbError> {
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        json_mode: cli.json_mode,
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Seed { config }) => cmd_seed(&ctx, &config),
        Some(Commands::AddTransient {
            name,
            survey,
            ra,
            dec,
            a_err,
            b_err,
            theta,
            dm,
            ebv,
            bright_star,
            tags,
        }) => {
            let mut transient = frb_core::Transient::new(name, survey, ra, dec);
            transient.a_err = a_err;
            transient.b_err = b_err;
            transient.theta = theta;
            transient.dm = dm;
            transient.mw_ebv = ebv;
            transient.bright_star = bright_star;
            cmd_add_transient(&ctx, transient, tags.as_deref())
        }
        Some(Commands::AddGalaxy {
            name,
            ra,
            dec,
            mag,
            instrument,
            band,
            z,
            z_source,
        }) => {
            let mut galaxy = frb_core::Galaxy::new(name, ra, dec);
            if let (Some(mag), Some(instrument)) = (mag, instrument) {
                galaxy = galaxy.with_photometry(frb_core::Photometry::new(instrument, band, mag));
            }
            if let (Some(z), Some(source)) = (z, z_source) {
                galaxy = galaxy.with_redshift(z, source);
            }
            cmd_add_galaxy(&ctx, galaxy)
        }
        Some(Commands::Tag { name, tags }) => cmd_tag(&ctx, &name, &tags),
        Some(Commands::Untag { name, tag }) => cmd_untag(&ctx, &name, &tag),
        Some(Commands::Path {
            name,
            candidates,
            pux,
        }) => cmd_path(&ctx, &name, &candidates, pux),
        Some(Commands::Host { name, galaxy }) => cmd_host(&ctx, &name, galaxy.as_deref()),
        Some(Commands::Recompute { name }) => cmd_recompute(&ctx, name.as_deref()),
        Some(Commands::Criteria { name }) => cmd_criteria(&ctx, &name),
        Some(Commands::Show { name }) => cmd_show(&ctx, &name),
        Some(Commands::IngestPlan {
            file,
            resource,
            override_checks,
        }) => cmd_ingest_plan(&ctx, &file, &resource, override_checks),
        Some(Commands::IngestLog {
            file,
            now,
            override_checks,
        }) => cmd_ingest_log(&ctx, &file, now.unwrap_or_else(Utc::now), override_checks),
        Some(Commands::IngestZ { file }) => cmd_ingest_z(&ctx, &file),
        Some(Commands::Export { output }) => cmd_export(&ctx, &output),
        Some(Commands::Import { input }) => cmd_import(&ctx, &input),
        Some(Commands::Summary) | None => {
            // No subcommand - show the summary by default
            cmd_summary(&ctx)
        }
    }
}
