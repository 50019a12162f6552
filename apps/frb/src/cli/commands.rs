//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::FrbConfig;
use chrono::{DateTime, Utc};
use frb_core::{
    FrbError, Galaxy, IngestOutcome, ObsLogRow, ObsPlanRow, RedshiftRow, Session,
    StatusLabel, Transient, TransientId, primitives::MAX_INGEST_ROWS,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for ingestion (10 MB).
const MAX_INGEST_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum file size for import (256 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), FrbError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| FrbError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(FrbError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, FrbError> {
    let canonical = path.canonicalize().map_err(|e| {
        FrbError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(FrbError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, FrbError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        FrbError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(FrbError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| FrbError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    /// `redb` or `file`.
    pub backend: String,
    pub json_mode: bool,
    pub verbose: bool,
}

impl Context {
    /// A context with the defaults of the command line.
    #[must_use]
    pub fn new(database: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            backend: backend.into(),
            json_mode: false,
            verbose: false,
        }
    }
}

// =============================================================================
// INIT & SEED
// =============================================================================

/// Initialize new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), FrbError> {
    if ctx.database.exists() {
        if !force {
            return Err(FrbError::InvalidInput(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| FrbError::IoError(format!("Remove db: {}", e)))?;
    }

    match ctx.backend.as_str() {
        "redb" => {
            let _session = Session::with_redb(&ctx.database)?;
            println!("Initialized new redb database at {:?}", ctx.database);
        }
        "file" => {
            save_session(&Session::new(), ctx)?;
            println!("Initialized new file database at {:?}", ctx.database);
        }
        other => return Err(unknown_backend(other)),
    }

    Ok(())
}

/// Seed sample criteria and resources from a TOML file.
pub fn cmd_seed(ctx: &Context, config: &Path) -> Result<(), FrbError> {
    let config = FrbConfig::load(&validate_file_path(config)?)?;
    let mut session = load_or_create_session(ctx)?;

    let report = config.seed(&mut session)?;
    save_session(&session, ctx)?;

    if ctx.json_mode {
        return print_json(&report);
    }
    println!(
        "Samples:   {} created, {} unchanged",
        report.samples_created, report.samples_unchanged
    );
    println!(
        "Resources: {} created, {} unchanged",
        report.resources_created, report.resources_unchanged
    );
    Ok(())
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Register a transient with optional comma-separated tags.
pub fn cmd_add_transient(
    ctx: &Context,
    mut transient: Transient,
    tags: Option<&str>,
) -> Result<(), FrbError> {
    if let Some(tags) = tags {
        transient.tags.extend(
            tags.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    let name = transient.name.clone();

    let mut session = load_or_create_session(ctx)?;
    let (id, status) = session.add_transient(transient)?;
    save_session(&session, ctx)?;

    tracing::info!(transient = %name, %status, "Added transient");
    report_status(ctx, &name, status)?;
    if ctx.verbose {
        println!("  id: {}", id);
    }
    Ok(())
}

/// Register a galaxy.
pub fn cmd_add_galaxy(ctx: &Context, galaxy: Galaxy) -> Result<(), FrbError> {
    let name = galaxy.name.clone();
    let mut session = load_or_create_session(ctx)?;
    let id = session.add_galaxy(galaxy)?;
    save_session(&session, ctx)?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({ "galaxy": name, "id": id.0 }));
    }
    println!("Added galaxy {} ({})", name, id);
    Ok(())
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Attach tags.
pub fn cmd_tag(ctx: &Context, name: &str, tags: &str) -> Result<(), FrbError> {
    mutate(ctx, name, |session| session.add_tags(name, tags))
}

/// Detach a tag.
pub fn cmd_untag(ctx: &Context, name: &str, tag: &str) -> Result<(), FrbError> {
    mutate(ctx, name, |session| session.remove_tag(name, tag))
}

/// Record PATH results given as `GALAXY=P_Ox` pairs.
pub fn cmd_path(
    ctx: &Context,
    name: &str,
    candidates: &str,
    pux: Option<f64>,
) -> Result<(), FrbError> {
    let candidates = parse_candidates(candidates)?;
    mutate(ctx, name, |session| {
        session.set_path_results(name, &candidates, pux)
    })
}

/// Assign or clear the host galaxy.
pub fn cmd_host(ctx: &Context, name: &str, galaxy: Option<&str>) -> Result<(), FrbError> {
    mutate(ctx, name, |session| session.assign_host(name, galaxy))
}

/// Parse `G1=0.9, G2=0.05` into candidate pairs.
pub fn parse_candidates(text: &str) -> Result<Vec<(String, f64)>, FrbError> {
    text.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (galaxy, p_ox) = pair.split_once('=').ok_or_else(|| {
                FrbError::InvalidInput(format!("expected GALAXY=P_Ox, got '{}'", pair))
            })?;
            let p_ox = p_ox.trim().parse::<f64>().map_err(|e| {
                FrbError::InvalidInput(format!("P_Ox for '{}': {}", galaxy.trim(), e))
            })?;
            Ok((galaxy.trim().to_string(), p_ox))
        })
        .collect()
}

fn mutate(
    ctx: &Context,
    name: &str,
    op: impl FnOnce(&mut Session) -> Result<StatusLabel, FrbError>,
) -> Result<(), FrbError> {
    let mut session = load_or_create_session(ctx)?;
    let before = session.transient(name)?.1.status;
    let status = op(&mut session)?;
    save_session(&session, ctx)?;

    if before != status {
        tracing::info!(transient = %name, from = %before, to = %status, "Status changed");
    }
    report_status(ctx, name, status)
}

// =============================================================================
// STATUS
// =============================================================================

/// Recompute one status, or all of them.
pub fn cmd_recompute(ctx: &Context, name: Option<&str>) -> Result<(), FrbError> {
    if let Some(name) = name {
        return mutate(ctx, name, |session| session.recompute_status(name));
    }

    let mut session = load_or_create_session(ctx)?;
    let statuses = session.recompute_all()?;
    save_session(&session, ctx)?;
    tracing::info!(count = statuses.len(), "Recomputed all statuses");

    if ctx.json_mode {
        let mut rows = Vec::with_capacity(statuses.len());
        for (id, status) in &statuses {
            let name = transient_name(&session, *id)?;
            rows.push(serde_json::json!({ "transient": name, "status": status.name() }));
        }
        return print_json(&rows);
    }

    println!("Recomputed {} transients", statuses.len());
    if ctx.verbose {
        for (id, status) in &statuses {
            println!("  {:<16} {}", transient_name(&session, *id)?, status);
        }
    }
    Ok(())
}

/// Show per-tag criteria.
pub fn cmd_criteria(ctx: &Context, name: &str) -> Result<(), FrbError> {
    let session = load_or_create_session(ctx)?;
    let criteria = session.evaluate_criteria(name)?;

    if ctx.json_mode {
        return print_json(&criteria);
    }

    println!("Criteria for {}", name);
    println!("=============={}", "=".repeat(name.len()));
    if criteria.is_empty() {
        println!("No tags attached");
        return Ok(());
    }
    for tag in &criteria.tags {
        println!();
        println!("{} (gate {})", tag.sample, gate_state(tag.passes_gate()));
        println!("  bright star:   {}", tag.bright_star);
        println!("  E(B-V) ok:     {}", tag.ebv);
        println!("  public PATH:   {}", tag.run_public_path);
        println!("  P(O|x):        {} (primary {}, n={})", tag.pox, tag.pox_primary, tag.n_pox);
        println!("  P(U|x) high:   {}", tag.pux);
        println!("  deep PATH:     {}", tag.ran_deep_path);
        println!(
            "  redshift:      primary {}, done {}, consistent {}",
            tag.z_primary, tag.z_done, tag.z_consistent
        );
        println!("  too faint:     {}", tag.too_faint);
    }
    Ok(())
}

/// Show one transient.
pub fn cmd_show(ctx: &Context, name: &str) -> Result<(), FrbError> {
    let session = load_or_create_session(ctx)?;
    let (id, transient) = session.transient(name)?;
    let store = session.store();

    let host = match transient.host {
        Some(galaxy) => store.galaxy(galaxy)?.map(|g| g.name),
        None => None,
    };

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "id": id.0,
            "host_name": host,
            "transient": transient,
        }));
    }

    println!("{} ({})", transient.name, id);
    println!("  survey:      {}", transient.survey);
    println!("  position:    {:.5} {:+.5}", transient.ra, transient.dec);
    println!("  DM:          {}", transient.dm);
    println!("  E(B-V):      {}", transient.mw_ebv);
    println!(
        "  tags:        {}",
        transient.tags.iter().cloned().collect::<Vec<_>>().join(",")
    );
    println!("  host:        {}", host.as_deref().unwrap_or("-"));
    println!("  candidates:  {}", transient.path.len());
    if let Some(p_ux) = transient.p_ux {
        println!("  P(U|x):      {}", p_ux);
    }
    println!("  status:      {}", transient.status);
    Ok(())
}

/// Count transients per status.
pub fn cmd_summary(ctx: &Context) -> Result<(), FrbError> {
    let session = load_or_create_session(ctx)?;
    let summary = session.status_summary()?;

    if ctx.json_mode {
        let counts: serde_json::Map<String, serde_json::Value> = summary
            .iter()
            .map(|(label, count)| (label.name().to_string(), serde_json::json!(count)))
            .collect();
        return print_json(&counts);
    }

    println!("FRB Follow-up Summary");
    println!("=====================");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend);
    println!();
    for label in StatusLabel::ALL {
        let count = summary.get(&label).copied().unwrap_or(0);
        if count > 0 || ctx.verbose {
            println!("{:<16} {}", label.name(), count);
        }
    }
    println!("{:<16} {}", "Total", summary.values().sum::<usize>());
    Ok(())
}

// =============================================================================
// INGEST COMMANDS
// =============================================================================

/// Ingest an observing plan.
pub fn cmd_ingest_plan(
    ctx: &Context,
    file: &Path,
    resource: &str,
    override_checks: bool,
) -> Result<(), FrbError> {
    tracing::info!("Ingesting plan from {:?} for {}", file, resource);
    let rows: Vec<ObsPlanRow> = read_rows(file)?;
    let mut session = load_or_create_session(ctx)?;
    let outcome = session.ingest_obsplan(&rows, resource, override_checks);
    save_session(&session, ctx)?;
    report_outcome(ctx, "plan", &outcome)
}

/// Ingest an observing log.
pub fn cmd_ingest_log(
    ctx: &Context,
    file: &Path,
    now: DateTime<Utc>,
    override_checks: bool,
) -> Result<(), FrbError> {
    tracing::info!("Ingesting log from {:?} (now: {})", file, now);
    let rows: Vec<ObsLogRow> = read_rows(file)?;
    let mut session = load_or_create_session(ctx)?;
    let outcome = session.ingest_obslog(&rows, now, override_checks);
    save_session(&session, ctx)?;
    report_outcome(ctx, "log", &outcome)
}

/// Ingest a redshift table.
pub fn cmd_ingest_z(ctx: &Context, file: &Path) -> Result<(), FrbError> {
    tracing::info!("Ingesting redshifts from {:?}", file);
    let rows: Vec<RedshiftRow> = read_rows(file)?;
    let mut session = load_or_create_session(ctx)?;
    let outcome = session.ingest_redshifts(&rows);
    save_session(&session, ctx)?;
    report_outcome(ctx, "redshift", &outcome)
}

/// Read a JSON array of rows.
pub fn read_rows<T: DeserializeOwned>(file: &Path) -> Result<Vec<T>, FrbError> {
    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_INGEST_FILE_SIZE)?;

    let contents = std::fs::read(&validated_path)
        .map_err(|e| FrbError::IoError(format!("Read file: {}", e)))?;
    let rows: Vec<T> = serde_json::from_slice(&contents)
        .map_err(|e| FrbError::SerializationError(format!("Parse rows: {}", e)))?;

    if rows.len() > MAX_INGEST_ROWS {
        return Err(FrbError::InvalidInput(format!(
            "Row count {} exceeds maximum allowed {}",
            rows.len(),
            MAX_INGEST_ROWS
        )));
    }
    Ok(rows)
}

fn report_outcome(ctx: &Context, kind: &str, outcome: &IngestOutcome) -> Result<(), FrbError> {
    if outcome.is_success() {
        tracing::info!(kind, rows = outcome.rows_applied, "Ingest complete");
    } else {
        tracing::warn!(
            kind,
            code = outcome.code,
            rows = outcome.rows_applied,
            "Ingest stopped: {}",
            outcome.message
        );
    }

    if ctx.json_mode {
        print_json(outcome)?;
    } else {
        println!(
            "[{}] {} ({} rows applied)",
            outcome.code, outcome.message, outcome.rows_applied
        );
    }

    if outcome.is_success() {
        Ok(())
    } else {
        Err(FrbError::InvalidInput(format!(
            "{} ingest failed with code {}: {}",
            kind, outcome.code, outcome.message
        )))
    }
}

// =============================================================================
// EXPORT & IMPORT
// =============================================================================

/// Export the catalog snapshot.
pub fn cmd_export(ctx: &Context, output: &Path) -> Result<(), FrbError> {
    let validated_output = validate_output_path(output)?;
    let session = load_or_create_session(ctx)?;

    let data = session.to_bytes()?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| FrbError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Import a catalog snapshot into an empty database.
pub fn cmd_import(ctx: &Context, input: &Path) -> Result<(), FrbError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| FrbError::IoError(format!("Read file: {}", e)))?;

    let mut session = load_or_create_session(ctx)?;
    session.import_bytes(&data)?;
    save_session(&session, ctx)?;

    let count = session.store().transient_ids()?.len();
    println!("Imported catalog: {} transients", count);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Load or create a session from the database path with the chosen backend.
pub fn load_or_create_session(ctx: &Context) -> Result<Session, FrbError> {
    match ctx.backend.as_str() {
        "redb" => Session::with_redb(&ctx.database),
        "file" => {
            if ctx.database.exists() {
                validate_file_size(&ctx.database, MAX_IMPORT_FILE_SIZE)?;
                let data = std::fs::read(&ctx.database)
                    .map_err(|e| FrbError::IoError(format!("Read db: {}", e)))?;
                Session::from_bytes(&data)
            } else {
                Ok(Session::new())
            }
        }
        other => Err(unknown_backend(other)),
    }
}

/// Save a session to the database path.
pub fn save_session(session: &Session, ctx: &Context) -> Result<(), FrbError> {
    if session.is_persistent() {
        // Redb backend - already persisted
        return Ok(());
    }
    let data = session.to_bytes()?;
    std::fs::write(&ctx.database, &data)
        .map_err(|e| FrbError::IoError(format!("Write db: {}", e)))
}

fn unknown_backend(backend: &str) -> FrbError {
    FrbError::InvalidInput(format!("Unknown backend: {}. Use: redb, file", backend))
}

fn transient_name(session: &Session, id: TransientId) -> Result<String, FrbError> {
    Ok(session
        .store()
        .transient(id)?
        .map(|t| t.name)
        .unwrap_or_else(|| id.to_string()))
}

fn report_status(ctx: &Context, name: &str, status: StatusLabel) -> Result<(), FrbError> {
    if ctx.json_mode {
        return print_json(&serde_json::json!({ "transient": name, "status": status.name() }));
    }
    println!("{}: {}", name, status);
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), FrbError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FrbError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn gate_state(open: bool) -> &'static str {
    if open { "open" } else { "closed" }
}
