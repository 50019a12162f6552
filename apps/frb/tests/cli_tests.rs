//! Integration tests for the CLI commands against both storage backends.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use frb::cli::{
    Cli, Commands, Context, cmd_add_galaxy, cmd_add_transient, cmd_export, cmd_host, cmd_import,
    cmd_ingest_log, cmd_ingest_plan, cmd_init, cmd_path, cmd_seed, cmd_tag,
    load_or_create_session, parse_candidates, read_rows,
};
use frb_core::{FrbError, Galaxy, ObsPlanRow, Photometry, StatusLabel, Transient};
use std::path::Path;
use tempfile::{TempDir, tempdir};

const CONFIG: &str = r#"
[[samples]]
name = "CRAFT-ICS"
min_pox = 0.8
max_ebv = 0.3
max_mr = 23.5
run_public_path = true
apply_bright_star = true

[[resources]]
name = "Keck-LRIS-2024A"
instrument = "Keck-LRIS"
valid_start = "2024-02-01T00:00:00Z"
valid_stop = "2024-07-31T23:59:59Z"
num_targ_longslit = 12
"#;

const FRB: &str = "FRB20230718A";
const HOST: &str = "J083036-402755";

fn setup(backend: &str) -> (TempDir, Context) {
    let dir = tempdir().unwrap();
    let ctx = Context::new(dir.path().join("frb.db"), backend);
    cmd_init(&ctx, false).unwrap();
    let config = dir.path().join("frb.toml");
    std::fs::write(&config, CONFIG).unwrap();
    cmd_seed(&ctx, &config).unwrap();
    (dir, ctx)
}

fn status(ctx: &Context) -> StatusLabel {
    load_or_create_session(ctx).unwrap().transient(FRB).unwrap().1.status
}

fn write_json(dir: &Path, name: &str, value: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    path
}

/// Walk one transient from registration to a pending spectrum.
fn campaign(backend: &str) {
    let (dir, ctx) = setup(backend);

    let mut transient = Transient::new(FRB, "CRAFT", 128.68, -40.45);
    transient.mw_ebv = 0.1;
    cmd_add_transient(&ctx, transient, Some("CRAFT-ICS")).unwrap();
    assert_eq!(status(&ctx), StatusLabel::RunPublicPath);

    cmd_add_galaxy(
        &ctx,
        Galaxy::new(HOST, 128.65, -40.46).with_photometry(Photometry::new(
            "Blanco-DECam",
            "r",
            21.2,
        )),
    )
    .unwrap();
    cmd_path(&ctx, FRB, &format!("{}=0.95", HOST), Some(0.01)).unwrap();
    cmd_host(&ctx, FRB, Some(HOST)).unwrap();
    assert_eq!(status(&ctx), StatusLabel::NeedSpectrum);

    let plan = write_json(
        dir.path(),
        "plan.json",
        serde_json::json!([{ "TNS": FRB, "Resource": "Keck-LRIS-2024A", "mode": "longslit" }]),
    );
    cmd_ingest_plan(&ctx, &plan, "Keck-LRIS-2024A", false).unwrap();
    assert_eq!(status(&ctx), StatusLabel::SpectrumPending);
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from(["frb", "-D", "x.db", "-B", "file", "--json", "summary"]).unwrap();
    assert_eq!(cli.database, Path::new("x.db"));
    assert_eq!(cli.backend, "file");
    assert!(cli.json_mode);
    assert!(matches!(cli.command, Some(Commands::Summary)));
}

#[test]
fn test_parse_negative_declination() {
    let cli = Cli::try_parse_from([
        "frb",
        "add-transient",
        FRB,
        "CRAFT",
        "128.68",
        "-40.45",
        "--tags",
        "CRAFT-ICS",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::AddTransient { dec, tags, .. }) => {
            assert_eq!(dec, -40.45);
            assert_eq!(tags.as_deref(), Some("CRAFT-ICS"));
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_parse_log_reference_time() {
    let cli = Cli::try_parse_from([
        "frb",
        "ingest-log",
        "-f",
        "log.json",
        "--now",
        "2024-08-01T00:00:00Z",
        "--override",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::IngestLog {
            now,
            override_checks,
            ..
        }) => {
            assert_eq!(now.unwrap().to_rfc3339(), "2024-08-01T00:00:00+00:00");
            assert!(override_checks);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_parse_candidates() {
    let pairs = parse_candidates("J1=0.9, J2=0.05,").unwrap();
    assert_eq!(
        pairs,
        vec![("J1".to_string(), 0.9), ("J2".to_string(), 0.05)]
    );
    assert!(matches!(
        parse_candidates("J1:0.9"),
        Err(FrbError::InvalidInput(_))
    ));
    assert!(matches!(
        parse_candidates("J1=high"),
        Err(FrbError::InvalidInput(_))
    ));
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_campaign_file_backend() {
    campaign("file");
}

#[test]
fn test_campaign_redb_backend() {
    campaign("redb");
}

#[test]
fn test_init_refuses_existing_database() {
    let (_dir, ctx) = setup("file");
    assert!(matches!(cmd_init(&ctx, false), Err(FrbError::InvalidInput(_))));
    cmd_init(&ctx, true).unwrap();
    let session = load_or_create_session(&ctx).unwrap();
    assert!(session.store().sample_names().unwrap().is_empty());
}

#[test]
fn test_unknown_backend_rejected() {
    let dir = tempdir().unwrap();
    let ctx = Context::new(dir.path().join("frb.db"), "sqlite");
    assert!(matches!(
        load_or_create_session(&ctx),
        Err(FrbError::InvalidInput(_))
    ));
}

#[test]
fn test_unknown_tag_rejected() {
    let (_dir, ctx) = setup("file");
    cmd_add_transient(&ctx, Transient::new(FRB, "CRAFT", 1.0, 2.0), None).unwrap();
    assert!(matches!(
        cmd_tag(&ctx, FRB, "MeerTRAP"),
        Err(FrbError::ConfigurationMissing(_))
    ));
}

#[test]
fn test_failed_ingest_reports_error_and_keeps_state() {
    let (dir, ctx) = setup("file");
    cmd_add_transient(&ctx, Transient::new(FRB, "CRAFT", 1.0, 2.0), Some("CRAFT-ICS")).unwrap();

    let log = write_json(
        dir.path(),
        "log.json",
        serde_json::json!([{
            "TNS": FRB,
            "Resource": "Keck-LRIS-2024A",
            "mode": "longslit",
            "date": "2024-03-01T10:00:00Z",
            "success": true
        }]),
    );
    let now = chrono::DateTime::from_timestamp(1_725_000_000, 0).unwrap();

    let err = cmd_ingest_log(&ctx, &log, now, false).unwrap_err();

    assert!(err.to_string().contains("403"));
    assert_eq!(status(&ctx), StatusLabel::RunPublicPath);
}

#[test]
fn test_read_rows_rejects_malformed_json() {
    let dir = tempdir().unwrap();
    let path = write_json(dir.path(), "plan.json", serde_json::json!([{ "TNS": FRB }]));
    assert!(matches!(
        read_rows::<ObsPlanRow>(&path),
        Err(FrbError::SerializationError(_))
    ));
}

#[test]
fn test_export_then_import_across_backends() {
    let (dir, ctx) = setup("file");
    cmd_add_transient(&ctx, Transient::new(FRB, "CRAFT", 1.0, 2.0), Some("CRAFT-ICS")).unwrap();
    let snapshot = dir.path().join("catalog.frbc");
    cmd_export(&ctx, &snapshot).unwrap();

    let target = Context::new(dir.path().join("copy.redb"), "redb");
    cmd_import(&target, &snapshot).unwrap();

    assert_eq!(status(&target), StatusLabel::RunPublicPath);
    // A second import into a non-empty catalog is refused
    assert!(cmd_import(&target, &snapshot).is_err());
}
