use super::*;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use pressup_core::{CoreUpdateOffer, ErrorData, ErrorEntry, OfferedPackages, UpgradeError};
use pressup_upgrader::{
    maintenance, unix_now, FileLockStore, LockManager, MaintenanceFlag, MaintenanceStatus,
    CORE_UPDATER_LOCK,
};

use crate::commands::{format_maintenance_line, format_offer_lines, format_verify_lines, select_offer};
use crate::render::{format_error_lines, output_style_for, render_status_line, OutputStyle};

fn install_root(dir: &Path) -> PathBuf {
    let root = dir.join("site");
    fs::create_dir_all(root.join("wp-content")).expect("must create content dir");
    fs::create_dir_all(root.join("wp-includes")).expect("must create includes dir");
    fs::write(
        root.join("wp-includes").join("version.php"),
        "<?php\n$cp_version = '1.0.0';\n$wp_version = '4.9.15';\n",
    )
    .expect("must write version file");
    root
}

fn direct_config(root: &Path) -> PressupConfig {
    PressupConfig {
        root: root.to_path_buf(),
        method: Some("direct".to_string()),
        report_stats: false,
        ..PressupConfig::default()
    }
}

fn offer(response: &str, version: &str, full: Option<&str>) -> CoreUpdateOffer {
    CoreUpdateOffer {
        response: response.to_string(),
        version: version.to_string(),
        packages: OfferedPackages {
            full: full.map(str::to_string),
            ..OfferedPackages::default()
        },
        ..CoreUpdateOffer::default()
    }
}

#[test]
fn cli_parses_upgrade_flags() {
    let cli = Cli::try_parse_from([
        "pressup",
        "--root",
        "/srv/site",
        "upgrade",
        "--offer",
        "offer.json",
        "--attempt-rollback",
        "--no-checksum-precheck",
    ])
    .expect("command must parse");

    assert_eq!(cli.root.as_deref(), Some(Path::new("/srv/site")));
    match cli.command {
        Commands::Upgrade {
            offer,
            attempt_rollback,
            reinstall,
            no_checksum_precheck,
        } => {
            assert_eq!(offer.as_deref(), Some(Path::new("offer.json")));
            assert!(attempt_rollback);
            assert!(!reinstall);
            assert!(no_checksum_precheck);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_counts_verbose_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["pressup", "verify", "-vv"]).expect("command must parse");
    assert_eq!(cli.verbose, 2);
    assert!(matches!(cli.command, Commands::Verify));
}

#[test]
fn cli_parses_maintenance_actions() {
    let cli =
        Cli::try_parse_from(["pressup", "maintenance", "clear"]).expect("command must parse");
    match cli.command {
        Commands::Maintenance { action } => assert_eq!(action, MaintenanceAction::Clear),
        other => panic!("unexpected command: {other:?}"),
    }

    Cli::try_parse_from(["pressup", "maintenance"])
        .expect_err("missing maintenance action must fail");
}

#[test]
fn cli_rejects_completions_without_shell() {
    let err = Cli::try_parse_from(["pressup", "completions"])
        .expect_err("missing shell argument must fail");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn completions_script_names_the_binary() {
    let mut output = Vec::new();
    write_completions_script(clap_complete::Shell::Bash, &mut output)
        .expect("must generate completions");
    let script = String::from_utf8(output).expect("script must be utf-8");
    assert!(script.contains("pressup"));
    assert!(script.contains("auto-update"));
}

#[test]
fn config_defaults_apply_to_empty_file() {
    let config = PressupConfig::parse("").expect("empty config must parse");
    assert_eq!(config, PressupConfig::default());
    assert_eq!(config.content_dir, "wp-content");
    assert_eq!(config.fallback_method, "ftpext");
    assert_eq!(config.locale, "en_US");
    assert_eq!(config.http_timeout_secs, 300);
    assert!(config.report_stats);
    assert_eq!(config.environment.php_extensions, vec!["json".to_string()]);
}

#[test]
fn config_maps_into_engine_settings() {
    let config = PressupConfig::parse(
        r#"
root = "/srv/site"
content_dir = "content"
state_dir = "/var/lib/pressup"
locale = "de_DE"
background = true
skip_new_bundled = true
auto_update = "minor"

[environment]
php_version = "7.4.3"
mysql_version = "5.7.30"
php_extensions = ["json", "zip"]
is_mysql = false

[signatures]
trusted_keys = ["abcd"]
required = true
"#,
    )
    .expect("config must parse");

    let layout = config.layout();
    assert_eq!(layout.root(), Path::new("/srv/site"));
    assert_eq!(layout.content_dir(), Path::new("/srv/site/content"));
    assert_eq!(layout.state_dir(), Path::new("/var/lib/pressup"));

    let settings = config.settings();
    assert_eq!(settings.locale, "de_DE");
    assert!(settings.background);
    assert!(settings.skip_new_bundled);
    assert!(settings.signatures.required);
    assert_eq!(settings.signatures.trusted_keys, vec!["abcd".to_string()]);

    let environment = config.environment();
    assert_eq!(environment.php_version, "7.4.3");
    assert_eq!(environment.mysql_version, "5.7.30");
    assert!(!environment.is_mysql);
    assert_eq!(environment.php_extensions.len(), 2);

    let policy = config.auto_update_policy();
    assert!(policy.minor);
    assert!(!policy.major);
}

#[test]
fn config_rejects_invalid_values() {
    let err = PressupConfig::parse("colour = true").expect_err("unknown key must fail");
    assert!(format!("{err:#}").contains("unknown field"));

    let err = PressupConfig::parse("content_dir = \"a/b\"").expect_err("nested dir must fail");
    assert!(err.to_string().contains("single directory name"));

    let err = PressupConfig::parse("[signatures]\nrequired = true")
        .expect_err("required signatures without keys must fail");
    assert!(err.to_string().contains("trusted_keys"));
}

#[test]
fn config_resolves_relative_root_against_file() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let path = dir.path().join("pressup.toml");
    fs::write(&path, "root = \"public\"\n").expect("must write config");

    let config = PressupConfig::load(&path).expect("config must load");
    assert_eq!(config.root, dir.path().join("public"));

    let overridden = PressupConfig::load_for_cli(Some(path.as_path()), Some(Path::new("/srv/other")))
        .expect("config must load");
    assert_eq!(overridden.root, PathBuf::from("/srv/other"));
}

#[test]
fn config_reports_missing_explicit_file() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let err = PressupConfig::load_for_cli(Some(dir.path().join("missing.toml").as_path()), None)
        .expect_err("missing config must fail");
    assert!(err.to_string().contains("failed reading config"));
}

#[test]
fn config_loads_manifest_override() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = PressupConfig {
        manifests: Some(dir.path().join("missing-manifests.toml")),
        ..PressupConfig::default()
    };
    let err = config.manifests().expect_err("missing manifests must fail");
    assert!(err.to_string().contains("failed reading manifests"));

    PressupConfig::default()
        .manifests()
        .expect("built-in manifests must load");
}

#[test]
fn output_style_requires_terminal_without_no_color() {
    assert_eq!(output_style_for(true, false), OutputStyle::Rich);
    assert_eq!(output_style_for(true, true), OutputStyle::Plain);
    assert_eq!(output_style_for(false, false), OutputStyle::Plain);
}

#[test]
fn status_lines_carry_badges_only_in_rich_mode() {
    assert_eq!(render_status_line(OutputStyle::Plain, "ok", "done"), "done");
    assert_eq!(render_status_line(OutputStyle::Rich, "ok", "done"), "[OK] done");
    assert_eq!(render_status_line(OutputStyle::Rich, "warn", "hm"), "[WARN] hm");
    assert_eq!(render_status_line(OutputStyle::Rich, "info", "step"), "[..] step");
}

#[test]
fn error_lines_list_every_entry_with_detail() {
    let mut error = UpgradeError::new("copy_failed", "Could not copy files.")
        .with_data(ErrorData::Text("wp-includes/functions.php".to_string()));
    error.push(ErrorEntry {
        code: "rollback_was_required".to_string(),
        message: "Rollback was required.".to_string(),
        data: None,
    });

    let lines = format_error_lines(&error, OutputStyle::Rich);
    assert_eq!(
        lines,
        vec![
            "[ERR] Could not copy files. (copy_failed): wp-includes/functions.php".to_string(),
            "[ERR] Rollback was required. (rollback_was_required)".to_string(),
        ]
    );
}

#[test]
fn select_offer_prefers_actionable_offer() {
    let updates = vec![
        offer("latest", "1.0.0", None),
        offer("upgrade", "1.1.0", Some("https://example.test/1.1.0.zip")),
    ];
    let selected = select_offer(updates).expect("offer must be selected");
    assert_eq!(selected.version, "1.1.0");

    let selected = select_offer(vec![offer("latest", "1.0.0", None)])
        .expect("latest offer must be selected");
    assert!(selected.is_latest());

    assert!(select_offer(Vec::new()).is_none());
}

#[test]
fn offer_lines_list_available_variants() {
    let mut upgrade = offer("upgrade", "1.1.0", Some("https://example.test/full.zip"));
    upgrade.packages.rollback = Some("https://example.test/rollback.zip".to_string());
    let lines = format_offer_lines(
        "1.0.0",
        &[upgrade, offer("", "1.0.0", None)],
        OutputStyle::Plain,
    );
    assert_eq!(
        lines,
        vec![
            "installed: 1.0.0".to_string(),
            "upgrade 1.1.0 [full, rollback]".to_string(),
            "latest 1.0.0".to_string(),
        ]
    );

    let empty = format_offer_lines("1.0.0", &[], OutputStyle::Rich);
    assert_eq!(empty[1], "[WARN] no offers");
}

#[test]
fn verify_lines_report_each_changed_file() {
    let clean = format_verify_lines("1.0.0", &[], OutputStyle::Plain);
    assert_eq!(clean, vec!["all core files match ClassicPress 1.0.0".to_string()]);

    let changed = format_verify_lines(
        "1.0.0",
        &["index.php".to_string(), "wp-includes/functions.php".to_string()],
        OutputStyle::Rich,
    );
    assert_eq!(changed.len(), 2);
    assert_eq!(changed[0], "[ERR] changed: index.php");
}

#[test]
fn maintenance_line_describes_status() {
    assert_eq!(
        format_maintenance_line(MaintenanceStatus::Inactive, 1_000),
        "maintenance mode is not enabled"
    );
    assert_eq!(
        format_maintenance_line(MaintenanceStatus::Active { since: 940 }, 1_000),
        "maintenance mode enabled 60s ago"
    );
    assert!(
        format_maintenance_line(MaintenanceStatus::Stale { since: 0 }, 1_000)
            .contains("pressup maintenance clear")
    );
}

#[test]
fn maintenance_clear_removes_stale_flag() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let root = install_root(dir.path());
    let config = direct_config(&root);
    let layout = config.layout();
    fs::write(
        layout.maintenance_path(),
        MaintenanceFlag { started_at: 1 }.render(),
    )
    .expect("must write maintenance flag");

    run_maintenance_command(&config, OutputStyle::Plain, false).expect("status must succeed");
    assert!(layout.maintenance_path().exists());

    run_maintenance_command(&config, OutputStyle::Plain, true).expect("clear must succeed");
    assert!(!layout.maintenance_path().exists());

    let now = unix_now().expect("clock must work");
    let filesystem = pressup_upgrader::DirectFilesystem::new();
    assert_eq!(
        maintenance::status(&filesystem, &layout, now),
        MaintenanceStatus::Inactive
    );
}

#[test]
fn commands_fail_without_content_dir() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = direct_config(dir.path());
    let err = run_maintenance_command(&config, OutputStyle::Plain, false)
        .expect_err("missing content dir must fail");
    assert!(format!("{err:#}").contains("failed connecting 'direct' transport"));
}

#[test]
fn unlock_releases_held_core_lock() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let root = install_root(dir.path());
    let config = direct_config(&root);
    let layout = config.layout();
    layout.ensure_state_dirs().expect("must create state dirs");

    let locks = LockManager::new(Arc::new(FileLockStore::new(layout.locks_dir())));
    locks
        .acquire(CORE_UPDATER_LOCK, Duration::from_secs(900))
        .expect("lock store must work")
        .expect("lock must be free");
    assert!(locks
        .holder_since(CORE_UPDATER_LOCK)
        .expect("lock store must work")
        .is_some());

    run_unlock_command(&config, OutputStyle::Plain).expect("unlock must succeed");
    assert!(locks
        .holder_since(CORE_UPDATER_LOCK)
        .expect("lock store must work")
        .is_none());

    run_unlock_command(&config, OutputStyle::Plain).expect("second unlock must succeed");
}

#[test]
fn upgrade_with_latest_offer_file_is_a_no_op() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let root = install_root(dir.path());
    let config = direct_config(&root);
    let offer_path = dir.path().join("offer.json");
    fs::write(
        &offer_path,
        r#"{"offers":[{"response":"latest","version":"1.0.0","packages":{"full":false}}]}"#,
    )
    .expect("must write offer");

    run_upgrade_command(
        &config,
        OutputStyle::Plain,
        UpgradeOptions {
            offer_path: Some(offer_path),
            ..UpgradeOptions::default()
        },
    )
    .expect("latest offer must succeed");

    let version = fs::read_to_string(root.join("wp-includes").join("version.php"))
        .expect("must read version file");
    assert!(version.contains("1.0.0"));
    assert!(!config.layout().upgrade_dir().exists());
}

#[test]
fn upgrade_reports_unreadable_offer_file() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let root = install_root(dir.path());
    let config = direct_config(&root);
    let offer_path = dir.path().join("offer.json");
    fs::write(&offer_path, "{not json").expect("must write offer");

    let err = run_upgrade_command(
        &config,
        OutputStyle::Plain,
        UpgradeOptions {
            offer_path: Some(offer_path),
            ..UpgradeOptions::default()
        },
    )
    .expect_err("invalid offer must fail");
    assert!(err.to_string().contains("invalid offer"));
}
