use super::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::messages::interpolate;

#[test]
fn interpolate_fills_sequential_and_positional_placeholders() {
    assert_eq!(interpolate("Downloading %s…", &["https://x"]), "Downloading https://x…");
    assert_eq!(
        interpolate("%2$s before %1$s, 100%%", &["a", "b"]),
        "b before a, 100%"
    );
    assert_eq!(interpolate("missing %s and %3$s", &[]), "missing %s and %3$s");
}

#[test]
fn offer_parses_falsy_packages() {
    let raw = r#"{
        "response": "upgrade",
        "packages": {
            "full": "https://example.test/ClassicPress-1.1.0.zip",
            "partial": false,
            "no_content": "",
            "new_bundled": null,
            "rollback": "https://example.test/rollback.zip"
        },
        "partial_version": false,
        "version": "1.1.0",
        "locale": "en_US"
    }"#;

    let offer = CoreUpdateOffer::from_json_str(raw).expect("must parse offer");
    assert!(!offer.is_latest());
    assert_eq!(
        offer.packages.get(PackageVariant::Full),
        Some("https://example.test/ClassicPress-1.1.0.zip")
    );
    assert_eq!(offer.packages.partial, None);
    assert_eq!(offer.packages.no_content, None);
    assert_eq!(offer.packages.new_bundled, None);
    assert!(offer.packages.rollback.is_some());
    assert_eq!(offer.partial_version, None);
    assert_eq!(offer.locale.as_deref(), Some("en_US"));
}

#[test]
fn offer_without_response_counts_as_latest() {
    let offer = CoreUpdateOffer::from_json_str(r#"{"version": "1.0.0"}"#).expect("must parse");
    assert!(offer.is_latest());
}

#[test]
fn version_check_envelope_yields_first_offer() {
    let raw = r#"{"offers": [{"response": "autoupdate", "version": "1.0.2"}, {"response": "upgrade", "version": "1.1.0"}]}"#;
    let offer = CoreUpdateOffer::from_version_check_json(raw).expect("must parse");
    assert_eq!(offer.version, "1.0.2");

    assert!(CoreUpdateOffer::from_version_check_json(r#"{"offers": []}"#).is_err());
}

#[test]
fn lenient_versions_pad_and_compare() {
    assert_eq!(version::parse_lenient("4.9").expect("must parse").to_string(), "4.9.0");
    assert_eq!(
        version::parse_lenient("3.7-beta2").expect("must parse").to_string(),
        "3.7.0-beta2"
    );
    assert!(version::parse_lenient("nightly").is_none());
    assert!(version::is_older("1.0.0", "1.1.0"));
    assert!(version::is_older("1.1.0-rc1", "1.1.0"));
    assert!(version::is_newer("1.10.0", "1.9.9"));
    assert_eq!(version::compare("1.1", "1.1.0"), std::cmp::Ordering::Equal);
}

#[test]
fn server_versions_ignore_distribution_suffixes() {
    assert!(version::server_satisfies("5.5.5-10.1.44-MariaDB", "5.0.15"));
    assert!(version::server_satisfies("7.4.3-1ubuntu1", "5.6.0"));
    assert!(!version::server_satisfies("5.4.45", "5.6.0"));
    assert!(!version::server_satisfies("unknown", "5.6.0"));
    assert!(version::server_satisfies("5.4.45", ""));
}

#[test]
fn branch_and_development_detection() {
    assert_eq!(version::branch("1.1.3"), "1.1");
    assert_eq!(version::branch("3.7-beta2"), "3.7");
    assert!(version::is_development_build("1.2.0-rc1"));
    assert!(!version::is_development_build("1.2.0"));
}

#[test]
fn checksum_set_accepts_flat_and_nested_shapes() {
    let flat = br#"{"checksums": {"index.php": "AA", "wp-content/index.php": "bb"}}"#;
    let set = ChecksumSet::from_api_json(flat, "1.1.0", "en_US").expect("must parse flat");
    assert_eq!(set.get("index.php"), Some("aa"));
    assert_eq!(set.len(), 2);

    let nested = br#"{"checksums": {"1.1.0": {"index.php": "cc"}}}"#;
    let set = ChecksumSet::from_api_json(nested, "1.1.0", "en_US").expect("must parse nested");
    assert_eq!(set.get("index.php"), Some("cc"));
    assert_eq!(set.len(), 1);

    assert!(ChecksumSet::from_api_json(br#"{"checksums": false}"#, "1.1.0", "en_US").is_err());
    assert!(ChecksumSet::from_api_json(b"not json", "1.1.0", "en_US").is_err());
}

#[test]
fn checksum_set_drops_paths_outside_the_root() {
    let payload = br#"{"checksums": {
        "index.php": "aa",
        "/etc/passwd": "bb",
        "../outside.php": "cc",
        "wp-includes/../../outside.php": "dd",
        "./index.php": "ee",
        "C:/Windows/win.ini": "ff",
        "\\\\server\\share.php": "11"
    }}"#;
    let set = ChecksumSet::from_api_json(payload, "1.1.0", "en_US").expect("must parse");
    assert_eq!(set.len(), 1);
    assert_eq!(set.get("index.php"), Some("aa"));

    let mut files = BTreeMap::new();
    files.insert("index.php".to_string(), "aa".to_string());
    files.insert("/tmp/outside.php".to_string(), "bb".to_string());
    files.insert("wp-includes/../../x.php".to_string(), "cc".to_string());
    let set = ChecksumSet::new("1.1.0", "en_US", files);
    let paths = set.core_entries("wp-content").map(|(path, _)| path).collect::<Vec<_>>();
    assert_eq!(paths, vec!["index.php"]);
}

#[test]
fn relative_path_rules() {
    assert!(is_relative_path("wp-includes/functions.php"));
    assert!(is_relative_path("wp-includes/js/"));
    assert!(!is_relative_path(""));
    assert!(!is_relative_path("/abs.php"));
    assert!(!is_relative_path("\\abs.php"));
    assert!(!is_relative_path("C:abs.php"));
    assert!(!is_relative_path("a/./b.php"));
    assert!(!is_relative_path("a\\..\\b.php"));
}

#[test]
fn core_entries_exclude_content_prefix() {
    let set = ChecksumSet::new(
        "1.1.0",
        "en_US",
        [
            ("index.php", "a"),
            ("wp-content/themes/index.php", "b"),
            ("wp-includes/load.php", "c"),
        ]
        .into_iter()
        .map(|(path, hash)| (path.to_string(), hash.to_string()))
        .collect(),
    );

    let core = set
        .core_entries("wp-content")
        .map(|(path, _)| path)
        .collect::<Vec<_>>();
    assert_eq!(core, vec!["index.php", "wp-includes/load.php"]);
}

#[test]
fn root_documents_are_only_top_level_html_and_txt() {
    assert!(is_root_document("readme.html"));
    assert!(is_root_document("license.txt"));
    assert!(!is_root_document("wp-admin/readme.html"));
    assert!(!is_root_document("index.php"));
}

#[test]
fn version_manifest_prefers_classicpress_version() {
    let source = "<?php\n$wp_version = '4.9.15';\n$cp_version = '1.1.0';\n$wp_db_version = 38590;\n$required_php_version = '5.6.0';\n$required_mysql_version = \"5.0\";\n";
    let manifest = VersionManifest::parse(source).expect("must parse");
    assert_eq!(manifest.version, "1.1.0");
    assert_eq!(manifest.wp_version.as_deref(), Some("4.9.15"));
    assert_eq!(manifest.required_php_version.as_deref(), Some("5.6.0"));
    assert_eq!(manifest.required_mysql_version.as_deref(), Some("5.0"));

    assert!(VersionManifest::parse("<?php\n$required_php_version = '5.6';\n").is_err());
}

#[test]
fn bundled_items_describe_kind_and_name() {
    let theme = BundledItem::new("themes/twentyseventeen/", "1.0.0");
    assert_eq!(theme.kind(), Some(BundledKind::Themes));
    assert!(theme.is_directory());
    assert_eq!(theme.name(), "twentyseventeen");

    let plugin = BundledItem::new("plugins/hello.php", "1.0.0");
    assert_eq!(plugin.kind(), Some(BundledKind::Plugins));
    assert!(!plugin.is_directory());
    assert_eq!(plugin.name(), "hello.php");

    assert_eq!(BundledItem::new("mu-plugins/x/", "1.0.0").kind(), None);
}

#[test]
fn manifests_from_toml_reject_escaping_paths() {
    let valid = r#"
old_files = ["wp-admin/old.php"]
new_bundled = [{ path = "themes/fresh/", introduced = "1.2.0" }]
old_vendored_files = [{ symbol = "Requests_Hooker", path = "wp-includes/Requests/Hooker.php" }, { path = "wp-includes/Requests/x.php" }]
"#;
    let manifests = UpgradeManifests::from_toml_str(valid).expect("must parse");
    assert_eq!(manifests.all_old_files().count(), 3);
    assert_eq!(manifests.old_vendored_files[1].symbol, None);

    assert!(UpgradeManifests::from_toml_str(r#"old_files = ["../etc/passwd"]"#).is_err());
    assert!(UpgradeManifests::from_toml_str(
        r#"new_bundled = [{ path = "uploads/x/", introduced = "1.0.0" }]"#
    )
    .is_err());
}

#[test]
fn builtin_manifests_are_well_formed() {
    let manifests = UpgradeManifests::builtin();
    assert!(!manifests.old_files.is_empty());
    assert!(manifests.new_bundled.iter().all(|item| item.kind().is_some()));
    assert!(manifests
        .old_vendored_files
        .iter()
        .any(|file| file.symbol.is_none()));
}

#[test]
fn error_suffix_and_relative_paths() {
    let error = UpgradeError::new(codes::COPY_FAILED_CORE_COPY_DIR, messages::COPY_FAILED)
        .with_path(Path::new("/srv/site/wp-admin/index.php"))
        .relative_to(Path::new("/srv/site"))
        .with_code_suffix(codes::RETRY_SUFFIX);

    assert_eq!(error.code(), "copy_failed__copy_dir_retry");
    assert_eq!(error.data(), Some(&ErrorData::Text("wp-admin/index.php".to_string())));
    assert_eq!(error.kind(), ErrorKind::CopyFatal);
    assert_eq!(error.to_string(), "Could not copy file.");
}

#[test]
fn rollback_eligibility_matches_critical_codes_only() {
    for code in [
        "do_rollback",
        "something_do_rollback",
        "copy_failed__copy_dir",
        "mkdir_failed__copy_dir",
        "copy_failed__copy_dir_retry",
        "disk_full",
    ] {
        assert!(UpgradeError::new(code, "x").is_rollback_eligible(), "{code}");
    }
    for code in [
        "disk_full_unzip_file",
        "copy_failed_copy_dir",
        "copy_failed_for_version_file",
        "files_not_writable",
        "copy_failed_copy_dir_languages",
        "locked",
    ] {
        assert!(!UpgradeError::new(code, "x").is_rollback_eligible(), "{code}");
    }
}

#[test]
fn accumulate_keeps_first_error_primary() {
    let mut slot = None;
    UpgradeError::accumulate(
        &mut slot,
        UpgradeError::new("copy_failed_copy_dir_languages", "first"),
    );
    UpgradeError::accumulate(
        &mut slot,
        UpgradeError::new("copy_failed_for_new_bundled_themes", "second"),
    );

    let error = slot.expect("must hold error");
    assert_eq!(error.code(), "copy_failed_copy_dir_languages");
    assert_eq!(
        error.codes(),
        vec!["copy_failed_copy_dir_languages", "copy_failed_for_new_bundled_themes"]
    );
    assert_eq!(error.display_messages(), "first\nsecond");
    assert_eq!(error.kind(), ErrorKind::BestEffort);
}

#[test]
fn error_kinds_follow_taxonomy() {
    assert_eq!(ErrorKind::classify("up_to_date"), ErrorKind::Precondition);
    assert_eq!(ErrorKind::classify("insane_distro"), ErrorKind::Validation);
    assert_eq!(ErrorKind::classify("files_not_writable"), ErrorKind::PreCopy);
    assert_eq!(ErrorKind::classify("disk_full"), ErrorKind::CopyFatal);
    assert_eq!(ErrorKind::classify("rollback_was_required"), ErrorKind::Wrapping);
    assert_eq!(ErrorKind::classify("fs_no_root_dir"), ErrorKind::Transport);
    assert_eq!(ErrorKind::classify("download_failed"), ErrorKind::Staging);
}

#[test]
fn rollback_payload_serializes_both_outcomes() {
    let update = UpgradeError::new("copy_failed__copy_dir", "Could not copy file.");
    let wrapped = UpgradeError::new(codes::ROLLBACK_WAS_REQUIRED, messages::ROLLBACK_WAS_REQUIRED)
        .with_data(ErrorData::Rollback(Box::new(RollbackData {
            update: update.clone(),
            rollback: Ok("1.0.0".to_string()),
        })));

    let data = wrapped.rollback_data().expect("must carry rollback data");
    assert_eq!(data.update, update);
    assert_eq!(data.rollback.as_deref(), Ok("1.0.0"));

    let json = serde_json::to_value(&wrapped).expect("must serialize");
    assert_eq!(json["code"], "rollback_was_required");
    assert_eq!(json["data"]["update"]["code"], "copy_failed__copy_dir");
    assert_eq!(json["data"]["rollback"]["Ok"], "1.0.0");
}
