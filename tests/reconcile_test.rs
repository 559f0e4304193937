mod common;

use common::record;
use oraprov::config::types::Ensure;
use oraprov::planner::reconcile::{diff, reconcile, Action};
use oraprov::resources::tablespace::{AutoextendGroup, DatafileGroup};
use oraprov::resources::{InitParamSpec, ManagedResource, TablespaceSpec};

fn tablespace(ensure: Ensure) -> TablespaceSpec {
    TablespaceSpec {
        title: "orcl/USERS".into(),
        ensure,
        sid: None,
        bigfile: Some(false),
        datafile: Some(DatafileGroup {
            datafile: None,
            size: Some("100M".into()),
        }),
        autoextend_info: Some(AutoextendGroup {
            autoextend: Some(true),
            next: Some("10M".into()),
            max_size: Some("unlimited".into()),
        }),
        extent_management: Some("local".into()),
        segment_space_management: None,
        logging: Some(true),
    }
}

fn users_row(bytes: &str) -> oraprov::discovery::RawStateRecord {
    record(&[
        ("SID", "orcl"),
        ("TABLESPACE_NAME", "USERS"),
        ("LOGGING", "LOGGING"),
        ("EXTENT_MANAGEMENT", "LOCAL"),
        ("SEGMENT_SPACE_MANAGEMENT", "AUTO"),
        ("BIGFILE", "NO"),
        ("FILE_NAME", "/u02/oradata/ORCL/users01.dbf"),
        ("INCREMENT_BY", "         1280"),
        ("BLOCK_SIZE", "         8192"),
        ("AUTOEXTENSIBLE", "YES"),
        ("BYTES", bytes),
        ("MAX_SIZE", "  34359721984"),
    ])
}

// ─── Action selection ────────────────────────────────────────────────────────

#[test]
fn test_missing_and_present_creates() {
    assert_eq!(reconcile(&tablespace(Ensure::Present), None), Action::Create);
}

#[test]
fn test_missing_and_absent_is_noop() {
    assert_eq!(reconcile(&tablespace(Ensure::Absent), None), Action::NoOp);
}

#[test]
fn test_found_and_absent_destroys() {
    let row = users_row("104857600");
    assert_eq!(reconcile(&tablespace(Ensure::Absent), Some(&row)), Action::Destroy);
}

#[test]
fn test_matching_state_is_noop() {
    let row = users_row("104857600");
    assert_eq!(reconcile(&tablespace(Ensure::Present), Some(&row)), Action::NoOp);
}

#[test]
fn test_drifted_size_modifies() {
    let row = users_row("52428800");
    let spec = tablespace(Ensure::Present);
    assert_eq!(reconcile(&spec, Some(&row)), Action::Modify);

    let drift = diff(&spec.properties(), &row);
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].path, "datafile.size");
    assert_eq!(drift[0].desired, "100M");
    assert_eq!(drift[0].actual.as_deref(), Some("52428800"));
    assert!(drift[0].is_under("datafile"));
    assert!(!drift[0].is_under("data"));
}

// ─── Diff details ────────────────────────────────────────────────────────────

#[test]
fn test_undeclared_properties_are_ignored() {
    let mut spec = tablespace(Ensure::Present);
    spec.datafile = None;
    spec.autoextend_info = None;
    spec.logging = None;
    let row = users_row("1");
    assert!(diff(&spec.properties(), &row).is_empty());
}

#[test]
fn test_missing_column_counts_as_drift() {
    let param = InitParamSpec {
        title: "orcl/open_cursors".into(),
        ensure: Ensure::Present,
        value: Some("300".into()),
        scope: Default::default(),
        sid: None,
    };
    let row = record(&[("SID", "orcl"), ("NAME", "open_cursors")]);
    let drift = diff(&param.properties(), &row);
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].actual, None);
}

#[test]
fn test_value_comparison_ignores_case() {
    let param = InitParamSpec {
        title: "orcl/db_recovery_file_dest".into(),
        ensure: Ensure::Present,
        value: Some("+fra".into()),
        scope: Default::default(),
        sid: None,
    };
    let row = record(&[("SID", "orcl"), ("NAME", "db_recovery_file_dest"), ("DISPLAY_VALUE", "+FRA")]);
    assert_eq!(reconcile(&param, Some(&row)), Action::NoOp);
}
