use oraprov::provision::oratab::{HostRegistry, OraTab, ReadOnlyRegistry};
use tempfile::TempDir;

const EXISTING: &str = "\
# This file is used by ORACLE utilities.
#
orcl:/u01/app/oracle/product/19c:Y
test:/u01/app/oracle/product/12c:N
";

fn oratab(dir: &TempDir) -> OraTab {
    let path = dir.path().join("oratab");
    std::fs::write(&path, EXISTING).unwrap();
    OraTab::new(path)
}

fn content(tab: &OraTab) -> String {
    std::fs::read_to_string(tab.path()).unwrap()
}

// ─── Reading ─────────────────────────────────────────────────────────────────

#[test]
fn test_entries_skip_comments() {
    let dir = TempDir::new().unwrap();
    let tab = oratab(&dir);
    let entries = tab.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].sid, "orcl");
    assert!(entries[0].autostart);
    assert!(!entries[1].autostart);
}

#[test]
fn test_missing_file_has_no_entries() {
    let dir = TempDir::new().unwrap();
    let tab = OraTab::new(dir.path().join("nothing-here"));
    assert!(tab.entries().unwrap().is_empty());
    assert!(tab.entry("orcl").unwrap().is_none());
}

// ─── Writing ─────────────────────────────────────────────────────────────────

#[test]
fn test_ensure_entry_appends_new_instance() {
    let dir = TempDir::new().unwrap();
    let tab = oratab(&dir);
    tab.ensure_entry("rac1", "/u01/app/oracle/product/19c", true)
        .unwrap();
    assert!(content(&tab).ends_with("rac1:/u01/app/oracle/product/19c:Y\n"));
    assert!(content(&tab).starts_with("# This file is used by ORACLE utilities."));
}

#[test]
fn test_ensure_entry_updates_in_place_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let tab = oratab(&dir);
    tab.ensure_entry("test", "/u01/app/oracle/product/19c", true)
        .unwrap();
    let once = content(&tab);
    assert!(once.contains("test:/u01/app/oracle/product/19c:Y"));
    assert!(!once.contains("12c"));

    tab.ensure_entry("test", "/u01/app/oracle/product/19c", true)
        .unwrap();
    assert_eq!(content(&tab), once);
}

#[test]
fn test_remove_entry_keeps_other_lines() {
    let dir = TempDir::new().unwrap();
    let tab = oratab(&dir);
    tab.remove_entry("orcl").unwrap();
    let after = content(&tab);
    assert!(!after.contains("orcl:"));
    assert!(after.contains("test:/u01/app/oracle/product/12c:N"));
    assert!(after.contains("# This file is used by ORACLE utilities."));

    // removing twice is fine
    tab.remove_entry("orcl").unwrap();
}

#[test]
fn test_read_only_registry_never_writes() {
    let dir = TempDir::new().unwrap();
    let tab = oratab(&dir);
    let path = tab.path().to_path_buf();
    let registry = ReadOnlyRegistry::new(tab);

    registry.ensure_entry("new", "/u01/home", true).unwrap();
    registry.remove_entry("orcl").unwrap();

    assert_eq!(std::fs::read_to_string(path).unwrap(), EXISTING);
    assert_eq!(registry.entries().unwrap().len(), 2);
}
