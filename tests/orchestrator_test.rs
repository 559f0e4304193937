mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{services, MemoryRegistry, RecordingFilesystem};
use oraprov::command::{Command, CommandBuilder, CommandEntry, Stage};
use oraprov::config::types::Settings;
use oraprov::error::ProvisionError;
use oraprov::provision::database::DatabaseProvisioner;
use oraprov::provision::oratab::HostRegistry;
use oraprov::provision::templates::{BOOTSTRAP_SCRIPTS, CREATE_SCRIPT};
use oraprov::resources::database::{
    AutoextendClause, DatafileClause, DatabaseSpec, LogfileGroup, TablespaceClause,
};

const HOME: &str = "/u01/app/oracle/product/19c";
const BASE: &str = "/u01/app/oracle";

fn standalone() -> DatabaseSpec {
    let mut spec = DatabaseSpec::new("orcl", HOME, BASE);
    spec.sys_password = Some("SysPw1".into());
    spec.system_password = Some("SystemPw1".into());
    spec.init_ora_content = "*.db_name='orcl'\n".into();
    spec
}

fn clustered() -> DatabaseSpec {
    let mut spec = standalone();
    spec.title = "rac".into();
    spec.instances.insert("rac1".into(), "node1".into());
    spec.instances.insert("rac2".into(), "node2".into());
    spec.scan_name = Some("scan.example.com".into());
    spec
}

fn is_srvctl(entry: &CommandEntry) -> bool {
    matches!(entry.command, Command::Srvctl(_))
}

fn srvctl_args(entries: &[CommandEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| is_srvctl(e))
        .map(|e| e.command.to_string())
        .collect()
}

// ─── Standalone create ───────────────────────────────────────────────────────

#[test]
fn test_standalone_create_targets_database_instance() {
    let fs = Arc::new(RecordingFilesystem::new());
    let registry = Arc::new(MemoryRegistry::default());
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::clone(&registry));
    let spec = standalone();

    let provisioner = DatabaseProvisioner::new(&spec, &svc).unwrap();
    let mut builder = CommandBuilder::new("ora_database.orcl");
    provisioner.create(&mut builder).unwrap();
    let plan = builder.build();

    assert!(!plan.is_empty());
    assert!(plan.entries().all(|e| e.context.target_instance == "orcl"));
    assert!(!plan.entries().any(is_srvctl));

    let create = plan
        .immediate()
        .iter()
        .find(|e| e.command.to_string().ends_with("create.sql"))
        .expect("create script queued");
    assert!(create.context.is_unbounded());
    assert!(!create.context.daemonized);
    assert_eq!(create.context.oracle_home.as_deref(), Some(HOME));
}

#[test]
fn test_oratab_entry_waits_for_create_script() {
    let fs = Arc::new(RecordingFilesystem::new());
    let registry = Arc::new(MemoryRegistry::default());
    let svc = services(Settings::default(), fs, Arc::clone(&registry));
    let spec = standalone();

    let mut builder = CommandBuilder::new("ora_database.orcl");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .create(&mut builder)
        .unwrap();
    let plan = builder.build();

    // building the plan leaves the host registry alone
    assert!(registry.entry("orcl").unwrap().is_none());

    let create = plan
        .position(|e| e.command.to_string().ends_with("/create.sql"))
        .expect("create queued");
    let register = plan
        .position(|e| matches!(e.command, Command::AddRegistryEntry { .. }))
        .expect("registry entry queued");
    assert_eq!(register, create + 1);
    assert_eq!(
        plan.immediate()[register].command,
        Command::AddRegistryEntry {
            sid: "orcl".into(),
            home: HOME.into(),
            autostart: true,
        }
    );
}

#[test]
fn test_standalone_create_writes_local_artifacts() {
    let fs = Arc::new(RecordingFilesystem::new());
    let registry = Arc::new(MemoryRegistry::default());
    let svc = services(Settings::default(), Arc::clone(&fs), registry);
    let spec = standalone();

    let provisioner = DatabaseProvisioner::new(&spec, &svc).unwrap();
    provisioner
        .create(&mut CommandBuilder::new("ora_database.orcl"))
        .unwrap();

    let written = fs.written();
    assert!(written.contains(&PathBuf::from(format!("{}/dbs/initorcl.ora", HOME))));
    let scripts = PathBuf::from(format!("{}/admin/orcl/scripts", BASE));
    assert!(written.contains(&scripts.join("create.sql")));
    for script in BOOTSTRAP_SCRIPTS {
        assert!(written.contains(&scripts.join(script)), "missing {}", script);
    }
    assert!(fs.removed().is_empty());
}

#[test]
fn test_bootstrap_scripts_are_deferred() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), fs, Arc::new(MemoryRegistry::default()));
    let spec = standalone();

    let mut builder = CommandBuilder::new("ora_database.orcl");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .create(&mut builder)
        .unwrap();
    let plan = builder.build();

    assert_eq!(plan.deferred().len(), BOOTSTRAP_SCRIPTS.len());
    assert!(plan.deferred().iter().all(|e| e.stage == Stage::Deferred));
    assert!(plan.deferred()[0]
        .command
        .to_string()
        .ends_with("CreateDBCatalog.sql"));
}

#[test]
fn test_catalog_can_be_skipped() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), fs, Arc::new(MemoryRegistry::default()));
    let mut spec = standalone();
    spec.create_catalog = false;

    let mut builder = CommandBuilder::new("ora_database.orcl");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .create(&mut builder)
        .unwrap();
    assert!(builder.build().deferred().is_empty());
}

// ─── Clustered create ────────────────────────────────────────────────────────

#[test]
fn test_clustered_create_registers_before_creating() {
    let fs = Arc::new(RecordingFilesystem::new());
    let registry = Arc::new(MemoryRegistry::default());
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::clone(&registry));
    let spec = clustered();

    let provisioner = DatabaseProvisioner::new(&spec, &svc).unwrap();
    assert_eq!(provisioner.instance_name(), "rac1");

    let mut builder = CommandBuilder::new("ora_database.rac");
    provisioner.create(&mut builder).unwrap();
    let plan = builder.build();

    let add_database = plan
        .position(|e| e.command.to_string().starts_with("add database -d rac"))
        .expect("add database queued");
    let create = plan
        .position(|e| e.command.to_string().ends_with("/create.sql"))
        .expect("create queued");
    assert!(add_database < create);

    let srvctl = srvctl_args(plan.immediate());
    let instances: Vec<&String> = srvctl.iter().filter(|a| a.starts_with("add instance")).collect();
    assert_eq!(
        instances,
        vec![
            "add instance -d rac -i rac1 -n node1",
            "add instance -d rac -i rac2 -n node2"
        ]
    );
    assert!(srvctl.contains(&"disable database -d rac".to_string()));
    assert!(plan
        .immediate()
        .iter()
        .any(|e| e.command.to_string().ends_with("rac_post_create_actions.sql")));
    assert!(plan.entries().all(|e| e.context.target_instance == "rac1"));

    let register = plan
        .position(|e| e.command.to_string().starts_with("rac1:"))
        .expect("registry entry queued");
    let post_create = plan
        .position(|e| e.command.to_string().ends_with("rac_post_create_actions.sql"))
        .unwrap();
    assert_eq!(register, create + 1);
    assert!(register < post_create);
    assert!(registry.entry("rac1").unwrap().is_none());
}

#[test]
fn test_clustered_spfile_location_is_registered() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), fs, Arc::new(MemoryRegistry::default()));
    let mut spec = clustered();
    spec.spfile_location = Some("+DATA".into());

    let mut builder = CommandBuilder::new("ora_database.rac");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .create(&mut builder)
        .unwrap();
    let srvctl = srvctl_args(builder.build().immediate());
    assert_eq!(
        srvctl[0],
        format!("add database -d rac -o {} -n rac -m rac -p +DATA/rac/spfilerac.ora", HOME)
    );
}

// ─── Rollback ────────────────────────────────────────────────────────────────

#[test]
fn test_failure_after_directories_rolls_back_once() {
    let fs = Arc::new(RecordingFilesystem::failing_writes("Grants.sql"));
    let registry = Arc::new(MemoryRegistry::default());
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::clone(&registry));
    let spec = standalone();

    let provisioner = DatabaseProvisioner::new(&spec, &svc).unwrap();
    let err = provisioner
        .create(&mut CommandBuilder::new("ora_database.orcl"))
        .unwrap_err();

    match err {
        ProvisionError::ProvisioningFailed { resource, cause } => {
            assert_eq!(resource, "orcl");
            assert!(cause.contains("disk full"), "cause was: {}", cause);
        }
        other => panic!("expected ProvisioningFailed, got {other:?}"),
    }

    let removed = fs.removed();
    let mut expected = provisioner.directories();
    expected.reverse();
    assert_eq!(removed, expected);
    assert!(registry.entry("orcl").unwrap().is_none());
}

#[test]
fn test_rollback_keeps_directories_that_already_existed() {
    let admin = PathBuf::from(format!("{}/admin/orcl", BASE));
    let adump = admin.join("adump");
    let fs = Arc::new(
        RecordingFilesystem::failing_writes("Grants.sql").with_existing(&[admin.clone(), adump.clone()]),
    );
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::new(MemoryRegistry::default()));
    let spec = standalone();

    let provisioner = DatabaseProvisioner::new(&spec, &svc).unwrap();
    assert!(provisioner
        .create(&mut CommandBuilder::new("ora_database.orcl"))
        .is_err());

    let removed = fs.removed();
    assert!(!removed.contains(&admin));
    assert!(!removed.contains(&adump));
    assert_eq!(
        removed,
        vec![
            PathBuf::from(format!("{}/cfgtoollogs/dbca/orcl", BASE)),
            admin.join("scripts"),
            admin.join("pfile"),
            admin.join("dpdump"),
        ]
    );
}

#[test]
fn test_missing_sys_password_fails_creation() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::new(MemoryRegistry::default()));
    let mut spec = standalone();
    spec.sys_password = None;

    let err = DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .create(&mut CommandBuilder::new("ora_database.orcl"))
        .unwrap_err();
    assert!(matches!(err, ProvisionError::ProvisioningFailed { .. }));
    assert!(err.to_string().contains("sys_password"));
    assert_eq!(fs.removed().len(), 6);
}

// ─── Destroy and modify ──────────────────────────────────────────────────────

#[test]
fn test_clustered_destroy_deregisters_before_drop() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), Arc::clone(&fs), Arc::new(MemoryRegistry::default()));
    let spec = clustered();

    let mut builder = CommandBuilder::new("ora_database.rac");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .destroy(&mut builder)
        .unwrap();
    let plan = builder.build();

    assert_eq!(
        srvctl_args(plan.immediate()),
        vec![
            "remove instance -d rac -i rac1",
            "remove instance -d rac -i rac2",
            "remove database -d rac"
        ]
    );
    let drop = plan
        .position(|e| e.command.to_string().contains("drop database"))
        .expect("drop queued");
    assert_eq!(drop, 3);

    let deferred: Vec<&Command> = plan.deferred().iter().map(|e| &e.command).collect();
    assert_eq!(
        deferred,
        vec![
            &Command::RemoveDirectories(vec![
                format!("{}/admin/rac", BASE),
                format!("{}/cfgtoollogs/dbca/rac", BASE),
            ]),
            &Command::RemoveRegistryEntry("rac1".into()),
        ]
    );
    // nothing local is touched until the drop has run
    assert!(fs.removed().is_empty());
}

#[test]
fn test_standalone_destroy_has_no_cluster_steps() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), fs, Arc::new(MemoryRegistry::default()));
    let spec = standalone();

    let mut builder = CommandBuilder::new("ora_database.orcl");
    DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .destroy(&mut builder)
        .unwrap();
    let plan = builder.build();
    assert!(!plan.entries().any(is_srvctl));
    assert!(plan.immediate()[0].context.is_unbounded());
}

#[test]
fn test_modify_is_unsupported() {
    let fs = Arc::new(RecordingFilesystem::new());
    let svc = services(Settings::default(), fs, Arc::new(MemoryRegistry::default()));
    let spec = standalone();
    let err = DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .modify(&mut CommandBuilder::new("ora_database.orcl"))
        .unwrap_err();
    assert!(matches!(err, ProvisionError::UnsupportedOperation { .. }));
}

// ─── Create script ───────────────────────────────────────────────────────────

#[test]
fn test_create_script_follows_declaration() {
    let svc = services(
        Settings::default(),
        Arc::new(RecordingFilesystem::new()),
        Arc::new(MemoryRegistry::default()),
    );
    let mut spec = standalone();
    spec.character_set = Some("AL32UTF8".into());
    spec.logfile_groups = vec![
        LogfileGroup {
            file_name: "/u02/redo01.log".into(),
            size: "200M".into(),
            reuse: false,
        },
        LogfileGroup {
            file_name: "/u02/redo02.log".into(),
            size: "200M".into(),
            reuse: true,
        },
    ];
    spec.undo_tablespace = Some(TablespaceClause {
        name: "UNDOTBS1".into(),
        datafile: Some(DatafileClause {
            file_name: Some("/u02/undotbs01.dbf".into()),
            size: Some("500M".into()),
            reuse: false,
            autoextend: Some(AutoextendClause {
                next: Some("10M".into()),
                maxsize: None,
            }),
        }),
    });

    let script = DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .render(CREATE_SCRIPT)
        .unwrap();
    assert!(script.starts_with("-- Database creation script for orcl\n"));
    assert!(script.contains(
        "CREATE DATABASE \"orcl\"\n\
         USER SYS IDENTIFIED BY \"SysPw1\"\n\
         USER SYSTEM IDENTIFIED BY \"SystemPw1\"\n\
         CHARACTER SET AL32UTF8\n\
         LOGFILE GROUP 1 ('/u02/redo01.log') SIZE 200M,\n  \
         GROUP 2 ('/u02/redo02.log') SIZE 200M REUSE\n\
         NOARCHIVELOG\n\
         UNDO TABLESPACE UNDOTBS1 DATAFILE '/u02/undotbs01.dbf' SIZE 500M AUTOEXTEND ON NEXT 10M;\n"
    ));
    assert!(!script.contains("CONTROLFILE REUSE"));
}

#[test]
fn test_create_script_minimal_declaration() {
    let svc = services(
        Settings::default(),
        Arc::new(RecordingFilesystem::new()),
        Arc::new(MemoryRegistry::default()),
    );
    let mut spec = standalone();
    spec.system_password = None;
    spec.control_file = Some("REUSE".into());
    spec.archivelog = true;

    let script = DatabaseProvisioner::new(&spec, &svc)
        .unwrap()
        .render(CREATE_SCRIPT)
        .unwrap();
    assert!(script.contains(
        "CREATE DATABASE \"orcl\"\nUSER SYS IDENTIFIED BY \"SysPw1\"\nCONTROLFILE REUSE\nARCHIVELOG;\nspool off"
    ));
}

#[test]
fn test_malformed_database_title_is_rejected() {
    let svc = services(
        Settings::default(),
        Arc::new(RecordingFilesystem::new()),
        Arc::new(MemoryRegistry::default()),
    );
    let spec = DatabaseSpec::new("1orcl", HOME, BASE);
    assert!(matches!(
        DatabaseProvisioner::new(&spec, &svc),
        Err(ProvisionError::MalformedTitle { .. })
    ));
}
