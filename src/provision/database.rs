use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use tera::Context as TemplateContext;

use super::templates::{BOOTSTRAP_SCRIPTS, CREATE_SCRIPT, DESTROY_SCRIPT, RAC_POST_CREATE_SCRIPT};
use super::topology::Topology;
use super::Provisioning;
use crate::command::{Command, CommandBuilder, ExecutionContext};
use crate::error::{cause_text, ProvisionError};
use crate::identity::TitleRule;
use crate::resources::database::DatabaseSpec;

const SCRIPT_MODE: u32 = 0o750;
const CONFIG_MODE: u32 = 0o640;

/// A local side effect to undo when a create sequence fails.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Compensation {
    RemoveDirectory(PathBuf),
}

/// Compensating actions recorded while a create sequence runs, undone in reverse order.
#[derive(Debug, Default)]
struct Compensations {
    actions: Vec<Compensation>,
}

impl Compensations {
    fn record(&mut self, action: Compensation) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    fn run(self, services: &Provisioning, resource: &str) {
        for action in self.actions.into_iter().rev() {
            match action {
                Compensation::RemoveDirectory(path) => {
                    tracing::info!(resource, path = %path.display(), "Rolling back directory");
                    if let Err(e) = services.fs.remove_directory(&path) {
                        tracing::warn!(
                            resource,
                            path = %path.display(),
                            error = %cause_text(&e),
                            "Rollback could not remove directory"
                        );
                    }
                }
            }
        }
    }
}

/// Drives the create and destroy sequences of one database declaration.
pub struct DatabaseProvisioner<'a> {
    spec: &'a DatabaseSpec,
    services: &'a Provisioning,
    name: String,
    topology: Topology,
}

impl<'a> DatabaseProvisioner<'a> {
    pub fn new(spec: &'a DatabaseSpec, services: &'a Provisioning) -> Result<Self, ProvisionError> {
        let name = TitleRule::database().derive_key(&spec.title)?.to_string();
        Ok(Self {
            spec,
            services,
            name,
            topology: Topology::resolve(&spec.instances),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn instance_name(&self) -> String {
        self.topology.effective_instance_name(&self.name)
    }

    fn admin_dir(&self) -> PathBuf {
        Path::new(&self.spec.oracle_base)
            .join("admin")
            .join(&self.name)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.admin_dir().join("scripts")
    }

    /// Directories a create run ensures, parents first.
    pub fn directories(&self) -> Vec<PathBuf> {
        let admin = self.admin_dir();
        vec![
            admin.clone(),
            admin.join("adump"),
            admin.join("dpdump"),
            admin.join("pfile"),
            admin.join("scripts"),
            Path::new(&self.spec.oracle_base)
                .join("cfgtoollogs")
                .join("dbca")
                .join(&self.name),
        ]
    }

    /// Directory trees removed when the database is destroyed.
    fn removal_roots(&self) -> Vec<PathBuf> {
        let dirs = self.directories();
        vec![dirs[0].clone(), dirs[dirs.len() - 1].clone()]
    }

    pub fn init_ora_path(&self) -> PathBuf {
        Path::new(&self.spec.oracle_home)
            .join("dbs")
            .join(format!("init{}.ora", self.instance_name()))
    }

    fn spfile_path(&self) -> String {
        match &self.spec.spfile_location {
            Some(location) => format!("{}/{}/spfile{}.ora", location, self.name, self.name),
            None => format!("{}/dbs/spfile{}.ora", self.spec.oracle_home, self.name),
        }
    }

    fn owner(&self) -> (&str, &str) {
        let settings = &self.services.settings;
        (
            self.spec
                .oracle_user
                .as_deref()
                .unwrap_or(&settings.oracle_user),
            self.spec
                .install_group
                .as_deref()
                .unwrap_or(&settings.install_group),
        )
    }

    fn timeout(&self) -> Duration {
        self.spec
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.services.settings.command_timeout())
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.instance_name(), self.timeout()).with_home(&self.spec.oracle_home)
    }

    fn unbounded_context(&self) -> ExecutionContext {
        ExecutionContext::unbounded(self.instance_name())
            .daemonized(false)
            .with_home(&self.spec.oracle_home)
    }

    fn script_ref(&self, script: &str) -> Command {
        Command::Sql(format!("@{}", self.scripts_dir().join(script).display()))
    }

    // ─── Create ─────────────────────────────────────────────────────────────

    /// Queue everything needed to bring the database into existence.
    ///
    /// Local artifacts are written as the sequence runs. If any step fails the directories
    /// this run created are removed and the failure is reported as `ProvisioningFailed`.
    /// The oratab entry is queued behind the create script, so a failed create leaves the
    /// database undiscovered and the next pass plans it again.
    pub fn create(&self, builder: &mut CommandBuilder) -> Result<(), ProvisionError> {
        let instance = self.instance_name();
        tracing::info!(
            database = self.name.as_str(),
            instance = instance.as_str(),
            clustered = self.topology.is_clustered(),
            "Provisioning database"
        );

        let mut compensations = Compensations::default();
        match self.run_create(builder, &instance, &mut compensations) {
            Ok(()) => Ok(()),
            Err(e) => {
                let cause = cause_text(&e);
                tracing::error!(database = self.name.as_str(), error = %cause, "Database creation failed");
                compensations.run(self.services, &self.name);
                Err(ProvisionError::ProvisioningFailed {
                    resource: self.name.clone(),
                    cause,
                })
            }
        }
    }

    fn run_create(
        &self,
        builder: &mut CommandBuilder,
        instance: &str,
        compensations: &mut Compensations,
    ) -> Result<()> {
        self.create_directories(compensations)?;
        self.create_init_ora_file()?;

        let context = self.template_context();
        let mut scripts = vec![CREATE_SCRIPT];
        scripts.extend(BOOTSTRAP_SCRIPTS);
        self.create_scripts(&scripts, &context)?;

        self.create_password_file(builder)?;

        if self.topology.is_clustered() {
            self.register_database(builder);
            self.add_instances(builder);
            self.disable_database(builder);
            self.create_database(builder);
            self.register_instance(builder, instance);
            self.cluster_post_create_actions(builder, &context)?;
        } else {
            self.create_database(builder);
            self.register_instance(builder, instance);
        }

        self.execute_scripts(builder);
        Ok(())
    }

    fn create_directories(&self, compensations: &mut Compensations) -> Result<()> {
        let (user, group) = self.owner();
        for dir in self.directories() {
            if !self.services.fs.directory_exists(&dir) {
                compensations.record(Compensation::RemoveDirectory(dir.clone()));
            }
            self.services.fs.ensure_directory(&dir)?;
            self.services.fs.set_ownership(&dir, user, group)?;
        }
        Ok(())
    }

    fn create_init_ora_file(&self) -> Result<()> {
        let path = self.init_ora_path();
        let mut content = self.spec.init_ora_content.clone();
        if self.topology.is_clustered() {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&self.topology.init_parameters());
            if let Some(scan) = &self.spec.scan_name {
                let port = self.spec.scan_port.unwrap_or(1521);
                content.push_str(&format!("*.remote_listener='{}:{}'\n", scan, port));
            }
        }
        self.services.fs.write_file(&path, &content)?;
        self.own(&path, CONFIG_MODE)?;
        tracing::debug!(path = %path.display(), "Init file created");
        Ok(())
    }

    fn create_scripts(&self, scripts: &[&str], context: &TemplateContext) -> Result<()> {
        tracing::info!(database = self.name.as_str(), scripts = ?scripts, "Creating scripts");
        for script in scripts {
            self.create_script(script, context)?;
        }
        Ok(())
    }

    fn create_script(&self, script: &str, context: &TemplateContext) -> Result<()> {
        let content = self.services.templates.render(script, context)?;
        let path = self.scripts_dir().join(script);
        self.services.fs.write_file(&path, &content)?;
        self.own(&path, SCRIPT_MODE)
    }

    fn own(&self, path: &Path, mode: u32) -> Result<()> {
        let (user, group) = self.owner();
        self.services.fs.set_ownership(path, user, group)?;
        self.services.fs.set_mode(path, mode)
    }

    fn create_password_file(&self, builder: &mut CommandBuilder) -> Result<()> {
        let password = self
            .spec
            .sys_password
            .as_deref()
            .context("sys_password is required to create a database")?;
        builder.add(
            Command::Orapwd(format!(
                "file={}/dbs/orapw{} force=y password={}",
                self.spec.oracle_home, self.name, password
            )),
            self.context(),
        );
        Ok(())
    }

    fn register_database(&self, builder: &mut CommandBuilder) {
        let mut args = format!(
            "add database -d {name} -o {home} -n {name} -m {name}",
            name = self.name,
            home = self.spec.oracle_home
        );
        if self.spec.spfile_location.is_some() {
            args.push_str(&format!(" -p {}", self.spfile_path()));
        }
        builder.add(Command::Srvctl(args), self.context());
    }

    fn add_instances(&self, builder: &mut CommandBuilder) {
        for (instance, node) in self.topology.instances() {
            builder.add(
                Command::Srvctl(format!(
                    "add instance -d {} -i {} -n {}",
                    self.name, instance, node
                )),
                self.context(),
            );
        }
    }

    fn disable_database(&self, builder: &mut CommandBuilder) {
        builder.add(
            Command::Srvctl(format!("disable database -d {}", self.name)),
            self.context(),
        );
    }

    fn create_database(&self, builder: &mut CommandBuilder) {
        builder.add(self.script_ref(CREATE_SCRIPT), self.unbounded_context());
    }

    fn register_instance(&self, builder: &mut CommandBuilder, instance: &str) {
        builder.add(
            Command::AddRegistryEntry {
                sid: instance.to_string(),
                home: self.spec.oracle_home.clone(),
                autostart: self.spec.autostart,
            },
            self.context(),
        );
    }

    fn cluster_post_create_actions(
        &self,
        builder: &mut CommandBuilder,
        context: &TemplateContext,
    ) -> Result<()> {
        self.create_script(RAC_POST_CREATE_SCRIPT, context)?;
        builder.add(self.script_ref(RAC_POST_CREATE_SCRIPT), self.unbounded_context());
        Ok(())
    }

    fn execute_scripts(&self, builder: &mut CommandBuilder) {
        if !self.spec.create_catalog {
            return;
        }
        for script in BOOTSTRAP_SCRIPTS {
            builder.after(self.script_ref(script), self.unbounded_context());
        }
    }

    // ─── Destroy ────────────────────────────────────────────────────────────

    /// Queue deregistration, the drop itself, and local cleanup once the drop succeeded.
    pub fn destroy(&self, builder: &mut CommandBuilder) -> Result<(), ProvisionError> {
        let instance = self.instance_name();
        tracing::info!(database = self.name.as_str(), instance = instance.as_str(), "Decommissioning database");

        if self.topology.is_clustered() {
            for (cluster_instance, _node) in self.topology.instances() {
                builder.add(
                    Command::Srvctl(format!(
                        "remove instance -d {} -i {}",
                        self.name, cluster_instance
                    )),
                    self.context(),
                );
            }
            builder.add(
                Command::Srvctl(format!("remove database -d {}", self.name)),
                self.context(),
            );
        }

        let statement =
            self.render(DESTROY_SCRIPT)
                .map_err(|e| ProvisionError::ProvisioningFailed {
                    resource: self.name.clone(),
                    cause: cause_text(&e),
                })?;
        builder.add(Command::Sql(statement), self.unbounded_context());

        let roots = self
            .removal_roots()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        builder.after(Command::RemoveDirectories(roots), self.context());
        builder.after(Command::RemoveRegistryEntry(instance), self.context());
        Ok(())
    }

    // ─── Modify ─────────────────────────────────────────────────────────────

    pub fn modify(&self, _builder: &mut CommandBuilder) -> Result<(), ProvisionError> {
        Err(ProvisionError::unsupported(
            &self.name,
            "modify",
            "database modification is not implemented",
        ))
    }

    // ─── Script rendering ───────────────────────────────────────────────────

    /// Render one of the database scripts for this declaration.
    pub fn render(&self, script: &str) -> Result<String> {
        self.services.templates.render(script, &self.template_context())
    }

    fn template_context(&self) -> TemplateContext {
        let spec = self.spec;
        let mut context = TemplateContext::new();
        context.insert("db", spec);
        context.insert("name", &self.name);
        context.insert("instance", &self.instance_name());
        context.insert("oracle_home", &spec.oracle_home);
        context.insert("oracle_base", &spec.oracle_base);
        context.insert("scripts_dir", &self.scripts_dir().display().to_string());
        context.insert("init_ora_path", &self.init_ora_path().display().to_string());
        context.insert("spfile_path", &self.spfile_path());
        context.insert("sys_password", spec.sys_password.as_deref().unwrap_or_default());
        context.insert(
            "system_password",
            spec.system_password.as_deref().unwrap_or_default(),
        );
        context
    }
}
