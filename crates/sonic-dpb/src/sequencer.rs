//! Phase-ordered application of a breakout.
//!
//! CONFIG_DB has no transactions, so safety comes from ordering alone:
//!
//! ```text
//! VALIDATE -> QUIESCE -> CHECK_DEPS -> APPLY_DELETE -> APPLY_ADD -> PERSIST_MODE -> DONE
//!     |          |           |
//!     +----------+-----------+--> ABORT
//! ```
//!
//! Ports are administratively down before anything is deleted, new ports
//! stay down until all of them are fully written, and the recorded mode is
//! the last thing to change. A failure after the first destructive write is
//! reported as [`DpbError::PartialApply`] with the mutations that completed;
//! there is no rollback.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use sonic_config_db::{ConfigRow, ConfigStore, FieldValues, RowRef};

use crate::artifact;
use crate::defaults::PortDefaults;
use crate::descriptor::{BreakoutDescriptor, ChildPortSpec};
use crate::error::{DpbError, DpbResult, RowList};
use crate::planner::{self, ReconciliationPlan};
use crate::tables::{admin_status, fields, CFG_BREAKOUT_CFG_TABLE_NAME, CFG_PORT_TABLE_NAME};
use crate::validator::{
    policy, Detach, DependencyReport, DependencyValidator, PolicyDecision, TableRegistry,
};

/// Sequencer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Resolve the request and compute the plan.
    Validate,
    /// Bring ports about to be deleted administratively down.
    Quiesce,
    /// Look for configuration referencing those ports.
    CheckDeps,
    /// Remove deleted ports.
    ApplyDelete,
    /// Create new ports.
    ApplyAdd,
    /// Record the new breakout mode.
    PersistMode,
    /// Finished.
    Done,
    /// Stopped before any destructive write.
    Abort,
}

impl Phase {
    /// Returns the phase name as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validate => "VALIDATE",
            Phase::Quiesce => "QUIESCE",
            Phase::CheckDeps => "CHECK_DEPS",
            Phase::ApplyDelete => "APPLY_DELETE",
            Phase::ApplyAdd => "APPLY_ADD",
            Phase::PersistMode => "PERSIST_MODE",
            Phase::Done => "DONE",
            Phase::Abort => "ABORT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with modeled rows that still reference deleted ports in a
/// forced run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Remove the references (delete or rewrite the rows).
    #[default]
    Remove,
    /// Leave the rows orphaned.
    Leave,
}

/// A breakout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakoutRequest {
    /// Parent port.
    pub port: String,
    /// Requested mode.
    pub target_mode: String,
    /// Proceed past modeled dependencies.
    pub force: bool,
    /// Write default configuration for new ports.
    pub load_defaults: bool,
    /// Skip the plan confirmation.
    pub assume_yes: bool,
}

impl BreakoutRequest {
    /// Creates a request with every flag off.
    pub fn new(port: impl Into<String>, target_mode: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            target_mode: target_mode.into(),
            force: false,
            load_defaults: false,
            assume_yes: false,
        }
    }

    /// Sets `force`.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets `load_defaults`.
    pub fn with_load_defaults(mut self, load_defaults: bool) -> Self {
        self.load_defaults = load_defaults;
        self
    }

    /// Sets `assume_yes`.
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }
}

/// Sequencer settings that come from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerOptions {
    /// Handling of forced modeled references.
    pub orphan_policy: OrphanPolicy,
    /// Admin status new ports end up with ("up" or "down").
    pub new_port_admin_status: String,
    /// MTU written to new ports.
    pub default_mtu: Option<u32>,
    /// Where to write the new-port artifact.
    pub artifact_path: Option<PathBuf>,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::Remove,
            new_port_admin_status: admin_status::DOWN.to_string(),
            default_mtu: Some(9100),
            artifact_path: None,
        }
    }
}

/// Asks the operator a yes/no question.
pub trait Confirmer: Send + Sync {
    /// Returns true if the operator accepts.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N]: ", prompt);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Result of a completed breakout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakoutSummary {
    /// The plan that was applied.
    pub plan: ReconciliationPlan,
    /// Modeled references bypassed with `--force`.
    pub forced: Vec<RowRef>,
    /// Rows deleted or rewritten to detach forced references.
    pub detached: Vec<RowRef>,
    /// Unmodeled references the operator accepted.
    pub unverified: Vec<RowRef>,
    /// Artifact location, if one was written.
    pub artifact: Option<PathBuf>,
}

/// Outcome of a breakout run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakoutOutcome {
    /// The port is already in the requested mode.
    NoOp {
        /// Parent port.
        port: String,
        /// The mode it is in.
        mode: String,
    },
    /// The breakout was applied.
    Done(BreakoutSummary),
}

/// Plan and dependency report, computed without mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakoutPreview {
    /// The plan.
    pub plan: ReconciliationPlan,
    /// References to the ports the plan would delete.
    pub dependencies: DependencyReport,
}

/// Drives one breakout through its phases.
pub struct SafetySequencer<'a, S: ConfigStore + ?Sized> {
    descriptor: &'a BreakoutDescriptor,
    registry: &'a TableRegistry,
    store: &'a S,
    confirmer: &'a dyn Confirmer,
    defaults: Option<&'a dyn PortDefaults>,
    options: SequencerOptions,
    phase: Phase,
    history: Vec<Phase>,
    completed: Vec<String>,
    destructive: bool,
}

impl<'a, S: ConfigStore + ?Sized> SafetySequencer<'a, S> {
    /// Creates a sequencer.
    pub fn new(
        descriptor: &'a BreakoutDescriptor,
        registry: &'a TableRegistry,
        store: &'a S,
        confirmer: &'a dyn Confirmer,
    ) -> Self {
        Self {
            descriptor,
            registry,
            store,
            confirmer,
            defaults: None,
            options: SequencerOptions::default(),
            phase: Phase::Validate,
            history: Vec::new(),
            completed: Vec::new(),
            destructive: false,
        }
    }

    /// Sets the provider of default rows for new ports.
    pub fn with_defaults(mut self, defaults: &'a dyn PortDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Sets the options.
    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases entered during the last run, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Mutations completed during the last run, in order.
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    /// Computes the plan and dependency report for a request without
    /// writing anything.
    #[instrument(skip(self))]
    pub async fn preview(&self, port: &str, target_mode: &str) -> DpbResult<BreakoutPreview> {
        let current_mode = self.current_mode(port).await?;
        self.descriptor.resolve(port, target_mode)?;
        let plan = planner::plan(self.descriptor, port, &current_mode, target_mode)?;
        let dependencies = DependencyValidator::new(self.registry)
            .check(self.store, &plan.delete_names())
            .await?;
        Ok(BreakoutPreview { plan, dependencies })
    }

    /// Runs a breakout.
    #[instrument(skip(self, request), fields(port = %request.port, mode = %request.target_mode))]
    pub async fn run(&mut self, request: &BreakoutRequest) -> DpbResult<BreakoutOutcome> {
        self.history.clear();
        self.completed.clear();
        self.destructive = false;

        self.enter(Phase::Validate, &request.port);
        let plan = match self.validate(request).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                self.enter(Phase::Abort, &request.port);
                return Ok(BreakoutOutcome::NoOp {
                    port: request.port.clone(),
                    mode: request.target_mode.clone(),
                });
            }
            Err(e) => return Err(self.fail(e)),
        };

        self.enter(Phase::Quiesce, &request.port);
        if let Err(e) = self.quiesce(&plan).await {
            return Err(self.fail(e));
        }

        self.enter(Phase::CheckDeps, &request.port);
        let (forced, unverified) = match self.check_deps(request, &plan).await {
            Ok(refs) => refs,
            Err(e) => return Err(self.fail(e)),
        };

        self.enter(Phase::ApplyDelete, &request.port);
        let detached = match self.apply_delete(&plan, &forced).await {
            Ok(detached) => detached,
            Err(e) => return Err(self.fail(e)),
        };

        self.enter(Phase::ApplyAdd, &request.port);
        if let Err(e) = self.apply_add(request, &plan).await {
            return Err(self.fail(e));
        }

        self.enter(Phase::PersistMode, &request.port);
        if let Err(e) = self.persist_mode(request).await {
            return Err(self.fail(e));
        }

        self.enter(Phase::Done, &request.port);
        let artifact = self.write_artifact(&plan);
        info!(
            port = %request.port,
            "Breakout {} -> {} complete: deleted {:?}, added {:?}",
            plan.current_mode,
            plan.target_mode,
            plan.delete_names(),
            plan.add_names()
        );

        Ok(BreakoutOutcome::Done(BreakoutSummary {
            plan,
            forced,
            detached,
            unverified,
            artifact,
        }))
    }

    fn enter(&mut self, phase: Phase, port: &str) {
        info!(port = %port, from = %self.phase, to = %phase, "Breakout phase transition");
        self.phase = phase;
        self.history.push(phase);
    }

    /// Maps a phase failure to the error reported to the caller. Before the
    /// first destructive write the run aborts; afterwards the failure is a
    /// partial apply.
    fn fail(&mut self, err: DpbError) -> DpbError {
        if !self.destructive {
            warn!("Breakout aborted in {}: {}", self.phase, err);
            self.phase = Phase::Abort;
            self.history.push(Phase::Abort);
            return err;
        }

        error!(
            "Breakout failed in {} after {} mutation(s): {}",
            self.phase,
            self.completed.len(),
            err
        );
        for mutation in &self.completed {
            error!("  completed: {}", mutation);
        }
        DpbError::PartialApply {
            phase: self.phase,
            completed: self.completed.clone(),
            message: err.to_string(),
        }
    }

    async fn current_mode(&self, port: &str) -> DpbResult<String> {
        self.descriptor.group(port)?;
        self.store
            .get_field(CFG_BREAKOUT_CFG_TABLE_NAME, port, fields::BRKOUT_MODE)
            .await?
            .ok_or_else(|| DpbError::ModeNotRecorded {
                port: port.to_string(),
            })
    }

    async fn validate(&self, request: &BreakoutRequest) -> DpbResult<Option<ReconciliationPlan>> {
        let port = &request.port;
        self.descriptor.resolve(port, &request.target_mode)?;
        let current_mode = self.current_mode(port).await?;

        if current_mode == request.target_mode {
            warn!(port = %port, "{} is already in mode {}, no action", port, current_mode);
            return Ok(None);
        }

        let plan = planner::plan(self.descriptor, port, &current_mode, &request.target_mode)?;
        info!(
            port = %port,
            "Breakout {} -> {}: delete {:?}, add {:?}, preserve {:?}",
            current_mode,
            request.target_mode,
            plan.delete_names(),
            plan.add_names(),
            plan.preserved
        );

        if !request.assume_yes {
            let prompt = format!(
                "Breakout {} from {} to {}: delete {:?}, add {:?}. Continue?",
                port,
                current_mode,
                request.target_mode,
                plan.delete_names(),
                plan.add_names()
            );
            if !self.confirmer.confirm(&prompt) {
                return Err(DpbError::ConfirmationDeclined { port: port.clone() });
            }
        }

        Ok(Some(plan))
    }

    async fn quiesce(&mut self, plan: &ReconciliationPlan) -> DpbResult<()> {
        let store = self.store;

        for port in &plan.delete {
            match store.get(CFG_PORT_TABLE_NAME, &port.name).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(DpbError::quiesce(&port.name, "PORT row missing")),
                Err(e) => return Err(DpbError::quiesce(&port.name, e)),
            }
        }

        for port in &plan.delete {
            store
                .set_field(
                    CFG_PORT_TABLE_NAME,
                    &port.name,
                    fields::ADMIN_STATUS,
                    admin_status::DOWN,
                )
                .await
                .map_err(|e| DpbError::quiesce(&port.name, e))?;
            self.record(format!(
                "SET {}|{} {}={}",
                CFG_PORT_TABLE_NAME,
                port.name,
                fields::ADMIN_STATUS,
                admin_status::DOWN
            ));
            debug!("Shut down {}", port.name);
        }
        Ok(())
    }

    async fn check_deps(
        &self,
        request: &BreakoutRequest,
        plan: &ReconciliationPlan,
    ) -> DpbResult<(Vec<RowRef>, Vec<RowRef>)> {
        let report = DependencyValidator::new(self.registry)
            .check(self.store, &plan.delete_names())
            .await?;

        match policy(&report, request.force) {
            PolicyDecision::Clear => Ok((Vec::new(), Vec::new())),
            PolicyDecision::Abort { blockers } => {
                for row in &blockers {
                    error!("Dependency: {}", row);
                }
                Err(DpbError::BlockingDependency {
                    rows: RowList(blockers),
                })
            }
            PolicyDecision::Proceed {
                forced,
                needs_confirmation,
            } => {
                for row in &forced {
                    warn!("Forcing past dependency {}", row);
                }
                if !needs_confirmation.is_empty() {
                    let rows = RowList(needs_confirmation.clone());
                    let prompt = format!(
                        "Configuration that cannot be verified references ports to be deleted:{}\nContinue?",
                        rows
                    );
                    if !self.confirmer.confirm(&prompt) {
                        return Err(DpbError::UnmodeledDependencyDeclined { rows });
                    }
                    warn!("Operator accepted {} unverified reference(s)", rows.0.len());
                }
                Ok((forced, needs_confirmation))
            }
        }
    }

    async fn apply_delete(
        &mut self,
        plan: &ReconciliationPlan,
        forced: &[RowRef],
    ) -> DpbResult<Vec<RowRef>> {
        let store = self.store;

        for port in &plan.delete {
            let status = store
                .get_field(CFG_PORT_TABLE_NAME, &port.name, fields::ADMIN_STATUS)
                .await
                .map_err(|e| DpbError::quiesce(&port.name, e))?;
            if status.as_deref() != Some(admin_status::DOWN) {
                return Err(DpbError::quiesce(
                    &port.name,
                    format!("admin_status is {:?} before deletion", status),
                ));
            }
        }

        let detached = self.detach(plan, forced).await?;

        for port in &plan.delete {
            store.delete(CFG_PORT_TABLE_NAME, &port.name).await?;
            self.record_destructive(format!("DEL {}|{}", CFG_PORT_TABLE_NAME, port.name));
            info!("Deleted port {}", port.name);
        }
        Ok(detached)
    }

    async fn detach(&mut self, plan: &ReconciliationPlan, forced: &[RowRef]) -> DpbResult<Vec<RowRef>> {
        let mut detached = Vec::new();
        if forced.is_empty() {
            return Ok(detached);
        }
        if self.options.orphan_policy == OrphanPolicy::Leave {
            for row in forced {
                warn!("Leaving {} referencing deleted ports", row);
            }
            return Ok(detached);
        }

        let store = self.store;
        let ports = plan.delete_names();
        for row_ref in forced {
            let Some(table) = self.registry.modeled(&row_ref.table) else {
                continue;
            };
            let Some(fields) = store.get(&row_ref.table, &row_ref.key).await? else {
                continue;
            };
            let row = ConfigRow::new(&row_ref.table, &row_ref.key, fields);

            match table.detach(&row, &ports) {
                Detach::Unchanged => {}
                Detach::DeleteRow => {
                    store.delete(&row_ref.table, &row_ref.key).await?;
                    self.record_destructive(format!("DEL {}", row_ref));
                    info!("Removed {}", row_ref);
                    detached.push(row_ref.clone());
                }
                Detach::Rewrite(fields) => {
                    store.replace(&row_ref.table, &row_ref.key, &fields).await?;
                    self.record_destructive(format!("SET {}", row_ref));
                    info!("Detached deleted ports from {}", row_ref);
                    detached.push(row_ref.clone());
                }
                Detach::Rekey { key, fields } => {
                    if store.get(&row_ref.table, &key).await?.is_some() {
                        warn!("{}|{} already exists, keeping it", row_ref.table, key);
                    } else {
                        store.set(&row_ref.table, &key, &fields).await?;
                        self.record_destructive(format!("SET {}|{}", row_ref.table, key));
                    }
                    store.delete(&row_ref.table, &row_ref.key).await?;
                    self.record_destructive(format!("DEL {}", row_ref));
                    info!("Moved {} to {}|{}", row_ref, row_ref.table, key);
                    detached.push(row_ref.clone());
                }
            }
        }
        Ok(detached)
    }

    async fn apply_add(&mut self, request: &BreakoutRequest, plan: &ReconciliationPlan) -> DpbResult<()> {
        let store = self.store;

        for port in &plan.add {
            let base = self.base_fields(port);
            store.set(CFG_PORT_TABLE_NAME, &port.name, &base).await?;
            self.record_destructive(format!("SET {}|{}", CFG_PORT_TABLE_NAME, port.name));
            info!("Added port {} lanes {} speed {}", port.name, port.lanes_field(), port.speed);

            if request.load_defaults {
                let defaults = self.defaults;
                match defaults {
                    Some(defaults) => {
                        for row in defaults.default_rows(port) {
                            store.set(&row.table, &row.key, &row.fields).await?;
                            self.record_destructive(format!("SET {}", row.row_ref()));
                            debug!("Default config {} for {}", row.row_ref(), port.name);
                        }
                    }
                    None => warn!("No default configuration available for {}", port.name),
                }
            }
        }

        if self.options.new_port_admin_status == admin_status::UP {
            for port in &plan.add {
                store
                    .set_field(CFG_PORT_TABLE_NAME, &port.name, fields::ADMIN_STATUS, admin_status::UP)
                    .await?;
                self.record_destructive(format!(
                    "SET {}|{} {}={}",
                    CFG_PORT_TABLE_NAME,
                    port.name,
                    fields::ADMIN_STATUS,
                    admin_status::UP
                ));
            }
        }
        Ok(())
    }

    fn base_fields(&self, port: &ChildPortSpec) -> FieldValues {
        let mut fvs = FieldValues::new();
        if !port.alias.is_empty() {
            fvs.push((fields::ALIAS.to_string(), port.alias.clone()));
        }
        fvs.push((fields::LANES.to_string(), port.lanes_field()));
        fvs.push((fields::SPEED.to_string(), port.speed.to_string()));
        fvs.push((fields::INDEX.to_string(), port.index.to_string()));
        if let Some(mtu) = self.options.default_mtu {
            fvs.push((fields::MTU.to_string(), mtu.to_string()));
        }
        fvs.push((fields::ADMIN_STATUS.to_string(), admin_status::DOWN.to_string()));
        fvs
    }

    async fn persist_mode(&mut self, request: &BreakoutRequest) -> DpbResult<()> {
        self.store
            .set_field(
                CFG_BREAKOUT_CFG_TABLE_NAME,
                &request.port,
                fields::BRKOUT_MODE,
                &request.target_mode,
            )
            .await?;
        self.record_destructive(format!(
            "SET {}|{} {}={}",
            CFG_BREAKOUT_CFG_TABLE_NAME,
            request.port,
            fields::BRKOUT_MODE,
            request.target_mode
        ));
        Ok(())
    }

    fn write_artifact(&self, plan: &ReconciliationPlan) -> Option<PathBuf> {
        let path = self.options.artifact_path.as_ref()?;
        match artifact::write(path, &artifact::build(&plan.add)) {
            Ok(()) => {
                info!("New port configuration written to {}", path.display());
                Some(path.clone())
            }
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                None
            }
        }
    }

    fn record(&mut self, mutation: String) {
        self.completed.push(mutation);
    }

    fn record_destructive(&mut self, mutation: String) {
        self.destructive = true;
        self.record(mutation);
    }
}
