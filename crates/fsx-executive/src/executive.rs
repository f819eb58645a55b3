//! The executive: resource registries and the system log

use fsx_cds::{CdsInstance, CdsStartup, MAX_API_LEN};
use fsx_hal::Psp;
use fsx_resource::{ResourceId, SlotRecord, SlotTable};

use crate::config::PlatformConfig;
use crate::error::EsError;
use crate::sync::SharedLock;
use crate::syslog::{SysLog, SysLogEntry, SysLogMode, SysLogWrite};
use crate::tables::{AppId, AppType, CounterId, LibId, ResourceTables, TaskId};

/// Task details for housekeeping queries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub app_id: AppId,
    pub app_name: String,
}

/// Executive services over one platform.
///
/// Each table group has its own lock and no call holds two at once. Work
/// that needs data from two groups copies it out of the first lock.
pub struct Executive<P> {
    pub(crate) config: PlatformConfig,
    pub(crate) tables: SharedLock<ResourceTables>,
    pub(crate) cds: SharedLock<Option<CdsInstance<P>>>,
    pub(crate) cds_startup: Option<CdsStartup>,
    syslog: SharedLock<SysLog>,
}

impl<P: Psp> Executive<P> {
    /// Bring up the executive and mount the Critical Data Store.
    ///
    /// A store that cannot be mounted leaves the executive running with
    /// CDS services unavailable.
    pub fn new(psp: P, config: PlatformConfig) -> Result<Self, EsError> {
        config.validate()?;

        let mut exec = Self {
            tables: SharedLock::new("es-shared-data", ResourceTables::new(&config)),
            cds: SharedLock::new("es-cds", None),
            cds_startup: None,
            syslog: SharedLock::new(
                "es-syslog",
                SysLog::new(config.syslog_size, config.syslog_mode),
            ),
            config,
        };
        exec.cds_early_init(psp);
        Ok(exec)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    // ========================================================================
    // Applications
    // ========================================================================

    pub fn register_app(&self, name: &str, app_type: AppType) -> Result<AppId, EsError> {
        check_name(name)?;
        let result = self.tables.with(|t| -> Result<AppId, EsError> {
            if t.apps.find_by_name(name).is_some() {
                return Err(EsError::DuplicateName(name.to_owned()));
            }
            let (id, app) = t.apps.allocate()?;
            app.name = name.to_owned();
            app.app_type = app_type;
            Ok(AppId(id))
        });

        match &result {
            Ok(id) => log::debug!("es: registered app {} as {}", name, id),
            Err(e) => self.report(&format!("register_app: {}: {}", name, e)),
        }
        result
    }

    /// Remove an application together with its tasks and memory pools.
    ///
    /// Its CDS blocks are kept; they can be deleted once the owner is gone.
    pub fn delete_app(&self, id: AppId) -> Result<(), EsError> {
        let (name, tasks, pools) = self.tables.with(|t| -> Result<_, EsError> {
            t.apps.lookup(id.0).map_err(EsError::invalid(id))?;
            let tasks = t.tasks_of(id);
            let pools = t.pools_of(id);
            for task in &tasks {
                t.tasks.release(task.0)?;
            }
            for pool in &pools {
                t.pools.release(pool.0)?;
            }
            let app = t.apps.release(id.0)?;
            Ok((app.name, tasks.len(), pools.len()))
        })?;

        self.report(&format!(
            "es: deleted app {} ({} tasks, {} pools)",
            name, tasks, pools
        ));
        Ok(())
    }

    pub fn app_id_by_name(&self, name: &str) -> Result<AppId, EsError> {
        self.tables.with(|t| id_by_name(&t.apps, name)).map(AppId)
    }

    pub fn app_name(&self, id: AppId) -> Result<String, EsError> {
        self.tables.with(|t| name_of(&t.apps, id.0))
    }

    pub fn app_type(&self, id: AppId) -> Result<AppType, EsError> {
        self.tables.with(|t| {
            t.apps
                .lookup(id.0)
                .map(|app| app.app_type)
                .map_err(EsError::invalid(id))
        })
    }

    pub fn app_count(&self) -> usize {
        self.tables.with(|t| t.apps.count_used())
    }

    // ========================================================================
    // Libraries
    // ========================================================================

    pub fn register_lib(&self, name: &str) -> Result<LibId, EsError> {
        check_name(name)?;
        let result = self.tables.with(|t| -> Result<LibId, EsError> {
            if t.libs.find_by_name(name).is_some() {
                return Err(EsError::DuplicateName(name.to_owned()));
            }
            let (id, lib) = t.libs.allocate()?;
            lib.name = name.to_owned();
            Ok(LibId(id))
        });

        if let Err(e) = &result {
            self.report(&format!("register_lib: {}: {}", name, e));
        }
        result
    }

    pub fn lib_id_by_name(&self, name: &str) -> Result<LibId, EsError> {
        self.tables.with(|t| id_by_name(&t.libs, name)).map(LibId)
    }

    pub fn lib_name(&self, id: LibId) -> Result<String, EsError> {
        self.tables.with(|t| name_of(&t.libs, id.0))
    }

    pub fn lib_count(&self) -> usize {
        self.tables.with(|t| t.libs.count_used())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Record a task belonging to `parent`.
    pub fn create_task(&self, name: &str, parent: AppId) -> Result<TaskId, EsError> {
        check_name(name)?;
        let result = self.tables.with(|t| -> Result<TaskId, EsError> {
            if !t.apps.is_valid(parent.0) {
                return Err(EsError::InvalidId(parent.0));
            }
            if t.tasks.find_by_name(name).is_some() {
                return Err(EsError::DuplicateName(name.to_owned()));
            }
            let (id, task) = t.tasks.allocate()?;
            task.name = name.to_owned();
            task.parent = parent;
            Ok(TaskId(id))
        });

        if let Err(e) = &result {
            self.report(&format!("create_task: {}: {}", name, e));
        }
        result
    }

    pub fn delete_task(&self, id: TaskId) -> Result<(), EsError> {
        self.tables
            .with(|t| t.tasks.release(id.0))
            .map(|_| ())
            .map_err(EsError::invalid(id))
    }

    pub fn task_id_by_name(&self, name: &str) -> Result<TaskId, EsError> {
        self.tables.with(|t| id_by_name(&t.tasks, name)).map(TaskId)
    }

    pub fn task_name(&self, id: TaskId) -> Result<String, EsError> {
        self.tables.with(|t| name_of(&t.tasks, id.0))
    }

    pub fn task_info(&self, id: TaskId) -> Result<TaskInfo, EsError> {
        self.tables.with(|t| {
            let task = t.tasks.lookup(id.0).map_err(EsError::invalid(id))?;
            // A task whose parent is already gone still reports its id
            let app_name = t
                .apps
                .lookup(task.parent.0)
                .map(|app| app.name.clone())
                .unwrap_or_default();
            Ok(TaskInfo {
                task_id: id,
                name: task.name.clone(),
                app_id: task.parent,
                app_name,
            })
        })
    }

    pub fn task_count(&self) -> usize {
        self.tables.with(|t| t.tasks.count_used())
    }

    // ========================================================================
    // Generic Counters
    // ========================================================================

    pub fn register_counter(&self, name: &str) -> Result<CounterId, EsError> {
        check_name(name)?;
        self.tables.with(|t| -> Result<CounterId, EsError> {
            if t.counters.find_by_name(name).is_some() {
                return Err(EsError::DuplicateName(name.to_owned()));
            }
            let (id, counter) = t.counters.allocate()?;
            counter.name = name.to_owned();
            Ok(CounterId(id))
        })
    }

    pub fn delete_counter(&self, id: CounterId) -> Result<(), EsError> {
        self.tables
            .with(|t| t.counters.release(id.0).map_err(EsError::invalid(id)))
            .map(|_| ())
    }

    /// Add one to the counter, wrapping at `u32::MAX`.
    pub fn increment_counter(&self, id: CounterId) -> Result<(), EsError> {
        self.with_counter(id, |count| *count = count.wrapping_add(1))
    }

    pub fn set_counter(&self, id: CounterId, value: u32) -> Result<(), EsError> {
        self.with_counter(id, |count| *count = value)
    }

    pub fn counter_value(&self, id: CounterId) -> Result<u32, EsError> {
        self.with_counter(id, |count| *count)
    }

    pub fn counter_id_by_name(&self, name: &str) -> Result<CounterId, EsError> {
        self.tables
            .with(|t| id_by_name(&t.counters, name))
            .map(CounterId)
    }

    pub fn counter_name(&self, id: CounterId) -> Result<String, EsError> {
        self.tables.with(|t| name_of(&t.counters, id.0))
    }

    fn with_counter<R>(&self, id: CounterId, f: impl FnOnce(&mut u32) -> R) -> Result<R, EsError> {
        self.tables.with(|t| {
            t.counters
                .lookup_mut(id.0)
                .map(|counter| f(&mut counter.count))
                .map_err(EsError::invalid(id))
        })
    }

    // ========================================================================
    // System Log
    // ========================================================================

    /// Append a message to the system log and echo it to `log`.
    pub fn syslog_write(&self, message: &str) -> Result<SysLogWrite, EsError> {
        log::info!(target: "fsx::syslog", "{}", message.trim_end());
        self.syslog
            .with(|log| log.append(message))
            .ok_or(EsError::SysLogFull)
    }

    /// Snapshot of the log, oldest first.
    pub fn syslog_entries(&self) -> Vec<SysLogEntry> {
        self.syslog.with(|log| log.entries().cloned().collect())
    }

    /// The log as a JSON array, oldest first.
    pub fn syslog_json(&self) -> Result<String, EsError> {
        serde_json::to_string(&self.syslog_entries()).map_err(|e| EsError::Encode(e.to_string()))
    }

    pub fn syslog_clear(&self) {
        self.syslog.with(SysLog::clear);
    }

    pub fn syslog_set_mode(&self, mode: SysLogMode) {
        self.syslog.with(|log| log.set_mode(mode));
        log::info!(target: "fsx::syslog", "mode set to {:?}", mode);
    }

    /// Record a diagnostic. A full log in discard mode drops it.
    pub(crate) fn report(&self, message: &str) {
        if self.syslog_write(message).is_err() {
            log::warn!("es: system log full, dropped: {}", message);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resource names must be non-empty and shorter than the API name limit.
pub(crate) fn check_name(name: &str) -> Result<(), EsError> {
    if name.is_empty() || name.len() >= MAX_API_LEN {
        return Err(EsError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn id_by_name<R: SlotRecord>(table: &SlotTable<R>, name: &str) -> Result<ResourceId, EsError> {
    table
        .find_by_name(name)
        .map(SlotRecord::id)
        .ok_or_else(|| EsError::NameNotFound(name.to_owned()))
}

fn name_of<R: SlotRecord>(table: &SlotTable<R>, id: ResourceId) -> Result<String, EsError> {
    table
        .lookup(id)
        .map(|record| record.name().to_owned())
        .map_err(EsError::invalid(id))
}
