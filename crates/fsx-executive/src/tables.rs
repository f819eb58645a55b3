//! Executive resource tables
//!
//! One [`SlotTable`] per resource kind, all guarded together by the shared
//! data lock. Memory pool records live here too, but each pool carries its
//! own lock so buffer traffic does not hold up table updates.

use fsx_pool::{GenPool, RamStorage};
use fsx_resource::{typed_id, ResourceId, ResourceKind, SlotRecord, SlotTable};
use serde::{Deserialize, Serialize};

use crate::config::PlatformConfig;
use crate::sync::{Arc, SharedLock};

typed_id!(
    /// Application handle
    AppId,
    ResourceKind::App
);
typed_id!(
    /// Library handle
    LibId,
    ResourceKind::Lib
);
typed_id!(
    /// Task handle
    TaskId,
    ResourceKind::Task
);
typed_id!(
    /// Generic counter handle
    CounterId,
    ResourceKind::Counter
);
typed_id!(
    /// Memory pool handle
    MemHandle,
    ResourceKind::MemPool
);

/// How an application was started
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    /// Part of the executive image
    Core,
    /// Loaded at runtime
    #[default]
    External,
}

// ============================================================================
// Records
// ============================================================================

macro_rules! named_record {
    ($record:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct $record {
            pub id: ResourceId,
            pub name: String,
            $(pub $field: $ty,)*
        }

        impl SlotRecord for $record {
            fn id(&self) -> ResourceId {
                self.id
            }

            fn set_id(&mut self, id: ResourceId) {
                self.id = id;
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

named_record!(AppRecord { app_type: AppType });
named_record!(LibRecord {});
named_record!(TaskRecord { parent: AppId });
named_record!(CounterRecord { count: u32 });

/// Shared handle to one pool and its lock
pub type SharedPool = Arc<SharedLock<GenPool<RamStorage>>>;

/// Memory pool record
///
/// The pool is `None` while the slot is reserved for a pool being set up.
#[derive(Default)]
pub struct MemPoolRecord {
    pub id: ResourceId,
    pub owner: AppId,
    pub pool: Option<SharedPool>,
}

impl SlotRecord for MemPoolRecord {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn set_id(&mut self, id: ResourceId) {
        self.id = id;
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Everything guarded by the shared data lock
pub struct ResourceTables {
    pub apps: SlotTable<AppRecord>,
    pub libs: SlotTable<LibRecord>,
    pub tasks: SlotTable<TaskRecord>,
    pub counters: SlotTable<CounterRecord>,
    pub pools: SlotTable<MemPoolRecord>,
}

impl ResourceTables {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            apps: SlotTable::new(ResourceKind::App, config.max_apps),
            libs: SlotTable::new(ResourceKind::Lib, config.max_libs),
            tasks: SlotTable::new(ResourceKind::Task, config.max_tasks),
            counters: SlotTable::new(ResourceKind::Counter, config.max_gen_counters),
            pools: SlotTable::new(ResourceKind::MemPool, config.max_mem_pools),
        }
    }

    /// Names of all registered applications
    pub fn app_names(&self) -> Vec<String> {
        self.apps.iter_used().map(|app| app.name.clone()).collect()
    }

    /// Tasks whose parent is `app`
    pub fn tasks_of(&self, app: AppId) -> Vec<TaskId> {
        self.tasks
            .iter_used()
            .filter(|task| task.parent == app)
            .map(|task| TaskId(task.id))
            .collect()
    }

    /// Fully set-up pools owned by `app`
    pub fn pools_of(&self, app: AppId) -> Vec<MemHandle> {
        self.pools
            .iter_used()
            .filter(|rec| rec.owner == app && rec.pool.is_some())
            .map(|rec| MemHandle(rec.id))
            .collect()
    }
}
