//! Critical Data Store services
//!
//! Application-facing wrappers over [`CdsInstance`]. Every call runs under
//! the CDS lock. Deleting a block needs the set of running applications,
//! which is copied out of the shared data lock first so the two locks are
//! never held together.

use fsx_cds::{
    form_name, CdsBlockInfo, CdsError, CdsHandle, CdsInstance, CdsRegistration, CdsStartup,
    CDS_MAX_FULL_NAME_LEN, CDS_MAX_NAME_LEN, MAX_USER_BLOCK_SIZE,
};
use fsx_hal::Psp;

use crate::error::EsError;
use crate::executive::Executive;
use crate::tables::AppId;

impl<P: Psp> Executive<P> {
    /// Mount the store at startup. Failure leaves CDS services unavailable.
    pub(crate) fn cds_early_init(&mut self, psp: P) {
        match CdsInstance::early_init(psp, self.config.cds.clone()) {
            Ok((cds, startup)) => {
                let message = match startup {
                    CdsStartup::Recovered => format!(
                        "cds: recovered {} blocks",
                        cds.registry_info().len()
                    ),
                    CdsStartup::Reinitialized => {
                        format!("cds: initialized {} bytes", cds.total_size())
                    }
                };
                *self.cds.lock() = Some(cds);
                self.cds_startup = Some(startup);
                self.report(&message);
            }
            Err(e) => {
                log::error!("cds: unavailable: {}", e);
                self.report(&format!("cds: unavailable: {}", e));
            }
        }
    }

    pub fn cds_available(&self) -> bool {
        self.cds.with(|cds| cds.is_some())
    }

    /// How the store came up, if it did.
    pub fn cds_startup(&self) -> Option<CdsStartup> {
        self.cds_startup
    }

    /// Register a block named `"<app>.<local_name>"`.
    ///
    /// # Arguments
    /// * `app` - Owning application
    /// * `local_name` - Block name within the application
    /// * `size` - User data size in bytes
    ///
    /// # Returns
    /// * `Ok(Created(h))` - New block; contents undefined until written
    /// * `Ok(AlreadyExists(h))` - Same name and size as a block from a
    ///   previous run; contents can be restored
    /// * `Err(EsError::InvalidName)` - Local name empty or too long
    /// * `Err(EsError::InvalidId)` - `app` is not registered
    /// * `Err(EsError::Cds)` - Store refused the registration
    pub fn register_cds(
        &self,
        app: AppId,
        local_name: &str,
        size: usize,
    ) -> Result<CdsRegistration, EsError> {
        if local_name.is_empty() || local_name.len() >= CDS_MAX_NAME_LEN {
            return Err(EsError::InvalidName(local_name.to_owned()));
        }
        let app_name = self.app_name(app)?;
        self.register_cds_ex(&form_name(&app_name, local_name), size, false)
    }

    /// Register a block by full name, as the table services do.
    ///
    /// Size and name are checked before the CDS lock is taken.
    pub fn register_cds_ex(
        &self,
        full_name: &str,
        size: usize,
        critical_table: bool,
    ) -> Result<CdsRegistration, EsError> {
        let result = if size == 0 || size > MAX_USER_BLOCK_SIZE {
            Err(EsError::Cds(CdsError::InvalidSize(size)))
        } else if full_name.is_empty() || full_name.len() >= CDS_MAX_FULL_NAME_LEN {
            Err(EsError::InvalidName(full_name.to_owned()))
        } else {
            self.with_cds(|cds| Ok(cds.register(full_name, size, critical_table)?))
        };
        match &result {
            Ok(CdsRegistration::AlreadyExists(h)) => {
                log::debug!("cds: {} already registered as {}", full_name, h)
            }
            Ok(CdsRegistration::Created(_)) => {}
            Err(e) => self.report(&format!("register_cds: {}: {}", full_name, e)),
        }
        result
    }

    /// Save `data` to a block. `data` must match the registered size.
    pub fn copy_to_cds(&self, handle: CdsHandle, data: &[u8]) -> Result<(), EsError> {
        let result = self.with_cds(|cds| Ok(cds.write_block(handle, data)?));
        if let Err(e) = &result {
            self.report(&format!("copy_to_cds: {}: {}", handle, e));
        }
        result
    }

    /// Restore a block into `out`, which must match the registered size.
    ///
    /// On a CRC mismatch `out` is left untouched and the error returned.
    pub fn restore_from_cds(&self, handle: CdsHandle, out: &mut [u8]) -> Result<(), EsError> {
        let result = self.with_cds(|cds| Ok(cds.read_block(handle, out)?));
        if let Err(e) = &result {
            self.report(&format!("restore_from_cds: {}: {}", handle, e));
        }
        result
    }

    pub fn cds_block_id_by_name(&self, name: &str) -> Result<CdsHandle, EsError> {
        self.with_cds(|cds| {
            cds.find_by_name(name)
                .ok_or_else(|| EsError::NameNotFound(name.to_owned()))
        })
    }

    pub fn cds_block_name(&self, handle: CdsHandle) -> Result<String, EsError> {
        self.with_cds(|cds| match cds.block_name(handle) {
            Ok(name) => Ok(name.to_owned()),
            Err(_) => Err(EsError::InvalidId(handle.0)),
        })
    }

    /// Delete a block by full name.
    ///
    /// Refused while the owning application is still registered, or when
    /// `critical_caller` does not match the block's critical-table flag.
    pub fn delete_cds(&self, name: &str, critical_caller: bool) -> Result<(), EsError> {
        let running = self.tables.with(|t| t.app_names());
        let result = self.with_cds(|cds| {
            cds.delete(name, critical_caller, |owner| {
                running.iter().any(|app| app == owner)
            })
            .map_err(|e| match e {
                CdsError::NameNotFound(name) => EsError::NameNotFound(name),
                e => EsError::Cds(e),
            })
        });

        match &result {
            Ok(()) => self.report(&format!("cds: deleted {}", name)),
            Err(e) => self.report(&format!("delete_cds: {}: {}", name, e)),
        }
        result
    }

    /// Listing of every registered block.
    pub fn cds_registry(&self) -> Result<Vec<CdsBlockInfo>, EsError> {
        self.with_cds(|cds| Ok(cds.registry_info()))
    }

    /// Unmount the store and hand back the media.
    pub fn take_psp(&self) -> Option<P> {
        self.cds.lock().take().map(CdsInstance::into_psp)
    }

    fn with_cds<R>(
        &self,
        f: impl FnOnce(&mut CdsInstance<P>) -> Result<R, EsError>,
    ) -> Result<R, EsError> {
        let mut guard = self.cds.lock();
        let cds = guard.as_mut().ok_or(EsError::CdsUnavailable)?;
        f(cds)
    }
}
