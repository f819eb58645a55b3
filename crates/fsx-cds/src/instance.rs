//! CDS instance
//!
//! [`CdsInstance`] owns the media (through the pool's [`AccessCache`]), the
//! block pool laid over the data region, and the in-memory registry. All
//! methods assume the caller holds the CDS lock.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use fsx_hal::{HalError, Psp};
use fsx_pool::{GenPool, PoolError};
use fsx_resource::{ResourceId, ResourceKind, SlotRecord, SlotTable};

use crate::cache::AccessCache;
use crate::crc::calculate_crc;
use crate::error::CdsError;
use crate::layout::{
    CdsConfig, BLOCK_HEADER_SIZE, CDS_MAX_FULL_NAME_LEN, CDS_POOL_ALIGN, CLEAR_CHUNK,
    MAX_USER_BLOCK_SIZE, REGISTRY_OFFSET, REGISTRY_SIZE_OFFSET, SIGNATURE_BEGIN, SIGNATURE_END,
    SIGNATURE_LEN, TRAILER_SIZE,
};
use crate::registry::{owner_name, CdsHandle, CdsRegRecord, REGISTRY_ENTRY_SIZE};

/// Result of checking both signatures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CdsValidity {
    Valid,
    Invalid,
}

/// Which path [`CdsInstance::early_init`] took
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CdsStartup {
    /// Persisted registry and pool were reused
    Recovered,
    /// Store was wiped and laid out fresh
    Reinitialized,
}

/// Outcome of a successful registration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CdsRegistration {
    /// A block was allocated (new name, or existing name with a new size)
    Created(CdsHandle),
    /// Name already registered with this size; contents untouched
    AlreadyExists(CdsHandle),
}

impl CdsRegistration {
    pub fn handle(self) -> CdsHandle {
        match self {
            CdsRegistration::Created(h) | CdsRegistration::AlreadyExists(h) => h,
        }
    }
}

/// Registry listing entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdsBlockInfo {
    pub handle: CdsHandle,
    pub name: String,
    /// Usable bytes (CRC header excluded)
    pub user_size: usize,
    pub block_offset: usize,
    pub critical_table: bool,
}

/// A mounted Critical Data Store
pub struct CdsInstance<P> {
    pool: GenPool<AccessCache<P>>,
    registry: SlotTable<CdsRegRecord>,
    config: CdsConfig,
    total_size: usize,
}

impl<P: Psp> CdsInstance<P> {
    /// Lay the configuration over the media without touching its contents.
    ///
    /// # Returns
    /// * `Ok(cds)` - Instance with an empty pool and registry
    /// * `Err(CdsError::Access)` - PSP could not report its size
    /// * `Err(CdsError::TooSmall)` - Media cannot hold the configured layout
    /// * `Err(CdsError::Pool)` - Bucket list rejected by the pool
    pub fn new(psp: P, config: CdsConfig) -> Result<Self, CdsError> {
        let platform_size = psp
            .cds_size()
            .map_err(|status| CdsError::Access { offset: 0, status })?;
        let total_size = platform_size & !3;

        let required = config.reqd_min_size();
        if total_size < required {
            log::error!("cds: size {} less than required {}", total_size, required);
            return Err(CdsError::TooSmall {
                size: total_size,
                required,
            });
        }

        let pool_offset = config.header_size();
        let data_size = total_size - config.reserved_size();
        let pool = GenPool::initialize(
            AccessCache::new(psp),
            pool_offset,
            data_size,
            CDS_POOL_ALIGN,
            &config.block_sizes,
        )?;

        Ok(Self {
            pool,
            registry: SlotTable::new(ResourceKind::CdsBlock, config.max_entries),
            config,
            total_size,
        })
    }

    /// Mount the store, reusing persisted content when it validates.
    ///
    /// Content that fails validation (signatures, registry size, unreadable
    /// registry) is wiped and the store reinitialized. Media errors while
    /// validating, or while replaying the pool, are returned; the store is
    /// then unavailable.
    pub fn early_init(psp: P, config: CdsConfig) -> Result<(Self, CdsStartup), CdsError> {
        let mut cds = Self::new(psp, config)?;

        let validity = cds.validate().map_err(|e| {
            log::error!("cds: error validating store: {}", e);
            e
        })?;

        let recovered = match validity {
            CdsValidity::Valid => match cds.rebuild() {
                Ok(()) => true,
                Err(CdsError::Invalid) => false,
                Err(e) => {
                    log::error!("cds: error rebuilding store: {}", e);
                    return Err(e);
                }
            },
            CdsValidity::Invalid => false,
        };

        if recovered {
            log::info!(
                "cds: recovered {} blocks from persistent store",
                cds.registry.count_used()
            );
            return Ok((cds, CdsStartup::Recovered));
        }

        cds.reinitialize().map_err(|e| {
            log::error!("cds: error initializing store: {}", e);
            e
        })?;
        log::info!("cds: store initialized, {} bytes", cds.total_size);
        Ok((cds, CdsStartup::Reinitialized))
    }

    fn reinitialize(&mut self) -> Result<(), CdsError> {
        self.clear()?;
        self.init_signatures()?;
        self.pool.reset();
        self.init_registry()
    }

    // ========================================================================
    // Layout
    // ========================================================================

    /// Check both signatures.
    ///
    /// # Returns
    /// * `Ok(Valid)` - Both signatures match
    /// * `Ok(Invalid)` - Either signature is overwritten
    /// * `Err(CdsError::Access)` - Media error
    pub fn validate(&mut self) -> Result<CdsValidity, CdsError> {
        let end_offset = self.total_size - TRAILER_SIZE;
        for (offset, signature) in [(0, SIGNATURE_BEGIN), (end_offset, SIGNATURE_END)] {
            if self.cache().fetch(offset, SIGNATURE_LEN)? != signature {
                log::warn!("cds: signature at {:#x} does not match", offset);
                return Ok(CdsValidity::Invalid);
            }
        }
        Ok(CdsValidity::Valid)
    }

    /// Zero the whole store.
    pub fn clear(&mut self) -> Result<(), CdsError> {
        let total = self.total_size;
        let cache = self.cache();
        for offset in (0..total).step_by(CLEAR_CHUNK) {
            let size = CLEAR_CHUNK.min(total - offset);
            cache.store(None, offset, size).map_err(|e| {
                log::error!("cds: clear failed at {:#x}: {}", offset, e);
                e
            })?;
        }
        Ok(())
    }

    /// Write both signatures.
    pub fn init_signatures(&mut self) -> Result<(), CdsError> {
        let end_offset = self.total_size - TRAILER_SIZE;
        let cache = self.cache();
        cache.store(Some(&SIGNATURE_BEGIN[..]), 0, SIGNATURE_LEN)?;
        cache.store(Some(&SIGNATURE_END[..]), end_offset, SIGNATURE_LEN)
    }

    /// Write the registry size, empty the registry and persist it.
    pub fn init_registry(&mut self) -> Result<(), CdsError> {
        let count = (self.config.max_entries as u32).to_le_bytes();
        self.cache().store(Some(&count[..]), REGISTRY_SIZE_OFFSET, count.len())?;
        self.registry.reset();
        self.update_registry()
    }

    /// Persist every registry slot.
    pub fn update_registry(&mut self) -> Result<(), CdsError> {
        let mut image = Vec::with_capacity(self.registry.capacity() * REGISTRY_ENTRY_SIZE);
        for record in self.registry.slots() {
            image.extend_from_slice(&record.to_bytes());
        }

        self.cache()
            .psp_mut()
            .write_cds(&image, REGISTRY_OFFSET)
            .map_err(|status| {
                log::error!("cds: failed to write registry: {}", status);
                CdsError::Access {
                    offset: REGISTRY_OFFSET,
                    status,
                }
            })
    }

    /// Reload the persisted registry and replay the pool descriptors.
    ///
    /// # Returns
    /// * `Ok(())` - Registry and pool restored
    /// * `Err(CdsError::Invalid)` - Registry size differs or registry unreadable
    /// * `Err(CdsError::Access)` - Media error while replaying the pool
    pub fn rebuild(&mut self) -> Result<(), CdsError> {
        let max_entries = self.config.max_entries;

        let stored = match self.cache().fetch(REGISTRY_SIZE_OFFSET, 4) {
            Ok(raw) => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
            Err(e) => {
                log::warn!("cds: error reading registry size: {}", e);
                return Err(CdsError::Invalid);
            }
        };
        if stored != max_entries {
            log::warn!("cds: registry in store has incorrect size ({})", stored);
            return Err(CdsError::Invalid);
        }

        let mut image = vec![0u8; max_entries * REGISTRY_ENTRY_SIZE];
        if let Err(status) = self.cache().psp().read_cds(&mut image, REGISTRY_OFFSET) {
            log::warn!("cds: registry is unreadable: {}", status);
            return Err(CdsError::Invalid);
        }

        self.registry.reset();
        for (slot, raw) in self
            .registry
            .slots_mut()
            .iter_mut()
            .zip(image.chunks_exact(REGISTRY_ENTRY_SIZE))
        {
            if let Ok(entry) = <&[u8; REGISTRY_ENTRY_SIZE]>::try_from(raw) {
                *slot = CdsRegRecord::from_bytes(entry);
            }
        }

        self.pool.rebuild().map_err(|e| self.pool_error(e))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register (or re-register) a named block of `user_size` bytes.
    ///
    /// An existing name with the same size keeps its block and contents. A
    /// different size frees the old block and allocates a new one under the
    /// same handle.
    ///
    /// # Returns
    /// * `Ok(Created(h))` - New block allocated and registry persisted
    /// * `Ok(AlreadyExists(h))` - Name already registered with this size
    /// * `Err(CdsError::InvalidSize)` - Zero or over the block limit
    /// * `Err(CdsError::InvalidName)` - Empty or too long
    /// * `Err(CdsError::Slot)` - Registry full
    /// * `Err(CdsError::Pool)` - No room in the pool
    pub fn register(
        &mut self,
        name: &str,
        user_size: usize,
        critical_table: bool,
    ) -> Result<CdsRegistration, CdsError> {
        if user_size == 0 || user_size > MAX_USER_BLOCK_SIZE {
            return Err(CdsError::InvalidSize(user_size));
        }
        if name.is_empty() || name.len() >= CDS_MAX_FULL_NAME_LEN {
            return Err(CdsError::InvalidName(String::from(name)));
        }

        let (id, is_new_entry) = match self.registry.find_by_name(name) {
            Some(record) => (record.id(), false),
            None => (self.registry.reserve()?.0, true),
        };
        let new_size = user_size + BLOCK_HEADER_SIZE;

        let (mut offset, old_size) = self.record(id).map(|r| (r.block_offset, r.block_size))?;

        if offset != 0 && old_size != new_size {
            self.pool.put_block(offset).map_err(|e| self.pool_error(e))?;
            offset = 0;
            let record = self.record_mut(id)?;
            record.block_offset = 0;
            record.block_size = 0;
        }

        let mut is_new_offset = false;
        if offset == 0 {
            let block = self
                .pool
                .get_block(new_size)
                .map_err(|e| self.pool_error(e))?;
            let record = self.record_mut(id)?;
            record.block_offset = block;
            record.block_size = new_size;
            is_new_offset = true;
        }

        if is_new_entry {
            let record = self.record_mut(id)?;
            record.critical_table = critical_table;
            record.name = String::from(name);
            record.set_used(id);
        }

        let handle = CdsHandle(id);
        if !is_new_offset {
            return Ok(CdsRegistration::AlreadyExists(handle));
        }

        self.update_registry()?;
        log::debug!("cds: registered {} ({} bytes) as {}", name, user_size, handle);
        Ok(CdsRegistration::Created(handle))
    }

    /// Remove a block, refusing while its owner is still active.
    ///
    /// # Arguments
    /// * `name` - Full block name
    /// * `critical_caller` - Caller manages critical tables; must match the block
    /// * `owner_active` - True if the named application is registered
    pub fn delete<F>(
        &mut self,
        name: &str,
        critical_caller: bool,
        owner_active: F,
    ) -> Result<(), CdsError>
    where
        F: Fn(&str) -> bool,
    {
        let (id, offset, critical) = self
            .registry
            .find_by_name(name)
            .map(|r| (r.id(), r.block_offset, r.critical_table))
            .ok_or_else(|| CdsError::NameNotFound(String::from(name)))?;

        if critical != critical_caller {
            return Err(CdsError::WrongType(String::from(name)));
        }
        if owner_active(owner_name(name)) {
            return Err(CdsError::OwnerActive(String::from(name)));
        }

        // A failed resize leaves the entry without a block
        if offset != 0 {
            self.pool.put_block(offset).map_err(|e| {
                let err = self.pool_error(e);
                log::error!("cds: failed to free block {}: {}", name, err);
                err
            })?;
        }
        self.registry.release(id)?;
        self.update_registry()
    }

    // ========================================================================
    // Block Access
    // ========================================================================

    /// Store `data` in the block, with a fresh CRC header.
    ///
    /// `data` must be exactly the registered size.
    pub fn write_block(&mut self, handle: CdsHandle, data: &[u8]) -> Result<(), CdsError> {
        let (offset, user_size) = self.checked_block(handle)?;
        if data.len() != user_size {
            return Err(CdsError::InvalidSize(data.len()));
        }

        let crc = calculate_crc(data, 0, self.config.crc).to_le_bytes();
        self.cache().store(Some(&crc[..]), offset, BLOCK_HEADER_SIZE)?;

        let user_offset = offset + BLOCK_HEADER_SIZE;
        self.cache()
            .psp_mut()
            .write_cds(data, user_offset)
            .map_err(|status| {
                log::error!("cds: error writing user data at {:#x}: {}", user_offset, status);
                CdsError::Access {
                    offset: user_offset,
                    status,
                }
            })
    }

    /// Read the block into `out` after verifying its CRC.
    ///
    /// `out` must be exactly the registered size and is left untouched on
    /// any error.
    pub fn read_block(&mut self, handle: CdsHandle, out: &mut [u8]) -> Result<(), CdsError> {
        let (offset, user_size) = self.checked_block(handle)?;
        if out.len() != user_size {
            return Err(CdsError::InvalidSize(out.len()));
        }

        let raw = self.cache().fetch(offset, BLOCK_HEADER_SIZE)?;
        let stored = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);

        let user_offset = offset + BLOCK_HEADER_SIZE;
        let mut data = vec![0u8; user_size];
        self.cache()
            .psp()
            .read_cds(&mut data, user_offset)
            .map_err(|status| CdsError::Access {
                offset: user_offset,
                status,
            })?;

        let computed = calculate_crc(&data, 0, self.config.crc);
        if computed != stored {
            log::warn!(
                "cds: CRC mismatch in block {} (stored {:#x}, computed {:#x})",
                handle,
                stored,
                computed
            );
            return Err(CdsError::CrcMismatch { stored, computed });
        }

        out.copy_from_slice(&data);
        Ok(())
    }

    /// Block offset and user size of a live block, cross-checked against
    /// its descriptor.
    fn checked_block(&mut self, handle: CdsHandle) -> Result<(usize, usize), CdsError> {
        let (offset, size) = self
            .registry
            .lookup(handle.0)
            .map(|r| (r.block_offset, r.block_size))
            .map_err(|_| CdsError::InvalidHandle(handle.0))?;

        let live = self
            .pool
            .get_block_size(offset)
            .map_err(|e| self.pool_error(e))?;
        if live <= BLOCK_HEADER_SIZE || live != size {
            log::warn!("cds: block size {} invalid, expected {}", live, size);
            return Err(CdsError::InvalidSize(live));
        }
        Ok((offset, size - BLOCK_HEADER_SIZE))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn find_by_name(&self, name: &str) -> Option<CdsHandle> {
        self.registry.find_by_name(name).map(|r| CdsHandle(r.id()))
    }

    pub fn block_name(&self, handle: CdsHandle) -> Result<&str, CdsError> {
        self.registry
            .lookup(handle.0)
            .map(|r| r.name.as_str())
            .map_err(|_| CdsError::InvalidHandle(handle.0))
    }

    /// Every registered block, in slot order.
    pub fn registry_info(&self) -> Vec<CdsBlockInfo> {
        self.registry
            .iter_used()
            .map(|r| CdsBlockInfo {
                handle: CdsHandle(r.id()),
                name: r.name.clone(),
                user_size: r.block_size.saturating_sub(BLOCK_HEADER_SIZE),
                block_offset: r.block_offset,
                critical_table: r.critical_table,
            })
            .collect()
    }

    pub fn config(&self) -> &CdsConfig {
        &self.config
    }

    /// Usable store size (platform size rounded down to a multiple of 4)
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn pool(&self) -> &GenPool<AccessCache<P>> {
        &self.pool
    }

    pub fn psp(&self) -> &P {
        self.pool.storage().psp()
    }

    /// Raw media access, bypassing the store.
    pub fn psp_mut(&mut self) -> &mut P {
        self.cache().psp_mut()
    }

    /// Unmount and hand back the media.
    pub fn into_psp(self) -> P {
        self.pool.into_storage().into_psp()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn cache(&mut self) -> &mut AccessCache<P> {
        self.pool.storage_mut()
    }

    fn record(&self, id: ResourceId) -> Result<&CdsRegRecord, CdsError> {
        self.registry
            .locate(id)
            .ok_or(CdsError::InvalidHandle(id))
    }

    fn record_mut(&mut self, id: ResourceId) -> Result<&mut CdsRegRecord, CdsError> {
        self.registry
            .locate_mut(id)
            .ok_or(CdsError::InvalidHandle(id))
    }

    /// Attach the PSP status to storage failures reported by the pool.
    fn pool_error(&self, err: PoolError) -> CdsError {
        match err {
            PoolError::StorageAccess(offset) => CdsError::Access {
                offset,
                status: self
                    .pool
                    .storage()
                    .last_status()
                    .unwrap_or(HalError::IoError),
            },
            other => CdsError::Pool(other),
        }
    }
}
