// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! FRU objects.
//!
//! An allocated object immediately starts fetching its inventory area; the
//! caller's handle, the domain registry (for tracked objects), and the
//! in-flight operation each hold a strong reference. Destruction marks the
//! object `deleted` and drops the registry reference; whichever holder drops
//! the last reference triggers final teardown and the user destroy handler.

mod fetch;
mod registry;
mod update;
mod write;

pub use registry::{iterate, FruRegistry};
pub use update::{UpdateRecord, UpdateRecords};

use crate::{
    decode::{FruOps, RecordData},
    domain::{Domain, DomainId, IpmbAddress},
    error::{Kind, Result},
};
use core::fmt;
use parking_lot::{Mutex, MutexGuard};
use std::{
    any::Any,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Largest chunk the read engine asks for before any back-off.
pub(crate) const MAX_FETCH_SIZE: usize = 32;
/// Smallest chunk; a device that cannot serve this much at once is given up
/// on.
pub(crate) const MIN_FETCH_SIZE: usize = 16;
/// Back-off decrements the chunk size by this much per failed probe.
pub(crate) const FETCH_BACKOFF_STEP: usize = 8;
/// Shortest valid inventory area: the FRU common header is eight bytes.
pub(crate) const MIN_AREA_SIZE: usize = 8;

/// Fetch mask passed to decoders when the caller does not restrict which
/// areas to interpret.
pub const FETCH_ALL_AREAS: u32 = u32::MAX;

static NEXT_FRU_ID: AtomicU64 = AtomicU64::new(0);

/// Addressing of a FRU device. Immutable after allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FruAddress {
    /// Logical FRU access through a management controller. Physical access
    /// is not implemented.
    pub is_logical: bool,
    /// 7-bit bus address of the owning controller.
    pub device_address: u8,
    /// FRU device id, 0-255.
    pub device_id: u8,
    /// 2-bit logical unit.
    pub lun: u8,
    pub private_bus: u8,
    pub channel: u8,
}

impl FruAddress {
    pub(crate) fn ipmb(&self) -> IpmbAddress {
        IpmbAddress {
            channel: self.channel,
            slave_address: self.device_address,
            lun: self.lun,
        }
    }
}

/// Runs after the last reference to a destroyed object is dropped.
pub type DestroyHandler = Box<dyn FnOnce(&Fru) + Send>;

/// Fetch completion, one flavor per allocator.
pub(crate) enum FetchedCallback {
    Fru(Box<dyn FnOnce(&Arc<Fru>, Result<()>) + Send>),
    Domain(Box<dyn FnOnce(&Arc<dyn Domain>, &Arc<Fru>, Result<()>) + Send>),
}

impl FetchedCallback {
    pub(crate) fn invoke(self, fru: &Arc<Fru>, result: Result<()>) {
        match self {
            Self::Fru(callback) => callback(fru, result),
            Self::Domain(callback) => callback(&fru.domain, fru, result),
        }
    }
}

pub(crate) struct State {
    /// A fetch or write owns the object.
    in_use: bool,
    /// Set by destruction; reads observe it on handler entry and cancel.
    deleted: bool,
    in_frulist: bool,
    /// Adaptive read chunk, probed down by capability back-off.
    fetch_size: usize,
    access_by_words: bool,
    data: Vec<u8>,
    data_len: usize,
    curr_pos: usize,
    phase: fetch::Phase,
    record_data: Option<RecordData>,
    ops: Option<Arc<dyn FruOps>>,
    records: UpdateRecords,
    fetched: Option<FetchedCallback>,
    write: Option<write::WriteOp>,
    fetch_mask: u32,
    normal_fru: bool,
    destroy_handler: Option<DestroyHandler>,
}

pub struct Fru {
    name: String,
    iname: String,
    domain: Arc<dyn Domain>,
    domain_id: DomainId,
    address: FruAddress,
    state: Mutex<State>,
}

impl Fru {
    /// Allocates a registry-tracked object and starts the inventory fetch.
    /// `fetched` runs once, after the raw image has been retrieved and
    /// decoded, or the fetch failed.
    pub fn alloc(
        domain: Arc<dyn Domain>,
        address: FruAddress,
        fetched: impl FnOnce(&Arc<Fru>, Result<()>) + Send + 'static,
    ) -> Result<Arc<Fru>> {
        Self::new(
            domain,
            address,
            FETCH_ALL_AREAS,
            true,
            FetchedCallback::Fru(Box::new(fetched)),
        )
    }

    /// Like [`Fru::alloc`], completing through a domain-level callback.
    pub fn domain_alloc(
        domain: Arc<dyn Domain>,
        address: FruAddress,
        fetched: impl FnOnce(&Arc<dyn Domain>, &Arc<Fru>, Result<()>) + Send + 'static,
    ) -> Result<Arc<Fru>> {
        Self::new(
            domain,
            address,
            FETCH_ALL_AREAS,
            true,
            FetchedCallback::Domain(Box::new(fetched)),
        )
    }

    /// Allocates an object the registry never sees. The caller owns its
    /// lifetime and must destroy it with [`Fru::destroy_untracked`].
    /// `fetch_mask` restricts which areas decoders interpret.
    pub fn alloc_notrack(
        domain: Arc<dyn Domain>,
        address: FruAddress,
        fetch_mask: u32,
        fetched: impl FnOnce(&Arc<dyn Domain>, &Arc<Fru>, Result<()>) + Send + 'static,
    ) -> Result<Arc<Fru>> {
        Self::new(
            domain,
            address,
            fetch_mask,
            false,
            FetchedCallback::Domain(Box::new(fetched)),
        )
    }

    fn new(
        domain: Arc<dyn Domain>,
        address: FruAddress,
        fetch_mask: u32,
        track: bool,
        fetched: FetchedCallback,
    ) -> Result<Arc<Fru>> {
        ensure!(address.is_logical, Err(Kind::NotSupported.err()));

        let id = NEXT_FRU_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}.fru{}", domain.name(), id);
        let iname = format!(
            "fru({},{:#04x},{})",
            address.channel, address.device_address, address.device_id
        );

        let fru = Arc::new(Fru {
            name,
            iname,
            domain_id: domain.id(),
            domain,
            address,
            state: Mutex::new(State {
                in_use: true,
                deleted: false,
                in_frulist: false,
                fetch_size: MAX_FETCH_SIZE,
                access_by_words: false,
                data: Vec::new(),
                data_len: 0,
                curr_pos: 0,
                phase: fetch::Phase::Idle,
                record_data: None,
                ops: None,
                records: UpdateRecords::new(false),
                fetched: Some(fetched),
                write: None,
                fetch_mask,
                normal_fru: false,
                destroy_handler: None,
            }),
        });

        if track {
            FruRegistry::attach(&*fru.domain)?.insert(&fru);
        }

        tracing::debug!(fru = %fru.iname, name = %fru.name, tracked = track, "allocated");

        if let Err(error) = fetch::start(&fru) {
            if track {
                if let Some(registry) = FruRegistry::find(&*fru.domain) {
                    registry.remove(&fru);
                }
            }
            return Err(error);
        }

        Ok(fru)
    }

    /// Destroys a registry-tracked object. Fails with *permission denied*
    /// for untracked objects. The handler runs after the last reference is
    /// dropped; an in-flight fetch observes the deletion and completes with
    /// *cancelled*.
    pub fn destroy(self: &Arc<Self>, handler: Option<DestroyHandler>) -> Result<()> {
        // the removal is the gate: exactly one caller wins the registry
        // entry, so racing destroys cannot clobber an installed handler
        let removed = FruRegistry::find(&*self.domain)
            .map_or(false, |registry| registry.remove(self));
        ensure!(removed, Err(Kind::PermissionDenied.err()));
        let mut state = self.state.lock();
        state.deleted = true;
        state.destroy_handler = handler;
        tracing::debug!(fru = %self.iname, "destroy requested");
        Ok(())
    }

    /// Destroys an object allocated with [`Fru::alloc_notrack`]. Fails with
    /// *permission denied* when the object is registry-tracked.
    pub fn destroy_untracked(self: &Arc<Self>, handler: Option<DestroyHandler>) -> Result<()> {
        let mut state = self.state.lock();
        if state.in_frulist {
            return Err(Kind::PermissionDenied.err());
        }
        state.deleted = true;
        state.destroy_handler = handler;
        Ok(())
    }

    /// Re-reads the inventory area from the device. Fails with *busy* while
    /// another operation owns the object.
    pub fn fetch(
        self: &Arc<Self>,
        fetched: impl FnOnce(&Arc<Fru>, Result<()>) + Send + 'static,
    ) -> Result<()> {
        fetch::refetch(self, FetchedCallback::Fru(Box::new(fetched)))
    }

    /// Flushes decoder-reported dirty regions back to the device. Fails
    /// with *busy* while another operation owns the object. The flush runs
    /// on the domain thread and, unlike a fetch, is never cancelled by
    /// destruction.
    pub fn write(
        self: &Arc<Self>,
        done: impl FnOnce(&Arc<Fru>, Result<()>) + Send + 'static,
    ) -> Result<()> {
        write::start(self, Box::new(done))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic name used in log output.
    pub fn iname(&self) -> &str {
        &self.iname
    }

    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    pub(crate) fn domain(&self) -> &Arc<dyn Domain> {
        &self.domain
    }

    pub fn address(&self) -> &FruAddress {
        &self.address
    }

    /// Length of the fetched inventory image. Zero until a fetch completes.
    pub fn data_len(&self) -> usize {
        self.state.lock().data_len
    }

    /// Runs `f` over the raw inventory image under the object lock.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let state = self.state.lock();
        f(&state.data)
    }

    /// Replaces the decoder scratch slot.
    pub fn set_record_data(&self, record_data: RecordData) {
        self.state.lock().record_data = Some(record_data);
    }

    /// Runs `f` over the decoder scratch slot under the object lock.
    pub fn with_record_data<R>(&self, f: impl FnOnce(Option<&mut dyn Any>) -> R) -> R {
        let mut state = self.state.lock();
        match state.record_data.as_mut() {
            Some(data) => {
                let data: &mut dyn Any = data.as_mut();
                f(Some(data))
            }
            None => f(None),
        }
    }

    pub fn is_normal_fru(&self) -> bool {
        self.state.lock().normal_fru
    }

    /// Marks the object as a standard FRU device (as opposed to inventory
    /// reachable only through sensor records).
    pub fn set_normal_fru(&self, normal: bool) {
        self.state.lock().normal_fru = normal;
    }

    /// Areas the allocator asked decoders to interpret.
    pub fn fetch_mask(&self) -> u32 {
        self.state.lock().fetch_mask
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
}

impl fmt::Debug for Fru {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fru")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

impl Drop for Fru {
    fn drop(&mut self) {
        {
            let state = self.state.get_mut();
            if let Some(ops) = state.ops.take() {
                if let Some(record_data) = state.record_data.as_mut() {
                    ops.cleanup_records(record_data.as_mut());
                }
            }
            state.record_data = None;
            state.records.clear();
            state.data = Vec::new();
        }
        if let Some(handler) = self.state.get_mut().destroy_handler.take() {
            tracing::debug!(fru = %self.iname, "destroyed");
            handler(self);
        }
    }
}
