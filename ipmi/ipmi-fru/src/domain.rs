// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The surface the engine consumes from the surrounding management domain.
//!
//! The domain owns the IPMI transport, the per-domain attribute registry,
//! and a serialized work queue (the "domain thread"). All of them are
//! external; the engine only posts commands, awaits response handlers, and
//! parks its object registry in an attribute.

use crate::{
    command::{Request, Response},
    error::Error,
};
use std::{any::Any, sync::Arc};

/// Opaque identifier of a management domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DomainId(u64);

impl DomainId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// IPMB address of a FRU device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpmbAddress {
    pub channel: u8,
    /// 7-bit slave address of the owning controller.
    pub slave_address: u8,
    /// 2-bit logical unit.
    pub lun: u8,
}

/// Handler for a posted command. The transport invokes it exactly once, on
/// one of its worker threads, unless the post itself failed. A
/// transport-level timeout is delivered as a synthesized response carrying
/// [`Completion::TIMEOUT`].
///
/// [`Completion::TIMEOUT`]: crate::completion::Completion::TIMEOUT
pub type ResponseHandler = Box<dyn FnOnce(Response) + Send>;

/// Work item queued onto the domain thread.
pub type DomainTask = Box<dyn FnOnce() + Send>;

/// Payload of a named per-domain attribute.
pub type Attribute = Arc<dyn Any + Send + Sync>;

pub trait Domain: Send + Sync {
    /// Printable domain name, the prefix of every FRU name.
    fn name(&self) -> String;

    fn id(&self) -> DomainId;

    /// Finds the named attribute, creating it with `init` when absent. The
    /// lookup and the insert are atomic with respect to other callers.
    fn attribute(&self, name: &str, init: &mut dyn FnMut() -> Attribute) -> Attribute;

    /// Finds the named attribute without creating it.
    fn find_attribute(&self, name: &str) -> Option<Attribute>;

    /// Posts a command to the addressed device. `handler` runs when the
    /// response (or a synthesized timeout) arrives; on `Err` the handler is
    /// never invoked.
    fn send_command(
        &self,
        address: IpmbAddress,
        request: Request,
        handler: ResponseHandler,
    ) -> Result<(), Error>;

    /// Queues work onto the domain thread.
    fn run(&self, task: DomainTask);
}
