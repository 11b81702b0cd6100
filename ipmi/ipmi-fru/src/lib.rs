// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Access to FRU (Field Replaceable Unit) inventory storage on
//! IPMI-addressable devices.
//!
//! The engine reads a device's inventory area into a host-side buffer with
//! chunked `Read FRU Data` commands, hands the raw image to whichever
//! registered format decoder recognizes it, and flushes decoder-reported
//! dirty regions back with chunked `Write FRU Data` commands. All IPMI
//! traffic is posted through the owning [`Domain`] and completed from its
//! response handlers; nothing here blocks on the wire.
//!
//! Payload interpretation lives entirely in [`decode`] plug-ins. The engine
//! itself only understands the inventory area's outer shape: its advertised
//! size, its addressing unit, and the eight-byte common header that makes a
//! partially served area still worth keeping.

#[macro_use]
mod macros;

pub mod command;
pub mod completion;
pub mod decode;
pub mod domain;
pub mod error;
pub mod fru;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::{Request, Response};
pub use completion::Completion;
pub use decode::{
    deregister_decoder, register_decoder, Decoded, FruDecoder, FruOps, RecordData,
};
pub use domain::{Domain, DomainId, IpmbAddress};
pub use error::{Error, Kind, Result};
pub use fru::{
    iterate, DestroyHandler, Fru, FruAddress, FruRegistry, UpdateRecord, UpdateRecords,
    FETCH_ALL_AREAS,
};

/// Prepares process-wide engine state. Call once before registering
/// decoders.
pub fn init() {
    decode::init();
}

/// Releases process-wide engine state, dropping every registered decoder.
pub fn shutdown() {
    decode::shutdown();
}
