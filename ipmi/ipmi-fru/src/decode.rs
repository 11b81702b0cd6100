// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Format decoder plug-ins.
//!
//! The engine does not interpret inventory payloads. A decoder registers
//! process-wide, is consulted in registration order once a raw image has
//! been fetched, and the first one to recognize the image claims the FRU:
//! its scratch state lands in the object's record-data slot and its
//! [`FruOps`] hooks drive subsequent writes.

use crate::{
    error::{Kind, Result},
    fru::UpdateRecords,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::{any::Any, sync::Arc};

/// Scratch state a decoder attaches to a FRU it accepted. Decoders downcast
/// it back to their own type in the [`FruOps`] hooks.
pub type RecordData = Box<dyn Any + Send>;

/// Flush hooks installed by the accepting decoder.
pub trait FruOps: Send + Sync {
    /// Serializes the decoder's current logical state into `staging` (a
    /// zero-filled image of the full inventory area) and appends an update
    /// record for every region that differs from what the device holds.
    ///
    /// Runs on the domain thread with the object lock held.
    fn write(
        &self,
        record_data: &mut dyn Any,
        staging: &mut [u8],
        records: &mut UpdateRecords,
    ) -> Result<()>;

    /// Runs once every record has reached the device, so dirty bookkeeping
    /// can be cleared.
    fn write_complete(&self, record_data: &mut dyn Any);

    /// Runs at final teardown, before the record-data slot is dropped.
    fn cleanup_records(&self, record_data: &mut dyn Any) {
        let _ = record_data;
    }
}

/// A successful decode: the scratch state and the ops to install.
pub struct Decoded {
    pub record_data: RecordData,
    pub ops: Arc<dyn FruOps>,
}

/// A format decoder.
pub trait FruDecoder: Send + Sync {
    /// Attempts to interpret a fetched inventory image. Returns `None` to
    /// decline, passing the image to the next registered decoder.
    ///
    /// Called with the object lock held; the raw image and the allocation's
    /// fetch mask are passed directly so the decoder never needs to call
    /// back into the object.
    fn decode(&self, data: &[u8], fetch_mask: u32) -> Option<Decoded>;
}

static DECODERS: Lazy<RwLock<Vec<Arc<dyn FruDecoder>>>> = Lazy::new(Default::default);

/// Appends a decoder to the process-wide registry.
pub fn register_decoder(decoder: Arc<dyn FruDecoder>) {
    DECODERS.write().push(decoder);
}

/// Removes a previously registered decoder, by identity.
pub fn deregister_decoder(decoder: &Arc<dyn FruDecoder>) -> Result<()> {
    let mut decoders = DECODERS.write();
    let before = decoders.len();
    decoders.retain(|registered| !Arc::ptr_eq(registered, decoder));
    ensure!(decoders.len() != before, Err(Kind::Invalid.err()));
    Ok(())
}

/// Consults decoders in registration order; the first success wins.
pub(crate) fn dispatch(data: &[u8], fetch_mask: u32) -> Result<Decoded> {
    // snapshot so a decoder may (de)register others from inside `decode`
    let decoders: Vec<_> = DECODERS.read().clone();
    for decoder in &decoders {
        if let Some(decoded) = decoder.decode(data, fetch_mask) {
            return Ok(decoded);
        }
    }
    Err(Kind::UnsupportedFormat.err())
}

pub(crate) fn init() {}

pub(crate) fn shutdown() {
    DECODERS.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOps;

    impl FruOps for NoOps {
        fn write(
            &self,
            _record_data: &mut dyn Any,
            _staging: &mut [u8],
            _records: &mut UpdateRecords,
        ) -> Result<()> {
            Ok(())
        }

        fn write_complete(&self, _record_data: &mut dyn Any) {}
    }

    struct MagicDecoder {
        magic: u8,
        tag: u8,
    }

    impl FruDecoder for MagicDecoder {
        fn decode(&self, data: &[u8], _fetch_mask: u32) -> Option<Decoded> {
            (data.first() == Some(&self.magic)).then(|| Decoded {
                record_data: Box::new(self.tag),
                ops: Arc::new(NoOps),
            })
        }
    }

    #[test]
    fn first_match_wins_test() {
        let first: Arc<dyn FruDecoder> = Arc::new(MagicDecoder { magic: 0xE7, tag: 1 });
        let second: Arc<dyn FruDecoder> = Arc::new(MagicDecoder { magic: 0xE7, tag: 2 });
        register_decoder(first.clone());
        register_decoder(second.clone());

        let decoded = dispatch(&[0xE7], u32::MAX).unwrap();
        // registration order decides
        assert_eq!(decoded.record_data.downcast_ref::<u8>(), Some(&1));

        assert!(dispatch(&[0xE8], u32::MAX).is_err());

        deregister_decoder(&first).unwrap();
        assert!(dispatch(&[0xE7], u32::MAX).is_ok());
        deregister_decoder(&second).unwrap();
        assert!(matches!(
            dispatch(&[0xE7], u32::MAX).map(drop).unwrap_err().kind(),
            Kind::UnsupportedFormat
        ));

        // a second deregistration no longer finds it
        assert!(deregister_decoder(&first).is_err());
    }
}
