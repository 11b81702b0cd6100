// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The write engine.
//!
//! A write stages a fresh image on the domain thread, lets the accepting
//! decoder serialize into it and report which regions differ from the
//! device, then streams those regions back in coalesced commands of at most
//! 16 payload bytes. A busy device gets the same command bytes again, up to
//! a per-command ceiling. Writes run to completion even when the object is
//! marked deleted; a half-written inventory is worse than a late callback.

use super::{Fru, State};
use crate::{
    command::{self, Request, Response, WriteResponse, MAX_WRITE_PAYLOAD},
    completion::Completion,
    error::{Kind, Result},
};
use parking_lot::MutexGuard;
use std::sync::Arc;

/// Replays of one command tolerated before the busy code turns fatal.
pub(crate) const MAX_BUSY_RETRIES: u32 = 30;

pub(crate) type WriteCallback = Box<dyn FnOnce(&Arc<Fru>, Result<()>) + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Preparing,
    Streaming,
    Complete,
}

/// In-flight write. Dropped whole at completion, releasing the staging
/// buffer and the saved command.
pub(crate) struct WriteOp {
    staging: Vec<u8>,
    /// Saved verbatim for device-busy replay.
    last_command: Option<Request>,
    /// Payload bytes of the outstanding command.
    sent: usize,
    retry_count: u32,
    callback: Option<WriteCallback>,
    phase: Phase,
}

fn transition(op: &mut WriteOp, next: Phase) {
    tracing::trace!(prev = ?op.phase, ?next, "write phase");
    op.phase = next;
}

/// Entry point. Gates on `in_use` without side effect, then defers the
/// actual work to the domain thread.
pub(crate) fn start(fru: &Arc<Fru>, callback: WriteCallback) -> Result<()> {
    {
        let mut state = fru.lock();
        ensure!(!state.in_use, Err(Kind::Busy.err()));
        ensure!(state.ops.is_some(), Err(Kind::NotSupported.err()));
        state.in_use = true;
        state.write = Some(WriteOp {
            staging: Vec::new(),
            last_command: None,
            sent: 0,
            retry_count: 0,
            callback: Some(callback),
            phase: Phase::Preparing,
        });
    }

    let task = {
        let fru = fru.clone();
        Box::new(move || prepare(&fru))
    };
    fru.domain().run(task);
    Ok(())
}

/// Runs on the domain thread: stages the image, collects update records
/// from the decoder, and starts streaming.
fn prepare(fru: &Arc<Fru>) {
    let mut state = fru.lock();

    let data_len = state.data_len;
    let mut staging = Vec::new();
    if staging.try_reserve_exact(data_len).is_err() {
        return complete(fru, state, Err(Kind::OutOfMemory.err()));
    }
    staging.resize(data_len, 0);

    let Some(ops) = state.ops.clone() else {
        return complete(fru, state, Err(Kind::NotSupported.err()));
    };
    let Some(mut record_data) = state.record_data.take() else {
        return complete(fru, state, Err(Kind::NotSupported.err()));
    };

    // the decoder serializes under the object lock
    let mut records = state.records.drained();
    let result = ops.write(record_data.as_mut(), &mut staging, &mut records);
    state.record_data = Some(record_data);

    if let Err(error) = result {
        return complete(fru, state, Err(error));
    }
    if !records.within(data_len) {
        return complete(fru, state, Err(Kind::Invalid.err()));
    }
    state.records = records;

    if state.records.is_empty() {
        // nothing differs from the device image
        return complete(fru, state, Ok(()));
    }

    if let Some(op) = state.write.as_mut() {
        op.staging = staging;
        transition(op, Phase::Streaming);
    }
    next_batch(fru, state);
}

/// Builds and posts the next coalesced command, or completes when the
/// update queue is drained.
fn next_batch(fru: &Arc<Fru>, mut state: MutexGuard<'_, State>) {
    let shift = u32::from(state.access_by_words);
    let Some(batch) = state.records.take_batch(MAX_WRITE_PAYLOAD) else {
        return complete(fru, state, Ok(()));
    };

    let device_id = fru.address().device_id;
    let request = {
        let Some(op) = state.write.as_mut() else {
            debug_assert!(false, "write response without an in-flight write");
            return;
        };
        let payload = &op.staging[batch.clone()];
        let request = command::write_data(device_id, (batch.start >> shift) as u16, payload);
        op.sent = payload.len();
        op.last_command = Some(request.clone());
        // the busy ceiling applies per command
        op.retry_count = 0;
        request
    };

    drop(state);
    send(fru, request);
}

fn send(fru: &Arc<Fru>, request: Request) {
    let handler = {
        let fru = fru.clone();
        Box::new(move |response: Response| on_write_response(&fru, response))
    };
    if let Err(error) = fru
        .domain()
        .send_command(fru.address().ipmb(), request, handler)
    {
        let state = fru.lock();
        complete(fru, state, Err(error));
    }
}

fn on_write_response(fru: &Arc<Fru>, response: Response) {
    let mut state = fru.lock();
    ensure!(state.write.is_some());
    // no `deleted` check here: writes are not cancellable

    let code = response.completion();
    if code == Completion::FRU_DEVICE_BUSY {
        let replay = match state.write.as_mut() {
            Some(op) if op.retry_count < MAX_BUSY_RETRIES => {
                op.retry_count += 1;
                tracing::debug!(
                    fru = %fru.iname(),
                    retry = op.retry_count,
                    "device busy, replaying write",
                );
                op.last_command.clone()
            }
            _ => None,
        };
        if let Some(request) = replay {
            drop(state);
            return send(fru, request);
        }
        return complete(fru, state, Err(Kind::Completion { code }.err()));
    }
    if !code.is_ok() {
        return complete(fru, state, Err(Kind::Completion { code }.err()));
    }

    match WriteResponse::parse(response.body()) {
        Ok(ack) => {
            let shift = u32::from(state.access_by_words);
            let acked = usize::from(ack.count) << shift;
            let sent = state.write.as_ref().map_or(0, |op| op.sent);
            if acked < sent {
                tracing::warn!(
                    fru = %fru.iname(),
                    sent,
                    acked,
                    "device acknowledged a short write",
                );
            }
        }
        Err(error) => return complete(fru, state, Err(error)),
    }

    next_batch(fru, state);
}

/// Single completion routine for every write outcome. Lets the decoder
/// clear its dirty bookkeeping on success, releases the staging buffer,
/// and runs the user callback with the object unlocked.
fn complete(fru: &Arc<Fru>, mut state: MutexGuard<'_, State>, result: Result<()>) {
    if result.is_ok() {
        if let Some(ops) = state.ops.clone() {
            if let Some(mut record_data) = state.record_data.take() {
                ops.write_complete(record_data.as_mut());
                state.record_data = Some(record_data);
            }
        }
    }

    state.records.clear();
    let callback = match state.write.as_mut() {
        Some(op) => {
            transition(op, Phase::Complete);
            op.callback.take()
        }
        None => None,
    };
    state.write = None;
    state.in_use = false;

    match &result {
        Ok(()) => tracing::debug!(fru = %fru.iname(), "write complete"),
        Err(error) => tracing::debug!(fru = %fru.iname(), %error, "write failed"),
    }

    drop(state);
    if let Some(callback) = callback {
        callback(fru, result);
    }
}
