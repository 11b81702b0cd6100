// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The read engine.
//!
//! Phase 1 asks the device for its inventory area info (total size and
//! addressing unit). Phase 2 walks the area in `fetch_size` chunks, probing
//! smaller chunks when the device rejects a read it should have honored.
//! Every response handler checks for cancellation before touching the
//! buffer.

use super::{
    FetchedCallback, Fru, State, UpdateRecords, FETCH_BACKOFF_STEP, MAX_FETCH_SIZE, MIN_AREA_SIZE,
    MIN_FETCH_SIZE,
};
use crate::{
    command::{self, AreaInfo, ReadResponse, Response},
    decode,
    error::{Kind, Result},
};
use parking_lot::MutexGuard;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    #[default]
    Idle,
    AreaInfo,
    Data,
    Complete,
}

fn transition(state: &mut State, next: Phase) {
    tracing::trace!(prev = ?state.phase, ?next, "fetch phase");
    state.phase = next;
}

/// Posts the area-info request. The handler closure holds the operation's
/// reference to the object.
pub(crate) fn start(fru: &Arc<Fru>) -> Result<()> {
    {
        let mut state = fru.lock();
        debug_assert!(state.in_use);
        transition(&mut state, Phase::AreaInfo);
    }
    let request = command::area_info(fru.address().device_id);
    let handler = {
        let fru = fru.clone();
        Box::new(move |response: Response| on_area_info(&fru, response))
    };
    fru.domain()
        .send_command(fru.address().ipmb(), request, handler)
}

pub(crate) fn refetch(fru: &Arc<Fru>, fetched: FetchedCallback) -> Result<()> {
    {
        let mut state = fru.lock();
        ensure!(!state.deleted, Err(Kind::Cancelled.err()));
        ensure!(!state.in_use, Err(Kind::Busy.err()));
        state.in_use = true;
        state.fetch_size = MAX_FETCH_SIZE;
        state.data = Vec::new();
        state.data_len = 0;
        state.curr_pos = 0;
        state.fetched = Some(fetched);
        transition(&mut state, Phase::Idle);
    }
    if let Err(error) = start(fru) {
        let mut state = fru.lock();
        state.in_use = false;
        state.fetched = None;
        return Err(error);
    }
    Ok(())
}

fn on_area_info(fru: &Arc<Fru>, response: Response) {
    let mut state = fru.lock();
    ensure!(state.phase == Phase::AreaInfo);
    if state.deleted {
        return complete(fru, state, Err(Kind::Cancelled.err()));
    }

    let code = response.completion();
    if !code.is_ok() {
        return complete(fru, state, Err(Kind::Completion { code }.err()));
    }

    let info = match AreaInfo::parse(response.body()) {
        Ok(info) => info,
        Err(error) => return complete(fru, state, Err(error)),
    };

    let size = usize::from(info.size);
    if size < MIN_AREA_SIZE {
        return complete(fru, state, Err(Kind::AreaTooSmall.err()));
    }

    let mut data = Vec::new();
    if data.try_reserve_exact(size).is_err() {
        return complete(fru, state, Err(Kind::OutOfMemory.err()));
    }
    data.resize(size, 0);

    state.data = data;
    state.data_len = size;
    state.curr_pos = 0;
    state.access_by_words = info.access_by_words;
    state.records = UpdateRecords::new(info.access_by_words);
    transition(&mut state, Phase::Data);
    tracing::debug!(
        fru = %fru.iname(),
        size,
        by_words = info.access_by_words,
        "inventory area",
    );

    next_read(fru, state);
}

/// Posts the next chunk read, or completes when the cursor reached the end.
/// The offset and count are converted to the device's addressing unit.
fn next_read(fru: &Arc<Fru>, state: MutexGuard<'_, State>) {
    if state.curr_pos >= state.data_len {
        return complete(fru, state, Ok(()));
    }

    let shift = u32::from(state.access_by_words);
    let count = state.fetch_size.min(state.data_len - state.curr_pos);
    let request = command::read_data(
        fru.address().device_id,
        (state.curr_pos >> shift) as u16,
        (count >> shift) as u8,
    );
    drop(state);

    let handler = {
        let fru = fru.clone();
        Box::new(move |response: Response| on_read_data(&fru, response))
    };
    if let Err(error) = fru
        .domain()
        .send_command(fru.address().ipmb(), request, handler)
    {
        let state = fru.lock();
        complete(fru, state, Err(error));
    }
}

fn on_read_data(fru: &Arc<Fru>, response: Response) {
    let mut state = fru.lock();
    ensure!(state.phase == Phase::Data);
    if state.deleted {
        return complete(fru, state, Err(Kind::Cancelled.err()));
    }

    let code = response.completion();
    if !code.is_ok() {
        // probe smaller chunks before giving up: some devices reject or
        // silently drop reads they advertised support for
        if code.triggers_read_backoff() && state.fetch_size > MIN_FETCH_SIZE {
            state.fetch_size -= FETCH_BACKOFF_STEP;
            tracing::debug!(
                fru = %fru.iname(),
                fetch_size = state.fetch_size,
                code = ?code,
                "read back-off",
            );
            return next_read(fru, state);
        }

        // once the header is in hand, treat what was retrieved as the whole
        // area: devices exist that advertise more than they can serve
        if state.curr_pos >= MIN_AREA_SIZE {
            let len = state.curr_pos;
            tracing::debug!(
                fru = %fru.iname(),
                len,
                code = ?code,
                "truncating inventory to retrieved bytes",
            );
            state.data.truncate(len);
            state.data_len = len;
            return complete(fru, state, Ok(()));
        }

        return complete(fru, state, Err(Kind::Completion { code }.err()));
    }

    let read = match ReadResponse::parse(response.body()) {
        Ok(read) => read,
        Err(error) => return complete(fru, state, Err(error)),
    };

    let shift = u32::from(state.access_by_words);
    let count = usize::from(read.count) << shift;

    // a zero count would never advance the cursor; a count beyond the
    // received payload or the declared area is a device bug
    if count == 0 || count > read.data.len() || count > state.data_len - state.curr_pos {
        return complete(fru, state, Err(Kind::Invalid.err()));
    }

    let pos = state.curr_pos;
    state.data[pos..pos + count].copy_from_slice(&read.data[..count]);
    state.curr_pos += count;

    next_read(fru, state);
}

/// Single completion routine for every fetch outcome. Dispatches decoders
/// on success, releases the buffer on error, and runs the user callback
/// with the object unlocked.
fn complete(fru: &Arc<Fru>, mut state: MutexGuard<'_, State>, mut result: Result<()>) {
    if result.is_ok() {
        let data_len = state.data_len;
        match decode::dispatch(&state.data[..data_len], state.fetch_mask) {
            Ok(decoded) => {
                state.record_data = Some(decoded.record_data);
                state.ops = Some(decoded.ops);
            }
            Err(error) => result = Err(error),
        }
    }

    // every fatal outcome releases the buffer, a decode failure included
    if result.is_err() {
        state.data = Vec::new();
        state.data_len = 0;
        state.curr_pos = 0;
    }

    transition(&mut state, Phase::Complete);
    let callback = state.fetched.take();
    state.in_use = false;

    match &result {
        Ok(()) => tracing::debug!(fru = %fru.iname(), len = state.data_len, "fetch complete"),
        Err(error) => tracing::debug!(fru = %fru.iname(), %error, "fetch failed"),
    }

    drop(state);
    if let Some(callback) = callback {
        callback.invoke(fru, result);
    }
}
