// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic test harness: a scripted domain and device.
//!
//! Commands post synchronously into a pending queue; the test decides when
//! responses are delivered, standing in for the transport's worker threads,
//! and when queued domain-thread work runs. An unscripted command is
//! answered with a synthesized timeout, the way a real transport reports
//! one.

use crate::{
    command::{Request, Response},
    completion::Completion,
    domain::{Attribute, Domain, DomainId, DomainTask, IpmbAddress, ResponseHandler},
    error::{Error, Kind},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_DOMAIN_ID: AtomicU64 = AtomicU64::new(1);

pub struct MockDomain {
    name: String,
    id: DomainId,
    attributes: Mutex<HashMap<String, Attribute>>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<u8, VecDeque<Vec<u8>>>,
    requests: Vec<(IpmbAddress, Request)>,
    pending: VecDeque<(ResponseHandler, Response)>,
    tasks: VecDeque<DomainTask>,
    fail_sends: bool,
}

impl MockDomain {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            id: DomainId::new(NEXT_DOMAIN_ID.fetch_add(1, Ordering::Relaxed)),
            attributes: Mutex::new(HashMap::new()),
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Queues one raw response (completion code first) for `cmd`.
    pub fn script(&self, cmd: u8, response: &[u8]) {
        self.inner
            .lock()
            .scripts
            .entry(cmd)
            .or_default()
            .push_back(response.to_vec());
    }

    /// Makes subsequent posts fail outright, before any response.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Every request posted so far, in order.
    pub fn requests(&self) -> Vec<(IpmbAddress, Request)> {
        self.inner.lock().requests.clone()
    }

    /// Delivers the oldest undelivered response, running its handler on the
    /// caller's thread. Returns whether there was one.
    pub fn deliver_next(&self) -> bool {
        let next = self.inner.lock().pending.pop_front();
        match next {
            Some((handler, response)) => {
                handler(response);
                true
            }
            None => false,
        }
    }

    pub fn deliver_all(&self) {
        while self.deliver_next() {}
    }

    /// Drains queued domain-thread work. Returns how many tasks ran.
    pub fn run_queued(&self) -> usize {
        let mut count = 0;
        loop {
            let task = self.inner.lock().tasks.pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }
}

impl Domain for MockDomain {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn id(&self) -> DomainId {
        self.id
    }

    fn attribute(&self, name: &str, init: &mut dyn FnMut() -> Attribute) -> Attribute {
        self.attributes
            .lock()
            .entry(name.to_string())
            .or_insert_with(init)
            .clone()
    }

    fn find_attribute(&self, name: &str) -> Option<Attribute> {
        self.attributes.lock().get(name).cloned()
    }

    fn send_command(
        &self,
        address: IpmbAddress,
        request: Request,
        handler: ResponseHandler,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.fail_sends {
            return Err(Kind::Invalid.err());
        }
        let data = inner
            .scripts
            .get_mut(&request.cmd)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| vec![Completion::TIMEOUT.0]);
        inner.requests.push((address, request));
        inner.pending.push_back((handler, Response::new(data)));
        Ok(())
    }

    fn run(&self, task: DomainTask) {
        self.inner.lock().tasks.push_back(task);
    }
}
