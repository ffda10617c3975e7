//! In-process stand-in for the generated simulator-side BFM glue.
//!
//! Each declared instance owns a queue of import messages. The simulator side
//! polls with [`LabBfmBackend::claim_next`], which is what the generated
//! HDL loop does once per cycle, and issues export calls with
//! [`LabBfmBackend::post_call`], which lands in the scheduler's inbox like any
//! other simulator event.

use super::SimPort;
use crate::bfm::backend::{BfmBackend, BfmInstanceDesc};
use crate::error::{Error, Result};
use crate::tracing_compat::trace;
use std::cell::RefCell;
use std::collections::VecDeque;

/// An import call waiting to be claimed by the simulator side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMsg {
    /// Index into the instance type's import table.
    pub method_id: usize,
    /// Packed parameter words.
    pub params: Vec<u64>,
}

/// Lab implementation of [`BfmBackend`].
#[derive(Debug)]
pub struct LabBfmBackend {
    instances: Vec<BfmInstanceDesc>,
    pending: RefCell<Vec<VecDeque<PendingMsg>>>,
    port: SimPort,
}

impl LabBfmBackend {
    /// Creates a backend with no instances, posting export calls into `port`.
    #[must_use]
    pub fn new(port: SimPort) -> Self {
        Self {
            instances: Vec::new(),
            pending: RefCell::new(Vec::new()),
            port,
        }
    }

    /// Declares the next instance. Instances are discovered in declaration
    /// order.
    #[must_use]
    pub fn with_instance(
        mut self,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
        class_path: impl Into<String>,
    ) -> Self {
        self.instances
            .push(BfmInstanceDesc::new(type_name, instance_name, class_path));
        self.pending.get_mut().push(VecDeque::new());
        self
    }

    /// Takes the oldest pending import message for `bfm_id`.
    pub fn claim_next(&self, bfm_id: usize) -> Option<PendingMsg> {
        self.pending.borrow_mut().get_mut(bfm_id)?.pop_front()
    }

    /// Number of unclaimed messages for `bfm_id`.
    #[must_use]
    pub fn pending(&self, bfm_id: usize) -> usize {
        self.pending.borrow().get(bfm_id).map_or(0, VecDeque::len)
    }

    /// Calls export `method_id` on `bfm_id` from the simulator side.
    pub fn post_call(&self, bfm_id: usize, method_id: usize, params: Vec<u64>) {
        self.port.call(bfm_id, method_id, params);
    }
}

impl BfmBackend for LabBfmBackend {
    fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn instance_info(&self, index: usize) -> Result<BfmInstanceDesc> {
        self.instances
            .get(index)
            .cloned()
            .ok_or_else(|| Error::out_of_range("bfm index", index, self.instances.len()))
    }

    fn send_msg(&self, bfm_id: usize, method_id: usize, params: &[u64]) -> Result<()> {
        let mut pending = self.pending.borrow_mut();
        let len = pending.len();
        let queue = pending
            .get_mut(bfm_id)
            .ok_or_else(|| Error::out_of_range("bfm id", bfm_id, len).with_bfm(bfm_id))?;
        trace!(bfm_id, method_id, "import message queued");
        queue.push_back(PendingMsg {
            method_id,
            params: params.to_vec(),
        });
        Ok(())
    }
}
