//! Pending-call router
//!
//! Owns the outbound correlation counter and one single-use reply slot per outstanding call.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

use crate::mcp::rpc::Message;

pub type ReplySlot = oneshot::Sender<Message>;
pub type ReplyReceiver = oneshot::Receiver<Message>;

#[derive(Debug)]
struct RouterState {
    next: u64,
    boxes: HashMap<u64, ReplySlot>,
}

#[derive(Debug)]
pub struct Router {
    state: Mutex<RouterState>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RouterState {
                next: 1,
                boxes: HashMap::new(),
            }),
        }
    }

    /// Allocates the next id and registers its reply slot.
    pub fn add(&self) -> (u64, ReplyReceiver) {
        let (slot, inbox) = oneshot::channel();
        let mut state = self.lock();
        let id = state.next;
        state.next += 1;
        state.boxes.insert(id, slot);
        (id, inbox)
    }

    /// Detaches the slot for `id`. This is the only way a slot leaves the map, so a
    /// slot is handed out at most once.
    pub fn remove(&self, id: u64) -> Option<ReplySlot> {
        self.lock().boxes.remove(&id)
    }

    /// Number of calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.lock().boxes.len()
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
