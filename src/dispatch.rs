//! Last-request-wins delivery of async results to a presentation context.
//!
//! A screen owns one [`RequestSlot`] per kind of request (movie list, detail,
//! reviews, ...) and reads finished results from the paired receiver. Submitting
//! a new request aborts the one in flight; a request that was superseded or
//! cancelled never delivers, even if it had already finished computing.
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<T> {
    pub ticket: u64,
    pub output: T,
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    in_flight: Option<AbortHandle>,
}

impl SlotState {
    fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

pub struct RequestSlot<T> {
    name: &'static str,
    state: Arc<Mutex<SlotState>>,
    deliveries: mpsc::UnboundedSender<Delivery<T>>,
}

impl<T: Send + 'static> RequestSlot<T> {
    pub fn new(name: &'static str) -> (Self, mpsc::UnboundedReceiver<Delivery<T>>) {
        let (deliveries, rx) = mpsc::unbounded_channel();
        let slot = Self {
            name,
            state: Arc::new(Mutex::new(SlotState::default())),
            deliveries,
        };
        (slot, rx)
    }

    /// Spawns `request`, superseding whatever this slot had in flight.
    /// Returns the ticket its delivery will carry.
    pub fn submit<F>(&self, request: F) -> u64
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut state = lock(&self.state);
        state.invalidate();
        let ticket = state.generation;

        let shared = Arc::clone(&self.state);
        let deliveries = self.deliveries.clone();
        let name = self.name;
        let task = tokio::spawn(async move {
            let output = request.await;
            let state = lock(&shared);
            if state.generation == ticket {
                let _ = deliveries.send(Delivery { ticket, output });
            } else {
                debug!(slot = name, ticket, "dropping superseded result");
            }
        });
        state.in_flight = Some(task.abort_handle());
        debug!(slot = name, ticket, "request submitted");
        ticket
    }

    /// Cancels the in-flight request, if any. Its result will not be delivered.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if state.in_flight.is_some() {
            debug!(slot = self.name, ticket = state.generation, "request cancelled");
        }
        state.invalidate();
    }
}

impl<T> Drop for RequestSlot<T> {
    fn drop(&mut self) {
        lock(&self.state).invalidate();
    }
}

fn lock(state: &Mutex<SlotState>) -> MutexGuard<'_, SlotState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
