use crate::error::StreamError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A FIFO ticket queue serializing subscribe/unsubscribe operations.
///
/// Adding a stream to a connection requires closing and reopening that
/// connection's socket, so concurrent topology changes would race. A caller
/// enqueues a ticket, polls until it reaches the head, performs its change,
/// then dequeues. Waiting too long fails with a congestion error instead of
/// blocking forever; it is reported distinctly from connectivity failures
/// so callers know it is retryable.
#[derive(Debug, Default)]
pub struct TicketQueue {
    inner: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<u64>,
    next_ticket: u64,
}

impl TicketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self) -> u64 {
        let mut state = self.inner.lock().expect("ticket queue poisoned");
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting.push_back(ticket);
        ticket
    }

    fn is_head(&self, ticket: u64) -> bool {
        let state = self.inner.lock().expect("ticket queue poisoned");
        state.waiting.front() == Some(&ticket)
    }

    fn remove(&self, ticket: u64) {
        let mut state = self.inner.lock().expect("ticket queue poisoned");
        state.waiting.retain(|t| *t != ticket);
    }

    /// Blocks (asynchronously) until this caller's ticket reaches the head
    /// of the queue, then returns a guard that dequeues it on drop.
    pub async fn acquire(&self, timeout: Duration) -> Result<TicketGuard<'_>, StreamError> {
        let ticket = self.enqueue();
        let deadline = Instant::now() + timeout;

        loop {
            if self.is_head(ticket) {
                return Ok(TicketGuard {
                    queue: self,
                    ticket,
                });
            }
            if Instant::now() >= deadline {
                self.remove(ticket);
                return Err(StreamError::Congestion(timeout));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Holds the head position of the ticket queue; dropping it lets the next
/// waiter through.
#[derive(Debug)]
pub struct TicketGuard<'a> {
    queue: &'a TicketQueue,
    ticket: u64,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.queue.remove(self.ticket);
    }
}
