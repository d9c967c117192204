//! In-flight request tracking ("escrow").
//!
//! Every backend request is put in escrow when it starts and taken out when
//! it completes. Entries carry a generation number: cancelling a request, or
//! starting a new one under the same key, makes older tickets stale, and a
//! stale ticket's response is dropped. A monitor task flips a loading flag
//! while any request has been outstanding longer than the threshold.
//!
//! Callers that may be dropped mid-request hold an [`EscrowGuard`] rather
//! than a bare [`Ticket`], so an abandoned request never stays in the table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
struct Entry {
    generation: u64,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct Table {
    next_generation: u64,
    entries: HashMap<String, Entry>,
}

/// Proof of a started request, checked against the table on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    generation: u64,
}

/// A ticket that is taken out of escrow when dropped.
///
/// Dropping the guard before [`EscrowGuard::finish`] (for instance when the
/// future awaiting the response is cancelled) removes the entry if it still
/// belongs to this ticket.
#[derive(Debug)]
pub struct EscrowGuard {
    escrow: Arc<Escrow>,
    ticket: Option<Ticket>,
}

impl EscrowGuard {
    /// Take the request out of escrow; false when the ticket went stale.
    pub fn finish(mut self) -> bool {
        match self.ticket.take() {
            Some(ticket) => self.escrow.finish(&ticket),
            None => false,
        }
    }
}

impl Drop for EscrowGuard {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            if self.escrow.finish(&ticket) {
                tracing::debug!(key = %ticket.key, "Abandoned request taken out of escrow");
            }
        }
    }
}

#[derive(Debug)]
pub struct Escrow {
    table: Mutex<Table>,
    loading: AtomicBool,
    max_wait: Duration,
}

impl Escrow {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            loading: AtomicBool::new(false),
            max_wait,
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put `key` in escrow, superseding any request already in flight under it.
    pub fn begin(&self, key: &str) -> Ticket {
        let mut table = self.table();
        table.next_generation += 1;
        let generation = table.next_generation;
        let previous = table.entries.insert(
            key.to_string(),
            Entry {
                generation,
                started_at: Instant::now(),
            },
        );
        if previous.is_some() {
            tracing::debug!(%key, generation, "Superseded in-flight request");
        }
        Ticket {
            key: key.to_string(),
            generation,
        }
    }

    /// Like [`Escrow::begin`], but the entry is released when the guard drops.
    pub fn guard(self: &Arc<Self>, key: &str) -> EscrowGuard {
        EscrowGuard {
            ticket: Some(self.begin(key)),
            escrow: Arc::clone(self),
        }
    }

    /// Drop `key` from escrow; its outstanding response will be ignored.
    pub fn cancel(&self, key: &str) -> bool {
        self.table().entries.remove(key).is_some()
    }

    /// Take a completed request out of escrow.
    ///
    /// Returns false when the ticket is stale (cancelled or superseded); the
    /// table is left untouched in that case.
    pub fn finish(&self, ticket: &Ticket) -> bool {
        let mut table = self.table();
        match table.entries.get(&ticket.key) {
            Some(entry) if entry.generation == ticket.generation => {
                table.entries.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.table().entries.len()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    /// Recompute the loading flag; returns the new state.
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    pub(crate) fn check_at(&self, now: Instant) -> bool {
        let overdue = self
            .table()
            .entries
            .values()
            .any(|entry| now.saturating_duration_since(entry.started_at) > self.max_wait);

        let was_loading = self.loading.swap(overdue, Ordering::Relaxed);
        if overdue && !was_loading {
            tracing::debug!("Waiting for backend resource, showing loading indicator");
        } else if !overdue && was_loading {
            tracing::debug!("All requests out of escrow, hiding loading indicator");
        }
        overdue
    }

    /// Run [`Escrow::check`] on a fixed interval until the task is aborted.
    pub fn spawn_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let escrow = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                escrow.check();
            }
        })
    }
}
