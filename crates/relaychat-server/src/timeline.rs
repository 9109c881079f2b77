//! Cooperative event timeline.
//!
//! A [`Timeline`] is drained by exactly one task, which handles each event to
//! completion before asking for the next one. Any number of
//! [`TimelineHandle`]s submit events through an unbounded channel, either for
//! immediate execution or after a delay. Events fall due in
//! `(due instant, submission order)` order, so events scheduled "now" run FIFO.
//! There is no cancellation: a submitted event always runs.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{sleep_until, Instant};

/// The runner side is gone; nothing will ever handle the event.
#[derive(Debug, Error)]
#[error("Timeline closed")]
pub struct TimelineClosed;

struct Scheduled<E> {
    due: Instant,
    event: E,
}

struct Pending<E> {
    due: Instant,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Pending<E> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<E> Eq for Pending<E> {}

impl<E> PartialOrd for Pending<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Pending<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Submission side of a timeline.
pub struct TimelineHandle<E> {
    tx: mpsc::UnboundedSender<Scheduled<E>>,
}

impl<E> Clone for TimelineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> TimelineHandle<E> {
    /// Run `event` after everything already due.
    pub fn schedule_now(&self, event: E) -> Result<(), TimelineClosed> {
        self.schedule_at(Instant::now(), event)
    }

    /// Run `event` no earlier than `delay` from now.
    pub fn schedule_in(&self, delay: Duration, event: E) -> Result<(), TimelineClosed> {
        self.schedule_at(Instant::now() + delay, event)
    }

    fn schedule_at(&self, due: Instant, event: E) -> Result<(), TimelineClosed> {
        self.tx
            .send(Scheduled { due, event })
            .map_err(|_| TimelineClosed)
    }
}

/// Runner side of a timeline.
pub struct Timeline<E> {
    queue: BinaryHeap<Reverse<Pending<E>>>,
    rx: mpsc::UnboundedReceiver<Scheduled<E>>,
    seq: u64,
    open: bool,
}

impl<E> Timeline<E> {
    pub fn new() -> (Self, TimelineHandle<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timeline = Self {
            queue: BinaryHeap::new(),
            rx,
            seq: 0,
            open: true,
        };
        (timeline, TimelineHandle { tx })
    }

    /// Wait for the next due event. Returns `None` once every handle is
    /// dropped and nothing is left pending.
    pub async fn next(&mut self) -> Option<E> {
        loop {
            self.drain();

            let next_due = self.queue.peek().map(|Reverse(pending)| pending.due);
            match next_due {
                Some(due) if due <= Instant::now() => {
                    return self.queue.pop().map(|Reverse(pending)| pending.event);
                }
                Some(due) if self.open => {
                    tokio::select! {
                        received = self.rx.recv() => self.accept(received),
                        _ = sleep_until(due) => {}
                    }
                }
                Some(due) => sleep_until(due).await,
                None if self.open => {
                    let received = self.rx.recv().await;
                    self.accept(received);
                }
                None => return None,
            }
        }
    }

    fn drain(&mut self) {
        while self.open {
            match self.rx.try_recv() {
                Ok(scheduled) => self.enqueue(scheduled),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.open = false,
            }
        }
    }

    fn accept(&mut self, received: Option<Scheduled<E>>) {
        match received {
            Some(scheduled) => self.enqueue(scheduled),
            None => self.open = false,
        }
    }

    fn enqueue(&mut self, scheduled: Scheduled<E>) {
        self.seq += 1;
        self.queue.push(Reverse(Pending {
            due: scheduled.due,
            seq: self.seq,
            event: scheduled.event,
        }));
    }
}
