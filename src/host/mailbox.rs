//! Per-tab mailbox of results waiting for delivery.
//!
//! Results are queued oldest first. Draining takes the whole queue for a
//! tab; undelivered parcels are put back at the front so order survives a
//! failed delivery. Each tab's queue is bounded and drops its oldest parcel
//! when full.

use crate::explain::ExplanationRecord;
use crate::tab::TabId;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// A queued result.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub id: Uuid,
    pub record: ExplanationRecord,
    pub queued_at: DateTime<Utc>,
}

pub struct Mailbox {
    max_pending: usize,
    queues: Mutex<HashMap<TabId, VecDeque<Parcel>>>,
}

impl Mailbox {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending: max_pending.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue `record` for `tab` and return the parcel id.
    pub fn post(&self, tab: TabId, record: ExplanationRecord) -> Uuid {
        let parcel = Parcel {
            id: Uuid::new_v4(),
            record,
            queued_at: Utc::now(),
        };
        let id = parcel.id;
        let mut queues = self.lock();
        let queue = queues.entry(tab).or_default();
        queue.push_back(parcel);
        self.enforce_cap(tab, queue);
        id
    }

    /// Take every parcel queued for `tab`, oldest first.
    pub fn drain_to(&self, tab: TabId) -> Vec<Parcel> {
        self.lock()
            .remove(&tab)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Put undelivered parcels back ahead of anything queued since the drain.
    pub fn restore_front(&self, tab: TabId, parcels: Vec<Parcel>) {
        if parcels.is_empty() {
            return;
        }
        let mut queues = self.lock();
        let queue = queues.entry(tab).or_default();
        for parcel in parcels.into_iter().rev() {
            queue.push_front(parcel);
        }
        self.enforce_cap(tab, queue);
    }

    /// Drop every parcel for `tab`. Returns how many were dropped.
    pub fn prune(&self, tab: TabId) -> usize {
        self.lock().remove(&tab).map_or(0, |queue| queue.len())
    }

    pub fn pending(&self, tab: TabId) -> usize {
        self.lock().get(&tab).map_or(0, VecDeque::len)
    }

    /// Snapshot of the records queued for `tab`, oldest first.
    pub fn peek(&self, tab: TabId) -> Vec<ExplanationRecord> {
        self.lock()
            .get(&tab)
            .map(|queue| queue.iter().map(|p| p.record.clone()).collect())
            .unwrap_or_default()
    }

    fn enforce_cap(&self, tab: TabId, queue: &mut VecDeque<Parcel>) {
        while queue.len() > self.max_pending {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(
                    tab_id = %tab,
                    parcel_id = %dropped.id,
                    max_pending = self.max_pending,
                    "mailbox full; dropping oldest result"
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TabId, VecDeque<Parcel>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> ExplanationRecord {
        ExplanationRecord {
            origin_text: text.into(),
            part_of_speech: "noun".into(),
            description: format!("about {text}"),
            similar: Default::default(),
            error_code: None,
        }
    }

    fn origins(parcels: &[Parcel]) -> Vec<&str> {
        parcels.iter().map(|p| p.record.origin_text.as_str()).collect()
    }

    #[test]
    fn drain_is_fifo_and_clears() {
        let mailbox = Mailbox::new(8);
        let tab = TabId(1);
        mailbox.post(tab, record("r1"));
        mailbox.post(tab, record("r2"));

        let drained = mailbox.drain_to(tab);
        assert_eq!(origins(&drained), vec!["r1", "r2"]);
        assert_eq!(mailbox.pending(tab), 0);
        assert!(mailbox.drain_to(tab).is_empty());
    }

    #[test]
    fn tabs_are_independent() {
        let mailbox = Mailbox::new(8);
        mailbox.post(TabId(1), record("a"));
        mailbox.post(TabId(2), record("b"));
        assert_eq!(origins(&mailbox.drain_to(TabId(2))), vec!["b"]);
        assert_eq!(mailbox.pending(TabId(1)), 1);
    }

    #[test]
    fn restore_front_keeps_order_ahead_of_new_posts() {
        let mailbox = Mailbox::new(8);
        let tab = TabId(3);
        mailbox.post(tab, record("r1"));
        mailbox.post(tab, record("r2"));
        let drained = mailbox.drain_to(tab);

        mailbox.post(tab, record("r3"));
        mailbox.restore_front(tab, drained);
        assert_eq!(
            mailbox
                .peek(tab)
                .iter()
                .map(|r| r.origin_text.as_str())
                .collect::<Vec<_>>(),
            vec!["r1", "r2", "r3"]
        );
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mailbox = Mailbox::new(2);
        let tab = TabId(4);
        mailbox.post(tab, record("r1"));
        mailbox.post(tab, record("r2"));
        mailbox.post(tab, record("r3"));
        assert_eq!(origins(&mailbox.drain_to(tab)), vec!["r2", "r3"]);
    }

    #[test]
    fn prune_reports_dropped_count() {
        let mailbox = Mailbox::new(8);
        let tab = TabId(5);
        mailbox.post(tab, record("r1"));
        mailbox.post(tab, record("r2"));
        assert_eq!(mailbox.prune(tab), 2);
        assert_eq!(mailbox.prune(tab), 0);
    }

    #[test]
    fn parcel_ids_are_unique() {
        let mailbox = Mailbox::new(8);
        let a = mailbox.post(TabId(1), record("a"));
        let b = mailbox.post(TabId(1), record("a"));
        assert_ne!(a, b);
    }
}
