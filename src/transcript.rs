/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Which side of the link produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    /// Wire/export label. Sent data is `TX`, received data is `RX`.
    pub fn mode_label(self) -> &'static str {
        match self {
            Direction::Sent => "TX",
            Direction::Received => "RX",
        }
    }
}

/// One transfer over the link. Immutable once appended.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub payload: Bytes,
}

#[derive(Default)]
struct TranscriptInner {
    records: Vec<Arc<TransferRecord>>,
    sent_bytes: usize,
    received_bytes: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Append-only, time-ordered log of every transfer in a session.
///
/// Appends come from the transfer paths while the UI/export path reads, so
/// everything (records, both byte counters, the last-assigned timestamp)
/// sits behind one mutex. Readers get stable snapshots of `Arc`ed records;
/// a reader never observes a half-built record and the counters always
/// match the records present at the instant of the read.
pub struct Transcript {
    inner: Mutex<TranscriptInner>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TranscriptInner::default()),
        }
    }

    /// Append a record, stamping it now.
    ///
    /// Timestamps are clamped to be non-decreasing; two records stamped in
    /// the same instant keep their append order, which is the display and
    /// export order.
    pub fn append(&self, direction: Direction, payload: Bytes) -> Arc<TransferRecord> {
        let mut inner = self.inner.lock().unwrap();

        let mut timestamp = Utc::now();
        if let Some(last) = inner.last_timestamp {
            if timestamp < last {
                timestamp = last;
            }
        }
        inner.last_timestamp = Some(timestamp);

        match direction {
            Direction::Sent => inner.sent_bytes += payload.len(),
            Direction::Received => inner.received_bytes += payload.len(),
        }

        let record = Arc::new(TransferRecord {
            timestamp,
            direction,
            payload,
        });
        inner.records.push(record.clone());
        record
    }

    /// Drop every record and zero both byte counters. The only operation
    /// that ever removes records.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.clear();
        inner.sent_bytes = 0;
        inner.received_bytes = 0;
    }

    /// Stable filtered snapshot for one UI refresh cycle. Row count and
    /// row access must both be served from the returned vector so they
    /// cannot observe different transcript states.
    pub fn filtered<F>(&self, predicate: F) -> Vec<Arc<TransferRecord>>
    where
        F: Fn(&TransferRecord) -> bool,
    {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Live-view records under the echo policy: locally sent data is shown
    /// only while echo is enabled. Storage, counters and export are never
    /// affected by this filter.
    pub fn visible(&self, echo_enabled: bool) -> Vec<Arc<TransferRecord>> {
        self.filtered(|r| echo_enabled || r.direction == Direction::Received)
    }

    /// Everything, in append order. Export always works from this.
    pub fn snapshot(&self) -> Vec<Arc<TransferRecord>> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn sent_bytes(&self) -> usize {
        self.inner.lock().unwrap().sent_bytes
    }

    pub fn received_bytes(&self) -> usize {
        self.inner.lock().unwrap().received_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
