//! Bounded in-memory buffers: recent packets and recent analyses.

use crate::detect::AnalysisRecord;
use crate::traffic::Packet;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_PACKET_CAPACITY: usize = 2000;

/// Most recent analysis records, oldest evicted first.
#[derive(Debug, Clone)]
pub struct AnalysisHistory {
    records: VecDeque<AnalysisRecord>,
    capacity: usize,
}

impl AnalysisHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: AnalysisRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn latest(&self) -> Option<&AnalysisRecord> {
        self.records.back()
    }

    /// Up to `k` records, newest first.
    pub fn recent(&self, k: usize) -> Vec<AnalysisRecord> {
        self.records.iter().rev().take(k).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for AnalysisHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Trailing packets in arrival order.
#[derive(Debug, Clone)]
pub struct PacketWindow {
    packets: VecDeque<Packet>,
    capacity: usize,
}

impl PacketWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            packets: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn extend(&mut self, batch: impl IntoIterator<Item = Packet>) {
        for packet in batch {
            if self.packets.len() == self.capacity {
                self.packets.pop_front();
            }
            self.packets.push_back(packet);
        }
    }

    /// The last `n` packets (fewer if the window is shorter), oldest first.
    pub fn tail(&self, n: usize) -> Vec<Packet> {
        let start = self.packets.len().saturating_sub(n);
        self.packets.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl Default for PacketWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PACKET_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::generator::PacketGenerator;
    use crate::traffic::AttackMode;

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let mut history = AnalysisHistory::with_capacity(3);
        let mut ids = Vec::new();
        for n in 0..5 {
            let rec = AnalysisRecord::insufficient_data(n);
            ids.push(rec.id);
            history.push(rec);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().map(|r| r.id), Some(ids[4]));

        let recent: Vec<_> = history.recent(10).iter().map(|r| r.packet_count).collect();
        assert_eq!(recent, vec![4, 3, 2]);
        assert_eq!(history.recent(1).len(), 1);
    }

    #[test]
    fn test_window_keeps_tail_in_order() {
        let mut gen = PacketGenerator::seeded(2);
        let mut window = PacketWindow::with_capacity(10);
        let mut all = Vec::new();
        for tick in 0..4 {
            let batch = gen.next_batch(AttackMode::Normal, tick as f64);
            all.extend(batch.clone());
            window.extend(batch);
        }
        assert_eq!(window.len(), 10.min(all.len()));
        assert_eq!(window.tail(5), all[all.len() - 5..].to_vec());
        assert_eq!(window.tail(100).len(), window.len());
    }
}
