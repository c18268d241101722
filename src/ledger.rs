use crate::types::HistoryEntry;

/// Append-only log of every graded submission across all rounds.
#[derive(Debug, Default)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// All entries in insertion order.
    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of points awarded to one connection.
    pub fn total_for(&self, socket_id: &str) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.socket_id == socket_id)
            .map(|e| u64::from(e.score))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(socket_id: &str, question: &str, score: u32) -> HistoryEntry {
        HistoryEntry {
            socket_id: socket_id.to_string(),
            team: format!("team-{}", socket_id),
            question: question.to_string(),
            correct_answer: "DIODE".to_string(),
            answer: "diode".to_string(),
            is_correct: score > 0,
            invested: false,
            score,
            multiplier: None,
            rank: (score > 0).then_some(1),
            time: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut ledger = HistoryLedger::new();
        assert!(ledger.is_empty());

        ledger.record(entry("a", "IDDOE", 10));
        ledger.record(entry("b", "IDDOE", 0));
        ledger.record(entry("a", "SGNIAL", 20));

        assert_eq!(ledger.len(), 3);
        let order: Vec<_> = ledger
            .all()
            .iter()
            .map(|e| (e.socket_id.as_str(), e.question.as_str()))
            .collect();
        assert_eq!(order, vec![("a", "IDDOE"), ("b", "IDDOE"), ("a", "SGNIAL")]);
    }

    #[test]
    fn test_total_for_sums_per_connection() {
        let mut ledger = HistoryLedger::new();
        ledger.record(entry("a", "IDDOE", 10));
        ledger.record(entry("b", "IDDOE", 12));
        ledger.record(entry("a", "SGNIAL", 20));

        assert_eq!(ledger.total_for("a"), 30);
        assert_eq!(ledger.total_for("b"), 12);
        assert_eq!(ledger.total_for("nobody"), 0);
    }
}
