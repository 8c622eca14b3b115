//! Captured output storage: an append-only line buffer with an optional cap

use std::collections::VecDeque;

/// Ordered buffer of lines captured from one output stream.
///
/// - Without a capacity the buffer only ever grows: lines are never removed
///   or reordered once appended.
/// - With a capacity, the oldest lines are evicted once it is exceeded and
///   `total_dropped` counts them.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    capacity: Option<usize>,
    total_dropped: u64,
    lines: VecDeque<String>,
}

impl OutputBuffer {
    /// Create a buffer; `capacity` must be > 0 when given
    pub fn new(capacity: Option<usize>) -> Self {
        if let Some(cap) = capacity {
            assert!(cap > 0, "OutputBuffer capacity must be > 0");
        }
        Self {
            capacity,
            total_dropped: 0,
            lines: VecDeque::new(),
        }
    }

    /// Append a line, evicting the oldest one if the cap is reached
    pub fn push(&mut self, line: String) {
        if let Some(cap) = self.capacity {
            if self.lines.len() == cap {
                self.lines.pop_front();
                self.total_dropped = self.total_dropped.saturating_add(1);
            }
        }
        self.lines.push_back(line);
    }

    /// Total number of lines evicted by the cap
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Copy of the retained lines, oldest first
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_keeps_everything_in_order() {
        let mut buf = OutputBuffer::new(None);
        for i in 0..100 {
            buf.push(format!("line {i}"));
        }
        let lines = buf.to_vec();
        assert_eq!(lines.len(), 100);
        assert_eq!(buf.total_dropped(), 0);
        assert_eq!(lines.first().map(String::as_str), Some("line 0"));
        assert_eq!(lines.last().map(String::as_str), Some("line 99"));
    }

    #[test]
    fn test_cap_evicts_oldest_and_counts() {
        let mut buf = OutputBuffer::new(Some(3));
        for s in ["a", "b", "c", "d", "e"] {
            buf.push(s.to_string());
        }
        assert_eq!(buf.total_dropped(), 2);
        assert_eq!(buf.to_vec(), vec!["c", "d", "e"]);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_rejected() {
        let _ = OutputBuffer::new(Some(0));
    }
}
