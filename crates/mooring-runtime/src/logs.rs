use std::collections::VecDeque;

/// Bounded buffer of the most recent output lines of one entry.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    generation: u64,
    pushed: u64,
}

impl LogBuffer {
    /// Creates an empty buffer for the run identified by `generation`.
    pub fn new(capacity: usize, generation: u64) -> Self {
        LogBuffer {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            generation,
            pushed: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Appends a line, evicting the oldest once the buffer is full.
    pub fn push(&mut self, line: String) {
        self.pushed += 1;
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Lines oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Number of lines ever pushed, including evicted ones.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Retained lines pushed after the first `seen` lines.
    pub fn lines_after(&self, seen: u64) -> Vec<String> {
        let oldest = self.pushed - self.lines.len() as u64;
        let skip = seen.saturating_sub(oldest) as usize;
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
