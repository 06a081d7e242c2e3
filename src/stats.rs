//! Per-file character and line counters.

/// Size of the read buffer each accumulator task owns.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Character and line totals for one file.
///
/// `lines` counts 0x0A bytes; `chars` counts every other byte. Both only grow
/// while a file is being read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WordStats {
    pub chars: u64,
    pub lines: u64,
}

impl WordStats {
    /// Folds one chunk of file content into the totals.
    ///
    /// Only `chunk` is scanned; callers pass the filled prefix of their
    /// buffer, never the whole allocation.
    #[inline]
    pub fn accumulate(&mut self, chunk: &[u8]) {
        let newlines = memchr::memchr_iter(b'\n', chunk).count() as u64;
        let len = chunk.len() as u64;
        self.lines = self.lines.saturating_add(newlines);
        self.chars = self.chars.saturating_add(len - newlines);
    }

    /// Total bytes observed (`chars + lines`).
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.chars.saturating_add(self.lines)
    }

    /// Mean number of non-newline bytes per line.
    ///
    /// Returns `None` for files without a newline, where the ratio is
    /// undefined.
    pub fn mean_line_length(&self) -> Option<f64> {
        if self.lines == 0 {
            return None;
        }
        Some(self.chars as f64 / self.lines as f64)
    }
}
