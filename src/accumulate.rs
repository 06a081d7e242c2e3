//! Per-file accumulator task.
//!
//! One task per file: issue a read, fold the bytes that came back into the
//! running [`WordStats`], advance the offset, repeat until a zero-length read.
//!
//! ```text
//! Idle ──► Reading ──(n > 0)──► Reading
//!             │
//!             ├──(n == 0)──► Done(stats)
//!             └──(error)───► Failed(err)
//! ```
//!
//! Only one read is outstanding per file, so the buffer is reused across
//! iterations and only `filled()` is ever scanned.

use tracing::{debug, trace};

use crate::config::validate_buffer_size;
use crate::error::Result;
use crate::file::{AsyncFile, ReadBuf};
use crate::stats::WordStats;

/// Reads `file` to end of file and returns its statistics.
///
/// Short reads are normal: the offset advances by what was actually read.
/// The first failed read ends the task with that error. A `buffer_size` that
/// [`validate_buffer_size`] rejects fails before any read is issued.
pub async fn count_file(file: AsyncFile, buffer_size: usize) -> Result<WordStats> {
    validate_buffer_size(buffer_size)?;
    let mut stats = WordStats::default();
    let mut buf = ReadBuf::with_capacity(buffer_size);
    let mut offset = 0u64;

    loop {
        buf = file.read_at(offset, buf).await?;
        let n = buf.filled().len();
        if n == 0 {
            break;
        }
        trace!(path = %file.path().display(), offset, n, "chunk");
        stats.accumulate(buf.filled());
        offset += n as u64;
    }

    debug!(
        path = %file.path().display(),
        chars = stats.chars,
        lines = stats.lines,
        "file done"
    );
    Ok(stats)
}
