//! Read-only file handles bound to an [`IoScheduler`].
//!
//! Reads are positional (`read_at`) and move the buffer into the I/O context
//! for the duration of the kernel operation. The buffer comes back with the
//! completion, so a task can reuse one allocation across every read of a file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::channel::oneshot;

use crate::error::{Error, Result};
use crate::io_context::{IoScheduler, ReadRequest};

/// Owned, fixed-capacity read buffer with a filled length.
///
/// The heap allocation never moves, so its address stays valid while the
/// kernel writes into it even though the `ReadBuf` value itself is moved
/// between the task and the driver thread.
pub struct ReadBuf {
    data: Box<[u8]>,
    filled: usize,
}

impl ReadBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes produced by the most recent read. Empty at end of file.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.filled = 0;
    }

    #[inline]
    pub(crate) fn set_filled(&mut self, n: usize) {
        self.filled = n.min(self.data.len());
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

impl std::fmt::Debug for ReadBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBuf")
            .field("capacity", &self.capacity())
            .field("filled", &self.filled)
            .finish()
    }
}

/// A file opened for reading against an I/O context.
///
/// The descriptor is reference-counted and shared with in-flight operations,
/// so dropping the handle never closes an fd the kernel is still reading.
#[derive(Debug)]
pub struct AsyncFile {
    file: Arc<File>,
    path: PathBuf,
    io: IoScheduler,
}

impl AsyncFile {
    /// Opens `path` read-only. The open itself is synchronous.
    pub fn open_read_only(io: &IoScheduler, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            io: io.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `buf.capacity()` bytes starting at `offset`.
    ///
    /// The returned buffer's `filled()` is exactly the byte range the kernel
    /// produced; it may be shorter than the capacity and is empty only at end
    /// of file.
    ///
    /// A zero-capacity buffer is rejected with [`Error::Config`]: its read
    /// would be indistinguishable from end of file.
    pub async fn read_at(&self, offset: u64, mut buf: ReadBuf) -> Result<ReadBuf> {
        if buf.capacity() == 0 {
            return Err(Error::Config(format!(
                "read buffer for {} has zero capacity",
                self.path.display()
            )));
        }
        buf.clear();
        let (reply, completion) = oneshot::channel();
        self.io.submit_read(ReadRequest {
            file: Arc::clone(&self.file),
            offset,
            buf,
            reply,
        })?;

        let completion = completion.await.map_err(|_| Error::ContextShutdown)?;
        let mut buf = completion.buf;
        match completion.result {
            Ok(n) => {
                buf.set_filled(n);
                Ok(buf)
            }
            Err(source) => Err(Error::Read {
                path: self.path.clone(),
                offset,
                source,
            }),
        }
    }
}
