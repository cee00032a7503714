//! The shared counter: one decimal line in a byte store behind a reader/writer lock.

use std::fs::File;
use std::io;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::ResourceError;

const READ_CHUNK: usize = 32;

/// Byte-addressable storage for the counter line.
///
/// Reads are positional and take `&self` so any number of readers can share
/// the store under the read lock; mutation needs `&mut self`.
pub trait ByteStore: Send + Sync {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

#[cfg(unix)]
impl ByteStore for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(self, buf, offset)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

#[cfg(windows)]
impl ByteStore for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }

    fn write_all_at(&mut self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            let written = std::os::windows::fs::FileExt::seek_write(self, buf, offset)?;
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            buf = &buf[written..];
            offset += written as u64;
        }
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Read bytes up to the first newline (or EOF), dropping the terminator and a
/// trailing carriage return.
fn read_first_line<S: ByteStore + ?Sized>(store: &S) -> Result<String, ResourceError> {
    let mut line = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut offset = 0u64;
    loop {
        let read = store.read_at(&mut chunk, offset)?;
        if read == 0 {
            break;
        }
        if let Some(end) = chunk[..read].iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&chunk[..end]);
            break;
        }
        line.extend_from_slice(&chunk[..read]);
        offset += read as u64;
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|err| ResourceError::Malformed {
        line: String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

fn parse_counter(line: &str) -> Result<u64, ResourceError> {
    line.trim()
        .parse::<u64>()
        .map_err(|_| ResourceError::Malformed {
            line: line.to_string(),
        })
}

/// The persisted counter every worker contends over.
///
/// Writers hold the exclusive lock for the whole read-modify-write; readers
/// hold the shared lock, so no reader ever sees a truncated or half-written
/// line.
pub struct SharedResource<S> {
    store: RwLock<S>,
}

impl<S: ByteStore> SharedResource<S> {
    /// Wrap `store` and reset it to the line `"0\n"`.
    pub fn initialize(mut store: S) -> Result<Self, ResourceError> {
        store.set_len(0)?;
        store.write_all_at(b"0\n", 0)?;
        store.sync()?;
        Ok(Self {
            store: RwLock::new(store),
        })
    }

    /// Under the shared lock, wait out `latency` and return the first line verbatim.
    pub fn read_line(&self, latency: Duration) -> Result<String, ResourceError> {
        let guard = self.store.read();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        read_first_line(&*guard)
    }

    /// Under the exclusive lock, wait out `latency` and add `delta` to the
    /// counter. Returns the new value.
    pub fn add(&self, delta: u64, latency: Duration) -> Result<u64, ResourceError> {
        let mut guard = self.store.write();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let current = parse_counter(&read_first_line(&*guard)?)?;
        let next = current
            .checked_add(delta)
            .ok_or(ResourceError::Overflow { current, delta })?;
        // The counter never shrinks, so the new line covers the old one and a
        // failed write leaves the previous line intact.
        let line = format!("{next}\n");
        guard.write_all_at(line.as_bytes(), 0)?;
        guard.set_len(line.len() as u64)?;
        Ok(next)
    }

    /// Current counter value, read under the shared lock.
    pub fn value(&self) -> Result<u64, ResourceError> {
        let guard = self.store.read();
        parse_counter(&read_first_line(&*guard)?)
    }

    /// Flush the store to its backing medium.
    pub fn sync(&self) -> Result<(), ResourceError> {
        self.store.write().sync()?;
        Ok(())
    }
}

#[cfg(test)]
impl<S> SharedResource<S> {
    /// Direct access to the store, for injecting failures.
    pub fn store_mut(&self) -> parking_lot::RwLockWriteGuard<'_, S> {
        self.store.write()
    }
}

/// Growable in-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    pub bytes: Vec<u8>,
}

#[cfg(test)]
impl ByteStore for MemoryStore {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = (offset as usize).min(self.bytes.len());
        let available = &self.bytes[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.bytes.resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Store whose reads or writes fail once the matching flag is set; used to
/// exercise fatal paths.
#[cfg(test)]
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[cfg(test)]
impl ByteStore for FlakyStore {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::other("injected read failure"));
        }
        self.inner.read_at(buf, offset)
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.write_all_at(buf, offset)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other("injected truncate failure"));
        }
        self.inner.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
