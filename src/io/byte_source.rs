use std::fs::File;
use std::io;
#[cfg(all(not(unix), not(windows)))]
use std::io::{Read, Seek, SeekFrom};

/// A thread-safe, random-access source of bytes.
///
/// The byte window sits on top of one of these; implementations must never
/// move an internal cursor, so a single source can back repeated seeks.
pub trait ByteSource: Send + Sync {
    /// Returns the total length of the source.
    fn len(&self) -> u64;

    /// Returns true if the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads bytes starting at `offset` into the provided buffer.
    /// Returns the number of bytes read, which may be short when `offset`
    /// is near the end of the source. Never reads past `len()`.
    fn read_at_into(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

// --- Implementation: Local File ---

pub struct FileSource {
    file: File, // internal file handle
    len: u64,
}

impl FileSource {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn open(path: &std::path::Path) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Clamp a requested read range to the file length.
    fn clamped(&self, offset: u64, want: usize) -> usize {
        if offset >= self.len {
            return 0;
        }
        (self.len - offset).min(want as u64) as usize
    }
}

#[cfg(unix)]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at_into(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt; // Enables pread
        let want = self.clamped(offset, buf.len());
        if want == 0 {
            return Ok(0);
        }
        self.file.read_exact_at(&mut buf[..want], offset)?;
        Ok(want)
    }
}

#[cfg(windows)]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at_into(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        let want = self.clamped(offset, buf.len());
        if want == 0 {
            return Ok(0);
        }
        let mut total = 0;
        while total < want {
            let read = self.file.seek_read(&mut buf[total..want], offset + total as u64)?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }
}

#[cfg(all(not(unix), not(windows)))]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at_into(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        // Fallback for WASM and other platforms
        let want = self.clamped(offset, buf.len());
        if want == 0 {
            return Ok(0);
        }
        let mut file_clone = self.file.try_clone()?;
        file_clone.seek(SeekFrom::Start(offset))?;
        file_clone.read_exact(&mut buf[..want])?;
        Ok(want)
    }
}

// --- Implementation: In-Memory ---

/// An in-memory ByteSource backed by a `Vec<u8>`.
///
/// Container importers hand decompressed archive members to the parser this
/// way; tests use it for fixtures.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at_into(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(self.data.len());
        let n = end - offset;
        buf[..n].copy_from_slice(&self.data[offset..end]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_read_at_into() {
        let source = MemorySource::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        let read = source.read_at_into(6, &mut buf).unwrap();
        assert_eq!(read, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn test_memory_source_short_read_at_end() {
        let source = MemorySource::new(b"abcdef".to_vec());
        let mut buf = [0u8; 10];
        let read = source.read_at_into(4, &mut buf).unwrap();
        assert_eq!(read, 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_memory_source_read_past_end() {
        let source = MemorySource::new(b"abc".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(source.read_at_into(100, &mut buf).unwrap(), 0);
    }
}
