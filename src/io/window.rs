//! Chunked byte buffering and seeking over a [`ByteSource`].
//!
//! The window owns a growable buffer holding a contiguous run of stream
//! bytes. Callers ask for prefetched bytes at the current position (`fill`)
//! or reposition wholesale (`seek`); the window never interprets content.

use log::debug;

use super::byte_source::ByteSource;

/// Initial buffer allocation. Grows on demand.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// A sliding prefetch window over a random-access byte source.
///
/// Invariants: `window_pos + valid <= stream_size` and `read_pos <= valid`.
/// Reads beyond the end of the stream are clamped, never an error; a short
/// read from the source is reported as failure to the caller and not
/// retried.
pub struct ByteWindow<S: ByteSource> {
    source: S,
    buf: Vec<u8>,
    /// Stream position of `buf[0]`.
    window_pos: u64,
    /// Cursor within `buf`; bytes before it are consumed.
    read_pos: usize,
    /// Number of valid bytes in `buf`.
    valid: usize,
    stream_size: u64,
}

impl<S: ByteSource> ByteWindow<S> {
    pub fn new(source: S) -> Self {
        let stream_size = source.len();
        Self {
            source,
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            window_pos: 0,
            read_pos: 0,
            valid: 0,
            stream_size,
        }
    }

    /// Total length of the underlying stream.
    pub fn stream_size(&self) -> u64 {
        self.stream_size
    }

    /// Current stream position (the position of the next unconsumed byte).
    pub fn position(&self) -> u64 {
        self.window_pos + self.read_pos as u64
    }

    /// The unconsumed bytes currently resident in the buffer.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.read_pos..self.valid]
    }

    /// Advance the cursor past `n` buffered bytes.
    ///
    /// Clamped to the buffered length; consuming more than is resident is a
    /// caller bug but must not corrupt the window.
    pub fn consume(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n).min(self.valid);
    }

    /// Ensure at least `bytes_needed` unconsumed bytes are buffered, or as
    /// many as the stream still holds. Returns false when the source could
    /// not deliver the clamped request (short read); end-of-stream itself is
    /// not a failure.
    pub fn fill(&mut self, bytes_needed: usize) -> bool {
        let have = self.valid - self.read_pos;
        if have >= bytes_needed {
            return true;
        }

        // Clamp the request to what the stream can still provide.
        let stream_left = self.stream_size - self.position();
        let want = (bytes_needed as u64).min(stream_left + have as u64) as usize;
        if have >= want {
            return true;
        }

        // Compact before growing once most of the buffered bytes are dead
        // weight (more than 3/4 consumed).
        if self.read_pos > 0 && self.read_pos * 4 >= self.valid * 3 {
            self.buf.copy_within(self.read_pos..self.valid, 0);
            self.window_pos += self.read_pos as u64;
            self.valid -= self.read_pos;
            self.read_pos = 0;
        }

        let target = self.read_pos + want;
        if self.buf.len() < target {
            self.buf.resize(target, 0);
        }

        let tail_pos = self.window_pos + self.valid as u64;
        let missing = target - self.valid;
        match self.source.read_at_into(tail_pos, &mut self.buf[self.valid..self.valid + missing]) {
            Ok(read) => {
                self.valid += read;
                if read < missing {
                    debug!("short read at {}: wanted {}, got {}", tail_pos, missing, read);
                }
                read == missing
            }
            Err(err) => {
                debug!("read failed at {}: {}", tail_pos, err);
                false
            }
        }
    }

    /// Reposition the window to `pos`, prefetching `prefetch` bytes.
    ///
    /// When the target is already resident the buffer is reused and no read
    /// is issued for the resident part; repeated seeks to the same position
    /// observe byte-identical contents.
    pub fn seek(&mut self, pos: u64, prefetch: usize) -> bool {
        let pos = pos.min(self.stream_size);
        let window_end = self.window_pos + self.valid as u64;
        if pos >= self.window_pos && pos <= window_end {
            self.read_pos = (pos - self.window_pos) as usize;
        } else {
            self.window_pos = pos;
            self.read_pos = 0;
            self.valid = 0;
        }
        self.fill(prefetch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;

    fn window_over(data: &[u8]) -> ByteWindow<MemorySource> {
        ByteWindow::new(MemorySource::new(data.to_vec()))
    }

    #[test]
    fn test_fill_and_consume() {
        let mut w = window_over(b"abcdefgh");
        assert!(w.fill(4));
        assert_eq!(&w.buffered()[..4], b"abcd");
        w.consume(4);
        assert!(w.fill(4));
        assert_eq!(&w.buffered()[..4], b"efgh");
        assert_eq!(w.position(), 4);
    }

    #[test]
    fn test_fill_clamps_at_end_of_stream() {
        let mut w = window_over(b"abc");
        // Asking for more than the stream holds is satisfied by what's left.
        assert!(w.fill(100));
        assert_eq!(w.buffered(), b"abc");
        w.consume(3);
        assert!(w.fill(1) || w.buffered().is_empty());
        assert_eq!(w.buffered(), b"");
    }

    #[test]
    fn test_seek_reuses_resident_bytes() {
        let mut w = window_over(b"0123456789");
        assert!(w.fill(10));
        assert!(w.seek(4, 3));
        assert_eq!(&w.buffered()[..3], b"456");
        // Seek back inside the same window.
        assert!(w.seek(0, 3));
        assert_eq!(&w.buffered()[..3], b"012");
    }

    #[test]
    fn test_seek_idempotent() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut w = ByteWindow::new(MemorySource::new(data));
        assert!(w.seek(1000, 64));
        let first: Vec<u8> = w.buffered()[..64].to_vec();
        assert!(w.seek(4000, 64));
        assert!(w.seek(1000, 64));
        assert_eq!(&w.buffered()[..64], &first[..]);
    }

    #[test]
    fn test_seek_past_end_clamped() {
        let mut w = window_over(b"abc");
        assert!(w.seek(100, 0));
        assert_eq!(w.position(), 3);
        assert_eq!(w.buffered(), b"");
    }

    #[test]
    fn test_compaction_preserves_contents() {
        let data: Vec<u8> = (0..200u8).collect();
        let mut w = ByteWindow::new(MemorySource::new(data.clone()));
        assert!(w.fill(64));
        w.consume(60);
        // Forces growth past the initial chunk; the compaction path must
        // keep the unread tail intact.
        assert!(w.fill(100));
        assert_eq!(w.buffered()[0], 60);
        assert_eq!(w.position(), 60);
    }
}
