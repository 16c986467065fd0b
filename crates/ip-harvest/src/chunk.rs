//! Splitting a byte stream into overlapping work units.
//!
//! Every window after the first starts with the last [`OVERLAP`] bytes of the
//! window before it. Combined with the [`Edges`] hold-back rule of the matcher
//! this means a token cut by a chunk boundary is still decided, with its full
//! left and right context, by some window:
//!
//! ```text
//!   stream:  ....... 10.1.2.3 .......
//!   body k:  ....... 10.1|
//!   body k+1:            |.2.3 .......
//!   window k+1:   [ carry  ][ body k+1 ]
//!                  ^ overlap covers the token and its left neighbour
//! ```
//!
//! Windows may report the same address twice; the coordinator merges with
//! set union so that is harmless.

use std::io::Read;

use crate::error::{Error, Result};
use crate::matcher::{Edges, MAX_TOKEN_LEN};

/// Bytes carried from one window into the next: a full token, the byte
/// before it, and the two bytes after it that the boundary check reads.
pub const OVERLAP: usize = MAX_TOKEN_LEN + 3;

/// The smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = MAX_TOKEN_LEN;

/// One unit of parallel work: a contiguous window of the input stream.
#[derive(Clone, Debug)]
pub struct Chunk {
    index: usize,
    offset: u64,
    data: Vec<u8>,
    edges: Edges,
}

impl Chunk {
    /// A chunk that is the whole stream.
    #[must_use]
    pub fn whole(data: Vec<u8>) -> Chunk {
        Chunk {
            index: 0,
            offset: 0,
            data,
            edges: Edges::COMPLETE,
        }
    }

    /// Sequence number of this chunk in the stream, starting at 0.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stream offset of the first byte of [`Chunk::data`], carry included.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The window bytes: carry region followed by the chunk body.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Which window ends are real stream ends.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> Edges {
        self.edges
    }
}

/// Reads a stream sequentially into overlapping [`Chunk`]s.
///
/// One body is always read ahead so the final window can be flagged as
/// touching the end of the stream.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    carry: Vec<u8>,
    lookahead: Option<Vec<u8>>,
    /// Stream offset of the next body to hand out.
    consumed: u64,
    /// Stream offset up to which bytes have been read, lookahead included.
    read: u64,
    index: usize,
    finished: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Create a reader producing bodies of `chunk_size` bytes.
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::ChunkTooSmall {
                chunk_size,
                minimum: MIN_CHUNK_SIZE,
            });
        }
        Ok(ChunkReader {
            reader,
            chunk_size,
            carry: Vec::with_capacity(OVERLAP),
            lookahead: None,
            consumed: 0,
            read: 0,
            index: 0,
            finished: false,
        })
    }

    /// Total number of stream bytes read so far.
    #[inline]
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Read the next window, or `None` once the stream is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let body = match self.lookahead.take() {
            Some(body) => body,
            None => self.read_body()?,
        };
        if body.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        let next = self.read_body()?;
        let at_end = next.is_empty();
        if at_end {
            self.finished = true;
        } else {
            self.lookahead = Some(next);
        }

        let lead = self.carry.len();
        let offset = self.consumed - lead as u64;
        let mut data = Vec::with_capacity(lead + body.len());
        data.extend_from_slice(&self.carry);
        data.extend_from_slice(&body);

        // the carry may reach back across several short bodies
        self.carry.clear();
        self.carry
            .extend_from_slice(&data[data.len().saturating_sub(OVERLAP)..]);
        self.consumed += body.len() as u64;

        let chunk = Chunk {
            index: self.index,
            offset,
            data,
            edges: Edges {
                stream_start: offset == 0,
                stream_end: at_end,
            },
        };
        self.index += 1;
        Ok(Some(chunk))
    }

    fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(self.chunk_size);
        let offset = self.read;
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut body)
            .map_err(|source| Error::Read { offset, source })?;
        self.read += body.len() as u64;
        Ok(body)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn windows(input: &[u8], chunk_size: usize) -> Vec<Chunk> {
        ChunkReader::new(input, chunk_size)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn rejects_tiny_chunks() {
        assert!(matches!(
            ChunkReader::new(&b""[..], MIN_CHUNK_SIZE - 1),
            Err(Error::ChunkTooSmall { .. })
        ));
    }

    #[test]
    fn empty_stream_has_no_chunks() {
        assert!(windows(b"", 64).is_empty());
    }

    #[test]
    fn short_stream_is_a_single_complete_window() {
        let chunks = windows(b"1.2.3.4", 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data(), b"1.2.3.4");
        assert_eq!(chunks[0].edges(), Edges::COMPLETE);
    }

    #[test]
    fn windows_overlap_and_cover_the_stream() {
        let input: Vec<u8> = (0..200u8).collect();
        let chunks = windows(&input, 50);
        assert_eq!(chunks.len(), 4);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index(), i);
            let start = chunk.offset() as usize;
            assert_eq!(chunk.data(), &input[start..start + chunk.data().len()]);
            assert_eq!(chunk.edges().stream_start, i == 0);
            assert_eq!(chunk.edges().stream_end, i == 3);
        }
        assert_eq!(chunks[0].data().len(), 50);
        assert_eq!(chunks[1].offset(), (50 - OVERLAP) as u64);
        assert_eq!(chunks[1].data().len(), 50 + OVERLAP);
    }

    #[test]
    fn exact_multiple_flags_the_last_full_window() {
        let input = vec![b'x'; 128];
        let chunks = windows(&input, 64);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].edges().stream_end);
    }

    #[test]
    fn carry_spans_bodies_smaller_than_the_overlap() {
        let input: Vec<u8> = (0..60u8).collect();
        let chunks = windows(&input, MIN_CHUNK_SIZE);
        let third = &chunks[2];
        assert_eq!(third.offset(), (2 * MIN_CHUNK_SIZE - OVERLAP) as u64);
        assert_eq!(third.data().len(), OVERLAP + MIN_CHUNK_SIZE);
    }

    struct FailAfter {
        remaining: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'a');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn read_errors_carry_the_offset() {
        let mut reader = ChunkReader::new(FailAfter { remaining: 100 }, 64).unwrap();
        match reader.next_chunk() {
            Err(Error::Read { offset, .. }) => assert_eq!(offset, 64),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
