//! Content-defined chunk boundary finder.
//!
//! A Rabin fingerprint rolls over a 64-byte window of the source; a
//! boundary fires when the low `average_bits` bits of the fingerprint are
//! zero, clamped by a hard floor and ceiling. Boundaries are a pure
//! function of content and polynomial, which is what localizes edits: a
//! byte inserted near the start of a large file re-chunks only the region
//! around the insertion, and downstream chunks keep their identity for
//! deduplication.
//!
//! The rolling update is table-driven: `out_table` removes the byte
//! leaving the window, `mod_table` folds the top 8 fingerprint bits back
//! under the polynomial, so each byte costs two XORs and a shift.

use std::io::{self, Read};

use crate::polynomial::Pol;

/// Bytes in the rolling fingerprint window.
pub const WINDOW_SIZE: usize = 64;

/// Default boundary mask width: the low 20 bits of the fingerprint must be
/// zero, giving ~1 MiB average chunks before the floor/ceiling clamp.
pub const DEFAULT_AVERAGE_BITS: u32 = 20;

/// Size of the internal read buffer pulling from the source.
const READ_BUF_SIZE: usize = 512 * 1024;

/// One chunk produced by the boundary finder.
///
/// Ephemeral: a chunk exists between boundary detection and being hashed
/// and written; only its derived (size, address) pair outlives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Ordinal index of this chunk in stream order, assigned by the
    /// producer before any concurrent handoff.
    pub position: u64,
    /// The chunk's bytes.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Chunk length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk holds no bytes. Never true for produced chunks.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lookup tables derived from the polynomial.
struct Tables {
    /// out_table[b] = fingerprint of b followed by 63 zero bytes; XORing
    /// it cancels byte b as it leaves the window.
    out_table: [u64; 256],
    /// mod_table[b] = (b << deg) mod pol | (b << deg): reduces the top 8
    /// fingerprint bits and clears them in one XOR.
    mod_table: [u64; 256],
}

impl Tables {
    fn new(pol: Pol) -> Tables {
        let deg = pol.degree();
        let mut out_table = [0u64; 256];
        let mut mod_table = [0u64; 256];
        for b in 0..256u64 {
            let mut h = Pol::new(b).modulo(pol);
            for _ in 0..WINDOW_SIZE - 1 {
                h = Pol::new(h.value() << 8).modulo(pol);
            }
            out_table[b as usize] = h.value();
            mod_table[b as usize] = Pol::new(b << deg).modulo(pol).value() | (b << deg);
        }
        Tables {
            out_table,
            mod_table,
        }
    }
}

/// Streaming boundary finder over a readable byte source.
///
/// Produces a finite lazy sequence of chunks covering the source with no
/// gaps and no overlaps, in stream order. Every chunk except possibly the
/// last satisfies `min_size <= len <= max_size`; an empty source yields no
/// chunks at all.
pub struct Chunker<R> {
    source: R,
    buf: Vec<u8>,
    bpos: usize,
    bmax: usize,
    eof: bool,

    tables: Tables,
    deg_shift: u32,
    split_mask: u64,
    min_size: usize,
    max_size: usize,

    window: [u8; WINDOW_SIZE],
    wpos: usize,
    digest: u64,

    position: u64,
}

impl<R: Read> Chunker<R> {
    /// New chunker over `source` with the given polynomial and bounds.
    ///
    /// `min_size` must be at least [`WINDOW_SIZE`] and below `max_size`;
    /// the splitter validates this before construction.
    pub fn new(source: R, pol: Pol, min_size: usize, max_size: usize) -> Chunker<R> {
        debug_assert!(min_size >= WINDOW_SIZE);
        debug_assert!(min_size < max_size);
        Chunker {
            source,
            buf: vec![0; READ_BUF_SIZE],
            bpos: 0,
            bmax: 0,
            eof: false,
            tables: Tables::new(pol),
            deg_shift: (pol.degree() - 8) as u32,
            split_mask: (1 << DEFAULT_AVERAGE_BITS) - 1,
            min_size,
            max_size,
            window: [0; WINDOW_SIZE],
            wpos: 0,
            digest: 0,
            position: 0,
        }
    }

    /// Override the boundary mask width (average chunk size ~2^bits bytes
    /// before clamping). Mostly useful for tests and small inputs.
    pub fn with_average_bits(mut self, bits: u32) -> Chunker<R> {
        debug_assert!((1..=63).contains(&bits));
        self.split_mask = (1 << bits) - 1;
        self
    }

    /// Recover the source, e.g. to finalize a digest tap wrapped around it.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Produce the next chunk, or `None` once the source is exhausted.
    pub fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        let mut data: Vec<u8> = Vec::new();
        let mut count = 0usize;
        // The first min-window bytes can never host a boundary, so they
        // bypass the fingerprint entirely; the window preheats over the 64
        // bytes leading up to the floor.
        let mut pre = self.min_size - WINDOW_SIZE;
        self.reset_window();

        loop {
            if self.bpos == self.bmax && !self.fill()? {
                if data.is_empty() {
                    return Ok(None);
                }
                // Final chunk of the stream; may undercut the floor.
                break;
            }

            if pre > 0 {
                let take = pre.min(self.bmax - self.bpos);
                data.extend_from_slice(&self.buf[self.bpos..self.bpos + take]);
                self.bpos += take;
                count += take;
                pre -= take;
                continue;
            }

            let start = self.bpos;
            let mut cut = None;
            for i in start..self.bmax {
                self.slide(self.buf[i]);
                count += 1;
                if count >= self.max_size
                    || (count >= self.min_size && self.digest & self.split_mask == 0)
                {
                    cut = Some(i + 1);
                    break;
                }
            }

            let end = cut.unwrap_or(self.bmax);
            data.extend_from_slice(&self.buf[start..end]);
            self.bpos = end;
            if cut.is_some() {
                break;
            }
        }

        let position = self.position;
        self.position += 1;
        Ok(Some(Chunk { position, data }))
    }

    fn reset_window(&mut self) {
        self.window = [0; WINDOW_SIZE];
        self.wpos = 0;
        self.digest = 0;
        // Seed a single one byte so a run of leading zero bytes still
        // advances the fingerprint state.
        self.slide(1);
    }

    fn slide(&mut self, b: u8) {
        let out = self.window[self.wpos];
        self.window[self.wpos] = b;
        self.wpos = (self.wpos + 1) % WINDOW_SIZE;
        self.digest ^= self.tables.out_table[out as usize];

        let index = (self.digest >> self.deg_shift) as usize;
        self.digest <<= 8;
        self.digest |= u64::from(b);
        self.digest ^= self.tables.mod_table[index];
    }

    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        loop {
            match self.source.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.bpos = 0;
                    self.bmax = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
