//! Performance utilities: parallel payload framing and write-buffer batching.
//!
//! # Parallel framing
//!
//! [`encode_payloads`] compresses every module payload independently.  With
//! the `parallel` feature the work is spread over Rayon's global pool;
//! without it the same code runs sequentially.  Either way the result is in
//! input order, because the data region layout is positional.
//!
//! # Write buffer
//!
//! [`WriteBuffer`] groups the 20 and 24 byte table records into larger
//! writes.

use std::io::{self, Write};

use crate::error::Result;
use crate::frame::{self, Framing};

// ── Parallel payload framing ─────────────────────────────────────────────────

/// Frame each `(payload, framing)` pair.  Returns one encoded payload per
/// input, in input order; the first error wins.
pub fn encode_payloads(inputs: &[(&[u8], Framing)]) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        inputs
            .par_iter()
            .map(|(data, framing)| frame::encode(data, *framing))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        inputs
            .iter()
            .map(|(data, framing)| frame::encode(data, *framing))
            .collect()
    }
}

// ── Write buffer ─────────────────────────────────────────────────────────────

/// Output batching that also counts every byte it accepts; the store writer
/// compares `bytes_written` with its planned container size.
pub struct WriteBuffer<W: Write> {
    inner:     W,
    pending:   Vec<u8>,
    threshold: usize,
    pub bytes_written: u64,
}

impl<W: Write> WriteBuffer<W> {
    pub fn new(inner: W, threshold: usize) -> Self {
        Self { inner, pending: Vec::with_capacity(threshold), threshold, bytes_written: 0 }
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.inner.write_all(&self.pending)?;
            self.pending.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.pending.len() + buf.len() > self.threshold {
            self.drain()?;
        }
        if buf.len() >= self.threshold {
            self.inner.write_all(buf)?;
        } else {
            self.pending.extend_from_slice(buf);
        }
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}
