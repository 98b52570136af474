//! JSON-lines transaction reader

use crate::types::transaction::Transaction;
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// One non-blank input line, parsed or not
#[derive(Debug)]
pub struct ConsumedLine {
    pub line_number: u64,
    pub parsed: serde_json::Result<Transaction>,
}

/// Reads one JSON transaction per line. Blank lines are skipped.
///
/// Lines are read as raw bytes, so a line that is not valid UTF-8 comes back
/// as a failed parse of that line and the stream carries on.
pub struct TransactionConsumer<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: u64,
}

impl TransactionConsumer<BufReader<Stdin>> {
    /// Consumer over the process's standard input
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> TransactionConsumer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
            line_number: 0,
        }
    }

    /// Next non-blank line, or `None` at end of input
    pub async fn next_transaction(&mut self) -> Result<Option<ConsumedLine>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(ConsumedLine {
                line_number: self.line_number,
                parsed: serde_json::from_slice(line),
            }));
        }
    }

    /// Lines read so far, blank ones included
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }
}
