//! Reading source boundary
//!
//! The sensor channel is an opaque byte stream of whitespace-delimited ASCII
//! tokens. Validation happens in `ingestion`; this module only splits bytes
//! into tokens.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Lazy sequence of raw tokens
#[async_trait]
pub trait ReadingSource: Send {
    /// Next token, or `Ok(None)` once the source is exhausted
    ///
    /// Must be cancel-safe: the ingestion loop wraps each call in a timeout
    /// and a cancelled call must not lose bytes already read.
    async fn next_token(&mut self) -> std::io::Result<Option<String>>;
}

/// Whitespace tokenizer over any async byte stream
pub struct TokenSource<R> {
    reader: R,
    pending: Vec<u8>,
    eof: bool,
}

impl<R> TokenSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(64),
            eof: false,
        }
    }

    /// Pop the next complete token out of the pending bytes
    fn take_token(&mut self) -> Option<String> {
        match self.pending.iter().position(|b| !b.is_ascii_whitespace()) {
            None => {
                self.pending.clear();
                return None;
            }
            Some(start) => {
                self.pending.drain(..start);
            }
        }

        let end = match self.pending.iter().position(|b| b.is_ascii_whitespace()) {
            Some(end) => end,
            // Unterminated token: only complete once the stream has ended
            None if self.eof => self.pending.len(),
            None => return None,
        };

        let token: Vec<u8> = self.pending.drain(..end).collect();
        Some(String::from_utf8_lossy(&token).into_owned())
    }
}

impl TokenSource<tokio::fs::File> {
    /// Open a device, FIFO or regular file
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl<R> ReadingSource for TokenSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_token(&mut self) -> std::io::Result<Option<String>> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(token) = self.take_token() {
                return Ok(Some(token));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
