//! Writing half of a framed link.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// Writes length prefixed frames into `W`.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    /// Holds the length prefix and every serialized byte that is not sent zero-copy.
    head: Vec<u8>,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            head: Vec::new(),
            bytes_sent: 0,
        }
    }

    /// Total bytes written so far, length prefixes included.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Frames `msg` and writes it, then flushes the writer.
    ///
    /// The payload a message lends out of its own memory is written straight after the head,
    /// without being copied into it.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self {
            tx,
            head,
            bytes_sent,
        } = self;

        head.clear();
        head.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let borrowed = msg.serialize(head);
        let body_len = head.len() - LEN_TYPE_SIZE + borrowed.map_or(0, <[u8]>::len);
        head[..LEN_TYPE_SIZE].copy_from_slice(&(body_len as LenType).to_be_bytes());

        tx.write_all(head).await?;
        if let Some(payload) = borrowed {
            tx.write_all(payload).await?;
        }
        tx.flush().await?;

        *bytes_sent += (LEN_TYPE_SIZE + body_len) as u64;
        Ok(())
    }
}
