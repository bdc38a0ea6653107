//! Reading half of a framed link.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Align4, Deserialize, LEN_TYPE_SIZE, LenType};

/// Frames larger than this are rejected before allocating.
const MAX_FRAME_LEN: usize = 1 << 30;

/// Reads length prefixed frames out of `R`.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    bytes_received: u64,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            bytes_received: 0,
        }
    }

    /// Total bytes read so far, length prefixes included.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Waits for the next frame and decodes it in place.
    ///
    /// # Arguments
    /// * `buf` - Storage for the frame body. Its element type keeps the body 4 bytes aligned so
    ///   float payloads can be borrowed out of it, the decoded `T` lives as long as the borrow.
    ///
    /// # Errors
    /// If reading fails, the frame is larger than 1 GiB or the body does not decode as `T`.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align4,
    {
        let mut prefix = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut prefix).await?;

        let len = LenType::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
            ));
        }

        buf.resize(len.div_ceil(size_of::<B>()), bytemuck::Zeroable::zeroed());
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
        let body = &mut bytes[..len];
        self.rx.read_exact(body).await?;

        self.bytes_received += (LEN_TYPE_SIZE + len) as u64;
        T::deserialize(body)
    }
}
