use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const GRADIENT_KIND: Header = 2;
const WEIGHTS_KIND: Header = 3;

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// Floats travel in the host's native byte order, every worker of a cluster is expected to share it.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A segment of a buffer being reduced along the ring.
    Gradient(&'a [f32]),
    /// The replicated parameters being broadcast by the chief.
    Weights(&'a mut [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Sent by a worker to its ring successor right after connecting.
    Hello { task_index: usize, world_size: usize },
    /// The successor's answer to a valid `Hello`.
    Welcome,
    /// The chief's run seed, shared so that every replica shuffles alike.
    Sync { seed: u64 },
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// Returns a short name of the variant, used when reporting protocol violations.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(_) => "control",
            Msg::Data(Payload::Gradient(_)) => "gradient",
            Msg::Data(Payload::Weights(_)) => "weights",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = ERR_KIND.to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                let header = CONTROL_KIND.to_be_bytes();
                buf.extend_from_slice(&header);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, nums): (Header, &[f32]) = match payload {
                    Payload::Gradient(grad) => (GRADIENT_KIND, *grad),
                    Payload::Weights(weights) => (WEIGHTS_KIND, &**weights),
                };

                let header = kind.to_be_bytes();
                buf.extend_from_slice(&header);
                Some(bytemuck::cast_slice(nums))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR_KIND => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_KIND => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            GRADIENT_KIND | WEIGHTS_KIND => {
                let nums: &mut [f32] = bytemuck::try_cast_slice_mut(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{err:?}")))?;

                let payload = if kind == GRADIENT_KIND {
                    Payload::Gradient(nums)
                } else {
                    Payload::Weights(nums)
                };

                Ok(Self::Data(payload))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
