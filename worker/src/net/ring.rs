use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Result, WorkerErr, data::shard_range};

/// The links of a ring member: one from its predecessor and one to its successor.
struct Links<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<f32>,
}

/// A replica's handle on the ring of workers, every collective must be entered by all of them.
///
/// Data flows from the worker with rank `i` to the one with rank `(i + 1) % world_size`.
pub struct Ring<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rank: usize,
    world_size: usize,
    links: Option<Links<R, W>>,
}

impl<R, W> Ring<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new member of a ring of `world_size` workers.
    ///
    /// # Arguments
    /// * `rank` - This worker's position in the ring.
    /// * `world_size` - The amount of workers in the ring, at least 2.
    /// * `rx` - The receiving end of the link from the predecessor.
    /// * `tx` - The sending end of the link to the successor.
    pub fn new(rank: usize, world_size: usize, rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        assert!(rank < world_size, "rank out of range");
        Self {
            rank,
            world_size,
            links: Some(Links {
                rx,
                tx,
                rx_buf: Vec::new(),
            }),
        }
    }

    /// A ring made of a single worker, every collective is a no-op.
    pub fn single() -> Self {
        Self {
            rank: 0,
            world_size: 1,
            links: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Bytes sent to the successor and received from the predecessor so far.
    pub fn traffic(&self) -> (u64, u64) {
        self.links
            .as_ref()
            .map_or((0, 0), |l| (l.tx.bytes_sent(), l.rx.bytes_received()))
    }

    fn is_chief(&self) -> bool {
        self.rank == 0
    }

    /// Whether the successor of this worker is the chief, where broadcasts stop.
    fn is_last(&self) -> bool {
        self.rank + 1 == self.world_size
    }

    /// Sums `data` element wise across every worker, leaving the same result on all of them.
    ///
    /// Reduce-scatter followed by all-gather: each worker sends and receives
    /// `2 * (world_size - 1)` segments of roughly `data.len() / world_size` values.
    ///
    /// # Errors
    /// If a link fails, a peer reports an error or the buffers differ in size across workers.
    pub async fn all_reduce_sum(&mut self, data: &mut [f32]) -> Result<()> {
        let n = self.world_size;
        let rank = self.rank;
        let Some(Links { rx, tx, rx_buf }) = &mut self.links else {
            return Ok(());
        };

        let len = data.len();
        let segment = |i: usize| shard_range(len, i % n, n);

        for step in 0..n - 1 {
            let send = segment(rank + n - step);
            let recv = segment(rank + n - step - 1);

            let incoming = exchange(rx, tx, rx_buf, &data[send], "reduce-scatter").await?;
            check_len("reduce-scatter segment", incoming.len(), recv.len())?;

            for (acc, v) in data[recv].iter_mut().zip(incoming) {
                *acc += v;
            }
        }

        for step in 0..n - 1 {
            let send = segment(rank + 1 + n - step);
            let recv = segment(rank + n - step);

            let incoming = exchange(rx, tx, rx_buf, &data[send], "all-gather").await?;
            check_len("all-gather segment", incoming.len(), recv.len())?;

            data[recv].copy_from_slice(incoming);
        }

        Ok(())
    }

    /// Overwrites `weights` on every worker with the chief's values.
    pub async fn broadcast_weights(&mut self, weights: &mut [f32]) -> Result<()> {
        let is_chief = self.is_chief();
        let is_last = self.is_last();
        let Some(Links { rx, tx, rx_buf }) = &mut self.links else {
            return Ok(());
        };

        if !is_chief {
            let msg: Msg = rx.recv_into(rx_buf).await?;
            match msg {
                Msg::Data(Payload::Weights(incoming)) => {
                    check_len("broadcast weights", incoming.len(), weights.len())?;
                    weights.copy_from_slice(incoming);
                }
                Msg::Err(e) => return Err(WorkerErr::Peer(e.into_owned())),
                other => {
                    return Err(WorkerErr::UnexpectedMessage {
                        during: "weights broadcast",
                        got: other.kind(),
                    });
                }
            }
        }

        if !is_last {
            tx.send(&Msg::Data(Payload::Weights(&mut *weights))).await?;
        }

        debug!("synchronized {} parameters", weights.len());
        Ok(())
    }

    /// Agrees on the run seed: the chief's `seed` (or a random one) ends up on every worker.
    ///
    /// # Arguments
    /// * `seed` - Only read on the chief.
    ///
    /// # Returns
    /// The seed shared by every worker.
    pub async fn broadcast_seed(&mut self, seed: Option<u64>) -> Result<u64> {
        let is_chief = self.is_chief();
        let is_last = self.is_last();
        let chief_seed = || seed.unwrap_or_else(rand::random);

        let Some(Links { rx, tx, rx_buf }) = &mut self.links else {
            return Ok(chief_seed());
        };

        let seed = if is_chief {
            chief_seed()
        } else {
            let msg: Msg = rx.recv_into(rx_buf).await?;
            match msg {
                Msg::Control(Command::Sync { seed }) => seed,
                Msg::Err(e) => return Err(WorkerErr::Peer(e.into_owned())),
                other => {
                    return Err(WorkerErr::UnexpectedMessage {
                        during: "seed broadcast",
                        got: other.kind(),
                    });
                }
            }
        };

        if !is_last {
            tx.send(&Msg::Control(Command::Sync { seed })).await?;
        }

        info!("run seed is {seed}");
        Ok(seed)
    }
}

/// Sends `outgoing` to the successor while receiving a segment from the predecessor.
async fn exchange<'buf, R, W>(
    rx: &mut OnoReceiver<R>,
    tx: &mut OnoSender<W>,
    rx_buf: &'buf mut Vec<f32>,
    outgoing: &[f32],
    during: &'static str,
) -> Result<&'buf [f32]>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let msg = Msg::Data(Payload::Gradient(outgoing));
    let ((), incoming): ((), Msg) = tokio::try_join!(tx.send(&msg), rx.recv_into(rx_buf))?;

    match incoming {
        Msg::Data(Payload::Gradient(segment)) => Ok(segment),
        Msg::Err(e) => Err(WorkerErr::Peer(e.into_owned())),
        other => Err(WorkerErr::UnexpectedMessage {
            during,
            got: other.kind(),
        }),
    }
}

fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(WorkerErr::LengthMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}
