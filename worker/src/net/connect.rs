use std::borrow::Cow;

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time,
};

use crate::{Result, WorkerErr, config::RetryPolicy};

/// Connects to `addr`, retrying as allowed by `policy`.
pub async fn dial(addr: &str, policy: RetryPolicy) -> Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if policy.should_retry(attempt) => {
                debug!("connection attempt {attempt} to {addr} failed: {e}");
                if attempt % 10 == 0 {
                    warn!("still waiting for {addr} after {attempt} attempts");
                }

                time::sleep(policy.backoff()).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(WorkerErr::Connect {
                    addr: addr.to_string(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Opens the link to the ring successor: dial it, introduce ourselves and wait to be welcomed.
///
/// # Returns
/// The sending half of the link.
pub async fn join_successor(
    addr: &str,
    policy: RetryPolicy,
    task_index: usize,
    world_size: usize,
) -> Result<OnoSender<OwnedWriteHalf>> {
    let stream = dial(addr, policy).await?;
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    introduce(&mut rx, &mut tx, task_index, world_size).await?;
    info!("joined ring successor at {addr}");
    Ok(tx)
}

/// Accepts the link from the ring predecessor, whose `Hello` must match the cluster.
///
/// # Returns
/// The receiving half of the link.
pub async fn accept_predecessor(
    listener: &TcpListener,
    expected_index: usize,
    world_size: usize,
) -> Result<OnoReceiver<OwnedReadHalf>> {
    let (stream, addr) = listener.accept().await?;
    stream.set_nodelay(true)?;

    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    welcome(&mut rx, &mut tx, expected_index, world_size).await?;
    info!("accepted ring predecessor from {addr}");
    Ok(rx)
}

/// The dialing side of the handshake.
pub async fn introduce<R, W>(
    rx: &mut OnoReceiver<R>,
    tx: &mut OnoSender<W>,
    task_index: usize,
    world_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = Command::Hello {
        task_index,
        world_size,
    };
    tx.send(&Msg::Control(hello)).await?;

    let mut buf: Vec<u32> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await?;
    match msg {
        Msg::Control(Command::Welcome) => Ok(()),
        Msg::Err(reason) => Err(WorkerErr::Peer(reason.into_owned())),
        other => Err(WorkerErr::UnexpectedMessage {
            during: "handshake",
            got: other.kind(),
        }),
    }
}

/// The accepting side of the handshake, a mismatching `Hello` is answered with an error.
pub async fn welcome<R, W>(
    rx: &mut OnoReceiver<R>,
    tx: &mut OnoSender<W>,
    expected_index: usize,
    world_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf: Vec<u32> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await?;

    let reason = match msg {
        Msg::Control(Command::Hello {
            task_index,
            world_size: theirs,
        }) if task_index == expected_index && theirs == world_size => None,
        Msg::Control(Command::Hello {
            task_index,
            world_size: theirs,
        }) => Some(format!(
            "expected worker {expected_index} of {world_size}, got worker {task_index} of {theirs}"
        )),
        other => Some(format!("expected hello, got {}", other.kind())),
    };

    match reason {
        None => {
            tx.send(&Msg::Control(Command::Welcome)).await?;
            Ok(())
        }
        Some(reason) => {
            warn!("rejecting ring predecessor: {reason}");
            tx.send(&Msg::Err(Cow::Borrowed(reason.as_str()))).await?;
            Err(WorkerErr::Handshake(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io;

    use super::*;

    async fn handshake(
        task_index: usize,
        world_size: usize,
    ) -> (Result<()>, Result<()>) {
        let (a, b) = io::duplex(256);
        let (a_rx, a_tx) = io::split(a);
        let (b_rx, b_tx) = io::split(b);
        let (mut a_rx, mut a_tx) = comms::channel(a_rx, a_tx);
        let (mut b_rx, mut b_tx) = comms::channel(b_rx, b_tx);

        tokio::join!(
            introduce(&mut a_rx, &mut a_tx, task_index, world_size),
            welcome(&mut b_rx, &mut b_tx, 1, 3),
        )
    }

    #[tokio::test]
    async fn matching_hello_is_welcomed() {
        let (dialer, acceptor) = handshake(1, 3).await;
        assert!(dialer.is_ok());
        assert!(acceptor.is_ok());
    }

    #[tokio::test]
    async fn wrong_predecessor_is_rejected_on_both_ends() {
        let (dialer, acceptor) = handshake(2, 3).await;
        assert!(matches!(dialer, Err(WorkerErr::Peer(ref r)) if r.contains("got worker 2 of 3")));
        assert!(matches!(acceptor, Err(WorkerErr::Handshake(_))));
    }

    #[tokio::test]
    async fn mismatched_world_size_is_rejected() {
        let (dialer, acceptor) = handshake(1, 4).await;
        assert!(dialer.is_err());
        assert!(matches!(acceptor, Err(WorkerErr::Handshake(ref r)) if r.contains("of 4")));
    }

    #[tokio::test]
    async fn fail_fast_dial_gives_up_after_one_attempt() {
        use comms::specs::FailFast;

        use crate::config::ConnectOptions;

        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let policy = RetryPolicy::new(FailFast::Enabled, ConnectOptions::default());

        let err = dial(&addr.to_string(), policy).await.unwrap_err();
        assert!(matches!(err, WorkerErr::Connect { attempts: 1, .. }));
    }
}
