#![allow(dead_code)]

use std::{os::unix::net, rc::Rc, thread, time::Duration};

use color_eyre::Result;
use futures::StreamExt;
use laser_emu::{config::Config, emulator, logging, reactor::Reactor};
use tokio::{io::AsyncWriteExt, net::UnixStream, time::timeout};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, Level};

/// A reactor serving one end of a socket pair on its own thread, for `run_for`.
/// The returned stream is the other end.
///
/// When the reactor is done the thread drops its end, so the returned stream
/// then sees end of file.
pub fn spawn_emulator(config: Config, run_for: Duration) -> Result<UnixStream> {
    logging::init(Level::DEBUG, None);

    let (device, ours) = net::UnixStream::pair()?;

    thread::spawn(move || {
        let mut reactor = Reactor::new().expect("Reactor should start");
        emulator::serve(&mut reactor, Rc::new(device), &config).expect("Device should register");

        reactor.run_for(run_for).expect("Reactor should keep running");
        info!("Emulator thread done");
    });

    ours.set_nonblocking(true)?;

    Ok(UnixStream::from_std(ours)?)
}

/// Lines as the client sees them, terminators stripped.
pub struct Client {
    lines: FramedRead<tokio::net::unix::OwnedReadHalf, LinesCodec>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl Client {
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();

        Self {
            lines: FramedRead::new(reader, LinesCodec::new()),
            writer,
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    pub async fn receive(&mut self) -> Result<String> {
        let line = timeout(Duration::from_secs(5), self.lines.next())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

        Ok(line)
    }

    /// `None` if nothing arrived within `quiet`.
    pub async fn receive_within(&mut self, quiet: Duration) -> Result<Option<String>> {
        match timeout(quiet, self.lines.next()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Ok(None),
            Ok(Some(line)) => Ok(Some(line?)),
        }
    }

    /// `true` if the stream ended within `wait`.
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        matches!(timeout(wait, self.lines.next()).await, Ok(None))
    }
}
