//! A raw client for the emulated instrument.
//!
//! Sends one command and then copies whatever the device says to an output,
//! byte for byte.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{BytesCodec, Framed};
use tracing::{debug, info, trace};

use crate::error::Error;

/// The baud rate used if nothing else is given.
/// A pseudo-terminal ignores it.
pub const DEFAULT_BAUD: u32 = 9600;

/// Open the device at `path`.
pub fn open(path: &str, baud: u32) -> Result<SerialStream, Error> {
    let port = tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(|source| Error::OpenDevice {
            path: path.to_owned(),
            source,
        })?;

    info!(%path, %baud, "Opened device");

    Ok(port)
}

/// Send `command` with a `\r\n` terminator,
/// then copy everything received to `out` until the device closes.
pub async fn passthrough<S, W>(port: S, command: &str, mut out: W) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut framed = Framed::new(port, BytesCodec::new());

    debug!(%command, "Sending");
    framed
        .send(Bytes::from(format!("{command}\r\n")))
        .await
        .map_err(Error::Client)?;

    while let Some(chunk) = framed.next().await {
        let chunk = chunk.map_err(Error::Client)?;
        trace!(len = %chunk.len(), "Received");

        out.write_all(&chunk).await.map_err(Error::Client)?;
        out.flush().await.map_err(Error::Client)?;
    }

    debug!("Device closed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::UnixStream,
    };

    use super::*;

    #[tokio::test]
    async fn sends_command_and_copies_replies() {
        let (ours, mut device) = UnixStream::pair().unwrap();

        let device = tokio::spawn(async move {
            let mut command = [0; 4];
            device.read_exact(&mut command).await.unwrap();

            device.write_all(b"1022.8\r\n1022").await.unwrap();
            device.write_all(b".8\r\n").await.unwrap();

            command
        });

        let mut out = vec![];
        passthrough(ours, "DX", &mut out).await.unwrap();

        assert_eq!(&device.await.unwrap(), b"DX\r\n");
        assert_eq!(out, b"1022.8\r\n1022.8\r\n");
    }

    #[tokio::test]
    async fn any_command_is_sent_verbatim() {
        let (ours, mut device) = UnixStream::pair().unwrap();

        let device = tokio::spawn(async move {
            let mut command = [0; 4];
            device.read_exact(&mut command).await.unwrap();
            device.write_all(&command).await.unwrap();

            command
        });

        let mut out = vec![];
        passthrough(ours, "LO", &mut out).await.unwrap();

        assert_eq!(&device.await.unwrap(), b"LO\r\n");
        assert_eq!(out, b"LO\r\n");
    }

    #[tokio::test]
    async fn missing_device_is_an_error() {
        let err = open("/dev/does-not-exist", DEFAULT_BAUD).unwrap_err();

        assert!(matches!(err, Error::OpenDevice { .. }));
    }
}
