use std::time::Duration;

use color_eyre::Result;
use laser_emu::{client, config::Config};
use tokio::time::timeout;

mod common;
use common::spawn_emulator;

#[tokio::test]
async fn passthrough_copies_readings_until_device_closes() -> Result<()> {
    let device = spawn_emulator(Config::default(), Duration::from_millis(300))?;

    let mut out = vec![];
    timeout(
        Duration::from_secs(5),
        client::passthrough(device, "DX", &mut out),
    )
    .await??;

    let out = String::from_utf8(out)?;
    let readings = out.matches("1022.8\r\n").count();

    assert!(readings >= 2, "{out:?}");
    assert_eq!(out.len(), readings * "1022.8\r\n".len(), "{out:?}");

    Ok(())
}

#[tokio::test]
async fn passthrough_shows_rejections() -> Result<()> {
    let device = spawn_emulator(Config::default(), Duration::from_millis(100))?;

    let mut out = vec![];
    timeout(
        Duration::from_secs(5),
        client::passthrough(device, "HELLO", &mut out),
    )
    .await??;

    assert_eq!(out, b"E404\r\n");

    Ok(())
}
