//! The instrument side of the line protocol.
//!
//! A [`Session`] is registered as the [`ReadHandler`] of the device handle.
//! It buffers incoming bytes, acts on every complete line and keeps a periodic
//! timer armed while distance tracking is on.

use std::{
    io::{self, Read, Write},
    os::unix::io::RawFd,
    rc::Rc,
};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;
use tracing::{debug, info, trace, warn};

use crate::{
    config::Config,
    error::Error,
    protocol::{
        codecs::lines::{Frame, LinesCodec},
        Command, Reply,
    },
    reactor::registry::ReadHandler,
    timer::{Millis, TimerFlags, TimerId, TimerQueue},
};

/// Holding received bytes until they form lines.
pub mod buffer;

use buffer::LineBuffer;

/// Writes are best effort: a device which is not ready loses the data.
fn write_best_effort<D>(device: &D, bytes: &[u8])
where
    for<'a> &'a D: Write,
{
    let mut device = device;

    match device.write(bytes) {
        Ok(written) if written == bytes.len() => {
            trace!("Wrote `{:?}`", String::from_utf8_lossy(bytes))
        }
        Ok(written) => warn!(%written, total = %bytes.len(), "Short write to device"),
        Err(e) => warn!(?e, "Write to device failed, dropping"),
    }
}

/// One device talking the instrument protocol.
pub struct Session<D> {
    device: Rc<D>,
    buffer: LineBuffer,
    codec: LinesCodec,

    /// Kept after cancelling, so re-arming reuses the entry.
    telemetry: Option<TimerId>,
    period: Millis,

    /// The reading line, terminator included.
    reading: Bytes,

    /// The device failed, nothing is read anymore.
    ended: bool,
}

impl<D> Session<D>
where
    D: 'static,
    for<'a> &'a D: Read + Write,
{
    /// A session on `device`.
    /// The device should already be (or become, by registering) non-blocking.
    pub fn new(device: Rc<D>, config: &Config) -> Self {
        let mut codec = LinesCodec::new(config.line_buffer_capacity);

        let mut reading = BytesMut::new();
        if let Err(e) = codec.encode(Reply::Reading(config.reading.clone()), &mut reading) {
            warn!(?e, "Could not encode reading");
        }

        Self {
            device,
            buffer: LineBuffer::with_capacity(config.line_buffer_capacity),
            codec,
            telemetry: None,
            period: config.telemetry_period_ms,
            reading: reading.freeze(),
            ended: false,
        }
    }

    /// `true` if readings are being emitted.
    pub fn is_armed(&self, timers: &TimerQueue) -> bool {
        self.telemetry
            .map_or(false, |telemetry| timers.is_scheduled(telemetry))
    }

    /// `true` if reading failed and the session stopped participating.
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Bytes received but not yet part of a complete line.
    pub fn pending_input(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    fn handle(&mut self, command: Command, timers: &mut TimerQueue) {
        debug!(%command, "Command");

        match command {
            Command::DistanceTracking => self.arm(timers),
            Command::LaserOn => {
                self.disarm(timers);
                self.reply(Reply::LaserOn);
            }
            Command::LaserOff => {
                self.disarm(timers);
                self.reply(Reply::LaserOff);
            }
            Command::Unknown(_) => {
                self.disarm(timers);
                self.reply(Reply::NotFound);
            }
        }
    }

    fn arm(&mut self, timers: &mut TimerQueue) {
        if self.is_armed(timers) {
            trace!("Already tracking distance");
            return;
        }

        let device = Rc::clone(&self.device);
        let reading = self.reading.clone();
        let period = self.period;

        let emit = move |_: TimerId, _: Millis| {
            write_best_effort(&*device, &reading);
            period
        };

        match timers.set(self.telemetry, TimerFlags::RELATIVE, period, emit) {
            Ok(telemetry) => {
                debug!(%telemetry, %period, "Distance tracking on");
                self.telemetry = Some(telemetry);
            }
            Err(e) => warn!(?e, "Could not arm distance tracking"),
        }
    }

    fn disarm(&mut self, timers: &mut TimerQueue) {
        if let Some(telemetry) = self.telemetry {
            if timers.is_scheduled(telemetry) {
                debug!(%telemetry, "Distance tracking off");
            }
            timers.cancel(telemetry);
        }
    }

    fn reply(&mut self, reply: Reply) {
        let mut frame = BytesMut::new();

        match self.codec.encode(reply, &mut frame) {
            Ok(()) => write_best_effort(&*self.device, &frame),
            Err(e) => warn!(?e, "Could not encode reply"),
        }
    }

    /// Act on every complete line in the buffer.
    fn process(&mut self, timers: &mut TimerQueue) {
        loop {
            match self.buffer.decode(&mut self.codec) {
                Ok(Some(Frame::Line(line))) => self.handle(Command::parse(&line), timers),
                Ok(Some(Frame::Overlong)) => {
                    debug!(capacity = %self.buffer.capacity(), "Overlong line rejected");
                    self.handle(Command::Unknown(Vec::new()), timers);
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(?e, "Could not decode input");
                    return;
                }
            }
        }
    }

    fn end(&mut self, timers: &mut TimerQueue) {
        self.ended = true;
        self.disarm(timers);
    }
}

impl<D> ReadHandler for Session<D>
where
    D: 'static,
    for<'a> &'a D: Read + Write,
{
    fn on_readable(&mut self, fd: RawFd, timers: &mut TimerQueue) {
        if self.ended {
            trace!(%fd, "Session has ended, ignoring");
            return;
        }

        loop {
            match self.buffer.read_from(&*self.device) {
                Ok(0) => {
                    info!(%fd, "Device closed, session ends");
                    self.end(timers);
                    return;
                }
                Ok(read) => {
                    trace!(%fd, %read, "Read from device");
                    self.process(timers);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let e = Error::ReadFailure(e);
                    warn!(%fd, ?e, "Session ends");
                    self.end(timers);
                    return;
                }
            }
        }
    }
}
