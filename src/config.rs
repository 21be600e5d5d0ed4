use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    protocol::LINE_TERMINATOR,
    timer::{Millis, MAX_DELAY},
};

/// The configuration used for running the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time between readings while distance tracking.
    pub telemetry_period_ms: Millis,

    /// The reading reported each period, without line terminator.
    pub reading: String,

    /// How many received bytes may wait for a line terminator.
    /// A line growing past this is dropped and answered with `E404`.
    pub line_buffer_capacity: usize,

    /// Put the pseudo-terminal slave in raw mode.
    /// Without this the line discipline echoes readings back to the emulator.
    pub raw_slave: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telemetry_period_ms: 50,
            reading: "1022.8".into(),
            line_buffer_capacity: 8192,
            raw_slave: true,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Could not parse configuration: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            telemetry_period_ms: 100,
            reading: "0042.0".into(),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(format!("Could not serialize configuration: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let path = p.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::BadConfig(format!("Could not read {path:?}: {e}")))?;

        Self::deserialize(&s)
    }

    fn check_period(&self) -> Result<(), Error> {
        if self.telemetry_period_ms == 0 {
            return Err(Error::BadConfig(
                "The telemetry period must be at least one millisecond, a zero period would never reschedule.".into(),
            ));
        }

        if self.telemetry_period_ms > MAX_DELAY {
            return Err(Error::BadConfig(format!(
                "The telemetry period is {}ms, it must be at most {MAX_DELAY}ms.",
                self.telemetry_period_ms
            )));
        }

        Ok(())
    }

    fn check_reading(&self) -> Result<(), Error> {
        if self.reading.is_empty() {
            return Err(Error::BadConfig("The reading must not be empty.".into()));
        }

        if self
            .reading
            .bytes()
            .any(|byte| byte == LINE_TERMINATOR || byte == b'\n')
        {
            return Err(Error::BadConfig(format!(
                "The reading `{:?}` must not contain line terminators, they are added when sending.",
                self.reading
            )));
        }

        Ok(())
    }

    fn check_capacity(&self) -> Result<(), Error> {
        if self.line_buffer_capacity < 2 {
            return Err(Error::BadConfig(format!(
                "The line buffer capacity is {}, it must fit at least a single byte command and its terminator.",
                self.line_buffer_capacity
            )));
        }

        Ok(())
    }

    /// Check the configuration makes sense.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_period()?;
        self.check_reading()?;
        self.check_capacity()?;

        Ok(())
    }
}
