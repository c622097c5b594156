use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    event::{Detector, DEFAULT_MARKER},
    hub::DEFAULT_QUEUE_CAPACITY,
    relay::Backoff,
    serial::{codecs::lines::LinesCodec, serial_port::SerialPortBuilder, DEFAULT_BAUD},
    source::{
        simulated::{self, Simulated, DEFAULT_RPM},
        Connect,
    },
};

/// The default port to run the server on.
pub const DEFAULT_PORT: u16 = 8001;

/// The device path used if nothing else is configured.
pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// A real serial port.
    Serial {
        /// The path to the port.
        /// Likely "/dev/ttyACMx" or "COMx".
        path: String,

        /// The baud rate to open the port with.
        baud: u32,
    },

    /// Synthetic records on a clock, for running without hardware.
    Simulated {
        /// Revolutions per minute. Each revolution is one record.
        rpm: f64,
    },
}

impl Default for Source {
    fn default() -> Self {
        Self::Serial {
            path: DEFAULT_DEVICE.into(),
            baud: DEFAULT_BAUD,
        }
    }
}

/// How to back off when reconnecting to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reconnect {
    /// The first delay, in milliseconds.
    pub initial_delay_ms: u64,

    /// The delay never grows beyond this, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 3_000,
        }
    }
}

impl Reconnect {
    /// The [`Backoff`] described by this.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// The configuration used for running the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The address to listen on.
    pub bind_address: IpAddr,

    /// The port to listen on. Zero picks any free port.
    pub port: u16,

    /// Where records come from.
    pub source: Source,

    /// The line which counts as a pedal event.
    pub marker: String,

    /// How many events may wait for a single client before new ones are dropped for it.
    pub session_queue_capacity: usize,

    /// Reconnection backoff.
    pub reconnect: Reconnect,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            source: Source::default(),
            marker: DEFAULT_MARKER.into(),
            session_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect: Reconnect::default(),
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
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            source: Source::Serial {
                path: "/dev/cu.usbmodem1101".into(),
                baud: DEFAULT_BAUD,
            },
            ..Default::default()
        }
    }

    /// A configuration running the simulation at the default rate.
    pub fn simulated() -> Self {
        Self {
            source: Source::Simulated { rpm: DEFAULT_RPM },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(format!("Could not serialize: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let path = p.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::BadConfig(format!("Could not read {path:?}: {e}")))?;

        Self::deserialize(&s)
    }

    /// The address the server should bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// The detector for the configured marker.
    pub fn detector(&self) -> Detector {
        Detector::new(&self.marker)
    }

    /// Open the configured source.
    /// The choice is made once, here.
    pub fn connector(&self) -> Result<Arc<dyn Connect>, Error> {
        Ok(match &self.source {
            Source::Serial { path, baud } => Arc::new(
                SerialPortBuilder::new(path)
                    .set_baud(*baud)
                    .set_line_codec(LinesCodec::default()),
            ),
            Source::Simulated { rpm } => {
                Arc::new(Simulated::from_rpm(*rpm)?.with_line(self.marker.as_str()))
            }
        })
    }

    fn check_source(&self) -> Result<(), Error> {
        match &self.source {
            Source::Serial { path, .. } if path.trim().is_empty() => {
                Err(Error::BadConfig("The serial port path is empty.".into()))
            }
            Source::Serial { baud: 0, .. } => {
                Err(Error::BadConfig("The baud rate must be positive.".into()))
            }
            Source::Simulated { rpm } if simulated::period_from_rpm(*rpm).is_none() => {
                Err(Error::BadConfig(format!(
                    "The simulated rpm must be a positive number giving a period above zero, got `{rpm}`."
                )))
            }
            _ => Ok(()),
        }
    }

    fn check_marker(&self) -> Result<(), Error> {
        if self.marker.trim().is_empty() {
            Err(Error::BadConfig(
                "The marker must contain something other than whitespace.".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn check_queue(&self) -> Result<(), Error> {
        if self.session_queue_capacity == 0 {
            Err(Error::BadConfig(
                "The session queue capacity must be positive.".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn check_reconnect(&self) -> Result<(), Error> {
        let Reconnect {
            initial_delay_ms,
            max_delay_ms,
        } = self.reconnect;

        if initial_delay_ms == 0 || initial_delay_ms > max_delay_ms {
            Err(Error::BadConfig(format!("Reconnect delays must satisfy 0 < initial <= max, got initial {initial_delay_ms} ms and max {max_delay_ms} ms.")))
        } else {
            Ok(())
        }
    }

    /// Check that the values make sense.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_source()?;
        self.check_marker()?;
        self.check_queue()?;
        self.check_reconnect()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serialize_roundtrip() {
        let c = Config::example();
        let s = c.serialize_pretty().unwrap();

        println!("{s}");

        assert_eq!(Config::deserialize(&s).unwrap(), c);
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    bind_address: "127.0.0.1",
    port: 9000,
    source: Serial(
        path: "/dev/cu.usbmodem1101",
        baud: 9600,
    ),
    marker: ".",
    session_queue_capacity: 8,
    reconnect: (
        initial_delay_ms: 100,
        max_delay_ms: 1000,
    ),
)
"#;
        let config = Config::deserialize(input).unwrap();

        assert_eq!(config.socket_addr(), SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.session_queue_capacity, 8);
        assert_eq!(
            config.source,
            Source::Serial {
                path: "/dev/cu.usbmodem1101".into(),
                baud: 9600
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn missing_fields_are_defaults() {
        let config = Config::deserialize("(source: Simulated(rpm: 9.44))").unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.marker, ".");
        assert_eq!(config.reconnect, Reconnect::default());
        assert_eq!(config, Config::simulated());

        let config = Config::deserialize("()").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn bad_ron() {
        let err = Config::deserialize("(port: \"lots\")")
            .unwrap_err()
            .try_into_bad_config()
            .unwrap();

        assert!(err.contains("RON"));
    }

    #[test]
    fn bad_config_rpm() {
        for rpm in [0.0, -1.0, 1e12, 1e-20, f64::NAN, f64::INFINITY] {
            let c = Config {
                source: Source::Simulated { rpm },
                ..Default::default()
            };

            let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
            assert!(err.contains("rpm"));

            assert!(c.connector().is_err());
        }
    }

    #[test]
    fn serial_connector() {
        let config = Config::example();
        assert_eq!(
            config.connector().unwrap().describe(),
            "serial port /dev/cu.usbmodem1101 @ 9600 baud"
        );
    }

    #[test]
    fn bad_config_serial() {
        let c = Config {
            source: Source::Serial {
                path: "  ".into(),
                baud: 9600,
            },
            ..Default::default()
        };
        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("path"));

        let c = Config {
            source: Source::Serial {
                path: "/dev/ttyUSB0".into(),
                baud: 0,
            },
            ..Default::default()
        };
        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("baud"));
    }

    #[test]
    fn bad_config_marker_queue_reconnect() {
        let c = Config {
            marker: " ".into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = Config {
            session_queue_capacity: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = Config {
            reconnect: Reconnect {
                initial_delay_ms: 500,
                max_delay_ms: 100,
            },
            ..Default::default()
        };
        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        // Mentions both values.
        assert!(err.contains("500"));
        assert!(err.contains("100"));
    }

    #[test]
    fn simulation_period() {
        let config = Config::simulated();
        assert_eq!(
            config.connector().unwrap().describe(),
            format!(
                "simulation, one record every {:?}",
                Duration::from_secs_f64(60.0 / DEFAULT_RPM)
            )
        );
    }
}
