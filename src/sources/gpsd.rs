//! Position source speaking the gpsd JSON protocol.
//!
//! Connects to a gpsd daemon, enables JSON watch mode and reads TPV
//! reports from the line stream. Reports without a 2D fix are skipped.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::location::Coordinate;

use super::gps::{Permission, PositionError, PositionSource};

const WATCH_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true};\r\n";
const FIX_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a gpsd daemon.
pub struct GpsdSource {
    address: String,
    connection: Option<Connection>,
}

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Held so the daemon keeps streaming; nothing is written after the
    // watch command.
    _write: OwnedWriteHalf,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct Tpv {
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl Tpv {
    fn coordinate(&self) -> Option<Coordinate> {
        if self.mode < 2 {
            return None;
        }
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }
}

impl GpsdSource {
    /// Create a client for the daemon at `address` (host:port).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connection: None,
        }
    }

    async fn connect(&mut self) -> Result<(), std::io::Error> {
        let stream = TcpStream::connect(&self.address).await?;
        let (read, mut write) = stream.into_split();

        write.write_all(WATCH_COMMAND.as_bytes()).await?;

        self.connection = Some(Connection {
            lines: BufReader::new(read).lines(),
            _write: write,
        });
        Ok(())
    }

    /// Read lines until the next usable TPV report.
    async fn next_fix(&mut self) -> Option<Coordinate> {
        let connection = self.connection.as_mut()?;

        loop {
            let line = match connection.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("gpsd: connection closed by daemon");
                    self.connection = None;
                    return None;
                }
                Err(err) => {
                    warn!("gpsd: read error: {err}");
                    self.connection = None;
                    return None;
                }
            };

            match serde_json::from_str::<Report>(&line) {
                Ok(Report::Tpv(tpv)) => {
                    if let Some(fix) = tpv.coordinate() {
                        return Some(fix);
                    }
                    debug!("gpsd: skipping report without a fix");
                }
                Ok(Report::Other) => {}
                Err(err) => {
                    debug!("gpsd: unparsable line: {err}");
                }
            }
        }
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn request_permission(&mut self) -> Result<Permission, PositionError> {
        match self.connect().await {
            Ok(()) => Ok(Permission::Granted),
            Err(err) => {
                debug!("gpsd: access to {} refused: {err}", self.address);
                Ok(Permission::Denied)
            }
        }
    }

    async fn current_position(&mut self) -> Result<Coordinate, PositionError> {
        match timeout(FIX_TIMEOUT, self.next_fix()).await {
            Ok(Some(fix)) => Ok(fix),
            Ok(None) => Err(PositionError::FeedClosed),
            Err(_) => Err(PositionError::Timeout),
        }
    }

    async fn next_position(&mut self) -> Option<Coordinate> {
        self.next_fix().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_tpv_report() {
        let line = r#"{"class":"TPV","device":"/dev/ttyS0","mode":3,"time":"2024-03-02T10:01:45.000Z","lat":6.5244,"lon":3.3792,"alt":40.9}"#;
        let report: Report = serde_json::from_str(line).unwrap();
        let Report::Tpv(tpv) = report else {
            panic!("expected a TPV report");
        };
        assert_eq!(Some(Coordinate::new(6.5244, 3.3792)), tpv.coordinate());
    }

    #[test]
    fn test_tpv_without_fix_yields_no_coordinate() {
        let line = r#"{"class":"TPV","device":"/dev/ttyS0","mode":1}"#;
        let report: Report = serde_json::from_str(line).unwrap();
        let Report::Tpv(tpv) = report else {
            panic!("expected a TPV report");
        };
        assert_eq!(None, tpv.coordinate());
    }

    #[test]
    fn test_other_reports_are_skipped() {
        let line = r#"{"class":"VERSION","release":"3.25","proto_major":3,"proto_minor":14}"#;
        let report: Report = serde_json::from_str(line).unwrap();
        assert!(matches!(report, Report::Other));
    }
}
