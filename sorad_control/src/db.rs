//! Measurement persistence.
//!
//! One SQLite table, one row per TriggerRecord — full measurements and
//! metadata-only heartbeats land in the same place, distinguished by a NULL
//! `spectra` column. The layout is deliberately flat; downstream processing
//! reads rows, it does not join.

use rusqlite::Connection;
use sorad_common::config::DatabaseConfig;
use sorad_common::error::InitError;
use sorad_common::types::TriggerRecord;
use tracing::{debug, info};

/// Open persistence connection.
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Open (creating if necessary) the database at the configured path.
    pub fn open(config: &DatabaseConfig) -> Result<Self, InitError> {
        let conn = Connection::open(&config.path)
            .map_err(|e| InitError::Persistence(format!("open {:?}: {e}", config.path)))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sorad_records (
                id INTEGER PRIMARY KEY,
                trigger_id TEXT NOT NULL UNIQUE,
                gps1_lat REAL NOT NULL,
                gps1_lon REAL NOT NULL,
                gps1_alt REAL NOT NULL,
                gps1_speed REAL NOT NULL,
                gps1_satellites INTEGER NOT NULL,
                gps1_time TEXT NOT NULL,
                gps2_lat REAL NOT NULL,
                gps2_lon REAL NOT NULL,
                gps2_alt REAL NOT NULL,
                gps2_speed REAL NOT NULL,
                gps2_satellites INTEGER NOT NULL,
                gps2_time TEXT NOT NULL,
                bearing_deg REAL,
                solar_azimuth_deg REAL,
                solar_elevation_deg REAL,
                n_channels INTEGER NOT NULL,
                spectra TEXT
            )",
            [],
        )
        .map_err(|e| InitError::Persistence(format!("create table: {e}")))?;

        info!("Persistence open at {:?}", config.path);
        Ok(Self { conn })
    }

    /// Persist one record, returning its row id.
    ///
    /// `verbosity` mirrors the CLI flag; at 4 the committed row is echoed
    /// to the debug log.
    pub fn commit(&mut self, verbosity: u8, record: &TriggerRecord) -> Result<i64, rusqlite::Error> {
        let spectra_text = record.samples.as_ref().map(|samples| encode_spectra(samples));
        let n_channels = record.samples.as_ref().map_or(0, |s| s.len());

        self.conn.execute(
            "INSERT INTO sorad_records (
                trigger_id,
                gps1_lat, gps1_lon, gps1_alt, gps1_speed, gps1_satellites, gps1_time,
                gps2_lat, gps2_lon, gps2_alt, gps2_speed, gps2_satellites, gps2_time,
                bearing_deg, solar_azimuth_deg, solar_elevation_deg,
                n_channels, spectra
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            rusqlite::params![
                record.trigger_id.to_string(),
                record.gps1.lat,
                record.gps1.lon,
                record.gps1.alt,
                record.gps1.speed,
                record.gps1.satellites,
                record.gps1.timestamp.to_rfc3339(),
                record.gps2.lat,
                record.gps2.lon,
                record.gps2.alt,
                record.gps2.speed,
                record.gps2.satellites,
                record.gps2.timestamp.to_rfc3339(),
                record.bearing_deg,
                record.solar_azimuth_deg,
                record.solar_elevation_deg,
                n_channels,
                spectra_text,
            ],
        )?;

        let row_id = self.conn.last_insert_rowid();
        if verbosity >= 4 {
            debug!("Committed record {row_id} for {}", record.trigger_id);
        }
        Ok(row_id)
    }

    /// Number of persisted records (test and diagnostics helper).
    pub fn record_count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sorad_records", [], |row| row.get(0))
    }

    /// Close the connection. Errors are reported, not raised — teardown
    /// must go on regardless.
    pub fn close(self) {
        if let Err((_conn, e)) = self.conn.close() {
            tracing::warn!("Persistence close failed: {e}");
        }
    }
}

/// One line per channel: `channel_id,integration_ms,c0 c1 c2 ...`.
fn encode_spectra(samples: &[sorad_common::types::ChannelSample]) -> String {
    samples
        .iter()
        .map(|s| {
            let counts = s
                .spectrum
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            format!("{},{},{}", s.channel_id, s.integration_time_ms, counts)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
