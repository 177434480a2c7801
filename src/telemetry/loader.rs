use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::telemetry::types::{
    ChannelKind, ChannelTable, RawChannel, TimeSeriesStore, ELAPSED_TIME, TIMESTAMP,
};

/// Loader for CSV telemetry logs
///
/// Expected format: a header row containing at least `elapsed_time` and
/// `timestamp`, followed by one row per sample. Every other column becomes a
/// channel classified by the [`ChannelTable`]. Channel cells are kept as text;
/// numeric coercion happens during resampling so that a bad column only drops
/// that column.
pub struct TelemetryLoader {
    table: ChannelTable,
}

impl TelemetryLoader {
    pub fn new(table: ChannelTable) -> Self {
        Self { table }
    }

    /// Load a telemetry log from disk
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<TimeSeriesStore> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| TelemetryError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let store = self.load_from_reader(file, &path.display().to_string())?;
        info!(
            "Loaded telemetry log {:?}: {} samples, {} channels, {:.2}s",
            path,
            store.len(),
            store.channels().len(),
            store.duration()
        );
        Ok(store)
    }

    /// Load a telemetry log from any reader; `source` names it in errors
    pub fn load_from_reader<R: Read>(&self, reader: R, source: &str) -> Result<TimeSeriesStore> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| TelemetryError::ParseFailed {
                path: source.to_string(),
                reason: e.to_string(),
            })?
            .clone();

        let column_index = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| TelemetryError::MissingColumn { column: name.to_string() })
        };
        let elapsed_col = column_index(ELAPSED_TIME)?;
        let timestamp_col = column_index(TIMESTAMP)?;

        let mut channels: Vec<(usize, RawChannel)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != elapsed_col && *i != timestamp_col)
            .map(|(i, name)| {
                let kind = self.table.classify(name);
                debug!("Channel '{}' classified as {:?}", name, kind);
                (
                    i,
                    RawChannel {
                        name: name.to_string(),
                        kind,
                        cells: Vec::new(),
                    },
                )
            })
            .collect();

        let mut elapsed = Vec::new();
        let mut timestamps = Vec::new();

        for (record_number, result) in reader.records().enumerate() {
            // +1 for header, +1 for 1-based line numbers
            let row = record_number + 2;
            let record = result.map_err(|e| TelemetryError::ParseFailed {
                path: source.to_string(),
                reason: format!("line {}: {}", row, e),
            })?;

            let raw_time = &record[elapsed_col];
            let time: f64 = raw_time
                .parse()
                .ok()
                .filter(|t: &f64| t.is_finite())
                .ok_or_else(|| TelemetryError::InvalidElapsedTime {
                    row,
                    value: raw_time.to_string(),
                })?;

            if let Some(&previous) = elapsed.last() {
                if time < previous {
                    return Err(TelemetryError::NonMonotonic {
                        row,
                        previous,
                        current: time,
                    }
                    .into());
                }
            }

            elapsed.push(time);
            timestamps.push(record[timestamp_col].to_string());
            for (i, channel) in channels.iter_mut() {
                channel.cells.push(record[*i].to_string());
            }
        }

        if elapsed.is_empty() {
            return Err(TelemetryError::Empty.into());
        }

        let duplicates = elapsed.windows(2).filter(|w| w[0] == w[1]).count();
        if duplicates > 0 {
            debug!("{} duplicate elapsed_time values; ties resolve to the last row", duplicates);
        }

        let channels = channels.into_iter().map(|(_, c)| c).collect();
        Ok(TimeSeriesStore::from_columns(elapsed, timestamps, channels))
    }
}

impl Default for TelemetryLoader {
    fn default() -> Self {
        Self::new(ChannelTable::default())
    }
}

/// Count channels per kind, used for load summaries
pub fn kind_summary(store: &TimeSeriesStore) -> (usize, usize, usize) {
    store.channels().iter().fold((0, 0, 0), |(c, d, k), ch| match ch.kind {
        ChannelKind::Continuous => (c + 1, d, k),
        ChannelKind::DiscreteCount => (c, d + 1, k),
        ChannelKind::Categorical => (c, d, k + 1),
    })
}
