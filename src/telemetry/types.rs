use serde::{Deserialize, Serialize};

/// Required column holding seconds since log start
pub const ELAPSED_TIME: &str = "elapsed_time";

/// Required column holding the wall-clock label
pub const TIMESTAMP: &str = "timestamp";

/// Interpolation policy of a channel, fixed by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Real-valued, linearly interpolated
    Continuous,
    /// Integer-valued, linearly interpolated then rounded
    DiscreteCount,
    /// Never blended, takes the nearest preceding value
    Categorical,
}

/// Name-based classification of telemetry columns
///
/// Entries are exact column names, or suffix patterns written with a leading
/// `*` (`*_count` matches `marker_count` and `blob_count`). A name listed as
/// categorical wins over a discrete match. Anything unlisted is continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTable {
    pub discrete: Vec<String>,
    pub categorical: Vec<String>,
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self {
            discrete: vec![
                "frame_number".into(),
                "marker_count".into(),
                "send_success".into(),
                "control_active".into(),
                "*_count".into(),
            ],
            categorical: vec![TIMESTAMP.into()],
        }
    }
}

impl ChannelTable {
    /// Resolve the kind of a column by name
    pub fn classify(&self, name: &str) -> ChannelKind {
        if Self::matches_any(&self.categorical, name) {
            ChannelKind::Categorical
        } else if Self::matches_any(&self.discrete, name) {
            ChannelKind::DiscreteCount
        } else {
            ChannelKind::Continuous
        }
    }

    fn matches_any(patterns: &[String], name: &str) -> bool {
        patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => name.ends_with(suffix),
            None => pattern == name,
        })
    }
}

/// One telemetry column as read from the log, classified but not yet coerced
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub cells: Vec<String>,
}

/// A single source row, borrowed from the store
#[derive(Debug, Clone, Copy)]
pub struct TelemetrySample<'a> {
    pub elapsed_time: f64,
    pub timestamp: &'a str,
    store: &'a TimeSeriesStore,
    row: usize,
}

impl<'a> TelemetrySample<'a> {
    /// Raw cell of a channel in this row
    pub fn value(&self, channel: &str) -> Option<&'a str> {
        self.store
            .channel(channel)
            .map(|c| c.cells[self.row].as_str())
    }
}

/// The telemetry log held in column order
///
/// Rows are ordered by `elapsed_time`, which never decreases. Exact duplicate
/// times are kept as they appear; lookups resolve a tie to the last row with
/// that time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesStore {
    elapsed: Vec<f64>,
    timestamps: Vec<String>,
    channels: Vec<RawChannel>,
}

impl TimeSeriesStore {
    /// Build a store from parsed columns. The caller guarantees equal lengths
    /// and non-decreasing `elapsed`.
    pub(crate) fn from_columns(
        elapsed: Vec<f64>,
        timestamps: Vec<String>,
        channels: Vec<RawChannel>,
    ) -> Self {
        debug_assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
        debug_assert_eq!(elapsed.len(), timestamps.len());
        Self { elapsed, timestamps, channels }
    }

    pub fn len(&self) -> usize {
        self.elapsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed.is_empty()
    }

    pub fn elapsed(&self) -> &[f64] {
        &self.elapsed
    }

    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    pub fn channels(&self) -> &[RawChannel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&RawChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Elapsed time of the last row, which is the log duration since the
    /// log starts at zero
    pub fn duration(&self) -> f64 {
        self.elapsed.last().copied().unwrap_or(0.0)
    }

    pub fn sample(&self, row: usize) -> Option<TelemetrySample<'_>> {
        let elapsed_time = *self.elapsed.get(row)?;
        Some(TelemetrySample {
            elapsed_time,
            timestamp: &self.timestamps[row],
            store: self,
            row,
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = TelemetrySample<'_>> {
        (0..self.len()).filter_map(move |row| self.sample(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let table = ChannelTable::default();
        assert_eq!(table.classify("pos_x"), ChannelKind::Continuous);
        assert_eq!(table.classify("pid_y_d"), ChannelKind::Continuous);
        assert_eq!(table.classify("marker_count"), ChannelKind::DiscreteCount);
        assert_eq!(table.classify("control_active"), ChannelKind::DiscreteCount);
        assert_eq!(table.classify("blob_count"), ChannelKind::DiscreteCount);
        assert_eq!(table.classify("timestamp"), ChannelKind::Categorical);
    }

    #[test]
    fn test_categorical_wins_over_suffix() {
        let table = ChannelTable {
            discrete: vec!["*_id".into()],
            categorical: vec!["session_id".into()],
        };
        assert_eq!(table.classify("session_id"), ChannelKind::Categorical);
        assert_eq!(table.classify("frame_id"), ChannelKind::DiscreteCount);
    }

    #[test]
    fn test_sample_access() {
        let store = TimeSeriesStore::from_columns(
            vec![0.0, 0.5],
            vec!["t0".into(), "t1".into()],
            vec![RawChannel {
                name: "pos_x".into(),
                kind: ChannelKind::Continuous,
                cells: vec!["1.0".into(), "2.0".into()],
            }],
        );

        let sample = store.sample(1).unwrap();
        assert_eq!(sample.elapsed_time, 0.5);
        assert_eq!(sample.timestamp, "t1");
        assert_eq!(sample.value("pos_x"), Some("2.0"));
        assert_eq!(sample.value("pos_y"), None);
        assert!(store.sample(2).is_none());
        assert_eq!(store.duration(), 0.5);
        assert_eq!(store.samples().count(), 2);
    }
}
