use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{ResampleError, Result, Warning};
use crate::sync::planner::SyncPlan;
use crate::telemetry::{ChannelKind, RawChannel, TimeSeriesStore, TIMESTAMP};

/// Resampled values of one channel, one entry per output frame
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValues {
    Continuous(Vec<f64>),
    Count(Vec<i64>),
    Categorical(Vec<String>),
}

impl ChannelValues {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Continuous(_) => ChannelKind::Continuous,
            Self::Count(_) => ChannelKind::DiscreteCount,
            Self::Categorical(_) => ChannelKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(v) => v.len(),
            Self::Count(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResampledChannel {
    pub name: String,
    pub values: ChannelValues,
}

/// A single value read from a resampled row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue<'a> {
    Continuous(f64),
    Count(i64),
    Categorical(&'a str),
}

/// The telemetry log on the output frame grid
///
/// Built once before rendering and read-only afterwards. Row `i` sits at
/// exactly `i / output_frame_rate` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    times: Vec<f64>,
    channels: Vec<ResampledChannel>,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn channels(&self) -> &[ResampledChannel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&ResampledChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    /// Row `index`, or `None` past the end
    pub fn sample(&self, index: usize) -> Option<SampleView<'_>> {
        (index < self.len()).then_some(SampleView { series: self, index })
    }

    /// Trail ending at `index`: rows `max(0, index - length)..=index`
    pub fn history(&self, index: usize, length: usize) -> HistoryWindow<'_> {
        let end = index.min(self.len().saturating_sub(1));
        HistoryWindow {
            series: self,
            start: end.saturating_sub(length),
            end,
        }
    }

    /// Rows whose time lies within `secs` before row `index`, inclusive
    pub fn trailing_secs(&self, index: usize, secs: f64) -> HistoryWindow<'_> {
        let end = index.min(self.len().saturating_sub(1));
        let from = self.times.get(end).copied().unwrap_or(0.0) - secs;
        let start = self.times[..end].partition_point(|&t| t < from);
        HistoryWindow {
            series: self,
            start,
            end,
        }
    }
}

/// Borrowed view of one resampled row
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    series: &'a ResampledSeries,
    index: usize,
}

impl<'a> SampleView<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Output time of this row
    pub fn elapsed_time(&self) -> f64 {
        self.series.times[self.index]
    }

    pub fn value(&self, channel: &str) -> Option<SampleValue<'a>> {
        let index = self.index;
        self.series.channel(channel).map(|c| match &c.values {
            ChannelValues::Continuous(v) => SampleValue::Continuous(v[index]),
            ChannelValues::Count(v) => SampleValue::Count(v[index]),
            ChannelValues::Categorical(v) => SampleValue::Categorical(v[index].as_str()),
        })
    }

    /// Numeric value of a continuous or count channel
    pub fn number(&self, channel: &str) -> Option<f64> {
        match self.value(channel)? {
            SampleValue::Continuous(v) => Some(v),
            SampleValue::Count(v) => Some(v as f64),
            SampleValue::Categorical(_) => None,
        }
    }


    pub fn text(&self, channel: &str) -> Option<&'a str> {
        match self.value(channel)? {
            SampleValue::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

/// Contiguous trailing slice of the resampled series
///
/// A view into the shared series; nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    series: &'a ResampledSeries,
    start: usize,
    end: usize,
}

impl<'a> HistoryWindow<'a> {
    /// Number of rows, including the current one
    pub fn len(&self) -> usize {
        if self.series.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First row index
    pub fn start(&self) -> usize {
        self.start
    }

    /// Current (last) row index
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn series(&self) -> &'a ResampledSeries {
        self.series
    }

    pub fn times(&self) -> &'a [f64] {
        self.slice(&self.series.times)
    }

    pub fn continuous(&self, channel: &str) -> Option<&'a [f64]> {
        match &self.series.channel(channel)?.values {
            ChannelValues::Continuous(v) => Some(self.slice(v)),
            _ => None,
        }
    }

    pub fn counts(&self, channel: &str) -> Option<&'a [i64]> {
        match &self.series.channel(channel)?.values {
            ChannelValues::Count(v) => Some(self.slice(v)),
            _ => None,
        }
    }

    /// Values of a continuous or count channel as floats
    pub fn numbers(&self, channel: &str) -> Option<Vec<f64>> {
        match &self.series.channel(channel)?.values {
            ChannelValues::Continuous(v) => Some(self.slice(v).to_vec()),
            ChannelValues::Count(v) => Some(self.slice(v).iter().map(|&c| c as f64).collect()),
            ChannelValues::Categorical(_) => None,
        }
    }

    fn slice<T>(&self, values: &'a [T]) -> &'a [T] {
        if values.is_empty() {
            values
        } else {
            &values[self.start..=self.end]
        }
    }
}

/// Output of a resampling pass
#[derive(Debug, Clone, PartialEq)]
pub struct Resampled {
    pub series: ResampledSeries,
    /// Channels dropped because they could not be coerced to their kind
    pub warnings: Vec<Warning>,
}

/// Resample the telemetry log onto the plan's output grid
///
/// Continuous channels are interpolated linearly between the bracketing rows,
/// count channels are interpolated then rounded half-to-even, categorical
/// channels take the value of the last row at or before the target time (the
/// first row before the log starts). Outside the log, numeric channels hold
/// the end value.
///
/// When several rows share the same `elapsed_time`, the last of them is the
/// one used at and after that time.
///
/// A channel whose cells do not parse as numbers is dropped with a
/// [`Warning::ChannelCoercion`]; the remaining channels are unaffected. The
/// result depends only on the inputs.
pub fn resample(store: &TimeSeriesStore, plan: &SyncPlan) -> Result<Resampled> {
    let rate = plan.output_frame_rate;
    let count = plan.output_frame_count;
    let times: Vec<f64> = (0..count).map(|i| i as f64 / rate).collect();

    let last = store.duration();
    if let Some(&target) = times.last() {
        if target > last + 1.0 / rate {
            return Err(ResampleError::OutOfRange { target, last }.into());
        }
    }

    // Rows at or before each target time
    let elapsed = store.elapsed();
    let positions: Vec<usize> = times
        .iter()
        .map(|&t| elapsed.partition_point(|&x| x <= t))
        .collect();

    let timestamp_channel = ResampledChannel {
        name: TIMESTAMP.to_string(),
        values: ChannelValues::Categorical(predecessors(store.timestamps(), &positions)),
    };

    let outcomes: Vec<std::result::Result<ResampledChannel, Warning>> = store
        .channels()
        .par_iter()
        .map(|channel| resample_channel(channel, elapsed, &times, &positions))
        .collect();

    let mut channels = vec![timestamp_channel];
    let mut warnings = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(channel) => channels.push(channel),
            Err(warning) => {
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    debug!(
        "Resampled {} rows onto {} output frames at {:.2}fps",
        store.len(),
        count,
        rate
    );
    info!(
        "Resampled {} channels ({} dropped)",
        channels.len(),
        warnings.len()
    );

    Ok(Resampled {
        series: ResampledSeries {
            times,
            channels,
        },
        warnings,
    })
}

fn resample_channel(
    channel: &RawChannel,
    elapsed: &[f64],
    times: &[f64],
    positions: &[usize],
) -> std::result::Result<ResampledChannel, Warning> {
    let values = match channel.kind {
        ChannelKind::Categorical => {
            ChannelValues::Categorical(predecessors(&channel.cells, positions))
        }
        ChannelKind::Continuous => {
            let source = coerce(channel, false)?;
            ChannelValues::Continuous(interpolate(elapsed, &source, times, positions))
        }
        ChannelKind::DiscreteCount => {
            let source = coerce(channel, true)?;
            ChannelValues::Count(
                interpolate(elapsed, &source, times, positions)
                    .into_iter()
                    .map(|v| v.round_ties_even() as i64)
                    .collect(),
            )
        }
    };

    Ok(ResampledChannel {
        name: channel.name.clone(),
        values,
    })
}

/// Parse every cell of a numeric channel
///
/// Blank cells read as NaN unless the channel is a count, which must be
/// finite throughout.
fn coerce(channel: &RawChannel, finite: bool) -> std::result::Result<Vec<f64>, Warning> {
    channel
        .cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            let parsed = match cell.trim() {
                "" if !finite => Some(f64::NAN),
                text => text.parse::<f64>().ok(),
            };
            parsed
                .filter(|v| !finite || v.is_finite())
                .ok_or_else(|| Warning::ChannelCoercion {
                    channel: channel.name.clone(),
                    row,
                    value: cell.clone(),
                })
        })
        .collect()
}

fn interpolate(elapsed: &[f64], values: &[f64], times: &[f64], positions: &[usize]) -> Vec<f64> {
    let n = elapsed.len();
    times
        .iter()
        .zip(positions)
        .map(|(&t, &k)| {
            if k == 0 {
                values[0]
            } else if k == n {
                values[n - 1]
            } else {
                // elapsed[k - 1] <= t < elapsed[k], so the bracket has width
                let (t0, t1) = (elapsed[k - 1], elapsed[k]);
                let (v0, v1) = (values[k - 1], values[k]);
                v0 + (v1 - v0) * (t - t0) / (t1 - t0)
            }
        })
        .collect()
}

fn predecessors(cells: &[String], positions: &[usize]) -> Vec<String> {
    positions
        .iter()
        .map(|&k| cells[k.saturating_sub(1)].clone())
        .collect()
}
