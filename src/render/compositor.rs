use std::ops::Range;

use image::{imageops, Rgb, RgbImage};
use rayon::prelude::*;

use crate::config::RenderConfig;
use crate::render::canvas::{palette, Region};
use crate::render::panels::{
    DetectionPanel, FrameContext, Panel, PanelEnv, TimeSeriesPanel, TrailPanel, VideoPanel,
};
use crate::render::text::TextRenderer;
use crate::sync::{HistoryWindow, ResampledSeries, SampleView};
use crate::video::Frame;

/// Proportional grid of panel cells, in figure-relative coordinates
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub width_ratios: Vec<f64>,
    pub height_ratios: Vec<f64>,
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,

    /// Horizontal gap as a fraction of the mean column width
    pub wspace: f64,

    /// Vertical gap as a fraction of the mean row height
    pub hspace: f64,
}

impl GridSpec {
    /// 3x3 layout with a wider first column
    pub fn flight_layout() -> Self {
        Self {
            width_ratios: vec![1.2, 1.0, 1.0],
            height_ratios: vec![1.0, 1.0, 1.0],
            left: 0.05,
            right: 0.98,
            top: 0.95,
            bottom: 0.05,
            wspace: 0.15,
            hspace: 0.25,
        }
    }

    /// Offsets and lengths of each track along one axis, plus the gap
    fn tracks(ratios: &[f64], start: f64, extent: f64, space: f64) -> (Vec<(f64, f64)>, f64) {
        let n = ratios.len().max(1) as f64;
        let mean_ratio = ratios.iter().sum::<f64>() / n;
        let mean = extent / (n + space * (n - 1.0));
        let gap = space * mean;

        let mut offset = start;
        let tracks = ratios
            .iter()
            .map(|r| {
                let length = r / mean_ratio * mean;
                let track = (offset, length);
                offset += length + gap;
                track
            })
            .collect();
        (tracks, gap)
    }

    /// Pixel region spanning `rows` x `cols`, widened by half a gap on each
    /// side so titles and tick labels fit around the axes
    pub fn cell(&self, rows: Range<usize>, cols: Range<usize>, size: (u32, u32)) -> Region {
        let (width, height) = (size.0 as f64, size.1 as f64);
        let (xs, wgap) = Self::tracks(&self.width_ratios, self.left * width, (self.right - self.left) * width, self.wspace);
        let (ys, hgap) = Self::tracks(&self.height_ratios, (1.0 - self.top) * height, (self.top - self.bottom) * height, self.hspace);

        let last_col = cols.end.saturating_sub(1).min(xs.len() - 1);
        let last_row = rows.end.saturating_sub(1).min(ys.len() - 1);
        let x0 = (xs[cols.start.min(last_col)].0 - wgap / 2.0).max(0.0);
        let x1 = (xs[last_col].0 + xs[last_col].1 + wgap / 2.0).min(width);
        let y0 = (ys[rows.start.min(last_row)].0 - hgap / 2.0).max(0.0);
        let y1 = (ys[last_row].0 + ys[last_row].1 + hgap / 2.0).min(height);

        let x = x0.round() as u32;
        let y = y0.round() as u32;
        Region::new(x, y, (x1.round() as u32).saturating_sub(x).max(1), (y1.round() as u32).saturating_sub(y).max(1))
    }
}

fn slot(region: Region, panel: impl Panel + 'static) -> (Region, Box<dyn Panel>) {
    (region, Box::new(panel))
}

/// One rendered output frame
pub struct RenderedFrame {
    pub index: usize,
    pub frame: Frame,

    /// Panels that drew a placeholder instead of data
    pub placeholders: Vec<String>,
}

/// Composes the six panels into one output frame per index
///
/// Every call starts from a blank canvas; nothing is carried between frames.
pub struct FrameCompositor {
    size: (u32, u32),
    trail_length: usize,
    env: PanelEnv,
    slots: Vec<(Region, Box<dyn Panel>)>,
}

impl FrameCompositor {
    pub fn new(config: &RenderConfig, size: (u32, u32), text: TextRenderer) -> Self {
        let grid = GridSpec::flight_layout();
        let cell = |rows: Range<usize>, cols: Range<usize>| grid.cell(rows, cols, size);
        let b = &config.bounds;
        let c = &config.channels;

        let slots = vec![
            slot(cell(0..2, 0..1), VideoPanel),
            slot(cell(0..1, 1..3), TrailPanel::new(config)),
            slot(cell(1..2, 1..2), TimeSeriesPanel::command_angles(config)),
            slot(cell(1..2, 2..3), TimeSeriesPanel::controller_terms("x", &c.pid_x, b.pid_x, config)),
            slot(cell(2..3, 0..1), TimeSeriesPanel::controller_terms("y", &c.pid_y, b.pid_y, config)),
            slot(cell(2..3, 1..3), DetectionPanel::new(config)),
        ];

        Self {
            size,
            trail_length: config.trail_length,
            env: PanelEnv::new(text, size.1),
            slots,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Samples of history handed to the panels
    pub fn trail_length(&self) -> usize {
        self.trail_length
    }

    pub fn panels(&self) -> impl Iterator<Item = (&Region, &dyn Panel)> {
        self.slots.iter().map(|(region, panel)| (region, panel.as_ref()))
    }

    /// Channels some panel reads that the series does not carry
    pub fn missing_channels(&self, series: &ResampledSeries) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for channel in self.slots.iter().flat_map(|(_, panel)| panel.channels()) {
            if !series.has_channel(channel) && !missing.iter().any(|m| m == channel) {
                missing.push(channel.to_string());
            }
        }
        missing
    }

    /// Render one frame from the current sample, its trail and the video frame
    pub fn compose(&self, sample: SampleView<'_>, history: HistoryWindow<'_>, video: Option<&Frame>) -> RenderedFrame {
        let ctx = FrameContext { sample, history, video };

        let rendered: Vec<_> = self
            .slots
            .par_iter()
            .map(|(region, panel)| (region, panel.name(), panel.render(&ctx, (region.width, region.height), &self.env)))
            .collect();

        let (width, height) = self.size;
        let mut canvas = RgbImage::from_pixel(width, height, Rgb(palette::FIGURE));
        let mut placeholders = Vec::new();
        for (region, name, panel) in rendered {
            imageops::overlay(&mut canvas, &panel.image, region.x as i64, region.y as i64);
            if panel.placeholder {
                placeholders.push(name.to_string());
            }
        }

        RenderedFrame {
            index: sample.index(),
            frame: Frame::new(canvas),
            placeholders,
        }
    }

    /// Render output index `index` of `series`; `None` past the end
    pub fn compose_at(&self, series: &ResampledSeries, index: usize, video: Option<&Frame>) -> Option<RenderedFrame> {
        let sample = series.sample(index)?;
        Some(self.compose(sample, series.history(index, self.trail_length), video))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{plan, resample, Resampled};
    use crate::telemetry::TelemetryLoader;

    fn flight(with_pid: bool) -> Resampled {
        let mut csv = String::from("elapsed_time,timestamp,pos_x,pos_y,roll_ref_deg,pitch_ref_deg,marker_count");
        if with_pid {
            csv.push_str(",pid_x_p,pid_x_i,pid_x_d,pid_y_p,pid_y_i,pid_y_d");
        }
        csv.push('\n');
        for i in 0..=30 {
            let t = i as f64 / 10.0;
            csv.push_str(&format!("{t},ts{i},{},{},0.5,-0.5,{}", t / 4.0, t / 5.0, i % 3));
            if with_pid {
                csv.push_str(",0.01,0.02,-0.01,0.0,0.03,0.05");
            }
            csv.push('\n');
        }
        let store = TelemetryLoader::default().load_from_reader(csv.as_bytes(), "flight.csv").unwrap();
        let plan = plan(store.duration(), 10.0, 500, 10.0).unwrap();
        resample(&store, &plan).unwrap()
    }

    fn compositor() -> FrameCompositor {
        FrameCompositor::new(&RenderConfig::default(), (480, 270), TextRenderer::without_font())
    }

    #[test]
    fn test_grid_cells() {
        let grid = GridSpec::flight_layout();
        let video = grid.cell(0..2, 0..1, (1920, 1080));
        let trail = grid.cell(0..1, 1..3, (1920, 1080));
        let angles = grid.cell(1..2, 1..2, (1920, 1080));

        // Wider first column; spanning cells cover their tracks
        assert!(video.width > angles.width);
        assert!(video.height > 2 * angles.height - angles.height / 2);
        assert!(trail.width > 2 * angles.width - angles.width / 2);
        assert_eq!(trail.x, angles.x);
        assert!(trail.bottom() <= angles.y + 1);
        assert!(trail.right() <= 1920 && video.bottom() <= 1080);
    }

    #[test]
    fn test_compose_size_and_panels() {
        let resampled = flight(true);
        let compositor = compositor();
        assert_eq!(compositor.panels().count(), 6);
        assert!(compositor.missing_channels(&resampled.series).is_empty());

        let video = Frame::new_filled(160, 120, [0, 0, 255]);
        let rendered = compositor.compose_at(&resampled.series, 12, Some(&video)).unwrap();
        assert_eq!(rendered.index, 12);
        assert_eq!(rendered.frame.dimensions(), (480, 270));
        assert!(rendered.placeholders.is_empty());
        assert!(rendered.frame.as_rgb_bytes().chunks(3).any(|p| p == [0, 0, 255]));
    }

    #[test]
    fn test_missing_channels_only_affect_their_panels() {
        let resampled = flight(false);
        let compositor = compositor();
        assert_eq!(compositor.missing_channels(&resampled.series).len(), 6);

        let rendered = compositor.compose_at(&resampled.series, 5, None).unwrap();
        assert_eq!(rendered.placeholders, vec!["video", "pid_x", "pid_y"]);
        assert_eq!(rendered.frame.dimensions(), (480, 270));
    }

    #[test]
    fn test_compose_has_no_carry_over() {
        let resampled = flight(true);
        let compositor = compositor();
        let video = Frame::new_filled(160, 120, [200, 0, 200]);

        let first = compositor.compose_at(&resampled.series, 20, None).unwrap();
        compositor.compose_at(&resampled.series, 3, Some(&video)).unwrap();
        let again = compositor.compose_at(&resampled.series, 20, None).unwrap();
        assert_eq!(first.frame, again.frame);
        assert!(compositor.compose_at(&resampled.series, 30, None).is_none());
    }
}
