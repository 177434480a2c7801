use image::{imageops, Rgb, RgbImage};

use crate::config::{Bounds, RenderConfig};
use crate::render::canvas::{palette, stripe_pattern, PlotArea, Region};
use crate::render::text::TextRenderer;
use crate::sync::{HistoryWindow, SampleView};
use crate::video::Frame;

/// Read-only inputs for one output frame
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    /// Resampled telemetry at the current output index
    pub sample: SampleView<'a>,

    /// Bounded trail of prior samples ending at the current one
    pub history: HistoryWindow<'a>,

    /// Decoded video frame, `None` once the video is exhausted
    pub video: Option<&'a Frame>,
}

/// Font and size scaling shared by every panel
#[derive(Clone)]
pub struct PanelEnv {
    pub text: TextRenderer,

    /// Output height relative to 1080p
    pub scale: f32,
}

impl PanelEnv {
    pub fn new(text: TextRenderer, output_height: u32) -> Self {
        Self { text, scale: (output_height as f32 / 1080.0).max(0.25) }
    }

    pub fn title_size(&self) -> f32 {
        17.0 * self.scale
    }

    pub fn label_size(&self) -> f32 {
        14.0 * self.scale
    }

    pub fn tick_size(&self) -> f32 {
        12.0 * self.scale
    }

    pub fn line_width(&self) -> u32 {
        (2.0 * self.scale).round().max(1.0) as u32
    }

    fn px(&self, base: f32) -> u32 {
        (base * self.scale).round() as u32
    }
}

/// A rendered panel image
pub struct PanelImage {
    pub image: RgbImage,

    /// Set when the panel had nothing to draw and shows a placeholder
    pub placeholder: bool,
}

/// One cell of the composite frame
///
/// Panels are pure: the image depends only on the context passed in, and a
/// fresh image is produced on every call.
pub trait Panel: Send + Sync {
    /// Returns the unique name of this panel
    fn name(&self) -> &str;

    /// Channels read from the resampled series
    fn channels(&self) -> Vec<&str>;

    /// Render the panel at `size` pixels
    fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), env: &PanelEnv) -> PanelImage;
}

/// Blank panel with a centred title; returns the area below the title
fn titled(size: (u32, u32), env: &PanelEnv, title: &str) -> (RgbImage, Region) {
    let (width, height) = size;
    let mut image = RgbImage::from_pixel(width, height, Rgb(palette::FIGURE));
    let top = env.px(8.0);
    env.text
        .draw_centered(&mut image, title, width as i32 / 2, top as i32, env.title_size(), palette::TEXT);
    let body = Region::new(0, 0, width, height).inset(0, top + env.px(26.0), 0, 0);
    (image, body)
}

/// Titled panel with an axes area and its labels
fn chart(size: (u32, u32), env: &PanelEnv, title: &str, x_label: &str, y_label: &str) -> (RgbImage, Region) {
    let (mut image, body) = titled(size, env, title);
    let area = body.inset(env.px(62.0), env.px(6.0), env.px(12.0), env.px(44.0));

    let label = env.label_size();
    let (cx, _) = area.center();
    env.text.draw_centered(
        &mut image,
        x_label,
        cx as i32,
        area.bottom() as i32 + env.px(22.0) as i32,
        label,
        palette::TEXT,
    );
    env.text
        .draw(&mut image, y_label, env.px(6.0) as i32, body.y as i32 - env.px(20.0) as i32, env.tick_size(), palette::TEXT);
    (image, area)
}

fn placeholder(size: (u32, u32), env: &PanelEnv, title: &str, message: &str) -> PanelImage {
    let (mut image, body) = titled(size, env, title);
    let area = body.inset(env.px(12.0), env.px(6.0), env.px(12.0), env.px(12.0));
    stripe_pattern(&mut image, area);

    let (cx, cy) = area.center();
    env.text
        .draw_centered(&mut image, message, cx as i32, cy as i32 - env.px(8.0) as i32, env.label_size(), palette::TEXT);
    PanelImage { image, placeholder: true }
}

fn missing_message(missing: &[&str]) -> String {
    format!("no data: {}", missing.join(", "))
}

/// Current video frame, scaled to fit and centred
pub struct VideoPanel;

impl Panel for VideoPanel {
    fn name(&self) -> &str {
        "video"
    }

    fn channels(&self) -> Vec<&str> {
        Vec::new()
    }

    fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), env: &PanelEnv) -> PanelImage {
        let title = format!("Flight video  t = {:.2} s", ctx.sample.elapsed_time());

        let Some(frame) = ctx.video else {
            return placeholder(size, env, &title, "video ended");
        };

        let (mut image, body) = titled(size, env, &title);
        let area = body.inset(env.px(4.0), 0, env.px(4.0), env.px(4.0));
        let fitted = frame.fit_within(area.width, area.height);
        let x = area.x + (area.width - fitted.width()) / 2;
        let y = area.y + (area.height - fitted.height()) / 2;
        imageops::overlay(&mut image, &fitted, x as i64, y as i64);

        PanelImage { image, placeholder: false }
    }
}

/// Horizontal position trail with fading history
pub struct TrailPanel {
    x_channel: String,
    y_channel: String,
    x_bounds: Bounds,
    y_bounds: Bounds,
}

impl TrailPanel {
    pub fn new(config: &RenderConfig) -> Self {
        let [x, y] = &config.channels.position;
        Self {
            x_channel: x.clone(),
            y_channel: y.clone(),
            x_bounds: config.bounds.position_x,
            y_bounds: config.bounds.position_y,
        }
    }
}

impl Panel for TrailPanel {
    fn name(&self) -> &str {
        "position"
    }

    fn channels(&self) -> Vec<&str> {
        vec![self.x_channel.as_str(), self.y_channel.as_str()]
    }

    fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), env: &PanelEnv) -> PanelImage {
        let title = "Position (X-Y plane)";
        let (xs, ys) = match (ctx.history.numbers(&self.x_channel), ctx.history.numbers(&self.y_channel)) {
            (Some(xs), Some(ys)) => (xs, ys),
            _ => {
                let missing: Vec<&str> = self
                    .channels()
                    .into_iter()
                    .filter(|c| !ctx.history.series().has_channel(c))
                    .collect();
                return placeholder(size, env, title, &missing_message(&missing));
            }
        };

        let (mut image, area) = chart(size, env, title, "X [m]", "Y [m]");
        let mut plot = PlotArea::new(&mut image, area, self.x_bounds, self.y_bounds);
        plot.draw_axes();
        plot.draw_tick_labels(&env.text, env.tick_size());

        // Older segments are fainter
        let len = xs.len();
        for k in 0..len.saturating_sub(1) {
            let alpha = (k + 1) as f32 / len as f32 * 0.7;
            plot.segment((xs[k], ys[k]), (xs[k + 1], ys[k + 1]), palette::TRAJECTORY, alpha, env.line_width());
        }

        if let (Some(x), Some(y)) = (ctx.sample.number(&self.x_channel), ctx.sample.number(&self.y_channel)) {
            plot.marker(x, y, env.px(6.0).max(2) as i32, palette::CURRENT, palette::TEXT);
        }
        plot.cross(0.0, 0.0, env.px(7.0).max(2) as i32, palette::TARGET);
        plot.legend(&[("Current", palette::CURRENT), ("Target", palette::TARGET)], &env.text, env.tick_size());

        PanelImage { image, placeholder: false }
    }
}

/// One line of a time-series panel
pub struct Trace {
    pub channel: String,
    pub label: String,
    pub color: [u8; 3],
}

impl Trace {
    pub fn new(channel: &str, label: &str, color: [u8; 3]) -> Self {
        Self { channel: channel.to_string(), label: label.to_string(), color }
    }
}

/// Several channels over a trailing time window ending at the current time
pub struct TimeSeriesPanel {
    name: String,
    title: String,
    y_label: String,
    traces: Vec<Trace>,
    bounds: Bounds,
    window_secs: f64,
    lead_secs: f64,
}

impl TimeSeriesPanel {
    pub fn new(name: &str, title: &str, y_label: &str, traces: Vec<Trace>, bounds: Bounds, window_secs: f64, lead_secs: f64) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            y_label: y_label.to_string(),
            traces,
            bounds,
            window_secs,
            lead_secs,
        }
    }

    /// Roll and pitch command angles
    pub fn command_angles(config: &RenderConfig) -> Self {
        let [roll, pitch] = &config.channels.command_angles;
        Self::new(
            "command_angles",
            "Command angles",
            "deg",
            vec![
                Trace::new(roll, "Roll", palette::TERM_P),
                Trace::new(pitch, "Pitch", palette::TERM_I),
            ],
            config.bounds.command_angle,
            config.plot_window_secs,
            config.plot_lead_secs,
        )
    }

    /// Controller P/I/D terms of one axis
    pub fn controller_terms(axis: &str, channels: &[String; 3], bounds: Bounds, config: &RenderConfig) -> Self {
        let [p, i, d] = channels;
        Self::new(
            &format!("pid_{}", axis.to_lowercase()),
            &format!("{}-axis controller terms", axis.to_uppercase()),
            "output",
            vec![
                Trace::new(p, "P", palette::TERM_P),
                Trace::new(i, "I", palette::TERM_I),
                Trace::new(d, "D", palette::TERM_D),
            ],
            bounds,
            config.plot_window_secs,
            config.plot_lead_secs,
        )
    }
}

impl Panel for TimeSeriesPanel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> Vec<&str> {
        self.traces.iter().map(|t| t.channel.as_str()).collect()
    }

    fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), env: &PanelEnv) -> PanelImage {
        let series = ctx.history.series();
        let missing: Vec<&str> = self.channels().into_iter().filter(|c| !series.has_channel(c)).collect();
        if !missing.is_empty() {
            return placeholder(size, env, &self.title, &missing_message(&missing));
        }

        let now = ctx.sample.elapsed_time();
        let window = series.trailing_secs(ctx.sample.index(), self.window_secs);
        let x_bounds = Bounds::new(now - self.window_secs, now + self.lead_secs);

        let (mut image, area) = chart(size, env, &self.title, "time [s]", &self.y_label);
        let mut plot = PlotArea::new(&mut image, area, x_bounds, self.bounds);
        plot.draw_axes();
        plot.draw_tick_labels(&env.text, env.tick_size());
        plot.dashed_hline(0.0, palette::GRID, 0.5);

        let times = window.times();
        for trace in &self.traces {
            let Some(values) = window.numbers(&trace.channel) else {
                continue;
            };
            let points: Vec<(f64, f64)> = times.iter().copied().zip(values).collect();
            plot.polyline(&points, trace.color, 0.9, env.line_width());
        }

        let legend: Vec<(&str, [u8; 3])> = self.traces.iter().map(|t| (t.label.as_str(), t.color)).collect();
        plot.legend(&legend, &env.text, env.tick_size());

        PanelImage { image, placeholder: false }
    }
}

/// Area plot of the detection count with the current value called out
pub struct DetectionPanel {
    channel: String,
    bounds: Bounds,
    window_secs: f64,
    lead_secs: f64,
}

impl DetectionPanel {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            channel: config.channels.detections.clone(),
            bounds: config.bounds.detections,
            window_secs: config.detection_window_secs,
            lead_secs: config.detection_lead_secs,
        }
    }
}

impl Panel for DetectionPanel {
    fn name(&self) -> &str {
        "detections"
    }

    fn channels(&self) -> Vec<&str> {
        vec![self.channel.as_str()]
    }

    fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), env: &PanelEnv) -> PanelImage {
        let title = "Detected markers";
        let series = ctx.history.series();
        let window = series.trailing_secs(ctx.sample.index(), self.window_secs);
        let (Some(values), Some(current)) = (window.numbers(&self.channel), ctx.sample.number(&self.channel)) else {
            return placeholder(size, env, title, &missing_message(&[self.channel.as_str()]));
        };

        let now = ctx.sample.elapsed_time();
        let x_bounds = Bounds::new(now - self.window_secs, now + self.lead_secs);

        let (mut image, area) = chart(size, env, title, "time [s]", "count");
        let mut plot = PlotArea::new(&mut image, area, x_bounds, self.bounds);
        plot.draw_axes();
        plot.draw_tick_labels(&env.text, env.tick_size());

        let points: Vec<(f64, f64)> = window.times().iter().copied().zip(values).collect();
        plot.fill_to_baseline(&points, 0.0, palette::DETECTION, 0.6);
        plot.polyline(&points, palette::DETECTION, 1.0, env.line_width());
        plot.dashed_vline(now, palette::ALERT, 0.7);

        let label_y = self.bounds.min + self.bounds.span() * 0.9;
        let label = format!("{}", current.round() as i64);
        plot.callout(now, label_y, &label, &env.text, env.title_size(), palette::ALERT);

        PanelImage { image, placeholder: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{plan, resample, Resampled};
    use crate::telemetry::{ChannelTable, TelemetryLoader};

    fn series(csv: &str) -> Resampled {
        let store = TelemetryLoader::new(ChannelTable::default())
            .load_from_reader(csv.as_bytes(), "test.csv")
            .unwrap();
        let plan = plan(store.duration(), 10.0, 1000, 10.0).unwrap();
        resample(&store, &plan).unwrap()
    }

    fn flight() -> Resampled {
        let mut csv = String::from("elapsed_time,timestamp,pos_x,pos_y,roll_ref_deg,pitch_ref_deg,marker_count\n");
        for i in 0..=20 {
            let t = i as f64 * 0.1;
            csv.push_str(&format!("{t},ts{i},{},{},1.0,-1.0,{}\n", t * 0.2, -t * 0.2, i % 4));
        }
        series(&csv)
    }

    fn env() -> PanelEnv {
        PanelEnv::new(TextRenderer::without_font(), 270)
    }

    fn count_color(image: &RgbImage, color: [u8; 3]) -> usize {
        image.pixels().filter(|p| p.0 == color).count()
    }

    #[test]
    fn test_trail_draws_current_marker() {
        let resampled = flight();
        let series = &resampled.series;
        let ctx = FrameContext {
            sample: series.sample(10).unwrap(),
            history: series.history(10, 100),
            video: None,
        };

        let panel = TrailPanel::new(&RenderConfig::default());
        let out = panel.render(&ctx, (300, 200), &env());
        assert!(!out.placeholder);
        assert_eq!(out.image.dimensions(), (300, 200));
        assert!(count_color(&out.image, palette::CURRENT) > 0);
        assert!(count_color(&out.image, palette::TARGET) > 0);
    }

    #[test]
    fn test_missing_channel_renders_placeholder() {
        let resampled = flight();
        let series = &resampled.series;
        let ctx = FrameContext {
            sample: series.sample(5).unwrap(),
            history: series.history(5, 100),
            video: None,
        };

        let config = RenderConfig::default();
        let pid = TimeSeriesPanel::controller_terms("x", &config.channels.pid_x, config.bounds.pid_x, &config);
        let out = pid.render(&ctx, (300, 200), &env());
        assert!(out.placeholder);
        assert_eq!(out.image.dimensions(), (300, 200));

        let angles = TimeSeriesPanel::command_angles(&config).render(&ctx, (300, 200), &env());
        assert!(!angles.placeholder);
    }

    #[test]
    fn test_video_panel_shows_frame() {
        let resampled = flight();
        let series = &resampled.series;
        let frame = Frame::new_filled(64, 48, [10, 200, 30]);
        let with_video = FrameContext {
            sample: series.sample(0).unwrap(),
            history: series.history(0, 100),
            video: Some(&frame),
        };

        let out = VideoPanel.render(&with_video, (200, 200), &env());
        assert!(!out.placeholder);
        assert_eq!(out.image.get_pixel(100, 110).0, [10, 200, 30]);

        let without = FrameContext { video: None, ..with_video };
        let out = VideoPanel.render(&without, (200, 200), &env());
        assert!(out.placeholder);
        assert_eq!(count_color(&out.image, [10, 200, 30]), 0);
    }

    #[test]
    fn test_detection_callout_and_fill() {
        let resampled = flight();
        let series = &resampled.series;
        let ctx = FrameContext {
            sample: series.sample(19).unwrap(),
            history: series.history(19, 100),
            video: None,
        };

        let out = DetectionPanel::new(&RenderConfig::default()).render(&ctx, (400, 200), &env());
        assert!(!out.placeholder);
        assert!(count_color(&out.image, palette::DETECTION) > 0);
        // Bitmap digits are drawn in white inside the callout
        assert!(count_color(&out.image, palette::TEXT) > 0);
    }

    #[test]
    fn test_render_is_pure() {
        let resampled = flight();
        let series = &resampled.series;
        let panel = TimeSeriesPanel::command_angles(&RenderConfig::default());
        let ctx = |i: usize| FrameContext {
            sample: series.sample(i).unwrap(),
            history: series.history(i, 100),
            video: None,
        };

        let first = panel.render(&ctx(15), (300, 200), &env()).image;
        panel.render(&ctx(3), (300, 200), &env());
        let again = panel.render(&ctx(15), (300, 200), &env()).image;
        assert_eq!(first, again);
    }
}
