use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, BresenhamLineIter};

use crate::config::Bounds;
use crate::render::text::TextRenderer;

/// Dark theme colours
pub mod palette {
    pub const FIGURE: [u8; 3] = [0x1e, 0x1e, 0x1e];
    pub const AXES: [u8; 3] = [0x2e, 0x2e, 0x2e];
    pub const GRID: [u8; 3] = [0x80, 0x80, 0x80];
    pub const TEXT: [u8; 3] = [0xff, 0xff, 0xff];
    pub const PLACEHOLDER: [u8; 3] = [0x40, 0x40, 0x40];

    pub const TRAJECTORY: [u8; 3] = [0x34, 0x98, 0xdb];
    pub const CURRENT: [u8; 3] = [0xe7, 0x4c, 0x3c];
    pub const DETECTION: [u8; 3] = [0x2e, 0xcc, 0x71];
    pub const TARGET: [u8; 3] = [0xff, 0xff, 0x00];
    pub const ALERT: [u8; 3] = [0xff, 0x00, 0x00];

    pub const TERM_P: [u8; 3] = [0xff, 0x6b, 0x6b];
    pub const TERM_I: [u8; 3] = [0x4e, 0xcd, 0xc4];
    pub const TERM_D: [u8; 3] = [0x95, 0xe7, 0x7e];
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x as i32 && y >= self.y as i32 && x < self.right() as i32 && y < self.bottom() as i32
    }

    /// Shrink by the given margins; never collapses below one pixel
    pub fn inset(&self, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        let width = self.width.saturating_sub(left + right).max(1);
        let height = self.height.saturating_sub(top + bottom).max(1);
        Self::new(self.x + left.min(self.width - 1), self.y + top.min(self.height - 1), width, height)
    }
}

/// Blend `color` over the pixel at (`x`, `y`); points outside the image are ignored
pub fn blend_pixel(image: &mut RgbImage, x: i32, y: i32, color: [u8; 3], alpha: f32) {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let pixel = image.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in pixel.0.iter_mut().zip(color) {
        *dst = (src as f32 * alpha + *dst as f32 * (1.0 - alpha)).round() as u8;
    }
}

/// Blend a filled rectangle, clipped to the image
pub fn fill_region(image: &mut RgbImage, region: Region, color: [u8; 3], alpha: f32) {
    let right = region.right().min(image.width());
    let bottom = region.bottom().min(image.height());
    for y in region.y..bottom {
        for x in region.x..right {
            if alpha >= 1.0 {
                image.put_pixel(x, y, Rgb(color));
            } else {
                blend_pixel(image, x as i32, y as i32, color, alpha);
            }
        }
    }
}

/// Diagonal stripe pattern marking an area without data
pub fn stripe_pattern(image: &mut RgbImage, region: Region) {
    fill_region(image, region, palette::PLACEHOLDER, 1.0);
    let right = region.right().min(image.width());
    let bottom = region.bottom().min(image.height());
    for y in region.y..bottom {
        for x in region.x..right {
            if (x + y) % 20 < 2 {
                blend_pixel(image, x as i32, y as i32, palette::TEXT, 0.25);
            }
        }
    }
}

/// Round tick positions covering `bounds`, at most about `target` of them
pub fn nice_ticks(bounds: Bounds, target: usize) -> (Vec<f64>, f64) {
    let raw = bounds.span() / target.max(1) as f64;
    let magnitude = 10f64.powi(raw.log10().floor() as i32);
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&s| s >= raw)
        .unwrap_or(10.0 * magnitude);

    let mut ticks = Vec::new();
    let mut k = (bounds.min / step).ceil();
    while k * step <= bounds.max + step * 1e-9 {
        // Snap -0.0 and float noise to the grid
        let tick = (k * step * 1e9).round() / 1e9;
        ticks.push(if tick == 0.0 { 0.0 } else { tick });
        k += 1.0;
    }
    (ticks, step)
}

fn tick_label(value: f64, step: f64) -> String {
    let decimals = (0..6)
        .find(|&d| {
            let scaled = step * 10f64.powi(d as i32);
            (scaled - scaled.round()).abs() < 1e-6
        })
        .unwrap_or(6);
    format!("{:.*}", decimals, value)
}

/// Data-space drawing surface over a pixel region of an image
///
/// Maps fixed x/y bounds onto the region and clips everything drawn
/// through it to those bounds.
pub struct PlotArea<'a> {
    image: &'a mut RgbImage,
    area: Region,
    x: Bounds,
    y: Bounds,
}

impl<'a> PlotArea<'a> {
    pub fn new(image: &'a mut RgbImage, area: Region, x: Bounds, y: Bounds) -> Self {
        Self { image, area, x, y }
    }

    /// Pixel position of a data point
    pub fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        let w = self.area.width.saturating_sub(1) as f64;
        let h = self.area.height.saturating_sub(1) as f64;
        let px = self.area.x as f64 + (x - self.x.min) / self.x.span() * w;
        let py = self.area.y as f64 + (self.y.max - y) / self.y.span() * h;
        (px as f32, py as f32)
    }

    fn in_bounds(&self, x: f64, y: f64) -> bool {
        x >= self.x.min && x <= self.x.max && y >= self.y.min && y <= self.y.max
    }

    /// Axes background, grid and border
    pub fn draw_axes(&mut self) {
        fill_region(self.image, self.area, palette::AXES, 1.0);

        let (x_ticks, _) = nice_ticks(self.x, 6);
        let (y_ticks, _) = nice_ticks(self.y, 5);
        for x in x_ticks {
            let (px, _) = self.to_pixel(x, self.y.min);
            let px = px.round() as i32;
            for py in self.area.y..self.area.bottom() {
                blend_pixel(self.image, px, py as i32, palette::GRID, 0.3);
            }
        }
        for y in y_ticks {
            let (_, py) = self.to_pixel(self.x.min, y);
            let py = py.round() as i32;
            for px in self.area.x..self.area.right() {
                blend_pixel(self.image, px as i32, py, palette::GRID, 0.3);
            }
        }

        let a = self.area;
        let (l, t, r, b) = (a.x as i32 - 1, a.y as i32 - 1, a.right() as i32, a.bottom() as i32);
        for px in l..=r {
            blend_pixel(self.image, px, t, palette::GRID, 1.0);
            blend_pixel(self.image, px, b, palette::GRID, 1.0);
        }
        for py in t..=b {
            blend_pixel(self.image, l, py, palette::GRID, 1.0);
            blend_pixel(self.image, r, py, palette::GRID, 1.0);
        }
    }

    /// Numeric tick labels outside the left and bottom edges
    pub fn draw_tick_labels(&mut self, text: &TextRenderer, size: f32) {
        let (x_ticks, x_step) = nice_ticks(self.x, 6);
        let (y_ticks, y_step) = nice_ticks(self.y, 5);
        let gap = (size * 0.4) as i32;

        for x in x_ticks {
            let (px, _) = self.to_pixel(x, self.y.min);
            let label = tick_label(x, x_step);
            text.draw_centered(self.image, &label, px.round() as i32, self.area.bottom() as i32 + gap, size, palette::TEXT);
        }
        for y in y_ticks {
            let (_, py) = self.to_pixel(self.x.min, y);
            let label = tick_label(y, y_step);
            let (w, h) = text.measure(&label, size);
            let left = self.area.x as i32 - gap - w as i32;
            text.draw(self.image, &label, left, py.round() as i32 - h as i32 / 2, size, palette::TEXT);
        }
    }

    /// Clip a data-space segment to the bounds (Liang-Barsky)
    fn clip(&self, a: (f64, f64), b: (f64, f64)) -> Option<((f64, f64), (f64, f64))> {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        for (p, q) in [
            (-dx, a.0 - self.x.min),
            (dx, self.x.max - a.0),
            (-dy, a.1 - self.y.min),
            (dy, self.y.max - a.1),
        ] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else {
                let r = q / p;
                if p < 0.0 {
                    if r > t1 {
                        return None;
                    }
                    t0 = t0.max(r);
                } else {
                    if r < t0 {
                        return None;
                    }
                    t1 = t1.min(r);
                }
            }
        }
        Some(((a.0 + t0 * dx, a.1 + t0 * dy), (a.0 + t1 * dx, a.1 + t1 * dy)))
    }

    /// Straight segment between two data points, `width` pixels thick
    pub fn segment(&mut self, a: (f64, f64), b: (f64, f64), color: [u8; 3], alpha: f32, width: u32) {
        if !(a.0.is_finite() && a.1.is_finite() && b.0.is_finite() && b.1.is_finite()) {
            return;
        }
        let Some((a, b)) = self.clip(a, b) else {
            return;
        };
        let start = self.to_pixel(a.0, a.1);
        let end = self.to_pixel(b.0, b.1);

        // Thicken across the minor axis so the offset copies never overlap
        let steep = (end.1 - start.1).abs() > (end.0 - start.0).abs();
        for offset in 0..width.max(1) {
            let o = offset as f32 - (width.max(1) - 1) as f32 / 2.0;
            let (ox, oy) = if steep { (o, 0.0) } else { (0.0, o) };
            let iter = BresenhamLineIter::new((start.0 + ox, start.1 + oy), (end.0 + ox, end.1 + oy));
            for (x, y) in iter {
                if self.area.contains(x, y) {
                    blend_pixel(self.image, x, y, color, alpha);
                }
            }
        }
    }

    /// Connected line through `points`; non-finite points break the line
    pub fn polyline(&mut self, points: &[(f64, f64)], color: [u8; 3], alpha: f32, width: u32) {
        for pair in points.windows(2) {
            self.segment(pair[0], pair[1], color, alpha, width);
        }
    }

    /// Filled circle with an outline ring
    pub fn marker(&mut self, x: f64, y: f64, radius: i32, fill: [u8; 3], edge: [u8; 3]) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (px, py) = self.to_pixel(x, y);
        let center = (px.round() as i32, py.round() as i32);
        draw_filled_circle_mut(self.image, center, radius + 2, Rgb(edge));
        draw_filled_circle_mut(self.image, center, radius, Rgb(fill));
    }

    /// Diagonal cross centred on a data point
    pub fn cross(&mut self, x: f64, y: f64, half: i32, color: [u8; 3]) {
        if !self.in_bounds(x, y) {
            return;
        }
        let (px, py) = self.to_pixel(x, y);
        let (cx, cy) = (px.round() as i32, py.round() as i32);
        for d in -half..=half {
            for w in 0..2 {
                blend_pixel(self.image, cx + d + w, cy + d, color, 1.0);
                blend_pixel(self.image, cx + d + w, cy - d, color, 1.0);
            }
        }
    }

    /// Dashed horizontal line at data `y`
    pub fn dashed_hline(&mut self, y: f64, color: [u8; 3], alpha: f32) {
        if !(y >= self.y.min && y <= self.y.max) {
            return;
        }
        let (_, py) = self.to_pixel(self.x.min, y);
        let py = py.round() as i32;
        for px in self.area.x..self.area.right() {
            if (px - self.area.x) % 10 < 6 {
                blend_pixel(self.image, px as i32, py, color, alpha);
            }
        }
    }

    /// Dashed vertical line at data `x`, two pixels wide
    pub fn dashed_vline(&mut self, x: f64, color: [u8; 3], alpha: f32) {
        if !(x >= self.x.min && x <= self.x.max) {
            return;
        }
        let (px, _) = self.to_pixel(x, self.y.min);
        let px = px.round() as i32;
        for py in self.area.y..self.area.bottom() {
            if (py - self.area.y) % 10 < 6 {
                blend_pixel(self.image, px, py as i32, color, alpha);
                if px + 1 < self.area.right() as i32 {
                    blend_pixel(self.image, px + 1, py as i32, color, alpha);
                }
            }
        }
    }

    /// Fill between `baseline` and the piecewise-linear curve through `points`
    ///
    /// `points` must be sorted by x. Each pixel column is filled at most once.
    pub fn fill_to_baseline(&mut self, points: &[(f64, f64)], baseline: f64, color: [u8; 3], alpha: f32) {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return;
        };
        let w = self.area.width.saturating_sub(1).max(1) as f64;

        for column in 0..self.area.width {
            let x = self.x.min + column as f64 / w * self.x.span();
            if x < first.0 || x > last.0 {
                continue;
            }
            let i = points.partition_point(|p| p.0 <= x).clamp(1, points.len().max(1)) - 1;
            let value = match points.get(i + 1) {
                Some(next) if next.0 > points[i].0 => {
                    let f = (x - points[i].0) / (next.0 - points[i].0);
                    points[i].1 + f * (next.1 - points[i].1)
                }
                _ => points[i].1,
            };
            if !value.is_finite() {
                continue;
            }

            let lo = value.min(baseline).clamp(self.y.min, self.y.max);
            let hi = value.max(baseline).clamp(self.y.min, self.y.max);
            let (_, top) = self.to_pixel(x, hi);
            let (_, bottom) = self.to_pixel(x, lo);
            let px = (self.area.x + column) as i32;
            for py in top.round() as i32..=bottom.round() as i32 {
                blend_pixel(self.image, px, py, color, alpha);
            }
        }
    }

    /// Text in a filled box centred on a data point
    pub fn callout(&mut self, x: f64, y: f64, label: &str, text: &TextRenderer, size: f32, fill: [u8; 3]) {
        let (px, py) = self.to_pixel(x.clamp(self.x.min, self.x.max), y.clamp(self.y.min, self.y.max));
        let (w, h) = text.measure(label, size);
        if w == 0 {
            return;
        }
        let pad = (size * 0.35).ceil() as u32;
        let bw = w + 2 * pad;
        let bh = h + 2 * pad;
        let left = (px.round() as i32 - bw as i32 / 2).max(0) as u32;
        let top = (py.round() as i32 - bh as i32 / 2).max(0) as u32;

        fill_region(self.image, Region::new(left, top, bw, bh), fill, 0.7);
        text.draw(self.image, label, (left + pad) as i32, (top + pad) as i32, size, palette::TEXT);
    }

    /// Legend box in the upper-right corner; skipped without a font
    pub fn legend(&mut self, entries: &[(&str, [u8; 3])], text: &TextRenderer, size: f32) {
        if !text.has_font() || entries.is_empty() {
            return;
        }
        let swatch = (size * 1.6) as u32;
        let pad = (size * 0.5) as u32;
        let line = (size * 1.3) as u32;
        let label_width = entries.iter().map(|(l, _)| text.measure(l, size).0).max().unwrap_or(0);

        let width = swatch + label_width + 3 * pad;
        let height = line * entries.len() as u32 + pad;
        let left = self.area.right().saturating_sub(width + pad);
        let top = self.area.y + pad;
        fill_region(self.image, Region::new(left, top, width, height), palette::FIGURE, 0.8);

        for (i, (label, color)) in entries.iter().enumerate() {
            let row = top + pad / 2 + i as u32 * line;
            let mid = (row + line / 2) as i32;
            for x in left + pad..left + pad + swatch {
                blend_pixel(self.image, x as i32, mid, *color, 1.0);
                blend_pixel(self.image, x as i32, mid + 1, *color, 1.0);
            }
            let (_, h) = text.measure(label, size);
            text.draw(self.image, label, (left + 2 * pad + swatch) as i32, mid - h as i32 / 2, size, palette::TEXT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> (RgbImage, Region) {
        (RgbImage::from_pixel(120, 100, Rgb(palette::FIGURE)), Region::new(10, 10, 101, 81))
    }

    #[test]
    fn test_region_inset() {
        let region = Region::new(10, 20, 100, 50).inset(5, 10, 5, 10);
        assert_eq!(region, Region::new(15, 30, 90, 30));
        assert_eq!(Region::new(0, 0, 4, 4).inset(10, 10, 10, 10).width, 1);
    }

    #[test]
    fn test_pixel_mapping() {
        let (mut image, region) = area();
        let plot = PlotArea::new(&mut image, region, Bounds::symmetric(1.0), Bounds::new(0.0, 4.0));
        assert_eq!(plot.to_pixel(-1.0, 4.0), (10.0, 10.0));
        assert_eq!(plot.to_pixel(1.0, 0.0), (110.0, 90.0));
        assert_eq!(plot.to_pixel(0.0, 2.0), (60.0, 50.0));
    }

    #[test]
    fn test_blend() {
        let mut image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        blend_pixel(&mut image, 0, 0, [200, 100, 0], 0.5);
        assert_eq!(image.get_pixel(0, 0).0, [100, 50, 0]);
        blend_pixel(&mut image, 5, 5, [255, 255, 255], 1.0);
    }

    #[test]
    fn test_segment_is_clipped_to_bounds() {
        let (mut image, region) = area();
        let mut plot = PlotArea::new(&mut image, region, Bounds::symmetric(1.0), Bounds::symmetric(1.0));
        plot.segment((-5.0, 0.0), (5.0, 0.0), [255, 0, 0], 1.0, 1);

        assert_eq!(image.get_pixel(60, 50).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(5, 50).0, palette::FIGURE);
        assert_eq!(image.get_pixel(115, 50).0, palette::FIGURE);
    }

    #[test]
    fn test_segment_outside_bounds_draws_nothing() {
        let (mut image, region) = area();
        let before = image.clone();
        let mut plot = PlotArea::new(&mut image, region, Bounds::symmetric(1.0), Bounds::symmetric(1.0));
        plot.segment((2.0, 2.0), (3.0, 5.0), [255, 0, 0], 1.0, 2);
        plot.segment((0.0, f64::NAN), (0.5, 0.5), [255, 0, 0], 1.0, 2);
        plot.marker(4.0, 0.0, 3, [255, 0, 0], [255, 255, 255]);
        assert_eq!(image, before);
    }

    #[test]
    fn test_fill_to_baseline() {
        let (mut image, region) = area();
        let mut plot = PlotArea::new(&mut image, region, Bounds::new(0.0, 10.0), Bounds::new(0.0, 4.0));
        plot.fill_to_baseline(&[(0.0, 2.0), (10.0, 2.0)], 0.0, [0, 255, 0], 1.0);

        // Filled below y=2 (pixel row 50), untouched above
        assert_eq!(image.get_pixel(60, 80).0, [0, 255, 0]);
        assert_eq!(image.get_pixel(60, 30).0, palette::FIGURE);
    }

    #[test]
    fn test_nice_ticks() {
        let (ticks, step) = nice_ticks(Bounds::symmetric(1.0), 5);
        assert_eq!(step, 0.5);
        assert_eq!(ticks, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);

        let (ticks, step) = nice_ticks(Bounds::new(12.3, 17.8), 6);
        assert_eq!(step, 1.0);
        assert_eq!(ticks.first(), Some(&13.0));
        assert_eq!(ticks.last(), Some(&17.0));
    }

    #[test]
    fn test_tick_labels() {
        assert_eq!(tick_label(0.05, 0.05), "0.05");
        assert_eq!(tick_label(-2.0, 2.0), "-2");
        assert_eq!(tick_label(0.5, 0.5), "0.5");
        assert_eq!(tick_label(0.25, 0.25), "0.25");
    }
}
