//! Map rendering
//!
//! The renderer is a collaborator of the pipeline: it turns a 2-D
//! latitude/longitude field into an in-memory image. Nothing is written to disk
//! here; the image is encoded together with its metadata when the run commits
//! its outputs (see [`crate::provenance`]).
//!
//! [`ContourMapRenderer`] fills every grid cell with the colour of the contour
//! level bin its value falls in, draws a colour bar strip and optional
//! gridlines. Text (title, colour bar label) is stored as image metadata rather
//! than drawn, so rendering never depends on fonts installed on the host.

use crate::errors::{ClimError, Result};
use crate::field::GriddedField;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Default figure size in inches (width, height)
pub const DEFAULT_FIGSIZE: (f64, f64) = (12.0, 5.0);

/// Default output resolution
pub const DEFAULT_DPI: u32 = 200;

const GRID_COLOR: RGBColor = RGBColor(140, 140, 140);
const LONGITUDE_GRID_STEP: f64 = 60.0;
const LATITUDE_GRID_STEP: f64 = 30.0;

/// Supported output image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    /// Infer the format from the output file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("png") => Ok(ImageFormat::Png),
            Some("svg") => Ok(ImageFormat::Svg),
            Some(other) => Err(ClimError::InputValidation(format!(
                "unsupported output format '.{other}' for {} (expected .png or .svg)",
                path.display()
            ))),
            None => Err(ClimError::InputValidation(format!(
                "output path {} has no extension (expected .png or .svg)",
                path.display()
            ))),
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Strictly increasing contour levels
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLevels(Vec<f32>);

impl ContourLevels {
    pub fn new(levels: Vec<f32>) -> Result<Self> {
        if levels.len() < 2 {
            return Err(ClimError::InputValidation(format!(
                "at least two contour levels are required, got {}",
                levels.len()
            )));
        }
        if levels.iter().any(|l| !l.is_finite()) {
            return Err(ClimError::InputValidation(
                "contour levels must be finite".to_string(),
            ));
        }
        if levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ClimError::InputValidation(format!(
                "contour levels must be strictly increasing: {levels:?}"
            )));
        }
        Ok(Self(levels))
    }

    /// Levels `start, start + step, ...` below `stop`.
    pub fn arange(start: f32, stop: f32, step: f32) -> Result<Self> {
        if step <= 0.0 || !step.is_finite() {
            return Err(ClimError::InputValidation(format!(
                "contour level step must be positive, got {step}"
            )));
        }
        let count = ((f64::from(stop) - f64::from(start)) / f64::from(step)).ceil();
        let count = if count > 0.0 { count as usize } else { 0 };
        Self::new(
            (0..count)
                .map(|i| (f64::from(start) + i as f64 * f64::from(step)) as f32)
                .collect(),
        )
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    fn bins(&self) -> usize {
        self.0.len() - 1
    }
}

impl Default for ContourLevels {
    fn default() -> Self {
        Self((0..10).map(|i| i as f32 * 1.5).collect())
    }
}

/// Treatment of values beyond the outermost levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extend {
    Neither,
    Min,
    #[default]
    Max,
    Both,
}

impl Extend {
    const fn below(self) -> bool {
        matches!(self, Extend::Min | Extend::Both)
    }

    const fn above(self) -> bool {
        matches!(self, Extend::Max | Extend::Both)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Extend::Neither => "neither",
            Extend::Min => "min",
            Extend::Max => "max",
            Extend::Both => "both",
        }
    }
}

impl FromStr for Extend {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "neither" => Ok(Extend::Neither),
            "min" => Ok(Extend::Min),
            "max" => Ok(Extend::Max),
            "both" => Ok(Extend::Both),
            other => Err(ClimError::InputValidation(format!(
                "unknown extend policy '{other}' (expected neither, min, max or both)"
            ))),
        }
    }
}

/// Colour palettes, sampled by linear interpolation between stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Palette {
    /// Reversed cmocean haline: pale yellow for dry, deep blue for wet
    #[default]
    HalineReversed,
    Viridis,
}

const HALINE_R: [(u8, u8, u8); 5] = [
    (253, 239, 154),
    (101, 186, 109),
    (40, 133, 139),
    (14, 76, 161),
    (41, 24, 107),
];

const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

impl Palette {
    fn stops(self) -> &'static [(u8, u8, u8)] {
        match self {
            Palette::HalineReversed => &HALINE_R,
            Palette::Viridis => &VIRIDIS,
        }
    }

    /// Colour at position `t` in `[0, 1]`.
    #[must_use]
    pub fn sample(self, t: f64) -> RGBColor {
        let stops = self.stops();
        let t = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
        let lower = (t.floor() as usize).min(stops.len() - 2);
        let frac = t - lower as f64;
        let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * frac).round() as u8;
        let (r0, g0, b0) = stops[lower];
        let (r1, g1, b1) = stops[lower + 1];
        RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }
}

impl FromStr for Palette {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "haline_r" => Ok(Palette::HalineReversed),
            "viridis" => Ok(Palette::Viridis),
            other => Err(ClimError::InputValidation(format!(
                "unknown palette '{other}' (expected haline_r or viridis)"
            ))),
        }
    }
}

/// Everything the renderer needs besides the data
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    pub levels: ContourLevels,
    pub extend: Extend,
    pub palette: Palette,
    pub gridlines: bool,
    pub dpi: u32,
    pub figsize: (f64, f64),
    pub title: String,
    pub colorbar_label: String,
}

impl RenderSpec {
    /// Pixel dimensions of the figure.
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        let width = (self.figsize.0 * f64::from(self.dpi)).round().max(1.0) as u32;
        let height = (self.figsize.1 * f64::from(self.dpi)).round().max(1.0) as u32;
        (width, height)
    }

    /// Number of colours: one per level bin plus the extension colours.
    fn colour_count(&self) -> usize {
        self.levels.bins() + usize::from(self.extend.below()) + usize::from(self.extend.above())
    }

    /// Colour index for a value, or `None` when it is not drawn.
    fn colour_index(&self, value: f32) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let levels = self.levels.values();
        let offset = usize::from(self.extend.below());
        let last = levels[levels.len() - 1];

        if value < levels[0] {
            return self.extend.below().then_some(0);
        }
        if value > last {
            return self.extend.above().then(|| self.colour_count() - 1);
        }
        let bin = levels
            .iter()
            .rposition(|&l| l <= value)
            .unwrap_or(0)
            .min(self.levels.bins() - 1);
        Some(bin + offset)
    }

    fn colour(&self, index: usize) -> RGBColor {
        let count = self.colour_count();
        if count <= 1 {
            return self.palette.sample(0.5);
        }
        self.palette.sample(index as f64 / (count - 1) as f64)
    }
}

/// Pixel or vector payload of a rendered figure
#[derive(Debug, Clone, PartialEq)]
pub enum ImageContent {
    /// Packed 8-bit RGB pixels, row-major
    Raster(Vec<u8>),
    /// SVG document
    Vector(String),
}

/// A figure held in memory until the run commits its outputs
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub content: ImageContent,
    pub title: String,
    pub caption: String,
}

impl RenderedImage {
    /// Descriptive metadata every image carries.
    #[must_use]
    pub fn base_metadata(&self) -> Vec<(String, String)> {
        vec![
            ("Title".to_string(), self.title.clone()),
            ("Comment".to_string(), self.caption.clone()),
        ]
    }

    /// Encode to file bytes with the base metadata plus `extra` entries.
    pub fn encode(&self, extra: &[(String, String)]) -> Result<Vec<u8>> {
        let mut metadata = self.base_metadata();
        metadata.extend(extra.iter().cloned());

        match &self.content {
            ImageContent::Raster(pixels) => encode_png(self.width, self.height, pixels, &metadata),
            ImageContent::Vector(svg) => Ok(encode_svg(svg, &metadata)?.into_bytes()),
        }
    }
}

fn encode_png(width: u32, height: u32, pixels: &[u8], metadata: &[(String, String)]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        for (keyword, text) in metadata {
            encoder.add_itxt_chunk(keyword.clone(), text.clone())?;
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels)?;
        writer.finish()?;
    }
    Ok(bytes)
}

fn encode_svg(svg: &str, metadata: &[(String, String)]) -> Result<String> {
    let open = svg
        .find("<svg")
        .and_then(|start| svg[start..].find('>').map(|end| start + end + 1))
        .ok_or_else(|| ClimError::Render("rendered SVG has no <svg> element".to_string()))?;

    let mut elements = String::new();
    for (key, text) in metadata {
        let text = xml_escape(text);
        match key.as_str() {
            "Title" => elements.push_str(&format!("\n<title>{text}</title>")),
            "Comment" => elements.push_str(&format!("\n<desc>{text}</desc>")),
            other => {
                let tag = other.to_ascii_lowercase();
                elements.push_str(&format!("\n<metadata><{tag}>{text}</{tag}></metadata>"));
            }
        }
    }

    let mut out = String::with_capacity(svg.len() + elements.len());
    out.push_str(&svg[..open]);
    out.push_str(&elements);
    out.push_str(&svg[open..]);
    Ok(out)
}

pub(crate) fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Rendering collaborator used by the pipeline
pub trait Renderer {
    /// Draw a 2-D latitude/longitude field.
    fn render(&self, field: &GriddedField, spec: &RenderSpec, format: ImageFormat)
        -> Result<RenderedImage>;
}

/// Filled-cell contour map drawn with plotters
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourMapRenderer;

/// One grid cell in data coordinates with its colour
struct Cell {
    x: (f64, f64),
    y: (f64, f64),
    colour: RGBColor,
}

struct MapLayout {
    x_range: (f64, f64),
    y_range: (f64, f64),
    cells: Vec<Cell>,
    colours: Vec<RGBColor>,
    gridlines: bool,
}

impl Renderer for ContourMapRenderer {
    fn render(
        &self,
        field: &GriddedField,
        spec: &RenderSpec,
        format: ImageFormat,
    ) -> Result<RenderedImage> {
        let layout = layout_map(field, spec)?;
        let (width, height) = spec.pixel_size();
        debug!(
            "Rendering {} cells of '{}' at {width}x{height} ({format})",
            layout.cells.len(),
            field.name()
        );

        let content = match format {
            ImageFormat::Png => {
                let mut pixels = vec![0u8; width as usize * height as usize * 3];
                {
                    let root = BitMapBackend::with_buffer(&mut pixels, (width, height))
                        .into_drawing_area();
                    draw_map(&root, &layout)?;
                    root.present().map_err(render_error)?;
                }
                ImageContent::Raster(pixels)
            }
            ImageFormat::Svg => {
                let mut svg = String::new();
                {
                    let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
                    draw_map(&root, &layout)?;
                    root.present().map_err(render_error)?;
                }
                ImageContent::Vector(svg)
            }
        };

        let levels = spec
            .levels
            .values()
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(RenderedImage {
            format,
            width,
            height,
            content,
            title: spec.title.clone(),
            caption: format!(
                "{} (levels: {levels}; extend: {})",
                spec.colorbar_label,
                spec.extend.as_str()
            ),
        })
    }
}

fn render_error<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> ClimError {
    ClimError::Render(err.to_string())
}

fn layout_map(field: &GriddedField, spec: &RenderSpec) -> Result<MapLayout> {
    if field.data().ndim() != 2 {
        return Err(ClimError::PreconditionViolation(format!(
            "only 2-D fields can be drawn, '{}' has dimensions [{}]",
            field.name(),
            field.dims().join(", ")
        )));
    }

    let lat_dim = field.latitude_dim()?;
    let lon_dim = field.longitude_dim()?;
    let lat_axis = field.axis_index(lat_dim)?;
    let lon_axis = field.axis_index(lon_dim)?;

    let lat_edges = cell_edges(field.coordinate(lat_dim), field.shape()[lat_axis]);
    let lon_edges = cell_edges(field.coordinate(lon_dim), field.shape()[lon_axis]);

    let mut cells = Vec::new();
    for ((i, j), &value) in field
        .data()
        .view()
        .into_dimensionality::<ndarray::Ix2>()?
        .indexed_iter()
    {
        let (lat_idx, lon_idx) = if lat_axis == 0 { (i, j) } else { (j, i) };
        if let Some(index) = spec.colour_index(value) {
            cells.push(Cell {
                x: lon_edges[lon_idx],
                y: lat_edges[lat_idx],
                colour: spec.colour(index),
            });
        }
    }

    let colours = (0..spec.colour_count()).map(|i| spec.colour(i)).collect();

    Ok(MapLayout {
        x_range: span(&lon_edges),
        y_range: span(&lat_edges),
        cells,
        colours,
        gridlines: spec.gridlines,
    })
}

/// Lower/upper edge of every cell, halfway between neighbouring centres.
fn cell_edges(centres: Option<&[f64]>, len: usize) -> Vec<(f64, f64)> {
    let centres: Vec<f64> = match centres {
        Some(c) => c.to_vec(),
        None => (0..len).map(|i| i as f64).collect(),
    };

    (0..len)
        .map(|i| {
            let half_before = if i > 0 {
                (centres[i] - centres[i - 1]) / 2.0
            } else if len > 1 {
                (centres[1] - centres[0]) / 2.0
            } else {
                0.5
            };
            let half_after = if i + 1 < len {
                (centres[i + 1] - centres[i]) / 2.0
            } else {
                half_before
            };
            let a = centres[i] - half_before;
            let b = centres[i] + half_after;
            (a.min(b), a.max(b))
        })
        .collect()
}

fn span(edges: &[(f64, f64)]) -> (f64, f64) {
    let lo = edges.iter().map(|e| e.0).fold(f64::INFINITY, f64::min);
    let hi = edges.iter().map(|e| e.1).fold(f64::NEG_INFINITY, f64::max);
    if lo < hi {
        (lo, hi)
    } else {
        (lo - 0.5, lo + 0.5)
    }
}

fn draw_map<DB>(root: &DrawingArea<DB, Shift>, layout: &MapLayout) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(render_error)?;

    let (width, height) = root.dim_in_pixel();
    let map_width = (f64::from(width) * 0.9) as i32;
    let bar_width = width as i32 - map_width;
    let margin = (height as i32 / 25).max(1);
    let (map_area, bar_area) = root.split_horizontally(map_width);

    let (x0, x1) = layout.x_range;
    let (y0, y1) = layout.y_range;
    let mut chart = ChartBuilder::on(&map_area)
        .margin(margin)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(render_error)?;

    chart
        .draw_series(layout.cells.iter().map(|cell| {
            Rectangle::new(
                [(cell.x.0, cell.y.0), (cell.x.1, cell.y.1)],
                cell.colour.filled(),
            )
        }))
        .map_err(render_error)?;

    if layout.gridlines {
        let mut lines = Vec::new();
        let mut lon = (x0 / LONGITUDE_GRID_STEP).ceil() * LONGITUDE_GRID_STEP;
        while lon <= x1 {
            lines.push(vec![(lon, y0), (lon, y1)]);
            lon += LONGITUDE_GRID_STEP;
        }
        let mut lat = (y0 / LATITUDE_GRID_STEP).ceil() * LATITUDE_GRID_STEP;
        while lat <= y1 {
            lines.push(vec![(x0, lat), (x1, lat)]);
            lat += LATITUDE_GRID_STEP;
        }
        chart
            .draw_series(
                lines
                    .into_iter()
                    .map(|line| PathElement::new(line, GRID_COLOR.stroke_width(1))),
            )
            .map_err(render_error)?;
    }

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(x0, y0), (x1, y1)],
            BLACK.stroke_width(1),
        )))
        .map_err(render_error)?;

    let bar_top = layout.colours.len().max(1) as f64;
    let mut bar = ChartBuilder::on(&bar_area)
        .margin_top(margin)
        .margin_bottom(margin)
        .margin_left(bar_width / 4)
        .margin_right(bar_width / 3)
        .build_cartesian_2d(0.0..1.0, 0.0..bar_top)
        .map_err(render_error)?;

    bar.draw_series(layout.colours.iter().enumerate().map(|(i, colour)| {
        Rectangle::new([(0.0, i as f64), (1.0, i as f64 + 1.0)], colour.filled())
    }))
    .map_err(render_error)?;
    bar.draw_series(std::iter::once(Rectangle::new(
        [(0.0, 0.0), (1.0, bar_top)],
        BLACK.stroke_width(1),
    )))
    .map_err(render_error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn spec(extend: Extend) -> RenderSpec {
        RenderSpec {
            levels: ContourLevels::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap(),
            extend,
            palette: Palette::default(),
            gridlines: true,
            dpi: 10,
            figsize: (12.0, 5.0),
            title: "ACCESS1-3 precipitation climatology (DJF)".to_string(),
            colorbar_label: "mm/day".to_string(),
        }
    }

    fn field() -> GriddedField {
        GriddedField::new(
            "pr",
            vec!["lat".into(), "lon".into()],
            ArrayD::from_shape_vec(vec![2, 3], vec![0.5, 1.5, 2.5, 3.5, -1.0, f32::NAN]).unwrap(),
            "mm/day",
        )
        .unwrap()
        .with_coordinate("lat", vec![-45.0, 45.0])
        .unwrap()
        .with_coordinate("lon", vec![60.0, 180.0, 300.0])
        .unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ImageFormat::from_path(Path::new("out/map.PNG")).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            ImageFormat::from_path(Path::new("map.svg")).unwrap(),
            ImageFormat::Svg
        );
        assert!(matches!(
            ImageFormat::from_path(Path::new("map.jpg")),
            Err(ClimError::InputValidation(_))
        ));
        assert!(ImageFormat::from_path(Path::new("map")).is_err());
    }

    #[test]
    fn test_levels() {
        let levels = ContourLevels::arange(0.0, 15.0, 1.5).unwrap();
        assert_eq!(levels.values().len(), 10);
        assert_eq!(levels.values()[9], 13.5);
        assert_eq!(levels, ContourLevels::default());

        assert!(ContourLevels::new(vec![1.0]).is_err());
        assert!(ContourLevels::new(vec![0.0, 2.0, 1.0]).is_err());
        assert!(ContourLevels::arange(0.0, 10.0, 0.0).is_err());
    }

    #[test]
    fn test_colour_index_respects_extend() {
        let max_only = spec(Extend::Max);
        assert_eq!(max_only.colour_index(0.5), Some(0));
        assert_eq!(max_only.colour_index(3.0), Some(2));
        assert_eq!(max_only.colour_index(3.5), Some(3));
        assert_eq!(max_only.colour_index(-1.0), None);
        assert_eq!(max_only.colour_index(f32::NAN), None);

        let both = spec(Extend::Both);
        assert_eq!(both.colour_index(-1.0), Some(0));
        assert_eq!(both.colour_index(0.5), Some(1));
        assert_eq!(both.colour_index(10.0), Some(4));

        assert_eq!(spec(Extend::Neither).colour_index(10.0), None);
    }

    #[test]
    fn test_palette_endpoints() {
        assert_eq!(Palette::HalineReversed.sample(0.0), RGBColor(253, 239, 154));
        assert_eq!(Palette::HalineReversed.sample(1.0), RGBColor(41, 24, 107));
        assert_eq!(Palette::Viridis.sample(2.0), RGBColor(253, 231, 37));
    }

    #[test]
    fn test_cell_edges() {
        let edges = cell_edges(Some(&[0.0, 10.0, 20.0]), 3);
        assert_eq!(edges, vec![(-5.0, 5.0), (5.0, 15.0), (15.0, 25.0)]);

        // decreasing latitude still yields ordered edges
        let edges = cell_edges(Some(&[10.0, 0.0]), 2);
        assert_eq!(edges, vec![(5.0, 15.0), (-5.0, 5.0)]);
    }

    #[test]
    fn test_render_png_and_svg() {
        let renderer = ContourMapRenderer;
        let spec = spec(Extend::Max);

        let png = renderer.render(&field(), &spec, ImageFormat::Png).unwrap();
        assert_eq!((png.width, png.height), (120, 50));
        match &png.content {
            ImageContent::Raster(pixels) => assert_eq!(pixels.len(), 120 * 50 * 3),
            ImageContent::Vector(_) => panic!("expected raster output"),
        }
        let bytes = png.encode(&[]).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let svg = renderer.render(&field(), &spec, ImageFormat::Svg).unwrap();
        let text = String::from_utf8(svg.encode(&[]).unwrap()).unwrap();
        assert!(text.contains("<title>ACCESS1-3 precipitation climatology (DJF)</title>"));
        assert!(text.contains("<desc>mm/day (levels: 0, 1, 2, 3; extend: max)</desc>"));
    }

    #[test]
    fn test_render_rejects_non_2d() {
        let data = ArrayD::<f32>::zeros(vec![2, 2, 2]);
        let cube = GriddedField::new(
            "pr",
            vec!["time".into(), "lat".into(), "lon".into()],
            data,
            "mm/day",
        )
        .unwrap();
        let result = ContourMapRenderer.render(&cube, &spec(Extend::Max), ImageFormat::Png);
        assert!(matches!(result, Err(ClimError::PreconditionViolation(_))));
    }

    #[test]
    fn test_svg_metadata_is_escaped() {
        let svg = "<?xml version=\"1.0\"?>\n<svg width=\"1\" height=\"1\"></svg>";
        let out = encode_svg(
            svg,
            &[("creator".to_string(), "a < b & \"c\"".to_string())],
        )
        .unwrap();
        assert!(out.contains("<metadata><creator>a &lt; b &amp; &quot;c&quot;</creator></metadata>"));
        assert!(out.ends_with("</svg>"));
    }
}
