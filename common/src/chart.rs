use std::{
    fs::create_dir_all,
    ops::Range,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim};
use eyre::{Context, Result};
use plotters::{
    coord::{
        Shift,
        combinators::{BindKeyPoints, WithKeyPoints},
        types::RangedCoordf64,
    },
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Row {row} of {} has no column {column}", .path.display())]
    MissingColumn {
        path: PathBuf,
        row: usize,
        column: usize,
    },
    #[error("Series {label} has {len} values, expected {expected}")]
    SeriesMismatch {
        label: String,
        len: usize,
        expected: usize,
    },
    #[error("Series {label} is not ordered like series {first}")]
    CategoryMismatch { label: String, first: String },
    #[error("Series {label} has {len} values for {expected} categories")]
    CategoryCount {
        label: String,
        len: usize,
        expected: usize,
    },
    #[error("Series {label} has a non-finite value at category {index}")]
    NonFinite { label: String, index: usize },
    #[error("Y axis bounds {min}..{max:?} are not finite")]
    InvalidBounds { min: f64, max: Option<f64> },
}

pub const PALETTE: [RGBColor; 6] = [
    RGBColor(0x41, 0x82, 0x59),
    RGBColor(0xbd, 0x56, 0x32),
    RGBColor(0xe1, 0xa9, 0x4c),
    RGBColor(0x7d, 0x6c, 0x5b),
    RGBColor(0x36, 0x4d, 0x38),
    RGBColor(0xc4, 0xe1, 0xc6),
];
pub const DEFAULT_SIZE: (u32, u32) = (800, 300);

const GRID: RGBColor = RGBColor(128, 128, 128);
const FONT: &str = "sans-serif";
const LABEL_FONT_SIZE: u32 = 16;
const TICK_FONT_SIZE: u32 = 14;
const LEGEND_FONT_SIZE: u32 = 14;
const Y_TICKS: usize = 5;
const Y_ROUND: f64 = 1000.0;
const LINE_WIDTH: u32 = 3;
const MARKER_SIZE: i32 = 5;
const BAR_MARGIN: f64 = 0.1;
const HATCH_SPACING: i32 = 6;

type Chart<'a, 'b> =
    ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, WithKeyPoints<RangedCoordf64>>>;
type Root<'b> = DrawingArea<SVGBackend<'b>, Shift>;

/// Rows of a result file
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub path: PathBuf,
    pub rows: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn column(&self, column: usize) -> Result<Vec<f64>, ChartError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values
                    .get(column)
                    .copied()
                    .ok_or_else(|| ChartError::MissingColumn {
                        path: self.path.clone(),
                        row,
                        column,
                    })
            })
            .collect()
    }

    /// The independent variable of every row, in file order
    pub fn xs(&self) -> Result<Vec<f64>, ChartError> {
        self.column(0)
    }

    /// The statistic of every row, in file order
    pub fn stats(&self) -> Result<Vec<f64>, ChartError> {
        self.column(1)
    }
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .context(format!("Open result file {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context(format!("Read {}", path.display()))?;
        let row = record
            .iter()
            .map(|field| {
                field
                    .parse::<f64>()
                    .context(format!("Parse '{field}' in {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    Ok(Dataset {
        path: path.to_path_buf(),
        rows,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub values: Vec<f64>,
}

/// One series per dataset, taken from the statistic column.
///
/// All datasets must have the same number of rows and the same independent variable in
/// every row, otherwise bars and points would be drawn against the wrong category.
pub fn build_series(datasets: &[(String, Dataset)]) -> Result<Vec<Series>, ChartError> {
    let Some((first_label, first)) = datasets.first() else {
        return Ok(Vec::new());
    };
    let first_xs = first.xs()?;

    datasets
        .iter()
        .map(|(label, dataset)| {
            let values = dataset.stats()?;
            if values.len() != first_xs.len() {
                return Err(ChartError::SeriesMismatch {
                    label: label.clone(),
                    len: values.len(),
                    expected: first_xs.len(),
                });
            }
            if dataset.xs()? != first_xs {
                return Err(ChartError::CategoryMismatch {
                    label: label.clone(),
                    first: first_label.clone(),
                });
            }
            Ok(Series {
                label: label.clone(),
                values,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub y_min: f64,
    pub y_max: Option<f64>,
    pub legend: bool,
    pub size: (u32, u32),
}

impl ChartSpec {
    pub fn y_range(&self) -> Range<f64> {
        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(f64::MIN, f64::max);
        let top = self.y_max.unwrap_or_else(|| upper_bound(max));
        if top <= self.y_min {
            self.y_min..self.y_min + Y_ROUND
        } else {
            self.y_min..top
        }
    }

    /// Evenly spaced y ticks, both bounds included
    pub fn y_ticks(&self) -> Vec<f64> {
        let range = self.y_range();
        let step = (range.end - range.start) / (Y_TICKS - 1) as f64;
        (0..Y_TICKS)
            .map(|i| range.start + step * i as f64)
            .collect()
    }

    fn check(&self) -> Result<(), ChartError> {
        if !self.y_min.is_finite() || self.y_max.is_some_and(|max| !max.is_finite()) {
            return Err(ChartError::InvalidBounds {
                min: self.y_min,
                max: self.y_max,
            });
        }
        for series in &self.series {
            if let Some(index) = series.values.iter().position(|v| !v.is_finite()) {
                return Err(ChartError::NonFinite {
                    label: series.label.clone(),
                    index,
                });
            }
            if series.values.len() != self.categories.len() {
                return Err(ChartError::CategoryCount {
                    label: series.label.clone(),
                    len: series.values.len(),
                    expected: self.categories.len(),
                });
            }
        }
        Ok(())
    }
}

fn tick_label(y: f64) -> String {
    if y.fract() == 0.0 {
        format!("{y:.0}")
    } else {
        format!("{y:.2}")
    }
}

/// Rounds up to the next multiple of 1000, or the next power of ten below that
pub fn upper_bound(n: f64) -> f64 {
    if n <= 0.0 {
        0.0
    } else if n >= Y_ROUND {
        (n / Y_ROUND).ceil() * Y_ROUND
    } else {
        10f64.powf(n.log10().ceil())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Square,
    TriangleDown,
    TriangleUp,
    Diamond,
    Cross,
}

impl Marker {
    const ORDER: [Marker; 6] = [
        Marker::Circle,
        Marker::Square,
        Marker::TriangleDown,
        Marker::TriangleUp,
        Marker::Diamond,
        Marker::Cross,
    ];

    pub fn for_index(idx: usize) -> Self {
        Self::ORDER[idx % Self::ORDER.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hatch {
    Forward,
    Circles,
    Backward,
    Dots,
    DenseBackward,
}

impl Hatch {
    const ORDER: [Hatch; 5] = [
        Hatch::Forward,
        Hatch::Circles,
        Hatch::Backward,
        Hatch::Dots,
        Hatch::DenseBackward,
    ];

    pub fn for_index(idx: usize) -> Self {
        Self::ORDER[idx % Self::ORDER.len()]
    }

    /// Line segments filling the pixel rectangle `(l, t)..(r, b)`
    pub fn lines(self, (l, t): (i32, i32), (r, b): (i32, i32)) -> Vec<[(i32, i32); 2]> {
        let forward = |spacing: usize| -> Vec<[(i32, i32); 2]> {
            (l + t..=r + b)
                .step_by(spacing)
                .filter_map(|c| {
                    let lo = l.max(c - b);
                    let hi = r.min(c - t);
                    (lo < hi).then_some([(lo, c - lo), (hi, c - hi)])
                })
                .collect()
        };
        let backward = |spacing: usize| -> Vec<[(i32, i32); 2]> {
            (t - r..=b - l)
                .step_by(spacing)
                .filter_map(|c| {
                    let lo = l.max(t - c);
                    let hi = r.min(b - c);
                    (lo < hi).then_some([(lo, lo + c), (hi, hi + c)])
                })
                .collect()
        };
        match self {
            Hatch::Forward => forward(HATCH_SPACING as usize),
            Hatch::Backward => backward(HATCH_SPACING as usize),
            Hatch::DenseBackward => backward(HATCH_SPACING as usize / 2),
            Hatch::Circles | Hatch::Dots => Vec::new(),
        }
    }

    /// Centres of the circles or dots filling the pixel rectangle
    pub fn points(self, (l, t): (i32, i32), (r, b): (i32, i32)) -> Vec<(i32, i32)> {
        let spacing = match self {
            Hatch::Circles => HATCH_SPACING * 2,
            Hatch::Dots => HATCH_SPACING,
            _ => return Vec::new(),
        };
        let mut points = Vec::new();
        for x in (l + spacing / 2..r).step_by(spacing as usize) {
            for y in (t + spacing / 2..b).step_by(spacing as usize) {
                points.push((x, y));
            }
        }
        points
    }

    fn draw(self, root: &Root<'_>, top_left: (i32, i32), bottom_right: (i32, i32)) -> Result<()> {
        let style = BLACK.stroke_width(1);
        for line in self.lines(top_left, bottom_right) {
            root.draw(&PathElement::new(line.to_vec(), style))?;
        }
        for point in self.points(top_left, bottom_right) {
            match self {
                Hatch::Circles => root.draw(&Circle::new(point, 2, style))?,
                _ => root.draw(&Circle::new(point, 1, BLACK.filled()))?,
            }
        }
        Ok(())
    }
}

fn palette(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

fn prepare(path: &Path, spec: &ChartSpec) -> Result<()> {
    spec.check()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).context(format!("Create plot dir {}", parent.display()))?;
    }
    debug!(
        "Rendering {} with {} series over {} categories",
        path.display(),
        spec.series.len(),
        spec.categories.len()
    );
    Ok(())
}

fn frame<'a, 'b>(root: &'a Root<'b>, spec: &ChartSpec) -> Result<Chart<'a, 'b>> {
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(root)
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            0f64..spec.categories.len().max(1) as f64,
            spec.y_range().with_key_points(spec.y_ticks()),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_| String::new())
        .y_labels(Y_TICKS)
        .y_label_formatter(&|y| tick_label(*y))
        .light_line_style(WHITE)
        .bold_line_style(GRID.mix(0.5))
        .axis_style(BLACK.stroke_width(1))
        .label_style((FONT, TICK_FONT_SIZE).into_font())
        .axis_desc_style((FONT, LABEL_FONT_SIZE).into_font().style(FontStyle::Bold))
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .draw()?;
    Ok(chart)
}

/// Category names centred under each slot of the x axis
fn draw_categories(root: &Root<'_>, chart: &Chart<'_, '_>, spec: &ChartSpec) -> Result<()> {
    let style = TextStyle::from((FONT, TICK_FONT_SIZE).into_font())
        .pos(Pos::new(HPos::Center, VPos::Top));
    let y = spec.y_range().start;
    for (i, category) in spec.categories.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(i as f64 + 0.5, y));
        root.draw(&Text::new(category.clone(), (px, py + 6), style.clone()))?;
    }
    Ok(())
}

fn draw_legend<'a, 'b: 'a>(chart: &mut Chart<'a, 'b>, spec: &ChartSpec) -> Result<()> {
    if spec.legend && !spec.series.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font((FONT, LEGEND_FONT_SIZE).into_font().style(FontStyle::Bold))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn draw_markers<'a, 'b: 'a>(
    chart: &mut Chart<'a, 'b>,
    marker: Marker,
    points: &[(f64, f64)],
    color: RGBColor,
) -> Result<()> {
    let style = color.filled();
    let s = MARKER_SIZE;
    match marker {
        Marker::Circle => {
            chart.draw_series(points.iter().map(|&p| Circle::new(p, s, style)))?;
        }
        Marker::Square => {
            chart.draw_series(
                points
                    .iter()
                    .map(|&p| EmptyElement::at(p) + Rectangle::new([(-s, -s), (s, s)], style)),
            )?;
        }
        Marker::TriangleDown => {
            chart.draw_series(points.iter().map(|&p| {
                EmptyElement::at(p) + Polygon::new(vec![(-s, -s), (s, -s), (0, s)], style)
            }))?;
        }
        Marker::TriangleUp => {
            chart.draw_series(points.iter().map(|&p| TriangleMarker::new(p, s, style)))?;
        }
        Marker::Diamond => {
            chart.draw_series(points.iter().map(|&p| {
                EmptyElement::at(p) + Polygon::new(vec![(0, -s), (s, 0), (0, s), (-s, 0)], style)
            }))?;
        }
        Marker::Cross => {
            chart.draw_series(
                points
                    .iter()
                    .map(|&p| Cross::new(p, s, color.stroke_width(2))),
            )?;
        }
    }
    Ok(())
}

/// Each series as a line over the categories, one marker shape per series
pub fn render_line_chart(path: &Path, spec: &ChartSpec) -> Result<()> {
    prepare(path, spec)?;
    let root = SVGBackend::new(path, spec.size).into_drawing_area();
    let mut chart = frame(&root, spec)?;

    for (idx, series) in spec.series.iter().enumerate() {
        let color = palette(idx);
        let points = series
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64 + 0.5, *v))
            .collect::<Vec<_>>();

        let anno = chart.draw_series(LineSeries::new(
            points.clone(),
            color.stroke_width(LINE_WIDTH),
        ))?;
        if spec.legend {
            anno.label(series.label.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(LINE_WIDTH))
            });
        }
        draw_markers(&mut chart, Marker::for_index(idx), &points, color)?;
    }

    draw_categories(&root, &chart, spec)?;
    draw_legend(&mut chart, spec)?;
    root.present()
        .context(format!("Write chart {}", path.display()))?;
    Ok(())
}

/// Grouped bars, one group per category and one bar per series
pub fn render_bar_chart(path: &Path, spec: &ChartSpec) -> Result<()> {
    prepare(path, spec)?;
    let root = SVGBackend::new(path, spec.size).into_drawing_area();
    let mut chart = frame(&root, spec)?;
    let y_range = spec.y_range();
    let width = (1.0 - 2.0 * BAR_MARGIN) / spec.series.len().max(1) as f64;

    for (idx, series) in spec.series.iter().enumerate() {
        let color = palette(idx);
        let bars = series
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let left = i as f64 + BAR_MARGIN + idx as f64 * width;
                let top = v.clamp(y_range.start, y_range.end);
                [(left, y_range.start), (left + width, top)]
            })
            .collect::<Vec<_>>();

        let anno = chart.draw_series(bars.iter().map(|&bar| Rectangle::new(bar, color.filled())))?;
        if spec.legend {
            anno.label(series.label.as_str()).legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
            });
        }
        chart.draw_series(
            bars.iter()
                .map(|&bar| Rectangle::new(bar, BLACK.stroke_width(1))),
        )?;

        let hatch = Hatch::for_index(idx);
        for [bottom_left, top_right] in &bars {
            let (l, b) = chart.backend_coord(bottom_left);
            let (r, t) = chart.backend_coord(top_right);
            hatch.draw(&root, (l.min(r), t.min(b)), (l.max(r), t.max(b)))?;
        }
    }

    draw_categories(&root, &chart, spec)?;
    draw_legend(&mut chart, spec)?;
    root.present()
        .context(format!("Write chart {}", path.display()))?;
    Ok(())
}
