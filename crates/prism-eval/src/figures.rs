//! Figure generation using plotters (SVG output)
//!
//! Uses SVG backend to avoid system font dependencies. Every chart draws a
//! "No data" notice instead of failing when its input is empty.

use anyhow::Result;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_svg::SVGBackend;
use std::f64::consts::PI;
use std::path::Path;

/// Categorical colors cycled across series and slices
const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

pub fn palette(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

/// A labelled vertical line on a histogram
#[derive(Debug, Clone)]
pub struct Marker {
    pub label: String,
    pub value: f64,
    pub color: RGBColor,
}

impl Marker {
    pub fn new(label: impl Into<String>, value: f64, color: RGBColor) -> Self {
        Self {
            label: label.into(),
            value,
            color,
        }
    }
}

/// One bar of a bar chart; `count` adds an `n=` annotation
#[derive(Debug, Clone)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub count: Option<usize>,
}

/// A named point cloud
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
}

fn no_data(root: &DrawingArea<SVGBackend<'_>, Shift>, size: (u32, u32)) -> Result<()> {
    root.draw(&Text::new(
        "No data",
        ((size.0 / 2) as i32, (size.1 / 2) as i32),
        ("sans-serif", 20)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center)),
    ))?;
    root.present()?;
    Ok(())
}

/// Pad a value range so single-valued inputs still get a visible axis
fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span.abs() < 1e-12 {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo - span * 0.05, hi + span * 0.05)
    }
}

/// Bin counts over `[lo, hi]`; the last bin is closed on the right.
pub fn bin_counts(values: &[f64], bins: usize, lo: f64, hi: f64) -> Vec<u32> {
    let bins = bins.max(1);
    let mut counts = vec![0u32; bins];
    let width = (hi - lo) / bins as f64;
    for &v in values {
        let idx = if width > 0.0 {
            (((v - lo) / width).floor().max(0.0) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }
    counts
}

/// Histogram with optional vertical markers (mean, P50, P95, ...)
pub fn histogram(
    path: &Path,
    size: (u32, u32),
    title: &str,
    x_desc: &str,
    values: &[f64],
    bins: usize,
    markers: &[Marker],
) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    if values.is_empty() {
        return no_data(&root, size);
    }

    let data_lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let data_hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (bin_lo, bin_hi) = if data_hi > data_lo {
        (data_lo, data_hi)
    } else {
        (data_lo - 0.5, data_hi + 0.5)
    };
    let counts = bin_counts(values, bins, bin_lo, bin_hi);
    let bin_width = (bin_hi - bin_lo) / counts.len() as f64;
    let max_count = counts.iter().copied().max().unwrap_or(1).max(1);

    let (x_lo, x_hi) = markers
        .iter()
        .fold((bin_lo, bin_hi), |(lo, hi), m| (lo.min(m.value), hi.max(m.value)));
    let (x_lo, x_hi) = padded_range(x_lo, x_hi);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_lo..x_hi, 0u32..max_count + 1)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Frequency")
        .draw()?;

    // Draw histogram bars manually
    let bar_color = palette(0);
    for (i, &count) in counts.iter().enumerate() {
        let x0 = bin_lo + i as f64 * bin_width;
        let x1 = x0 + bin_width;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x0, 0), (x1, count)],
            bar_color.mix(0.7).filled(),
        )))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x0, 0), (x1, count)],
            BLACK.stroke_width(1),
        )))?;
    }

    for marker in markers {
        let color = marker.color;
        chart
            .draw_series(LineSeries::new(
                [(marker.value, 0), (marker.value, max_count)],
                color.stroke_width(2),
            ))?
            .label(format!("{}: {:.2}", marker.label, marker.value))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    if !markers.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

/// Labelled vertical bars. `y_max` fixes the top of the axis (e.g. 1.0 for accuracies).
pub fn bar_chart(
    path: &Path,
    size: (u32, u32),
    title: &str,
    y_desc: &str,
    bars: &[Bar],
    y_max: Option<f64>,
) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    if bars.is_empty() {
        return no_data(&root, size);
    }

    let data_max = bars.iter().map(|b| b.value).fold(0.0f64, f64::max);
    let data_min = bars.iter().map(|b| b.value).fold(0.0f64, f64::min);
    let top = y_max.unwrap_or(if data_max > 0.0 { data_max * 1.15 } else { 1.0 });

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..bars.len()).into_segmented(), data_min..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&|x| {
            if let SegmentValue::CenterOf(idx) = x {
                if *idx < bars.len() {
                    return bars[*idx].label.clone();
                }
            }
            String::new()
        })
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(idx, bar)| {
        let mut rect = Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0.0),
                (SegmentValue::Exact(idx + 1), bar.value),
            ],
            palette(idx).filled(),
        );
        rect.set_margin(0, 0, 12, 12);
        rect
    }))?;

    let label_offset = (top - data_min) * 0.02;
    let label_style = ("sans-serif", 13)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    for (idx, bar) in bars.iter().enumerate() {
        let text = match bar.count {
            Some(n) => format!("{:.3} (n={})", bar.value, n),
            None => format!("{:.3}", bar.value),
        };
        chart.draw_series(std::iter::once(Text::new(
            text,
            (SegmentValue::CenterOf(idx), bar.value + label_offset),
            label_style.clone(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// One box per non-empty group
pub fn box_plot(
    path: &Path,
    size: (u32, u32),
    title: &str,
    x_desc: &str,
    y_desc: &str,
    groups: &[(String, Vec<f64>)],
) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let groups: Vec<&(String, Vec<f64>)> = groups.iter().filter(|(_, v)| !v.is_empty()).collect();
    if groups.is_empty() {
        return no_data(&root, size);
    }

    let all = groups.iter().flat_map(|(_, v)| v.iter().copied());
    let (lo, hi) = all.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (lo, hi) = padded_range(lo, hi);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..groups.len()).into_segmented(), lo as f32..hi as f32)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len())
        .x_label_formatter(&|x| {
            if let SegmentValue::CenterOf(idx) = x {
                if *idx < groups.len() {
                    return groups[*idx].0.clone();
                }
            }
            String::new()
        })
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(groups.iter().enumerate().map(|(idx, (_, values))| {
        let quartiles = Quartiles::new(values);
        Boxplot::new_vertical(SegmentValue::CenterOf(idx), &quartiles)
            .width(30)
            .whisker_width(0.5)
            .style(&palette(idx))
    }))?;

    root.present()?;
    Ok(())
}

/// Sequential white-to-blue scale for `value` in [0, 1]
fn blues(value: f64) -> RGBColor {
    let t = value.clamp(0.0, 1.0);
    RGBColor(
        (247.0 - t * (247.0 - 8.0)) as u8,
        (251.0 - t * (251.0 - 48.0)) as u8,
        (255.0 - t * (255.0 - 107.0)) as u8,
    )
}

/// Annotated count matrix, rows = true label, columns = predicted label.
///
/// Cell shade is the row-normalized fraction; the text is the raw count.
pub fn heatmap(
    path: &Path,
    size: (u32, u32),
    title: &str,
    labels: &[String],
    counts: &[Vec<u64>],
) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let n = labels.len();
    if n == 0 || counts.len() != n {
        return no_data(&root, size);
    }

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(100)
        .build_cartesian_2d((0..n).into_segmented(), (0..n).into_segmented())?;

    // Row 0 is drawn at the top
    let label_for = |v: &SegmentValue<usize>, flip: bool| -> String {
        if let SegmentValue::CenterOf(idx) = v {
            if *idx < n {
                let i = if flip { n - 1 - *idx } else { *idx };
                return labels[i].clone();
            }
        }
        String::new()
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|x| label_for(x, false))
        .y_label_formatter(&|y| label_for(y, true))
        .x_desc("Predicted")
        .y_desc("True")
        .draw()?;

    for (row, row_counts) in counts.iter().enumerate() {
        let row_sum: u64 = row_counts.iter().sum();
        let y = n - 1 - row;
        for (col, &count) in row_counts.iter().enumerate().take(n) {
            let frac = if row_sum == 0 { 0.0 } else { count as f64 / row_sum as f64 };
            chart.draw_series(std::iter::once(Rectangle::new(
                [
                    (SegmentValue::Exact(col), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(col + 1), SegmentValue::Exact(y + 1)),
                ],
                blues(frac).filled(),
            )))?;

            let text_color = if frac > 0.5 { WHITE } else { BLACK };
            chart.draw_series(std::iter::once(Text::new(
                count.to_string(),
                (SegmentValue::CenterOf(col), SegmentValue::CenterOf(y)),
                ("sans-serif", 14)
                    .into_font()
                    .color(&text_color)
                    .pos(Pos::new(HPos::Center, VPos::Center)),
            )))?;
        }
    }

    root.present()?;
    Ok(())
}

/// Pie chart with percentage labels. Non-positive slices are skipped.
pub fn pie_chart(path: &Path, size: (u32, u32), title: &str, slices: &[(String, f64)]) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let slices: Vec<&(String, f64)> = slices.iter().filter(|(_, v)| *v > 0.0).collect();
    let total: f64 = slices.iter().map(|(_, v)| v).sum();
    if slices.is_empty() || total <= 0.0 {
        return no_data(&root, size);
    }

    let area = root.titled(title, ("sans-serif", 20))?;
    let (w, h) = area.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = (w.min(h) as f64 / 2.0) * 0.7;

    // Start at 12 o'clock, go clockwise
    let mut angle = -PI / 2.0;
    for (idx, (label, value)) in slices.iter().enumerate() {
        let sweep = value / total * 2.0 * PI;
        let steps = ((sweep / (2.0 * PI)) * 120.0).ceil().max(2.0) as usize;

        let mut points = vec![(center.0 as i32, center.1 as i32)];
        for s in 0..=steps {
            let a = angle + sweep * s as f64 / steps as f64;
            points.push((
                (center.0 + radius * a.cos()) as i32,
                (center.1 + radius * a.sin()) as i32,
            ));
        }
        area.draw(&Polygon::new(points, palette(idx).filled()))?;

        let mid = angle + sweep / 2.0;
        let label_pos = (
            (center.0 + radius * 1.2 * mid.cos()) as i32,
            (center.1 + radius * 1.2 * mid.sin()) as i32,
        );
        area.draw(&Text::new(
            format!("{} ({:.1}%)", label, value / total * 100.0),
            label_pos,
            ("sans-serif", 14)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Center, VPos::Center)),
        ))?;

        angle += sweep;
    }

    root.present()?;
    Ok(())
}

/// Scatter plot, one colored series per group with a legend
pub fn scatter(
    path: &Path,
    size: (u32, u32),
    title: &str,
    x_desc: &str,
    y_desc: &str,
    series: &[Series],
) -> Result<()> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let points = series.iter().flat_map(|s| s.points.iter().copied());
    let (x_lo, x_hi, y_lo, y_hi) = points.fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(xl, xh, yl, yh), (x, y)| (xl.min(x), xh.max(x), yl.min(y), yh.max(y)),
    );
    if !x_lo.is_finite() {
        return no_data(&root, size);
    }
    let (x_lo, x_hi) = padded_range(x_lo, x_hi);
    let (y_lo, y_hi) = padded_range(y_lo, y_hi);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    for s in series.iter().filter(|s| !s.points.is_empty()) {
        let color = s.color;
        chart
            .draw_series(
                s.points
                    .iter()
                    .map(move |&(x, y)| Circle::new((x, y), 4, color.mix(0.6).filled())),
            )?
            .label(s.label.clone())
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SIZE: (u32, u32) = (640, 400);

    #[test]
    fn test_bin_counts() {
        let counts = bin_counts(&[0.0, 0.1, 0.5, 0.9, 1.0], 2, 0.0, 1.0);
        assert_eq!(counts, vec![2, 3]);
        assert_eq!(bin_counts(&[3.0, 3.0], 4, 3.0, 3.0), vec![2, 0, 0, 0]);
    }

    #[test]
    fn test_histogram_with_markers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hist.svg");
        let values: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.37).sin() * 40.0).collect();

        histogram(
            &path,
            SIZE,
            "Latency",
            "ms",
            &values,
            20,
            &[Marker::new("P50", 100.0, RED), Marker::new("P99", 139.0, GREEN)],
        )
        .unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("P99"));
    }

    #[test]
    fn test_empty_inputs_draw_notice() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();

        histogram(&dir.join("h.svg"), SIZE, "t", "x", &[], 10, &[]).unwrap();
        bar_chart(&dir.join("b.svg"), SIZE, "t", "y", &[], None).unwrap();
        box_plot(&dir.join("x.svg"), SIZE, "t", "x", "y", &[("a".into(), vec![])]).unwrap();
        heatmap(&dir.join("m.svg"), SIZE, "t", &[], &[]).unwrap();
        pie_chart(&dir.join("p.svg"), SIZE, "t", &[("a".into(), 0.0)]).unwrap();
        scatter(&dir.join("s.svg"), SIZE, "t", "x", "y", &[]).unwrap();

        for name in ["h.svg", "b.svg", "x.svg", "m.svg", "p.svg", "s.svg"] {
            let svg = fs::read_to_string(dir.join(name)).unwrap();
            assert!(svg.contains("No data"), "{name} missing notice");
        }
    }

    #[test]
    fn test_all_chart_kinds_render() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();

        let bars = vec![
            Bar { label: "Health".into(), value: 0.8, count: Some(5) },
            Bar { label: "Law".into(), value: 0.4, count: Some(3) },
        ];
        bar_chart(&dir.join("bars.svg"), SIZE, "Accuracy", "Accuracy", &bars, Some(1.0)).unwrap();

        let groups = vec![
            ("joy".to_string(), vec![0.8, 0.9, 0.7, 0.95]),
            ("fear".to_string(), vec![0.5]),
        ];
        box_plot(&dir.join("box.svg"), SIZE, "Scores", "Emotion", "Score", &groups).unwrap();

        let labels = vec!["a".to_string(), "b".to_string()];
        heatmap(&dir.join("cm.svg"), SIZE, "Confusion Matrix", &labels, &[vec![3, 1], vec![0, 4]]).unwrap();

        let slices = vec![("Parsing".to_string(), 10.0), ("Generation".to_string(), 30.0)];
        pie_chart(&dir.join("pie.svg"), SIZE, "Components", &slices).unwrap();

        let series = vec![Series {
            label: "Cache hit".into(),
            points: vec![(10.0, 1.0), (20.0, 2.0)],
            color: palette(2),
        }];
        scatter(&dir.join("scatter.svg"), SIZE, "Impact", "len", "ms", &series).unwrap();

        let pie = fs::read_to_string(dir.join("pie.svg")).unwrap();
        assert!(pie.contains("75.0%"));
        let cm = fs::read_to_string(dir.join("cm.svg")).unwrap();
        assert!(cm.contains("Predicted"));
    }

    #[test]
    fn test_blues_scale() {
        let lo = blues(0.0);
        let hi = blues(1.0);
        assert!(lo.0 > 200 && lo.2 == 255);
        assert!(hi.0 < 20 && hi.2 > 100);
    }
}
