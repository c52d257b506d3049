//! SVG rendering of a [`ChartSpec`]

use crate::chart::{ChartSpec, Series};
use crate::config::ChartKind;

const BAR_WIDTH: f64 = 40.0;
const BAR_GAP: f64 = 6.0;
const CATEGORY_GAP: f64 = 30.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 90.0;
const LEGEND_WIDTH: f64 = 200.0;
const PLOT_HEIGHT: f64 = 360.0;
const TICKS: usize = 5;
/// Headroom above the tallest series for annotation text
const HEADROOM: f64 = 1.15;

/// Escape text for use inside SVG/HTML
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render the chart as a standalone SVG document
pub fn render(chart: &ChartSpec) -> String {
    let plot_width = plot_width(chart);
    let width = MARGIN_LEFT + plot_width + LEGEND_WIDTH;
    let height = MARGIN_TOP + PLOT_HEIGHT + MARGIN_BOTTOM;

    let lowest = chart
        .series
        .iter()
        .map(|s| bottom(s, chart.kind))
        .filter(|y| y.is_finite())
        .fold(0.0_f64, f64::min);
    let highest = if chart.y_max > 0.0 { chart.y_max * HEADROOM } else { 1.0 };
    let span = (highest - lowest).max(f64::EPSILON);
    let y_px = |v: f64| MARGIN_TOP + PLOT_HEIGHT - (v - lowest) / span * PLOT_HEIGHT;

    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {:.0} {:.0}" width="{:.0}" height="{:.0}" style="font-family: Arial, sans-serif;">
  <defs>
    <style>
      .title {{ font-size: 16px; font-weight: bold; }}
      .axis-title {{ font-size: 12px; }}
      .tick {{ font-size: 10px; fill: #666; }}
      .label {{ font-size: 10px; }}
      .annotation {{ font-size: 13px; font-weight: bold; }}
    </style>
  </defs>
  <rect width="100%" height="100%" fill="white"/>
  <text x="{:.1}" y="28" class="title" text-anchor="middle">{}</text>
"##,
        width,
        height,
        width,
        height,
        MARGIN_LEFT + plot_width / 2.0,
        escape(&chart.title)
    );

    // Value axis with gridlines
    let axis_x = MARGIN_LEFT;
    svg.push_str(&format!(
        "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#333\"/>\n",
        axis_x,
        MARGIN_TOP,
        axis_x,
        MARGIN_TOP + PLOT_HEIGHT
    ));
    for i in 0..=TICKS {
        let v = lowest + span * i as f64 / TICKS as f64;
        let y = y_px(v);
        svg.push_str(&format!(
            "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#eee\"/>\n",
            axis_x,
            y,
            axis_x + plot_width,
            y
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"tick\" text-anchor=\"end\">{}</text>\n",
            axis_x - 6.0,
            y + 3.0,
            format_tick(v)
        ));
    }
    let zero = y_px(0.0);
    svg.push_str(&format!(
        "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#333\"/>\n",
        axis_x,
        zero,
        axis_x + plot_width,
        zero
    ));
    svg.push_str(&format!(
        "  <text transform=\"translate({:.1},{:.1}) rotate(-90)\" class=\"axis-title\" text-anchor=\"middle\">{}</text>\n",
        axis_x - 50.0,
        MARGIN_TOP + PLOT_HEIGHT / 2.0,
        escape(&chart.y_axis_title)
    ));

    // Series
    let positions = series_positions(chart);
    for (series, &cx) in chart.series.iter().zip(positions.iter()) {
        match chart.kind {
            ChartKind::Bar => draw_bar(&mut svg, series, cx, &y_px, zero),
            ChartKind::Box => draw_box(&mut svg, series, cx, &y_px),
        }
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"label\" text-anchor=\"end\" transform=\"rotate(-35 {:.1} {:.1})\">{}</text>\n",
            cx,
            MARGIN_TOP + PLOT_HEIGHT + 14.0,
            cx,
            MARGIN_TOP + PLOT_HEIGHT + 14.0,
            escape(&series.x)
        ));
    }

    for annotation in &chart.annotations {
        if let Some(&cx) = positions.get(annotation.series) {
            svg.push_str(&format!(
                "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"annotation\" text-anchor=\"middle\">{}</text>\n",
                cx,
                y_px(annotation.y),
                escape(&annotation.text)
            ));
        }
    }

    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"axis-title\" text-anchor=\"middle\">{}</text>\n",
        MARGIN_LEFT + plot_width / 2.0,
        height - 12.0,
        escape(&chart.x_axis_title)
    ));

    // Legend
    let legend_x = MARGIN_LEFT + plot_width + 20.0;
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"axis-title\">{}</text>\n",
        legend_x,
        MARGIN_TOP,
        escape(&chart.legend_title)
    ));
    for (i, series) in chart.series.iter().enumerate() {
        let y = MARGIN_TOP + 16.0 + i as f64 * 16.0;
        svg.push_str(&format!(
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"10\" height=\"10\" fill=\"{}\"/>\n",
            legend_x,
            y - 9.0,
            escape(&series.color)
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" class=\"label\">{}</text>\n",
            legend_x + 16.0,
            y,
            escape(&series.name)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

fn plot_width(chart: &ChartSpec) -> f64 {
    let bars = chart.series.len() as f64;
    let gaps = chart.categories.len() as f64;
    (bars * (BAR_WIDTH + BAR_GAP) + gaps * CATEGORY_GAP).max(200.0)
}

/// Horizontal center of each series, with extra space between categories
fn series_positions(chart: &ChartSpec) -> Vec<f64> {
    let mut x = MARGIN_LEFT + CATEGORY_GAP / 2.0;
    let mut previous: Option<usize> = None;
    chart
        .series
        .iter()
        .map(|s| {
            if previous.is_some_and(|p| p != s.offset_group) {
                x += CATEGORY_GAP;
            }
            previous = Some(s.offset_group);
            let center = x + BAR_WIDTH / 2.0;
            x += BAR_WIDTH + BAR_GAP;
            center
        })
        .collect()
}

fn bottom(series: &Series, kind: ChartKind) -> f64 {
    match kind {
        ChartKind::Bar => series.mean - series.error,
        ChartKind::Box => series.box_stats.min,
    }
}

fn draw_bar(svg: &mut String, series: &Series, cx: f64, y_px: &impl Fn(f64) -> f64, zero: f64) {
    let top = y_px(series.mean);
    let (y, h) = if top < zero { (top, zero - top) } else { (zero, top - zero) };
    svg.push_str(&format!(
        "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\"><title>{}: {:.3} ± {:.3}</title></rect>\n",
        cx - BAR_WIDTH / 2.0,
        y,
        BAR_WIDTH,
        h,
        escape(&series.color),
        escape(&series.name),
        series.mean,
        series.error
    ));

    if series.error > 0.0 {
        let hi = y_px(series.mean + series.error);
        let lo = y_px(series.mean - series.error);
        let cap = BAR_WIDTH / 4.0;
        svg.push_str(&format!(
            "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"black\"/>\n",
            cx, hi, cx, lo
        ));
        for y in [hi, lo] {
            svg.push_str(&format!(
                "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"black\"/>\n",
                cx - cap,
                y,
                cx + cap,
                y
            ));
        }
    }
}

fn draw_box(svg: &mut String, series: &Series, cx: f64, y_px: &impl Fn(f64) -> f64) {
    let b = &series.box_stats;
    let half = BAR_WIDTH / 2.0;
    let (q3, q1) = (y_px(b.q3), y_px(b.q1));
    svg.push_str(&format!(
        "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"black\"/>\n",
        cx,
        y_px(b.max),
        cx,
        y_px(b.min)
    ));
    svg.push_str(&format!(
        "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\" stroke=\"black\"><title>{}: median {:.3}</title></rect>\n",
        cx - half,
        q3,
        BAR_WIDTH,
        (q1 - q3).max(1.0),
        escape(&series.color),
        escape(&series.name),
        b.median
    ));
    let median = y_px(b.median);
    svg.push_str(&format!(
        "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"white\" stroke-width=\"2\"/>\n",
        cx - half,
        median,
        cx + half,
        median
    ));
}

fn format_tick(v: f64) -> String {
    if v.abs() >= 100.0 || v == v.trunc() {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}
