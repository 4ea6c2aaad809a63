use crate::models::Timeline;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const THAI_MONTHS: [&str; 12] = [
    "ม.ค.", "ก.พ.", "มี.ค.", "เม.ย.", "พ.ค.", "มิ.ย.", "ก.ค.", "ส.ค.", "ก.ย.", "ต.ค.", "พ.ย.",
    "ธ.ค.",
];

const BUDDHIST_ERA_OFFSET: i32 = 543;

const WEIGHT_COLOR: &str = "#667eea";
const BMI_COLOR: &str = "#764ba2";
const SYS_COLOR: &str = "#dc3545";
const DIA_COLOR: &str = "#007bff";
const SPO2_COLOR: &str = "#20c997";
const SUGAR_COLOR: &str = "#fd7e14";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Weight,
    Bmi,
    BloodPressure,
    Spo2,
    Sugar,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::Weight,
        ChartKind::Bmi,
        ChartKind::BloodPressure,
        ChartKind::Spo2,
        ChartKind::Sugar,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: &'static str,
    pub data: Vec<Option<f64>>,
    pub border_color: &'static str,
    pub background_color: String,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub y_axis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_band: Option<Band>,
}

/// A drawn chart. Whoever holds the handle owns the chart and must hand it
/// back to [`render_chart`] (or call [`ChartHandle::dispose`]) before drawing
/// the same chart again.
#[derive(Debug, PartialEq)]
pub struct ChartHandle {
    revision: u32,
    spec: ChartSpec,
}

impl ChartHandle {
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn spec(&self) -> &ChartSpec {
        &self.spec
    }

    /// Releases the chart and returns the revision it was drawn at.
    pub fn dispose(self) -> u32 {
        debug!(kind = ?self.spec.kind, revision = self.revision, "disposing chart");
        self.revision
    }
}

#[derive(Debug, PartialEq)]
pub enum ChartRender {
    Drawn(ChartHandle),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub kind: ChartKind,
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<ChartSpec>,
}

pub fn render_chart(
    previous: Option<ChartHandle>,
    kind: ChartKind,
    timeline: &Timeline,
) -> ChartRender {
    let revision = previous.map(ChartHandle::dispose).unwrap_or(0) + 1;
    match chart_spec(kind, timeline) {
        Some(spec) => ChartRender::Drawn(ChartHandle { revision, spec }),
        None => ChartRender::Empty,
    }
}

/// Owns the handles of every chart on the dashboard.
#[derive(Debug, Default)]
pub struct ChartBoard {
    handles: BTreeMap<ChartKind, ChartHandle>,
}

impl ChartBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_all(&mut self, timeline: &Timeline) {
        for kind in ChartKind::ALL {
            let previous = self.handles.remove(&kind);
            if let ChartRender::Drawn(handle) = render_chart(previous, kind, timeline) {
                self.handles.insert(kind, handle);
            }
        }
    }

    pub fn handle(&self, kind: ChartKind) -> Option<&ChartHandle> {
        self.handles.get(&kind)
    }

    pub fn views(&self) -> Vec<ChartView> {
        ChartKind::ALL
            .iter()
            .map(|kind| {
                let spec = self.handles.get(kind).map(|handle| handle.spec.clone());
                ChartView {
                    kind: *kind,
                    empty: spec.is_none(),
                    spec,
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        for (_, handle) in std::mem::take(&mut self.handles) {
            handle.dispose();
        }
    }
}

fn chart_spec(kind: ChartKind, timeline: &Timeline) -> Option<ChartSpec> {
    let spec = match kind {
        ChartKind::Weight => {
            let series = &timeline.weight_bmi;
            ChartSpec {
                kind,
                labels: labels(series.iter().map(|r| r.date.as_str())),
                datasets: vec![dataset(
                    "น้ำหนัก (kg)",
                    WEIGHT_COLOR,
                    true,
                    series.iter().map(|r| r.weight),
                )],
                y_axis: axis("kg"),
                normal_band: None,
            }
        }
        ChartKind::Bmi => {
            let series = &timeline.weight_bmi;
            ChartSpec {
                kind,
                labels: labels(series.iter().map(|r| r.date.as_str())),
                datasets: vec![dataset("BMI", BMI_COLOR, true, series.iter().map(|r| r.bmi))],
                y_axis: axis("BMI"),
                normal_band: Some(Band { min: 18.5, max: 24.9 }),
            }
        }
        ChartKind::BloodPressure => {
            let series = &timeline.blood_pressure;
            ChartSpec {
                kind,
                labels: labels(series.iter().map(|r| r.date.as_str())),
                datasets: vec![
                    dataset("SYS (ตัวบน)", SYS_COLOR, false, series.iter().map(|r| r.sys)),
                    dataset("DIA (ตัวล่าง)", DIA_COLOR, false, series.iter().map(|r| r.dia)),
                ],
                y_axis: axis("mmHg"),
                normal_band: None,
            }
        }
        ChartKind::Spo2 => {
            let series = &timeline.o2;
            ChartSpec {
                kind,
                labels: labels(series.iter().map(|r| r.date.as_str())),
                datasets: vec![dataset(
                    "SpO2 (%)",
                    SPO2_COLOR,
                    true,
                    series.iter().map(|r| r.spo2),
                )],
                y_axis: Axis {
                    title: "%",
                    min: Some(90.0),
                    max: Some(100.0),
                },
                normal_band: None,
            }
        }
        ChartKind::Sugar => {
            let series = &timeline.sugar;
            ChartSpec {
                kind,
                labels: labels(series.iter().map(|r| r.date.as_str())),
                datasets: vec![dataset(
                    "น้ำตาล (mg/dL)",
                    SUGAR_COLOR,
                    true,
                    series.iter().map(|r| r.sugar),
                )],
                y_axis: axis("mg/dL"),
                normal_band: None,
            }
        }
    };

    if spec.labels.is_empty() {
        return None;
    }
    Some(spec)
}

fn labels<'a>(dates: impl Iterator<Item = &'a str>) -> Vec<String> {
    dates.map(format_date_label).collect()
}

fn dataset(
    label: &'static str,
    color: &'static str,
    fill: bool,
    values: impl Iterator<Item = Option<f64>>,
) -> Dataset {
    Dataset {
        label,
        data: values.collect(),
        border_color: color,
        background_color: hex_to_rgba(color, 0.1).unwrap_or_else(|| color.to_string()),
        fill,
    }
}

fn axis(title: &'static str) -> Axis {
    Axis {
        title,
        min: None,
        max: None,
    }
}

/// Formats a timeline date for the chart x-axis.
///
/// `YYYY` becomes a Buddhist-era year, `YYYY-MM` a Thai month abbreviation
/// followed by the year, and `YYYY-MM-DD` becomes `day/month`. Anything else
/// is returned unchanged.
pub fn format_date_label(date: &str) -> String {
    let parts: Vec<&str> = date.split('-').collect();
    let label = match parts.as_slice() {
        [year] => year
            .parse::<i32>()
            .ok()
            .and_then(|year| year.checked_add(BUDDHIST_ERA_OFFSET))
            .map(|year| format!("พ.ศ. {year}")),
        [year, month] if year.parse::<u32>().is_ok() => month
            .parse::<usize>()
            .ok()
            .filter(|month| (1..=12).contains(month))
            .map(|month| format!("{} {year}", THAI_MONTHS[month - 1])),
        [_, month, day] => match (day.parse::<u32>(), month.parse::<u32>()) {
            (Ok(day), Ok(month)) => Some(format!("{day}/{month}")),
            _ => None,
        },
        _ => None,
    };

    label.unwrap_or_else(|| date.to_string())
}

pub fn hex_to_rgba(hex: &str, alpha: f64) -> Option<String> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    let (r, g, b) = (channel(0..2)?, channel(2..4)?, channel(4..6)?);
    Some(format!("rgba({r}, {g}, {b}, {alpha})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BodyReading, PressureReading};

    #[test]
    fn date_labels_by_granularity() {
        assert_eq!(format_date_label("2024-03-15"), "15/3");
        assert_eq!(format_date_label("2024-03"), "มี.ค. 2024");
        assert_eq!(format_date_label("2024"), "พ.ศ. 2567");
        assert_eq!(format_date_label("2024-12"), "ธ.ค. 2024");
        assert_eq!(format_date_label("2024-01-05"), "5/1");
    }

    #[test]
    fn unexpected_dates_pass_through() {
        assert_eq!(format_date_label(""), "");
        assert_eq!(format_date_label("2024-13"), "2024-13");
        assert_eq!(format_date_label("2024-03-15-01"), "2024-03-15-01");
        assert_eq!(format_date_label("today"), "today");
        assert_eq!(format_date_label("2147483647"), "2147483647");
        assert_eq!(format_date_label("-"), "-");
    }

    #[test]
    fn hex_colors_convert_to_rgba() {
        assert_eq!(
            hex_to_rgba("#667eea", 0.1).as_deref(),
            Some("rgba(102, 126, 234, 0.1)")
        );
        assert_eq!(hex_to_rgba("667eea", 0.1), None);
        assert_eq!(hex_to_rgba("#zzzzzz", 0.1), None);
    }

    #[test]
    fn empty_series_renders_nothing_and_disposes_previous() {
        let timeline = Timeline {
            weight_bmi: vec![BodyReading {
                date: "2024-03-01".to_string(),
                weight: Some(70.0),
                height: Some(170.0),
                bmi: Some(24.2),
            }],
            ..Timeline::default()
        };

        let first = match render_chart(None, ChartKind::Weight, &timeline) {
            ChartRender::Drawn(handle) => handle,
            ChartRender::Empty => panic!("weight chart should be drawn"),
        };
        assert_eq!(first.revision(), 1);
        assert_eq!(first.spec().labels, vec!["1/3".to_string()]);

        let second = render_chart(Some(first), ChartKind::Weight, &Timeline::default());
        assert_eq!(second, ChartRender::Empty);
    }

    #[test]
    fn board_rerender_bumps_revision() {
        let timeline = Timeline {
            blood_pressure: vec![PressureReading {
                date: "2024-03".to_string(),
                sys: Some(120.0),
                dia: Some(80.0),
            }],
            ..Timeline::default()
        };

        let mut board = ChartBoard::new();
        board.render_all(&timeline);
        board.render_all(&timeline);

        let handle = board.handle(ChartKind::BloodPressure).unwrap();
        assert_eq!(handle.revision(), 2);
        assert_eq!(handle.spec().datasets.len(), 2);
        assert!(board.handle(ChartKind::Weight).is_none());

        let views = board.views();
        assert_eq!(views.len(), 5);
        assert!(views.iter().filter(|view| !view.empty).count() == 1);

        board.clear();
        assert!(board.handle(ChartKind::BloodPressure).is_none());
    }
}
