//! Converts the reading collection into chart-ready points.

use chrono::FixedOffset;
use serde::Serialize;

use crate::models::{ChartPoint, WaterReading};

// ---

/// Produce chart points from `readings`, oldest first.
///
/// Readings without a finite water level are skipped. Labels are `HH:MM` in
/// `offset`; values are the level rounded to the nearest integer. The source
/// slice is never touched, and the returned iterator can be cloned to walk
/// the same points again.
pub fn chart_points<'a>(
    readings: &'a [WaterReading],
    offset: FixedOffset,
) -> impl Iterator<Item = ChartPoint> + Clone + 'a {
    // ---
    let mut valid: Vec<(&'a WaterReading, f64)> = readings
        .iter()
        .filter_map(|r| r.water_level.filter(|l| l.is_finite()).map(|l| (r, l)))
        .collect();

    // Stable, so equal timestamps keep collection order
    valid.sort_by_key(|(r, _)| r.reading_time);

    valid.into_iter().map(move |(r, level)| ChartPoint {
        label: r.reading_time.with_timezone(&offset).format("%H:%M").to_string(),
        value: level.round() as i64,
    })
}

/// Headline numbers shown next to the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSummary {
    pub latest: i64,
    pub min: i64,
    pub max: i64,
}

/// Summarise a point sequence; `None` when there is nothing to chart.
pub fn summarize<I>(points: I) -> Option<ChartSummary>
where
    I: IntoIterator<Item = ChartPoint>,
{
    // ---
    points.into_iter().fold(None, |acc, p| match acc {
        None => Some(ChartSummary {
            latest: p.value,
            min: p.value,
            max: p.value,
        }),
        Some(s) => Some(ChartSummary {
            latest: p.value,
            min: s.min.min(p.value),
            max: s.max.max(p.value),
        }),
    })
}
