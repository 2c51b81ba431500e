//! Columnar trip table: the working representation of the pipeline.
//!
//! Samples are flattened to parallel column vectors, sorted by
//! `(tripId, timestamp)`, and processed per trip as contiguous slices. NaN
//! stands in for missing values everywhere. Row alignment is positional;
//! every filter goes through [`TripTable::retain`] so the columns never go
//! out of step.

use chrono::{DateTime, Utc};
use fleetfuel_core::types::SampleRow;

/// Sorted, flattened sample columns for one or more trips.
#[derive(Debug, Clone, Default)]
pub struct TripTable {
    pub trip_id: Vec<String>,
    pub timestamp: Vec<DateTime<Utc>>,
    /// Epoch seconds, fractional milliseconds preserved.
    pub t_s: Vec<f64>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub alt: Vec<f64>,
    pub obd_kmh: Vec<f64>,
    pub rpm: Vec<f64>,
    pub throttle: Vec<f64>,
    pub coolant: Vec<f64>,
    pub intake: Vec<f64>,
    pub fuel: Vec<f64>,
}

impl TripTable {
    /// Step 1: drop rows without position, then sort by `(tripId, timestamp)`.
    ///
    /// Timestamps and trip ids are total on `SampleRow`, so position is the
    /// only missing-field drop left to apply here. The sort is stable: ties
    /// keep their incoming order.
    pub fn normalize(rows: Vec<SampleRow>) -> Self {
        let mut rows: Vec<SampleRow> = rows
            .into_iter()
            .filter(|row| !row.latitude.is_nan() && !row.longitude.is_nan())
            .collect();
        rows.sort_by(|a, b| {
            a.trip_id
                .cmp(&b.trip_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut table = TripTable::default();
        for row in rows {
            table.t_s.push(row.timestamp.timestamp_millis() as f64 / 1000.0);
            table.trip_id.push(row.trip_id);
            table.timestamp.push(row.timestamp);
            table.lat.push(row.latitude);
            table.lon.push(row.longitude);
            table.alt.push(row.altitude);
            table.obd_kmh.push(row.vehicle_speed);
            table.rpm.push(row.engine_rpm);
            table.throttle.push(row.accelerator_position);
            table.coolant.push(row.coolant_temp);
            table.intake.push(row.intake_temp);
            table.fuel.push(row.fuel_rate);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.trip_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trip_id.is_empty()
    }

    /// Contiguous `(start, end)` ranges of each trip, in table order.
    pub fn trip_bounds(&self) -> Vec<(usize, usize)> {
        let mut bounds = Vec::new();
        let n = self.len();
        let mut start = 0;
        for i in 1..=n {
            if i == n || self.trip_id[i] != self.trip_id[start] {
                bounds.push((start, i));
                start = i;
            }
        }
        bounds
    }

    /// Inter-sample time deltas in seconds; NaN at each trip's first row.
    pub fn trip_dt(&self) -> Vec<f64> {
        let mut dt = vec![f64::NAN; self.len()];
        for (start, end) in self.trip_bounds() {
            for i in start + 1..end {
                dt[i] = self.t_s[i] - self.t_s[i - 1];
            }
        }
        dt
    }

    /// Keep rows where `mask` is true. Applies to every column.
    pub fn retain(&mut self, mask: &[bool]) {
        retain_rows(&mut self.trip_id, mask);
        retain_rows(&mut self.timestamp, mask);
        retain_rows(&mut self.t_s, mask);
        retain_rows(&mut self.lat, mask);
        retain_rows(&mut self.lon, mask);
        retain_rows(&mut self.alt, mask);
        retain_rows(&mut self.obd_kmh, mask);
        retain_rows(&mut self.rpm, mask);
        retain_rows(&mut self.throttle, mask);
        retain_rows(&mut self.coolant, mask);
        retain_rows(&mut self.intake, mask);
        retain_rows(&mut self.fuel, mask);
    }
}

/// Mask-compaction shared by the table and the derived columns.
pub fn retain_rows<T>(column: &mut Vec<T>, mask: &[bool]) {
    let mut keep = mask.iter();
    column.retain(|_| *keep.next().unwrap_or(&false));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(trip: &str, ms: i64, lat: f64) -> SampleRow {
        SampleRow {
            trip_id: trip.into(),
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
            latitude: lat,
            longitude: 0.0,
            altitude: f64::NAN,
            vehicle_speed: f64::NAN,
            engine_rpm: f64::NAN,
            accelerator_position: f64::NAN,
            coolant_temp: f64::NAN,
            intake_temp: f64::NAN,
            fuel_rate: f64::NAN,
        }
    }

    #[test]
    fn normalize_sorts_and_drops_unpositioned_rows() {
        let rows = vec![
            row("b", 2_000, 1.0),
            row("a", 1_000, 1.0),
            row("a", 500, f64::NAN),
            row("a", 0, 1.0),
        ];
        let table = TripTable::normalize(rows);
        assert_eq!(table.len(), 3);
        assert_eq!(table.trip_id, vec!["a", "a", "b"]);
        assert_eq!(table.t_s, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn trip_bounds_are_contiguous() {
        let rows = vec![
            row("a", 0, 1.0),
            row("a", 1_000, 1.0),
            row("b", 0, 1.0),
            row("c", 0, 1.0),
        ];
        let table = TripTable::normalize(rows);
        assert_eq!(table.trip_bounds(), vec![(0, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn trip_dt_restarts_per_trip() {
        let rows = vec![
            row("a", 0, 1.0),
            row("a", 2_000, 1.0),
            row("b", 10_000, 1.0),
            row("b", 10_500, 1.0),
        ];
        let table = TripTable::normalize(rows);
        let dt = table.trip_dt();
        assert!(dt[0].is_nan());
        assert_eq!(dt[1], 2.0);
        assert!(dt[2].is_nan());
        assert_eq!(dt[3], 0.5);
    }

    #[test]
    fn retain_keeps_columns_aligned() {
        let rows = vec![row("a", 0, 1.0), row("a", 1_000, 2.0), row("a", 2_000, 3.0)];
        let mut table = TripTable::normalize(rows);
        table.retain(&[true, false, true]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lat, vec![1.0, 3.0]);
        assert_eq!(table.t_s, vec![0.0, 2.0]);
    }
}
