//! Bounded chart history for live readings

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset};

use crate::sample::Sample;
use crate::units::Metric;

/// Number of points kept per chart
pub const DISPLAY_CAPACITY: usize = 100;

/// Fixed-capacity history of one metric, oldest entry evicted first.
///
/// Entries stay in insertion order; timestamps are not compared.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    capacity: usize,
    entries: VecDeque<(DateTime<FixedOffset>, f64)>,
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::with_capacity(DISPLAY_CAPACITY)
    }
}

impl RollingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, timestamp: DateTime<FixedOffset>, value: f64) {
        self.entries.push_back((timestamp, value));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Copy of the current entries, oldest first
    pub fn contents(&self) -> Vec<(DateTime<FixedOffset>, f64)> {
        self.entries.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<(DateTime<FixedOffset>, f64)> {
        self.entries.back().copied()
    }

    /// Points for plotting, x in seconds relative to the newest entry
    pub fn plot_points(&self) -> Vec<[f64; 2]> {
        let Some((newest, _)) = self.latest() else {
            return Vec::new();
        };
        self.contents()
            .into_iter()
            .map(|(ts, value)| [(ts - newest).num_milliseconds() as f64 / 1000.0, value])
            .collect()
    }
}

/// One independent buffer per metric
#[derive(Debug, Clone, Default)]
pub struct MetricBuffers {
    glucose: RollingBuffer,
    ph: RollingBuffer,
    oxygen: RollingBuffer,
}

impl MetricBuffers {
    /// Append the (timestamp, value) projection of a sample to each buffer
    pub fn push_sample(&mut self, sample: &Sample) {
        for metric in Metric::ALL {
            self.get_mut(metric).append(sample.timestamp, sample.value(metric));
        }
    }

    pub fn get(&self, metric: Metric) -> &RollingBuffer {
        match metric {
            Metric::Glucose => &self.glucose,
            Metric::Ph => &self.ph,
            Metric::Oxygen => &self.oxygen,
        }
    }

    fn get_mut(&mut self, metric: Metric) -> &mut RollingBuffer {
        match metric {
            Metric::Glucose => &mut self.glucose,
            Metric::Ph => &mut self.ph,
            Metric::Oxygen => &mut self.oxygen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(second: i64) -> DateTime<FixedOffset> {
        (Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap() + Duration::seconds(second)).fixed_offset()
    }

    #[test]
    fn test_keeps_last_hundred_in_order() {
        let mut buffer = RollingBuffer::default();
        for i in 0..250 {
            buffer.append(at(i), i as f64);
        }

        let contents = buffer.contents();
        assert_eq!(contents.len(), DISPLAY_CAPACITY);
        let expected: Vec<_> = (150..250).map(|i| (at(i), i as f64)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_below_capacity_keeps_everything() {
        let mut buffer = RollingBuffer::default();
        assert!(buffer.is_empty());
        for i in 0..5 {
            buffer.append(at(i), i as f64 * 2.0);
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.latest(), Some((at(4), 8.0)));
    }

    #[test]
    fn test_insertion_order_not_timestamp_order() {
        let mut buffer = RollingBuffer::with_capacity(3);
        buffer.append(at(10), 1.0);
        buffer.append(at(5), 2.0);
        buffer.append(at(7), 3.0);
        buffer.append(at(1), 4.0);
        let values: Vec<f64> = buffer.contents().into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut buffer = RollingBuffer::with_capacity(0);
        buffer.append(at(0), 1.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_metric_buffers_are_independent() {
        let mut buffers = MetricBuffers::default();
        let sample = Sample::new(at(0), 95.0, 7.2, 98.0);
        buffers.push_sample(&sample);
        buffers.push_sample(&Sample::new(at(5), 101.0, 7.1, 97.0));

        assert_eq!(buffers.get(Metric::Glucose).latest(), Some((at(5), 101.0)));
        assert_eq!(buffers.get(Metric::Ph).latest(), Some((at(5), 7.1)));
        assert_eq!(buffers.get(Metric::Oxygen).len(), 2);
        assert_eq!(buffers.get(Metric::Oxygen).plot_points(), vec![[-5.0, 98.0], [0.0, 97.0]]);
    }

    #[test]
    fn test_plot_points_empty() {
        assert!(RollingBuffer::default().plot_points().is_empty());
    }
}
