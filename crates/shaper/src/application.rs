//! Replays a traffic matrix one slice at a time.

use ndarray::{Array1, Axis, Slice};

use dp_transport_core::TrafficMatrix;

/// Lifecycle of an [`Application`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceStatus {
    /// More columns remain.
    Ongoing,
    /// Every column has been handed out.
    Terminated,
}

/// Source that feeds the transport with real traffic.
#[derive(Clone, Debug)]
pub struct Application<'a> {
    traffic: &'a TrafficMatrix,
    cursor: usize,
    status: SourceStatus,
}

impl<'a> Application<'a> {
    /// Start at the first column. An empty matrix starts terminated.
    pub fn new(traffic: &'a TrafficMatrix) -> Self {
        let status = if traffic.stream_len() == 0 {
            SourceStatus::Terminated
        } else {
            SourceStatus::Ongoing
        };
        Self {
            traffic,
            cursor: 0,
            status,
        }
    }

    /// Per-stream byte totals of the next `step` columns.
    ///
    /// The final slice may be shorter than `step`; handing it out terminates
    /// the source. Returns `None` once terminated.
    pub fn generate(&mut self, step: usize) -> Option<Array1<f64>> {
        if self.status == SourceStatus::Terminated {
            return None;
        }
        let len = self.traffic.stream_len();
        let end = self.cursor.saturating_add(step.max(1)).min(len);
        let slot = self
            .traffic
            .data()
            .slice_axis(Axis(1), Slice::from(self.cursor..end))
            .sum_axis(Axis(1));
        self.cursor = end;
        if self.cursor >= len {
            self.status = SourceStatus::Terminated;
        }
        Some(slot)
    }

    /// Current status.
    pub fn status(&self) -> SourceStatus {
        self.status
    }

    /// Whether the source is exhausted.
    pub fn is_terminated(&self) -> bool {
        self.status == SourceStatus::Terminated
    }

    /// Number of streams.
    pub fn num_streams(&self) -> usize {
        self.traffic.num_streams()
    }

    /// Columns in the underlying matrix.
    pub fn stream_len(&self) -> usize {
        self.traffic.stream_len()
    }

    /// Columns handed out so far.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn traffic() -> TrafficMatrix {
        TrafficMatrix::from_rows(
            vec![vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![10.0, 20.0, 30.0, 40.0, 50.0]],
            vec![0, 1],
        )
        .expect("traffic")
    }

    #[test]
    fn walks_columns_in_order() {
        let data = traffic();
        let mut app = Application::new(&data);
        assert_eq!(app.generate(1), Some(array![1.0, 10.0]));
        assert_eq!(app.generate(2), Some(array![5.0, 50.0]));
        assert_eq!(app.status(), SourceStatus::Ongoing);
        assert_eq!(app.position(), 3);
    }

    #[test]
    fn short_final_slice_terminates() {
        let data = traffic();
        let mut app = Application::new(&data);
        assert_eq!(app.generate(3), Some(array![6.0, 60.0]));
        assert_eq!(app.generate(3), Some(array![9.0, 90.0]));
        assert!(app.is_terminated());
        assert_eq!(app.generate(3), None);
    }

    #[test]
    fn every_byte_is_handed_out_once() {
        let data = traffic();
        let mut app = Application::new(&data);
        let mut total = Array1::<f64>::zeros(2);
        while let Some(slot) = app.generate(1) {
            total += &slot;
        }
        assert_eq!(total, data.totals());
    }

    #[test]
    fn empty_matrix_starts_terminated() {
        let data = TrafficMatrix::from_rows(vec![vec![], vec![]], vec![0, 1]).expect("traffic");
        let mut app = Application::new(&data);
        assert!(app.is_terminated());
        assert_eq!(app.generate(1), None);
    }
}
