//! Windowed budget absorption ("wPrivacy").
//!
//! Every window of `w` ticks owns `w_epsilon`. A fixed share goes to a noisy
//! per-tick decision ("has the backlog moved enough?"), the rest to
//! publications. Publication budget left unused by skipped ticks is absorbed
//! by the next publication, which then blocks the ticks it borrowed from.

use rand::Rng;

use dp_transport_core::{laplace_noise, DpError, Result};

/// Where the tracker is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AbsorptionState {
    /// No value published yet; the next query always publishes.
    AwaitingFirstPublication,
    /// At least one publication exists.
    Tracking {
        /// Last published value.
        recent_output: f64,
        /// Tick of the last publication.
        recent_index: u64,
        /// Ticks up to this index are already paid for.
        drained_index: u64,
    },
}

/// Per-stream above-threshold publication policy.
#[derive(Clone, Debug)]
pub struct BudgetAbsorption {
    window: u64,
    publication_epsilon: f64,
    decision_epsilon: f64,
    sensitivity: f64,
    current_index: u64,
    state: AbsorptionState,
    assigned_epsilons: Vec<f64>,
}

impl BudgetAbsorption {
    /// Tracker for windows of `window` ticks sharing `window_epsilon`.
    ///
    /// `decision_ratio` is the share of the budget spent on decisions.
    pub fn new(
        window: usize,
        window_epsilon: f64,
        decision_ratio: f64,
        sensitivity: f64,
    ) -> Result<Self> {
        if window == 0 {
            return Err(DpError::invalid("window must be at least one tick"));
        }
        if !window_epsilon.is_finite() || window_epsilon <= 0.0 {
            return Err(DpError::invalid("window epsilon must be finite and > 0"));
        }
        if !(decision_ratio > 0.0 && decision_ratio < 1.0) {
            return Err(DpError::invalid("decision ratio must lie in (0, 1)"));
        }
        if !sensitivity.is_finite() || sensitivity < 0.0 {
            return Err(DpError::invalid("sensitivity must be finite and >= 0"));
        }

        let w = window as f64;
        Ok(Self {
            window: window as u64,
            publication_epsilon: window_epsilon * (1.0 - decision_ratio) / w,
            decision_epsilon: window_epsilon * decision_ratio / w,
            sensitivity,
            current_index: 0,
            state: AbsorptionState::AwaitingFirstPublication,
            assigned_epsilons: Vec::new(),
        })
    }

    /// Answer one tick's query and advance to the next tick.
    pub fn query<R: Rng + ?Sized>(&mut self, value: f64, rng: &mut R) -> f64 {
        let output = match self.state {
            AbsorptionState::AwaitingFirstPublication => {
                let output = self.publish(value, self.publication_epsilon, rng);
                self.state = AbsorptionState::Tracking {
                    recent_output: output,
                    recent_index: self.current_index,
                    drained_index: self.current_index,
                };
                output
            }
            AbsorptionState::Tracking {
                recent_output,
                drained_index,
                ..
            } => self.track(value, recent_output, drained_index, rng),
        };
        self.current_index += 1;
        output
    }

    fn track<R: Rng + ?Sized>(
        &mut self,
        value: f64,
        recent_output: f64,
        drained_index: u64,
        rng: &mut R,
    ) -> f64 {
        if self.current_index <= drained_index {
            self.assigned_epsilons.push(0.0);
            return recent_output;
        }

        let distance = (recent_output - value).abs()
            + laplace_noise(self.sensitivity / self.decision_epsilon, rng);
        let unused = (self.current_index - drained_index).min(self.window);
        let absorbed = unused as f64 * self.publication_epsilon;

        if distance < 1.0 / absorbed {
            self.assigned_epsilons.push(0.0);
            return recent_output;
        }

        let output = self.publish(value, absorbed, rng);
        self.state = AbsorptionState::Tracking {
            recent_output: output,
            recent_index: self.current_index,
            drained_index: self.current_index + unused - 1,
        };
        output
    }

    fn publish<R: Rng + ?Sized>(&mut self, value: f64, epsilon: f64, rng: &mut R) -> f64 {
        self.assigned_epsilons.push(epsilon);
        value + laplace_noise(self.sensitivity / epsilon, rng)
    }

    /// Publication epsilon per tick.
    pub fn publication_epsilon(&self) -> f64 {
        self.publication_epsilon
    }

    /// Decision epsilon per tick.
    pub fn decision_epsilon(&self) -> f64 {
        self.decision_epsilon
    }

    /// Epsilon spent on publication at every tick so far.
    pub fn assigned_epsilons(&self) -> &[f64] {
        &self.assigned_epsilons
    }

    /// Lifecycle state.
    pub fn state(&self) -> AbsorptionState {
        self.state
    }

    /// Index of the next tick.
    pub fn current_index(&self) -> u64 {
        self.current_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn budget_split() {
        let tracker = BudgetAbsorption::new(4, 2.0, 0.7, 1.0).expect("tracker");
        assert!((tracker.publication_epsilon() - 0.15).abs() < 1e-12);
        assert!((tracker.decision_epsilon() - 0.35).abs() < 1e-12);
    }

    #[test]
    fn first_query_always_publishes() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut tracker = BudgetAbsorption::new(4, 2.0, 0.7, 0.0).expect("tracker");
        assert_eq!(tracker.state(), AbsorptionState::AwaitingFirstPublication);
        assert_eq!(tracker.query(42.0, &mut rng), 42.0);
        assert_eq!(
            tracker.state(),
            AbsorptionState::Tracking {
                recent_output: 42.0,
                recent_index: 0,
                drained_index: 0,
            }
        );
        assert_eq!(tracker.assigned_epsilons(), &[tracker.publication_epsilon()]);
    }

    #[test]
    fn unchanged_value_serves_stale_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut tracker = BudgetAbsorption::new(4, 2.0, 0.7, 0.0).expect("tracker");
        tracker.query(10.0, &mut rng);
        for _ in 0..5 {
            assert_eq!(tracker.query(10.0, &mut rng), 10.0);
        }
        assert_eq!(&tracker.assigned_epsilons()[1..], &[0.0; 5]);
    }

    #[test]
    fn publication_absorbs_skipped_ticks_and_blocks_ahead() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut tracker = BudgetAbsorption::new(4, 2.0, 0.7, 0.0).expect("tracker");
        let pe = tracker.publication_epsilon();
        tracker.query(10.0, &mut rng);
        tracker.query(10.0, &mut rng);
        tracker.query(10.0, &mut rng);
        // Tick 3: two unused ticks plus this one.
        assert_eq!(tracker.query(500.0, &mut rng), 500.0);
        assert!((tracker.assigned_epsilons()[3] - 3.0 * pe).abs() < 1e-12);
        // Ticks 4 and 5 were borrowed.
        assert_eq!(tracker.query(900.0, &mut rng), 500.0);
        assert_eq!(tracker.query(900.0, &mut rng), 500.0);
        assert_eq!(tracker.assigned_epsilons()[4], 0.0);
        assert_eq!(tracker.assigned_epsilons()[5], 0.0);
        assert_eq!(tracker.query(900.0, &mut rng), 900.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(BudgetAbsorption::new(0, 1.0, 0.7, 1.0).is_err());
        assert!(BudgetAbsorption::new(2, 0.0, 0.7, 1.0).is_err());
        assert!(BudgetAbsorption::new(2, 1.0, 1.0, 1.0).is_err());
        assert!(BudgetAbsorption::new(2, 1.0, 0.7, -1.0).is_err());
    }

    proptest! {
        #[test]
        fn spend_never_exceeds_budget(
            values in proptest::collection::vec(0.0f64..1_000.0, 1..120),
            window in 1usize..8,
            seed in any::<u64>(),
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut tracker = BudgetAbsorption::new(window, 1.0, 0.7, 50.0).expect("tracker");
            for v in &values {
                tracker.query(*v, &mut rng);
            }
            let pe = tracker.publication_epsilon();
            let spent = tracker.assigned_epsilons();
            prop_assert_eq!(spent.len(), values.len());

            let total: f64 = spent.iter().sum();
            prop_assert!(total <= values.len() as f64 * pe + 1e-9);

            for chunk in spent.windows(window) {
                let in_window: f64 = chunk.iter().sum();
                prop_assert!(in_window <= window as f64 * pe + 1e-9);
            }
        }
    }
}
