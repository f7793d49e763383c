//! The transport driver.
//!
//! Real traffic is pulled from an [`Application`] one tick at a time and
//! queued per stream. At each decision the configured policy announces a
//! DP-safe size per stream; real bytes up to that size leave the queue and
//! anything beyond the backlog is padding.

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dp_transport_accounting::{
    advanced_composition, calculate_privacy_loss, default_alphas, solve_noise_multiplier,
    PrivacyLoss,
};
use dp_transport_core::{
    dataset_sensitivity, ByteMatrix, DpError, GaussianMechanism, Label, LaplaceMechanism,
    Mechanism, NoiseMechanism, Queue, RdpGaussianMechanism, Result, TrafficMatrix,
};

use crate::application::Application;
use crate::budget_absorption::BudgetAbsorption;
use crate::config::{MechanismKind, PrivacyParameter, TransportConfig, TransportType};
use crate::fpa::{default_coefficients, rfft_bins, FourierPerturbation};

/// Generator for one stream: the run seed on ChaCha stream `stream`.
///
/// Streams never share generator state, so results do not depend on the
/// order streams are visited in.
pub fn stream_rng(seed: u64, stream: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream as u64);
    rng
}

/// Run-level facts, serializable for experiment logs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Transport mode.
    pub transport_type: TransportType,
    /// Noise mechanism.
    pub mechanism: MechanismKind,
    /// Number of streams.
    pub streams: usize,
    /// Ticks simulated, including drain ticks.
    pub ticks: usize,
    /// Published values per stream.
    pub decisions: usize,
    /// Decisions made after the source was exhausted.
    pub drain_intervals: usize,
    /// Sensitivity the noise was calibrated to.
    pub sensitivity: f64,
    /// Noise multiplier in effect, for `Gaussian_rdp`.
    pub noise_multiplier: Option<f64>,
    /// Epsilon per query, when configured that way.
    pub epsilon_per_query: Option<f64>,
    /// Queries charged to the composition window.
    pub composition_queries: u64,
    /// Total real bytes.
    pub total_original: f64,
    /// Total announced bytes.
    pub total_published: f64,
    /// Total padding bytes.
    pub total_dummy: f64,
}

impl RunSummary {
    /// Composed RDP privacy loss of a dynamic `Gaussian_rdp` run.
    pub fn privacy_spent(&self, delta: f64) -> Result<Option<PrivacyLoss>> {
        match (self.transport_type, self.noise_multiplier) {
            (TransportType::Dynamic, Some(nm)) => {
                calculate_privacy_loss(self.composition_queries, &default_alphas(), nm, delta)
                    .map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Advanced-composition epsilon of a dynamic Laplace run.
    pub fn advanced_composition_epsilon(&self, delta: f64) -> Option<f64> {
        match (self.transport_type, self.mechanism, self.epsilon_per_query) {
            (TransportType::Dynamic, MechanismKind::Laplace, Some(eps)) => {
                Some(advanced_composition(eps, delta, self.composition_queries))
            }
            _ => None,
        }
    }

    /// Padding relative to real traffic.
    pub fn relative_overhead(&self) -> f64 {
        if self.total_original == 0.0 {
            return 0.0;
        }
        (self.total_published - self.total_original) / self.total_original
    }

    /// Serialize as JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DpError::invalid(format!("cannot serialize run summary: {e}")))
    }
}

/// Output of a transport run.
#[derive(Clone, Debug)]
pub struct ShapedTraffic {
    /// Stream labels in row order.
    pub labels: Vec<Label>,
    /// Input byte counts.
    pub original: ByteMatrix,
    /// Announced byte counts, one column per decision.
    pub published: ByteMatrix,
    /// Real bytes delivered at each decision.
    pub delivered: ByteMatrix,
    /// Padding at each decision.
    pub dummy: ByteMatrix,
    /// Publication epsilon per tick (wPrivacy runs only).
    pub assigned_epsilons: Option<ByteMatrix>,
    /// Run-level facts.
    pub summary: RunSummary,
}

/// Per-stream state owned by the engine for one run.
#[derive(Debug)]
struct StreamState {
    queue: Queue,
    rng: ChaCha8Rng,
    published: Vec<f64>,
    delivered: Vec<f64>,
    dummy: Vec<f64>,
}

impl StreamState {
    fn new(capacity: f64, seed: u64, index: usize) -> Result<Self> {
        Ok(Self {
            queue: Queue::new(capacity, 0.0)?,
            rng: stream_rng(seed, index),
            published: Vec::new(),
            delivered: Vec::new(),
            dummy: Vec::new(),
        })
    }

    /// Dequeue the announced size and book any excess as padding.
    fn reconcile(&mut self, published: f64) {
        let backlog = self.queue.size();
        let (delivered, dummy) = if published > backlog {
            self.queue.dequeue(backlog);
            (backlog, published - backlog)
        } else {
            self.queue.dequeue(published);
            (published, 0.0)
        };
        self.published.push(published);
        self.delivered.push(delivered);
        self.dummy.push(dummy);
    }
}

#[derive(Debug, Default)]
struct LoopStats {
    ticks: usize,
    decisions: usize,
    drain_intervals: usize,
}

/// Runs one configured transport over a traffic matrix.
#[derive(Clone, Debug)]
pub struct TransportEngine {
    config: TransportConfig,
}

impl TransportEngine {
    /// Engine for `config`; validation happens when the series length is known.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Shape `traffic` and return the announced series.
    pub fn run(&self, traffic: &TrafficMatrix) -> Result<ShapedTraffic> {
        let parameter = self.config.validate(traffic.stream_len())?;
        let sensitivity = self
            .config
            .sensitivity
            .unwrap_or_else(|| dataset_sensitivity(traffic.data()));

        info!(
            target: "dp_transport::engine",
            transport = ?self.config.transport_type,
            mechanism = ?self.config.mechanism,
            streams = traffic.num_streams(),
            stream_len = traffic.stream_len(),
            dp_step = self.config.dp_step,
            sensitivity,
            "transport run starting"
        );

        let shaped = match self.config.transport_type {
            TransportType::Dynamic => self.run_dynamic(traffic, parameter, sensitivity)?,
            TransportType::WPrivacy => self.run_wprivacy(traffic, parameter, sensitivity)?,
            TransportType::Static => self.run_static(traffic, parameter, sensitivity)?,
        };

        let summary = &shaped.summary;
        info!(
            target: "dp_transport::engine",
            ticks = summary.ticks,
            decisions = summary.decisions,
            drain_intervals = summary.drain_intervals,
            total_original = summary.total_original,
            total_published = summary.total_published,
            total_dummy = summary.total_dummy,
            "transport run finished"
        );
        Ok(shaped)
    }

    /// Noise mechanism for dynamic mode, plus the noise multiplier in effect.
    pub fn resolve_mechanism(
        &self,
        parameter: PrivacyParameter,
        sensitivity: f64,
    ) -> Result<(Mechanism, Option<f64>)> {
        let delta = self.config.delta;
        match (self.config.mechanism, parameter) {
            (MechanismKind::GaussianRdp, PrivacyParameter::NoiseMultiplier(nm)) => Ok((
                Mechanism::GaussianRdp(RdpGaussianMechanism::new(nm, sensitivity)),
                Some(nm),
            )),
            (MechanismKind::GaussianRdp, PrivacyParameter::EpsilonPerQuery(eps)) => {
                let nm = solve_noise_multiplier(eps, 1, &default_alphas(), delta)?;
                debug!(
                    target: "dp_transport::engine",
                    epsilon_per_query = eps,
                    noise_multiplier = nm,
                    "noise multiplier derived from epsilon"
                );
                Ok((
                    Mechanism::GaussianRdp(RdpGaussianMechanism::new(nm, sensitivity)),
                    Some(nm),
                ))
            }
            (MechanismKind::Gaussian, PrivacyParameter::EpsilonPerQuery(eps)) => Ok((
                Mechanism::Gaussian(GaussianMechanism::new(eps, delta, sensitivity)),
                None,
            )),
            (MechanismKind::Laplace, PrivacyParameter::EpsilonPerQuery(eps)) => Ok((
                Mechanism::Laplace(LaplaceMechanism::new(eps, sensitivity)),
                None,
            )),
            (kind, PrivacyParameter::NoiseMultiplier(_)) => Err(DpError::config(format!(
                "{kind:?} is calibrated by epsilon_per_query, not noise_multiplier"
            ))),
        }
    }

    fn new_streams(&self, count: usize) -> Result<Vec<StreamState>> {
        (0..count)
            .map(|i| StreamState::new(self.config.queue_capacity, self.config.seed, i))
            .collect()
    }

    fn run_dynamic(
        &self,
        traffic: &TrafficMatrix,
        parameter: PrivacyParameter,
        sensitivity: f64,
    ) -> Result<ShapedTraffic> {
        let (mechanism, noise_multiplier) = self.resolve_mechanism(parameter, sensitivity)?;
        let mut streams = self.new_streams(traffic.num_streams())?;

        let stats = self.drive(traffic, &mut streams, self.config.dp_step, |_, stream, backlog| {
            mechanism.privatize(backlog, &mut stream.rng)
        })?;

        let epsilon_per_query = match parameter {
            PrivacyParameter::EpsilonPerQuery(eps) => Some(eps),
            PrivacyParameter::NoiseMultiplier(_) => None,
        };
        let shaped = self.collect(
            traffic,
            streams,
            stats,
            sensitivity,
            noise_multiplier,
            epsilon_per_query,
        )?;

        if let Some(loss) = shaped.summary.privacy_spent(self.config.delta)? {
            info!(
                target: "dp_transport::engine",
                epsilon = loss.epsilon,
                best_alpha = loss.best_alpha,
                delta = self.config.delta,
                queries = shaped.summary.composition_queries,
                "privacy spent over composition window"
            );
        }
        Ok(shaped)
    }

    fn run_wprivacy(
        &self,
        traffic: &TrafficMatrix,
        parameter: PrivacyParameter,
        sensitivity: f64,
    ) -> Result<ShapedTraffic> {
        let epsilon = match parameter {
            PrivacyParameter::EpsilonPerQuery(eps) => eps,
            PrivacyParameter::NoiseMultiplier(_) => {
                return Err(DpError::config("DP_wPrivacy needs epsilon_per_query"))
            }
        };
        let window = self.config.dp_step;
        let window_epsilon = epsilon * window as f64;

        let mut streams = self.new_streams(traffic.num_streams())?;
        let mut trackers = streams
            .iter()
            .map(|_| {
                BudgetAbsorption::new(
                    window,
                    window_epsilon,
                    self.config.decision_publication_ratio,
                    sensitivity,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let stats = self.drive(traffic, &mut streams, 1, |index, stream, backlog| {
            trackers[index].query(backlog, &mut stream.rng)
        })?;

        let assigned: Vec<Vec<f64>> = trackers
            .iter()
            .map(|t| t.assigned_epsilons().to_vec())
            .collect();

        let mut shaped = self.collect(traffic, streams, stats, sensitivity, None, Some(epsilon))?;
        shaped.assigned_epsilons = Some(rows_to_matrix(assigned, shaped.summary.decisions)?);
        Ok(shaped)
    }

    fn run_static(
        &self,
        traffic: &TrafficMatrix,
        parameter: PrivacyParameter,
        sensitivity: f64,
    ) -> Result<ShapedTraffic> {
        let epsilon = match parameter {
            PrivacyParameter::EpsilonPerQuery(eps) => eps,
            PrivacyParameter::NoiseMultiplier(_) => {
                return Err(DpError::config("DP_static needs epsilon_per_query"))
            }
        };
        let len = traffic.stream_len();
        let k = self
            .config
            .fpa_coefficients
            .unwrap_or_else(|| default_coefficients(len))
            .min(rfft_bins(len).max(1));
        let fpa = FourierPerturbation::new(epsilon, sensitivity, k)?;
        debug!(
            target: "dp_transport::engine",
            coefficients = k,
            noise_scale = fpa.noise_scale(),
            "FPA configured"
        );

        let mut published = Vec::with_capacity(traffic.num_streams());
        let mut dummy = Vec::with_capacity(traffic.num_streams());
        let mut delivered = Vec::with_capacity(traffic.num_streams());
        for (i, row) in traffic.data().outer_iter().enumerate() {
            let mut rng = stream_rng(self.config.seed, i);
            let original: Vec<f64> = row.to_vec();
            let shaped = fpa.perturb(&original, &mut rng);
            dummy.push(
                shaped
                    .iter()
                    .zip(&original)
                    .map(|(p, o)| (p - o).max(0.0))
                    .collect::<Vec<f64>>(),
            );
            delivered.push(
                shaped
                    .iter()
                    .zip(&original)
                    .map(|(p, o)| p.min(*o))
                    .collect::<Vec<f64>>(),
            );
            published.push(shaped);
        }

        let published = rows_to_matrix(published, len)?;
        let summary = RunSummary {
            transport_type: TransportType::Static,
            mechanism: self.config.mechanism,
            streams: traffic.num_streams(),
            ticks: len,
            decisions: len,
            drain_intervals: 0,
            sensitivity,
            noise_multiplier: None,
            epsilon_per_query: Some(epsilon),
            composition_queries: 1,
            total_original: traffic.data().sum(),
            total_published: published.sum(),
            total_dummy: dummy.iter().flatten().sum(),
        };
        Ok(ShapedTraffic {
            labels: traffic.labels().to_vec(),
            original: traffic.data().clone(),
            published,
            delivered: rows_to_matrix(delivered, len)?,
            dummy: rows_to_matrix(dummy, len)?,
            assigned_epsilons: None,
            summary,
        })
    }

    /// The tick loop shared by the queue-backed modes.
    ///
    /// `decide` maps a stream's index and backlog to a raw announced size; clamping and
    /// queue reconciliation happen here.
    fn drive<F>(
        &self,
        traffic: &TrafficMatrix,
        streams: &mut [StreamState],
        interval: usize,
        mut decide: F,
    ) -> Result<LoopStats>
    where
        F: FnMut(usize, &mut StreamState, f64) -> f64,
    {
        let mut app = Application::new(traffic);
        let mut stats = LoopStats::default();
        let interval = interval.max(1);
        let (lo, hi) = (self.config.min_dp_size, self.config.max_dp_size);

        if app.is_terminated() {
            return Ok(stats);
        }

        loop {
            if let Some(slot) = app.generate(1) {
                for (stream, amount) in streams.iter_mut().zip(slot.iter()) {
                    stream.queue.enqueue(*amount)?;
                }
            }
            stats.ticks += 1;

            if stats.ticks % interval != 0 {
                continue;
            }

            for (index, stream) in streams.iter_mut().enumerate() {
                let backlog = stream.queue.size();
                let published = decide(index, stream, backlog).clamp(lo, hi);
                stream.reconcile(published);
            }
            stats.decisions += 1;

            if app.is_terminated() {
                if streams.iter().all(|s| s.queue.is_empty()) {
                    break;
                }
                stats.drain_intervals += 1;
                if stats.drain_intervals >= self.config.max_drain_intervals {
                    let remaining: f64 = streams.iter().map(|s| s.queue.size()).sum();
                    warn!(
                        target: "dp_transport::engine",
                        intervals = stats.drain_intervals,
                        remaining_bytes = remaining,
                        "drain limit reached with bytes still queued"
                    );
                    return Err(DpError::DrainLimitExceeded {
                        intervals: stats.drain_intervals,
                    });
                }
            }
        }

        debug!(
            target: "dp_transport::engine",
            ticks = stats.ticks,
            decisions = stats.decisions,
            drain_intervals = stats.drain_intervals,
            "queues drained"
        );
        Ok(stats)
    }

    fn collect(
        &self,
        traffic: &TrafficMatrix,
        streams: Vec<StreamState>,
        stats: LoopStats,
        sensitivity: f64,
        noise_multiplier: Option<f64>,
        epsilon_per_query: Option<f64>,
    ) -> Result<ShapedTraffic> {
        let cols = stats.decisions;
        let mut published = Vec::with_capacity(streams.len());
        let mut delivered = Vec::with_capacity(streams.len());
        let mut dummy = Vec::with_capacity(streams.len());
        for stream in streams {
            published.push(stream.published);
            delivered.push(stream.delivered);
            dummy.push(stream.dummy);
        }
        let published = rows_to_matrix(published, cols)?;
        let delivered = rows_to_matrix(delivered, cols)?;
        let dummy = rows_to_matrix(dummy, cols)?;

        let summary = RunSummary {
            transport_type: self.config.transport_type,
            mechanism: self.config.mechanism,
            streams: traffic.num_streams(),
            ticks: stats.ticks,
            decisions: stats.decisions,
            drain_intervals: stats.drain_intervals,
            sensitivity,
            noise_multiplier,
            epsilon_per_query,
            composition_queries: self.config.composition_queries(traffic.stream_len()),
            total_original: traffic.data().sum(),
            total_published: published.sum(),
            total_dummy: dummy.sum(),
        };

        Ok(ShapedTraffic {
            labels: traffic.labels().to_vec(),
            original: traffic.data().clone(),
            published,
            delivered,
            dummy,
            assigned_epsilons: None,
            summary,
        })
    }
}

fn rows_to_matrix(rows: Vec<Vec<f64>>, cols: usize) -> Result<ByteMatrix> {
    let n_rows = rows.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, cols), flat)
        .map_err(|e| DpError::numerical(format!("ragged shaped output: {e}")))
}
