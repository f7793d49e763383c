use dp_transport::{
    constant_rate, norm_overhead, overhead, pacer, relative_overhead, MechanismKind,
    TrafficMatrix, TransportConfig, TransportEngine, TransportType,
};
use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn bursty_traffic(streams: usize, len: usize, seed: u64) -> TrafficMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..streams)
        .map(|_| {
            (0..len)
                .map(|_| {
                    if rng.gen_bool(0.3) {
                        rng.gen_range(500.0..5_000.0)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();
    TrafficMatrix::from_rows(rows, (0..streams as i64).collect()).expect("traffic")
}

#[test]
fn noiseless_example_matches_backlog() {
    let traffic =
        TrafficMatrix::from_rows(vec![vec![100.0, 0.0, 0.0, 200.0]], vec![7]).expect("traffic");
    let cfg = TransportConfig::from_toml_str(
        r#"
        transport_type = "DP_dynamic"
        DP_mechanism = "Gaussian_rdp"
        sensitivity = 50.0
        noise_multiplier = 0.0
        DP_step = 2
        min_DP_size = 0.0
        max_DP_size = 1000000.0
        "#,
    )
    .expect("config");
    let shaped = TransportEngine::new(cfg).run(&traffic).expect("run");
    assert_eq!(shaped.labels, vec![7]);
    assert_eq!(shaped.published, array![[100.0, 200.0]]);
    assert_eq!(shaped.dummy, array![[0.0, 0.0]]);
}

#[test]
fn every_real_byte_is_delivered() {
    let traffic = bursty_traffic(5, 60, 1);
    let cfg = TransportConfig {
        sensitivity: Some(1_000.0),
        noise_multiplier: Some(2.0),
        dp_step: 3,
        seed: 99,
        ..TransportConfig::default()
    };
    let shaped = TransportEngine::new(cfg).run(&traffic).expect("run");
    let delivered = shaped.delivered.sum_axis(ndarray::Axis(1));
    for (d, o) in delivered.iter().zip(traffic.totals().iter()) {
        assert!((d - o).abs() <= 1e-6 * o.max(1.0));
    }
    assert!(shaped.summary.total_published >= shaped.summary.total_original - 1e-6);
}

#[test]
fn more_noise_costs_less_privacy_and_more_padding() {
    let traffic = bursty_traffic(8, 40, 2);
    let run = |nm: f64| {
        let cfg = TransportConfig {
            sensitivity: Some(1_000.0),
            noise_multiplier: Some(nm),
            dp_step: 2,
            seed: 5,
            ..TransportConfig::default()
        };
        TransportEngine::new(cfg).run(&traffic).expect("run")
    };
    let quiet = run(0.5);
    let loud = run(8.0);

    let eps_quiet = quiet.summary.privacy_spent(1e-6).expect("loss").expect("rdp");
    let eps_loud = loud.summary.privacy_spent(1e-6).expect("loss").expect("rdp");
    assert!(eps_loud.epsilon < eps_quiet.epsilon);
    assert!(loud.summary.total_dummy > quiet.summary.total_dummy);
}

#[test]
fn wprivacy_run_drains_and_clamps() {
    let traffic = bursty_traffic(3, 32, 3);
    let cfg = TransportConfig {
        transport_type: TransportType::WPrivacy,
        mechanism: MechanismKind::Laplace,
        sensitivity: Some(500.0),
        epsilon_per_query: Some(0.5),
        dp_step: 4,
        max_dp_size: 20_000.0,
        seed: 4,
        ..TransportConfig::default()
    };
    let shaped = TransportEngine::new(cfg).run(&traffic).expect("run");
    assert!(shaped
        .published
        .iter()
        .all(|v| (0.0..=20_000.0).contains(v)));
    let eps = shaped.assigned_epsilons.expect("epsilons");
    assert_eq!(eps.ncols(), shaped.published.ncols());
}

#[test]
fn static_run_keeps_shape() {
    let traffic = bursty_traffic(4, 25, 6);
    let cfg = TransportConfig {
        transport_type: TransportType::Static,
        mechanism: MechanismKind::Laplace,
        epsilon_per_query: Some(5.0),
        ..TransportConfig::default()
    };
    let shaped = TransportEngine::new(cfg).run(&traffic).expect("run");
    assert_eq!(shaped.published.dim(), traffic.data().dim());
    assert!(shaped.published.iter().all(|v| *v >= 0.0));
    assert!(shaped.dummy.iter().all(|v| *v >= 0.0));
}

#[test]
fn baselines_pad_at_least_as_much_as_pacer() {
    let traffic = bursty_traffic(6, 20, 8);
    let constant = norm_overhead(traffic.data(), &constant_rate(&traffic)).expect("overhead");
    let paced = norm_overhead(traffic.data(), &pacer(&traffic)).expect("overhead");
    assert!(constant.mean >= paced.mean);
    assert!(paced.mean >= 0.0);

    let rows = overhead(traffic.data(), &pacer(&traffic)).expect("overhead");
    let again = relative_overhead(&rows, None).expect("stats");
    assert_eq!(again, paced);
}
