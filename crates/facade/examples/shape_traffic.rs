use dp_transport::{
    norm_overhead, wasserstein_overhead, MechanismKind, TrafficMatrix, TransportConfig,
    TransportEngine, TransportType,
};

fn main() {
    let traffic = TrafficMatrix::from_rows(
        vec![
            vec![1200.0, 0.0, 0.0, 800.0, 0.0, 4000.0, 0.0, 0.0],
            vec![0.0, 300.0, 300.0, 0.0, 0.0, 0.0, 2500.0, 100.0],
            vec![900.0, 900.0, 900.0, 900.0, 0.0, 0.0, 0.0, 0.0],
        ],
        vec![0, 1, 2],
    )
    .expect("traffic");

    let modes = [
        TransportConfig {
            sensitivity: Some(500.0),
            noise_multiplier: Some(1.0),
            dp_step: 2,
            seed: 1,
            ..TransportConfig::default()
        },
        TransportConfig {
            transport_type: TransportType::WPrivacy,
            mechanism: MechanismKind::Laplace,
            sensitivity: Some(500.0),
            epsilon_per_query: Some(1.0),
            dp_step: 2,
            seed: 1,
            ..TransportConfig::default()
        },
        TransportConfig {
            transport_type: TransportType::Static,
            mechanism: MechanismKind::Laplace,
            epsilon_per_query: Some(4.0),
            seed: 1,
            ..TransportConfig::default()
        },
    ];

    for cfg in modes {
        let mode = cfg.transport_type;
        let shaped = TransportEngine::new(cfg).run(&traffic).expect("run");
        let stats = norm_overhead(&shaped.original, &shaped.published).expect("overhead");
        let shape_shift =
            wasserstein_overhead(&shaped.original, &shaped.published).expect("wasserstein");
        println!(
            "{mode:?}: decisions={} overhead={:.3}±{:.3} wasserstein={:.3}",
            shaped.summary.decisions, stats.mean, stats.std, shape_shift
        );
        if let Ok(Some(loss)) = shaped.summary.privacy_spent(1e-6) {
            println!("  epsilon={:.3} at alpha={}", loss.epsilon, loss.best_alpha);
        }
    }
}
