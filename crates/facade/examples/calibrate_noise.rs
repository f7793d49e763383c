use dp_transport::{
    calculate_privacy_loss, default_alphas, epsilon_per_query_for_budget,
    solve_noise_multiplier,
};

fn main() {
    let alphas = default_alphas();
    let delta = 1e-6;
    let queries = 120u64;

    for target in [1.0, 10.0, 100.0] {
        let nm = solve_noise_multiplier(target, queries, &alphas, delta).expect("noise multiplier");
        let loss = calculate_privacy_loss(queries, &alphas, nm, delta).expect("privacy loss");
        println!(
            "target eps {target:>6}: noise multiplier {nm:.4} -> eps {:.4} (alpha {})",
            loss.epsilon, loss.best_alpha
        );
    }

    let per_query = epsilon_per_query_for_budget(10.0, delta, queries).expect("split");
    println!("Laplace epsilon per query for a total of 10 over {queries} queries: {per_query:.5}");
}
