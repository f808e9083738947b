use belief_net::models::monty_hall;
use belief_net::{Evidence, Result};
use log::{error, info};

fn run() -> Result<()> {
    let mut net = monty_hall()?;

    let (marginals, diagnostics) =
        net.predict_proba_with_diagnostics(&Evidence::from([("guest", "A"), ("monty", "C")]))?;

    info!(
        "Belief propagation finished after {} iterations ({:?}, max delta {:.2e})",
        diagnostics.iterations, diagnostics.state, diagnostics.max_delta
    );
    for m in &marginals {
        let probs: Vec<String> = m.iter().map(|(v, p)| format!("{v}={p:.3}")).collect();
        info!("P({} | guest=A, monty=C) = [{}]", m.variable().name(), probs.join(", "));
    }

    let imputed = net.impute(&[vec![Some("B"), Some("A"), None], vec![Some("C"), None, Some("B")]])?;
    for row in &imputed {
        info!("Imputed row: {:?}", row);
    }

    let rows = vec![
        vec!["A", "A", "C"],
        vec!["A", "A", "B"],
        vec!["A", "B", "C"],
        vec!["B", "B", "A"],
        vec!["B", "C", "A"],
    ];
    net.fit(&rows, 0.0)?;

    println!("{}", net.to_json()?);
    Ok(())
}

fn main() {
    env_logger::init();

    info!("Welcome to belief-net.");

    if let Err(e) = run() {
        error!("Monty Hall demo failed: {e}");
        std::process::exit(1);
    }

    info!("Done.");
}
