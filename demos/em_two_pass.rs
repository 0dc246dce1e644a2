use cohort::cluster::{CovarianceMode, Gmm};
use cohort::metrics::{ari, purity};
use cohort::Error;
use rand::prelude::*;
use rand_distr::Normal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Coarse-then-refine: a cheap diagonal fit seeds a full-covariance fit.
    //
    // The clusters are tilted ellipses, so the diagonal model can find the
    // centers but not the orientation. Run with RUST_LOG=debug to see each
    // EM iteration.
    tracing_subscriber::fmt::init();

    let mut rng = StdRng::seed_from_u64(11);
    let along = Normal::new(0.0f32, 40.0)?;
    let across = Normal::new(0.0f32, 8.0)?;

    let centers = [(150.0f32, 150.0f32), (350.0, 150.0), (250.0, 350.0)];
    let mut data = Vec::new();
    let mut truth = Vec::new();
    for (c, &(cx, cy)) in centers.iter().enumerate() {
        for _ in 0..60 {
            let a = along.sample(&mut rng);
            let b = across.sample(&mut rng);
            // Rotate by 45 degrees.
            let (x, y) = ((a - b) * 0.707_107, (a + b) * 0.707_107);
            data.push(vec![cx + x, cy + y]);
            truth.push(c);
        }
    }

    let coarse = Gmm::new(3)
        .with_covariance(CovarianceMode::Diagonal)
        .with_max_iter(20)
        .with_tol(1e-3)
        .fit(&data)?;
    println!(
        "diagonal: status={:?} iterations={} log_likelihood={:.2}",
        coarse.status(),
        coarse.iterations(),
        coarse.final_log_likelihood().unwrap_or(f64::NAN),
    );

    let refined = Gmm::new(3)
        .with_covariance(CovarianceMode::Full)
        .with_params(coarse.params().clone())
        .with_max_iter(100)
        .fit(&data);

    let refined = match refined {
        Ok(m) => m,
        Err(Error::Degenerate {
            reason, iteration, ..
        }) => {
            println!("full pass degenerated at iteration {iteration}: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!(
        "full:     status={:?} iterations={} log_likelihood={:.2}",
        refined.status(),
        refined.iterations(),
        refined.final_log_likelihood().unwrap_or(f64::NAN),
    );

    for (c, (mean, cov)) in refined
        .means()
        .outer_iter()
        .zip(refined.covariances())
        .enumerate()
    {
        let corr = cov[[0, 1]] / (cov[[0, 0]] * cov[[1, 1]]).sqrt();
        println!(
            "  component {c}: weight={:.3} mean=({:.1},{:.1}) corr={corr:.2}",
            refined.weights()[c],
            mean[0],
            mean[1],
        );
    }
    println!(
        "purity={:.3} ari={:.3}",
        purity(refined.labels(), &truth),
        ari(refined.labels(), &truth)
    );

    Ok(())
}
