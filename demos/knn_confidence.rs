use cohort::classify::KNearest;
use rand::prelude::*;
use rand_distr::Normal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two labelled point clouds that overlap at their edges, classified over
    // a coarse grid. Each cell shows the predicted label and how many of the
    // k neighbors agreed; agreement drops where the clouds meet.
    tracing_subscriber::fmt::init();

    let mut rng = StdRng::seed_from_u64(7);
    let noise = Normal::new(0.0f32, 50.0)?;

    let mut samples = Vec::new();
    let mut labels = Vec::new();
    for (label, center) in [(1, 200.0f32), (2, 300.0f32)] {
        for _ in 0..100 {
            samples.push(vec![
                center + noise.sample(&mut rng),
                center + noise.sample(&mut rng),
            ]);
            labels.push(label);
        }
    }

    let knn = KNearest::train(&samples, &labels)?.with_k(10);
    println!("n_samples={} k={}", knn.n_samples(), knn.k());

    let step = 50.0f32;
    let mut low_confidence = 0;
    for row in (0..=10).rev() {
        let y = row as f32 * step;
        let mut line = format!("{y:>5.0} |");
        for col in 0..=10 {
            let x = col as f32 * step;
            let pred = knn.classify(&[x, y], knn.k())?;
            if pred.confidence() < 0.7 {
                low_confidence += 1;
            }
            line.push_str(&format!(" {}:{:>2}", pred.label, pred.agreeing()));
        }
        println!("{line}");
    }
    println!("cells below 0.7 confidence: {low_confidence}");

    let pred = knn.classify(&[200.0, 200.0], knn.k())?;
    println!(
        "query=(200,200) label={} neighbors={:?} confidence={:.2}",
        pred.label,
        pred.neighbor_labels(),
        pred.confidence()
    );

    Ok(())
}
