//! Builds a small database from synthetic images and queries it with one
//! of the inserted images, printing the top matches. Stands in for what
//! a caller would do with real extracted descriptors.

use bowtree::{BinaryDescriptor, Database, Scoring, Vocabulary, Weighting};
use rand::Rng;

type Desc = BinaryDescriptor<32>;

fn random_image(rng: &mut impl Rng, n_features: usize) -> Vec<Desc> {
    (0..n_features).map(|_| Desc::new(rng.gen())).collect()
}

fn main() {
    env_logger::init();

    let mut rng = rand::thread_rng();
    let images: Vec<Vec<Desc>> = (0..50).map(|_| random_image(&mut rng, 300)).collect();

    let voc = Vocabulary::new(10, 5, Weighting::TfIdf, Scoring::L1)
        .expect("valid vocabulary configuration")
        .create(&images, 7)
        .expect("training set is non-empty");

    let mut db = Database::new(voc, true, 2).expect("trained vocabulary");
    for image in &images {
        db.add(image).expect("non-empty image");
    }
    println!("Inserted {} images.", db.size());

    let query = &images[10];
    let results = db.query(query, 5, None).expect("non-empty query");
    println!("\nTop {} matches for image 10:", results.len());
    for (entry, score) in &results {
        println!("  entry {entry:>3} | score {score:.4}");
    }

    if results.len() > 1 {
        let (a, b) = (results[0].0, results[1].0);
        let pairs = db.retrieve_features(a, b).expect("direct index enabled");
        println!("\n{} candidate feature correspondences between entries {a} and {b}.", pairs.len());
    }
}
