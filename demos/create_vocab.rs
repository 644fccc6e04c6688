//! Builds a vocabulary from synthetic descriptors, saves it, and reloads
//! it to confirm the round trip. Feature extraction is out of scope for
//! this crate, so descriptors here are random stand-ins for real ORB/
//! BRIEF output a caller would supply.

use bowtree::{BinaryDescriptor, Scoring, Vocabulary, Weighting};
use rand::Rng;

type Desc = BinaryDescriptor<32>;

fn random_image(rng: &mut impl Rng, n_features: usize) -> Vec<Desc> {
    (0..n_features).map(|_| Desc::new(rng.gen())).collect()
}

fn main() {
    env_logger::init();

    let mut rng = rand::thread_rng();
    let training: Vec<Vec<Desc>> = (0..200).map(|_| random_image(&mut rng, 300)).collect();
    println!("Generated {} training images.", training.len());

    let voc = Vocabulary::new(10, 5, Weighting::TfIdf, Scoring::L1)
        .expect("valid vocabulary configuration")
        .create(&training, 42)
        .expect("training set is non-empty");
    println!(
        "Vocabulary: {} words over {} levels, branching factor {}.",
        voc.size(),
        voc.get_depth_levels(),
        voc.get_branching_factor()
    );

    let dir = std::env::temp_dir().join("bowtree-demo");
    std::fs::create_dir_all(&dir).expect("create demo output dir");
    let path = dir.join("demo.voc");
    voc.save(&path).expect("save vocabulary");

    let reloaded: Vocabulary<Desc> = Vocabulary::load(&path).expect("load vocabulary");
    assert_eq!(voc.size(), reloaded.size());
    println!("Saved and reloaded vocabulary at {}.", path.display());
}
