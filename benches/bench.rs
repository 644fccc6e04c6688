#![feature(test)]
extern crate test;
use test::Bencher;

use bowtree::{BinaryDescriptor, Scoring, Vocabulary, Weighting};
use rand::Rng;

type Desc = BinaryDescriptor<32>;

fn training_set() -> Vec<Vec<Desc>> {
    let mut rng = rand::thread_rng();
    (0..100)
        .map(|_| (0..300).map(|_| Desc::new(rng.gen())).collect())
        .collect()
}

/// Benchmark for Vocabulary::transform()
#[bench]
fn transform(b: &mut Bencher) {
    let training = training_set();
    let voc = Vocabulary::new(10, 5, Weighting::TfIdf, Scoring::L1)
        .unwrap()
        .create(&training, 1)
        .unwrap();
    let features = &training[0];
    b.iter(|| voc.transform(features).unwrap());
}

/// Benchmark for Vocabulary::create() on a small training set.
#[bench]
fn create_vocabulary(b: &mut Bencher) {
    let training = training_set();
    b.iter(|| {
        Vocabulary::new(10, 5, Weighting::TfIdf, Scoring::L1)
            .unwrap()
            .create(&training, 1)
            .unwrap()
    });
}
