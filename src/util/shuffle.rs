//! Uniform in-place shuffling for tournament brackets

use rand::Rng;

/// Fisher-Yates shuffle. Walks from the back, swapping each slot with a
/// uniformly chosen slot at or before it.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    if items.len() < 2 {
        return;
    }
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
