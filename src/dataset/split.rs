//! Seeded train/validation split.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffles `items` with `seed` and moves `ceil(len * val_fraction)` of them
/// into the validation set. Returns `(train, val)`.
pub fn train_val_split<T>(items: Vec<T>, val_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let n = items.len();
    let n_val = ((n as f64) * val_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let n_val = n_val.min(n);

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut SmallRng::seed_from_u64(seed));

    let mut is_val = vec![false; n];
    for &i in &order[..n_val] {
        is_val[i] = true;
    }

    let mut train = Vec::with_capacity(n - n_val);
    let mut val = Vec::with_capacity(n_val);
    for (item, to_val) in items.into_iter().zip(is_val) {
        if to_val {
            val.push(item);
        } else {
            train.push(item);
        }
    }
    (train, val)
}
