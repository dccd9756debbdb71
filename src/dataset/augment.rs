//! Quarter-turn rotation of label grids and spatial tensors.
//!
//! One quarter turn maps `out[i, j] = in[j, n - 1 - i]` on the (y, x) plane:
//! a cell at column `x` lands on row `n - 1 - x`, so content moving toward +x
//! (east) moves toward row 0 (north) afterwards. Label grids and spatial
//! tensors use the same convention, which keeps labels aligned with the cells
//! they describe.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

use super::Rotation;

fn quarter_turn_2d<T: Clone>(grid: ArrayView2<'_, T>) -> Array2<T> {
    grid.reversed_axes().slice_move(s![..;-1, ..]).to_owned()
}

fn quarter_turn_3d<T: Clone>(tensor: ArrayView3<'_, T>) -> Array3<T> {
    tensor
        .permuted_axes([0, 2, 1])
        .slice_move(s![.., ..;-1, ..])
        .to_owned()
}

/// Rotates a square grid by `rotation` quarter turns.
pub fn rotate_grid<T: Clone>(grid: ArrayView2<'_, T>, rotation: Rotation) -> Array2<T> {
    let mut out = grid.to_owned();
    for _ in 0..rotation.quarter_turns() {
        out = quarter_turn_2d(out.view());
    }
    out
}

/// Rotates every channel of a `[C, H, W]` tensor in the (H, W) plane.
pub fn rotate_spatial<T: Clone>(tensor: ArrayView3<'_, T>, rotation: Rotation) -> Array3<T> {
    let mut out = tensor.to_owned();
    for _ in 0..rotation.quarter_turns() {
        out = quarter_turn_3d(out.view());
    }
    out
}
