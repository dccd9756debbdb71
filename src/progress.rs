//! Progress bars for the long-running loops.

use indicatif::{ProgressBar, ProgressStyle};

/// A bar over `len` items, or a hidden one when progress output is off.
pub(crate) fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}
