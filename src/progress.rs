//! Progress reporting: one spinner per export stage, counting stored items.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A small wrapper around an `indicatif` spinner that does nothing when disabled.
/// - `inc(delta)` counts items processed in this stage
/// - `finish(msg)` finalizes the spinner with a message
pub struct ProgressScope {
    pb: Option<ProgressBar>,
}

impl ProgressScope {
    pub fn stage<T: Into<String>>(label: T, enabled: bool) -> Self {
        if !enabled {
            return Self { pb: None };
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} {msg} {pos} items  it/s: {per_sec}  elapsed: {elapsed_precise}",
        ) {
            pb.set_style(style);
        }
        pb.set_message(label.into());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb: Some(pb) }
    }

    #[inline]
    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    pub fn set_message<T: Into<String>>(&self, msg: T) {
        if let Some(pb) = &self.pb {
            pb.set_message(msg.into());
        }
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        if let Some(pb) = &self.pb {
            pb.finish_with_message(msg.into());
        }
    }
}
