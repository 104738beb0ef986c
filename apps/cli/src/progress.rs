//! Terminal rendering of a session's event stream.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use fitscout_core::SessionEvent;

/// Progress bar fed by [`SessionEvent`]s from a broadcaster observer.
pub(crate) struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new(len: u64) -> Self {
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub(crate) fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Progress {
                range_start,
                range_end,
                processed_count,
                current_part,
                ..
            } => {
                self.bar
                    .set_length(range_end.saturating_sub(*range_start) as u64);
                self.bar.set_position(*processed_count as u64);
                self.bar
                    .set_message(format!("looking up {}", current_part.part_number));
            }
            SessionEvent::Result { result, .. } => {
                self.bar.inc(1);
                self.bar
                    .set_message(format!("{}: {}", result.part.part_number, result.makes));
            }
            SessionEvent::Stopped { .. }
            | SessionEvent::Completed { .. }
            | SessionEvent::Error { .. } => {}
        }
    }

    pub(crate) fn set_position(&self, processed: u64) {
        self.bar.set_position(processed);
    }

    pub(crate) fn message(&self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
