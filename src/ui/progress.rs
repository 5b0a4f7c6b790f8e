use crate::extractor::LineProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn create_line_progress(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>9}/{len:9} lines {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub fn update_line_progress(pb: &ProgressBar, progress: &LineProgress) {
    pb.set_length(progress.total_lines as u64);
    pb.set_position(progress.lines_processed as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_manager_creation() {
        assert!(ProgressManager::new(true).is_enabled());
        assert!(!ProgressManager::new(false).is_enabled());
    }

    #[test]
    fn test_disabled_progress_bar_is_hidden() {
        let manager = ProgressManager::new(false);
        assert!(manager.create_line_progress("test").is_hidden());
    }

    #[test]
    fn test_update_line_progress() {
        let pb = ProgressBar::hidden();
        let mut progress = LineProgress::new(10);
        progress.lines_processed = 4;

        update_line_progress(&pb, &progress);
        assert_eq!(pb.length(), Some(10));
        assert_eq!(pb.position(), 4);
    }
}
