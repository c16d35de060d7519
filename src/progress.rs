//! Progress reporting interface for operation execution.
//!
//! Executors pass an optional progress sink to `Operation::execute`; the
//! planner itself never blocks on it.

/// Receiver for execute-time progress updates.
pub trait Progress {
    /// Report a human-readable status line for the step in flight.
    fn status(&mut self, message: &str);

    /// Report completion of the current step as a percentage (0-100).
    fn percent(&mut self, _percent: u8) {}
}

/// Progress sink that logs updates through `tracing` and otherwise
/// discards them.
#[derive(Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn status(&mut self, message: &str) {
        tracing::info!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl Progress for Recorder {
        fn status(&mut self, message: &str) {
            self.lines.push(message.to_string());
        }
    }

    #[test]
    fn test_progress_records_status() {
        let mut recorder = Recorder::default();
        recorder.status("creating ext4 on /dev/sda1");
        recorder.percent(50);
        assert_eq!(recorder.lines, vec!["creating ext4 on /dev/sda1"]);
    }
}
