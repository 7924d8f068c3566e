use super::Notifier;
use crate::error::NotifyError;
use log::info;

/// Notifier that writes alerts to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!("[DRY RUN] would send:\n{}", text);
        Ok(())
    }
}
