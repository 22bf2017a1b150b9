//! Fatal notification

use tracing::error;

/// Blocking user-facing report of a fatal error
pub trait Notifier {
    fn fatal(&self, title: &str, message: &str);
}

/// Reports through tracing and a framed message on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn fatal(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);

        let width = title.len().max(message.len()) + 4;
        let rule = "=".repeat(width);
        eprintln!("{}\n  {}\n\n  {}\n{}", rule, title, message, rule);
    }
}
