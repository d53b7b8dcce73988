use serde_json::Value;
use tracing::info;

/// One outgoing notification. `template` names the message kind; `context`
/// carries the values it is rendered with.
#[derive(Debug, Clone)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub template: &'static str,
    pub context: Value,
}

/// Fire-and-forget notification sink.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: Mail);
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer {
    sender: String,
    subject_prefix: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject_prefix: subject_prefix.into(),
        }
    }
}

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) {
        info!(
            from = %self.sender,
            to = %mail.to,
            template = mail.template,
            context = %mail.context,
            "{} {}",
            self.subject_prefix,
            mail.subject
        );
    }
}
