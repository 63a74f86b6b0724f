//! Desktop notification sinks.

use std::sync::Arc;

use async_trait::async_trait;
use safesurf_core::{Notification, Notifier};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::NotificationsConfig;

pub(crate) fn build_notifier(config: &NotificationsConfig) -> Arc<dyn Notifier> {
    if !config.enabled {
        return Arc::new(DisabledNotifier);
    }
    match config.command.as_deref() {
        Some([program, args @ ..]) => Arc::new(CommandNotifier {
            program: program.clone(),
            args: args.to_vec(),
        }),
        _ => Arc::new(LogNotifier),
    }
}

/// Writes notifications to the log.
#[derive(Debug)]
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        info!(
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
    }
}

#[derive(Debug)]
struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, notification: Notification) {
        debug!(title = %notification.title, "notifications disabled");
    }
}

/// Runs an external program (e.g. `notify-send`) with the title and
/// message appended to its arguments.
#[derive(Debug)]
pub(crate) struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, notification: Notification) {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&notification.title)
            .arg(&notification.message)
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                debug!(program = %self.program, title = %notification.title, "notification sent");
            }
            Ok(status) => {
                warn!(program = %self.program, status = %status, "notify command failed");
            }
            Err(error) => {
                warn!(program = %self.program, error = %error, "failed to run notify command");
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            title: "⚠️ Risky Site Detected!".into(),
            message: "http://evil.test\nReason: Known phishing".into(),
        }
    }

    #[tokio::test]
    async fn command_receives_title_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("notified.txt");

        let notifier = build_notifier(&NotificationsConfig {
            enabled: true,
            command: Some(vec![
                "sh".into(),
                "-c".into(),
                format!("printf '%s|%s' \"$0\" \"$1\" > '{}'", out.display()),
            ]),
        });
        notifier.notify(notification()).await;

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            written,
            "⚠️ Risky Site Detected!|http://evil.test\nReason: Known phishing"
        );
    }

    #[tokio::test]
    async fn missing_program_does_not_fail() {
        let notifier = build_notifier(&NotificationsConfig {
            enabled: true,
            command: Some(vec!["/nonexistent/safesurf-notify".into()]),
        });
        notifier.notify(notification()).await;
    }

    #[tokio::test]
    async fn log_and_disabled_notifiers_accept_notifications() {
        build_notifier(&NotificationsConfig::default())
            .notify(notification())
            .await;
        build_notifier(&NotificationsConfig {
            enabled: false,
            command: None,
        })
        .notify(notification())
        .await;
    }
}
