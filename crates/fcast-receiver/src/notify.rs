//! Operator-facing notifications.
//!
//! The receiver reports connection and listener events through a
//! [`Notifier`]. Every notification is logged; [`DesktopNotifier`] also
//! shows it on the desktop.

use std::sync::Arc;
use std::time::Duration;

use notify_rust::Notification;
#[cfg(target_os = "linux")]
use notify_rust::Urgency;
use tracing::{error, info, warn};

use crate::config::NotificationSettings;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Sink for operator notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);

    fn info(&self, message: &str) {
        self.notify(NotifyLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.notify(NotifyLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.notify(NotifyLevel::Error, message);
    }
}

fn log(level: NotifyLevel, message: &str) {
    match level {
        NotifyLevel::Info => info!(notification = message, "Notification"),
        NotifyLevel::Warning => warn!(notification = message, "Notification"),
        NotifyLevel::Error => error!(notification = message, "Notification"),
    }
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        log(level, message);
    }
}

/// Notifier that logs and shows a desktop notification.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
    timeout: Duration,
}

impl DesktopNotifier {
    pub fn new(settings: &NotificationSettings) -> Self {
        Self {
            app_name: settings.app_name.clone(),
            timeout: Duration::from_secs(u64::from(settings.timeout_secs)),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        log(level, message);

        let mut notification = Notification::new();
        notification
            .appname(&self.app_name)
            .summary(&self.app_name)
            .body(message)
            .timeout(self.timeout);

        #[cfg(target_os = "linux")]
        notification.urgency(match level {
            NotifyLevel::Info => Urgency::Low,
            NotifyLevel::Warning => Urgency::Normal,
            NotifyLevel::Error => Urgency::Critical,
        });

        if let Err(e) = notification.show() {
            error!(error = %e, "Failed to show desktop notification");
        }
    }
}

/// Builds the notifier selected by `settings`.
pub fn notifier_from_settings(settings: &NotificationSettings) -> Arc<dyn Notifier> {
    if settings.desktop {
        Arc::new(DesktopNotifier::new(settings))
    } else {
        Arc::new(LogNotifier)
    }
}
