use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastLevel {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "OK",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Toast {
    pub(crate) level: ToastLevel,
    pub(crate) message: String,
}

impl Toast {
    pub(crate) fn status_line(&self) -> String {
        format!("{}: {}", self.level.label(), self.message)
    }
}

/// Fire-and-forget user notifications.
pub(crate) trait Notifier {
    fn notify(&self, level: ToastLevel, message: &str);

    fn info(&self, message: &str) {
        self.notify(ToastLevel::Info, message);
    }

    fn success(&self, message: &str) {
        self.notify(ToastLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.notify(ToastLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.notify(ToastLevel::Error, message);
    }
}

/// Prints toasts for the one-shot commands.
pub(crate) struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Warning | ToastLevel::Error => eprintln!("{}: {message}", level.label()),
            ToastLevel::Info | ToastLevel::Success => println!("{}: {message}", level.label()),
        }
    }
}

/// Buffers toasts until the panel drains them into its status line.
#[derive(Debug, Default)]
pub(crate) struct ToastQueue {
    pending: RefCell<VecDeque<Toast>>,
}

impl ToastQueue {
    pub(crate) fn drain(&self) -> Vec<Toast> {
        self.pending.borrow_mut().drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, level: ToastLevel) -> usize {
        self.pending
            .borrow()
            .iter()
            .filter(|toast| toast.level == level)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> Vec<String> {
        self.pending
            .borrow()
            .iter()
            .map(|toast| toast.message.clone())
            .collect()
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, level: ToastLevel, message: &str) {
        self.pending.borrow_mut().push_back(Toast {
            level,
            message: message.to_string(),
        });
    }
}
