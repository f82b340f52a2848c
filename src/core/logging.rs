// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

// Global sequence number so interleaved supervisor logs can be correlated.
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub pid: Option<u32>,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            pid: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn format(&self, message: &str) -> String {
        let pid_info = match self.pid {
            Some(pid) => format!(" pid={}", pid),
            None => String::new(),
        };

        format!(
            "[{}:{}{}][seq={:06}] {}",
            self.component, self.instance_id, pid_info, self.sequence, message
        )
    }
}

/// Uniform per-instance logging for anything that owns a child process.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("recorder", "camera-1");

        assert_eq!(ctx.component, "recorder");
        assert_eq!(ctx.instance_id, "camera-1");
        assert!(ctx.sequence > 0);
        assert!(ctx.pid.is_none());
    }

    #[test]
    fn test_log_formatting() {
        let ctx = LogContext::new("gateway", "main");
        let formatted = ctx.format("started");

        assert!(formatted.starts_with("[gateway:main]"));
        assert!(formatted.ends_with("started"));

        let with_pid = LogContext::new("transcode", "camera-2").with_pid(4242);
        assert!(with_pid.format("x").contains("[transcode:camera-2 pid=4242]"));
    }

    #[test]
    fn sequence_is_monotonic() {
        let a = LogContext::new("a", "1");
        let b = LogContext::new("b", "2");
        assert!(b.sequence > a.sequence);
    }
}
