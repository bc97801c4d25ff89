//! Optional structured log sink consulted during compilation.
//!
//! Every record is emitted as a `tracing` event as well, so a sink is only
//! needed when the caller wants the lines for itself.

use parking_lot::Mutex;
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub level: Level,
    /// `[METHOD]/route`
    pub endpoint: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl DiagnosticRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, record: &DiagnosticRecord);
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<DiagnosticRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&self, record: &DiagnosticRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Per-endpoint emitter bound to an optional sink.
pub(crate) struct Diagnostics<'a> {
    sink: Option<&'a dyn DiagnosticSink>,
    endpoint: String,
}

impl<'a> Diagnostics<'a> {
    pub(crate) fn new(sink: Option<&'a dyn DiagnosticSink>, endpoint: impl Into<String>) -> Self {
        Self {
            sink,
            endpoint: endpoint.into(),
        }
    }

    pub(crate) fn debug(&self, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::DEBUG, message, fields);
    }

    pub(crate) fn info(&self, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::INFO, message, fields);
    }

    pub(crate) fn warn(&self, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::WARN, message, fields);
    }

    fn emit(&self, level: Level, message: &str, fields: &[(&str, String)]) {
        let rendered = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        let endpoint = self.endpoint.as_str();
        if level <= Level::WARN {
            tracing::warn!(endpoint, fields = %rendered, "{message}");
        } else if level == Level::INFO {
            tracing::info!(endpoint, fields = %rendered, "{message}");
        } else {
            tracing::debug!(endpoint, fields = %rendered, "{message}");
        }

        if let Some(sink) = self.sink {
            sink.record(&DiagnosticRecord {
                level,
                endpoint: self.endpoint.clone(),
                message: message.to_string(),
                fields: fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_to_sink() {
        let sink = CollectingSink::new();
        let diag = Diagnostics::new(Some(&sink), "[GET]/a");
        diag.info("compiled", &[("slots", "2".to_string())]);
        diag.warn("skipped", &[]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::INFO);
        assert_eq!(records[0].endpoint, "[GET]/a");
        assert_eq!(records[0].field("slots"), Some("2"));
        assert_eq!(sink.messages(), vec!["compiled", "skipped"]);
    }

    #[test]
    fn no_sink_is_fine() {
        let diag = Diagnostics::new(None, "[GET]/a");
        diag.debug("nothing listens", &[]);
    }
}
