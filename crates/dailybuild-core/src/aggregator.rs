//! Run-wide, append-only collection of error records.

use crate::error::ErrorRecord;
use tracing::warn;

/// Ordered error records for one run.
///
/// Append order matches stage execution order. There is no way to remove a
/// record, so once non-empty the aggregator stays non-empty for the run.
#[derive(Debug, Default, Clone)]
pub struct ErrorAggregator {
    records: Vec<ErrorRecord>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&mut self, record: ErrorRecord) {
        warn!(
            kind = %record.kind,
            project = record.project.as_deref().unwrap_or("-"),
            "{}",
            record.message
        );
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Full ordered list of records.
    pub fn snapshot(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }
}

/// `"<platform>: Build errors were detected:"` followed by one line per record.
pub fn render_failure(platform: &str, records: &[ErrorRecord]) -> String {
    let mut text = format!("{platform}: Build errors were detected:");
    for record in records {
        text.push_str("\n- ");
        text.push_str(&record.to_string());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_new_aggregator_is_empty() {
        let agg = ErrorAggregator::new();
        assert!(agg.is_empty());
        assert_eq!(agg.len(), 0);
        assert!(agg.snapshot().is_empty());
    }

    #[test]
    fn test_record_preserves_order() {
        let mut agg = ErrorAggregator::new();
        agg.record(ErrorRecord::for_project(ErrorKind::ConfigureError, "a", "first"));
        agg.record(ErrorRecord::for_project(ErrorKind::CompileError, "b", "second"));
        agg.record(ErrorRecord::run_level(ErrorKind::UnhandledError, "third"));

        let messages: Vec<&str> = agg.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_size_never_decreases() {
        let mut agg = ErrorAggregator::new();
        let mut last = agg.len();
        for i in 0..5 {
            agg.record(ErrorRecord::for_project(ErrorKind::InstallError, "p", format!("e{i}")));
            assert!(agg.len() > last);
            last = agg.len();
        }
        assert!(!agg.is_empty());
    }

    #[test]
    fn test_render_lists_every_record() {
        let mut agg = ErrorAggregator::new();
        agg.record(ErrorRecord::for_project(
            ErrorKind::ConfigureError,
            "libopenshot",
            "CMake Error: bad path",
        ));
        agg.record(ErrorRecord::for_project(
            ErrorKind::CompileError,
            "libopenshot",
            "foo.cpp:1: error: nope",
        ));

        let text = render_failure("Linux", agg.snapshot());
        assert!(text.starts_with("Linux: Build errors were detected:"));
        assert!(text.contains("ConfigureError [libopenshot]: CMake Error: bad path"));
        assert!(text.contains("CompileError [libopenshot]: foo.cpp:1: error: nope"));
        assert_eq!(text.lines().count(), 3);
    }
}
