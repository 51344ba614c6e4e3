use crate::error::ReplayError;
use crate::interfaces::dispatcher::ToolCall;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One recorded tool invocation, as captured by the telephony layer.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRecord {
    pub user_id: String,
    #[serde(default)]
    pub call_id: Option<i64>,
    #[serde(flatten)]
    pub call: ToolCall,
}

/// Reads tool-call records from a JSONL source.
pub struct CallReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CallReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and parses records.
    ///
    /// Blank lines are skipped. A malformed line yields one error item
    /// carrying its line number; later lines are still read.
    pub fn calls(self) -> impl Iterator<Item = Result<CallRecord, ReplayError>> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Err(err) => Some(Err(ReplayError::Io(err))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str(&line).map_err(|source| {
                    ReplayError::Malformed {
                        line: index + 1,
                        source,
                    }
                })),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_records_and_skips_blank_lines() {
        let log = concat!(
            r#"{"call_id": 7, "user_id": "user-1", "tool": "list_accounts", "parameters": {}}"#,
            "\n\n",
            r#"{"user_id": "user-2", "tool": "check_balance", "parameters": {"account_title": "Savings"}}"#,
            "\n",
        );
        let records: Vec<_> = CallReader::new(log.as_bytes())
            .calls()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].call_id, Some(7));
        assert_eq!(records[0].user_id, "user-1");
        assert_eq!(records[0].call.tool, "list_accounts");
        assert_eq!(records[1].call_id, None);
        assert_eq!(
            records[1].call.parameters,
            json!({"account_title": "Savings"})
        );
    }

    #[test]
    fn test_malformed_line_reports_its_number() {
        let log = concat!(
            r#"{"user_id": "user-1", "tool": "list_accounts"}"#,
            "\n",
            "not json\n",
            r#"{"user_id": "user-1", "tool": "list_bills"}"#,
            "\n",
        );
        let items: Vec<_> = CallReader::new(log.as_bytes()).calls().collect();

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(ReplayError::Malformed { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected a malformed-line error, got {other:?}"),
        }
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_missing_parameters_default_to_null() {
        let log = r#"{"user_id": "user-1", "tool": "list_accounts"}"#;
        let records: Vec<_> = CallReader::new(log.as_bytes())
            .calls()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(records[0].call.parameters.is_null());
    }
}
