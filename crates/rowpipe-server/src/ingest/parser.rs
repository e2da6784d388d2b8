//! Line parser
//!
//! Turns one line of text into at most one JSON record. The first line of a stream may
//! be captured as a header row, after which delimited lines with a matching field count
//! become objects keyed by column name. Anything else that is not valid JSON is kept
//! verbatim under `raw`.
//!
//! Only the first line is ever inspected. A stream whose first line is blank has no
//! header.

use serde_json::{Map, Value};

/// Per-stream format detection state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderState {
    detected: bool,
    columns: Option<Vec<String>>,
}

impl HeaderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns captured from the header row, if the stream had one
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Whether the first line has been seen
    pub fn is_detected(&self) -> bool {
        self.detected
    }

    /// End detection without a header, for a first line that never reaches the parser
    pub fn skip_detection(&mut self) {
        self.detected = true;
    }
}

/// Parse one line (without its terminator).
///
/// Returns `None` for blank lines and for the header row. Never fails: lines that are
/// neither JSON nor a matching delimited row come back as `{"raw": line}`.
pub fn parse_line(line: &str, state: &mut HeaderState, delimiter: char) -> Option<Value> {
    let first_line = !state.detected;
    state.detected = true;

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if first_line && trimmed.contains(delimiter) && !trimmed.starts_with('{') {
        state.columns = Some(
            trimmed
                .split(delimiter)
                .map(|column| column.trim().to_string())
                .collect(),
        );
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(columns) = state.columns.as_deref() {
        let tokens: Vec<&str> = trimmed.split(delimiter).collect();
        if tokens.len() == columns.len() {
            let object: Map<String, Value> = columns
                .iter()
                .zip(tokens)
                .map(|(column, token)| (column.clone(), Value::String(token.to_string())))
                .collect();
            return Some(Value::Object(object));
        }
    }

    let mut raw = Map::with_capacity(1);
    raw.insert("raw".to_string(), Value::String(line.to_string()));
    Some(Value::Object(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut state = HeaderState::new();
        assert_eq!(parse_line("{\"a\":1}", &mut state, ','), Some(json!({"a": 1})));
        assert_eq!(parse_line("", &mut state, ','), None);
        assert_eq!(parse_line("   \t", &mut state, ','), None);
    }

    #[test]
    fn test_blank_first_line_means_no_header() {
        let mut state = HeaderState::new();
        assert_eq!(parse_line("", &mut state, ','), None);
        assert!(state.is_detected());

        assert_eq!(
            parse_line("name,age", &mut state, ','),
            Some(json!({"raw": "name,age"}))
        );
        assert!(state.columns().is_none());
    }

    #[test]
    fn test_skipped_detection_means_no_header() {
        let mut state = HeaderState::new();
        state.skip_detection();
        assert_eq!(
            parse_line("a,b", &mut state, ','),
            Some(json!({"raw": "a,b"}))
        );
    }

    #[test]
    fn test_header_then_rows() {
        let mut state = HeaderState::new();
        assert_eq!(parse_line("name, age", &mut state, ','), None);
        assert_eq!(
            state.columns(),
            Some(&["name".to_string(), "age".to_string()][..])
        );

        assert_eq!(
            parse_line("Ada,30", &mut state, ','),
            Some(json!({"name": "Ada", "age": "30"}))
        );
        // token values are not trimmed
        assert_eq!(
            parse_line("Lin, 40", &mut state, ','),
            Some(json!({"name": "Lin", "age": " 40"}))
        );
    }

    #[test]
    fn test_header_detection_runs_once() {
        let mut state = HeaderState::new();
        assert_eq!(parse_line("a,b", &mut state, ','), None);
        // a second header-looking line is data
        assert_eq!(
            parse_line("c,d", &mut state, ','),
            Some(json!({"a": "c", "b": "d"}))
        );
    }

    #[test]
    fn test_json_first_line_is_not_a_header() {
        let mut state = HeaderState::new();
        assert_eq!(
            parse_line(r#"{"a":1,"b":2}"#, &mut state, ','),
            Some(json!({"a": 1, "b": 2}))
        );
        assert!(state.is_detected());
        assert!(state.columns().is_none());
    }

    #[test]
    fn test_json_wins_over_columns() {
        let mut state = HeaderState::new();
        parse_line("x,y", &mut state, ',');
        assert_eq!(parse_line("[1,2]", &mut state, ','), Some(json!([1, 2])));
    }

    #[test]
    fn test_raw_fallback_keeps_original_text() {
        let mut state = HeaderState::new();
        assert_eq!(
            parse_line("garbage line 1", &mut state, ','),
            Some(json!({"raw": "garbage line 1"}))
        );
        assert_eq!(
            parse_line("  not,matching,columns ", &mut state, ','),
            Some(json!({"raw": "  not,matching,columns "}))
        );
    }

    #[test]
    fn test_column_count_mismatch_falls_back() {
        let mut state = HeaderState::new();
        parse_line("name,age", &mut state, ',');
        assert_eq!(
            parse_line("Ada,30,extra", &mut state, ','),
            Some(json!({"raw": "Ada,30,extra"}))
        );
    }

    #[test]
    fn test_custom_delimiter() {
        let mut state = HeaderState::new();
        assert_eq!(parse_line("id\tvalue", &mut state, '\t'), None);
        assert_eq!(
            parse_line("7\tseven", &mut state, '\t'),
            Some(json!({"id": "7", "value": "seven"}))
        );
    }

    #[test]
    fn test_parse_is_idempotent_after_detection() {
        let mut state = HeaderState::new();
        parse_line("k,v", &mut state, ',');
        let snapshot = state.clone();

        let first = parse_line("a,b", &mut state, ',');
        let second = parse_line("a,b", &mut state, ',');
        assert_eq!(first, second);
        assert_eq!(state, snapshot);
    }
}
