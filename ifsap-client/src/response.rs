//! Command responses.

use ifsap_marshal::Row;

/// Result of one iteration of a command, or of one member of a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Output bind variables.
    pub bindings: Row,
    /// Result rows, accumulated across fetches.
    pub rows: Vec<Row>,
    /// More rows are waiting behind an open cursor.
    pub partial_result: bool,
}

/// What a command or batch produced.
///
/// Gateway and transport failures are reported here with `ok == false`
/// rather than as `Err`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub ok: bool,
    pub error_text: String,
    /// One entry per iteration, or per batch member.
    pub outcomes: Vec<Outcome>,
}

impl Response {
    pub fn success(outcomes: Vec<Outcome>) -> Self {
        Self {
            ok: true,
            error_text: String::new(),
            outcomes,
        }
    }

    /// A successful response with a single empty outcome.
    pub fn empty() -> Self {
        Self::success(vec![Outcome::default()])
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_text: error_text.into(),
            outcomes: Vec::new(),
        }
    }

    /// Marks the response failed, appending `error_text` to any existing text.
    pub fn append_error(&mut self, error_text: &str) {
        self.ok = false;
        if self.error_text.is_empty() {
            self.error_text = error_text.to_string();
        } else {
            self.error_text = format!("{}; {}", self.error_text, error_text);
        }
    }

    /// Whether any iteration still has rows to fetch.
    pub fn partial_result(&self) -> bool {
        self.outcomes.iter().any(|o| o.partial_result)
    }

    /// Output bindings of the first iteration.
    pub fn bindings(&self) -> Option<&Row> {
        self.outcomes.first().map(|o| &o.bindings)
    }

    /// Rows of the first iteration.
    pub fn rows(&self) -> &[Row] {
        self.outcomes.first().map_or(&[], |o| o.rows.as_slice())
    }

    pub fn outcome(&self, index: usize) -> Option<&Outcome> {
        self.outcomes.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsap_marshal::Datum;

    #[test]
    fn test_append_error() {
        let mut response = Response::empty();
        response.append_error("commit failed");
        assert!(!response.ok);
        assert_eq!(response.error_text, "commit failed");

        let mut response = Response::error("ORA-00001");
        response.append_error("rollback failed");
        assert_eq!(response.error_text, "ORA-00001; rollback failed");
    }

    #[test]
    fn test_accessors() {
        let response = Response::error("x");
        assert!(response.bindings().is_none());
        assert!(response.rows().is_empty());
        assert!(!response.partial_result());

        let mut row = Row::new();
        row.insert("A", Datum::Integer(1));
        let response = Response::success(vec![
            Outcome {
                bindings: row.clone(),
                rows: vec![row.clone()],
                partial_result: false,
            },
            Outcome {
                partial_result: true,
                ..Default::default()
            },
        ]);
        assert_eq!(response.bindings(), Some(&row));
        assert_eq!(response.rows().len(), 1);
        assert!(response.partial_result());
        assert!(response.outcome(1).unwrap().rows.is_empty());
    }
}
