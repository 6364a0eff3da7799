//! Statement classification and normalization.

/// Commits the open transaction.
pub const COMMIT: &str = "COMMIT";
/// Rolls back the open transaction.
pub const ROLLBACK: &str = "ROLLBACK";
/// Ends the client session.
pub const END_CLIENT_SESSION: &str = "END_CLIENT_SESSION";
/// Continues an open cursor.
pub const FETCH: &str = "FETCH";

/// Statements that are sent without a result record.
const CONTROL_STATEMENTS: [&str; 3] = [COMMIT, ROLLBACK, END_CLIENT_SESSION];

fn starts_with_any(statement: &str, keywords: &[&str]) -> bool {
    let upper = statement.trim().to_uppercase();
    keywords.iter().any(|k| upper.starts_with(k))
}

/// `SELECT` and `WITH` queries.
pub fn is_select(statement: &str) -> bool {
    starts_with_any(statement, &["SELECT", "WITH"])
}

/// PL/SQL blocks and the gateway's control keywords.
pub fn is_plsql(statement: &str) -> bool {
    starts_with_any(
        statement,
        &["DECLARE", "BEGIN", ROLLBACK, COMMIT, FETCH, END_CLIENT_SESSION],
    )
}

/// Whether the statement is exactly one of the control keywords.
pub fn is_control(statement: &str) -> bool {
    CONTROL_STATEMENTS.contains(&statement)
}

/// Wraps bare PL/SQL calls in `BEGIN ... END;`.
///
/// Queries and control keywords are returned unchanged. Anything else gets
/// a terminating `;` and, unless it already is a block, the wrapper.
pub fn fix_statement(statement: &str) -> String {
    let upper = statement.trim().to_uppercase();
    if starts_with_any(&upper, &["SELECT", "WITH", ROLLBACK, COMMIT, FETCH, END_CLIENT_SESSION]) {
        return statement.to_string();
    }

    let mut fixed = statement.to_string();
    if !upper.ends_with(';') {
        fixed.push(';');
    }
    if !(upper.starts_with("BEGIN") || upper.starts_with("DECLARE")) {
        fixed = format!("BEGIN {} END;", fixed);
    }
    fixed
}

/// Whether `:name` occurs in the statement.
pub fn mentions_binding(statement: &str, name: &str) -> bool {
    statement.contains(&format!(":{}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(is_select("  select * from dual"));
        assert!(is_select("WITH x AS (SELECT 1 FROM dual) SELECT * FROM x"));
        assert!(!is_select("BEGIN NULL; END;"));

        assert!(is_plsql("declare x number; begin null; end;"));
        assert!(is_plsql("BEGIN NULL; END;"));
        assert!(is_plsql("COMMIT"));
        assert!(is_plsql("END_CLIENT_SESSION"));
        assert!(!is_plsql("SELECT 1 FROM dual"));
        assert!(!is_plsql("Dbms_Output.Put_Line('x')"));
    }

    #[test]
    fn test_fix_statement() {
        assert_eq!(fix_statement("SELECT * FROM dual"), "SELECT * FROM dual");
        assert_eq!(fix_statement("COMMIT"), "COMMIT");
        assert_eq!(fix_statement("BEGIN NULL; END;"), "BEGIN NULL; END;");
        assert_eq!(fix_statement("BEGIN NULL; END"), "BEGIN NULL; END;");
        assert_eq!(
            fix_statement("Client_SYS.Clear_Attr(:attr)"),
            "BEGIN Client_SYS.Clear_Attr(:attr); END;"
        );
        assert_eq!(
            fix_statement("Client_SYS.Clear_Attr(:attr);"),
            "BEGIN Client_SYS.Clear_Attr(:attr); END;"
        );
        assert_eq!(fix_statement("DECLARE x NUMBER; BEGIN NULL; END"), "DECLARE x NUMBER; BEGIN NULL; END;");
    }

    #[test]
    fn test_control() {
        assert!(is_control("COMMIT"));
        assert!(is_control("END_CLIENT_SESSION"));
        assert!(!is_control("commit"));
        assert!(!is_control("BEGIN COMMIT; END;"));
    }

    #[test]
    fn test_mentions_binding() {
        assert!(mentions_binding("SELECT :PAR1 FROM dual", "PAR1"));
        assert!(!mentions_binding("SELECT PAR1 FROM dual", "PAR1"));
    }
}
