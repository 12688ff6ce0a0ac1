//! Parser boundary. The core never tokenizes SQL itself; it asks `sqlparser`
//! for statements and consumes the AST.

use quiver_common::{QuiverError, Result};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

pub use sqlparser::ast;
pub use sqlparser::ast::Statement;

/// Parse a request into statements. Parser messages surface verbatim as `Parse`.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| QuiverError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::parse_sql;
    use quiver_common::QuiverError;

    #[test]
    fn parses_multiple_statements() {
        let stmts = parse_sql("SELECT 1; SELECT 2").expect("parse");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn malformed_sql_is_a_parse_error() {
        let err = parse_sql("SELEC 1").expect_err("must fail");
        assert!(matches!(err, QuiverError::Parse(_)));
    }
}
