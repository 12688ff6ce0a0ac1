use std::io::{BufRead, Write};

use quiver_common::EngineConfig;
use quiver_storage::Catalog;

use crate::Engine;

#[derive(Debug, Clone, Default)]
pub struct ReplOptions {
    pub catalog: Option<String>,
    pub config: EngineConfig,
}

pub fn run_repl(opts: ReplOptions) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::new(opts.config.clone())?;
    if let Some(catalog_path) = &opts.catalog {
        engine.register_catalog(&Catalog::load_from_json(catalog_path)?)?;
    }

    eprintln!("quiver REPL (type \\q to quit)");
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    run_lines(&engine, stdin.lock(), &mut out)
}

/// Reads statements line by line until EOF or a quit command. Errors are
/// reported and the loop continues.
pub fn run_lines<R: BufRead, W: Write>(
    engine: &Engine,
    mut input: R,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut line = String::new();
    loop {
        write!(out, "quiver> ")?;
        out.flush()?;
        line.clear();
        // Ctrl+D => EOF => exit
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        if raw == "\\q" || raw.eq_ignore_ascii_case("quit") || raw.eq_ignore_ascii_case("exit") {
            break;
        }
        if raw == "\\d" {
            for table in engine.list_tables() {
                writeln!(out, "{table}")?;
            }
            continue;
        }
        let sql = raw.trim_end_matches(';');
        match engine.query(sql) {
            Ok(result) => writeln!(out, "{}", result.to_string().trim_end())?,
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run_lines;
    use crate::Engine;
    use quiver_common::EngineConfig;

    #[test]
    fn runs_statements_until_quit() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let input = "CREATE TABLE t (a INTEGER);\n\nINSERT INTO t VALUES (4);\nSELECT a FROM t;\nSELEC;\n\\d\n\\q\nSELECT 1;\n";
        let mut out = Vec::new();
        run_lines(&engine, input.as_bytes(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("CREATE TABLE\n"));
        assert!(out.contains("INSERT 0 1\n"));
        assert!(out.contains("a\n4\n"));
        assert!(out.contains("error: "));
        assert!(out.contains("t\n"));
        assert_eq!(out.matches("quiver> ").count(), 7);
    }
}
