use quiver_client::{run_repl, Engine, ReplOptions};
use quiver_common::EngineConfig;
use quiver_storage::Catalog;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args
        .first()
        .map(|a| a == "--help" || a == "-h")
        .unwrap_or(false)
    {
        print_usage();
        return Ok(());
    }

    if args.first().map(|a| a.as_str()) == Some("repl") {
        let catalog = parse_repl_opts(&args)?;
        return run_repl(ReplOptions {
            catalog,
            config: EngineConfig::default(),
        });
    }

    let opts = parse_query_opts(&args)?;
    let engine = Engine::new(EngineConfig::default())?;
    if let Some(catalog_path) = &opts.catalog {
        engine.register_catalog(&Catalog::load_from_json(catalog_path)?)?;
    }

    if opts.plan_only {
        print!("{}", engine.explain(&opts.sql)?);
    } else {
        println!("{}", engine.query(&opts.sql)?.to_string().trim_end());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct QueryOpts {
    sql: String,
    plan_only: bool,
    catalog: Option<String>,
}

fn parse_query_opts(args: &[String]) -> Result<QueryOpts, Box<dyn std::error::Error>> {
    // Forms:
    //   quiver "SELECT 1"
    //   quiver --plan "SELECT 1"
    //   quiver [--catalog path] [--plan] "SELECT ..."
    let mut sql = None;
    let mut plan_only = false;
    let mut catalog = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" => {
                i += 1;
                catalog = Some(
                    args.get(i)
                        .cloned()
                        .ok_or("missing value for --catalog")?,
                );
            }
            "--plan" => {
                plan_only = true;
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}").into());
            }
            other => {
                if sql.is_some() {
                    return Err("expected a single SQL argument".into());
                }
                sql = Some(other.to_string());
            }
        }
        i += 1;
    }

    Ok(QueryOpts {
        sql: sql.unwrap_or_else(|| "SELECT 1".to_string()),
        plan_only,
        catalog,
    })
}

fn parse_repl_opts(args: &[String]) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut catalog = None;
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" => {
                i += 1;
                catalog = Some(
                    args.get(i)
                        .cloned()
                        .ok_or("missing value for --catalog")?,
                );
            }
            other => return Err(format!("unknown argument for repl: {other}").into()),
        }
        i += 1;
    }
    Ok(catalog)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiver \"<SQL>\"");
    eprintln!("  quiver --plan \"<SQL>\"");
    eprintln!("  quiver [--catalog PATH] [--plan] \"<SQL>\"");
    eprintln!("  quiver repl [--catalog PATH]");
}
