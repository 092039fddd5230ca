mod debug_report;

use sentiro::{AnnotatedClause, CompiledRules, Engine, EngineConfig, Lexicon};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

fn main() {
    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: CliConfig) -> sentiro::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_override()?;
    init_tracing(&config);

    let lexicon = match &cli.lexicon {
        Some(dir) => Lexicon::from_dir(dir)?,
        None => Lexicon::default(),
    };
    let rules = CompiledRules::from_file(&cli.rules, &lexicon)?;
    tracing::info!(patterns = rules.len(), rules = %cli.rules.display(), "rules compiled");
    let engine = Engine::new(rules, lexicon, config);

    let clauses: Vec<AnnotatedClause> = serde_json::from_str(&cli.input)?;
    let output = engine.extract(&clauses);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output.results)?);
    } else {
        debug_report::print_run(&clauses, &output, cli.color);
    }
    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

struct CliConfig {
    rules: PathBuf,
    lexicon: Option<PathBuf>,
    config: Option<PathBuf>,
    input: String,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut rules: Option<PathBuf> = None;
    let mut lexicon: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut input_path: Option<PathBuf> = None;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("sentiro {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "--rules" | "-r" => rules = Some(option_value(&mut args, "--rules")?),
            "--lexicon" | "-l" => lexicon = Some(option_value(&mut args, "--lexicon")?),
            "--config" | "-c" => config = Some(option_value(&mut args, "--config")?),
            "--" => {
                if let Some(path) = args.next() {
                    set_input(&mut input_path, path)?;
                }
                if args.next().is_some() {
                    return Err("error: expected a single input file".to_string());
                }
                break;
            }
            _ if arg.starts_with("--rules=") => rules = Some(PathBuf::from(arg.trim_start_matches("--rules="))),
            _ if arg.starts_with("--lexicon=") => lexicon = Some(PathBuf::from(arg.trim_start_matches("--lexicon="))),
            _ if arg.starts_with("--config=") => config = Some(PathBuf::from(arg.trim_start_matches("--config="))),
            _ if arg.starts_with('-') && arg != "-" => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => set_input(&mut input_path, arg)?,
        }
    }

    let rules = rules.ok_or_else(|| format!("error: --rules is required\n\n{}", help_text()))?;
    let input = match input_path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .map_err(|err| format!("error: failed to read {}: {err}", path.display()))?,
        _ => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { rules, lexicon, config, input, json, color })
}

fn option_value(args: &mut impl Iterator<Item = String>, name: &str) -> Result<PathBuf, String> {
    args.next().map(PathBuf::from).ok_or_else(|| format!("error: {name} expects a value"))
}

fn set_input(input: &mut Option<PathBuf>, value: String) -> Result<(), String> {
    if input.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *input = Some(PathBuf::from(value));
    Ok(())
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "sentiro {version}

Rule-based opinion tuple extraction over dependency-annotated clauses.

Usage:
  sentiro --rules <file> [OPTIONS] [--] [<clauses.json>]

The input is a JSON array of annotated clauses:
  [{{\"text\": \"...\", \"tokens\": [{{\"index\": 0, \"text\": \"I\", \"lemma\": \"I\",
     \"pos\": \"PRON\", \"dep\": \"nsubj\", \"head\": 1, \"start\": 0, \"end\": 1}}, ...]}}]
It is read from <clauses.json>, or from stdin when omitted or '-'.

Options:
  -r, --rules <file>         Pattern rule file (required).
  -l, --lexicon <dir>        Lexicon directory. Default: empty lexicon.
  -c, --config <file>        TOML engine configuration.
  --json                     Print results as JSON instead of the report.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG, SENTIRO_LOG      Log filter (logs go to stderr).
  SENTIRO_LOG_JSON           `true` for JSON log lines.

Exit codes:
  0  Success.
  1  Rule, lexicon, config or input error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
