use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::debug;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use yal::config::{Config, DEFAULT_ARENA_SIZE, DEFAULT_MAX_DEPTH, EVAL_STACK_SIZE};
use yal::{Interpreter, YalResult};

const PROMPT: &str = "yal> ";
const CONTINUE_PROMPT: &str = "...  ";

#[derive(Parser, Debug)]
#[command(name = "yal", version, about = "Yet another lisp")]
struct Cli {
    /// Bytes reserved for the interpreter's arena.
    #[arg(long, env = "YAL_ARENA_SIZE", default_value_t = DEFAULT_ARENA_SIZE)]
    arena_size: usize,

    /// Maximum nesting of evaluations before giving up.
    #[arg(long, env = "YAL_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Log every procedure application.
    #[arg(long, env = "YAL_TRACE")]
    trace: bool,

    /// Evaluate a source file before starting the REPL. May be repeated.
    #[arg(long = "load", value_name = "FILE")]
    load: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.trace {
        logger.filter_level(log::LevelFilter::Trace);
    }
    logger.init();

    // Deep recursion in the evaluator needs more stack than the main thread has.
    let evaluator = std::thread::Builder::new()
        .name("yal-eval".into())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run(cli))
        .context("failed to start the evaluation thread")?;
    evaluator
        .join()
        .map_err(|_| anyhow::anyhow!("evaluation thread panicked"))?
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::default()
        .with_arena_size(cli.arena_size)
        .with_max_depth(cli.max_depth)
        .with_trace(cli.trace);
    debug!("starting with {:?}", config);
    let mut interp = Interpreter::with_config(config);

    for path in &cli.load {
        load_file(&mut interp, path)?;
    }

    if io::stdin().is_terminal() {
        println!("yal interpreter");
        println!(
            "  Arena: {} bytes, Max depth: {}, Symbols: {} interned",
            interp.heap.stats().capacity,
            interp.config().max_depth,
            interp.symbols.count()
        );
        println!("Ctrl-D to exit.\n");
        run_interactive(&mut interp)
    } else {
        run_piped(&mut interp)
    }
}

/// Evaluate a whole file; any error aborts start-up.
fn load_file(interp: &mut Interpreter, path: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    interp
        .in_region(|interp| interp.eval_str(&source).map(|_| ()))
        .with_context(|| format!("failed to load {}", path.display()))?;
    debug!("loaded {}", path.display());
    Ok(())
}

/// Interactive REPL: accumulate lines until the input is a complete expression.
fn run_interactive(interp: &mut Interpreter) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { PROMPT } else { CONTINUE_PROMPT };
        match editor.readline(prompt) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                if interp.needs_more_input(&buffer) {
                    continue;
                }
                let input = std::mem::take(&mut buffer);
                if input.trim().is_empty() {
                    continue;
                }
                if let Err(err) = editor.add_history_entry(input.trim_end()) {
                    debug!("history not updated: {}", err);
                }
                print_outputs(interp.run_line(&input));
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Piped mode: read all of stdin, then evaluate it line by line as the
/// interactive loop would.
fn run_piped(interp: &mut Interpreter) -> anyhow::Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    print_outputs(interp.run_script(&input));
    Ok(())
}

fn print_outputs(outputs: Vec<YalResult<String>>) {
    for output in outputs {
        match output {
            Ok(text) => println!("{}", text),
            Err(e) => println!("error: {}", e),
        }
    }
}
