//! Tansaku CLI - コマンドラインインターフェース
//!
//! Delve互換のデバッグサービスに接続する4ペイン型コンソール

use anyhow::{Context as _, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::fs::File;
use std::sync::{Arc, Mutex};
use tansaku_core::format::{MARKUP_RED, MARKUP_RESET, MARKUP_YELLOW};
use tansaku_core::{
    CommandRegistry, Console, ConsoleConfig, DebugService, DelveClient, Focus, PaneSlot,
    PaneTargets, TextPane,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tansaku - Delve frontend console
#[derive(Parser)]
#[command(name = "tansaku")]
#[command(version = "0.1.0")]
#[command(about = "Four-pane debugger console for a Delve-compatible headless server", long_about = None)]
struct Cli {
    /// Address of the headless debug server
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    addr: String,

    /// Function to stop at after connecting
    #[arg(short, long, default_value = "main.main")]
    entry: String,

    /// Connect without setting the entry breakpoint
    #[arg(long)]
    no_entry: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<String>,

    /// Number of frames in the stacktrace pane
    #[arg(long)]
    stack_depth: Option<usize>,

    /// Number of bytes shown in the memory pane
    #[arg(long)]
    memory_window: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    println!("Tansaku - Delve frontend console");
    println!("Version 0.1.0");
    println!();

    let service = init_service(&cli)?;
    let panes: Vec<Arc<TextPane>> = (0..4).map(|_| Arc::new(TextPane::new())).collect();
    let targets = PaneTargets {
        disassembly: panes[0].clone(),
        registers: panes[1].clone(),
        memory: panes[2].clone(),
        auxiliary: panes[3].clone(),
    };

    let mut console = Console::new(service, targets, build_config(&cli))?;
    console.redraw();
    print_panes(&panes, console.current_focus());

    run_repl(&mut console, &panes)?;
    console.shutdown();

    Ok(())
}

/// ログ出力を初期化する
///
/// `RUST_LOG` があればそちらを優先します。
fn init_logging(cli: &Cli) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// コマンドライン引数から設定を組み立てる
fn build_config(cli: &Cli) -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    if let Some(depth) = cli.stack_depth {
        config.view.stack_depth = depth;
    }
    if let Some(window) = cli.memory_window {
        config.view.memory_window = window;
    }
    config
}

/// デバッグサービスに接続する（失敗したら起動を中止する）
fn init_service(cli: &Cli) -> Result<Arc<dyn DebugService>> {
    println!("Connecting to {}", cli.addr);

    let connected = if cli.no_entry {
        DelveClient::connect(cli.addr.as_str())
    } else {
        DelveClient::connect_with_entry(cli.addr.as_str(), &cli.entry)
    };
    let client = connected
        .with_context(|| format!("failed to connect to debug server at {}", cli.addr))?;

    info!("connected to {}", cli.addr);
    if !cli.no_entry {
        println!("Stopped at {}", cli.entry);
    }
    println!();

    Ok(Arc::new(client))
}

/// コマンド名の補完を行うrustylineヘルパー
struct CommandCompleter {
    registry: Arc<CommandRegistry<Console>>,
}

impl CommandCompleter {
    fn new(console: &Console) -> Self {
        Self {
            registry: Arc::clone(console.registry()),
        }
    }

    /// 先頭の単語だけを補完する
    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let head = &line[..pos];
        if head.contains(char::is_whitespace) {
            return (pos, Vec::new());
        }
        let candidates = self
            .registry
            .complete(head)
            .into_iter()
            .map(str::to_string)
            .collect();
        (0, candidates)
    }
}

impl Completer for CommandCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}

/// REPLループを実行する
fn run_repl(console: &mut Console, panes: &[Arc<TextPane>]) -> Result<()> {
    println!("Type 'h <command>' for help, 'q' to exit. An empty line repeats the last command.");
    println!();

    let mut rl: Editor<CommandCompleter, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(CommandCompleter::new(console)));

    loop {
        let readline = rl.readline("(tansaku) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    rl.add_history_entry(line)?;
                }

                if !console.submit(line) {
                    break;
                }
                print_panes(panes, console.current_focus());
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// 4つのペインを枠付きで表示する
fn print_panes(panes: &[Arc<TextPane>], focus: Focus) {
    for (slot, pane) in PaneSlot::ALL.iter().zip(panes) {
        let focused = focus == Focus::Pane(*slot);
        let header = format!("-[{}] {} ", slot.index(), pane.title());
        let border = if focused {
            header.bold().green()
        } else {
            header.dimmed()
        };
        println!("{}", border);
        for line in pane.lines() {
            println!("  {}", colorize(&line));
        }
    }
    println!();
}

/// 強調用マークアップを端末の色に変換する
fn colorize(line: &str) -> String {
    let mut out = String::new();
    let mut rest = line;
    let mut current = MARKUP_RESET;

    loop {
        let next = [MARKUP_RED, MARKUP_YELLOW, MARKUP_RESET]
            .iter()
            .filter_map(|tag| rest.find(tag).map(|at| (at, *tag)))
            .min_by_key(|(at, _)| *at);

        let Some((at, tag)) = next else {
            out.push_str(&paint(current, rest).to_string());
            break;
        };
        out.push_str(&paint(current, &rest[..at]).to_string());
        rest = &rest[at + tag.len()..];
        current = tag;
    }
    out
}

fn paint(tag: &str, text: &str) -> ColoredString {
    match tag {
        MARKUP_RED => text.red(),
        MARKUP_YELLOW => text.yellow(),
        _ => text.normal(),
    }
}
