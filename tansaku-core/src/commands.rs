//! 組み込みコマンド
//!
//! 各ハンドラは自分で引数の数を確認し、合わなければエラーではなくヘルプを
//! 表示します。状態を変更するサービス呼び出しはここ（コマンドループ）からだけ
//! 発行します。

use crate::console::Console;
use crate::errors::{ERR_INVALID_PANE, ERR_INVALID_SIZE, ERR_NO_SUCH_TRACKER};
use crate::eval::format_address;
use crate::focus::Focus;
use crate::format::{format_disassembly, format_memory, ExamineFormat};
use crate::pane::{PaneSlot, ViewRole};
use crate::registry::{CommandRegistry, RegistryError};
use crate::watch::WatchEntry;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use tansaku_service::parse::parse_address;
use tansaku_service::DebugService;

/// 組み込みコマンドを全て登録したレジストリを作る
pub fn builtin_registry() -> std::result::Result<CommandRegistry<Console>, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry.register(&["quit", "q", "exit"], quit, "q/quit/exit: quit the debugger")?;
    registry.register(
        &["break", "b"],
        create_breakpoint,
        "b/break <address|function> [name]: set a breakpoint, optionally named",
    )?;
    registry.register(
        &["continue", "c"],
        continue_execution,
        "c/continue: run until the next breakpoint",
    )?;
    registry.register(
        &["step-in", "si"],
        step_in,
        "si/step-in: execute one instruction, entering calls",
    )?;
    registry.register(
        &["step-out", "so"],
        step_out,
        "so/step-out: run until the current function returns",
    )?;
    registry.register(
        &["next", "n"],
        next,
        "n/next: step one source line without entering calls",
    )?;
    registry.register(
        &["next-in", "ni"],
        next_in,
        "ni/next-in: step one instruction without entering calls",
    )?;
    registry.register(
        &["clear"],
        clear_breakpoint,
        "clear <id|address|name>: delete one breakpoint",
    )?;
    registry.register(&["clear-all"], clear_all, "clear-all: delete every breakpoint")?;
    registry.register(
        &["run", "r"],
        run,
        "r/run: restart the program and run to the entry breakpoint",
    )?;
    registry.register(
        &["x"],
        examine_memory,
        "x [b|h|w|g][x|d] <expr>: examine memory at expr (default gx)",
    )?;
    registry.register(
        &["disassemble", "d"],
        disassemble,
        "d/disassemble <expr>: disassemble from the address of expr",
    )?;
    registry.register(
        &["list-breakpoints", "lb"],
        list_breakpoints,
        "lb/list-breakpoints: list all breakpoints",
    )?;
    registry.register(
        &["stacktrace", "st"],
        stacktrace,
        "st/stacktrace: show the current call stack",
    )?;
    registry.register(&["history"], history, "history: show entered commands")?;
    registry.register(
        &["focus", "f"],
        focus,
        "f/focus <0-4>: focus a pane (0 is the command line)",
    )?;
    registry.register(
        &["print", "p"],
        print,
        "p/print <expr> <size>: show size bytes at the address of expr",
    )?;
    registry.register(
        &["monitor", "m"],
        monitor,
        "m/monitor [expr] [size=4]: watch an address after every command",
    )?;
    registry.register(
        &["track"],
        track,
        "track <add|rm|poll|list> <address> [size=4]: track an address on request",
    )?;
    registry.register(&["help", "h"], help, "h/help <command>: show usage of a command")?;
    Ok(registry)
}

fn parse_size(size: &str) -> Result<usize> {
    match size.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(anyhow!("{} '{}'", ERR_INVALID_SIZE, size)),
    }
}

/// 状態を変更する呼び出しを1回行い、全ペインを取得し直す
fn run_and_refresh<F>(console: &mut Console, action: &str, call: F) -> Result<()>
where
    F: FnOnce(&dyn DebugService) -> tansaku_service::Result<()>,
{
    call(console.service().as_ref()).with_context(|| format!("{} failed", action))?;
    console.refresh_all()
}

/// ブレークポイントの変更後にペインを既定の役割に戻す
fn show_breakpoints(console: &mut Console) -> Result<()> {
    console.select(PaneSlot::Disassembly, ViewRole::Disassembly);
    console.select(PaneSlot::Auxiliary, ViewRole::Breakpoints);
    console.refresh_all()
}

fn quit(console: &mut Console, _args: &[&str]) -> Result<()> {
    console.stop();
    Ok(())
}

fn create_breakpoint(console: &mut Console, args: &[&str]) -> Result<()> {
    let (location, name) = match args {
        [location] => (*location, ""),
        [location, name] => (*location, *name),
        _ => {
            console.show_help("b");
            return Ok(());
        }
    };

    let service = console.service().clone();
    if location.starts_with("0x") {
        let addr = parse_address(location)?;
        service
            .create_breakpoint_at_address(addr, name)
            .with_context(|| format!("failed to set breakpoint at {}", location))?;
    } else {
        service
            .create_breakpoint_at_function(location, name)
            .with_context(|| format!("failed to set breakpoint on {}", location))?;
    }

    console.select(PaneSlot::Auxiliary, ViewRole::Breakpoints);
    console.refresh_all()
}

fn continue_execution(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "continue", |s| s.continue_execution())
}

fn step_in(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "step-in", |s| s.step_instruction())
}

fn step_out(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "step-out", |s| s.step_out())
}

fn next(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "next", |s| s.next())
}

fn next_in(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "next-in", |s| s.next_instruction())
}

fn run(console: &mut Console, _args: &[&str]) -> Result<()> {
    run_and_refresh(console, "restart", |s| s.restart())
}

/// 引数を id、アドレス、名前の順に解釈して1つ削除する
fn clear_breakpoint(console: &mut Console, args: &[&str]) -> Result<()> {
    let [target] = args else {
        console.show_help("clear");
        return Ok(());
    };

    let service = console.service().clone();
    let cleared = if let Ok(id) = target.parse::<i64>() {
        service.clear_breakpoint_by_id(id)
    } else if let Ok(addr) = parse_address(target) {
        service.clear_breakpoint_by_address(addr)
    } else {
        service.clear_breakpoint_by_name(target)
    };
    cleared.with_context(|| format!("failed to clear breakpoint {}", target))?;

    show_breakpoints(console)
}

fn clear_all(console: &mut Console, _args: &[&str]) -> Result<()> {
    console
        .service()
        .clear_all_breakpoints()
        .context("failed to clear breakpoints")?;
    show_breakpoints(console)
}

fn examine_memory(console: &mut Console, args: &[&str]) -> Result<()> {
    let (format, expr) = match args {
        [expr] => (ExamineFormat::default(), *expr),
        [flags, expr] => match ExamineFormat::parse(flags) {
            Some(format) => (format, *expr),
            None => {
                console.show_help("x");
                return Ok(());
            }
        },
        _ => {
            console.show_help("x");
            return Ok(());
        }
    };

    let addr = console.evaluate(expr)?;
    let len = console.config().view.memory_window;
    let mem = console
        .service()
        .read_memory(addr, len)
        .with_context(|| format!("failed to read memory at {}", format_address(addr)))?;
    console.show(
        PaneSlot::Memory,
        ViewRole::StackMemory.title(),
        format_memory(&mem, addr, format),
    );
    Ok(())
}

fn disassemble(console: &mut Console, args: &[&str]) -> Result<()> {
    let [expr] = args else {
        console.show_help("d");
        return Ok(());
    };

    let start = console.evaluate(expr)?;
    let end = start.saturating_add(console.config().disassembly_window);
    let asms = console
        .service()
        .disassemble_range(start, end)
        .with_context(|| format!("failed to disassemble {}", format_address(start)))?;
    let pc = console.service().status().rip;
    let lines = format_disassembly(&asms, pc, console.config().view.disassembly_lines);
    console.show(PaneSlot::Disassembly, ViewRole::Disassembly.title(), lines);
    Ok(())
}

fn list_breakpoints(console: &mut Console, _args: &[&str]) -> Result<()> {
    console.select(PaneSlot::Auxiliary, ViewRole::Breakpoints);
    console.refresh_all()
}

fn stacktrace(console: &mut Console, _args: &[&str]) -> Result<()> {
    console.select(PaneSlot::Auxiliary, ViewRole::Stacktrace);
    console.refresh_all()
}

fn history(console: &mut Console, _args: &[&str]) -> Result<()> {
    console.select(PaneSlot::Auxiliary, ViewRole::History);
    console.refresh_all()
}

fn focus(console: &mut Console, args: &[&str]) -> Result<()> {
    let [index] = args else {
        console.show_help("f");
        return Ok(());
    };
    let index: usize = index
        .parse()
        .map_err(|_| anyhow!("{} '{}'", ERR_INVALID_PANE, index))?;
    match Focus::from_index(index) {
        Some(target) => console.focus(target),
        None => console.show_help("f"),
    }
    Ok(())
}

fn print(console: &mut Console, args: &[&str]) -> Result<()> {
    let [expr, size] = args else {
        console.show_help("p");
        return Ok(());
    };
    let addr = console.evaluate(expr)?;
    let size = parse_size(size)?;
    let value = console
        .reader()
        .read_value(addr, size)
        .with_context(|| format!("failed to read memory at {}", format_address(addr)))?;
    console.show(
        PaneSlot::Auxiliary,
        "Print",
        vec![format!("{}  {}", format_address(addr), value)],
    );
    Ok(())
}

/// モニターを追加（引数があれば）し、モニター一覧を表示する
fn monitor(console: &mut Console, args: &[&str]) -> Result<()> {
    let default_size = console.config().default_watch_size;
    let request = match args {
        [] => None,
        [expr] => Some((*expr, default_size)),
        [expr, size] => Some((*expr, parse_size(size)?)),
        _ => {
            console.show_help("m");
            return Ok(());
        }
    };

    if let Some((expr, size)) = request {
        let key = format_address(console.evaluate(expr)?);
        console.monitors_mut().add(WatchEntry::new(key, size));
    }
    console.poll_monitors();
    console.select(PaneSlot::Auxiliary, ViewRole::Monitors);
    console.refresh_all()
}

fn track(console: &mut Console, args: &[&str]) -> Result<()> {
    let default_size = console.config().default_watch_size;
    match args {
        [] | ["list"] => {}
        ["add", addr] => add_tracker(console, addr, default_size)?,
        ["add", addr, size] => add_tracker(console, addr, parse_size(size)?)?,
        ["rm" | "remove", addr] => {
            if !console.trackers_mut().remove(addr) {
                bail!("{} '{}'", ERR_NO_SUCH_TRACKER, addr);
            }
        }
        ["poll"] => {
            console.poll_trackers();
        }
        _ => {
            console.show_help("track");
            return Ok(());
        }
    }
    console.select(PaneSlot::Auxiliary, ViewRole::Trackers);
    console.refresh_all()
}

/// トラッカーを追加する。キーは入力した文字列のままで、初期値を読み取っておく
fn add_tracker(console: &mut Console, key: &str, size: usize) -> Result<()> {
    if console.trackers().contains(key) {
        return Ok(());
    }
    let addr = parse_address(key)?;
    let value = console
        .reader()
        .read_value(addr, size)
        .with_context(|| format!("failed to read memory at {}", key))?;
    console
        .trackers_mut()
        .add(WatchEntry::new(key, size).with_value(value));
    Ok(())
}

fn help(console: &mut Console, args: &[&str]) -> Result<()> {
    match args {
        [verb] => console.show_help(verb),
        _ => console.show_help("h"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_aliases() {
        let registry = builtin_registry().unwrap();
        for alias in [
            "quit", "q", "exit", "b", "break", "c", "continue", "si", "step-in", "so", "step-out",
            "n", "next", "ni", "next-in", "clear", "clear-all", "r", "run", "x", "d",
            "disassemble", "lb", "list-breakpoints", "st", "stacktrace", "history", "f", "focus",
            "p", "print", "m", "monitor", "track", "h", "help",
        ] {
            assert!(registry.lookup(alias).is_some(), "missing alias {}", alias);
        }
        assert_eq!(registry.aliases().len(), 36);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8").unwrap(), 8);
        assert!(parse_size("0").is_err());
        assert!(parse_size("eight").is_err());
    }
}
