//! Delve互換ヘッドレスサーバーのJSON-RPCクライアント
//!
//! リクエストは1行1メッセージのJSON-RPC 1.0で、メソッド名は `RPCServer.<Name>` です。
//! 1本のTCP接続をMutexで保護し、リクエストとレスポンスを1対1で対応させます。

use crate::{
    AsmInstruction, Breakpoint, CurrentStatus, DebugService, Location, Register, Result,
    ServiceError, StackFrame,
};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// `next-in` で一時ブレークポイントを探す範囲
const NEXT_INSTRUCTION_WINDOW: u64 = 0x10;
/// PC付近の逆アセンブルでPCより前に残す命令数
const INSTRUCTIONS_BEFORE_PC: usize = 4;
/// メモリ読み取りの長さをこの倍数に切り上げる
const MEMORY_READ_ALIGN: usize = 0x10;
/// `api.StacktraceSimple`
const STACKTRACE_SIMPLE: u32 = 2;
/// `api.IntelFlavour`
const INTEL_FLAVOUR: u32 = 0;

// --- ワイヤ形式 ---

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFunction {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireLocation {
    pc: u64,
    file: String,
    line: i64,
    function: Option<WireFunction>,
}

impl From<WireLocation> for Location {
    fn from(w: WireLocation) -> Self {
        Location {
            pc: w.pc,
            file: w.file,
            line: w.line.max(0) as u32,
            function: w.function.map(|f| f.name).unwrap_or_default(),
        }
    }
}

impl From<WireLocation> for StackFrame {
    fn from(w: WireLocation) -> Self {
        let loc = Location::from(w);
        StackFrame {
            pc: loc.pc,
            function: loc.function,
            file: loc.file,
            line: loc.line,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireBreakpoint {
    id: i64,
    name: String,
    addr: u64,
    file: String,
    line: i64,
    #[serde(rename = "functionName")]
    function_name: String,
}

impl From<WireBreakpoint> for Breakpoint {
    fn from(w: WireBreakpoint) -> Self {
        Breakpoint {
            id: w.id,
            name: w.name,
            addr: w.addr,
            file: w.file,
            line: w.line.max(0) as u32,
            function_name: w.function_name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct WireRegister {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct WireAsm {
    loc: WireLocation,
    text: String,
    breakpoint: bool,
    #[serde(rename = "AtPC")]
    at_pc: bool,
}

impl From<WireAsm> for AsmInstruction {
    fn from(w: WireAsm) -> Self {
        AsmInstruction {
            loc: w.loc.into(),
            text: w.text,
            breakpoint: w.breakpoint,
            at_pc: w.at_pc,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireThread {
    id: i64,
    file: String,
    line: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireGoroutine {
    id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireState {
    #[serde(rename = "currentThread")]
    current_thread: Option<WireThread>,
    #[serde(rename = "currentGoroutine")]
    current_goroutine: Option<WireGoroutine>,
    exited: bool,
    #[serde(rename = "exitStatus")]
    exit_status: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StateOut {
    state: WireState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct CreateBreakpointOut {
    breakpoint: WireBreakpoint,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ListBreakpointsOut {
    breakpoints: Vec<WireBreakpoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ListRegistersOut {
    regs: Vec<WireRegister>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct LocationsOut {
    locations: Vec<WireLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct DisassembleOut {
    disassemble: Vec<WireAsm>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ExamineMemoryOut {
    mem: Option<String>,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// Delve互換サーバーへのクライアント
pub struct DelveClient {
    conn: Mutex<Connection>,
    next_id: AtomicU64,
    status: RwLock<CurrentStatus>,
}

impl DelveClient {
    /// サーバーに接続し、現在の状態を取得する
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let writer = TcpStream::connect(addr)?;
        let reader = BufReader::new(writer.try_clone()?);
        let client = Self {
            conn: Mutex::new(Connection { reader, writer }),
            next_id: AtomicU64::new(0),
            status: RwLock::new(CurrentStatus::default()),
        };
        client.refresh_status()?;
        Ok(client)
    }

    /// 接続後、エントリシンボルにブレークポイントを設定してそこまで実行する
    pub fn connect_with_entry<A: ToSocketAddrs>(addr: A, entry: &str) -> Result<Self> {
        let client = Self::connect(addr)?;
        client.create_breakpoint_at_function(entry, "main")?;
        client.continue_execution()?;
        Ok(client)
    }

    /// RPCを1回呼び出す
    fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = format!("RPCServer.{}", method);
        debug!("rpc call {} (id={})", method, id);

        let request = json!({ "method": method, "params": [params], "id": id });
        let mut line = String::new();
        {
            let mut guard = self
                .conn
                .lock()
                .map_err(|_| ServiceError::Protocol("connection lock poisoned".into()))?;
            let conn = &mut *guard;
            serde_json::to_writer(&mut conn.writer, &request)?;
            conn.writer.write_all(b"\n")?;
            conn.writer.flush()?;
            if conn.reader.read_line(&mut line)? == 0 {
                return Err(ServiceError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "debug service closed the connection",
                )));
            }
        }

        let response: Response = serde_json::from_str(&line)?;
        if response.id != id {
            return Err(ServiceError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }
        if let Some(message) = response.error {
            return Err(ServiceError::Remote { method, message });
        }
        Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?)
    }

    fn snapshot(&self) -> CurrentStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn eval_scope(&self) -> Value {
        let status = self.snapshot();
        json!({
            "GoroutineID": status.goroutine_id,
            "Frame": status.frame,
            "DeferredCall": 0,
        })
    }

    /// 実行制御コマンドを送り、状態を更新する
    fn command(&self, name: &str) -> Result<()> {
        let out: StateOut = self.call("Command", json!({ "name": name }))?;
        if out.state.exited {
            info!("debuggee exited with status {}", out.state.exit_status);
        }
        self.refresh_status()?;
        Ok(())
    }

    /// 状態をサービスから再取得する
    pub fn refresh_status(&self) -> Result<CurrentStatus> {
        let out: StateOut = self.call("State", json!({ "NonBlocking": false }))?;
        let mut status = self.snapshot();
        status.frame = 0;
        if let Some(g) = out.state.current_goroutine.filter(|g| g.id > 0) {
            status.goroutine_id = g.id;
        }
        if let Some(thread) = out.state.current_thread {
            status.thread_id = thread.id;
            status.file_path = thread.file;
            status.file_line = thread.line.max(0) as u32;
        }

        let regs = self.thread_registers(status.thread_id)?;
        status
            .set_registers(regs)
            .map_err(|e| ServiceError::Protocol(e.to_string()))?;

        match self.status.write() {
            Ok(mut guard) => *guard = status.clone(),
            Err(poisoned) => *poisoned.into_inner() = status.clone(),
        }
        Ok(status)
    }

    fn thread_registers(&self, thread_id: i64) -> Result<Vec<Register>> {
        let out: ListRegistersOut = self.call(
            "ListThreadRegisters",
            json!({ "ThreadID": thread_id, "IncludeFp": true }),
        )?;
        Ok(out
            .regs
            .into_iter()
            .map(|r| Register::new(r.name, r.value))
            .collect())
    }
}

impl DebugService for DelveClient {
    fn create_breakpoint_at_address(&self, addr: u64, name: &str) -> Result<Breakpoint> {
        let out: CreateBreakpointOut = self.call(
            "CreateBreakpoint",
            json!({ "Breakpoint": { "addr": addr, "name": name } }),
        )?;
        Ok(out.breakpoint.into())
    }

    fn create_breakpoint_at_function(&self, function: &str, name: &str) -> Result<Breakpoint> {
        let out: LocationsOut = self.call(
            "FindLocation",
            json!({
                "Scope": self.eval_scope(),
                "Loc": function,
                "IncludeNonExecutableLines": true,
            }),
        )?;
        let location = out
            .locations
            .into_iter()
            .next()
            .map(Location::from)
            .ok_or_else(|| ServiceError::NotFound(format!("location of '{}'", function)))?;

        let out: CreateBreakpointOut = self.call(
            "CreateBreakpoint",
            json!({ "Breakpoint": { "name": name, "file": location.file, "line": location.line } }),
        )?;
        Ok(out.breakpoint.into())
    }

    fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        let out: ListBreakpointsOut = self.call("ListBreakpoints", json!({ "All": true }))?;
        Ok(out.breakpoints.into_iter().map(Breakpoint::from).collect())
    }

    fn clear_breakpoint_by_id(&self, id: i64) -> Result<()> {
        let _: Value = self.call("ClearBreakpoint", json!({ "Id": id }))?;
        Ok(())
    }

    fn clear_breakpoint_by_name(&self, name: &str) -> Result<()> {
        let _: Value = self.call("ClearBreakpoint", json!({ "Id": 0, "Name": name }))?;
        Ok(())
    }

    fn clear_breakpoint_by_address(&self, addr: u64) -> Result<()> {
        let bp = self
            .list_breakpoints()?
            .into_iter()
            .find(|bp| bp.addr == addr)
            .ok_or_else(|| ServiceError::NotFound(format!("breakpoint at 0x{:x}", addr)))?;
        self.clear_breakpoint_by_id(bp.id)
    }

    fn clear_all_breakpoints(&self) -> Result<()> {
        for bp in self.list_breakpoints()? {
            if bp.id > 0 {
                self.clear_breakpoint_by_id(bp.id)?;
            }
        }
        Ok(())
    }

    fn continue_execution(&self) -> Result<()> {
        self.command("continue")
    }

    fn step_instruction(&self) -> Result<()> {
        self.command("stepInstruction")
    }

    fn step_out(&self) -> Result<()> {
        self.command("stepOut")
    }

    fn next(&self) -> Result<()> {
        self.command("next")
    }

    /// 次の命令に一時ブレークポイントを置いて continue する
    fn next_instruction(&self) -> Result<()> {
        let pc = self.snapshot().rip;
        let asms = self.disassemble_range(pc, pc + NEXT_INSTRUCTION_WINDOW)?;
        let next_pc = asms
            .iter()
            .position(|asm| asm.loc.pc == pc)
            .and_then(|i| asms.get(i + 1))
            .map(|asm| asm.loc.pc)
            .ok_or_else(|| ServiceError::NotFound(format!("instruction after 0x{:x}", pc)))?;

        let bp = self.create_breakpoint_at_address(next_pc, "")?;
        let continued = self.continue_execution();
        let cleared = self.clear_breakpoint_by_id(bp.id);
        continued?;
        cleared
    }

    fn restart(&self) -> Result<()> {
        let _: Value = self.call("Restart", json!({ "Rebuild": false }))?;
        self.continue_execution()
    }

    fn registers(&self) -> Result<Vec<Register>> {
        self.thread_registers(self.snapshot().thread_id)
    }

    fn read_memory(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let aligned = len.div_ceil(MEMORY_READ_ALIGN) * MEMORY_READ_ALIGN;
        let out: ExamineMemoryOut =
            self.call("ExamineMemory", json!({ "Address": addr, "Length": aligned }))?;
        let mut mem = match out.mem {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| ServiceError::Protocol(format!("invalid memory payload: {}", e)))?,
            None => Vec::new(),
        };
        if mem.len() < len {
            return Err(ServiceError::Remote {
                method: "RPCServer.ExamineMemory".into(),
                message: format!("short read: {} of {} bytes at 0x{:x}", mem.len(), len, addr),
            });
        }
        mem.truncate(len);
        Ok(mem)
    }

    fn disassemble_pc(&self) -> Result<Vec<AsmInstruction>> {
        let pc = self.snapshot().rip;
        let out: DisassembleOut = self.call(
            "Disassemble",
            json!({
                "Scope": self.eval_scope(),
                "StartPC": pc,
                "EndPC": 0,
                "Flavour": INTEL_FLAVOUR,
            }),
        )?;
        let asms: Vec<AsmInstruction> = out.disassemble.into_iter().map(Into::into).collect();
        let pc_index = asms.iter().rposition(|asm| asm.loc.pc == pc).unwrap_or(0);
        let start = pc_index.saturating_sub(INSTRUCTIONS_BEFORE_PC);
        Ok(asms.into_iter().skip(start).collect())
    }

    fn disassemble_range(&self, start: u64, end: u64) -> Result<Vec<AsmInstruction>> {
        let out: DisassembleOut = self.call(
            "Disassemble",
            json!({
                "Scope": self.eval_scope(),
                "StartPC": start,
                "EndPC": end,
                "Flavour": INTEL_FLAVOUR,
            }),
        )?;
        Ok(out.disassemble.into_iter().map(Into::into).collect())
    }

    fn stacktrace(&self, depth: usize) -> Result<Vec<StackFrame>> {
        let out: LocationsOut = self.call(
            "Stacktrace",
            json!({
                "Id": self.snapshot().goroutine_id,
                "Depth": depth,
                "Full": false,
                "Defers": false,
                "Opts": STACKTRACE_SIMPLE,
            }),
        )?;
        Ok(out.locations.into_iter().map(StackFrame::from).collect())
    }

    fn status(&self) -> CurrentStatus {
        self.snapshot()
    }
}
