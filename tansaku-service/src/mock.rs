//! インメモリのデバッグサービス
//!
//! 実際のデバッグサーバーなしでコンソールを動かすための実装です。
//! 呼び出しを全て記録し、メソッド単位で失敗を注入できます。

use crate::{
    AsmInstruction, Breakpoint, CurrentStatus, DebugService, Location, Register, Result,
    ServiceError, StackFrame,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
    regs: Vec<Register>,
    memory: BTreeMap<u64, u8>,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: i64,
    functions: BTreeMap<String, Location>,
    instructions: Vec<AsmInstruction>,
    frames: Vec<StackFrame>,
    calls: Vec<String>,
    failing: HashSet<String>,
}

/// インメモリのデバッグサービス
#[derive(Default)]
pub struct MockService {
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 呼び出しを記録し、失敗が注入されていればエラーを返す
    fn record(&self, call: &str) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.failing.contains(call) {
            return Err(ServiceError::Unavailable(call.to_string()));
        }
        Ok(state)
    }

    /// レジスタを設定する（既存の同名レジスタは上書き）
    pub fn set_register(&self, name: &str, value: u64) {
        let mut state = self.lock();
        let value = format!("0x{:x}", value);
        match state.regs.iter_mut().find(|r| r.name.eq_ignore_ascii_case(name)) {
            Some(reg) => reg.value = value,
            None => state.regs.push(Register::new(name, value)),
        }
    }

    /// メモリにバイト列を書き込む
    pub fn write_memory(&self, addr: u64, bytes: &[u8]) {
        let mut state = self.lock();
        for (offset, byte) in bytes.iter().enumerate() {
            state.memory.insert(addr + offset as u64, *byte);
        }
    }

    /// 関数シンボルの位置を登録する
    pub fn add_function(&self, name: &str, location: Location) {
        self.lock().functions.insert(name.to_string(), location);
    }

    pub fn set_instructions(&self, instructions: Vec<AsmInstruction>) {
        self.lock().instructions = instructions;
    }

    pub fn set_frames(&self, frames: Vec<StackFrame>) {
        self.lock().frames = frames;
    }

    /// 指定したメソッドの呼び出しを失敗させる
    pub fn fail_on(&self, method: &str) {
        self.lock().failing.insert(method.to_string());
    }

    /// 失敗の注入を解除する
    pub fn recover(&self, method: &str) {
        self.lock().failing.remove(method);
    }

    /// 記録された呼び出しの一覧
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// 指定したメソッドが呼ばれた回数
    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == method).count()
    }

    fn register_value(state: &MockState, name: &str) -> u64 {
        state
            .regs
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .and_then(|r| r.as_u64().ok())
            .unwrap_or(0)
    }

    fn push_breakpoint(state: &mut MockState, mut bp: Breakpoint) -> Breakpoint {
        state.next_breakpoint_id += 1;
        bp.id = state.next_breakpoint_id;
        state.breakpoints.push(bp.clone());
        bp
    }
}

impl DebugService for MockService {
    fn create_breakpoint_at_address(&self, addr: u64, name: &str) -> Result<Breakpoint> {
        let mut state = self.record("create_breakpoint_at_address")?;
        let function_name = state
            .functions
            .iter()
            .find(|(_, loc)| loc.pc == addr)
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        let bp = Breakpoint {
            name: name.to_string(),
            addr,
            function_name,
            ..Default::default()
        };
        Ok(Self::push_breakpoint(&mut state, bp))
    }

    fn create_breakpoint_at_function(&self, function: &str, name: &str) -> Result<Breakpoint> {
        let mut state = self.record("create_breakpoint_at_function")?;
        let loc = state
            .functions
            .get(function)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("location of '{}'", function)))?;
        let bp = Breakpoint {
            name: name.to_string(),
            addr: loc.pc,
            file: loc.file,
            line: loc.line,
            function_name: function.to_string(),
            ..Default::default()
        };
        Ok(Self::push_breakpoint(&mut state, bp))
    }

    fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        let state = self.record("list_breakpoints")?;
        Ok(state.breakpoints.clone())
    }

    fn clear_breakpoint_by_id(&self, id: i64) -> Result<()> {
        let mut state = self.record("clear_breakpoint_by_id")?;
        let before = state.breakpoints.len();
        state.breakpoints.retain(|bp| bp.id != id);
        if state.breakpoints.len() == before {
            return Err(ServiceError::NotFound(format!("breakpoint {}", id)));
        }
        Ok(())
    }

    fn clear_breakpoint_by_name(&self, name: &str) -> Result<()> {
        let mut state = self.record("clear_breakpoint_by_name")?;
        let before = state.breakpoints.len();
        state.breakpoints.retain(|bp| bp.name != name);
        if state.breakpoints.len() == before {
            return Err(ServiceError::NotFound(format!("breakpoint '{}'", name)));
        }
        Ok(())
    }

    fn clear_breakpoint_by_address(&self, addr: u64) -> Result<()> {
        let mut state = self.record("clear_breakpoint_by_address")?;
        let before = state.breakpoints.len();
        state.breakpoints.retain(|bp| bp.addr != addr);
        if state.breakpoints.len() == before {
            return Err(ServiceError::NotFound(format!("breakpoint at 0x{:x}", addr)));
        }
        Ok(())
    }

    fn clear_all_breakpoints(&self) -> Result<()> {
        let mut state = self.record("clear_all_breakpoints")?;
        state.breakpoints.retain(|bp| bp.id <= 0);
        Ok(())
    }

    fn continue_execution(&self) -> Result<()> {
        self.record("continue_execution").map(drop)
    }

    fn step_instruction(&self) -> Result<()> {
        self.record("step_instruction").map(drop)
    }

    fn step_out(&self) -> Result<()> {
        self.record("step_out").map(drop)
    }

    fn next(&self) -> Result<()> {
        self.record("next").map(drop)
    }

    fn next_instruction(&self) -> Result<()> {
        self.record("next_instruction").map(drop)
    }

    fn restart(&self) -> Result<()> {
        self.record("restart").map(drop)
    }

    fn registers(&self) -> Result<Vec<Register>> {
        let state = self.record("registers")?;
        Ok(state.regs.clone())
    }

    fn read_memory(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let state = self.record("read_memory")?;
        Ok((0..len as u64)
            .map(|offset| state.memory.get(&(addr + offset)).copied().unwrap_or(0))
            .collect())
    }

    fn disassemble_pc(&self) -> Result<Vec<AsmInstruction>> {
        let state = self.record("disassemble_pc")?;
        Ok(state.instructions.clone())
    }

    fn disassemble_range(&self, start: u64, end: u64) -> Result<Vec<AsmInstruction>> {
        let state = self.record("disassemble_range")?;
        Ok(state
            .instructions
            .iter()
            .filter(|asm| asm.loc.pc >= start && asm.loc.pc < end)
            .cloned()
            .collect())
    }

    fn stacktrace(&self, depth: usize) -> Result<Vec<StackFrame>> {
        let state = self.record("stacktrace")?;
        Ok(state.frames.iter().take(depth).cloned().collect())
    }

    fn status(&self) -> CurrentStatus {
        let state = self.lock();
        CurrentStatus {
            regs: state.regs.clone(),
            rip: Self::register_value(&state, "rip"),
            rsp: Self::register_value(&state, "rsp"),
            rbp: Self::register_value(&state, "rbp"),
            ..Default::default()
        }
    }
}
