//! 読み取り専用のサービスハンドル

use crate::format::format_value;
use std::sync::Arc;
use tansaku_service::{AsmInstruction, Breakpoint, CurrentStatus, DebugService, Register, StackFrame};

type ServiceResult<T> = tansaku_service::Result<T>;

/// デバッグサービスへの読み取り専用ハンドル
///
/// 並列に走るペインの再取得タスクにはこのハンドルだけを渡します。状態を変更する
/// 呼び出しはここからは発行できません。
#[derive(Clone)]
pub struct ServiceReader {
    service: Arc<dyn DebugService>,
}

impl ServiceReader {
    pub fn new(service: Arc<dyn DebugService>) -> Self {
        Self { service }
    }

    pub fn registers(&self) -> ServiceResult<Vec<Register>> {
        self.service.registers()
    }

    pub fn read_memory(&self, addr: u64, len: usize) -> ServiceResult<Vec<u8>> {
        self.service.read_memory(addr, len)
    }

    /// `size` バイトを読み取り、上位バイトからの16進数文字列にする
    pub fn read_value(&self, addr: u64, size: usize) -> ServiceResult<String> {
        let mem = self.service.read_memory(addr, size)?;
        Ok(format_value(&mem))
    }

    pub fn disassemble_pc(&self) -> ServiceResult<Vec<AsmInstruction>> {
        self.service.disassemble_pc()
    }

    pub fn disassemble_range(&self, start: u64, end: u64) -> ServiceResult<Vec<AsmInstruction>> {
        self.service.disassemble_range(start, end)
    }

    pub fn stacktrace(&self, depth: usize) -> ServiceResult<Vec<StackFrame>> {
        self.service.stacktrace(depth)
    }

    pub fn list_breakpoints(&self) -> ServiceResult<Vec<Breakpoint>> {
        self.service.list_breakpoints()
    }

    pub fn status(&self) -> CurrentStatus {
        self.service.status()
    }
}
