//! デバッグサービスが返すデータ型

use crate::parse::parse_address;

/// レジスタ（名前と、サービスが報告したままのテキスト値）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub value: String,
}

impl Register {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// 値を数値として解釈する（通常は `0x` 付きの16進数）
    pub fn as_u64(&self) -> anyhow::Result<u64> {
        parse_address(&self.value)
    }
}

/// 名前でレジスタを検索する（大文字小文字を区別しない）
pub fn find_register<'a>(regs: &'a [Register], name: &str) -> Option<&'a Register> {
    regs.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Breakpoint {
    /// 負のIDはサービス内部のブレークポイント
    pub id: i64,
    pub name: String,
    pub addr: u64,
    pub file: String,
    pub line: u32,
    pub function_name: String,
}

/// ソース上の位置
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub pc: u64,
    pub file: String,
    pub line: u32,
    /// 関数名（不明な場合は空）
    pub function: String,
}

/// 逆アセンブル結果の1命令
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsmInstruction {
    pub loc: Location,
    pub text: String,
    /// この命令にブレークポイントが設定されているか
    pub breakpoint: bool,
    pub at_pc: bool,
}

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackFrame {
    pub pc: u64,
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// デバッグ対象の現在の状態
///
/// ステップ実行や continue のたびに更新されるスナップショットです。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrentStatus {
    /// 選択中のフレーム
    pub frame: i64,
    pub thread_id: i64,
    pub goroutine_id: i64,
    pub file_path: String,
    pub file_line: u32,
    pub regs: Vec<Register>,
    pub rip: u64,
    pub rsp: u64,
    pub rbp: u64,
}

impl CurrentStatus {
    /// レジスタ一覧を設定し、よく使うレジスタ（Rip/Rsp/Rbp）をキャッシュする
    pub fn set_registers(&mut self, regs: Vec<Register>) -> anyhow::Result<()> {
        for (name, slot) in [("rip", &mut self.rip), ("rsp", &mut self.rsp), ("rbp", &mut self.rbp)] {
            if let Some(reg) = find_register(&regs, name) {
                *slot = reg.as_u64()?;
            }
        }
        self.regs = regs;
        Ok(())
    }
}
