//! デバッグサービスのインターフェース

use crate::{AsmInstruction, Breakpoint, CurrentStatus, Register, Result, StackFrame};

/// 外部デバッグサービス
///
/// 接続は全てのペインとコマンドハンドラで共有されます。読み取り系の呼び出しは
/// 並列に発行して構いませんが、デバッグ対象の状態を変更する呼び出し
/// （continue、ステップ、ブレークポイント編集）はコマンドループからのみ発行します。
pub trait DebugService: Send + Sync {
    // --- ブレークポイント ---

    /// アドレスにブレークポイントを作成する
    fn create_breakpoint_at_address(&self, addr: u64, name: &str) -> Result<Breakpoint>;

    /// 関数シンボルにブレークポイントを作成する
    fn create_breakpoint_at_function(&self, function: &str, name: &str) -> Result<Breakpoint>;

    fn list_breakpoints(&self) -> Result<Vec<Breakpoint>>;

    fn clear_breakpoint_by_id(&self, id: i64) -> Result<()>;

    fn clear_breakpoint_by_name(&self, name: &str) -> Result<()>;

    /// アドレスが一致するブレークポイントを削除する
    fn clear_breakpoint_by_address(&self, addr: u64) -> Result<()>;

    /// ユーザーが設定した全てのブレークポイントを削除する
    fn clear_all_breakpoints(&self) -> Result<()>;

    // --- 実行制御 ---

    /// 次のブレークポイントまで実行する
    fn continue_execution(&self) -> Result<()>;

    /// 命令単位でステップ実行する（関数内に入る）
    fn step_instruction(&self) -> Result<()>;

    /// 現在の関数から抜ける
    fn step_out(&self) -> Result<()>;

    /// ソース行単位で次の行へ（関数内に入らない）
    fn next(&self) -> Result<()>;

    /// 命令単位で次の命令へ（関数内に入らない）
    fn next_instruction(&self) -> Result<()>;

    /// デバッグ対象を再起動し、エントリのブレークポイントまで実行する
    fn restart(&self) -> Result<()>;

    // --- 読み取り ---

    /// 現在のスレッドの全レジスタを取得する
    fn registers(&self) -> Result<Vec<Register>>;

    /// `addr` から `len` バイト読み取る
    fn read_memory(&self, addr: u64, len: usize) -> Result<Vec<u8>>;

    /// プログラムカウンタ付近を逆アセンブルする
    fn disassemble_pc(&self) -> Result<Vec<AsmInstruction>>;

    /// `[start, end)` の範囲を逆アセンブルする
    fn disassemble_range(&self, start: u64, end: u64) -> Result<Vec<AsmInstruction>>;

    fn stacktrace(&self, depth: usize) -> Result<Vec<StackFrame>>;

    /// 最後に取得した状態のスナップショット
    fn status(&self) -> CurrentStatus;
}
