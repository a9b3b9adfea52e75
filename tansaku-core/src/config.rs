//! コンソールの設定

/// ペインの表示に関わる設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    /// 逆アセンブルペインに表示する最大命令数
    pub disassembly_lines: usize,
    /// メモリペインに表示するバイト数
    pub memory_window: usize,
    /// スタックトレースの深さ
    pub stack_depth: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            disassembly_lines: 17,
            memory_window: 0x80,
            stack_depth: 10,
        }
    }
}

/// コンソール全体の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub view: ViewSettings,
    /// `d` コマンドで逆アセンブルする範囲のバイト数
    pub disassembly_window: u64,
    /// エラーキューの容量
    pub error_queue_capacity: usize,
    /// サイズを省略したモニター／トラッカーのバイト数
    pub default_watch_size: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            view: ViewSettings::default(),
            disassembly_window: 0x100,
            error_queue_capacity: 16,
            default_watch_size: 4,
        }
    }
}
