//! ビューペイン
//!
//! ペインは「どのデータを表示するか」（[`ViewRole`]）と「いま何が描画されているか」
//! （`data` と描画先）を分けて持ちます。役割の切り替えは `role` と `title` の
//! 付け替えだけで、データの取得は次の一括再取得でまとめて行われます。

use crate::config::ViewSettings;
use crate::format::{
    format_breakpoints, format_disassembly, format_memory, format_registers, format_stacktrace,
    ExamineFormat,
};
use crate::reader::ServiceReader;
use crate::render::RenderTarget;
use crate::Result;
use anyhow::Context;
use std::fmt;
use std::sync::Arc;

/// 任意の再取得処理
pub type RefreshFn = Arc<dyn Fn(&RefreshContext) -> Result<Vec<String>> + Send + Sync>;

/// ペインの位置（`f` コマンドの番号に対応）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaneSlot {
    Disassembly = 1,
    Registers = 2,
    Memory = 3,
    Auxiliary = 4,
}

impl PaneSlot {
    pub const ALL: [PaneSlot; 4] = [
        PaneSlot::Disassembly,
        PaneSlot::Registers,
        PaneSlot::Memory,
        PaneSlot::Auxiliary,
    ];

    /// 1始まりの番号から変換する
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index.checked_sub(1)?).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 再取得処理に渡される読み取り専用の文脈
///
/// 再取得は並列に走るので、コンソールの状態はここにスナップショットとして
/// 取り出してから渡します。
#[derive(Clone)]
pub struct RefreshContext {
    pub reader: ServiceReader,
    pub view: ViewSettings,
    pub history: Arc<Vec<String>>,
    pub monitors: Arc<Vec<String>>,
    pub trackers: Arc<Vec<String>>,
}

impl RefreshContext {
    pub fn new(reader: ServiceReader, view: ViewSettings) -> Self {
        Self {
            reader,
            view,
            history: Arc::default(),
            monitors: Arc::default(),
            trackers: Arc::default(),
        }
    }
}

/// ペインの役割（どのデータで埋めるか）
#[derive(Clone)]
pub enum ViewRole {
    /// PC付近の逆アセンブル
    Disassembly,
    Registers,
    /// スタックポインタから始まるメモリ
    StackMemory,
    Stacktrace,
    Breakpoints,
    /// 入力したコマンドの履歴
    History,
    Monitors,
    Trackers,
    Custom { title: String, op: RefreshFn },
}

impl ViewRole {
    /// 任意の処理でペインを埋める役割を作る
    pub fn custom<F>(title: impl Into<String>, op: F) -> Self
    where
        F: Fn(&RefreshContext) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        ViewRole::Custom {
            title: title.into(),
            op: Arc::new(op),
        }
    }

    pub fn title(&self) -> String {
        match self {
            ViewRole::Disassembly => "Disassembly".to_string(),
            ViewRole::Registers => "Registers".to_string(),
            ViewRole::StackMemory => "Memory".to_string(),
            ViewRole::Stacktrace => "Stacktrace".to_string(),
            ViewRole::Breakpoints => "Breakpoints".to_string(),
            ViewRole::History => "History".to_string(),
            ViewRole::Monitors => "Monitors".to_string(),
            ViewRole::Trackers => "Trackers".to_string(),
            ViewRole::Custom { title, .. } => title.clone(),
        }
    }

    /// 役割に応じた表示行を取得する
    ///
    /// `previous` はペインの現在の表示内容です（レジスタの変化の強調に使う）。
    pub fn refresh(&self, ctx: &RefreshContext, previous: &[String]) -> Result<Vec<String>> {
        let lines = match self {
            ViewRole::Disassembly => {
                let asms = ctx.reader.disassemble_pc()?;
                let pc = ctx.reader.status().rip;
                format_disassembly(&asms, pc, ctx.view.disassembly_lines)
            }
            ViewRole::Registers => {
                let regs = ctx.reader.registers()?;
                format_registers(&regs, previous)
            }
            ViewRole::StackMemory => {
                let start = ctx.reader.status().rsp;
                let mem = ctx.reader.read_memory(start, ctx.view.memory_window)?;
                format_memory(&mem, start, ExamineFormat::default())
            }
            ViewRole::Stacktrace => {
                let frames = ctx.reader.stacktrace(ctx.view.stack_depth)?;
                format_stacktrace(&frames)
            }
            ViewRole::Breakpoints => format_breakpoints(&ctx.reader.list_breakpoints()?),
            ViewRole::History => ctx.history.as_ref().clone(),
            ViewRole::Monitors => ctx.monitors.as_ref().clone(),
            ViewRole::Trackers => ctx.trackers.as_ref().clone(),
            ViewRole::Custom { op, .. } => op(ctx)?,
        };
        Ok(lines)
    }

    /// 同じ役割かどうか（`Custom` はタイトルで比較する）
    pub fn same_kind(&self, other: &ViewRole) -> bool {
        match (self, other) {
            (ViewRole::Custom { title: a, .. }, ViewRole::Custom { title: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Debug for ViewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewRole::Custom { title, .. } => f.debug_struct("Custom").field("title", title).finish(),
            other => f.write_str(&other.title()),
        }
    }
}

/// 独立して再取得・描画できる表示単位
pub struct ViewPane {
    slot: PaneSlot,
    title: String,
    role: ViewRole,
    data: Vec<String>,
    target: Arc<dyn RenderTarget>,
}

impl ViewPane {
    pub fn new(slot: PaneSlot, role: ViewRole, target: Arc<dyn RenderTarget>) -> Self {
        Self {
            slot,
            title: role.title(),
            role,
            data: Vec::new(),
            target,
        }
    }

    pub fn slot(&self) -> PaneSlot {
        self.slot
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn role(&self) -> &ViewRole {
        &self.role
    }

    pub fn data(&self) -> &[String] {
        &self.data
    }

    pub fn target(&self) -> &Arc<dyn RenderTarget> {
        &self.target
    }

    /// 役割を付け替える（データの取得はしない）
    pub fn assign(&mut self, role: ViewRole) {
        self.title = role.title();
        self.role = role;
    }

    /// 現在の役割でデータを取得する
    pub fn refresh(&mut self, ctx: &RefreshContext) -> Result<()> {
        let lines = self
            .role
            .refresh(ctx, &self.data)
            .with_context(|| format!("failed to refresh pane {}", self.slot.index()))?;
        self.set_data(lines);
        Ok(())
    }

    /// 再取得の結果を反映する（タイトルも役割のものに戻る）
    pub fn set_data(&mut self, lines: Vec<String>) {
        self.title = self.role.title();
        self.data = lines;
    }

    /// 役割は変えずに一時的な内容を表示する
    ///
    /// 次の再取得で役割の内容に戻ります。
    pub fn show(&mut self, title: impl Into<String>, lines: Vec<String>) {
        self.title = title.into();
        self.data = lines;
    }

    /// 描画先の内容を置き換える
    pub fn render(&self) {
        self.target.replace(&self.title, &self.data.join("\n"));
    }
}

impl fmt::Debug for ViewPane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewPane")
            .field("slot", &self.slot)
            .field("title", &self.title)
            .field("role", &self.role)
            .field("lines", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TextPane;
    use tansaku_service::{AsmInstruction, Location, MockService};

    fn context(service: &Arc<MockService>) -> RefreshContext {
        RefreshContext::new(ServiceReader::new(service.clone()), ViewSettings::default())
    }

    #[test]
    fn test_assign_does_not_fetch() {
        let service = Arc::new(MockService::new());
        let target = Arc::new(TextPane::new());
        let mut pane = ViewPane::new(PaneSlot::Auxiliary, ViewRole::Stacktrace, target);
        pane.assign(ViewRole::Breakpoints);
        assert_eq!(pane.title(), "Breakpoints");
        assert!(service.calls().is_empty());

        pane.refresh(&context(&service)).unwrap();
        assert_eq!(service.calls(), vec!["list_breakpoints"]);
    }

    #[test]
    fn test_render_overwrites_target() {
        let target = Arc::new(TextPane::new());
        let mut pane = ViewPane::new(PaneSlot::Auxiliary, ViewRole::History, target.clone());
        pane.show("Help", vec!["a".into(), "b".into()]);
        pane.render();
        assert_eq!(target.title(), "Help");
        assert_eq!(target.text(), "a\nb");

        pane.set_data(vec!["c".into()]);
        pane.render();
        assert_eq!(target.title(), "History");
        assert_eq!(target.text(), "c");
    }

    #[test]
    fn test_registers_highlight_changes() {
        let service = Arc::new(MockService::new());
        service.set_register("Rax", 1);
        service.set_register("Rbx", 2);
        let ctx = context(&service);
        let mut pane = ViewPane::new(PaneSlot::Registers, ViewRole::Registers, Arc::new(TextPane::new()));

        pane.refresh(&ctx).unwrap();
        assert_eq!(pane.data(), &["Rax     0x1", "Rbx     0x2"]);

        service.set_register("Rbx", 3);
        pane.refresh(&ctx).unwrap();
        assert_eq!(pane.data(), &["Rax     0x1", "[red]Rbx     0x3[white]"]);

        pane.refresh(&ctx).unwrap();
        assert_eq!(pane.data(), &["Rax     0x1", "Rbx     0x3"]);
    }

    #[test]
    fn test_disassembly_highlights_pc() {
        let service = Arc::new(MockService::new());
        service.set_register("Rip", 0x401004);
        let asm = |pc: u64, text: &str| AsmInstruction {
            loc: Location {
                pc,
                function: "main.main".into(),
                ..Default::default()
            },
            text: text.into(),
            ..Default::default()
        };
        service.set_instructions(vec![asm(0x401000, "push rbp"), asm(0x401004, "mov rbp, rsp")]);

        let mut pane = ViewPane::new(PaneSlot::Disassembly, ViewRole::Disassembly, Arc::new(TextPane::new()));
        pane.refresh(&context(&service)).unwrap();
        assert_eq!(pane.data().len(), 3);
        assert_eq!(pane.data()[2], "[red]0x401004         mov rbp, rsp[white]");
    }

    #[test]
    fn test_failed_refresh_keeps_stale_data() {
        let service = Arc::new(MockService::new());
        let ctx = context(&service);
        let mut pane = ViewPane::new(PaneSlot::Auxiliary, ViewRole::Stacktrace, Arc::new(TextPane::new()));
        pane.show("Stacktrace", vec!["main.main:5".into()]);

        service.fail_on("stacktrace");
        assert!(pane.refresh(&ctx).is_err());
        assert_eq!(pane.data(), &["main.main:5"]);
    }

    #[test]
    fn test_slot_from_index() {
        assert_eq!(PaneSlot::from_index(1), Some(PaneSlot::Disassembly));
        assert_eq!(PaneSlot::from_index(4), Some(PaneSlot::Auxiliary));
        assert_eq!(PaneSlot::from_index(0), None);
        assert_eq!(PaneSlot::from_index(5), None);
    }
}
