//! 入力フォーカス

use crate::pane::{PaneSlot, ViewPane};

/// 入力フォーカスの位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    CommandLine,
    Pane(PaneSlot),
}

impl Focus {
    /// `f` コマンドの番号から変換する（0はコマンド入力行）
    pub fn from_index(index: usize) -> Option<Self> {
        if index == 0 {
            return Some(Focus::CommandLine);
        }
        PaneSlot::from_index(index).map(Focus::Pane)
    }
}

/// どこにフォーカスがあるかを保持し、描画先に伝える
#[derive(Debug, Clone, Default)]
pub struct FocusModel {
    current: Focus,
}

impl FocusModel {
    pub fn current(&self) -> Focus {
        self.current
    }

    /// フォーカスを移し、全ペインの描画先に状態を通知する
    pub fn focus(&mut self, target: Focus, panes: &[ViewPane]) {
        self.current = target;
        for pane in panes {
            pane.target()
                .set_focused(target == Focus::Pane(pane.slot()));
        }
    }
}
