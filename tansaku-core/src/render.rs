//! 描画先の抽象化
//!
//! 端末ツールキットの1ペインに相当します。コンソールはタイトルと整形済みの行
//! （強調用のマークアップを含む）を渡すだけで、描画の仕組みには立ち入りません。

use std::sync::{Mutex, MutexGuard};

/// ペインの描画先
///
/// 描画は並列に行われるため、実装は内部で排他制御を行います。
pub trait RenderTarget: Send + Sync {
    fn set_title(&self, title: &str);

    fn set_text(&self, text: &str);

    fn clear(&self);

    /// 入力フォーカスの表示を切り替える
    fn set_focused(&self, _focused: bool) {}

    /// 以前の内容を消してからタイトルと本文を設定する
    fn replace(&self, title: &str, text: &str) {
        self.clear();
        self.set_title(title);
        self.set_text(text);
    }
}

#[derive(Debug, Default, Clone)]
struct PaneBuffer {
    title: String,
    text: String,
    focused: bool,
}

/// メモリ上に内容を保持する描画先
///
/// CLIの画面描画とテストで使います。
#[derive(Debug, Default)]
pub struct TextPane {
    buffer: Mutex<PaneBuffer>,
}

impl TextPane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PaneBuffer> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn title(&self) -> String {
        self.lock().title.clone()
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().text.lines().map(str::to_string).collect()
    }

    pub fn is_focused(&self) -> bool {
        self.lock().focused
    }
}

impl RenderTarget for TextPane {
    fn set_title(&self, title: &str) {
        self.lock().title = title.to_string();
    }

    fn set_text(&self, text: &str) {
        self.lock().text = text.to_string();
    }

    fn clear(&self) {
        let mut buffer = self.lock();
        buffer.title.clear();
        buffer.text.clear();
    }

    fn set_focused(&self, focused: bool) {
        self.lock().focused = focused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_overwrites_previous_content() {
        let pane = TextPane::new();
        pane.replace("Stack", "main.main:5\nruntime.main:250");
        assert_eq!(pane.lines().len(), 2);

        pane.replace("Error", "boom");
        assert_eq!(pane.title(), "Error");
        assert_eq!(pane.text(), "boom");
    }
}
