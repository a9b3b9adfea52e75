//! コマンド履歴

/// 入力されたコマンド行の履歴
///
/// 追記のみで、既存のエントリは変更しません。
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    lines: Vec<String>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// 空行を直前のコマンドに置き換える
    ///
    /// 履歴が空なら `None` を返します。
    pub fn resolve<'a>(&'a self, line: &'a str) -> Option<&'a str> {
        if line.trim().is_empty() {
            self.last()
        } else {
            Some(line)
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
