//! Tansaku コンソールのコア機能
//!
//! このクレートは、デバッガフロントエンドの対話コンソールの中核を提供します。
//! コマンドの登録と振り分け、ペインの並列再取得、アドレス式の評価、
//! 監視アドレスの変化検出、エラー表示キューを統合します。

pub mod commands;
pub mod config;
pub mod console;
pub mod errors;
pub mod eval;
pub mod focus;
pub mod format;
pub mod history;
pub mod pane;
pub mod reader;
pub mod refresh;
pub mod registry;
pub mod render;
pub mod sink;
pub mod watch;

pub use config::{ConsoleConfig, ViewSettings};
pub use console::{Console, PaneTargets};
pub use eval::{AddressEvaluator, EvalError};
pub use focus::Focus;
pub use pane::{PaneSlot, RefreshContext, ViewPane, ViewRole};
pub use registry::{CommandRegistry, RegistryError};
pub use render::{RenderTarget, TextPane};
pub use watch::{WatchEntry, WatchKind, WatchSet};

// 他のクレートから使用するために再エクスポート
pub use tansaku_service::{DebugService, DelveClient, MockService};

/// コンソールの結果型
pub type Result<T> = anyhow::Result<T>;
