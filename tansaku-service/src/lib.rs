//! Tansaku デバッグサービス境界
//!
//! このクレートは、外部のデバッグサービス（Delve互換のヘッドレスサーバー）との
//! 境界を定義します。ブレークポイント操作、ステップ実行、レジスタ・メモリの読み取り、
//! 逆アセンブル、スタックトレースなどはすべてリモート呼び出しとして委譲されます。

pub mod delve;
pub mod error;
pub mod mock;
pub mod parse;
pub mod service;
pub mod types;

pub use delve::DelveClient;
pub use error::ServiceError;
pub use mock::MockService;
pub use service::DebugService;
pub use types::{AsmInstruction, Breakpoint, CurrentStatus, Location, Register, StackFrame};

/// デバッグサービス呼び出しの結果型
pub type Result<T> = std::result::Result<T, ServiceError>;
