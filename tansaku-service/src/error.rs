//! デバッグサービスのエラー

use thiserror::Error;

/// デバッグサービス呼び出しのエラー
///
/// 接続・プロトコルのエラー（セッションは継続できるが、実行中の操作は失敗する）と
/// サービス側が返す意味的なエラー（存在しないブレークポイントなど）を区別します。
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("connection to debug service failed: {0}")]
    Connection(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0} is unavailable")]
    Unavailable(String),
}

impl ServiceError {
    /// 接続・プロトコル層のエラーかどうか
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ServiceError::Connection(_) | ServiceError::Protocol(_))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(ServiceError::from(io).is_connectivity());
        assert!(ServiceError::Protocol("bad frame".into()).is_connectivity());

        let remote = ServiceError::Remote {
            method: "RPCServer.ClearBreakpoint".into(),
            message: "no breakpoint with id 7".into(),
        };
        assert!(!remote.is_connectivity());
        assert_eq!(
            remote.to_string(),
            "RPCServer.ClearBreakpoint failed: no breakpoint with id 7"
        );
    }
}
