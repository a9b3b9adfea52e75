//! エラーメッセージ定数

/// 削除対象のトラッカーが存在しない場合のエラーメッセージ
pub const ERR_NO_SUCH_TRACKER: &str = "No such tracker";

/// サイズ引数が不正な場合のエラーメッセージ
pub const ERR_INVALID_SIZE: &str = "Invalid size";

/// ペイン番号が数値でない場合のエラーメッセージ
pub const ERR_INVALID_PANE: &str = "Invalid pane number";
