//! コマンドレジストリ
//!
//! 別名の集合ごとに1つのエントリを登録します。同じエントリの別名は全て同一の
//! ハンドラを共有します。レジストリは起動時に組み立てた後は変更しません。

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// コマンドハンドラ
///
/// 第2引数は動詞を除いた引数です。
pub type Handler<C> = fn(&mut C, &[&str]) -> anyhow::Result<()>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("alias '{0}' is already registered")]
    DuplicateAlias(String),
    #[error("a command needs at least one alias")]
    NoAlias,
}

/// 1行を空白で区切り、動詞と引数に分ける（引用符は扱わない）
pub fn parse_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut words = line.split_whitespace();
    let verb = words.next()?;
    Some((verb, words.collect()))
}

/// 登録されたコマンド
pub struct CommandEntry<C> {
    pub aliases: Vec<String>,
    pub handler: Handler<C>,
    pub help: String,
}

impl<C> std::fmt::Debug for CommandEntry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("aliases", &self.aliases)
            .field("help", &self.help)
            .finish()
    }
}

/// 別名からコマンドを引く表
pub struct CommandRegistry<C> {
    entries: BTreeMap<String, Arc<CommandEntry<C>>>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// コマンドを登録する
    ///
    /// 既に登録されている別名が含まれていれば何も登録せずにエラーを返します。
    pub fn register(
        &mut self,
        aliases: &[&str],
        handler: Handler<C>,
        help: &str,
    ) -> Result<(), RegistryError> {
        if aliases.is_empty() {
            return Err(RegistryError::NoAlias);
        }
        for (i, alias) in aliases.iter().enumerate() {
            if self.entries.contains_key(*alias) || aliases[..i].contains(alias) {
                return Err(RegistryError::DuplicateAlias(alias.to_string()));
            }
        }

        let entry = Arc::new(CommandEntry {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            handler,
            help: help.to_string(),
        });
        for alias in aliases {
            self.entries.insert(alias.to_string(), entry.clone());
        }
        Ok(())
    }

    pub fn lookup(&self, alias: &str) -> Option<&Arc<CommandEntry<C>>> {
        self.entries.get(alias)
    }

    /// コマンドのヘルプ文字列
    pub fn help(&self, alias: &str) -> Option<&str> {
        self.lookup(alias).map(|entry| entry.help.as_str())
    }

    /// 全ての別名（ソート済み）
    pub fn aliases(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// 補完候補を返す（大文字小文字を区別しない前方一致）
    ///
    /// 空の入力には候補を返しません。
    pub fn complete(&self, prefix: &str) -> Vec<&str> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let prefix = prefix.to_ascii_lowercase();
        self.entries
            .keys()
            .filter(|alias| alias.to_ascii_lowercase().starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    /// 1行を動詞と引数に分けてハンドラを呼び出す
    ///
    /// 未登録の動詞は何もしません。
    pub fn dispatch(&self, ctx: &mut C, line: &str) -> anyhow::Result<()> {
        let Some((verb, args)) = parse_line(line) else {
            return Ok(());
        };

        match self.lookup(verb) {
            Some(entry) => {
                debug!("dispatch '{}' with {} args", verb, args.len());
                (entry.handler)(ctx, &args)
            }
            None => {
                debug!("ignoring unknown command '{}'", verb);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Calls {
        log: Vec<String>,
    }

    fn record(ctx: &mut Calls, args: &[&str]) -> anyhow::Result<()> {
        ctx.log.push(args.join(","));
        Ok(())
    }

    fn fail(_: &mut Calls, _: &[&str]) -> anyhow::Result<()> {
        anyhow::bail!("handler failed")
    }

    fn registry() -> CommandRegistry<Calls> {
        let mut registry = CommandRegistry::new();
        registry
            .register(&["continue", "c"], record, "continue execution")
            .unwrap();
        registry.register(&["fail"], fail, "always fails").unwrap();
        registry
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("x gx  0x10"), Some(("x", vec!["gx", "0x10"])));
        assert_eq!(parse_line("q"), Some(("q", vec![])));
        assert_eq!(parse_line(" \t "), None);
    }

    #[test]
    fn test_aliases_share_one_entry() {
        let registry = registry();
        let long = registry.lookup("continue").unwrap();
        let short = registry.lookup("c").unwrap();
        assert!(Arc::ptr_eq(long, short));
        assert_eq!(registry.help("c"), Some("continue execution"));
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register(&["cont", "c"], record, ""),
            Err(RegistryError::DuplicateAlias("c".to_string()))
        );
        // 失敗した登録は一部も残らない
        assert!(registry.lookup("cont").is_none());
        assert_eq!(registry.register(&[], record, ""), Err(RegistryError::NoAlias));
    }

    #[test]
    fn test_dispatch_splits_arguments() {
        let registry = registry();
        let mut calls = Calls::default();
        registry.dispatch(&mut calls, "  c   a  b ").unwrap();
        registry.dispatch(&mut calls, "continue").unwrap();
        assert_eq!(calls.log, vec!["a,b", ""]);
    }

    #[test]
    fn test_unknown_verb_is_a_noop() {
        let registry = registry();
        let mut calls = Calls::default();
        registry.dispatch(&mut calls, "frobnicate 1 2").unwrap();
        registry.dispatch(&mut calls, "   ").unwrap();
        assert!(calls.log.is_empty());
        assert!(registry.dispatch(&mut calls, "fail").is_err());
    }

    #[test]
    fn test_complete_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.complete("CON"), vec!["continue"]);
        assert_eq!(registry.complete("c"), vec!["c", "continue"]);
        assert!(registry.complete("").is_empty());
        assert_eq!(registry.aliases(), vec!["c", "continue", "fail"]);
    }
}
