//! ペインの並列再取得と描画
//!
//! 1回のコマンドにつき、ペインごとに1つのタスクを起動して並列にデータを取得し、
//! 全て揃ってから描画します。サービス呼び出しはブロッキングI/Oなので
//! `spawn_blocking` で実行します。
//!
//! 失敗時は最初に完了したエラーを返します（完了順）。それ以降に届いた結果は
//! 捨てるので、残りのペインは次に成功するまで古い内容のままになります。
//! ただし実行中のタスクは待ってから戻るため、読み取りが次のコマンドの
//! 状態変更と重なることはありません。

use crate::pane::{PaneSlot, RefreshContext, ViewPane};
use crate::Result;
use anyhow::{anyhow, Context};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// 1回の並列再取得の結果
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// 新しいデータが反映されたペイン
    pub applied: Vec<PaneSlot>,
    /// 最初に完了したエラー
    pub error: Option<anyhow::Error>,
}

impl RefreshOutcome {
    pub fn is_applied(&self, slot: PaneSlot) -> bool {
        self.applied.contains(&slot)
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 並列再取得エンジン
#[derive(Debug, Clone)]
pub struct RefreshEngine {
    handle: Handle,
}

impl RefreshEngine {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// 全ペインのデータを並列に再取得する
    ///
    /// コマンドループ（非同期コンテキストの外）から呼び出します。
    pub fn refresh_all(&self, panes: &mut [ViewPane], ctx: &RefreshContext) -> Result<()> {
        self.refresh(panes, ctx).into_result()
    }

    /// `refresh_all` と同じだが、どのペインに反映されたかも返す
    pub fn refresh(&self, panes: &mut [ViewPane], ctx: &RefreshContext) -> RefreshOutcome {
        debug!("refresh fan-out over {} panes", panes.len());
        self.handle.block_on(async {
            let mut tasks = JoinSet::new();
            for (index, pane) in panes.iter().enumerate() {
                let role = pane.role().clone();
                let previous = pane.data().to_vec();
                let slot = pane.slot();
                let ctx = ctx.clone();
                tasks.spawn_blocking(move || {
                    let result = role
                        .refresh(&ctx, &previous)
                        .with_context(|| format!("failed to refresh pane {}", slot.index()));
                    (index, result)
                });
            }

            let mut outcome = RefreshOutcome::default();
            while let Some(joined) = tasks.join_next().await {
                let result = joined
                    .map_err(|e| anyhow!("refresh task did not complete: {}", e))
                    .and_then(|(index, result)| result.map(|lines| (index, lines)));
                match result {
                    Ok((index, lines)) if outcome.error.is_none() => {
                        panes[index].set_data(lines);
                        outcome.applied.push(panes[index].slot());
                    }
                    Ok(_) => {}
                    Err(e) if outcome.error.is_none() => {
                        warn!("refresh fan-out failed: {:#}", e);
                        outcome.error = Some(e);
                    }
                    Err(e) => debug!("discarding later refresh error: {:#}", e),
                }
            }

            if outcome.error.is_none() {
                debug!("refresh fan-out finished");
            }
            outcome
        })
    }

    /// 全ペインを並列に描画する
    pub fn render_all(&self, panes: &[ViewPane]) {
        self.handle.block_on(async {
            let mut tasks = JoinSet::new();
            for pane in panes {
                let target = pane.target().clone();
                let title = pane.title().to_string();
                let text = pane.data().join("\n");
                tasks.spawn_blocking(move || target.replace(&title, &text));
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("render task did not complete: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewSettings;
    use crate::pane::{PaneSlot, ViewRole};
    use crate::reader::ServiceReader;
    use crate::render::TextPane;
    use std::sync::{Arc, Barrier};
    use tansaku_service::MockService;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(8)
            .enable_all()
            .build()
            .unwrap()
    }

    fn context() -> RefreshContext {
        RefreshContext::new(
            ServiceReader::new(Arc::new(MockService::new())),
            ViewSettings::default(),
        )
    }

    fn pane(slot: PaneSlot, role: ViewRole) -> ViewPane {
        ViewPane::new(slot, role, Arc::new(TextPane::new()))
    }

    #[test]
    fn test_refreshes_run_concurrently() {
        let rt = runtime();
        let engine = RefreshEngine::new(rt.handle().clone());
        // 4つのタスクが同時に走らなければ Barrier を抜けられない
        let barrier = Arc::new(Barrier::new(4));
        let mut panes: Vec<ViewPane> = PaneSlot::ALL
            .iter()
            .map(|&slot| {
                let barrier = barrier.clone();
                pane(
                    slot,
                    ViewRole::custom(format!("pane {}", slot.index()), move |_| {
                        barrier.wait();
                        Ok(vec![format!("done {}", slot.index())])
                    }),
                )
            })
            .collect();

        engine.refresh_all(&mut panes, &context()).unwrap();
        for pane in &panes {
            assert_eq!(pane.data(), &[format!("done {}", pane.slot().index())]);
        }
    }

    #[test]
    fn test_first_error_is_returned() {
        let rt = runtime();
        let engine = RefreshEngine::new(rt.handle().clone());
        let mut panes = vec![
            pane(PaneSlot::Disassembly, ViewRole::custom("ok", |_| Ok(vec!["fresh".into()]))),
            pane(
                PaneSlot::Registers,
                ViewRole::custom("broken", |_| Err(anyhow!("register read failed"))),
            ),
            pane(PaneSlot::Memory, ViewRole::custom("ok", |_| Ok(vec!["fresh".into()]))),
        ];

        let err = engine.refresh_all(&mut panes, &context()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("pane 2"), "{}", message);
        assert!(message.contains("register read failed"), "{}", message);
    }

    #[test]
    fn test_outcome_lists_applied_panes() {
        let rt = runtime();
        let engine = RefreshEngine::new(rt.handle().clone());
        let mut panes = vec![
            pane(PaneSlot::Disassembly, ViewRole::custom("ok", |_| Ok(vec!["fresh".into()]))),
            pane(PaneSlot::Memory, ViewRole::custom("ok", |_| Ok(vec!["fresh".into()]))),
        ];
        let outcome = engine.refresh(&mut panes, &context());
        assert!(outcome.error.is_none());
        assert!(outcome.is_applied(PaneSlot::Disassembly));
        assert!(outcome.is_applied(PaneSlot::Memory));
        assert!(!outcome.is_applied(PaneSlot::Auxiliary));

        // 唯一のペインが失敗すれば何も反映されない
        let mut broken = vec![pane(
            PaneSlot::Auxiliary,
            ViewRole::custom("broken", |_| Err(anyhow!("gone"))),
        )];
        let outcome = engine.refresh(&mut broken, &context());
        assert!(outcome.applied.is_empty());
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn test_render_all_writes_every_target() {
        let rt = runtime();
        let engine = RefreshEngine::new(rt.handle().clone());
        let targets: Vec<Arc<TextPane>> = (0..4).map(|_| Arc::new(TextPane::new())).collect();
        let mut panes: Vec<ViewPane> = PaneSlot::ALL
            .iter()
            .zip(&targets)
            .map(|(&slot, target)| ViewPane::new(slot, ViewRole::History, target.clone()))
            .collect();
        for pane in &mut panes {
            pane.set_data(vec![format!("line {}", pane.slot().index())]);
        }

        engine.render_all(&panes);
        for (i, target) in targets.iter().enumerate() {
            assert_eq!(target.title(), "History");
            assert_eq!(target.text(), format!("line {}", i + 1));
        }
    }
}
