//! コンソールセッション
//!
//! コマンドレジストリ、履歴、4つのペイン、監視セット、フォーカス、再取得エンジン、
//! エラー表示キューを1つの構造体にまとめます。コマンドは1行ずつ順に処理します。

use crate::commands::builtin_registry;
use crate::config::ConsoleConfig;
use crate::eval::AddressEvaluator;
use crate::focus::{Focus, FocusModel};
use crate::history::CommandHistory;
use crate::pane::{PaneSlot, RefreshContext, ViewPane, ViewRole};
use crate::reader::ServiceReader;
use crate::refresh::RefreshEngine;
use crate::registry::CommandRegistry;
use crate::render::RenderTarget;
use crate::sink::ErrorSink;
use crate::watch::{WatchKind, WatchSet};
use crate::Result;
use anyhow::Context;
use std::sync::Arc;
use tansaku_service::DebugService;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

/// 4つのペインの描画先
#[derive(Clone)]
pub struct PaneTargets {
    pub disassembly: Arc<dyn RenderTarget>,
    pub registers: Arc<dyn RenderTarget>,
    pub memory: Arc<dyn RenderTarget>,
    pub auxiliary: Arc<dyn RenderTarget>,
}

/// 対話コンソール
pub struct Console {
    service: Arc<dyn DebugService>,
    config: ConsoleConfig,
    registry: Arc<CommandRegistry<Console>>,
    /// `PaneSlot` の番号順
    panes: Vec<ViewPane>,
    history: CommandHistory,
    monitors: WatchSet,
    trackers: WatchSet,
    focus: FocusModel,
    engine: RefreshEngine,
    sink: ErrorSink,
    running: bool,
    // ランタイムは最後に破棄する
    runtime: Runtime,
}

impl Console {
    /// 組み込みコマンドを登録したコンソールを作成する
    ///
    /// ペインの初期の役割は 1: 逆アセンブル、2: レジスタ、3: スタック上のメモリ、
    /// 4: スタックトレースです。データの取得はまだ行いません。
    pub fn new(
        service: Arc<dyn DebugService>,
        targets: PaneTargets,
        config: ConsoleConfig,
    ) -> Result<Self> {
        let registry = builtin_registry().context("failed to register built-in commands")?;
        Self::with_registry(service, targets, config, registry)
    }

    /// 任意のコマンドレジストリでコンソールを作成する
    pub fn with_registry(
        service: Arc<dyn DebugService>,
        targets: PaneTargets,
        config: ConsoleConfig,
        registry: CommandRegistry<Console>,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name("tansaku-worker")
            .enable_all()
            .build()
            .context("failed to start the refresh runtime")?;

        let engine = RefreshEngine::new(runtime.handle().clone());
        let sink = ErrorSink::spawn(
            runtime.handle().clone(),
            config.error_queue_capacity,
            targets.auxiliary.clone(),
        );
        let panes = vec![
            ViewPane::new(PaneSlot::Disassembly, ViewRole::Disassembly, targets.disassembly),
            ViewPane::new(PaneSlot::Registers, ViewRole::Registers, targets.registers),
            ViewPane::new(PaneSlot::Memory, ViewRole::StackMemory, targets.memory),
            ViewPane::new(PaneSlot::Auxiliary, ViewRole::Stacktrace, targets.auxiliary),
        ];

        Ok(Self {
            service,
            config,
            registry: Arc::new(registry),
            panes,
            history: CommandHistory::new(),
            monitors: WatchSet::new(WatchKind::Monitor),
            trackers: WatchSet::new(WatchKind::Tracker),
            focus: FocusModel::default(),
            engine,
            sink,
            running: true,
            runtime,
        })
    }

    /// 入力された1行を処理する
    ///
    /// 空行は直前のコマンドを繰り返します。コマンドの後で全ペインを描画し、
    /// モニターを確認し、エラーがあればエラー表示キューに送ります。
    /// セッションが続いていれば true を返します。
    pub fn submit(&mut self, line: &str) -> bool {
        let Some(line) = self.history.resolve(line).map(str::to_string) else {
            return self.running;
        };
        self.history.push(line.clone());

        let result = self.dispatch(&line);
        if !self.running {
            return false;
        }

        self.render_all();
        if self.poll_monitors() {
            let lines = self.monitors.take_lines();
            let pane = self.pane_mut(PaneSlot::Auxiliary);
            pane.show(ViewRole::Monitors.title(), lines);
            pane.render();
        }
        if let Err(e) = result {
            self.report(&e);
        }
        // 画面を描く側がエラーを見落とさないよう書き込みを待つ
        self.sink.flush();
        self.running
    }

    /// コマンドを1行実行する（描画はしない）
    pub fn dispatch(&mut self, line: &str) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        registry.dispatch(self, line)
    }

    /// 全ペインを取得し直して描画する（起動直後の表示に使う）
    pub fn redraw(&mut self) {
        if let Err(e) = self.refresh_all() {
            self.report(&e);
        }
        self.render_all();
        self.sink.flush();
    }

    /// 全ペインのデータを並列に取得し直す
    ///
    /// 監視行の変化フラグは、その行がペインに反映されたときだけ消費します。
    pub fn refresh_all(&mut self) -> Result<()> {
        let ctx = self.refresh_context();
        let outcome = self.engine.refresh(&mut self.panes, &ctx);

        let shown = |role: &ViewRole| {
            self.panes
                .iter()
                .any(|p| p.role().same_kind(role) && outcome.is_applied(p.slot()))
        };
        let monitors_shown = shown(&ViewRole::Monitors);
        let trackers_shown = shown(&ViewRole::Trackers);
        if monitors_shown {
            self.monitors.consume_changes();
        }
        if trackers_shown {
            self.trackers.consume_changes();
        }
        outcome.into_result()
    }

    /// 全ペインを描画する
    pub fn render_all(&self) {
        self.engine.render_all(&self.panes);
    }

    /// 再取得タスクに渡す状態のスナップショット（変化フラグは消費しない）
    fn refresh_context(&self) -> RefreshContext {
        let mut ctx = RefreshContext::new(self.reader(), self.config.view);
        ctx.history = Arc::new(self.history.lines().to_vec());
        ctx.monitors = Arc::new(self.monitors.lines());
        ctx.trackers = Arc::new(self.trackers.lines());
        ctx
    }

    /// モニターを読み直し、変化があれば true を返す
    pub fn poll_monitors(&mut self) -> bool {
        let reader = self.reader();
        self.monitors.poll(&reader)
    }

    /// トラッカーを読み直し、変化があれば true を返す
    pub fn poll_trackers(&mut self) -> bool {
        let reader = self.reader();
        self.trackers.poll(&reader)
    }

    /// 現在のレジスタでアドレス式を評価する
    pub fn evaluate(&self, expr: &str) -> Result<u64> {
        let regs = self
            .service
            .registers()
            .context("failed to read registers")?;
        Ok(AddressEvaluator::new(&regs).evaluate(expr)?)
    }

    /// ペインの役割を切り替える（取得は次の `refresh_all` で行う）
    pub fn select(&mut self, slot: PaneSlot, role: ViewRole) {
        debug!("pane {} -> {:?}", slot.index(), role);
        self.pane_mut(slot).assign(role);
    }

    /// ペインに一時的な内容を表示する
    pub fn show(&mut self, slot: PaneSlot, title: impl Into<String>, lines: Vec<String>) {
        self.pane_mut(slot).show(title, lines);
    }

    /// コマンドのヘルプを補助ペインに表示する（未登録のコマンドは無視）
    pub fn show_help(&mut self, verb: &str) {
        let Some(help) = self.registry.help(verb).map(str::to_string) else {
            return;
        };
        self.show(PaneSlot::Auxiliary, "Help", vec![help]);
    }

    pub fn focus(&mut self, target: Focus) {
        self.focus.focus(target, &self.panes);
    }

    pub fn current_focus(&self) -> Focus {
        self.focus.current()
    }

    /// エラーをエラー表示キューに送る
    pub fn report(&self, err: &anyhow::Error) {
        self.sink.report(err);
    }

    /// セッションループを止め、エラー表示キューを閉じる
    pub fn stop(&mut self) {
        info!("stopping console session");
        self.running = false;
        self.sink.close();
    }

    /// エラー表示キューを閉じ、未表示のエラーを書き終えるまで待つ
    pub fn shutdown(&mut self) {
        self.sink.close();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pane(&self, slot: PaneSlot) -> &ViewPane {
        &self.panes[slot.index() - 1]
    }

    pub fn pane_mut(&mut self, slot: PaneSlot) -> &mut ViewPane {
        &mut self.panes[slot.index() - 1]
    }

    pub fn panes(&self) -> &[ViewPane] {
        &self.panes
    }

    /// 状態を変更する呼び出しにも使えるサービスハンドル（コマンドループ専用）
    pub fn service(&self) -> &Arc<dyn DebugService> {
        &self.service
    }

    pub fn reader(&self) -> ServiceReader {
        ServiceReader::new(self.service.clone())
    }

    /// 再取得とエラー表示に使うランタイム
    pub fn runtime(&self) -> &Handle {
        self.runtime.handle()
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CommandRegistry<Console>> {
        &self.registry
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn monitors(&self) -> &WatchSet {
        &self.monitors
    }

    pub fn monitors_mut(&mut self) -> &mut WatchSet {
        &mut self.monitors
    }

    pub fn trackers(&self) -> &WatchSet {
        &self.trackers
    }

    pub fn trackers_mut(&mut self) -> &mut WatchSet {
        &mut self.trackers
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.sink.close();
    }
}
