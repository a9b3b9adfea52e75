//! エラー表示キュー
//!
//! コマンドや再取得の失敗は有界チャネルに積まれ、バックグラウンドの1タスクが
//! 取り出してエラー表示用ペインに書き込みます。報告側はブロックしません。
//! 画面を描く直前に `flush` で書き込み済みになるのを待てます。

use crate::render::RenderTarget;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// エラー表示ペインのタイトル
pub const ERROR_TITLE: &str = "Error";

/// エラー表示キュー
pub struct ErrorSink {
    handle: Handle,
    sender: Option<mpsc::Sender<String>>,
    drain: Option<JoinHandle<()>>,
    /// キューに積んだ件数
    queued: AtomicU64,
    /// 取り出しタスクが書き込み終えた件数
    written: watch::Receiver<u64>,
}

impl ErrorSink {
    /// キューと取り出しタスクを起動する
    pub fn spawn(handle: Handle, capacity: usize, target: Arc<dyn RenderTarget>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<String>(capacity.max(1));
        let (progress, written) = watch::channel(0u64);
        let drain = handle.spawn(async move {
            while let Some(message) = receiver.recv().await {
                target.replace(ERROR_TITLE, &message);
                progress.send_modify(|count| *count += 1);
            }
            debug!("error sink drained");
        });
        Self {
            handle,
            sender: Some(sender),
            drain: Some(drain),
            queued: AtomicU64::new(0),
            written,
        }
    }

    /// エラーを報告する
    ///
    /// キューが満杯、または閉じられていれば捨てて false を返します。
    pub fn report(&self, err: &anyhow::Error) -> bool {
        let message = format!("{:#}", err);
        let Some(sender) = &self.sender else {
            warn!("error sink is closed, dropping: {}", message);
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(message)) => {
                warn!("error queue is full, dropping: {}", message);
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!("error sink is closed, dropping: {}", message);
                false
            }
        }
    }

    /// これまでに積んだエラーが描画先に書き込まれるまで待つ
    ///
    /// キューは閉じません。非同期コンテキストの外から呼び出します。
    pub fn flush(&self) {
        let target = self.queued.load(Ordering::SeqCst);
        let mut written = self.written.clone();
        // 取り出しタスクが終わっていれば送信側が閉じて Err になる
        if self
            .handle
            .block_on(written.wait_for(|count| *count >= target))
            .is_err()
        {
            debug!("error sink closed before flush");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// キューを閉じ、取り出しタスクが残りを書き終えるのを待つ
    ///
    /// 2回目以降の呼び出しは何もしません。非同期コンテキストの外から呼び出します。
    pub fn close(&mut self) {
        self.sender.take();
        if let Some(drain) = self.drain.take() {
            if let Err(e) = self.handle.block_on(drain) {
                warn!("error sink task did not complete: {}", e);
            }
        }
    }
}

impl Drop for ErrorSink {
    fn drop(&mut self) {
        self.close();
    }
}
