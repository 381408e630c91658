// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::domain::models::product::ResultEnvelope;
use crate::domain::models::task::TaskStatus;

/// 进度消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProgressLevel::Info => write!(f, "INFO"),
            ProgressLevel::Warn => write!(f, "WARN"),
            ProgressLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// 爬取事件
///
/// 编排器和任务通过这条事件流向操作面汇报，核心不持有任何
/// 对方的可变状态。事件流是尽力投递：接收端关闭不影响爬取。
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// 进度消息
    Progress {
        level: ProgressLevel,
        message: String,
    },
    /// 一个任务的抽取结果（同一信封同时移交持久化协作方）
    Extracted(ResultEnvelope),
    /// 任务级错误
    Error { url: String, message: String },
    /// 任务状态变化
    StatusChanged { url: String, status: TaskStatus },
    /// 任务到达终态
    Terminal { url: String, success: bool },
    /// 批次内全部任务（含重试）到达终态
    BatchFinished { completed: usize, total: usize },
}

pub type EventSender = mpsc::UnboundedSender<CrawlEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CrawlEvent>;

/// 创建事件通道
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// 发送事件，接收端已关闭时静默丢弃
pub fn emit(events: &EventSender, event: CrawlEvent) {
    let _ = events.send(event);
}

/// 协作式停止信号
///
/// `trigger` 置位后，任务在每个挂起点之前检查标志并以
/// `Stopped` 终止；正在睡眠的任务被立即唤醒。
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止（非阻塞，幂等）
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 是否已请求停止
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// 等待停止被触发；已触发时立即返回
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// 可取消的睡眠
    ///
    /// 返回 `true` 表示睡眠期间（或之前）停止被触发
    pub async fn sleep_cancellable(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = notified => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion_without_stop() {
        let signal = StopSignal::new();
        assert!(!signal.sleep_cancellable(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_wakes_sleeper() {
        let signal = std::sync::Arc::new(StopSignal::new());
        let sleeper = signal.clone();

        let handle = tokio::spawn(async move {
            sleeper.sleep_cancellable(Duration::from_secs(3600)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();

        assert!(handle.await.unwrap());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_after_trigger_returns_immediately() {
        let signal = StopSignal::new();
        signal.trigger();
        assert!(signal.sleep_cancellable(Duration::from_secs(3600)).await);
    }
}
