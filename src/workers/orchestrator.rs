// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::models::selector::SelectorSet;
use crate::domain::models::task::{ExtractionTask, FailedTaskRecord, TaskStatus};
use crate::domain::repositories::record_repository::RecordRepository;
use crate::utils::errors::OrchestratorError;
use crate::utils::retry_policy::{RetryLedger, RetryPolicy};
use crate::utils::url_utils;
use crate::workers::events::{emit, CrawlEvent, EventSender, ProgressLevel, StopSignal};
use crate::workers::extract_worker::{ExtractWorker, TaskOutcome};

/// 批次选项
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// 同时在途的任务上限（浏览器会话开销大）
    pub max_concurrency: usize,
    /// 停止后等待任务自行退出的宽限期，超过即强制终止
    pub stop_grace: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// 批次汇总
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// 批次内URL总数
    pub total: usize,
    /// 到达终态的任务数
    pub completed: usize,
    /// 成功数
    pub succeeded: usize,
    /// 重试耗尽的失败数
    pub failed: usize,
    /// 被停止数
    pub stopped: usize,
}

/// 爬取编排器
///
/// 把一批URL在同一个选择器集合下展开为并发抽取任务，
/// 作为唯一的准入控制点限制在途会话数量，并在监督循环里
/// 裁决重试。任务状态全部由编排器持有，对外只暴露事件流。
pub struct CrawlOrchestrator {
    worker: Arc<ExtractWorker>,
    policy: RetryPolicy,
    options: CrawlOptions,
    records: Arc<dyn RecordRepository>,
    ledger: Arc<Mutex<RetryLedger>>,
    stop: Arc<StopSignal>,
    started: AtomicBool,
}

impl CrawlOrchestrator {
    pub fn new(
        worker: Arc<ExtractWorker>,
        policy: RetryPolicy,
        options: CrawlOptions,
        records: Arc<dyn RecordRepository>,
    ) -> Self {
        Self {
            worker,
            policy,
            options,
            records,
            ledger: Arc::new(Mutex::new(RetryLedger::new())),
            stop: Arc::new(StopSignal::new()),
            started: AtomicBool::new(false),
        }
    }

    /// 启动一个批次
    ///
    /// 空URL列表和空选择器集合同步拒绝，不进入重试路径。
    ///
    /// # 参数
    ///
    /// * `urls` - 商品链接批次，重复项只展开一次
    /// * `selector_set` - 本批次共享的选择器集合
    /// * `events` - 事件流发送端
    ///
    /// # 返回值
    ///
    /// * `Ok(JoinHandle)` - 在全部任务（含重试）到达终态后解析为批次汇总
    /// * `Err(OrchestratorError)` - 批次被同步拒绝
    pub fn start(
        &self,
        urls: Vec<String>,
        selector_set: SelectorSet,
        events: EventSender,
    ) -> Result<JoinHandle<BatchSummary>, OrchestratorError> {
        if urls.is_empty() {
            return Err(OrchestratorError::EmptyBatch);
        }
        if selector_set.is_empty() {
            return Err(OrchestratorError::EmptySelectorSet);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::AlreadyStarted);
        }

        // 每个URL恰好展开一个任务
        let mut seen = std::collections::HashSet::new();
        let urls: Vec<String> = urls.into_iter().filter(|u| seen.insert(u.clone())).collect();

        let supervisor = Supervisor {
            worker: self.worker.clone(),
            policy: self.policy.clone(),
            records: self.records.clone(),
            ledger: self.ledger.clone(),
            stop: self.stop.clone(),
            semaphore: Arc::new(Semaphore::new(self.options.max_concurrency)),
            stop_grace: self.options.stop_grace,
            events,
        };

        let selector_set = Arc::new(selector_set);
        Ok(tokio::spawn(supervisor.run_batch(urls, selector_set)))
    }

    /// 请求停止当前批次
    ///
    /// 尽力而为且不阻塞调用方：不再投放新任务，在途任务在
    /// 下一个让出点以 `Stopped` 终止；宽限期内未退出的任务
    /// 被强制终止。
    pub fn stop(&self) {
        info!("Stop requested");
        self.stop.trigger();
    }

    /// 失败任务列表快照（操作员重试入口）
    pub fn failed_tasks(&self) -> Vec<FailedTaskRecord> {
        self.ledger.lock().failed_tasks().to_vec()
    }

    /// 移除单条失败记录
    pub fn remove_failed_task(&self, url: &str) -> bool {
        self.ledger.lock().remove(url)
    }

    /// 清空失败记录
    pub fn clear_failed_tasks(&self) {
        self.ledger.lock().clear();
    }
}

/// 批次监督者
///
/// 唯一读写重试台账和任务表的地方，任务通过结局通道汇报，
/// 避免跨任务竞争。
struct Supervisor {
    worker: Arc<ExtractWorker>,
    policy: RetryPolicy,
    records: Arc<dyn RecordRepository>,
    ledger: Arc<Mutex<RetryLedger>>,
    stop: Arc<StopSignal>,
    semaphore: Arc<Semaphore>,
    stop_grace: Duration,
    events: EventSender,
}

impl Supervisor {
    async fn run_batch(self, urls: Vec<String>, selector_set: Arc<SelectorSet>) -> BatchSummary {
        let total = urls.len();
        info!("Starting batch of {} urls", total);

        let (outcome_tx, mut outcome_rx) =
            mpsc::unbounded_channel::<(ExtractionTask, TaskOutcome)>();
        let mut in_flight: HashMap<Uuid, (String, JoinHandle<()>)> = HashMap::new();

        for url in urls {
            let platform = url_utils::detect_platform(&url);
            let task = ExtractionTask::new(url, platform, selector_set.clone());
            emit(
                &self.events,
                CrawlEvent::StatusChanged {
                    url: task.url.clone(),
                    status: TaskStatus::Pending,
                },
            );
            let entry = (task.url.clone(), self.spawn_attempt(task.clone(), None, &outcome_tx));
            in_flight.insert(task.id, entry);
        }

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        while summary.completed < total {
            let message = if self.stop.is_stopped() {
                match tokio::time::timeout(self.stop_grace, outcome_rx.recv()).await {
                    Ok(message) => message,
                    Err(_) => {
                        // 宽限期耗尽，强制终止仍未让出的任务
                        warn!(
                            "Stop grace expired, force-terminating {} tasks",
                            in_flight.len()
                        );
                        for (_, (url, handle)) in in_flight.drain() {
                            handle.abort();
                            self.mark_terminal(&url, TaskStatus::Stopped, false);
                            summary.stopped += 1;
                            summary.completed += 1;
                        }
                        continue;
                    }
                }
            } else {
                tokio::select! {
                    message = outcome_rx.recv() => message,
                    // 停止请求到达时立即切换到带宽限期的收尾路径
                    _ = self.stop.triggered() => continue,
                }
            };

            let Some((task, outcome)) = message else {
                break;
            };
            // 旧任务实例只有在结局被观察到之后才会被丢弃
            in_flight.remove(&task.id);

            match outcome {
                TaskOutcome::Succeeded(envelope) => {
                    emit(&self.events, CrawlEvent::Extracted(envelope.clone()));
                    // 每个成功信封恰好一次保存尝试，失败只上报不重试
                    if let Err(e) = self.records.save_record(envelope).await {
                        error!("Failed to save record for {}: {}", task.url, e);
                        emit(
                            &self.events,
                            CrawlEvent::Error {
                                url: task.url.clone(),
                                message: format!("Save failed: {}", e),
                            },
                        );
                    }
                    self.mark_terminal(&task.url, TaskStatus::Succeeded, true);
                    summary.succeeded += 1;
                    summary.completed += 1;
                }
                TaskOutcome::Failed { error, retryable } => {
                    if !self.stop.is_stopped()
                        && retryable
                        && self.policy.should_retry(task.attempt)
                    {
                        let retry = task.relaunched();
                        self.ledger.lock().add_retry(&retry.url);
                        let delay = self.policy.backoff_delay(retry.attempt);
                        emit(
                            &self.events,
                            CrawlEvent::Progress {
                                level: ProgressLevel::Warn,
                                message: format!(
                                    "Retry {}/{} for {} in {}s: {}",
                                    retry.attempt,
                                    self.policy.max_retries,
                                    retry.url,
                                    delay.as_secs(),
                                    error
                                ),
                            },
                        );
                        emit(
                            &self.events,
                            CrawlEvent::StatusChanged {
                                url: retry.url.clone(),
                                status: TaskStatus::Retrying,
                            },
                        );
                        let entry = (
                            retry.url.clone(),
                            self.spawn_attempt(retry.clone(), Some(delay), &outcome_tx),
                        );
                        in_flight.insert(retry.id, entry);
                    } else {
                        self.ledger.lock().add_failed_task(&task.url, &error);
                        emit(
                            &self.events,
                            CrawlEvent::Error {
                                url: task.url.clone(),
                                message: error,
                            },
                        );
                        self.mark_terminal(&task.url, TaskStatus::Failed, false);
                        summary.failed += 1;
                        summary.completed += 1;
                    }
                }
                TaskOutcome::Stopped => {
                    self.mark_terminal(&task.url, TaskStatus::Stopped, false);
                    summary.stopped += 1;
                    summary.completed += 1;
                }
            }
        }

        info!(
            "Batch finished: {}/{} ({} ok, {} failed, {} stopped)",
            summary.completed, summary.total, summary.succeeded, summary.failed, summary.stopped
        );
        emit(
            &self.events,
            CrawlEvent::BatchFinished {
                completed: summary.completed,
                total: summary.total,
            },
        );
        summary
    }

    /// 投放一次任务尝试
    ///
    /// 重试的退避睡眠发生在占用并发槽位之前；占到槽位后
    /// 再次确认停止标志。
    fn spawn_attempt(
        &self,
        task: ExtractionTask,
        backoff: Option<Duration>,
        outcome_tx: &mpsc::UnboundedSender<(ExtractionTask, TaskOutcome)>,
    ) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let stop = self.stop.clone();
        let semaphore = self.semaphore.clone();
        let events = self.events.clone();
        let outcome_tx = outcome_tx.clone();

        tokio::spawn(async move {
            if let Some(delay) = backoff {
                if stop.sleep_cancellable(delay).await {
                    let _ = outcome_tx.send((task, TaskOutcome::Stopped));
                    return;
                }
            }

            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            if stop.is_stopped() {
                let _ = outcome_tx.send((task, TaskOutcome::Stopped));
                return;
            }

            let outcome = worker.run_task(&task, &stop, &events).await;
            let _ = outcome_tx.send((task, outcome));
        })
    }

    fn mark_terminal(&self, url: &str, status: TaskStatus, success: bool) {
        emit(
            &self.events,
            CrawlEvent::StatusChanged {
                url: url.to_string(),
                status,
            },
        );
        emit(
            &self.events,
            CrawlEvent::Terminal {
                url: url.to_string(),
                success,
            },
        );
    }
}
