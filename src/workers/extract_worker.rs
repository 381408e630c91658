// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::models::product::ResultEnvelope;
use crate::domain::models::task::{ExtractionTask, Platform, TaskStatus};
use crate::domain::services::extraction_service::ExtractionService;
use crate::engines::router::EngineRouter;
use crate::engines::traits::FetchRequest;
use crate::proxy::pool::ProxyPool;
use crate::workers::events::{emit, CrawlEvent, EventSender, ProgressLevel, StopSignal};

/// 单次任务尝试的结局
#[derive(Debug)]
pub enum TaskOutcome {
    /// 抽取成功，信封待移交
    Succeeded(ResultEnvelope),
    /// 尝试失败，是否重试由编排器裁决
    Failed { error: String, retryable: bool },
    /// 协作式停止生效
    Stopped,
}

/// 抽取工作器
///
/// 执行单个抽取任务的一次尝试：取代理（HTTP路径）、导航、
/// 抽取前延迟、字段解析。每个挂起点之前检查停止信号。
pub struct ExtractWorker {
    router: Arc<EngineRouter>,
    proxy_pool: Option<Arc<ProxyPool>>,
    request_timeout: Duration,
}

impl ExtractWorker {
    pub fn new(
        router: Arc<EngineRouter>,
        proxy_pool: Option<Arc<ProxyPool>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            router,
            proxy_pool,
            request_timeout,
        }
    }

    /// 执行一次任务尝试
    #[instrument(skip(self, task, stop, events), fields(task_id = %task.id, url = %task.url, attempt = task.attempt))]
    pub async fn run_task(
        &self,
        task: &ExtractionTask,
        stop: &StopSignal,
        events: &EventSender,
    ) -> TaskOutcome {
        if stop.is_stopped() {
            return TaskOutcome::Stopped;
        }

        emit(
            events,
            CrawlEvent::StatusChanged {
                url: task.url.clone(),
                status: TaskStatus::Running,
            },
        );
        emit(
            events,
            CrawlEvent::Progress {
                level: ProgressLevel::Info,
                message: format!("Crawling {} (attempt {})", task.url, task.attempt + 1),
            },
        );

        // HTTP路径经代理池轮换出站身份；池枯竭按短暂失败处理
        let proxy = match self.acquire_proxy(task.platform).await {
            Ok(proxy) => proxy,
            Err(message) => {
                return TaskOutcome::Failed {
                    error: message,
                    retryable: true,
                }
            }
        };

        if stop.is_stopped() {
            return TaskOutcome::Stopped;
        }

        let request = FetchRequest {
            url: task.url.clone(),
            platform: task.platform,
            timeout: self.request_timeout,
            proxy,
        };

        let snapshot = match self.router.route(&request).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Fetch failed: {}", e);
                return TaskOutcome::Failed {
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                };
            }
        };

        // 导航之后的让出点
        if stop.is_stopped() {
            return TaskOutcome::Stopped;
        }

        // 抽取前延迟
        let delay = task.selector_set.delay_secs;
        if delay > 0 && stop.sleep_cancellable(Duration::from_secs(delay)).await {
            return TaskOutcome::Stopped;
        }

        match ExtractionService::resolve_fields(&snapshot.content, &snapshot.url, &task.selector_set)
        {
            Ok(fields) => {
                info!("Extraction succeeded with {} fields", fields.len());
                TaskOutcome::Succeeded(ResultEnvelope::new(
                    task.url.clone(),
                    task.platform,
                    fields,
                    task.attempt + 1,
                ))
            }
            Err(e) => {
                warn!("Extraction failed: {}", e);
                TaskOutcome::Failed {
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        }
    }

    async fn acquire_proxy(&self, platform: Platform) -> Result<Option<String>, String> {
        if platform != Platform::Pinduoduo {
            return Ok(None);
        }
        let Some(pool) = &self.proxy_pool else {
            return Ok(None);
        };
        match pool.get_random().await {
            Ok(proxy) => Ok(Some(proxy)),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::product::FieldValue;
    use crate::domain::models::selector::SelectorSet;
    use crate::engines::traits::{EngineError, PageEngine, PageSnapshot};
    use crate::workers::events::event_channel;
    use async_trait::async_trait;

    struct FixedPageEngine {
        content: &'static str,
    }

    #[async_trait]
    impl PageEngine for FixedPageEngine {
        async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError> {
            Ok(PageSnapshot {
                url: request.url.clone(),
                status_code: 200,
                content: self.content.to_string(),
                response_time_ms: 1,
            })
        }

        fn support_score(&self, _request: &FetchRequest) -> u8 {
            100
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn worker_with(content: &'static str) -> ExtractWorker {
        let engines: Vec<Arc<dyn PageEngine>> = vec![Arc::new(FixedPageEngine { content })];
        let router = Arc::new(EngineRouter::new(engines));
        ExtractWorker::new(router, None, Duration::from_secs(5))
    }

    fn task_with_rules() -> ExtractionTask {
        let mut set = SelectorSet::new(0);
        set.add_rule("title", "h1.d-title").unwrap();
        ExtractionTask::new(
            "https://weidian.com/item.html?itemID=7".into(),
            Platform::Weidian,
            Arc::new(set),
        )
    }

    #[tokio::test]
    async fn test_successful_attempt_builds_envelope() {
        let worker = worker_with("<h1 class=\"d-title\">商品A</h1>");
        let (events, _rx) = event_channel();
        let stop = StopSignal::new();

        let outcome = worker.run_task(&task_with_rules(), &stop, &events).await;
        match outcome {
            TaskOutcome::Succeeded(envelope) => {
                assert_eq!(envelope.attempt_count, 1);
                assert_eq!(envelope.fields["title"], FieldValue::Text("商品A".into()));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_page_is_retryable_failure() {
        let worker = worker_with("<div>nothing here</div>");
        let (events, _rx) = event_channel();
        let stop = StopSignal::new();

        let outcome = worker.run_task(&task_with_rules(), &stop, &events).await;
        match outcome {
            TaskOutcome::Failed { retryable, .. } => assert!(retryable),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pre_triggered_stop_short_circuits() {
        let worker = worker_with("<h1 class=\"d-title\">商品A</h1>");
        let (events, _rx) = event_channel();
        let stop = StopSignal::new();
        stop.trigger();

        let outcome = worker.run_task(&task_with_rules(), &stop, &events).await;
        assert!(matches!(outcome, TaskOutcome::Stopped));
    }
}
