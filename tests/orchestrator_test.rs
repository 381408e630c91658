// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shopcrawl::domain::models::product::ResultEnvelope;
use shopcrawl::domain::models::selector::SelectorSet;
use shopcrawl::domain::models::task::TaskStatus;
use shopcrawl::domain::repositories::record_repository::{MediaKind, RecordRepository};
use shopcrawl::engines::router::EngineRouter;
use shopcrawl::engines::traits::{EngineError, FetchRequest, PageEngine, PageSnapshot};
use shopcrawl::utils::errors::{OrchestratorError, RepositoryError};
use shopcrawl::utils::retry_policy::RetryPolicy;
use shopcrawl::workers::events::{event_channel, CrawlEvent, EventReceiver};
use shopcrawl::workers::extract_worker::ExtractWorker;
use shopcrawl::workers::orchestrator::{CrawlOptions, CrawlOrchestrator};

const PRODUCT_PAGE: &str = r#"
    <html><body>
        <h1 class="d-title">测试商品</h1>
        <div class="gallery">
            <img src="/1.jpg"><img src="/2.jpg">
            <img src="/3.jpg"><img src="/4.jpg">
        </div>
    </body></html>
"#;

/// 可编排失败行为的测试引擎
struct ScriptedEngine {
    /// url → 前N次请求返回超时
    fail_first: HashMap<String, u32>,
    /// 挂起模拟阻塞中的页面加载
    hang: bool,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedEngine {
    fn succeeding() -> Self {
        Self::with_failures(HashMap::new())
    }

    fn with_failures(fail_first: HashMap<String, u32>) -> Self {
        Self {
            fail_first,
            hang: false,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn hanging() -> Self {
        Self {
            fail_first: HashMap::new(),
            hang: true,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageEngine for ScriptedEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(request.url.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.hang {
            tokio::time::sleep(Duration::from_secs(86_400)).await;
            return Err(EngineError::Timeout);
        }

        let limit = self.fail_first.get(&request.url).copied().unwrap_or(0);
        if seen <= limit {
            return Err(EngineError::Timeout);
        }

        Ok(PageSnapshot {
            url: request.url.clone(),
            status_code: 200,
            content: PRODUCT_PAGE.to_string(),
            response_time_ms: 1,
        })
    }

    fn support_score(&self, _request: &FetchRequest) -> u8 {
        100
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 内存结果仓库
#[derive(Default)]
struct MemoryRecordStore {
    saved: Mutex<Vec<ResultEnvelope>>,
}

#[async_trait]
impl RecordRepository for MemoryRecordStore {
    async fn save_record(&self, envelope: ResultEnvelope) -> Result<i64, RepositoryError> {
        let mut saved = self.saved.lock().unwrap();
        saved.push(envelope);
        Ok(saved.len() as i64)
    }

    async fn save_media_file(
        &self,
        _record_id: i64,
        _kind: MediaKind,
        _path: &str,
        _original_url: &str,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }
}

fn selector_set() -> SelectorSet {
    let mut set = SelectorSet::new(0);
    set.add_rule("title", "h1.d-title").unwrap();
    set.add_rule("detail_images", "div.gallery").unwrap();
    set
}

fn orchestrator_with(
    engine: Arc<ScriptedEngine>,
    records: Arc<MemoryRecordStore>,
    max_retries: u32,
    stop_grace: Duration,
) -> CrawlOrchestrator {
    let router = Arc::new(EngineRouter::new(vec![engine as Arc<dyn PageEngine>]));
    let worker = Arc::new(ExtractWorker::new(router, None, Duration::from_secs(30)));
    let policy = RetryPolicy {
        max_retries,
        delay_unit: Duration::from_secs(2),
        backoff_cap: Duration::from_secs(30),
    };
    let options = CrawlOptions {
        max_concurrency: 2,
        stop_grace,
    };
    CrawlOrchestrator::new(worker, policy, options, records)
}

async fn drain_events(mut rx: EventReceiver) -> Vec<CrawlEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn urls(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://weidian.com/item.html?itemID={}", i))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fans_out_one_task_per_url_and_saves_each_result() {
    let engine = Arc::new(ScriptedEngine::succeeding());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine.clone(),
        records.clone(),
        3,
        Duration::from_secs(10),
    );

    let (events, rx) = event_channel();
    let handle = orchestrator.start(urls(3), selector_set(), events).unwrap();
    let summary = handle.await.unwrap();
    let events = drain_events(rx).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);

    // 每个URL在重试之前恰好展开一个任务
    for url in urls(3) {
        assert_eq!(engine.calls_for(&url), 1);
    }

    let saved = records.saved.lock().unwrap();
    assert_eq!(saved.len(), 3);
    // 首次成功的信封尝试计数为1
    assert!(saved.iter().all(|envelope| envelope.attempt_count == 1));

    assert!(events.iter().any(|event| matches!(
        event,
        CrawlEvent::BatchFinished {
            completed: 3,
            total: 3
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn ordered_image_field_preserves_document_order() {
    let engine = Arc::new(ScriptedEngine::succeeding());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine,
        records.clone(),
        3,
        Duration::from_secs(10),
    );

    let (events, _rx) = event_channel();
    let handle = orchestrator.start(urls(1), selector_set(), events).unwrap();
    handle.await.unwrap();

    let saved = records.saved.lock().unwrap();
    let fields = &saved[0].fields;
    match &fields["detail_images"] {
        shopcrawl::domain::models::product::FieldValue::Images(sources) => {
            assert_eq!(sources.len(), 4);
            assert!(sources[0].ends_with("/1.jpg"));
            assert!(sources[3].ends_with("/4.jpg"));
        }
        other => panic!("expected image list, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_become_failed_records() {
    // 3个URL全部持续失败，max_retries=2 → 每个URL恰好3次尝试
    let mut failures = HashMap::new();
    for url in urls(3) {
        failures.insert(url, u32::MAX);
    }
    let engine = Arc::new(ScriptedEngine::with_failures(failures));
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine.clone(),
        records.clone(),
        2,
        Duration::from_secs(10),
    );

    let (events, rx) = event_channel();
    let handle = orchestrator.start(urls(3), selector_set(), events).unwrap();
    let summary = handle.await.unwrap();
    let events = drain_events(rx).await;

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 3);

    for url in urls(3) {
        assert_eq!(engine.calls_for(&url), 3, "1 initial + 2 retries for {}", url);
    }

    let failed = orchestrator.failed_tasks();
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().all(|record| record.attempts == 2));

    assert!(records.saved.lock().unwrap().is_empty());
    assert!(events.iter().any(|event| matches!(
        event,
        CrawlEvent::BatchFinished {
            completed: 3,
            total: 3
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_retry() {
    let mut failures = HashMap::new();
    let target = urls(1).remove(0);
    failures.insert(target.clone(), 1);
    let engine = Arc::new(ScriptedEngine::with_failures(failures));
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine.clone(),
        records.clone(),
        3,
        Duration::from_secs(10),
    );

    let (events, rx) = event_channel();
    let handle = orchestrator
        .start(vec![target.clone()], selector_set(), events)
        .unwrap();
    let summary = handle.await.unwrap();
    let events = drain_events(rx).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(engine.calls_for(&target), 2);
    assert!(orchestrator.failed_tasks().is_empty());

    let saved = records.saved.lock().unwrap();
    assert_eq!(saved[0].attempt_count, 2);

    // 状态流经过 Retrying
    assert!(events.iter().any(|event| matches!(
        event,
        CrawlEvent::StatusChanged {
            status: TaskStatus::Retrying,
            ..
        }
    )));
}

#[tokio::test]
async fn empty_batch_and_empty_selector_set_rejected_synchronously() {
    let engine = Arc::new(ScriptedEngine::succeeding());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(engine, records, 3, Duration::from_secs(10));

    let (events, _rx) = event_channel();
    assert!(matches!(
        orchestrator.start(Vec::new(), selector_set(), events),
        Err(OrchestratorError::EmptyBatch)
    ));

    let (events, _rx) = event_channel();
    assert!(matches!(
        orchestrator.start(urls(1), SelectorSet::new(0), events),
        Err(OrchestratorError::EmptySelectorSet)
    ));
}

#[tokio::test(start_paused = true)]
async fn duplicate_urls_fan_out_once() {
    let engine = Arc::new(ScriptedEngine::succeeding());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine.clone(),
        records,
        3,
        Duration::from_secs(10),
    );

    let url = urls(1).remove(0);
    let (events, rx) = event_channel();
    let handle = orchestrator
        .start(vec![url.clone(), url.clone()], selector_set(), events)
        .unwrap();
    let summary = handle.await.unwrap();
    drain_events(rx).await;

    assert_eq!(summary.total, 1);
    assert_eq!(engine.calls_for(&url), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_terminates_hanging_tasks_as_stopped() {
    let engine = Arc::new(ScriptedEngine::hanging());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(
        engine,
        records.clone(),
        3,
        Duration::from_secs(1),
    );

    let (events, rx) = event_channel();
    let handle = orchestrator.start(urls(5), selector_set(), events).unwrap();

    // 让任务进入阻塞的页面加载，然后请求停止
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.stop();

    let summary = handle.await.unwrap();
    let events = drain_events(rx).await;

    // 没有任何任务被悄悄丢掉
    assert_eq!(summary.completed, 5);
    assert_eq!(summary.stopped, 5);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);

    // 取消不是错误：不产生失败记录
    assert!(orchestrator.failed_tasks().is_empty());
    assert!(records.saved.lock().unwrap().is_empty());

    let stopped_events = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                CrawlEvent::StatusChanged {
                    status: TaskStatus::Stopped,
                    ..
                }
            )
        })
        .count();
    assert_eq!(stopped_events, 5);

    assert!(events.iter().any(|event| matches!(
        event,
        CrawlEvent::BatchFinished {
            completed: 5,
            total: 5
        }
    )));
}

#[tokio::test]
async fn second_start_on_same_orchestrator_is_rejected() {
    let engine = Arc::new(ScriptedEngine::succeeding());
    let records = Arc::new(MemoryRecordStore::default());
    let orchestrator = orchestrator_with(engine, records, 3, Duration::from_secs(10));

    let (events, _rx) = event_channel();
    let handle = orchestrator.start(urls(1), selector_set(), events).unwrap();

    let (events, _rx) = event_channel();
    assert!(matches!(
        orchestrator.start(urls(1), selector_set(), events),
        Err(OrchestratorError::AlreadyStarted)
    ));

    handle.await.unwrap();
}
