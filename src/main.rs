// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use shopcrawl::config::settings::Settings;
use shopcrawl::domain::models::selector::SelectorSet;
use shopcrawl::domain::repositories::template_repository::TemplateRepository;
use shopcrawl::domain::services::selector_inference::PickMode;
use shopcrawl::engines::browser_engine::BrowserEngine;
use shopcrawl::engines::http_engine::HttpEngine;
use shopcrawl::engines::router::EngineRouter;
use shopcrawl::engines::traits::PageEngine;
use shopcrawl::infrastructure::record_store::JsonlRecordStore;
use shopcrawl::infrastructure::template_store::JsonTemplateStore;
use shopcrawl::picker::element_picker::ElementPicker;
use shopcrawl::proxy::pool::ProxyPool;
use shopcrawl::proxy::sources::{Ip89Source, KuaidailiSource, ProxySource};
use shopcrawl::utils::retry_policy::RetryPolicy;
use shopcrawl::utils::telemetry;
use shopcrawl::utils::url_utils;
use shopcrawl::workers::events::{event_channel, CrawlEvent};
use shopcrawl::workers::extract_worker::ExtractWorker;
use shopcrawl::workers::orchestrator::{CrawlOptions, CrawlOrchestrator};

#[derive(Parser)]
#[command(name = "shopcrawl", about = "商品页批量抽取工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 按模板批量爬取商品链接
    Crawl {
        /// 商品链接，可多次指定
        #[arg(long = "url")]
        urls: Vec<String>,
        /// 从文件读取商品链接（每行一个）
        #[arg(long)]
        urls_file: Option<String>,
        /// 模板名称
        #[arg(long)]
        template: String,
        /// 覆盖并发上限
        #[arg(long)]
        concurrency: Option<usize>,
        /// 覆盖最大重试次数
        #[arg(long)]
        max_retries: Option<u32>,
        /// 批次结束后把失败任务再跑一轮
        #[arg(long)]
        retry_failed: bool,
    },
    /// 在页面上拾取一个元素并保存为模板规则
    Pick {
        /// 页面URL
        #[arg(long)]
        url: String,
        /// 字段名称（如 title、main_images）
        #[arg(long)]
        name: String,
        /// 批量模式：一次点击选中所有相似元素
        #[arg(long)]
        batch: bool,
        /// 追加进的模板名称
        #[arg(long)]
        template: String,
        /// 模板描述（新建模板时使用）
        #[arg(long, default_value = "")]
        description: String,
    },
    /// 列出已保存的模板
    Templates,
    /// 刷新代理池并报告存活数量
    Proxies,
}

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并分派子命令
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry();

    let settings = Settings::new().context("Failed to load configuration")?;
    let cli = Cli::parse();

    match cli.command {
        Command::Crawl {
            urls,
            urls_file,
            template,
            concurrency,
            max_retries,
            retry_failed,
        } => {
            run_crawl(
                &settings,
                urls,
                urls_file,
                &template,
                concurrency,
                max_retries,
                retry_failed,
            )
            .await
        }
        Command::Pick {
            url,
            name,
            batch,
            template,
            description,
        } => run_pick(&settings, &url, &name, batch, &template, &description).await,
        Command::Templates => {
            let store = JsonTemplateStore::new(&settings.storage.templates_path);
            for name in store.list().await? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Proxies => {
            let pool = build_proxy_pool(&settings);
            let live = pool.refresh().await;
            info!("{} live proxies", live);
            Ok(())
        }
    }
}

fn build_proxy_pool(settings: &Settings) -> Arc<ProxyPool> {
    let sources: Vec<Arc<dyn ProxySource>> = vec![
        Arc::new(KuaidailiSource::new(&settings.proxy.kuaidaili_url)),
        Arc::new(Ip89Source::new(&settings.proxy.ip89_url)),
    ];
    Arc::new(ProxyPool::new(
        sources,
        &settings.proxy.probe_url,
        settings.proxy.check_timeout(),
    ))
}

/// 收集、校验并去重商品链接
fn collect_urls(urls: Vec<String>, urls_file: Option<String>) -> anyhow::Result<Vec<String>> {
    let mut collected = urls;
    if let Some(path) = urls_file {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read url file {}", path))?;
        collected.extend(
            content
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty()),
        );
    }

    let mut seen = std::collections::HashSet::new();
    let mut valid = Vec::new();
    for url in collected {
        if !url_utils::is_valid_product_url(&url) {
            warn!("Skipping invalid url: {}", url);
            continue;
        }
        if seen.insert(url.clone()) {
            valid.push(url);
        } else {
            warn!("Skipping duplicate url: {}", url);
        }
    }
    Ok(valid)
}

#[allow(clippy::too_many_arguments)]
async fn run_crawl(
    settings: &Settings,
    urls: Vec<String>,
    urls_file: Option<String>,
    template: &str,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    retry_failed: bool,
) -> anyhow::Result<()> {
    let urls = collect_urls(urls, urls_file)?;
    if urls.is_empty() {
        bail!("No valid urls to crawl");
    }

    let template_store = JsonTemplateStore::new(&settings.storage.templates_path);
    let selector_set = template_store
        .load(template)
        .await
        .with_context(|| format!("Failed to load template '{}'", template))?;

    let engines: Vec<Arc<dyn PageEngine>> = vec![Arc::new(HttpEngine), Arc::new(BrowserEngine)];
    let router = Arc::new(EngineRouter::new(engines));
    let proxy_pool = build_proxy_pool(settings);
    let worker = Arc::new(ExtractWorker::new(
        router,
        Some(proxy_pool),
        settings.crawler.request_timeout(),
    ));

    let policy = RetryPolicy {
        max_retries: max_retries.unwrap_or(settings.crawler.max_retries),
        delay_unit: Duration::from_secs(settings.crawler.retry_delay_unit),
        backoff_cap: Duration::from_secs(settings.crawler.backoff_cap),
    };
    let options = CrawlOptions {
        max_concurrency: concurrency.unwrap_or(settings.crawler.max_concurrency),
        stop_grace: settings.crawler.stop_grace(),
    };
    let records = Arc::new(JsonlRecordStore::new(&settings.storage.records_path));

    let orchestrator = Arc::new(CrawlOrchestrator::new(
        worker.clone(),
        policy.clone(),
        options.clone(),
        records.clone(),
    ));

    // Ctrl+C 触发协作式停止
    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let (events, mut event_rx) = event_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            render_event(event);
        }
    });

    let handle = orchestrator
        .start(urls, selector_set, events)?;
    let summary = handle.await.context("Batch supervisor panicked")?;
    printer.await.ok();

    info!(
        "Done: {} succeeded, {} failed, {} stopped",
        summary.succeeded, summary.failed, summary.stopped
    );

    let failed = orchestrator.failed_tasks();
    if !failed.is_empty() {
        for record in &failed {
            warn!(
                "Failed after {} retries: {} ({})",
                record.attempts, record.url, record.last_error
            );
        }

        if retry_failed {
            info!("Retrying {} failed tasks", failed.len());
            let retry_urls: Vec<String> = failed.iter().map(|r| r.url.clone()).collect();
            orchestrator.clear_failed_tasks();

            let retry_orchestrator =
                CrawlOrchestrator::new(worker, policy, options, records);
            let (events, mut event_rx) = event_channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    render_event(event);
                }
            });
            let selector_set = template_store.load(template).await?;
            let handle = retry_orchestrator
                .start(retry_urls, selector_set, events)?;
            let summary = handle.await.context("Retry supervisor panicked")?;
            printer.await.ok();
            info!(
                "Retry round done: {} succeeded, {} failed",
                summary.succeeded, summary.failed
            );
        }
    }

    Ok(())
}

async fn run_pick(
    settings: &Settings,
    url: &str,
    name: &str,
    batch: bool,
    template: &str,
    description: &str,
) -> anyhow::Result<()> {
    if !url_utils::is_valid_product_url(url) {
        bail!("Invalid url: {}", url);
    }

    let picker = ElementPicker::new(
        settings.picker.pick_timeout(),
        settings.picker.poll_interval(),
    );
    let mode = if batch { PickMode::Batch } else { PickMode::Single };

    info!("Opening {} — click the element to capture", url);
    let result = picker.pick(url, mode).await?;

    println!("selector: {}", result.selector);
    println!("matched {} element(s)", result.match_count);
    for line in result.preview.iter().take(10) {
        println!("  {}", line);
    }

    let store = JsonTemplateStore::new(&settings.storage.templates_path);
    let mut selector_set = match store.load(template).await {
        Ok(set) => set,
        Err(_) => SelectorSet::new(settings.crawler.per_task_delay),
    };
    selector_set.add_rule(name, &result.selector)?;
    store.save(template, selector_set, description).await?;
    info!("Rule '{}' saved into template '{}'", name, template);

    Ok(())
}

/// 把事件流渲染到日志
fn render_event(event: CrawlEvent) {
    match event {
        CrawlEvent::Progress { level, message } => {
            use shopcrawl::workers::events::ProgressLevel;
            match level {
                ProgressLevel::Info => info!("{}", message),
                ProgressLevel::Warn => warn!("{}", message),
                ProgressLevel::Error => error!("{}", message),
            }
        }
        CrawlEvent::Extracted(envelope) => {
            info!(
                "Extracted {} fields from {}",
                envelope.fields.len(),
                envelope.url
            );
        }
        CrawlEvent::Error { url, message } => error!("{}: {}", url, message),
        CrawlEvent::StatusChanged { url, status } => info!("{} -> {}", url, status),
        CrawlEvent::Terminal { url, success } => {
            info!("{} terminal (success: {})", url, success)
        }
        CrawlEvent::BatchFinished { completed, total } => {
            info!("Batch finished: {}/{}", completed, total)
        }
    }
}
