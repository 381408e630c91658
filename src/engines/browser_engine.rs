// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use crate::domain::models::task::Platform;
use crate::engines::traits::{EngineError, FetchRequest, PageSnapshot, PageEngine};

// Global browser instance to avoid re-launching Chrome on every request.
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

/// 获取或初始化共享浏览器实例
///
/// 浏览器进程全局只启动一次；每个任务独享自己的page，
/// 任务之间绝不共享page。
pub async fn get_browser() -> Result<&'static Browser, EngineError> {
    BROWSER_INSTANCE
        .get_or_try_init(|| async {
            let remote_debugging_url = std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url).await.map_err(|e| {
                    EngineError::Browser(format!("Failed to connect to remote Chrome: {}", e))
                })?
            } else {
                let builder = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(Duration::from_secs(30))
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .arg("--window-size=1920,1080");

                Browser::launch(builder.build().map_err(EngineError::Browser)?)
                    .await
                    .map_err(|e| EngineError::Browser(e.to_string()))?
            };

            // Spawn a handler to process browser events
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 浏览器引擎
///
/// 基于chromiumoxide实现的浏览器自动化抓取引擎，走DOM路径。
/// 页面的导航和加载等待整体包在请求超时内。
pub struct BrowserEngine;

#[async_trait]
impl PageEngine for BrowserEngine {
    /// 执行浏览器自动化抓取
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError> {
        let start = Instant::now();

        tokio::time::timeout(request.timeout, async {
            let browser = get_browser().await?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| EngineError::Browser(e.to_string()))?;

            // goto waits for the load event by default
            let navigated = page
                .goto(&request.url)
                .await
                .map_err(|e| EngineError::Browser(e.to_string()));

            let result = match navigated {
                Ok(_) => {
                    let final_url = page
                        .url()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| request.url.clone());
                    page.content()
                        .await
                        .map(|content| PageSnapshot {
                            url: final_url,
                            status_code: 200,
                            content,
                            response_time_ms: start.elapsed().as_millis() as u64,
                        })
                        .map_err(|e| EngineError::Browser(e.to_string()))
                }
                Err(e) => Err(e),
            };

            // 任务独占的page用完即关，避免页面堆积
            let _ = page.close().await;

            result
        })
        .await
        .map_err(|_| EngineError::Timeout)?
    }

    /// 计算对请求的支持分数
    ///
    /// 微店页面依赖JS渲染，浏览器路径最优；HTTP可达的平台
    /// 用浏览器代价过高
    fn support_score(&self, request: &FetchRequest) -> u8 {
        match request.platform {
            Platform::Weidian => 100,
            Platform::Pinduoduo => 30,
        }
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
