// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::time::Instant;

use crate::domain::models::task::Platform;
use crate::engines::traits::{EngineError, FetchRequest, PageSnapshot, PageEngine};

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP抓取引擎
///
/// 基于reqwest实现的直连HTTP抓取引擎，走代理轮换的API路径。
/// 每个请求使用新建的client，保证代理和cookie隔离。
pub struct HttpEngine;

#[async_trait]
impl PageEngine for HttpEngine {
    /// 执行HTTP抓取
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError> {
        let mut headers = HeaderMap::new();
        if request.platform == Platform::Pinduoduo {
            headers.insert(
                REFERER,
                HeaderValue::from_static("https://mobile.yangkeduo.com/"),
            );
        }

        // Each request gets a fresh client for proxy/cookie isolation
        let mut builder = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(request.timeout)
            .cookie_store(true);

        if let Some(proxy_url) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::Other(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        let start = Instant::now();
        let response = client
            .get(&request.url)
            .headers(headers)
            .send()
            .await?
            .error_for_status()?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let content = response.text().await?;

        Ok(PageSnapshot {
            url: final_url,
            status_code,
            content,
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// 计算对请求的支持分数
    ///
    /// 拼多多的API路径不需要JS渲染，HTTP引擎最优；
    /// 微店页面需要浏览器渲染，给低分
    fn support_score(&self, request: &FetchRequest) -> u8 {
        match request.platform {
            Platform::Pinduoduo => 100,
            Platform::Weidian => 20,
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
