// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::utils::errors::ProxyError;

/// 代理源特质
///
/// 每个源从一个外部免费代理列表页抓取候选地址。单个源失败
/// 不会中止整轮刷新。
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// 抓取候选代理地址（`http://ip:port` 形式）
    async fn fetch_candidates(&self, client: &reqwest::Client) -> Result<Vec<String>, ProxyError>;

    /// 源名称
    fn name(&self) -> &'static str;
}

/// 快代理免费列表源
pub struct KuaidailiSource {
    list_url: String,
}

impl KuaidailiSource {
    pub fn new(list_url: impl Into<String>) -> Self {
        Self {
            list_url: list_url.into(),
        }
    }

    fn parse(content: &str) -> Vec<String> {
        let document = Html::parse_document(content);
        let row = Selector::parse("#list tbody tr").expect("static selector");
        let ip = Selector::parse("td[data-title=\"IP\"]").expect("static selector");
        let port = Selector::parse("td[data-title=\"PORT\"]").expect("static selector");

        let mut candidates = Vec::new();
        for tr in document.select(&row) {
            let ip_text = tr
                .select(&ip)
                .next()
                .map(|td| td.text().collect::<String>());
            let port_text = tr
                .select(&port)
                .next()
                .map(|td| td.text().collect::<String>());

            if let (Some(ip), Some(port)) = (ip_text, port_text) {
                let (ip, port) = (ip.trim().to_string(), port.trim().to_string());
                if !ip.is_empty() && !port.is_empty() {
                    candidates.push(format!("http://{}:{}", ip, port));
                }
            }
        }
        candidates
    }
}

#[async_trait]
impl ProxySource for KuaidailiSource {
    async fn fetch_candidates(&self, client: &reqwest::Client) -> Result<Vec<String>, ProxyError> {
        let content = client
            .get(&self.list_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ProxyError::SourceFailed(self.name(), e.to_string()))?
            .text()
            .await
            .map_err(|e| ProxyError::SourceFailed(self.name(), e.to_string()))?;

        Ok(Self::parse(&content))
    }

    fn name(&self) -> &'static str {
        "kuaidaili"
    }
}

/// 89免费代理列表源
pub struct Ip89Source {
    list_url: String,
}

impl Ip89Source {
    pub fn new(list_url: impl Into<String>) -> Self {
        Self {
            list_url: list_url.into(),
        }
    }

    fn parse(content: &str) -> Vec<String> {
        let document = Html::parse_document(content);
        let row = Selector::parse("tbody tr").expect("static selector");
        let cell = Selector::parse("td").expect("static selector");

        let mut candidates = Vec::new();
        for tr in document.select(&row) {
            let mut cells = tr.select(&cell);
            let ip = cells.next().map(|td| td.text().collect::<String>());
            let port = cells.next().map(|td| td.text().collect::<String>());

            if let (Some(ip), Some(port)) = (ip, port) {
                let (ip, port) = (ip.trim().to_string(), port.trim().to_string());
                if !ip.is_empty() && !port.is_empty() {
                    candidates.push(format!("http://{}:{}", ip, port));
                }
            }
        }
        candidates
    }
}

#[async_trait]
impl ProxySource for Ip89Source {
    async fn fetch_candidates(&self, client: &reqwest::Client) -> Result<Vec<String>, ProxyError> {
        let content = client
            .get(&self.list_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ProxyError::SourceFailed(self.name(), e.to_string()))?
            .text()
            .await
            .map_err(|e| ProxyError::SourceFailed(self.name(), e.to_string()))?;

        Ok(Self::parse(&content))
    }

    fn name(&self) -> &'static str {
        "89ip"
    }
}
