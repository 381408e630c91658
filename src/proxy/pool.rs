// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::proxy::sources::ProxySource;
use crate::utils::errors::ProxyError;

const LIST_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 代理池
///
/// 维护一组当前可达的出站代理，供HTTP抽取路径轮换使用。
/// 候选地址只有通过本轮验证才进入存活集合；刷新时上一轮
/// 的存活集合整体作废，不做增量淘汰。
pub struct ProxyPool {
    /// 存活集合，整体换入换出，读者不会看到半填充状态
    live: RwLock<Vec<String>>,
    /// 候选来源
    sources: Vec<Arc<dyn ProxySource>>,
    /// 验证用的已知可达目标
    probe_url: String,
    /// 单个候选的验证超时
    check_timeout: Duration,
    client: reqwest::Client,
}

impl ProxyPool {
    pub fn new(
        sources: Vec<Arc<dyn ProxySource>>,
        probe_url: impl Into<String>,
        check_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(LIST_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            live: RwLock::new(Vec::new()),
            sources,
            probe_url: probe_url.into(),
            check_timeout,
            client,
        }
    }

    /// 刷新代理池
    ///
    /// 拉取全部源的候选地址，逐个并发验证，然后原子替换
    /// 存活集合。任何单个源或候选失败都不会中止刷新。
    /// 返回刷新后的存活数量。
    pub async fn refresh(&self) -> usize {
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for source in &self.sources {
            match source.fetch_candidates(&self.client).await {
                Ok(list) => {
                    for proxy in list {
                        if seen.insert(proxy.clone()) {
                            candidates.push(proxy);
                        }
                    }
                }
                Err(e) => {
                    warn!("Proxy source failed: {}", e);
                }
            }
        }

        let checks = candidates
            .into_iter()
            .map(|proxy| async move {
                if self.verify_proxy(&proxy).await {
                    Some(proxy)
                } else {
                    None
                }
            });
        let live: Vec<String> = futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();

        let count = live.len();
        info!("Proxy pool refreshed, {} live proxies", count);

        *self.live.write().await = live;
        count
    }

    /// 验证单个候选代理
    ///
    /// 在超时时间内通过该代理成功请求探测目标（2xx）才算通过
    async fn verify_proxy(&self, proxy: &str) -> bool {
        let Ok(proxy_cfg) = reqwest::Proxy::all(proxy) else {
            return false;
        };
        let Ok(client) = reqwest::Client::builder()
            .proxy(proxy_cfg)
            .timeout(self.check_timeout)
            .build()
        else {
            return false;
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if ok {
                    info!("Valid proxy found: {}", proxy);
                }
                ok
            }
            Err(_) => false,
        }
    }

    /// 随机取一个存活代理
    ///
    /// 存活集合为空时先同步刷新一次（首次使用或耗尽后自愈）；
    /// 刷新后仍为空则上报 `NoneAvailable`。
    pub async fn get_random(&self) -> Result<String, ProxyError> {
        {
            let live = self.live.read().await;
            if let Some(proxy) = Self::choose(&live) {
                return Ok(proxy);
            }
        }

        self.refresh().await;

        let live = self.live.read().await;
        Self::choose(&live).ok_or(ProxyError::NoneAvailable)
    }

    /// 当前存活数量
    pub async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }

    fn choose(live: &[String]) -> Option<String> {
        if live.is_empty() {
            None
        } else {
            Some(live[rand::random_range(0..live.len())].clone())
        }
    }
}
