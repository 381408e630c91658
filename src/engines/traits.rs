// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::task::Platform;
use crate::utils::errors::ProxyError;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 页面未解析出任何字段
    #[error("Empty extraction result")]
    EmptyResult,
    /// 代理池错误
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
    /// 浏览器自动化错误
    #[error("Browser error: {0}")]
    Browser(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    ///
    /// 导航超时、网络错误、空抽取结果和代理枯竭都视为短暂失败
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            EngineError::Timeout => true,
            EngineError::EmptyResult => true,
            EngineError::Proxy(_) => true,
            EngineError::Browser(_) => true,
            EngineError::Other(_) => false,
        }
    }
}

/// 页面抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 平台变体
    pub platform: Platform,
    /// 导航/请求超时时间
    pub timeout: Duration,
    /// 代理地址（仅HTTP路径使用）
    pub proxy: Option<String>,
}

/// 页面快照
///
/// 导航完成后的文档内容，供选择器解析使用
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// 最终URL（重定向之后）
    pub url: String,
    /// HTTP状态码
    pub status_code: u16,
    /// 页面HTML内容
    pub content: String,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

/// 页面引擎特质
///
/// 每个在途任务独占一个引擎会话；引擎只负责把URL变成
/// 页面快照，字段解析在快照上统一进行。
#[async_trait]
pub trait PageEngine: Send + Sync {
    /// 执行页面抓取
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError>;

    /// 计算对请求的支持分数（0-100）
    fn support_score(&self, request: &FetchRequest) -> u8;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
