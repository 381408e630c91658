// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("存储错误: {0}")]
    StorageError(String),

    #[error("未找到数据")]
    NotFound,

    #[error("无效参数: {0}")]
    InvalidParameter(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        RepositoryError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::StorageError(e.to_string())
    }
}

/// 编排器错误类型
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// URL批次为空，同步拒绝，不进入重试路径
    #[error("URL batch is empty")]
    EmptyBatch,

    /// 选择器集合没有任何规则，同步拒绝
    #[error("Selector set has no rules")]
    EmptySelectorSet,

    /// 同一个编排器实例只允许启动一个批次
    #[error("Batch already started")]
    AlreadyStarted,
}

/// 代理池错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 完整刷新之后存活集合仍然为空
    #[error("No live proxies available")]
    NoneAvailable,

    /// 单个代理源抓取失败（仅记录，不中止刷新）
    #[error("Proxy source {0} failed: {1}")]
    SourceFailed(&'static str, String),
}

/// 元素拾取错误类型
#[derive(Error, Debug)]
pub enum PickError {
    /// 超时时间内没有捕获到用户点击的元素
    #[error("No element selected")]
    NoElementSelected,

    /// 页面在拾取过程中不可用（导航离开或浏览器崩溃）
    #[error("Page unavailable: {0}")]
    PageUnavailable(String),

    #[error("Browser error: {0}")]
    Browser(String),
}
