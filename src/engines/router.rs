// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::debug;

use crate::engines::traits::{EngineError, FetchRequest, PageSnapshot, PageEngine};

/// 引擎路由器
///
/// 根据各引擎对请求的支持分数选择引擎并执行抓取
pub struct EngineRouter {
    /// 引擎列表
    engines: Vec<Arc<dyn PageEngine>>,
}

impl EngineRouter {
    pub fn new(engines: Vec<Arc<dyn PageEngine>>) -> Self {
        Self { engines }
    }

    /// 选择支持分数最高的引擎
    pub fn select(&self, request: &FetchRequest) -> Option<&Arc<dyn PageEngine>> {
        self.engines
            .iter()
            .max_by_key(|engine| engine.support_score(request))
    }

    /// 路由并执行抓取请求
    pub async fn route(&self, request: &FetchRequest) -> Result<PageSnapshot, EngineError> {
        let engine = self
            .select(request)
            .ok_or_else(|| EngineError::Other("No engine registered".to_string()))?;

        debug!(engine = engine.name(), url = %request.url, "Engine selected");
        engine.fetch(request).await
    }
}
