// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::selector::SelectorSet;
use crate::utils::errors::RepositoryError;

/// 抽取模板
///
/// 拾取器确认后的选择器集合连同描述信息一起保存，供后续
/// 批次直接加载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// 选择器集合
    pub selectors: SelectorSet,
    /// 模板描述
    #[serde(default)]
    pub description: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后使用时间
    pub last_used: DateTime<Utc>,
}

/// 模板仓库特质
///
/// 只被爬取前的拾取工作流消费
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// 按名称加载模板，更新最后使用时间
    async fn load(&self, name: &str) -> Result<SelectorSet, RepositoryError>;

    /// 保存模板，同名覆盖
    async fn save(
        &self,
        name: &str,
        selectors: SelectorSet,
        description: &str,
    ) -> Result<(), RepositoryError>;

    /// 列出全部模板名称
    async fn list(&self) -> Result<Vec<String>, RepositoryError>;

    /// 删除模板
    async fn delete(&self, name: &str) -> Result<(), RepositoryError>;
}
