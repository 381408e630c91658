// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::product::ResultEnvelope;
use crate::utils::errors::RepositoryError;

/// 媒体文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// 商品主图
    MainImage,
    /// 详情图
    DetailImage,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::MainImage => "main_image",
            MediaKind::DetailImage => "detail_image",
        }
    }
}

/// 结果记录仓库特质
///
/// 持久化协作方的窄接口。核心对每个成功信封恰好调用一次
/// `save_record`，保存失败只上报错误事件，不在核心内重试。
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 保存一条抽取结果，返回记录ID
    async fn save_record(&self, envelope: ResultEnvelope) -> Result<i64, RepositoryError>;

    /// 登记一个已下载的媒体文件
    async fn save_media_file(
        &self,
        record_id: i64,
        kind: MediaKind,
        path: &str,
        original_url: &str,
    ) -> Result<(), RepositoryError>;
}
