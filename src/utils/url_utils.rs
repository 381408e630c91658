// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

use crate::domain::models::task::Platform;

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 校验商品链接是否可以加入批次
///
/// 只接受带主机名的 http/https 链接
pub fn is_valid_product_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// 根据URL主机名识别平台
///
/// 未知站点走浏览器（DOM）路径，等同于微店平台的处理方式
pub fn detect_platform(raw: &str) -> Platform {
    let host = match Url::parse(raw) {
        Ok(url) => url.host_str().map(|h| h.to_ascii_lowercase()),
        Err(_) => None,
    };

    match host.as_deref() {
        Some(h) if h.ends_with("yangkeduo.com") || h.ends_with("pinduoduo.com") => {
            Platform::Pinduoduo
        }
        _ => Platform::Weidian,
    }
}

/// 解析拼多多商品URL中的商品ID
///
/// 优先取 `goods_id` 查询参数，否则取路径最后一段
pub fn parse_goods_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;

    if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "goods_id") {
        if !id.is_empty() {
            return Some(id.into_owned());
        }
    }

    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(|segment| segment.to_string())
}
