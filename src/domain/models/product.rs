// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::task::Platform;

/// 字段值
///
/// 图片类字段按命名约定分类为有序的图片地址列表；其余字段
/// 按匹配元素数量分为单个文本或文本列表。零匹配为 `Empty`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 单个文本值（恰好一个匹配）
    Text(String),
    /// 文本列表（多个匹配，不会悄悄取第一个）
    TextList(Vec<String>),
    /// 有序图片地址列表，保持文档顺序
    Images(Vec<String>),
    /// 无匹配
    Empty,
}

impl FieldValue {
    /// 字段是否没有任何有效内容
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::TextList(list) | FieldValue::Images(list) => {
                list.iter().all(|s| s.is_empty())
            }
            FieldValue::Empty => true,
        }
    }
}

/// 结果信封
///
/// 每个成功任务恰好产生一个，所有权立即移交持久化协作方，
/// 核心不再持有引用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// 商品URL
    pub url: String,
    /// 平台变体
    pub platform: Platform,
    /// 字段名到字段值的映射
    pub fields: HashMap<String, FieldValue>,
    /// 抽取完成时间
    pub timestamp: DateTime<Utc>,
    /// 成功前经历的尝试次数（首次成功为1）
    pub attempt_count: u32,
}

impl ResultEnvelope {
    pub fn new(
        url: String,
        platform: Platform,
        fields: HashMap<String, FieldValue>,
        attempt_count: u32,
    ) -> Self {
        Self {
            url,
            platform,
            fields,
            timestamp: Utc::now(),
            attempt_count,
        }
    }

    /// 是否所有字段都为空
    ///
    /// 全空的信封永远不应该被构建为成功结果
    pub fn all_fields_empty(&self) -> bool {
        self.fields.values().all(|value| value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_emptiness() {
        assert!(FieldValue::Empty.is_empty());
        assert!(FieldValue::Text(String::new()).is_empty());
        assert!(FieldValue::Images(vec![]).is_empty());
        assert!(!FieldValue::Text("89.00".into()).is_empty());
        assert!(!FieldValue::Images(vec!["https://img.example/1.jpg".into()]).is_empty());
    }

    #[test]
    fn test_envelope_all_fields_empty() {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), FieldValue::Empty);
        fields.insert("price".to_string(), FieldValue::TextList(vec![]));
        let envelope = ResultEnvelope::new(
            "https://weidian.com/item.html?itemID=1".into(),
            Platform::Weidian,
            fields,
            1,
        );
        assert!(envelope.all_fields_empty());
    }

    #[test]
    fn test_scalar_field_serializes_to_plain_string() {
        let value = FieldValue::Text("连衣裙".into());
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"连衣裙\"");

        let images = FieldValue::Images(vec!["a.jpg".into(), "b.jpg".into()]);
        assert_eq!(
            serde_json::to_string(&images).unwrap(),
            "[\"a.jpg\",\"b.jpg\"]"
        );
    }
}
