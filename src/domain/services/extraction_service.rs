// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use tracing::warn;

use crate::domain::models::product::FieldValue;
use crate::domain::models::selector::SelectorSet;
use crate::engines::dom::Document;
use crate::engines::traits::EngineError;

/// 图片类字段的命名后缀
///
/// 分类只看字段命名约定，不做DOM探测
const IMAGE_NAME_SUFFIXES: [&str; 2] = ["images", "pictures"];

/// 抽取服务
///
/// 负责把选择器集合在页面快照上解析为字段值
pub struct ExtractionService;

impl ExtractionService {
    /// 判断字段名是否表示图片集合
    pub fn is_image_rule(name: &str) -> bool {
        let lower = name.trim().to_ascii_lowercase();
        IMAGE_NAME_SUFFIXES
            .iter()
            .any(|suffix| lower.ends_with(suffix))
    }

    /// 解析全部字段
    ///
    /// 单个字段解析失败记为警告并置空，不影响其余字段；
    /// 所有字段都为空时整个任务按失败处理，绝不产出空信封。
    pub fn resolve_fields(
        content: &str,
        page_url: &str,
        selector_set: &SelectorSet,
    ) -> Result<HashMap<String, FieldValue>, EngineError> {
        let document = Document::parse(content, page_url);
        let mut fields = HashMap::new();

        for rule in selector_set.rules() {
            let value = if Self::is_image_rule(&rule.name) {
                match document.read_image_sources(&rule.selector) {
                    Ok(sources) => FieldValue::Images(sources),
                    Err(e) => {
                        warn!(rule = %rule.name, url = %page_url, "Field resolution failed: {}", e);
                        FieldValue::Empty
                    }
                }
            } else {
                match document.read_texts(&rule.selector) {
                    Ok(texts) => Self::classify_texts(texts),
                    Err(e) => {
                        warn!(rule = %rule.name, url = %page_url, "Field resolution failed: {}", e);
                        FieldValue::Empty
                    }
                }
            };

            fields.insert(rule.name.clone(), value);
        }

        if fields.values().all(|value| value.is_empty()) {
            return Err(EngineError::EmptyResult);
        }

        Ok(fields)
    }

    /// 按匹配数量分类文本字段：0个为空、1个为标量、多个为列表
    fn classify_texts(texts: Vec<String>) -> FieldValue {
        let mut texts: Vec<String> = texts.into_iter().filter(|t| !t.is_empty()).collect();
        match texts.len() {
            0 => FieldValue::Empty,
            1 => FieldValue::Text(texts.remove(0)),
            _ => FieldValue::TextList(texts),
        }
    }
}
