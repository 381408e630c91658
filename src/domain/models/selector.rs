// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

use crate::domain::models::task::DomainError;

/// 选择器规则
///
/// `name` 是面向用户的字段标签（如 "main_images"），
/// `selector` 是拾取器推导出的泛化结构选择器。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectorRule {
    /// 字段名称，在同一集合内唯一
    pub name: String,
    /// CSS选择器，非空
    pub selector: String,
}

/// 选择器集合
///
/// 定义一个抽取模板：有序的规则列表加上抽取前的延迟秒数。
/// 批次启动后不再变化，编排器以 `Arc` 共享。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectorSet {
    rules: Vec<SelectorRule>,
    /// 每个任务抽取前的延迟（秒）
    pub delay_secs: u64,
}

impl SelectorSet {
    pub fn new(delay_secs: u64) -> Self {
        Self {
            rules: Vec::new(),
            delay_secs,
        }
    }

    /// 添加一条规则
    ///
    /// 名称重复或选择器为空时拒绝
    pub fn add_rule(&mut self, name: &str, selector: &str) -> Result<(), DomainError> {
        let name = name.trim();
        let selector = selector.trim();

        if name.is_empty() {
            return Err(DomainError::ValidationError(
                "rule name must not be empty".to_string(),
            ));
        }
        if selector.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "selector for rule '{}' must not be empty",
                name
            )));
        }
        if self.rules.iter().any(|rule| rule.name == name) {
            return Err(DomainError::ValidationError(format!(
                "duplicate rule name '{}'",
                name
            )));
        }

        self.rules.push(SelectorRule {
            name: name.to_string(),
            selector: selector.to_string(),
        });
        Ok(())
    }

    /// 规则列表（保持添加顺序）
    pub fn rules(&self) -> &[SelectorRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
