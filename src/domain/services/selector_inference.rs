// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;
use std::collections::HashMap;

/// 拾取器高亮类名前缀，推导选择器时必须剔除
pub const PICKER_CLASS_PREFIX: &str = "element-picker";

/// 参与推导的稳定属性
///
/// 动态class之外的低噪声锚点，存在时附加以提高特异性
pub const STABLE_ATTRIBUTES: [&str; 3] = ["name", "type", "data-id"];

/// 单选模式下最多向上回溯的祖先层数
const MAX_ANCESTOR_LEVELS: usize = 3;

/// 用户点击的元素描述
///
/// 由拾取器注入的JS在点击瞬间采集，`ancestors` 从最近的
/// 父元素开始排列
#[derive(Debug, Clone, Deserialize)]
pub struct PickedElement {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub ancestors: Vec<AncestorInfo>,
}

/// 祖先元素描述
#[derive(Debug, Clone, Deserialize)]
pub struct AncestorInfo {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// 拾取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    /// 单选：保持点击元素为规范匹配，必要时用祖先收窄
    Single,
    /// 批量：一次点击选中整页结构相似的元素
    Batch,
}

/// 选择器求值能力
///
/// 推导算法需要知道候选选择器在当前文档上的匹配数量。
/// 生产路径由解析后的页面文档实现，测试用HTML字符串即可。
pub trait SelectorEvaluator {
    fn count_matches(&self, selector: &str) -> usize;
}

impl SelectorEvaluator for crate::engines::dom::Document {
    fn count_matches(&self, selector: &str) -> usize {
        self.query_count(selector)
    }
}

/// 推导结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredSelector {
    /// 泛化后的选择器
    pub selector: String,
    /// 该选择器当前在页面上的匹配数量
    pub match_count: usize,
}

/// 从点击元素推导泛化选择器
///
/// 推导有意用精确性换取复用性：目标是在同一模板的页面上
/// 可重复抽取，而不是唯一定位。
///
/// 1. 元素带稳定id → `#id`，批量模式退化为单元素匹配集；
/// 2. 否则组合 标签+class（剔除拾取器自身的高亮class）；
/// 3. 存在稳定属性时附加属性选择器；
/// 4. 仅单选模式：组合选择器在页面上有歧义时向上回溯至多
///    3层祖先做前缀，遇到带id的祖先立即短路；
/// 5. 批量模式的匹配集始终来自不带祖先前缀的组合选择器。
pub fn infer(
    element: &PickedElement,
    mode: PickMode,
    page: &dyn SelectorEvaluator,
) -> InferredSelector {
    if let Some(id) = non_empty(element.id.as_deref()) {
        let selector = format!("#{}", id);
        let match_count = page.count_matches(&selector);
        return InferredSelector {
            selector,
            match_count,
        };
    }

    let base = compose_base(element);

    let selector = match mode {
        PickMode::Batch => base,
        PickMode::Single => {
            if page.count_matches(&base) <= 1 {
                base
            } else {
                anchor_with_ancestors(element, base, page)
            }
        }
    };

    let match_count = page.count_matches(&selector);
    InferredSelector {
        selector,
        match_count,
    }
}

/// 标签 + 过滤后的class列表 + 稳定属性
fn compose_base(element: &PickedElement) -> String {
    let mut selector = element.tag.to_ascii_lowercase();

    for class in &element.classes {
        if class.is_empty() || class.starts_with(PICKER_CLASS_PREFIX) {
            continue;
        }
        selector.push('.');
        selector.push_str(class);
    }

    for attr in STABLE_ATTRIBUTES {
        if let Some(value) = element.attributes.get(attr) {
            if !value.is_empty() {
                selector.push_str(&format!("[{}=\"{}\"]", attr, value));
            }
        }
    }

    selector
}

/// 用祖先前缀收窄有歧义的选择器
fn anchor_with_ancestors(
    element: &PickedElement,
    base: String,
    page: &dyn SelectorEvaluator,
) -> String {
    let mut selector = base;

    for ancestor in element.ancestors.iter().take(MAX_ANCESTOR_LEVELS) {
        if let Some(id) = non_empty(ancestor.id.as_deref()) {
            // 带id的祖先是最强锚点，到此为止
            return format!("#{} {}", id, selector);
        }

        let mut prefix = ancestor.tag.to_ascii_lowercase();
        for class in &ancestor.classes {
            if class.is_empty() || class.starts_with(PICKER_CLASS_PREFIX) {
                continue;
            }
            prefix.push('.');
            prefix.push_str(class);
        }

        selector = format!("{} {}", prefix, selector);

        if page.count_matches(&selector) <= 1 {
            break;
        }
    }

    selector
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
