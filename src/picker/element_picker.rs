// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::domain::services::selector_inference::{infer, PickMode, PickedElement};
use crate::engines::browser_engine::get_browser;
use crate::engines::dom::Document;
use crate::utils::errors::PickError;

/// 注入到目标页面的拾取脚本
///
/// 只负责高亮与采集被点击元素的原始描述（标签、id、class、
/// 稳定属性、至多3层祖先），选择器推导全部在Rust侧完成。
const PICKER_JS: &str = r#"
(function () {
    if (window.__pickerInstalled) { return; }
    window.__pickerInstalled = true;

    var style = document.createElement('style');
    style.textContent =
        '.element-picker-hover { outline: 2px dashed red !important; }' +
        '.element-picker-selected { outline: 2px solid green !important; }';
    document.head.appendChild(style);

    var hoveredElement = null;

    function describe(element) {
        var attrs = {};
        ['name', 'type', 'data-id'].forEach(function (name) {
            var value = element.getAttribute(name);
            if (value) { attrs[name] = value; }
        });

        var ancestors = [];
        var parent = element.parentElement;
        while (parent && parent.tagName !== 'BODY' && ancestors.length < 3) {
            ancestors.push({
                tag: parent.tagName.toLowerCase(),
                id: parent.id || null,
                classes: Array.from(parent.classList)
            });
            parent = parent.parentElement;
        }

        return {
            tag: element.tagName.toLowerCase(),
            id: element.id || null,
            classes: Array.from(element.classList),
            attributes: attrs,
            ancestors: ancestors
        };
    }

    document.addEventListener('mousemove', function (e) {
        if (hoveredElement) { hoveredElement.classList.remove('element-picker-hover'); }
        hoveredElement = e.target;
        hoveredElement.classList.add('element-picker-hover');
    }, true);

    document.addEventListener('click', function (e) {
        e.preventDefault();
        e.stopPropagation();
        e.target.classList.add('element-picker-selected');
        window.__pickedElement = describe(e.target);
    }, true);
})();
"#;

/// 拾取结果
///
/// 只有选择器字符串会持久化进规则，预览仅用于用户确认
#[derive(Debug, Clone)]
pub struct PickResult {
    /// 推导出的泛化选择器
    pub selector: String,
    /// 当前页面上的匹配数量
    pub match_count: usize,
    /// 匹配元素的文本或图片地址预览，保持文档顺序
    pub preview: Vec<String>,
}

/// 元素拾取器
///
/// 在真实页面上等待用户点击一个元素，推导泛化选择器并给出
/// 匹配预览。页面中途不可用（导航离开、崩溃）按"未选择任何
/// 元素"处理，调用方可以从头重新发起。
pub struct ElementPicker {
    pick_timeout: Duration,
    poll_interval: Duration,
}

impl ElementPicker {
    pub fn new(pick_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            pick_timeout,
            poll_interval,
        }
    }

    /// 在指定页面上执行一次拾取
    pub async fn pick(&self, url: &str, mode: PickMode) -> Result<PickResult, PickError> {
        let browser = get_browser()
            .await
            .map_err(|e| PickError::Browser(e.to_string()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PickError::Browser(e.to_string()))?;

        let result = async {
            page.goto(url)
                .await
                .map_err(|e| PickError::PageUnavailable(e.to_string()))?;

            page.evaluate(PICKER_JS)
                .await
                .map_err(|e| PickError::Browser(e.to_string()))?;
            info!("Picker installed on {}, waiting for click", url);

            let picked = self.wait_for_click(&page).await?;
            debug!("Element picked: <{}>", picked.tag);

            // 点击之后页面可能继续变化，立刻取快照做推导和预览
            let content = page
                .content()
                .await
                .map_err(|_| PickError::NoElementSelected)?;

            Ok(build_result(&picked, mode, &content, url))
        }
        .await;

        let _ = page.close().await;
        result
    }

    /// 轮询注入脚本写入的点击描述
    async fn wait_for_click(
        &self,
        page: &chromiumoxide::Page,
    ) -> Result<PickedElement, PickError> {
        let deadline = Instant::now() + self.pick_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(PickError::NoElementSelected);
            }

            let probe = page
                .evaluate("window.__pickedElement ? JSON.stringify(window.__pickedElement) : null")
                .await
                // 页面在拾取过程中丢失，按未选择处理，允许重新发起
                .map_err(|_| PickError::NoElementSelected)?;

            if let Ok(Some(json)) = probe.into_value::<Option<String>>() {
                return serde_json::from_str(&json)
                    .map_err(|e| PickError::Browser(format!("Bad pick payload: {}", e)));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// 从点击描述和页面快照构建拾取结果
///
/// 匹配元素是图片或包含图片时预览图片地址，否则预览文本
fn build_result(
    picked: &PickedElement,
    mode: PickMode,
    content: &str,
    page_url: &str,
) -> PickResult {
    let document = Document::parse(content, page_url);
    let inferred = infer(picked, mode, &document);

    let images = document
        .read_image_sources(&inferred.selector)
        .unwrap_or_default();
    let preview = if images.is_empty() {
        document
            .read_texts(&inferred.selector)
            .unwrap_or_default()
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect()
    } else {
        images
    };

    PickResult {
        selector: inferred.selector,
        match_count: inferred.match_count,
        preview,
    }
}
