// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::utils::url_utils;

/// DOM查询错误类型
#[derive(Error, Debug)]
pub enum DomError {
    /// 选择器无法解析
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),
}

/// 已解析的页面文档
///
/// 在 `scraper::Html` 之上提供核心逻辑需要的全部DOM能力：
/// 按选择器查询、读取文本、读取属性、收集图片地址。选择器
/// 推断和字段分类只依赖这个类型，测试时直接用HTML字符串
/// 构造，不需要真实浏览器。
///
/// `Html` 不是 `Send`，文档必须在同步作用域内解析和使用，
/// 不能跨越 await 点持有。
pub struct Document {
    html: Html,
    base: Option<Url>,
}

impl Document {
    /// 解析页面内容
    ///
    /// `page_url` 用于把相对图片地址解析为绝对地址
    pub fn parse(content: &str, page_url: &str) -> Self {
        Self {
            html: Html::parse_document(content),
            base: Url::parse(page_url).ok(),
        }
    }

    fn compile(selector: &str) -> Result<Selector, DomError> {
        Selector::parse(selector).map_err(|_| DomError::InvalidSelector(selector.to_string()))
    }

    /// 选择器在文档中的匹配数量
    ///
    /// 无法解析的选择器按零匹配处理
    pub fn query_count(&self, selector: &str) -> usize {
        match Self::compile(selector) {
            Ok(parsed) => self.html.select(&parsed).count(),
            Err(_) => 0,
        }
    }

    /// 读取每个匹配元素的整理后文本，保持文档顺序
    pub fn read_texts(&self, selector: &str) -> Result<Vec<String>, DomError> {
        let parsed = Self::compile(selector)?;
        Ok(self
            .html
            .select(&parsed)
            .map(|element| {
                element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect())
    }

    /// 读取每个匹配元素的指定属性值，缺失该属性的元素跳过
    pub fn read_attribute(&self, selector: &str, attr: &str) -> Result<Vec<String>, DomError> {
        let parsed = Self::compile(selector)?;
        Ok(self
            .html
            .select(&parsed)
            .filter_map(|element| element.value().attr(attr))
            .map(|value| value.to_string())
            .collect())
    }

    /// 收集匹配元素的图片地址，保持文档顺序
    ///
    /// 匹配元素本身是 `img` 时取它的 `src`；否则收集其内部
    /// 全部 `img` 后代的 `src`。相对地址解析为绝对地址。
    pub fn read_image_sources(&self, selector: &str) -> Result<Vec<String>, DomError> {
        let parsed = Self::compile(selector)?;
        let img = Selector::parse("img").expect("static selector");

        let mut sources = Vec::new();
        for element in self.html.select(&parsed) {
            if element.value().name() == "img" {
                self.push_source(&mut sources, element);
            } else {
                for nested in element.select(&img) {
                    self.push_source(&mut sources, nested);
                }
            }
        }
        Ok(sources)
    }

    fn push_source(&self, sources: &mut Vec<String>, element: ElementRef<'_>) {
        let Some(src) = element.value().attr("src") else {
            return;
        };
        if src.is_empty() {
            return;
        }
        let resolved = match &self.base {
            Some(base) => url_utils::resolve_url(base, src)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string()),
            None => src.to_string(),
        };
        sources.push(resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <h1 class="d-title">测试商品</h1>
            <div class="gallery">
                <img src="/img/1.jpg">
                <img src="https://cdn.example.com/2.jpg">
                <span><img src="3.jpg"></span>
            </div>
            <ul class="spec-list">
                <li>红色</li>
                <li>蓝色</li>
            </ul>
        </body></html>
    "#;

    fn doc() -> Document {
        Document::parse(PAGE, "https://shop.example.com/item/9")
    }

    #[test]
    fn test_query_count() {
        let doc = doc();
        assert_eq!(doc.query_count("ul.spec-list li"), 2);
        assert_eq!(doc.query_count("div.missing"), 0);
        // 非法选择器按零匹配处理
        assert_eq!(doc.query_count("??"), 0);
    }

    #[test]
    fn test_read_texts_normalizes_whitespace() {
        let doc = doc();
        assert_eq!(doc.read_texts("h1.d-title").unwrap(), vec!["测试商品"]);
        assert_eq!(
            doc.read_texts("ul.spec-list li").unwrap(),
            vec!["红色", "蓝色"]
        );
    }

    #[test]
    fn test_read_image_sources_resolves_and_preserves_order() {
        let doc = doc();
        let sources = doc.read_image_sources("div.gallery").unwrap();
        assert_eq!(
            sources,
            vec![
                "https://shop.example.com/img/1.jpg",
                "https://cdn.example.com/2.jpg",
                "https://shop.example.com/item/3.jpg",
            ]
        );
    }

    #[test]
    fn test_direct_img_match_takes_own_src() {
        let doc = doc();
        let sources = doc.read_image_sources("div.gallery img").unwrap();
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn test_invalid_selector_is_error() {
        let doc = doc();
        assert!(doc.read_texts("!!bad!!").is_err());
    }
}
