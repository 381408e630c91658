// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含爬取、代理池、拾取器和存储等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 爬取配置
    pub crawler: CrawlerSettings,
    /// 代理池配置
    pub proxy: ProxySettings,
    /// 拾取器配置
    pub picker: PickerSettings,
    /// 存储配置
    pub storage: StorageSettings,
}

/// 爬取配置设置
#[derive(Debug, Deserialize)]
pub struct CrawlerSettings {
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试退避时间单位（秒）
    pub retry_delay_unit: u64,
    /// 退避时间上限（秒）
    pub backoff_cap: u64,
    /// 并发任务上限
    pub max_concurrency: usize,
    /// 每个任务抽取前的默认延迟（秒）
    pub per_task_delay: u64,
    /// 页面导航/请求超时（秒）
    pub request_timeout: u64,
    /// 停止宽限期（秒），超过即强制终止任务
    pub stop_grace: u64,
}

impl CrawlerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace)
    }
}

/// 代理池配置设置
#[derive(Debug, Deserialize)]
pub struct ProxySettings {
    /// 验证代理的已知可达目标
    pub probe_url: String,
    /// 单个候选的验证超时（秒）
    pub check_timeout: u64,
    /// 快代理列表页
    pub kuaidaili_url: String,
    /// 89免费代理列表页
    pub ip89_url: String,
}

impl ProxySettings {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout)
    }
}

/// 拾取器配置设置
#[derive(Debug, Deserialize)]
pub struct PickerSettings {
    /// 等待用户点击的超时（秒）
    pub pick_timeout: u64,
    /// 轮询点击结果的间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl PickerSettings {
    pub fn pick_timeout(&self) -> Duration {
        Duration::from_secs(self.pick_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 存储配置设置
#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    /// 结果记录文件路径
    pub records_path: String,
    /// 模板文件路径
    pub templates_path: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、可选配置文件和环境变量加载配置
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default crawler settings
            .set_default("crawler.max_retries", 3)?
            .set_default("crawler.retry_delay_unit", 2)?
            .set_default("crawler.backoff_cap", 30)?
            .set_default("crawler.max_concurrency", 3)?
            .set_default("crawler.per_task_delay", 1)?
            .set_default("crawler.request_timeout", 20)?
            .set_default("crawler.stop_grace", 10)?
            // Default proxy settings
            .set_default("proxy.probe_url", "https://weidian.com")?
            .set_default("proxy.check_timeout", 10)?
            .set_default("proxy.kuaidaili_url", "https://www.kuaidaili.com/free/inha/")?
            .set_default("proxy.ip89_url", "https://www.89ip.cn/index_1.html")?
            // Default picker settings
            .set_default("picker.pick_timeout", 300)?
            .set_default("picker.poll_interval_ms", 500)?
            // Default storage settings
            .set_default("storage.records_path", "./output/records.jsonl")?
            .set_default("storage.templates_path", "./templates/crawl_templates.json")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("SHOPCRAWL").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_surface() {
        let settings = Settings::new().unwrap();

        assert_eq!(settings.crawler.max_retries, 3);
        assert_eq!(settings.crawler.retry_delay_unit, 2);
        assert_eq!(settings.crawler.max_concurrency, 3);
        assert_eq!(settings.crawler.request_timeout(), Duration::from_secs(20));
        assert_eq!(settings.proxy.check_timeout(), Duration::from_secs(10));
        assert!(settings.proxy.probe_url.starts_with("https://"));
    }
}
