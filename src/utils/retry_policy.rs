// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::models::task::FailedTaskRecord;

/// 重试策略配置
///
/// 退避时间随尝试次数线性增长并封顶。目标站点的失败大多是
/// 短暂的导航超时或网络抖动，线性封顶比指数退避更合适。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避时间单位，每多一次尝试增加一个单位
    pub delay_unit: Duration,
    /// 退避时间上限
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_unit: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 是否应该重试
    ///
    /// `attempt` 是已经完成的尝试序号（首次尝试为 0）
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// 计算下次重试的退避时间
    ///
    /// `min(attempt * delay_unit, backoff_cap)`，对 `attempt` 单调不减
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let linear = self
            .delay_unit
            .checked_mul(attempt)
            .unwrap_or(self.backoff_cap);
        linear.min(self.backoff_cap)
    }
}

/// 重试台账
///
/// 按任务URL维护重试计数与失败任务列表。只由编排器的监督循环
/// 写入；`remove` 和 `clear` 是操作员动作，不会自动触发。
#[derive(Debug, Default)]
pub struct RetryLedger {
    retry_count: HashMap<String, u32>,
    failed_tasks: Vec<FailedTaskRecord>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次重试，返回该任务累计的重试次数
    pub fn add_retry(&mut self, url: &str) -> u32 {
        let count = self.retry_count.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// 查询任务当前的重试次数
    pub fn retries(&self, url: &str) -> u32 {
        self.retry_count.get(url).copied().unwrap_or(0)
    }

    /// 登记一个耗尽重试的失败任务
    pub fn add_failed_task(&mut self, url: &str, error: &str) {
        let attempts = self.retries(url);
        self.failed_tasks.push(FailedTaskRecord {
            url: url.to_string(),
            last_error: error.to_string(),
            failed_at: Utc::now(),
            attempts,
        });
    }

    /// 获取失败任务列表（保持失败先后顺序）
    pub fn failed_tasks(&self) -> &[FailedTaskRecord] {
        &self.failed_tasks
    }

    /// 移除单个失败任务记录
    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.failed_tasks.len();
        self.failed_tasks.retain(|record| record.url != url);
        self.retry_count.remove(url);
        before != self.failed_tasks.len()
    }

    /// 清空重试记录
    pub fn clear(&mut self) {
        self.retry_count.clear();
        self.failed_tasks.clear();
    }
}

/// 计算下次重试时间
pub fn next_retry_time(
    policy: &RetryPolicy,
    attempt: u32,
    base_time: DateTime<Utc>,
) -> DateTime<Utc> {
    let backoff = policy.backoff_delay(attempt);
    base_time + chrono::Duration::milliseconds(backoff.as_millis() as i64)
}
