// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::selector::SelectorSet;

/// 抽取任务实体
///
/// 表示一个URL从导航到字段解析的端到端尝试。任务由编排器
/// 在批次展开时创建，到达终态后归档或丢弃。重试以新的任务
/// 实例重新投放，`attempt` 递增。
#[derive(Debug, Clone)]
pub struct ExtractionTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 目标商品URL
    pub url: String,
    /// 平台变体，决定走浏览器路径还是HTTP路径
    pub platform: Platform,
    /// 本批次共享的选择器集合
    pub selector_set: Arc<SelectorSet>,
    /// 尝试序号，首次为0，每次重试加1
    pub attempt: u32,
    /// 任务状态
    pub status: TaskStatus,
}

impl ExtractionTask {
    /// 创建一个新的抽取任务
    pub fn new(url: String, platform: Platform, selector_set: Arc<SelectorSet>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            platform,
            selector_set,
            attempt: 0,
            status: TaskStatus::Pending,
        }
    }

    /// 以递增的尝试序号派生一次重试任务
    pub fn relaunched(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: self.url.clone(),
            platform: self.platform,
            selector_set: self.selector_set.clone(),
            attempt: self.attempt + 1,
            status: TaskStatus::Pending,
        }
    }
}

/// 平台变体枚举
///
/// 微店走浏览器自动化（DOM）路径；拼多多走HTTP+HTML解析
/// （API）路径并启用代理轮换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// 微店，浏览器路径
    #[default]
    Weidian,
    /// 拼多多，HTTP路径
    Pinduoduo,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Platform::Weidian => write!(f, "weidian"),
            Platform::Pinduoduo => write!(f, "pinduoduo"),
        }
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weidian" => Ok(Platform::Weidian),
            "pinduoduo" => Ok(Platform::Pinduoduo),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Running → Succeeded/Failed/Stopped，
/// Running → Retrying → Running（新任务实例）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待执行，已创建但尚未获得并发槽位
    #[default]
    Pending,
    /// 执行中
    Running,
    /// 已成功，结果信封已移交持久化协作方
    Succeeded,
    /// 等待重试，退避计时中
    Retrying,
    /// 已失败，重试耗尽
    Failed,
    /// 已停止，协作式取消生效
    Stopped,
}

impl TaskStatus {
    /// 是否为终态（不再发生状态转换）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Retrying => write!(f, "retrying"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "retrying" => Ok(TaskStatus::Retrying),
            "failed" => Ok(TaskStatus::Failed),
            "stopped" => Ok(TaskStatus::Stopped),
            _ => Err(()),
        }
    }
}

/// 失败任务记录
///
/// 任务耗尽重试后追加到失败台账，可由操作员单条或批量移除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTaskRecord {
    /// 失败任务的URL
    pub url: String,
    /// 最后一次失败的错误信息
    pub last_error: String,
    /// 失败时间
    pub failed_at: DateTime<Utc>,
    /// 累计重试次数
    pub attempts: u32,
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 验证错误，输入数据不符合领域规则
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::selector::SelectorSet;

    fn sample_set() -> Arc<SelectorSet> {
        let mut set = SelectorSet::new(0);
        set.add_rule("title", "div.product-title").unwrap();
        Arc::new(set)
    }

    #[test]
    fn test_new_task_starts_pending_at_attempt_zero() {
        let task = ExtractionTask::new(
            "https://weidian.com/item.html?itemID=1".into(),
            Platform::Weidian,
            sample_set(),
        );
        assert_eq!(task.attempt, 0);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_relaunch_increments_attempt_with_fresh_id() {
        let task = ExtractionTask::new(
            "https://weidian.com/item.html?itemID=1".into(),
            Platform::Weidian,
            sample_set(),
        );
        let retry = task.relaunched();
        assert_eq!(retry.attempt, 1);
        assert_ne!(retry.id, task.id);
        assert_eq!(retry.url, task.url);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Succeeded,
            TaskStatus::Retrying,
            TaskStatus::Failed,
            TaskStatus::Stopped,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
    }
}
