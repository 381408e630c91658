// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::models::selector::SelectorSet;
use crate::domain::repositories::template_repository::{Template, TemplateRepository};
use crate::utils::errors::RepositoryError;

/// JSON文件模板库
///
/// 全部模板保存在一个按名称索引的JSON文件里
pub struct JsonTemplateStore {
    path: PathBuf,
    // 文件读改写不是原子的，串行化所有写入
    lock: Mutex<()>,
}

impl JsonTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load_all(&self) -> Result<HashMap<String, Template>, RepositoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_all(&self, templates: &HashMap<String, Template>) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(templates)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for JsonTemplateStore {
    async fn load(&self, name: &str) -> Result<SelectorSet, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut templates = self.load_all().await?;

        let Some(template) = templates.get_mut(name) else {
            return Err(RepositoryError::NotFound);
        };
        let selectors = template.selectors.clone();
        template.last_used = Utc::now();

        self.store_all(&templates).await?;
        Ok(selectors)
    }

    async fn save(
        &self,
        name: &str,
        selectors: SelectorSet,
        description: &str,
    ) -> Result<(), RepositoryError> {
        if name.trim().is_empty() {
            return Err(RepositoryError::InvalidParameter(
                "template name must not be empty".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut templates = self.load_all().await?;
        let now = Utc::now();
        templates.insert(
            name.to_string(),
            Template {
                selectors,
                description: description.to_string(),
                created_at: now,
                last_used: now,
            },
        );
        self.store_all(&templates).await
    }

    async fn list(&self) -> Result<Vec<String>, RepositoryError> {
        let templates = self.load_all().await?;
        let mut names: Vec<String> = templates.into_keys().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut templates = self.load_all().await?;
        if templates.remove(name).is_none() {
            return Err(RepositoryError::NotFound);
        }
        self.store_all(&templates).await
    }
}
