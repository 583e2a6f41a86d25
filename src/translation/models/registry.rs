//! 已下载模型登记
//!
//! 以 JSON 文件记录哪些语言模型已下载，启动时恢复模型状态。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationResult;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    downloaded: BTreeSet<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// 模型登记文件
pub struct ModelRegistry {
    path: PathBuf,
    // 串行化写入
    write_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取已下载集合，文件不存在时为空
    pub fn load(&self) -> TranslationResult<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let content = std::fs::read(&self.path)?;
        let file: RegistryFile = serde_json::from_slice(&content)?;
        Ok(file.downloaded)
    }

    /// 写入已下载集合（先写临时文件再重命名）
    pub fn save(&self, downloaded: &BTreeSet<String>) -> TranslationResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = RegistryFile {
            downloaded: downloaded.clone(),
            updated_at: Some(Utc::now()),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!("模型登记已更新: {:?}", downloaded);
        Ok(())
    }
}
