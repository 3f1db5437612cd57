//! 配置加载器实现
//!
//! 读取 TOML 配置文件，支持 `${VAR}` 形式的环境变量替换

use crate::config::types::{validate_settings, WorkerSettings};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置加载接口
#[async_trait]
pub trait SettingsLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    async fn load_from_file(&self, path: &Path) -> Result<WorkerSettings>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<WorkerSettings>;

    /// 验证配置
    fn validate(&self, settings: &WorkerSettings) -> Result<()>;
}

/// TOML 配置加载器
#[derive(Debug, Clone)]
pub struct TomlSettingsLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlSettingsLoader {
    /// 创建加载器
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR}`，变量不存在时报错
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut missing = None;
        let result = env_var_regex.replace_all(content, |captures: &regex::Captures<'_>| {
            let var_name = &captures[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        if let Some(var) = missing {
            return Err(ConfigError::EnvVarError { var }.into());
        }
        Ok(result.into_owned())
    }

    fn parse_toml(&self, content: &str) -> Result<WorkerSettings> {
        let processed_content = self.substitute_env_vars(content)?;

        let settings: WorkerSettings = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(settings)
    }
}

impl Default for TomlSettingsLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl SettingsLoader for TomlSettingsLoader {
    async fn load_from_file(&self, path: &Path) -> Result<WorkerSettings> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let settings = self.parse_toml(&content)?;
        self.validate(&settings)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", settings);

        Ok(settings)
    }

    async fn load_from_string(&self, content: &str) -> Result<WorkerSettings> {
        let settings = self.parse_toml(content)?;
        self.validate(&settings)?;
        Ok(settings)
    }

    fn validate(&self, settings: &WorkerSettings) -> Result<()> {
        validate_settings(settings).map_err(Into::into)
    }
}

/// 获取默认配置文件路径
///
/// 当前目录存在 `service-worker.toml` 时使用它，否则使用用户配置目录下的
/// `service-worker/config.toml`。
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("service-worker.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|config_dir| config_dir.join("service-worker").join("config.toml"))
        .unwrap_or(local)
}
