use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{RestAssayError, Result};
use crate::runner::ExecutorSettings;
use crate::variable::{VariableContext, VariableResolver};

/// `[suite]` 段
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct SuiteSettings {
    pub base_url: Option<String>,
    pub poll_duration_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub track_performance: bool,
    /// 上传文件的相对路径基准目录
    pub upload_root: Option<PathBuf>,
    /// 下载文件的保存目录
    pub download_dir: Option<PathBuf>,
    /// suite 默认 header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub auth: Option<AuthSettings>,
}

/// `[suite.auth]`：suite 启动时加入、结束时移除的 header
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthSettings {
    #[serde(default = "default_auth_header")]
    pub header: String,
    pub value: String,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

/// 环境配置
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Environment {
    /// 变量映射
    #[serde(flatten)]
    pub variables: HashMap<String, String>,
}

/// 完整的配置文件
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RestAssayConfig {
    #[serde(default)]
    pub suite: SuiteSettings,
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
}

impl RestAssayConfig {
    pub fn get_environment(&self, env_name: &str) -> Option<&Environment> {
        self.environments.get(env_name)
    }

    /// 配置中的 poll 默认值，未设置的使用执行器默认值
    pub fn executor_settings(&self) -> ExecutorSettings {
        let defaults = ExecutorSettings::default();
        ExecutorSettings {
            poll_duration: self
                .suite
                .poll_duration_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_duration),
            poll_interval: self
                .suite
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }

    /// 展开 header 值中的 `${VAR}`
    pub fn resolved_headers(&self) -> Vec<(String, String)> {
        self.suite
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), VariableResolver::resolve_env_vars(v)))
            .collect()
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "restassay.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RestAssayConfig> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RestAssayError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| RestAssayError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及父目录
    /// 2. 用户配置目录 ~/.config/restassay/
    pub fn find_and_load() -> Result<Option<RestAssayConfig>> {
        match Self::find() {
            Some(path) => {
                debug!(path = %path.display(), "加载配置文件");
                Self::load_from_path(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn find() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_upwards(&dir))
            .or_else(Self::user_config_path)
    }

    fn find_upwards(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(Self::CONFIG_FILE))
            .find(|path| path.is_file())
    }

    fn user_config_path() -> Option<PathBuf> {
        let path = dirs::home_dir()?
            .join(".config")
            .join("restassay")
            .join(Self::CONFIG_FILE);
        path.is_file().then_some(path)
    }

    /// 构建 suite 共享变量的初始值
    /// env_name: 环境名称（如 "dev", "prod"）
    /// cli_vars: CLI 传入的变量覆盖（--var key=value）
    pub fn build_seed(
        config: &RestAssayConfig,
        env_name: Option<&str>,
        cli_vars: &[(String, String)],
    ) -> Result<VariableContext> {
        let mut context = VariableContext::new();

        if let Some(name) = env_name {
            let env = config.get_environment(name).ok_or_else(|| {
                RestAssayError::ConfigError(format!("Unknown environment '{}'", name))
            })?;
            for (key, value) in &env.variables {
                context.insert(key.clone(), VariableResolver::resolve_env_vars(value));
            }
        }

        // CLI 覆盖（优先级最高）
        for (key, value) in cli_vars {
            context.insert(key.clone(), value.clone());
        }

        Ok(context)
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
    }
}
