use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AuthMatrixError, Result};

/// 环境变量覆盖请求超时（秒）
pub const TIMEOUT_ENV: &str = "AUTHMATRIX_TIMEOUT_SECS";

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 单个请求的超时
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 消费者一侧的配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub poll_interval_ms: u64,
    /// 取消后等待引擎自行退出的时间，超时则强制终止
    pub grace_period_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            grace_period_ms: 1000,
        }
    }
}

impl RunnerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// authmatrix.toml 的内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// 应用环境变量覆盖。无法解析的值会被忽略
    pub fn apply_env(mut self) -> Self {
        if let Ok(value) = std::env::var(TIMEOUT_ENV) {
            self.apply_timeout_override(&value);
        }
        self
    }

    fn apply_timeout_override(&mut self, value: &str) {
        match value.trim().parse::<u64>() {
            Ok(secs) => self.engine.timeout_secs = secs,
            Err(_) => warn!(var = TIMEOUT_ENV, value, "ignoring invalid timeout override"),
        }
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "authmatrix.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AuthMatrixError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            AuthMatrixError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// 加载配置并应用环境变量覆盖
    ///
    /// 显式指定的路径必须存在；否则按以下顺序查找，都没有则使用默认值：
    /// 1. 当前目录及其父目录
    /// 2. 用户配置目录 ~/.config/authmatrix/
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => Self::find_and_load().unwrap_or_default(),
        };
        Ok(config.apply_env())
    }

    /// 查找并加载配置文件
    pub fn find_and_load() -> Option<Config> {
        if let Some(config) = Self::try_load_from_current_dir() {
            return Some(config);
        }

        Self::try_load_from_user_dir()
    }

    fn try_load_from_current_dir() -> Option<Config> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Self::load_logged(&config_path);
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    fn try_load_from_user_dir() -> Option<Config> {
        let home = dirs::home_dir()?;
        let config_path = home
            .join(".config")
            .join("authmatrix")
            .join(Self::CONFIG_FILE);

        if config_path.exists() {
            Self::load_logged(&config_path)
        } else {
            None
        }
    }

    fn load_logged(path: &Path) -> Option<Config> {
        match Self::load_from_path(path) {
            Ok(config) => {
                debug!(path = %path.display(), "loaded config");
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable config");
                None
            }
        }
    }
}
