use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;
use std::time::Duration;

use crate::exception::Exception;
use crate::param::{MAX_CACHE_SIZE, MAX_OBJECT_SIZE, USER_AGENT};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_max_line_length")]
    max_line_length: usize,
    #[serde(default = "default_max_object_size")]
    max_object_size: usize,
    #[serde(default = "default_max_cache_size")]
    max_cache_size: usize,
    #[serde(default)]
    exact_tag_match: bool,
    #[serde(default)]
    origin_timeout_secs: u64,
    #[serde(default)]
    error_responses: bool,
    #[serde(default = "default_user_agent")]
    user_agent: String,
}

fn default_chunk_size() -> usize {
    4096 // 4KB
}

fn default_max_line_length() -> usize {
    8192 // 8KB
}

fn default_max_object_size() -> usize {
    MAX_OBJECT_SIZE
}

fn default_max_cache_size() -> usize {
    MAX_CACHE_SIZE
}

fn default_user_agent() -> String {
    USER_AGENT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            local: false,
            worker_threads: 0,
            chunk_size: default_chunk_size(),
            max_line_length: default_max_line_length(),
            max_object_size: default_max_object_size(),
            max_cache_size: default_max_cache_size(),
            exact_tag_match: false,
            origin_timeout_secs: 0,
            error_responses: false,
            user_agent: default_user_agent(),
        }
    }

    // 读取配置文件，失败时回退到默认配置
    pub fn from_toml(filename: &str) -> Self {
        match Self::try_from_toml(filename) {
            Ok(config) => config,
            Err(e) => {
                warn!("无法载入配置文件{}：{}，使用默认配置", filename, e);
                Self::new().normalized()
            }
        }
    }

    pub fn try_from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename).map_err(|_| Exception::ConfigUnreadable)?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|_| Exception::ConfigUnreadable)?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let raw_config: Config = match toml::from_str(content) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象：{}", e);
                return Err(Exception::ConfigInvalid);
            }
        };
        Ok(raw_config.normalized())
    }

    // 把 0 之类的占位值替换为实际值
    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.chunk_size == 0 {
            warn!("chunk_size被设置为0，该值将被改为{}。", default_chunk_size());
            self.chunk_size = default_chunk_size();
        }
        if self.max_line_length == 0 {
            warn!(
                "max_line_length被设置为0，该值将被改为{}。",
                default_max_line_length()
            );
            self.max_line_length = default_max_line_length();
        }
        if self.max_object_size > MAX_OBJECT_SIZE {
            warn!(
                "max_object_size超过了上限{}，该值将被截断。",
                MAX_OBJECT_SIZE
            );
            self.max_object_size = MAX_OBJECT_SIZE;
        }
        self
    }
}

impl Config {
    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    pub fn exact_tag_match(&self) -> bool {
        self.exact_tag_match
    }

    /// 源站超时。`None` 表示永不超时。
    pub fn origin_timeout(&self) -> Option<Duration> {
        match self.origin_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn error_responses(&self) -> bool {
        self.error_responses
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
