use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::warn;
use std::fs::File;
use std::io::prelude::*;
use std::time::Duration;

use crate::{
    exception::Exception,
    param::{DEFAULT_STATIC_PREFIX, DEFAULT_TUNNEL_PREFIX},
    util::normalize_prefix,
};

/// 已知的路由插件名
pub const KNOWN_ADDONS: [&str; 2] = ["body", "cookie"];

/// 静态资源处理配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StaticHandling {
    /// 是否启用内存缓存
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// 浏览器缓存时间，单位毫秒
    #[serde(default)]
    pub max_age: u64,
    /// 开发模式：跳过新鲜度校验，Last-Modified 总是当前时间
    #[serde(default)]
    pub force_update: bool,
    #[serde(default = "default_static_prefix")]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_specs_root")]
    specs_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    #[serde(default = "default_tunnel_prefix")]
    tunnel_prefix: String,
    #[serde(default = "default_route_addons")]
    route_addons: Vec<String>,
    #[serde(default)]
    static_handling: StaticHandling,
}

fn default_cache() -> bool {
    true
}

fn default_static_prefix() -> String {
    DEFAULT_STATIC_PREFIX.to_string()
}

fn default_www_root() -> String {
    "static".to_string()
}

fn default_specs_root() -> String {
    "mojits".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1048576 // 1MB
}

fn default_tunnel_prefix() -> String {
    DEFAULT_TUNNEL_PREFIX.to_string()
}

fn default_route_addons() -> Vec<String> {
    KNOWN_ADDONS.iter().map(|a| a.to_string()).collect()
}

impl Default for StaticHandling {
    fn default() -> Self {
        Self {
            cache: default_cache(),
            max_age: 0,
            force_update: false,
            prefix: default_static_prefix(),
        }
    }
}

impl StaticHandling {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age)
    }

    /// `Cache-Control` 使用的秒数，毫秒不能整除时保留小数
    pub fn max_age_seconds(&self) -> String {
        if self.max_age % 1000 == 0 {
            format!("{}", self.max_age / 1000)
        } else {
            format!("{}", self.max_age as f64 / 1000.0)
        }
    }
}

impl Config {
    pub fn new() -> Self {
        let mut config = Self {
            www_root: default_www_root(),
            specs_root: default_specs_root(),
            port: default_port(),
            worker_threads: 0,
            local: default_local(),
            max_body_size: default_max_body_size(),
            tunnel_prefix: default_tunnel_prefix(),
            route_addons: default_route_addons(),
            static_handling: StaticHandling::default(),
        };
        config.worker_threads = num_cpus::get();
        config
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::InvalidConfig(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::InvalidConfig(format!("error reading {}: {}", filename, e)))?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let raw_config: Config =
            toml::from_str(content).map_err(|e| Exception::InvalidConfig(e.to_string()))?;
        raw_config.validate()
    }

    /// 构造期校验：规范化前缀、检查数值与插件名。
    pub fn validate(mut self) -> Result<Self, Exception> {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.max_body_size == 0 {
            return Err(Exception::InvalidConfig(
                "max_body_size must be greater than 0".to_string(),
            ));
        }
        for addon in &self.route_addons {
            if !KNOWN_ADDONS.contains(&addon.as_str()) {
                return Err(Exception::InvalidConfig(format!(
                    "unknown route addon: {}",
                    addon
                )));
            }
        }
        self.tunnel_prefix = normalize_prefix(&self.tunnel_prefix);
        self.static_handling.prefix = normalize_prefix(&self.static_handling.prefix);
        if self.tunnel_prefix.is_empty() {
            warn!("tunnel_prefix为空，RPC通道将不会注册");
        }
        if self.static_handling.prefix.is_empty() {
            warn!("static_handling.prefix为空，spec/type查询路由将不会注册");
        }
        Ok(self)
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn specs_root(&self) -> &str {
        &self.specs_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn tunnel_prefix(&self) -> &str {
        &self.tunnel_prefix
    }

    pub fn route_addons(&self) -> &[String] {
        &self.route_addons
    }

    pub fn static_handling(&self) -> &StaticHandling {
        &self.static_handling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.port(), 7878);
        assert_eq!(config.tunnel_prefix(), "/tunnel");
        assert_eq!(config.static_handling().prefix, "/static");
        assert!(config.static_handling().cache);
        assert!(!config.static_handling().force_update);
        assert!(config.worker_threads() > 0);
        assert_eq!(config.route_addons(), &["body".to_string(), "cookie".to_string()]);
    }

    #[test]
    fn test_prefixes_are_normalized() {
        let config = Config::from_toml_str(
            r#"
            tunnel_prefix = "//rpc//tunnel/"
            [static_handling]
            prefix = "assets/"
            "#,
        )
        .unwrap();
        assert_eq!(config.tunnel_prefix(), "/rpc/tunnel");
        assert_eq!(config.static_handling().prefix, "/assets");
    }

    #[test]
    fn test_empty_prefix_disables() {
        let config = Config::from_toml_str(r#"tunnel_prefix = "/""#).unwrap();
        assert_eq!(config.tunnel_prefix(), "");
    }

    #[test]
    fn test_unknown_addon_rejected() {
        let result = Config::from_toml_str(r#"route_addons = ["body", "session"]"#);
        match result {
            Err(Exception::InvalidConfig(m)) => assert!(m.contains("session")),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_body_size_rejected() {
        assert!(Config::from_toml_str("max_body_size = 0").is_err());
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(Config::from_toml_str("port = \"not a number\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_toml("does/not/exist.toml").is_err());
    }

    #[test]
    fn test_max_age_seconds() {
        let mut handling = StaticHandling::default();
        handling.max_age = 3_600_000;
        assert_eq!(handling.max_age_seconds(), "3600");
        assert_eq!(handling.max_age(), Duration::from_secs(3600));
        handling.max_age = 1500;
        assert_eq!(handling.max_age_seconds(), "1.5");
        handling.max_age = 0;
        assert_eq!(handling.max_age_seconds(), "0");
    }
}
