/// 服务器配置 - 协调器的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | FLOOR_DATA_DIR | /var/lib/floor/edge | redb 数据库目录 |
/// | LOCK_WAIT_MS | 2000 | 资源锁等待上限(毫秒) |
/// | CONNECTION_BUFFER | 64 | 每连接事件缓冲区 |
/// | PROBE_INTERVAL_MS | 10000 | 存活探测周期(毫秒) |
/// | PROBE_TIMEOUT_MS | 30000 | 静默断开阈值(毫秒) |
/// | ENVIRONMENT | development | 运行环境 |
#[derive(Debug, Clone)]
pub struct Config {
    /// 数据目录，存放 redb 数据库文件
    pub data_dir: String,
    /// 资源级临界区获取等待上限 (毫秒)，超时返回 Busy
    pub lock_wait_ms: u64,
    /// 每连接事件缓冲区容量，写满即断开慢消费者
    pub connection_buffer: usize,
    /// 存活探测扫描周期 (毫秒)
    pub probe_interval_ms: u64,
    /// 连接静默多久视为失活 (毫秒)
    pub probe_timeout_ms: u64,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("FLOOR_DATA_DIR")
                .unwrap_or_else(|_| "/var/lib/floor/edge".into()),
            lock_wait_ms: std::env::var("LOCK_WAIT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2000),
            connection_buffer: std::env::var("CONNECTION_BUFFER")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(64),
            probe_interval_ms: std::env::var("PROBE_INTERVAL_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10_000),
            probe_timeout_ms: std::env::var("PROBE_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30_000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(data_dir: impl Into<String>, lock_wait_ms: u64) -> Self {
        let mut config = Self::from_env();
        config.data_dir = data_dir.into();
        config.lock_wait_ms = lock_wait_ms;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
