use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shared::connect::ConnectRequest;
use shared::event::DomainEvent;
use tokio::sync::mpsc;

use crate::core::Config;
use crate::gateway::{GatewayError, GatewayResult, MutationGateway};
use crate::hub::{BroadcastHub, ConnectError, ConnectionId};
use crate::store::StateStore;

/// 服务器状态 - 持有协调器全部组件的单例引用
///
/// ServerState 是协调器的组合根：在进程启动时创建一次，所有组件
/// 通过 Arc 共享，测试中可以整体重建（显式注册表，不用全局变量）。
///
/// # 组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | store | StateStore | 嵌入式 redb 状态库 |
/// | hub | Arc<BroadcastHub> | 连接注册表与事件分发 |
/// | gateway | Arc<MutationGateway> | 串行化的变更入口 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: StateStore,
    pub hub: Arc<BroadcastHub>,
    pub gateway: Arc<MutationGateway>,
}

impl ServerState {
    /// Open the store under `config.data_dir` and wire the components
    pub fn new(config: Config) -> GatewayResult<Self> {
        let path = Path::new(&config.data_dir).join("floor.redb");
        let store = StateStore::open(path).map_err(GatewayError::StoreConflict)?;
        Ok(Self::assemble(config, store))
    }

    /// Fully in-memory instance (tests, demos)
    pub fn new_in_memory(config: Config) -> GatewayResult<Self> {
        let store = StateStore::open_in_memory().map_err(GatewayError::StoreConflict)?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: Config, store: StateStore) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.connection_buffer));
        let gateway = Arc::new(MutationGateway::new(
            store.clone(),
            Arc::clone(&hub),
            Duration::from_millis(config.lock_wait_ms),
        ));
        tracing::info!(environment = %config.environment, "Floor coordinator assembled");
        Self {
            config,
            store,
            hub,
            gateway,
        }
    }

    /// Register a client connection.
    ///
    /// Resolves the declared order token against the store (which is
    /// how a customer session re-derives its order channel after a
    /// server restart), then hands the declaration to the hub.
    pub fn connect(
        &self,
        decl: &ConnectRequest,
    ) -> Result<(ConnectionId, mpsc::Receiver<Arc<DomainEvent>>), ConnectError> {
        let token_order = match &decl.order_token {
            Some(token) => self.store.find_order_by_token(token).map_err(|e| {
                tracing::error!(error = %e, "Token lookup failed during connect");
                ConnectError::UnknownToken
            })?,
            None => None,
        };
        self.hub.connect(decl, token_order.as_ref())
    }

    /// Start background tasks (liveness sweeper)
    pub fn start_background_tasks(&self) -> tokio::task::JoinHandle<()> {
        self.hub.spawn_probe_sweeper(
            Duration::from_millis(self.config.probe_interval_ms),
            Duration::from_millis(self.config.probe_timeout_ms),
        )
    }

    /// 优雅关闭：停止后台任务
    pub fn shutdown(&self) {
        tracing::info!("Shutting down floor coordinator");
        self.hub.shutdown();
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}
