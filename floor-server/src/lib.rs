//! Floor Server - 餐厅桌台/订单生命周期协调器
//!
//! # 架构概述
//!
//! 本 crate 实现自助餐厅 POS 的实时协调核心：
//!
//! - **生命周期引擎** (`lifecycle`): 纯函数式状态机决策
//! - **变更网关** (`gateway`): 按资源串行化的唯一提交路径
//! - **广播枢纽** (`hub`): 连接注册表与按频道的事件分发
//! - **状态库** (`store`): 嵌入式 redb 存储，唯一事实来源
//!
//! # 模块结构
//!
//! ```text
//! floor-server/src/
//! ├── core/       # 配置、组合根
//! ├── lifecycle/  # 状态机决策 (纯函数)
//! ├── gateway/    # 变更网关、资源锁
//! ├── hub/        # 连接与事件分发
//! ├── store/      # redb 状态库
//! └── utils/      # 日志
//! ```
//!
//! # 数据流
//!
//! ```text
//! Client ──► MutationGateway ──► lifecycle::decide ──► StateStore (commit)
//!                                                            │
//!                  all interested clients ◄── BroadcastHub ◄─┘
//! ```

pub mod core;
pub mod gateway;
pub mod hub;
pub mod lifecycle;
pub mod store;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, ServerState};
pub use gateway::{GatewayError, GatewayResult, MutationGateway};
pub use hub::{BroadcastHub, ConnectError, ConnectionId};
pub use store::{StateStore, StorageError};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
