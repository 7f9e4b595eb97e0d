//! # rdnsbrute
//!
//! 一个基于Rust实现的DNS子域名暴破工具库。
//!
//! ## 特性
//!
//! - 🚀 **并发调度**: 固定工作者池加单消费者调度器，超时重试、解析器拉黑、暂停恢复
//! - 🔍 **前置侦察**: 权威名称服务器发现和区域传送尝试，权威服务器自动并入解析器池
//! - 📊 **多格式输出**: 支持终端、CSV、TXT、JSON输出，记录自动去重
//! - 🧰 **可注入查询**: DNS查询契约可替换，方便测试和二次封装
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use rdnsbrute::brute_force_subdomains;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let records = brute_force_subdomains("example.com", None, None).await?;
//!
//!     println!("发现 {} 条记录", records.len());
//!     for record in records.iter().take(5) {
//!         println!("  {} -> {}", record.name, record.data);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use rdnsbrute::{ScanConfig, ScanEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig {
//!         hostname: "example.com".to_string(),
//!         threads: 16,
//!         resolvers: vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()],
//!         ..Default::default()
//!     };
//!
//!     let report = ScanEngine::new(config).run().await?;
//!     println!("最终状态: {:?}", report.state);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

// 内部模块
pub mod api;
pub mod dispatcher;
pub mod input;
pub mod listener;
pub mod logger;
pub mod model;
pub mod output;
pub mod pool;
pub mod queue;
pub mod recon;
pub mod scanner;
pub mod subdata;

// 重新导出主要的公共API
pub use api::{brute_force_subdomains, ScanConfig, ScanEngine, ScanReport};
pub use dispatcher::{Dispatcher, DispatcherCommand, DispatcherHandle, ScanState, ScannerId};
pub use listener::{ListenerHandle, ScanListener};
pub use model::{Record, RecordKind, ScanTask};
pub use pool::{ResolverPool, TimeoutVerdict, MAX_RESOLVER_TIMEOUTS};
pub use queue::SubdomainQueue;
pub use scanner::{DnsLookup, LookupOutcome, SubdomainLookup};

// 输出相关
pub use input::OutputFormat;
pub use output::OutputSink;
pub use recon::{discover_authoritative, ReconReport};
