//! 扫描工作者
//!
//! 每个工作者一次只对一个(子域名, 解析器)配对发起DNS查询，
//! 查询结果通过命令通道汇入调度器。工作者之间不共享任何状态，
//! 超时时长由工作者自己自适应调整。

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

use crate::dispatcher::{DispatcherCommand, ScannerId};
use crate::model::Record;

/// 首次查询的超时时长
pub const INITIAL_TIMEOUT: Duration = Duration::from_secs(5);
/// 每次超时后增加的步长
pub const TIMEOUT_STEP: Duration = Duration::from_secs(1);
/// 超时时长上限
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);

/// 一次DNS查询的结果
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// 查询成功，NXDOMAIN等同于空记录
    Records(Vec<Record>),
    /// 查询超时或出现可重试的协议错误
    Timeout,
    /// 工作者无法继续的错误
    Fatal(String),
}

/// DNS查询契约，扫描工作者通过它发起查询
///
/// 生产实现是[`DnsLookup`]，测试可以注入脚本化实现。
#[async_trait]
pub trait SubdomainLookup: Send + Sync {
    /// 通过指定解析器查询fqdn，在给定超时内返回结果
    async fn lookup(&self, fqdn: &str, resolver: &str, timeout: Duration) -> LookupOutcome;
}

/// 基于trust-dns-resolver的生产查询实现
///
/// 每次查询针对单一解析器端点新建解析器实例，UDP单次尝试。
#[derive(Debug, Default)]
pub struct DnsLookup;

impl DnsLookup {
    /// 创建查询器
    pub fn new() -> Self {
        DnsLookup
    }
}

#[async_trait]
impl SubdomainLookup for DnsLookup {
    async fn lookup(&self, fqdn: &str, resolver: &str, timeout: Duration) -> LookupOutcome {
        let endpoint = match parse_endpoint(resolver) {
            Ok(addr) => addr,
            Err(e) => return LookupOutcome::Fatal(e),
        };
        let client = build_resolver(endpoint, timeout, Protocol::Udp);

        match client.lookup(fqdn, RecordType::A).await {
            Ok(response) => {
                let records = response
                    .record_iter()
                    .filter_map(Record::from_lookup)
                    .collect();
                LookupOutcome::Records(records)
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => LookupOutcome::Records(Vec::new()),
                ResolveErrorKind::Timeout => LookupOutcome::Timeout,
                // 畸形应答按可重试处理
                ResolveErrorKind::Proto(_)
                | ResolveErrorKind::Msg(_)
                | ResolveErrorKind::Message(_) => LookupOutcome::Timeout,
                _ => LookupOutcome::Fatal(e.to_string()),
            },
        }
    }
}

/// 把解析器地址解析成套接字地址，缺省端口53
pub fn parse_endpoint(resolver: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = resolver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    match resolver.parse::<IpAddr>() {
        Ok(ip) => Ok(SocketAddr::new(ip, 53)),
        Err(_) => Err(format!("invalid resolver address: {}", resolver)),
    }
}

/// 针对单一端点构建解析器实例
pub(crate) fn build_resolver(
    endpoint: SocketAddr,
    timeout: Duration,
    protocol: Protocol,
) -> TokioAsyncResolver {
    let mut config = ResolverConfig::new();
    config.add_name_server(NameServerConfig {
        socket_addr: endpoint,
        protocol,
        tls_dns_name: None,
        trust_negative_responses: false,
        bind_addr: None,
    });

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.use_hosts_file = false;

    TokioAsyncResolver::tokio(config, opts)
}

/// 下一档超时时长
pub fn next_timeout(current: Duration) -> Duration {
    (current + TIMEOUT_STEP).min(MAX_TIMEOUT)
}

/// 调度器下发给工作者的命令
#[derive(Debug)]
pub enum ScannerCommand {
    /// 对(子域名, 解析器)配对发起一次查询
    Scan {
        /// 子域名标签
        subdomain: String,
        /// 解析器地址
        resolver: String,
    },
    /// 停止工作者
    Stop,
}

/// 工作者主循环
///
/// 启动时上报一次就绪，随后逐条执行Scan命令并回报结果。
/// 致命错误时上报后退出；Terminated哨兵由监督任务发送。
pub(crate) async fn run_scanner(
    id: ScannerId,
    hostname: String,
    lookup: Arc<dyn SubdomainLookup>,
    mut tasks: mpsc::UnboundedReceiver<ScannerCommand>,
    results: mpsc::UnboundedSender<DispatcherCommand>,
) {
    let mut timeout = INITIAL_TIMEOUT;

    if results
        .send(DispatcherCommand::AvailableForScan { scanner: id })
        .is_err()
    {
        return;
    }

    while let Some(command) = tasks.recv().await {
        match command {
            ScannerCommand::Scan {
                subdomain,
                resolver,
            } => {
                let fqdn = format!("{}.{}", subdomain, hostname);
                match lookup.lookup(&fqdn, &resolver, timeout).await {
                    LookupOutcome::Records(records) => {
                        if results
                            .send(DispatcherCommand::CompletedScan {
                                scanner: id,
                                subdomain,
                                resolver,
                                records,
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    LookupOutcome::Timeout => {
                        timeout = next_timeout(timeout);
                        if results
                            .send(DispatcherCommand::TimedOut {
                                scanner: id,
                                subdomain,
                                resolver,
                                new_timeout: timeout,
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    LookupOutcome::Fatal(reason) => {
                        let _ = results.send(DispatcherCommand::FatalError {
                            scanner: id,
                            subdomain,
                            resolver,
                            reason,
                        });
                        return;
                    }
                }
            }
            ScannerCommand::Stop => return,
        }
    }
}
