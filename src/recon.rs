//! 扫描前置侦察
//!
//! 暴破开始前的低成本探测：查询目标的权威名称服务器，
//! 对每个权威服务器尝试区域传送。传送得到的记录直接注入监听器，
//! 权威服务器地址会被并入解析器池。这里的任何失败都不会中断扫描。

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use trust_dns_resolver::config::{Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

use crate::listener::ListenerHandle;
use crate::model::Record;
use crate::scanner::build_resolver;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

/// 前置侦察结果
#[derive(Debug, Default)]
pub struct ReconReport {
    /// 发现的权威服务器地址
    pub authoritative: Vec<String>,
    /// 区域传送得到的记录
    pub records: Vec<Record>,
}

/// 发现权威名称服务器并尝试区域传送
pub async fn discover_authoritative(hostname: &str, listener: &ListenerHandle) -> ReconReport {
    let system = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mut name_servers = Vec::new();
    match system.lookup(hostname, RecordType::NS).await {
        Ok(response) => {
            for record in response.record_iter() {
                if let Some(RData::NS(ns)) = record.data() {
                    name_servers.push(ns.0.to_utf8().trim_end_matches('.').to_string());
                }
            }
        }
        Err(e) => {
            log::info!("NS discovery for {} failed: {}", hostname, e);
        }
    }

    let mut authoritative = Vec::new();
    for name_server in &name_servers {
        listener.print_info(format!("Authoritative name server: {}", name_server));
        match system.lookup_ip(name_server.as_str()).await {
            Ok(response) => {
                for ip in response.iter() {
                    authoritative.push(ip.to_string());
                }
            }
            Err(e) => {
                log::info!("could not resolve name server {}: {}", name_server, e);
            }
        }
    }

    let mut records = Vec::new();
    for address in &authoritative {
        match attempt_zone_transfer(hostname, address).await {
            Ok(found) if !found.is_empty() => {
                listener.print_success(format!(
                    "Zone transfer from {} returned {} records.",
                    address,
                    found.len()
                ));
                records.extend(found);
            }
            Ok(_) => {
                log::info!("zone transfer from {} returned no records", address);
            }
            Err(e) => {
                log::info!("zone transfer from {} refused: {}", address, e);
            }
        }
    }

    if !records.is_empty() {
        listener.print_records(records.clone());
    }

    ReconReport {
        authoritative,
        records,
    }
}

/// 对单个权威服务器尝试一次区域传送，多数服务器会拒绝
async fn attempt_zone_transfer(
    hostname: &str,
    server: &str,
) -> Result<Vec<Record>, Box<dyn Error>> {
    let endpoint: SocketAddr = crate::scanner::parse_endpoint(server)?;
    let client = build_resolver(endpoint, TRANSFER_TIMEOUT, Protocol::Tcp);
    let response = client.lookup(hostname, RecordType::AXFR).await?;
    Ok(response
        .record_iter()
        .filter_map(Record::from_lookup)
        .collect())
}
