//! 核心数据类型
//!
//! 定义扫描过程中流转的DNS记录和扫描任务结构。

use std::fmt;

use trust_dns_resolver::proto::rr;

/// DNS记录类型标签
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    /// IPv4地址
    A,
    /// IPv6地址
    AAAA,
    /// 别名
    CNAME,
    /// 邮件交换器
    MX,
    /// 名称服务器
    NS,
    /// 文本记录
    TXT,
    /// 授权开始
    SOA,
    /// 指针记录
    PTR,
    /// 服务定位
    SRV,
    /// DNSSEC拒绝存在
    NSEC,
    /// DNSSEC签名
    RRSIG,
    /// 其他类型
    Other(String),
}

// 这些类型永远不会进入输出
const FILTERED_KINDS: [RecordKind; 3] = [RecordKind::NSEC, RecordKind::RRSIG, RecordKind::SOA];

impl RecordKind {
    /// 该类型是否被输出过滤器丢弃
    pub fn is_filtered(&self) -> bool {
        FILTERED_KINDS.contains(self)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::A => write!(f, "A"),
            RecordKind::AAAA => write!(f, "AAAA"),
            RecordKind::CNAME => write!(f, "CNAME"),
            RecordKind::MX => write!(f, "MX"),
            RecordKind::NS => write!(f, "NS"),
            RecordKind::TXT => write!(f, "TXT"),
            RecordKind::SOA => write!(f, "SOA"),
            RecordKind::PTR => write!(f, "PTR"),
            RecordKind::SRV => write!(f, "SRV"),
            RecordKind::NSEC => write!(f, "NSEC"),
            RecordKind::RRSIG => write!(f, "RRSIG"),
            RecordKind::Other(name) => write!(f, "{}", name),
        }
    }
}

impl From<rr::RecordType> for RecordKind {
    fn from(rtype: rr::RecordType) -> Self {
        match rtype {
            rr::RecordType::A => RecordKind::A,
            rr::RecordType::AAAA => RecordKind::AAAA,
            rr::RecordType::CNAME => RecordKind::CNAME,
            rr::RecordType::MX => RecordKind::MX,
            rr::RecordType::NS => RecordKind::NS,
            rr::RecordType::TXT => RecordKind::TXT,
            rr::RecordType::SOA => RecordKind::SOA,
            rr::RecordType::PTR => RecordKind::PTR,
            rr::RecordType::SRV => RecordKind::SRV,
            rr::RecordType::NSEC => RecordKind::NSEC,
            rr::RecordType::RRSIG => RecordKind::RRSIG,
            other => RecordKind::Other(other.to_string()),
        }
    }
}

/// 一条DNS记录，按值比较，按(名称, 类型, 数据)排序
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    /// 记录名称
    pub name: String,
    /// 记录类型
    pub kind: RecordKind,
    /// 记录数据
    pub data: String,
}

impl Record {
    /// 创建一条记录
    pub fn new(name: impl Into<String>, kind: RecordKind, data: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            kind,
            data: data.into(),
        }
    }

    /// 从DNS应答记录转换，没有数据段的记录被丢弃
    pub fn from_lookup(record: &rr::Record) -> Option<Self> {
        let data = record.data()?.to_string();
        Some(Record {
            name: record.name().to_utf8().trim_end_matches('.').to_string(),
            kind: RecordKind::from(record.record_type()),
            data,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.kind, self.data)
    }
}

/// 一次派发中的(子域名, 解析器)配对，只在派发和完成之间存在
#[derive(Debug, Clone)]
pub struct ScanTask {
    /// 待查询的子域名标签
    pub subdomain: String,
    /// 本次查询使用的解析器
    pub resolver: String,
}
