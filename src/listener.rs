//! 事件总线
//!
//! 监听器作为独立任务消费事件通道，把调度器和引擎产生的
//! 进度、告警与记录按序扇出到所有已配置的输出端。
//! 记录去重集合由监听器独占持有，NSEC/RRSIG/SOA记录在此被过滤。

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::Record;
use crate::output::OutputSink;

/// 监听器处理的事件
#[derive(Debug)]
pub enum ListenerEvent {
    /// 工具横幅
    Header,
    /// 扫描配置概要
    Config {
        /// 工作者数量
        threads: usize,
        /// 字典条数
        wordlist: usize,
        /// 解析器条数
        resolvers: usize,
    },
    /// 扫描目标
    Target(String),
    /// 一般状态
    Status(String),
    /// 成功提示
    Success(String),
    /// 信息提示
    Info(String),
    /// 扫描过程中的信息提示
    InfoDuringScan(String),
    /// 告警
    Warning(String),
    /// 错误
    Error(String),
    /// 不带时间戳的错误
    ErrorWithoutTime(String),
    /// 任务完成
    TaskCompleted(String),
    /// 任务失败
    TaskFailed(String),
    /// 进度：最近一次派发
    LastRequest {
        /// 最近派发的子域名
        subdomain: String,
        /// 已派发总数
        issued: usize,
        /// 初始字典总数
        total: usize,
    },
    /// 一批记录
    Records(Vec<Record>),
    /// 扫描过程中的一批记录
    RecordsDuringScan(Vec<Record>),
    /// 正在暂停
    PausingThreads,
    /// 暂停菜单
    PauseOptions,
    /// 非法的暂停菜单输入
    InvalidPauseOptions,
}

/// 监听器句柄，可克隆，可从任意任务调用
#[derive(Clone)]
pub struct ListenerHandle {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ListenerHandle {
    fn send(&self, event: ListenerEvent) {
        let _ = self.tx.send(event);
    }

    /// 输出工具横幅
    pub fn print_header(&self) {
        self.send(ListenerEvent::Header);
    }

    /// 输出扫描配置概要
    pub fn print_config(&self, threads: usize, wordlist: usize, resolvers: usize) {
        self.send(ListenerEvent::Config {
            threads,
            wordlist,
            resolvers,
        });
    }

    /// 输出扫描目标
    pub fn print_target(&self, hostname: impl Into<String>) {
        self.send(ListenerEvent::Target(hostname.into()));
    }

    /// 输出一般状态
    pub fn print_status(&self, message: impl Into<String>) {
        self.send(ListenerEvent::Status(message.into()));
    }

    /// 输出成功提示
    pub fn print_success(&self, message: impl Into<String>) {
        self.send(ListenerEvent::Success(message.into()));
    }

    /// 输出信息提示
    pub fn print_info(&self, message: impl Into<String>) {
        self.send(ListenerEvent::Info(message.into()));
    }

    /// 输出扫描过程中的信息提示
    pub fn print_info_during_scan(&self, message: impl Into<String>) {
        self.send(ListenerEvent::InfoDuringScan(message.into()));
    }

    /// 输出告警
    pub fn print_warning(&self, message: impl Into<String>) {
        self.send(ListenerEvent::Warning(message.into()));
    }

    /// 输出错误
    pub fn print_error(&self, message: impl Into<String>) {
        self.send(ListenerEvent::Error(message.into()));
    }

    /// 输出不带时间戳的错误
    pub fn print_error_without_time(&self, message: impl Into<String>) {
        self.send(ListenerEvent::ErrorWithoutTime(message.into()));
    }

    /// 输出任务完成
    pub fn print_task_completed(&self, message: impl Into<String>) {
        self.send(ListenerEvent::TaskCompleted(message.into()));
    }

    /// 输出任务失败
    pub fn print_task_failed(&self, message: impl Into<String>) {
        self.send(ListenerEvent::TaskFailed(message.into()));
    }

    /// 输出进度
    pub fn print_last_request(&self, subdomain: &str, issued: usize, total: usize) {
        self.send(ListenerEvent::LastRequest {
            subdomain: subdomain.to_string(),
            issued,
            total,
        });
    }

    /// 输出一批记录
    pub fn print_records(&self, records: Vec<Record>) {
        self.send(ListenerEvent::Records(records));
    }

    /// 输出扫描过程中的一批记录
    pub fn print_records_during_scan(&self, records: Vec<Record>) {
        self.send(ListenerEvent::RecordsDuringScan(records));
    }

    /// 输出正在暂停的提示
    pub fn print_pausing_threads(&self) {
        self.send(ListenerEvent::PausingThreads);
    }

    /// 输出暂停菜单
    pub fn print_pause_options(&self) {
        self.send(ListenerEvent::PauseOptions);
    }

    /// 输出非法暂停输入的提示
    pub fn print_invalid_pause_options(&self) {
        self.send(ListenerEvent::InvalidPauseOptions);
    }
}

/// 扫描监听器，持有全部输出端和记录去重集合
pub struct ScanListener {
    sinks: Vec<Box<dyn OutputSink + Send>>,
    seen_records: HashSet<Record>,
}

impl ScanListener {
    /// 启动监听器任务
    ///
    /// 返回的句柄全部释放后任务结束，各输出端随之落盘，
    /// JoinHandle因此兼作所有输出端的完成句柄。
    pub fn spawn(sinks: Vec<Box<dyn OutputSink + Send>>) -> (ListenerHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut listener = ScanListener {
            sinks,
            seen_records: HashSet::new(),
        };
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                listener.dispatch(event);
            }
            for sink in &mut listener.sinks {
                if let Err(e) = sink.finish() {
                    log::warn!("output sink flush failed: {}", e);
                }
            }
        });
        (ListenerHandle { tx }, task)
    }

    fn dispatch(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Header => self.each(|s| s.header()),
            ListenerEvent::Config {
                threads,
                wordlist,
                resolvers,
            } => self.each(|s| s.config(threads, wordlist, resolvers)),
            ListenerEvent::Target(hostname) => self.each(|s| s.target(&hostname)),
            ListenerEvent::Status(message) => self.each(|s| s.status(&message)),
            ListenerEvent::Success(message) => self.each(|s| s.success(&message)),
            ListenerEvent::Info(message) => self.each(|s| s.info(&message)),
            ListenerEvent::InfoDuringScan(message) => self.each(|s| s.info_during_scan(&message)),
            ListenerEvent::Warning(message) => self.each(|s| s.warning(&message)),
            ListenerEvent::Error(message) => self.each(|s| s.error(&message)),
            ListenerEvent::ErrorWithoutTime(message) => {
                self.each(|s| s.error_without_time(&message))
            }
            ListenerEvent::TaskCompleted(message) => self.each(|s| s.task_completed(&message)),
            ListenerEvent::TaskFailed(message) => self.each(|s| s.task_failed(&message)),
            ListenerEvent::LastRequest {
                subdomain,
                issued,
                total,
            } => self.each(|s| s.last_request(&subdomain, issued, total)),
            ListenerEvent::Records(records) => {
                let fresh = self.filter_new(records);
                if !fresh.is_empty() {
                    self.each(|s| s.records(&fresh));
                }
            }
            ListenerEvent::RecordsDuringScan(records) => {
                let fresh = self.filter_new(records);
                if !fresh.is_empty() {
                    self.each(|s| s.records_during_scan(&fresh));
                }
            }
            ListenerEvent::PausingThreads => self.each(|s| s.pausing_threads()),
            ListenerEvent::PauseOptions => self.each(|s| s.pause_options()),
            ListenerEvent::InvalidPauseOptions => self.each(|s| s.invalid_pause_options()),
        }
    }

    fn each(&mut self, mut f: impl FnMut(&mut Box<dyn OutputSink + Send>)) {
        for sink in &mut self.sinks {
            f(sink);
        }
    }

    /// 过滤一批记录：去掉被过滤类型和已经见过的记录，保持顺序
    fn filter_new(&mut self, records: Vec<Record>) -> Vec<Record> {
        let mut fresh = Vec::new();
        for record in records {
            if record.kind.is_filtered() {
                continue;
            }
            if self.seen_records.insert(record.clone()) {
                fresh.push(record);
            }
        }
        fresh
    }
}

/// 渲染进度行，总数为零按0.00%处理，超出按100.00%截断
pub fn format_progress(subdomain: &str, issued: usize, total: usize) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        ((issued as f64 / total as f64) * 100.0).min(100.0)
    };
    format!("{:.2}% - Last request to: {}", pct, subdomain)
}
