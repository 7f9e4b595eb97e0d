//! 扫描引擎对外API
//!
//! 把输出端、监听器、前置侦察和调度器装配成一次完整扫描，
//! 并提供便捷函数供库调用方直接使用。

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::dispatcher::{Dispatcher, DispatcherHandle, ScanState};
use crate::input::OutputFormat;
use crate::listener::{ListenerHandle, ScanListener};
use crate::model::Record;
use crate::output::{CollectorSink, CsvSink, JsonSink, OutputSink, TerminalSink, TxtSink};
use crate::recon;
use crate::scanner::DnsLookup;
use crate::subdata;

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 目标域名
    pub hostname: String,
    /// 工作者数量
    pub threads: usize,
    /// 子域名字典，为空时使用内置字典
    pub wordlist: Vec<String>,
    /// 解析器列表，为空时使用默认公共解析器
    pub resolvers: Vec<String>,
    /// 报告文件路径
    pub report_file: Option<String>,
    /// 报告文件格式
    pub report_format: OutputFormat,
    /// 是否先做权威服务器发现和区域传送
    pub check_authoritative: bool,
    /// 静默模式，只输出记录
    pub silent: bool,
    /// 是否安装Ctrl-C暂停菜单
    pub interactive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            hostname: String::new(),
            threads: 8,
            wordlist: Vec::new(),
            resolvers: Vec::new(),
            report_file: None,
            report_format: OutputFormat::Csv,
            check_authoritative: true,
            silent: false,
            interactive: false,
        }
    }
}

/// 一次扫描的结果
#[derive(Debug)]
pub struct ScanReport {
    /// 终态
    pub state: ScanState,
    /// 去重后的全部记录
    pub records: Vec<Record>,
}

/// 扫描引擎
pub struct ScanEngine {
    config: ScanConfig,
}

impl ScanEngine {
    /// 创建扫描引擎
    pub fn new(config: ScanConfig) -> Self {
        ScanEngine { config }
    }

    /// 运行扫描直到终态，返回记录和最终状态
    pub async fn run(self) -> Result<ScanReport, Box<dyn Error>> {
        let config = self.config;

        let wordlist = if config.wordlist.is_empty() {
            subdata::get_default_sub_data()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            config.wordlist.clone()
        };
        let mut resolvers = if config.resolvers.is_empty() {
            subdata::get_default_resolvers()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            config.resolvers.clone()
        };

        let collected = Arc::new(Mutex::new(Vec::new()));
        let mut sinks: Vec<Box<dyn OutputSink + Send>> =
            vec![Box::new(TerminalSink::new(config.silent))];
        let reports_configured = config.report_file.is_some();
        if let Some(path) = &config.report_file {
            match config.report_format {
                OutputFormat::Csv => sinks.push(Box::new(CsvSink::create(path)?)),
                OutputFormat::Txt => sinks.push(Box::new(TxtSink::create(path)?)),
                OutputFormat::Json => sinks.push(Box::new(JsonSink::create(path))),
            }
        }
        sinks.push(Box::new(CollectorSink::new(Arc::clone(&collected))));

        let (listener, listener_done) = ScanListener::spawn(sinks);
        listener.print_header();
        listener.print_config(config.threads, wordlist.len(), resolvers.len());
        listener.print_target(&config.hostname);

        if config.check_authoritative {
            let report = recon::discover_authoritative(&config.hostname, &listener).await;
            // 权威服务器排在配置的解析器之前
            let mut merged = report.authoritative;
            for resolver in resolvers {
                if !merged.contains(&resolver) {
                    merged.push(resolver);
                }
            }
            resolvers = merged;
        }

        let dispatcher = Dispatcher::new(
            config.hostname.clone(),
            config.threads,
            wordlist,
            resolvers,
            listener.clone(),
            Arc::new(DnsLookup::new()),
        );
        let handle = dispatcher.handle();
        let completion = handle.notify_on_completion();

        let reports_flushed = Arc::new(AtomicBool::new(false));
        let interrupt_task = if config.interactive {
            Some(tokio::spawn(interrupt_loop(
                handle.clone(),
                listener.clone(),
                reports_configured,
                Arc::clone(&reports_flushed),
            )))
        } else {
            None
        };

        tokio::spawn(dispatcher.run());
        let state = completion.await.unwrap_or(ScanState::Failed);

        if state == ScanState::Completed {
            listener.print_task_completed(format!("Scan of {} completed.", config.hostname));
        }

        if let Some(task) = &interrupt_task {
            task.abort();
        }
        drop(listener);
        let _ = listener_done.await;
        reports_flushed.store(true, Ordering::SeqCst);

        let records = collected.lock().map(|r| r.clone()).unwrap_or_default();
        Ok(ScanReport { state, records })
    }
}

/// Ctrl-C处理：暂停扫描并进入菜单，r恢复，q退出
async fn interrupt_loop(
    dispatcher: DispatcherHandle,
    listener: ListenerHandle,
    reports_configured: bool,
    reports_flushed: Arc<AtomicBool>,
) {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        dispatcher.pause().await;
        listener.print_pause_options();
        loop {
            // 暂停菜单期间再次Ctrl-C等同于退出
            let choice = tokio::select! {
                _ = tokio::signal::ctrl_c() => None,
                line = input.next_line() => line.ok().flatten(),
            };
            match choice.as_deref().map(str::trim) {
                Some("r") | Some("R") => {
                    dispatcher.resume();
                    break;
                }
                None | Some("q") | Some("Q") | Some("e") | Some("E") => {
                    cancel_scan(
                        &listener,
                        reports_configured && !reports_flushed.load(Ordering::SeqCst),
                    )
                    .await;
                }
                Some(_) => listener.print_invalid_pause_options(),
            }
        }
    }
}

/// 用户取消：提示后以130退出
async fn cancel_scan(listener: &ListenerHandle, reports_pending: bool) {
    listener.print_error_without_time("");
    listener.print_error_without_time("");
    listener.print_error_without_time("Cancelled by the user");
    if reports_pending {
        listener
            .print_error_without_time("WARNING: Reports may not be complete due to unexpected exit.");
    }
    // 留给监听器落盘的时间
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::process::exit(130);
}

/// 便捷的子域名暴破函数
///
/// 静默运行一次扫描并返回去重后的记录。
pub async fn brute_force_subdomains(
    hostname: impl Into<String>,
    wordlist: Option<Vec<String>>,
    resolvers: Option<Vec<String>>,
) -> Result<Vec<Record>, Box<dyn Error>> {
    let config = ScanConfig {
        hostname: hostname.into(),
        wordlist: wordlist.unwrap_or_default(),
        resolvers: resolvers.unwrap_or_default(),
        silent: true,
        ..Default::default()
    };
    let report = ScanEngine::new(config).run().await?;
    Ok(report.records)
}
