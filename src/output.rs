//! 输出端
//!
//! 监听器把事件扇出到这里的各个输出端：终端、CSV文件、
//! 纯文本文件、JSON文件，以及供库调用方收集结果的收集器。

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::listener::format_progress;
use crate::model::Record;

/// 输出端契约，未实现的事件默认忽略
pub trait OutputSink {
    /// 工具横幅
    fn header(&mut self) {}
    /// 扫描配置概要
    fn config(&mut self, _threads: usize, _wordlist: usize, _resolvers: usize) {}
    /// 扫描目标
    fn target(&mut self, _hostname: &str) {}
    /// 一般状态
    fn status(&mut self, _message: &str) {}
    /// 成功提示
    fn success(&mut self, _message: &str) {}
    /// 信息提示
    fn info(&mut self, _message: &str) {}
    /// 扫描过程中的信息提示
    fn info_during_scan(&mut self, message: &str) {
        self.info(message);
    }
    /// 告警
    fn warning(&mut self, _message: &str) {}
    /// 错误
    fn error(&mut self, _message: &str) {}
    /// 不带时间戳的错误
    fn error_without_time(&mut self, _message: &str) {}
    /// 任务完成
    fn task_completed(&mut self, _message: &str) {}
    /// 任务失败
    fn task_failed(&mut self, _message: &str) {}
    /// 进度：最近一次派发
    fn last_request(&mut self, _subdomain: &str, _issued: usize, _total: usize) {}
    /// 一批去重后的记录
    fn records(&mut self, _records: &[Record]) {}
    /// 扫描过程中的一批去重后的记录
    fn records_during_scan(&mut self, records: &[Record]) {
        self.records(records);
    }
    /// 正在暂停
    fn pausing_threads(&mut self) {}
    /// 暂停菜单
    fn pause_options(&mut self) {}
    /// 非法的暂停菜单输入
    fn invalid_pause_options(&mut self) {}
    /// 落盘钩子，监听器结束时对每个输出端调用一次
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// 终端输出端
///
/// 静默模式下只打印记录本身，进度行原地刷新。
pub struct TerminalSink {
    silent: bool,
    progress_active: bool,
}

impl TerminalSink {
    /// 创建终端输出端
    pub fn new(silent: bool) -> Self {
        TerminalSink {
            silent,
            progress_active: false,
        }
    }

    // 进度行用\r原地刷新，打印整行前先换行补齐
    fn clear_progress(&mut self) {
        if self.progress_active {
            println!();
            self.progress_active = false;
        }
    }

    fn line(&mut self, message: &str) {
        if self.silent {
            return;
        }
        self.clear_progress();
        println!("[{}] {}", stamp(), message);
    }
}

impl OutputSink for TerminalSink {
    fn header(&mut self) {
        if self.silent {
            return;
        }
        println!("rdnsbrute v{}", env!("CARGO_PKG_VERSION"));
        println!("{}", "-".repeat(48));
    }

    fn config(&mut self, threads: usize, wordlist: usize, resolvers: usize) {
        self.line(&format!(
            "Threads: {} | Wordlist: {} | Resolvers: {}",
            threads, wordlist, resolvers
        ));
    }

    fn target(&mut self, hostname: &str) {
        self.line(&format!("Target: {}", hostname));
    }

    fn status(&mut self, message: &str) {
        self.line(message);
    }

    fn success(&mut self, message: &str) {
        self.line(message);
    }

    fn info(&mut self, message: &str) {
        self.line(message);
    }

    fn warning(&mut self, message: &str) {
        if self.silent {
            return;
        }
        self.clear_progress();
        println!("[{}] [warn] {}", stamp(), message);
    }

    fn error(&mut self, message: &str) {
        self.clear_progress();
        println!("[{}] [error] {}", stamp(), message);
    }

    fn error_without_time(&mut self, message: &str) {
        self.clear_progress();
        println!("{}", message);
    }

    fn task_completed(&mut self, message: &str) {
        self.line(message);
    }

    fn task_failed(&mut self, message: &str) {
        self.clear_progress();
        println!("[{}] [error] {}", stamp(), message);
    }

    fn last_request(&mut self, subdomain: &str, issued: usize, total: usize) {
        if self.silent {
            return;
        }
        print!("\r{}", format_progress(subdomain, issued, total));
        let _ = io::stdout().flush();
        self.progress_active = true;
    }

    fn records(&mut self, records: &[Record]) {
        self.clear_progress();
        for record in records {
            if self.silent {
                println!("{}\t{}\t{}", record.name, record.kind, record.data);
            } else {
                println!(
                    "[{}] {:<32} {:<8} {}",
                    stamp(),
                    record.name,
                    record.kind,
                    record.data
                );
            }
        }
    }

    fn pausing_threads(&mut self) {
        self.line("Pausing scan. Waiting for in-flight lookups to finish...");
    }

    fn pause_options(&mut self) {
        self.clear_progress();
        print!("Scan paused. [r]esume or [q]uit: ");
        let _ = io::stdout().flush();
    }

    fn invalid_pause_options(&mut self) {
        print!("Invalid option. [r]esume or [q]uit: ");
        let _ = io::stdout().flush();
    }

    fn finish(&mut self) -> io::Result<()> {
        self.clear_progress();
        io::stdout().flush()
    }
}

/// CSV文件输出端，一条记录一行
pub struct CsvSink {
    writer: BufWriter<File>,
}

impl CsvSink {
    /// 创建文件并写入表头
    pub fn create(path: &str) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(b"Subdomain,Type,Data\n")?;
        Ok(CsvSink { writer })
    }
}

impl OutputSink for CsvSink {
    fn records(&mut self, records: &[Record]) {
        for record in records {
            let row = format!(
                "{},{},{}\n",
                escape_csv(&record.name),
                escape_csv(&record.kind.to_string()),
                escape_csv(&record.data)
            );
            if let Err(e) = self.writer.write_all(row.as_bytes()) {
                log::warn!("csv write failed: {}", e);
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 纯文本文件输出端，按发出顺序每行一条记录
pub struct TxtSink {
    writer: BufWriter<File>,
}

impl TxtSink {
    /// 创建文件
    pub fn create(path: &str) -> io::Result<Self> {
        Ok(TxtSink {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl OutputSink for TxtSink {
    fn records(&mut self, records: &[Record]) {
        for record in records {
            let row = format!("{}\t{}\t{}\n", record.name, record.kind, record.data);
            if let Err(e) = self.writer.write_all(row.as_bytes()) {
                log::warn!("txt write failed: {}", e);
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 可序列化的记录结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableRecord {
    /// 记录名称
    pub subdomain: String,
    /// 记录类型
    pub record_type: String,
    /// 记录数据
    pub data: String,
}

impl From<&Record> for SerializableRecord {
    fn from(record: &Record) -> Self {
        SerializableRecord {
            subdomain: record.name.clone(),
            record_type: record.kind.to_string(),
            data: record.data.clone(),
        }
    }
}

/// JSON文件输出端，缓存全部记录，落盘时一次写出
pub struct JsonSink {
    path: String,
    records: Vec<Record>,
}

impl JsonSink {
    /// 创建输出端，文件在落盘时写出
    pub fn create(path: &str) -> Self {
        JsonSink {
            path: path.to_string(),
            records: Vec::new(),
        }
    }
}

impl OutputSink for JsonSink {
    fn records(&mut self, records: &[Record]) {
        self.records.extend_from_slice(records);
    }

    fn finish(&mut self) -> io::Result<()> {
        let export: Vec<SerializableRecord> = self.records.iter().map(|r| r.into()).collect();
        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())
    }
}

/// 收集器输出端，把记录累积到共享向量里供调用方取回
pub struct CollectorSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CollectorSink {
    /// 创建收集器
    pub fn new(records: Arc<Mutex<Vec<Record>>>) -> Self {
        CollectorSink { records }
    }
}

impl OutputSink for CollectorSink {
    fn records(&mut self, records: &[Record]) {
        if let Ok(mut collected) = self.records.lock() {
            collected.extend_from_slice(records);
        }
    }
}

/// CSV转义
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
