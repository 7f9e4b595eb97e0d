//! 扫描调度器
//!
//! 单消费者状态机：所有状态变更都发生在一个调度任务里，
//! 工作者并行执行查询，结果经由同一条命令通道串行汇入。
//! 调度器持有子域名队列、解析器池、在途表和工作者句柄，
//! 负责派发、暂停恢复、超时重试、解析器拉黑和终止判定。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::listener::ListenerHandle;
use crate::model::{Record, ScanTask};
use crate::pool::{ResolverPool, TimeoutVerdict};
use crate::queue::SubdomainQueue;
use crate::scanner::{self, ScannerCommand, SubdomainLookup};

/// 工作者编号
pub type ScannerId = usize;

/// 调度器状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// 正常派发中
    Running,
    /// 收到暂停命令，等待在途查询结束
    Pausing,
    /// 全部工作者已暂停
    Paused,
    /// 扫描完成（终态）
    Completed,
    /// 工作者无法维持，扫描失败（终态）
    Failed,
}

/// 汇入调度器的命令，彼此之间原子地顺序处理
#[derive(Debug)]
pub enum DispatcherCommand {
    /// 工作者上报就绪
    AvailableForScan {
        /// 上报的工作者
        scanner: ScannerId,
    },
    /// 一次查询完成
    CompletedScan {
        /// 完成查询的工作者
        scanner: ScannerId,
        /// 查询的子域名标签
        subdomain: String,
        /// 本次使用的解析器
        resolver: String,
        /// 查到的记录，可能为空
        records: Vec<Record>,
    },
    /// 一次查询超时
    TimedOut {
        /// 超时的工作者
        scanner: ScannerId,
        /// 查询的子域名标签
        subdomain: String,
        /// 本次使用的解析器
        resolver: String,
        /// 该工作者调整后的超时时长
        new_timeout: Duration,
    },
    /// 工作者遇到无法继续的错误，即将退出
    FatalError {
        /// 出错的工作者
        scanner: ScannerId,
        /// 查询的子域名标签
        subdomain: String,
        /// 本次使用的解析器
        resolver: String,
        /// 错误原因
        reason: String,
    },
    /// 暂停派发，全部工作者空闲后应答
    PauseScanning {
        /// 暂停完成时收到信号
        reply: oneshot::Sender<()>,
    },
    /// 恢复派发
    ResumeScanning,
    /// 把一个子域名插到队头
    PriorityScanSubdomain {
        /// 插队的子域名标签
        subdomain: String,
    },
    /// 注册完成订阅者
    NotifyOnCompletion {
        /// 到达终态时收到最终状态
        reply: oneshot::Sender<ScanState>,
    },
    /// 工作者已退出
    Terminated {
        /// 退出的工作者
        scanner: ScannerId,
    },
}

/// 调度器的外部命令句柄，可克隆
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// 暂停扫描，当全部在途查询结束、所有工作者空闲后返回
    pub async fn pause(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .tx
            .send(DispatcherCommand::PauseScanning { reply })
            .is_err()
        {
            return;
        }
        let _ = done.await;
    }

    /// 恢复扫描
    pub fn resume(&self) {
        let _ = self.tx.send(DispatcherCommand::ResumeScanning);
    }

    /// 把一个子域名插到队头，下一次派发优先取到
    pub fn priority_scan(&self, subdomain: impl Into<String>) {
        let _ = self.tx.send(DispatcherCommand::PriorityScanSubdomain {
            subdomain: subdomain.into(),
        });
    }

    /// 注册完成订阅者，返回在终态时收到最终状态的接收端
    pub fn notify_on_completion(&self) -> oneshot::Receiver<ScanState> {
        let (reply, done) = oneshot::channel();
        let _ = self
            .tx
            .send(DispatcherCommand::NotifyOnCompletion { reply });
        done
    }
}

/// 扫描调度器
pub struct Dispatcher {
    hostname: String,
    threads: usize,
    pending: SubdomainQueue,
    resolvers: ResolverPool,
    // 每个在途工作者对应一个(子域名, 解析器)配对
    in_flight: HashMap<ScannerId, ScanTask>,
    scanners: HashMap<ScannerId, mpsc::UnboundedSender<ScannerCommand>>,
    paused_scanners: Vec<ScannerId>,
    paused_count: usize,
    // 未应答的暂停命令，完全暂停时逐一signal
    pause_replies: Vec<oneshot::Sender<()>>,
    completion_reply: Option<oneshot::Sender<ScanState>>,
    scans_issued: usize,
    scans_total: usize,
    next_scanner_id: ScannerId,
    state: ScanState,
    listener: ListenerHandle,
    lookup: Arc<dyn SubdomainLookup>,
    tx: mpsc::UnboundedSender<DispatcherCommand>,
    rx: mpsc::UnboundedReceiver<DispatcherCommand>,
}

impl Dispatcher {
    /// 创建一次扫描的调度器
    pub fn new(
        hostname: impl Into<String>,
        threads: usize,
        subdomains: Vec<String>,
        resolvers: Vec<String>,
        listener: ListenerHandle,
        lookup: Arc<dyn SubdomainLookup>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scans_total = subdomains.len();
        Dispatcher {
            hostname: hostname.into(),
            threads,
            pending: SubdomainQueue::new(subdomains),
            resolvers: ResolverPool::new(resolvers),
            in_flight: HashMap::new(),
            scanners: HashMap::new(),
            paused_scanners: Vec::new(),
            paused_count: 0,
            pause_replies: Vec::new(),
            completion_reply: None,
            scans_issued: 0,
            scans_total,
            next_scanner_id: 0,
            state: ScanState::Running,
            listener,
            lookup,
            tx,
            rx,
        }
    }

    /// 获取外部命令句柄
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            tx: self.tx.clone(),
        }
    }

    /// 运行扫描直到终态
    ///
    /// 终态之后已入队的命令仍会被应答一轮，之后的在途结果被丢弃。
    pub async fn run(mut self) -> ScanState {
        self.start();

        while !self.is_terminal() {
            match self.rx.recv().await {
                Some(command) => self.handle_command(command),
                None => break,
            }
        }

        // 应答终态前已经排队的命令（例如完成订阅）
        while let Ok(command) = self.rx.try_recv() {
            self.handle_command(command);
        }

        self.state
    }

    fn start(&mut self) {
        if self.pending.remaining() == 0 || self.threads == 0 {
            // 无事可做，零派发直接完成
            self.state = ScanState::Completed;
            return;
        }
        if self.resolvers.remaining() == 0 {
            self.listener
                .print_task_failed("Scan aborted as all resolvers are dead.");
            self.state = ScanState::Failed;
            return;
        }
        log::debug!(
            "dispatching {} subdomains across {} scanners",
            self.scans_total,
            self.threads
        );
        for _ in 0..self.threads {
            self.spawn_scanner();
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, ScanState::Completed | ScanState::Failed)
    }

    fn handle_command(&mut self, command: DispatcherCommand) {
        match command {
            DispatcherCommand::AvailableForScan { scanner } => {
                if self.is_terminal() {
                    return;
                }
                self.assign(scanner);
            }
            DispatcherCommand::CompletedScan {
                scanner,
                resolver,
                records,
                ..
            } => {
                if self.is_terminal() {
                    return;
                }
                self.in_flight.remove(&scanner);
                self.resolvers.recycle(resolver);
                if !records.is_empty() {
                    self.listener.print_records_during_scan(records);
                }
                self.assign(scanner);
            }
            DispatcherCommand::TimedOut {
                scanner,
                subdomain,
                resolver,
                new_timeout,
            } => {
                if self.is_terminal() {
                    return;
                }
                self.in_flight.remove(&scanner);
                self.pending.enqueue_priority(subdomain.clone());
                match self.resolvers.report_timeout(&resolver) {
                    TimeoutVerdict::Blacklisted(_) => {
                        self.listener.print_info_during_scan(format!(
                            "Lookup using {} timed out three times. Blacklisting resolver.",
                            resolver
                        ));
                    }
                    TimeoutVerdict::Recycled(_) => {
                        self.listener.print_info_during_scan(format!(
                            "Lookup of {} using {} timed out. Increasing timeout to {} seconds.",
                            subdomain,
                            resolver,
                            new_timeout.as_secs()
                        ));
                    }
                }
                self.assign(scanner);
            }
            DispatcherCommand::FatalError {
                scanner,
                subdomain,
                resolver,
                reason,
            } => {
                if self.is_terminal() {
                    return;
                }
                // 工作者随后自行退出，Terminated由监督任务补发
                self.in_flight.remove(&scanner);
                self.pending.requeue(subdomain);
                self.resolvers.recycle(resolver);
                self.listener.print_warning(format!(
                    "A scanner failed ({}). Its subdomain was re-queued.",
                    reason
                ));
            }
            DispatcherCommand::PauseScanning { reply } => {
                self.listener.print_pausing_threads();
                // 没有存活工作者（终态）时立即应答
                if self.is_terminal() {
                    let _ = reply.send(());
                    return;
                }
                self.state = ScanState::Pausing;
                self.pause_replies.push(reply);
                self.check_fully_paused();
            }
            DispatcherCommand::ResumeScanning => {
                if !matches!(self.state, ScanState::Pausing | ScanState::Paused) {
                    return;
                }
                self.state = ScanState::Running;
                self.paused_count = 0;
                // 完全暂停前就恢复的话，释放还没应答的暂停命令
                self.pause_replies.clear();
                self.listener.print_status("Resuming scan.");
                let parked: Vec<ScannerId> = self.paused_scanners.drain(..).collect();
                for scanner in parked {
                    self.assign(scanner);
                }
            }
            DispatcherCommand::PriorityScanSubdomain { subdomain } => {
                if self.is_terminal() {
                    return;
                }
                self.pending.enqueue_priority(subdomain);
            }
            DispatcherCommand::NotifyOnCompletion { reply } => {
                if self.is_terminal() {
                    let _ = reply.send(self.state);
                } else {
                    self.completion_reply = Some(reply);
                }
            }
            DispatcherCommand::Terminated { scanner } => {
                self.scanners.remove(&scanner);
                self.paused_scanners.retain(|s| *s != scanner);
                // 没来得及告别的工作者（panic路径）：任务放回队列
                if let Some(task) = self.in_flight.remove(&scanner) {
                    self.pending.requeue(task.subdomain);
                    self.resolvers.recycle(task.resolver);
                }
                match self.state {
                    ScanState::Pausing => self.check_fully_paused(),
                    ScanState::Running if self.scanners.is_empty() => self.on_pool_drained(),
                    _ => {}
                }
            }
        }
    }

    /// 派发策略：暂停时计为已暂停；队列空则停掉该工作者；
    /// 有空闲解析器则派发一项；否则告警并缩减一个工作者。
    fn assign(&mut self, scanner: ScannerId) {
        if matches!(self.state, ScanState::Pausing | ScanState::Paused) {
            self.paused_count += 1;
            self.paused_scanners.push(scanner);
            self.check_fully_paused();
            return;
        }

        if self.pending.remaining() == 0 {
            self.stop_scanner(scanner);
            return;
        }

        if let Some(resolver) = self.resolvers.dequeue() {
            // 队列非空时一定能取到
            let subdomain = match self.pending.dequeue() {
                Some(subdomain) => subdomain,
                None => return,
            };
            self.in_flight.insert(
                scanner,
                ScanTask {
                    subdomain: subdomain.clone(),
                    resolver: resolver.clone(),
                },
            );
            self.scans_issued += 1;
            self.listener
                .print_last_request(&subdomain, self.scans_issued, self.scans_total);
            if let Some(tx) = self.scanners.get(&scanner) {
                let _ = tx.send(ScannerCommand::Scan {
                    subdomain,
                    resolver,
                });
            }
        } else {
            self.listener.print_warning(
                "There aren't enough resolvers for each thread. Reducing thread count by 1.",
            );
            self.stop_scanner(scanner);
        }
    }

    fn check_fully_paused(&mut self) {
        if self.state != ScanState::Pausing {
            return;
        }
        if self.paused_count >= self.scanners.len() {
            self.state = ScanState::Paused;
            log::debug!("all scanners paused");
            // 每个未应答的暂停命令都signal一次
            for reply in self.pause_replies.drain(..) {
                let _ = reply.send(());
            }
        }
    }

    /// 工作者耗尽时的终止判定：没有剩余工作则完成；
    /// 还有工作则把在途项放回队列并重建工作者，建不起来则失败。
    fn on_pool_drained(&mut self) {
        if self.pending.remaining() == 0 && self.in_flight.is_empty() {
            self.complete(ScanState::Completed);
            return;
        }

        let stranded: Vec<ScanTask> = self.in_flight.drain().map(|(_, task)| task).collect();
        for task in stranded {
            self.pending.requeue(task.subdomain);
            self.resolvers.recycle(task.resolver);
        }

        let fresh = self
            .pending
            .remaining()
            .min(self.resolvers.remaining())
            .min(self.threads);
        if fresh == 0 {
            self.listener
                .print_task_failed("Scan aborted as all resolvers are dead.");
            self.complete(ScanState::Failed);
            return;
        }

        log::debug!("scanner pool drained, restarting {} scanners", fresh);
        for _ in 0..fresh {
            self.spawn_scanner();
        }
    }

    fn complete(&mut self, state: ScanState) {
        self.state = state;
        for (_, tx) in self.scanners.drain() {
            let _ = tx.send(ScannerCommand::Stop);
        }
        self.in_flight.clear();
        match self.completion_reply.take() {
            Some(reply) => {
                let _ = reply.send(state);
            }
            None => {
                self.listener.print_error(
                    "The dispatcher doesn't know who to notify of completion! Terminating anyway.",
                );
            }
        }
    }

    fn stop_scanner(&mut self, scanner: ScannerId) {
        if let Some(tx) = self.scanners.get(&scanner) {
            let _ = tx.send(ScannerCommand::Stop);
        }
    }

    fn spawn_scanner(&mut self) {
        let id = self.next_scanner_id;
        self.next_scanner_id += 1;

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        self.scanners.insert(id, task_tx);

        let worker = tokio::spawn(scanner::run_scanner(
            id,
            self.hostname.clone(),
            Arc::clone(&self.lookup),
            task_rx,
            self.tx.clone(),
        ));

        // 监督任务：无论工作者如何退出都补发Terminated哨兵
        let results = self.tx.clone();
        tokio::spawn(async move {
            let _ = worker.await;
            let _ = results.send(DispatcherCommand::Terminated { scanner: id });
        });
    }
}
