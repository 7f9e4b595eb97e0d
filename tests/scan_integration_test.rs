//! 调度器集成测试
//!
//! 用脚本化的查询实现和记录型输出端驱动完整的调度流程。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rdnsbrute::dispatcher::{Dispatcher, ScanState};
use rdnsbrute::listener::ScanListener;
use rdnsbrute::model::{Record, RecordKind};
use rdnsbrute::output::OutputSink;
use rdnsbrute::scanner::{LookupOutcome, SubdomainLookup};

/// 记录下来的监听器事件
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(String),
    Info(String),
    Warning(String),
    Error(String),
    TaskCompleted(String),
    TaskFailed(String),
    LastRequest(String, usize, usize),
    Records(Vec<Record>),
    Pausing,
}

#[derive(Clone, Default)]
struct Recording {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recording {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn records(&self) -> Vec<Record> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Records(records) => Some(records),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn infos(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Info(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Warning(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::TaskFailed(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn requests(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::LastRequest(subdomain, _, _) => Some(subdomain),
                _ => None,
            })
            .collect()
    }

    fn progress(&self) -> Vec<(usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::LastRequest(_, issued, total) => Some((issued, total)),
                _ => None,
            })
            .collect()
    }

    fn issued(&self) -> usize {
        self.progress().len()
    }

    fn paused(&self) -> bool {
        self.events().contains(&Event::Pausing)
    }
}

struct RecordingSink(Recording);

impl OutputSink for RecordingSink {
    fn status(&mut self, message: &str) {
        self.0.push(Event::Status(message.to_string()));
    }

    fn info(&mut self, message: &str) {
        self.0.push(Event::Info(message.to_string()));
    }

    fn warning(&mut self, message: &str) {
        self.0.push(Event::Warning(message.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.0.push(Event::Error(message.to_string()));
    }

    fn task_completed(&mut self, message: &str) {
        self.0.push(Event::TaskCompleted(message.to_string()));
    }

    fn task_failed(&mut self, message: &str) {
        self.0.push(Event::TaskFailed(message.to_string()));
    }

    fn last_request(&mut self, subdomain: &str, issued: usize, total: usize) {
        self.0
            .push(Event::LastRequest(subdomain.to_string(), issued, total));
    }

    fn records(&mut self, records: &[Record]) {
        self.0.push(Event::Records(records.to_vec()));
    }

    fn pausing_threads(&mut self) {
        self.0.push(Event::Pausing);
    }
}

type Behavior = dyn Fn(&str, &str, usize) -> LookupOutcome + Send + Sync;

/// 脚本化查询实现，按(fqdn, 解析器)统计第几次调用
struct MockLookup {
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    behavior: Box<Behavior>,
}

impl MockLookup {
    fn new(
        behavior: impl Fn(&str, &str, usize) -> LookupOutcome + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, behavior)
    }

    fn with_delay(
        delay: Duration,
        behavior: impl Fn(&str, &str, usize) -> LookupOutcome + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(MockLookup {
            delay,
            calls: Mutex::new(HashMap::new()),
            behavior: Box::new(behavior),
        })
    }
}

#[async_trait]
impl SubdomainLookup for MockLookup {
    async fn lookup(&self, fqdn: &str, resolver: &str, _timeout: Duration) -> LookupOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let counter = calls.entry(format!("{}|{}", fqdn, resolver)).or_insert(0);
            *counter += 1;
            *counter
        };
        (self.behavior)(fqdn, resolver, attempt)
    }
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn a_record(fqdn: &str) -> Record {
    Record::new(fqdn, RecordKind::A, "10.0.0.1")
}

/// 跑一轮完整的调度流程并收尾监听器
async fn run_scan(
    threads: usize,
    subdomains: &[&str],
    resolvers: &[&str],
    lookup: Arc<dyn SubdomainLookup>,
) -> (ScanState, Recording) {
    let recording = Recording::default();
    let (listener, listener_done) =
        ScanListener::spawn(vec![Box::new(RecordingSink(recording.clone()))]);
    let dispatcher = Dispatcher::new(
        "example.com",
        threads,
        labels(subdomains),
        labels(resolvers),
        listener,
        lookup,
    );
    let state = dispatcher.run().await;
    listener_done.await.unwrap();
    (state, recording)
}

#[tokio::test]
async fn test_happy_path() {
    let lookup = MockLookup::new(|fqdn, _, _| LookupOutcome::Records(vec![a_record(fqdn)]));
    let (state, recording) = run_scan(
        2,
        &["a", "b", "c"],
        &["1.1.1.1", "8.8.8.8"],
        lookup,
    )
    .await;

    assert_eq!(state, ScanState::Completed);

    let mut names: Vec<String> = recording.records().into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["a.example.com", "b.example.com", "c.example.com"]
    );

    // 工作者乱序完成，派发序号集合不变
    let mut progress = recording.progress();
    progress.sort();
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_timeout_then_recovery() {
    let lookup = MockLookup::new(|fqdn, _, attempt| {
        if fqdn == "a.example.com" && attempt == 1 {
            LookupOutcome::Timeout
        } else {
            LookupOutcome::Records(vec![a_record(fqdn)])
        }
    });
    let (state, recording) = run_scan(1, &["a", "b"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);

    let timeouts: Vec<String> = recording
        .infos()
        .into_iter()
        .filter(|m| m.contains("timed out"))
        .collect();
    assert_eq!(
        timeouts,
        vec!["Lookup of a using 1.1.1.1 timed out. Increasing timeout to 6 seconds."]
    );

    // 超时的子域名最终扫描成功
    let names: Vec<String> = recording.records().into_iter().map(|r| r.name).collect();
    assert!(names.contains(&"a.example.com".to_string()));
    assert!(names.contains(&"b.example.com".to_string()));
}

#[tokio::test]
async fn test_resolver_blacklisted_after_three_timeouts() {
    let lookup = MockLookup::new(|fqdn, resolver, _| {
        if resolver == "1.1.1.1" {
            LookupOutcome::Timeout
        } else {
            LookupOutcome::Records(vec![a_record(fqdn)])
        }
    });
    let (state, recording) = run_scan(
        1,
        &["a", "b", "c"],
        &["1.1.1.1", "8.8.8.8"],
        lookup,
    )
    .await;

    assert_eq!(state, ScanState::Completed);

    let blacklists: Vec<String> = recording
        .infos()
        .into_iter()
        .filter(|m| m.contains("Blacklisting"))
        .collect();
    assert_eq!(
        blacklists,
        vec!["Lookup using 1.1.1.1 timed out three times. Blacklisting resolver."]
    );
    assert_eq!(recording.records().len(), 3);
}

#[tokio::test]
async fn test_all_resolvers_dead() {
    let lookup = MockLookup::new(|_, _, _| LookupOutcome::Timeout);
    let (state, recording) = run_scan(1, &["a"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Failed);
    assert!(recording
        .infos()
        .iter()
        .any(|m| m.contains("Blacklisting resolver.")));
    assert_eq!(
        recording.failures(),
        vec!["Scan aborted as all resolvers are dead."]
    );
}

#[tokio::test]
async fn test_pause_and_resume() {
    let subdomains: Vec<String> = (0..40).map(|i| format!("w{}", i)).collect();
    let lookup = MockLookup::with_delay(Duration::from_millis(25), |fqdn, _, _| {
        LookupOutcome::Records(vec![a_record(fqdn)])
    });

    let recording = Recording::default();
    let (listener, listener_done) =
        ScanListener::spawn(vec![Box::new(RecordingSink(recording.clone()))]);
    let dispatcher = Dispatcher::new(
        "example.com",
        4,
        subdomains.clone(),
        labels(&["1.1.1.1", "8.8.8.8", "9.9.9.9", "1.0.0.1"]),
        listener,
        lookup,
    );
    let handle = dispatcher.handle();
    let completion = handle.notify_on_completion();
    let scan = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.pause().await;
    // 等监听器把暂停前的事件消费完
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recording.paused());

    // 暂停后不再有新的派发
    let issued_at_pause = recording.issued();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(recording.issued(), issued_at_pause);

    // 暂停期间插队的子域名在恢复后第一个被派发
    handle.priority_scan("vip");
    handle.resume();
    let state = completion.await.unwrap();
    assert_eq!(state, ScanState::Completed);

    let _ = scan.await;
    listener_done.await.unwrap();

    assert_eq!(recording.requests()[issued_at_pause], "vip");

    // 没有超时重试，派发总数等于字典总数加一条插队项
    assert_eq!(recording.issued(), subdomains.len() + 1);
    assert_eq!(recording.records().len(), subdomains.len() + 1);
}

#[tokio::test]
async fn test_concurrent_pause_requests_both_notified() {
    let subdomains: Vec<String> = (0..24).map(|i| format!("p{}", i)).collect();
    let lookup = MockLookup::with_delay(Duration::from_millis(25), |fqdn, _, _| {
        LookupOutcome::Records(vec![a_record(fqdn)])
    });

    let recording = Recording::default();
    let (listener, listener_done) =
        ScanListener::spawn(vec![Box::new(RecordingSink(recording.clone()))]);
    let dispatcher = Dispatcher::new(
        "example.com",
        4,
        subdomains.clone(),
        labels(&["1.1.1.1", "8.8.8.8", "9.9.9.9", "1.0.0.1"]),
        listener,
        lookup,
    );
    let handle = dispatcher.handle();
    let completion = handle.notify_on_completion();
    let scan = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_millis(30)).await;

    // 两个克隆句柄同时暂停，都要在完全暂停之后才返回
    let second = handle.clone();
    tokio::join!(handle.pause(), second.pause());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let issued_at_pause = recording.issued();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(recording.issued(), issued_at_pause);

    handle.resume();
    let state = completion.await.unwrap();
    assert_eq!(state, ScanState::Completed);

    let _ = scan.await;
    listener_done.await.unwrap();
    assert_eq!(recording.issued(), subdomains.len());
}

#[tokio::test]
async fn test_pause_with_no_live_scanners_replies_immediately() {
    let lookup = MockLookup::new(|_, _, _| LookupOutcome::Timeout);

    let recording = Recording::default();
    let (listener, listener_done) =
        ScanListener::spawn(vec![Box::new(RecordingSink(recording.clone()))]);
    let dispatcher = Dispatcher::new(
        "example.com",
        2,
        Vec::new(),
        labels(&["1.1.1.1"]),
        listener,
        lookup,
    );
    let handle = dispatcher.handle();

    // 先把暂停命令排进队列再启动调度器
    let pause_handle = handle.clone();
    let pause_task = tokio::spawn(async move { pause_handle.pause().await });
    tokio::task::yield_now().await;

    let state = dispatcher.run().await;
    assert_eq!(state, ScanState::Completed);

    // 没有存活工作者，暂停立即应答且仍然有暂停提示
    pause_task.await.unwrap();
    listener_done.await.unwrap();
    assert!(recording.paused());
}

#[tokio::test]
async fn test_duplicate_records_suppressed() {
    let lookup = MockLookup::new(|_, _, _| {
        LookupOutcome::Records(vec![Record::new(
            "a.example.com",
            RecordKind::CNAME,
            "x.example.com",
        )])
    });
    let (state, recording) = run_scan(1, &["a", "b"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);
    // 相同记录只向输出端转发一次，第二次出现被静默丢弃
    assert_eq!(recording.records().len(), 1);
}

#[tokio::test]
async fn test_filtered_kinds_never_reach_sinks() {
    let lookup = MockLookup::new(|fqdn, _, _| {
        LookupOutcome::Records(vec![
            Record::new("example.com", RecordKind::SOA, "ns1.example.com"),
            Record::new("example.com", RecordKind::RRSIG, "sig"),
            Record::new("example.com", RecordKind::NSEC, "next"),
            a_record(fqdn),
        ])
    });
    let (state, recording) = run_scan(1, &["a"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);
    let records = recording.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::A);
}

#[tokio::test]
async fn test_scanner_death_requeues_subdomain() {
    let lookup = MockLookup::new(|fqdn, _, attempt| {
        if fqdn == "b.example.com" && attempt == 1 {
            LookupOutcome::Fatal("socket error".to_string())
        } else {
            LookupOutcome::Records(vec![a_record(fqdn)])
        }
    });
    let (state, recording) = run_scan(1, &["a", "b"], &["1.1.1.1"], lookup).await;

    // 工作者死亡后会被重建，丢失的子域名重新排队
    assert_eq!(state, ScanState::Completed);
    assert!(recording
        .warnings()
        .iter()
        .any(|m| m.contains("socket error")));
    let names: Vec<String> = recording.records().into_iter().map(|r| r.name).collect();
    assert!(names.contains(&"b.example.com".to_string()));
}

#[tokio::test]
async fn test_empty_wordlist_completes_immediately() {
    let lookup = MockLookup::new(|_, _, _| LookupOutcome::Timeout);
    let (state, recording) = run_scan(2, &[], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);
    assert_eq!(recording.issued(), 0);
    assert!(recording.records().is_empty());
}

#[tokio::test]
async fn test_zero_threads_completes_immediately() {
    let lookup = MockLookup::new(|_, _, _| LookupOutcome::Timeout);
    let (state, recording) = run_scan(0, &["a"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);
    assert_eq!(recording.issued(), 0);
}

#[tokio::test]
async fn test_empty_resolver_list_fails_immediately() {
    let lookup = MockLookup::new(|fqdn, _, _| LookupOutcome::Records(vec![a_record(fqdn)]));
    let (state, recording) = run_scan(2, &["a"], &[], lookup).await;

    assert_eq!(state, ScanState::Failed);
    assert_eq!(
        recording.failures(),
        vec!["Scan aborted as all resolvers are dead."]
    );
    assert_eq!(recording.issued(), 0);
}

#[tokio::test]
async fn test_more_threads_than_resolvers_sheds_scanners() {
    // 工作者多于解析器，富余的工作者会被告警并停掉，扫描仍然完成
    let lookup = MockLookup::with_delay(Duration::from_millis(25), |fqdn, _, _| {
        LookupOutcome::Records(vec![a_record(fqdn)])
    });
    let (state, recording) =
        run_scan(4, &["a", "b", "c", "d", "e", "f"], &["1.1.1.1"], lookup).await;

    assert_eq!(state, ScanState::Completed);
    assert!(recording.warnings().iter().any(|m| m
        == "There aren't enough resolvers for each thread. Reducing thread count by 1."));
    assert_eq!(recording.records().len(), 6);
}
