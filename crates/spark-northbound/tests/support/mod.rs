//! 集成测试共享夹具：示例模式、记录型回调与预装引擎。
//!
//! - **意图 (Why)**：各测试文件复用同一套模式与回调，断言只关心调用序列与资源计数；
//! - **契约 (What)**：记录型回调按模式推导能力位图，因此注册表校验总能通过；
//!   `fail_on` 注入的失败在分配资源之前返回，`live_resources` 反映尚未释放的资源数。

#![allow(dead_code)]

use std::sync::{
    Arc, Once,
    atomic::{AtomicI64, Ordering},
};

use parking_lot::Mutex;
use spark_northbound::{
    CallbackArgs, CallbackBinding, Capabilities, DataNode, Event, LeafSpec, LeafType, ListEntry,
    MemoryRollbackLog, NbCallbacks, NbError, NbResult, NodeKind, NodeRegistry, Northbound, NorthboundConfig,
    Operation, Resource, Schema, SchemaProvider, YangData,
};

pub const MODULE: &str = "ft";

/// 状态列表 `/ft:state/peer` 的固定内容。
pub const PEERS: [(&str, &str); 2] = [("10.0.0.1", "42"), ("10.0.0.2", "7")];

/// 声明了 `apply_finish` 的节点。
const FINISHERS: [&str; 2] = ["/ft:routing/interface", "/ft:routing/router"];

/// 安装输出到测试捕获流的 `fmt` 订阅者；与 `#[traced_test]` 不可在同一测试二进制中混用。
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn schema() -> Arc<dyn SchemaProvider> {
    let schema = Schema::builder()
        .container("/ft:routing")
        .leaf("/ft:routing/hostname", LeafSpec::new(LeafType::String))
        .leaf("/ft:routing/domain", LeafSpec::new(LeafType::String))
        .leaf("/ft:routing/contact", LeafSpec::new(LeafType::String))
        .leaf("/ft:routing/location", LeafSpec::new(LeafType::String))
        .presence("/ft:routing/router")
        .leaf("/ft:routing/router/router-id", LeafSpec::new(LeafType::String))
        .leaf("/ft:routing/router/area", LeafSpec::new(LeafType::String))
        .leaf(
            "/ft:routing/router/timer",
            LeafSpec::new(LeafType::Unsigned { max: 3600 }).default_value("30"),
        )
        .list("/ft:routing/interface", &["name"])
        .leaf("/ft:routing/interface/name", LeafSpec::new(LeafType::String))
        .leaf(
            "/ft:routing/interface/mtu",
            LeafSpec::new(LeafType::Unsigned { max: 9216 }).default_value("1500"),
        )
        .leaf("/ft:routing/interface/description", LeafSpec::new(LeafType::String))
        .leaf("/ft:routing/interface/shutdown", LeafSpec::new(LeafType::Empty))
        .leaf_list("/ft:routing/tag", LeafType::String)
        .state("/ft:state", NodeKind::Container { presence: false })
        .state(
            "/ft:state/peer",
            NodeKind::List {
                keys: vec!["address".to_owned()],
                user_ordered: false,
            },
        )
        .state("/ft:state/peer/address", NodeKind::Leaf(LeafSpec::new(LeafType::String)))
        .state("/ft:state/peer/uptime", NodeKind::Leaf(LeafSpec::new(LeafType::Unsigned { max: u64::MAX })))
        .rpc("/ft:clear")
        .build();
    match schema {
        Ok(schema) => Arc::new(schema),
        Err(err) => panic!("夹具模式非法: {err}"),
    }
}

/// 一次回调调用的记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub event: &'static str,
    pub operation: &'static str,
    pub path: String,
}

/// 回调共享的观测点。
#[derive(Debug, Default)]
pub struct Journal {
    pub calls: Mutex<Vec<Call>>,
    pub failures: Mutex<Vec<(Event, String)>>,
    pub live_resources: AtomicI64,
}

impl Journal {
    pub fn fail_on(&self, event: Event, path: &str) {
        self.failures.lock().push((event, path.to_owned()));
    }

    pub fn calls(&self, event: &str) -> Vec<Call> {
        self.calls.lock().iter().filter(|call| call.event == event).cloned().collect()
    }

    pub fn paths(&self, event: &str) -> Vec<String> {
        self.calls(event).into_iter().map(|call| call.path).collect()
    }

    pub fn live(&self) -> i64 {
        self.live_resources.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// 记录每次调用的回调实现。
pub struct Recorder {
    path: String,
    capabilities: Capabilities,
    journal: Arc<Journal>,
}

impl Recorder {
    fn handle(&self, operation: Operation, args: &mut CallbackArgs<'_>) -> NbResult<()> {
        self.journal.calls.lock().push(Call {
            event: args.event.name(),
            operation: operation.name(),
            path: args.node.path().to_owned(),
        });

        let injected = self
            .journal
            .failures
            .lock()
            .iter()
            .any(|(event, path)| *event == args.event && path == args.node.path());
        if injected {
            return Err(NbError::resource(format!("injected failure at {}", args.node.path())));
        }

        match args.event {
            Event::Prepare => {
                *args.resource = Some(Resource::Fd(3));
                self.journal.live_resources.fetch_add(1, Ordering::SeqCst);
            }
            Event::Abort | Event::Apply => {
                if args.resource.take().is_some() {
                    self.journal.live_resources.fetch_sub(1, Ordering::SeqCst);
                }
            }
            Event::Validate => {}
        }
        Ok(())
    }

    fn peer_index(entry: Option<&ListEntry>) -> Option<usize> {
        entry.and_then(|entry| entry.downcast_ref::<usize>()).copied()
    }
}

impl NbCallbacks for Recorder {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create(&self, args: &mut CallbackArgs<'_>) -> NbResult<()> {
        self.handle(Operation::Create, args)
    }

    fn modify(&self, args: &mut CallbackArgs<'_>) -> NbResult<()> {
        self.handle(Operation::Modify, args)
    }

    fn delete(&self, args: &mut CallbackArgs<'_>) -> NbResult<()> {
        self.handle(Operation::Delete, args)
    }

    fn apply_finish(&self, node: &DataNode, _tree: &spark_northbound::DataTree) {
        self.journal.calls.lock().push(Call {
            event: "apply",
            operation: Operation::ApplyFinish.name(),
            path: node.path().to_owned(),
        });
    }

    fn get_elem(&self, _path: &str, list_entry: Option<&ListEntry>) -> Option<String> {
        let (address, uptime) = PEERS.get(Self::peer_index(list_entry)?)?;
        match self.path.rsplit('/').next() {
            Some("address") => Some((*address).to_owned()),
            Some("uptime") => Some((*uptime).to_owned()),
            _ => None,
        }
    }

    fn get_next(&self, _parent: Option<&ListEntry>, list_entry: Option<&ListEntry>) -> Option<ListEntry> {
        let next = match list_entry {
            None => 0,
            Some(entry) => Self::peer_index(Some(entry))? + 1,
        };
        (next < PEERS.len()).then(|| Arc::new(next) as ListEntry)
    }

    fn get_keys(&self, list_entry: &ListEntry) -> Vec<String> {
        Self::peer_index(Some(list_entry))
            .and_then(|index| PEERS.get(index))
            .map(|(address, _)| vec![(*address).to_owned()])
            .unwrap_or_default()
    }

    fn lookup_entry(&self, _parent: Option<&ListEntry>, keys: &[String]) -> Option<ListEntry> {
        if self.path != "/ft:state/peer" {
            return None;
        }
        let index = PEERS.iter().position(|(address, _)| Some(*address) == keys.first().map(String::as_str))?;
        Some(Arc::new(index) as ListEntry)
    }

    fn rpc(&self, path: &str, input: &[YangData]) -> NbResult<Vec<YangData>> {
        let cleared = input.len().to_string();
        Ok(vec![YangData::new(format!("{path}/output/cleared"), Some(cleared.as_str()))])
    }

    fn cli_show(&self, node: &DataNode, _show_defaults: bool) -> Option<String> {
        node.value().map(|value| format!("{} {value}", node.name()))
    }
}

/// 为示例模式的每个节点生成绑定，能力取模式允许的全部操作。
pub fn bindings(schema: &dyn SchemaProvider, journal: &Arc<Journal>, priorities: &[(&str, u32)]) -> Vec<CallbackBinding> {
    let nodes = schema.module_nodes(MODULE).unwrap_or_default();
    nodes
        .into_iter()
        .filter_map(|node| {
            let capabilities = Operation::ALL
                .iter()
                .filter(|op| node.allows(**op))
                .filter(|op| **op != Operation::ApplyFinish || FINISHERS.contains(&node.path.as_str()))
                .fold(Capabilities::empty(), |acc, op| acc | Capabilities::of(*op));
            if capabilities.is_empty() {
                return None;
            }
            let recorder = Recorder {
                path: node.path.clone(),
                capabilities,
                journal: Arc::clone(journal),
            };
            let mut binding = CallbackBinding::new(node.path.clone(), Arc::new(recorder));
            if let Some((_, priority)) = priorities.iter().find(|(path, _)| *path == node.path) {
                binding = binding.with_priority(*priority);
            }
            Some(binding)
        })
        .collect()
}

pub struct Fixture {
    pub engine: Arc<Northbound>,
    pub journal: Arc<Journal>,
    pub log: Arc<MemoryRollbackLog>,
}

pub fn fixture() -> Fixture {
    fixture_with_priorities(&[])
}

pub fn fixture_with_priorities(priorities: &[(&str, u32)]) -> Fixture {
    fixture_with_config(NorthboundConfig { debug: true, ..Default::default() }, priorities)
}

/// 以给定配置构建注册表与引擎，`priorities` 覆盖个别节点的优先级。
pub fn fixture_with_config(config: NorthboundConfig, priorities: &[(&str, u32)]) -> Fixture {
    let schema = schema();
    let journal = Arc::new(Journal::default());
    let mut registry = match NodeRegistry::from_config(schema.as_ref(), &[MODULE], &config) {
        Ok(registry) => registry,
        Err(err) => panic!("注册表构建失败: {err}"),
    };
    registry.load_callbacks(bindings(schema.as_ref(), &journal, priorities));

    let log = Arc::new(MemoryRollbackLog::default());
    let engine = match Northbound::new(schema, registry, config) {
        Ok(engine) => engine.with_rollback_log(Arc::clone(&log) as Arc<dyn spark_northbound::RollbackLog>),
        Err(err) => panic!("引擎创建失败: {err}"),
    };
    Fixture {
        engine: Arc::new(engine),
        journal,
        log,
    }
}

impl Fixture {
    /// 以当前运行配置为底，依次写入 `edits`。
    pub fn candidate(&self, edits: &[(&str, Option<&str>)]) -> spark_northbound::DataTree {
        let mut candidate = self.engine.running().tree.clone();
        for (path, value) in edits {
            if let Err(err) = candidate.edit(path, *value) {
                panic!("编辑 {path} 失败: {err}");
            }
        }
        candidate
    }
}
