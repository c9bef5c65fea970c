//! # callbacks：守护进程与引擎之间的回调契约
//!
//! ## 意图（Why）
//! - 守护进程按模式节点注册一组回调，引擎在事务各阶段按优先级逐个调用；
//! - 以 trait 默认方法表示"未实现"，并用 [`Capabilities`] 显式声明实现了哪些操作，
//!   注册表据此在启动期发现缺失或多余的回调。
//!
//! ## 契约（What）
//! - 配置类回调（create/modify/delete/moved）在四个事件中被调用：Validate、Prepare、Abort、Apply；
//!   Validate 与 Prepare 返回错误会终止事务，Abort 与 Apply 的错误只记录日志；
//! - 资源槽 [`Resource`] 在 Prepare 中分配，Abort 时释放，Apply 时移交给守护进程；
//! - 状态类回调（get_elem/get_next/get_keys/lookup_entry）只读，不参与事务。

use std::{any::Any, fmt, sync::Arc};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    error::{NbError, NbResult},
    tree::{DataNode, DataTree},
};

/// 事务阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Validate,
    Prepare,
    Abort,
    Apply,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::Validate => "validate",
            Event::Prepare => "prepare",
            Event::Abort => "abort",
            Event::Apply => "apply",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 模式节点可以承载的回调操作。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Create,
    Modify,
    Delete,
    Move,
    ApplyFinish,
    GetElem,
    GetNext,
    GetKeys,
    LookupEntry,
    Rpc,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Create,
        Operation::Modify,
        Operation::Delete,
        Operation::Move,
        Operation::ApplyFinish,
        Operation::GetElem,
        Operation::GetNext,
        Operation::GetKeys,
        Operation::LookupEntry,
        Operation::Rpc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
            Operation::Move => "move",
            Operation::ApplyFinish => "apply_finish",
            Operation::GetElem => "get_elem",
            Operation::GetNext => "get_next",
            Operation::GetKeys => "get_keys",
            Operation::LookupEntry => "lookup_entry",
            Operation::Rpc => "rpc",
        }
    }

    /// 缺失时不算注册错误的操作。
    pub fn is_optional(self) -> bool {
        matches!(self, Operation::ApplyFinish)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// 回调实现声明的能力集合。
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const CREATE = 1 << 0;
        const MODIFY = 1 << 1;
        const DELETE = 1 << 2;
        const MOVE = 1 << 3;
        const APPLY_FINISH = 1 << 4;
        const GET_ELEM = 1 << 5;
        const GET_NEXT = 1 << 6;
        const GET_KEYS = 1 << 7;
        const LOOKUP_ENTRY = 1 << 8;
        const RPC = 1 << 9;
    }
}

impl Capabilities {
    pub fn of(operation: Operation) -> Self {
        match operation {
            Operation::Create => Capabilities::CREATE,
            Operation::Modify => Capabilities::MODIFY,
            Operation::Delete => Capabilities::DELETE,
            Operation::Move => Capabilities::MOVE,
            Operation::ApplyFinish => Capabilities::APPLY_FINISH,
            Operation::GetElem => Capabilities::GET_ELEM,
            Operation::GetNext => Capabilities::GET_NEXT,
            Operation::GetKeys => Capabilities::GET_KEYS,
            Operation::LookupEntry => Capabilities::LOOKUP_ENTRY,
            Operation::Rpc => Capabilities::RPC,
        }
    }

    pub fn supports(self, operation: Operation) -> bool {
        self.contains(Capabilities::of(operation))
    }
}

/// 发起事务的前端类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Client {
    Cli,
    Confd,
    Sysrepo,
    Grpc,
}

impl Client {
    pub fn name(self) -> &'static str {
        match self {
            Client::Cli => "CLI",
            Client::Confd => "ConfD",
            Client::Sysrepo => "Sysrepo",
            Client::Grpc => "gRPC",
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 准备阶段分配、应用阶段移交的资源。
///
/// - **契约 (What)**：`Fd` 承载整数句柄（套接字等），`Owned` 承载任意堆对象；
/// - **风险 (Trade-offs)**：引擎不解释资源内容，释放责任在 Abort 回调。
pub enum Resource {
    Fd(i32),
    Owned(Box<dyn Any + Send + Sync>),
}

impl Resource {
    pub fn as_fd(&self) -> Option<i32> {
        match self {
            Resource::Fd(fd) => Some(*fd),
            Resource::Owned(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Resource::Owned(boxed) => boxed.downcast_ref::<T>(),
            Resource::Fd(_) => None,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Fd(fd) => f.debug_tuple("Fd").field(fd).finish(),
            Resource::Owned(_) => f.write_str("Owned(..)"),
        }
    }
}

/// 配置类回调的参数。
///
/// `node` 对删除来自旧配置，其余来自新配置；`tree` 为同一来源的整棵树。
pub struct CallbackArgs<'a> {
    pub event: Event,
    pub node: &'a DataNode,
    pub tree: &'a DataTree,
    pub resource: &'a mut Option<Resource>,
}

/// 状态数据遍历中用于定位列表条目的不透明句柄。
pub type ListEntry = Arc<dyn Any + Send + Sync>;

/// RPC 输入输出与通知参数中的一个数据项。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YangData {
    pub path: String,
    pub value: Option<String>,
}

impl YangData {
    pub fn new(path: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            path: path.into(),
            value: value.map(str::to_owned),
        }
    }
}

fn unsupported(operation: Operation) -> NbError {
    NbError::generic(format!("`{operation}` callback is not implemented"))
}

/// 挂在模式节点上的回调集合。
///
/// # 教案式说明
/// - **意图 (Why)**：每个守护进程只实现自己关心的操作，其余沿用默认实现；
/// - **契约 (What)**：
///   - [`capabilities`](NbCallbacks::capabilities) 必须与实际覆写的方法一致，注册表校验只看这个声明；
///   - 方法在提交线程上同步执行，不得阻塞过久；
///   - `apply_finish` 在同一事务中对同一 `(节点, 实例)` 只调用一次，且晚于全部逐项回调；
/// - **风险 (Trade-offs)**：声明与实现不一致时，事务会在运行期遇到 `Generic` 错误。
pub trait NbCallbacks: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn create(&self, _args: &mut CallbackArgs<'_>) -> NbResult<()> {
        Err(unsupported(Operation::Create))
    }

    fn modify(&self, _args: &mut CallbackArgs<'_>) -> NbResult<()> {
        Err(unsupported(Operation::Modify))
    }

    fn delete(&self, _args: &mut CallbackArgs<'_>) -> NbResult<()> {
        Err(unsupported(Operation::Delete))
    }

    fn moved(&self, _args: &mut CallbackArgs<'_>) -> NbResult<()> {
        Err(unsupported(Operation::Move))
    }

    /// 本事务全部逐项回调完成后，对受影响的实例调用一次。
    fn apply_finish(&self, _node: &DataNode, _tree: &DataTree) {}

    /// 读取状态叶子或存在性容器的当前值。
    fn get_elem(&self, _path: &str, _list_entry: Option<&ListEntry>) -> Option<String> {
        None
    }

    /// 返回 `list_entry` 之后的条目；`list_entry` 为 `None` 时返回第一个。
    fn get_next(&self, _parent_entry: Option<&ListEntry>, _list_entry: Option<&ListEntry>) -> Option<ListEntry> {
        None
    }

    /// 返回条目的键值，顺序与模式中键的声明顺序一致。
    fn get_keys(&self, _list_entry: &ListEntry) -> Vec<String> {
        Vec::new()
    }

    fn lookup_entry(&self, _parent_entry: Option<&ListEntry>, _keys: &[String]) -> Option<ListEntry> {
        None
    }

    fn rpc(&self, _path: &str, _input: &[YangData]) -> NbResult<Vec<YangData>> {
        Err(unsupported(Operation::Rpc))
    }

    /// 以调用方自定的文本格式渲染配置节点，`None` 表示不输出。
    fn cli_show(&self, _node: &DataNode, _show_defaults: bool) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_flags_cover_every_operation() {
        let all = Operation::ALL
            .iter()
            .fold(Capabilities::empty(), |acc, op| acc | Capabilities::of(*op));
        assert_eq!(all, Capabilities::all());
        assert!(Capabilities::CREATE.supports(Operation::Create));
        assert!(!Capabilities::CREATE.supports(Operation::Delete));
    }

    #[test]
    fn resource_accessors() {
        assert_eq!(Resource::Fd(7).as_fd(), Some(7));
        let owned = Resource::Owned(Box::new(String::from("sock")));
        assert_eq!(owned.downcast_ref::<String>().map(String::as_str), Some("sock"));
        assert_eq!(owned.as_fd(), None);
    }
}
