//! # tree：带模式校验的配置数据树
//!
//! ## 意图（Why）
//! - 运行配置与候选配置都是 [`DataTree`]；子节点以 `Arc<DataNode>` 共享，
//!   `duplicate` 只复制根向量，编辑时沿路径 `Arc::make_mut` 写时复制；
//! - 变更集中的条目直接持有旧树或新树节点的 `Arc`，事务期间节点内容稳定不变。
//!
//! ## 契约（What）
//! - 兄弟节点按规范顺序排列：先按模式定义顺序，同一列表/叶子列表内按键值升序，
//!   用户排序的列表/叶子列表保持插入顺序；
//! - 创建容器或列表条目时实例化带默认值的叶子（标记 `is_default`），
//!   非存在性容器只要含有默认叶子就随父节点一起出现；
//! - 删除带默认值的叶子等价于恢复默认值。
//!
//! ## 风险（Trade-offs）
//! - 每个节点保存完整数据路径，深层树的内存占用略高，换取 O(1) 的路径读取。

mod diff;
pub mod path;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

pub use diff::Delta;
pub use path::{DataPath, PathSegment, schema_path_of};

use crate::{
    error::{NbError, NbResult},
    schema::{ConfigClass, NodeKind, SchemaNode, SchemaProvider},
};

/// 数据树中的单个节点。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNode {
    path: String,
    schema_path: String,
    segment: PathSegment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Arc<DataNode>>,
}

impl DataNode {
    /// 数据路径（含谓词）。
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn schema_path(&self) -> &str {
        &self.schema_path
    }

    pub fn name(&self) -> &str {
        &self.segment.name
    }

    pub fn segment(&self) -> &PathSegment {
        &self.segment
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// 值来自模式默认值而非显式配置。
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn children(&self) -> &[Arc<DataNode>] {
        &self.children
    }

    /// 第一个名为 `name` 的子节点。
    pub fn child(&self, name: &str) -> Option<&Arc<DataNode>> {
        self.children.iter().find(|child| child.segment.name == name)
    }

    /// 子叶子的值。
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|child| child.value())
    }

    /// 先序遍历自身及全部后代。
    pub fn descendants(&self) -> impl Iterator<Item = &DataNode> + '_ {
        let mut stack: Vec<&DataNode> = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|child| child.as_ref()));
            Some(node)
        })
    }
}

/// 配置数据树。
///
/// # 教案式说明
/// - **意图 (Why)**：为引擎提供复制、合并、差异、查找、校验与编辑原语；
/// - **契约 (What)**：
///   - `Clone` 即 duplicate，代价为根向量的浅复制；
///   - 所有编辑都先解析并规范化路径（按模式键顺序重排谓词），路径不在模式中时返回 `NotFound`；
///   - 编辑不会让树处于半完成状态：取值类型错误在插入节点之前就被拒绝；
/// - **风险 (Trade-offs)**：`validate` 需要遍历整棵树，提交路径上每次调用一次。
#[derive(Clone)]
pub struct DataTree {
    schema: Arc<dyn SchemaProvider>,
    roots: Vec<Arc<DataNode>>,
}

impl DataTree {
    /// 创建只含隐式默认节点的树。
    pub fn new(schema: Arc<dyn SchemaProvider>) -> Self {
        let roots = implicit_children(schema.as_ref(), None, "");
        Self { schema, roots }
    }

    pub fn schema(&self) -> &Arc<dyn SchemaProvider> {
        &self.schema
    }

    pub fn roots(&self) -> &[Arc<DataNode>] {
        &self.roots
    }

    /// 先序遍历整棵树。
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DataNode>> + '_ {
        let mut stack: Vec<&Arc<DataNode>> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// 是否含有任何显式配置（默认节点不计）。
    pub fn has_explicit_nodes(&self) -> bool {
        self.iter().any(|node| {
            self.schema
                .node(&node.schema_path)
                .is_some_and(|snode| !(snode.is_leaf() && node.is_default) && !is_np_container(snode))
        })
    }

    /// 解析并规范化数据路径。
    pub fn resolve(&self, raw: &str) -> NbResult<DataPath> {
        let mut path = DataPath::parse(raw)?;
        for depth in 0..path.len() {
            let schema_path = path.schema_prefix(depth + 1);
            let snode = self
                .schema
                .node(&schema_path)
                .ok_or_else(|| NbError::not_found(raw))?;
            let segment = &mut path.segments_mut()[depth];
            match &snode.kind {
                NodeKind::List { keys, .. } => {
                    if let Some((unknown, _)) = segment
                        .predicates
                        .iter()
                        .find(|(key, _)| !keys.contains(key))
                    {
                        return Err(NbError::validation(format!(
                            "`{unknown}` is not a key of `{schema_path}`"
                        )));
                    }
                    segment.predicates.sort_by_key(|(key, _)| {
                        keys.iter().position(|k| k == key).unwrap_or(usize::MAX)
                    });
                }
                NodeKind::LeafList { .. } => {
                    if segment.predicates.iter().any(|(key, _)| key != ".") {
                        return Err(NbError::validation(format!(
                            "leaf-list `{schema_path}` only accepts `[.='value']`"
                        )));
                    }
                }
                _ => {
                    if !segment.predicates.is_empty() {
                        return Err(NbError::validation(format!(
                            "`{schema_path}` does not take predicates"
                        )));
                    }
                }
            }
        }
        Ok(path)
    }

    /// 按数据路径查找节点。
    pub fn find(&self, raw: &str) -> Option<&Arc<DataNode>> {
        let path = self.resolve(raw).ok()?;
        let mut siblings = &self.roots;
        let mut found = None;
        for segment in path.segments() {
            let node = siblings.iter().find(|node| node.segment == *segment)?;
            siblings = &node.children;
            found = Some(node);
        }
        found
    }

    pub fn exists(&self, raw: &str) -> bool {
        self.find(raw).is_some()
    }

    pub fn get_value(&self, raw: &str) -> Option<&str> {
        self.find(raw).and_then(|node| node.value())
    }

    /// 创建或更新 `raw` 指向的节点，沿途缺失的容器与列表条目一并创建。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - 叶子：`value` 必须通过类型检查，写入后清除默认标记；键叶子只能写入与谓词相同的值；
    ///   - 叶子列表：路径未带 `[.='v']` 时以 `value` 补全；
    ///   - 容器/列表条目：已存在时为幂等操作；
    /// - **执行 (How)**：先完成全部检查，再沿路径写时复制并插入缺失节点。
    pub fn edit(&mut self, raw: &str, value: Option<&str>) -> NbResult<()> {
        let mut path = self.resolve(raw)?;
        let schema = Arc::clone(&self.schema);
        let target = schema
            .node(&path.schema_path())
            .ok_or_else(|| NbError::not_found(raw))?;

        if target.config != ConfigClass::Writable {
            return Err(NbError::validation(format!("`{raw}` is not configuration data")));
        }
        if target.is_leaf_list()
            && path.last().is_some_and(|segment| segment.self_value().is_none())
        {
            let Some(value) = value else {
                return Err(NbError::validation(format!("`{raw}` requires a value")));
            };
            if let Some(last) = path.segments_mut().last_mut() {
                last.push_predicate(".", value)?;
            }
        }
        if let Some(spec) = target.leaf() {
            if !spec.is_key {
                spec.ty
                    .check(value)
                    .map_err(|why| NbError::validation(format!("{raw}: {why}")))?;
            }
        }

        let depth = path.len();
        let mut siblings: &mut Vec<Arc<DataNode>> = &mut self.roots;
        let mut parent_schema: Option<String> = None;
        let mut prefix = String::new();

        for (index, segment) in path.segments().iter().enumerate() {
            let schema_path = path.schema_prefix(index + 1);
            let snode = schema
                .node(&schema_path)
                .ok_or_else(|| NbError::not_found(raw))?;
            let is_last = index + 1 == depth;
            if snode.is_leaf() && !is_last {
                return Err(NbError::validation(format!("`{raw}` descends below leaf `{schema_path}`")));
            }

            prefix.push('/');
            prefix.push_str(&segment.to_string());

            let position = match siblings.iter().position(|node| node.segment == *segment) {
                Some(position) => position,
                None => {
                    let node = instantiate(schema.as_ref(), snode, segment, &prefix)?;
                    let position =
                        insert_position(schema.as_ref(), parent_schema.as_deref(), siblings, &node);
                    siblings.insert(position, Arc::new(node));
                    position
                }
            };

            let node = Arc::make_mut(&mut siblings[position]);
            if is_last {
                if let Some(spec) = snode.leaf() {
                    if spec.is_key {
                        if node.value.as_deref() != value {
                            return Err(NbError::validation(format!(
                                "list key `{schema_path}` cannot be modified"
                            )));
                        }
                    } else {
                        node.value = value.map(str::to_owned);
                        node.is_default = false;
                    }
                }
            }
            parent_schema = Some(schema_path);
            siblings = &mut node.children;
        }
        Ok(())
    }

    /// 删除 `raw` 指向的节点；不存在时返回 `NotFound`。
    ///
    /// 带默认值的叶子恢复为默认值，非存在性容器恢复为只含默认节点的状态。
    pub fn delete(&mut self, raw: &str) -> NbResult<()> {
        let path = self.resolve(raw)?;
        if !self.exists(raw) {
            return Err(NbError::not_found(raw));
        }
        let schema = Arc::clone(&self.schema);
        let target = schema
            .node(&path.schema_path())
            .ok_or_else(|| NbError::not_found(raw))?;
        if target.leaf().is_some_and(|spec| spec.is_key) {
            return Err(NbError::validation(format!("list key `{raw}` cannot be deleted")));
        }

        let Some((last, ancestors)) = path.segments().split_last() else {
            return Err(NbError::not_found(raw));
        };
        let mut siblings: &mut Vec<Arc<DataNode>> = &mut self.roots;
        for segment in ancestors {
            let position = siblings
                .iter()
                .position(|node| node.segment == *segment)
                .ok_or_else(|| NbError::not_found(raw))?;
            siblings = &mut Arc::make_mut(&mut siblings[position]).children;
        }
        let position = siblings
            .iter()
            .position(|node| node.segment == *last)
            .ok_or_else(|| NbError::not_found(raw))?;

        if let Some(default) = target.leaf().and_then(|spec| spec.default.clone()) {
            let node = Arc::make_mut(&mut siblings[position]);
            node.value = Some(default);
            node.is_default = true;
        } else if is_np_container(target) {
            let node = Arc::make_mut(&mut siblings[position]);
            node.children = implicit_children(schema.as_ref(), Some(&target.path), &node.path);
            if node.children.is_empty() {
                siblings.remove(position);
            }
        } else {
            siblings.remove(position);
        }
        Ok(())
    }

    /// 把 `source` 合并进当前树。
    ///
    /// 源树中的默认叶子不会覆盖目标树中的显式值；用户排序列表的新条目追加到末尾。
    pub fn merge(&mut self, source: &DataTree) {
        let schema = Arc::clone(&self.schema);
        merge_siblings(schema.as_ref(), None, &mut self.roots, &source.roots);
    }

    /// 把 `node` 及其子树插入到它的数据路径所在位置；父节点必须已存在。
    pub fn graft(&mut self, node: &Arc<DataNode>) -> NbResult<()> {
        let path = DataPath::parse(&node.path)?;
        let schema = Arc::clone(&self.schema);
        let Some((last, ancestors)) = path.segments().split_last() else {
            return Err(NbError::not_found(&node.path));
        };

        let mut siblings: &mut Vec<Arc<DataNode>> = &mut self.roots;
        let mut parent_schema = None;
        for (index, segment) in ancestors.iter().enumerate() {
            let position = siblings
                .iter()
                .position(|candidate| candidate.segment == *segment)
                .ok_or_else(|| NbError::not_found(path.schema_prefix(index + 1)))?;
            siblings = &mut Arc::make_mut(&mut siblings[position]).children;
            parent_schema = Some(path.schema_prefix(index + 1));
        }

        match siblings.iter().position(|candidate| candidate.segment == *last) {
            Some(position) => siblings[position] = Arc::clone(node),
            None => {
                let position = insert_position(schema.as_ref(), parent_schema.as_deref(), siblings, node);
                siblings.insert(position, Arc::clone(node));
            }
        }
        Ok(())
    }

    /// 以模式约束校验整棵树：取值类型、列表键完整性、必选叶子与非配置节点。
    pub fn validate(&self) -> NbResult<()> {
        for node in self.iter() {
            let snode = self.schema.node(&node.schema_path).ok_or_else(|| {
                NbError::validation(format!("`{}` has no schema definition", node.path))
            })?;
            if snode.config != ConfigClass::Writable {
                return Err(NbError::validation(format!(
                    "`{}` is not configuration data",
                    node.path
                )));
            }
            match &snode.kind {
                NodeKind::Leaf(spec) => spec
                    .ty
                    .check(node.value())
                    .map_err(|why| NbError::validation(format!("{}: {why}", node.path)))?,
                NodeKind::LeafList { ty, .. } => ty
                    .check(node.value())
                    .map_err(|why| NbError::validation(format!("{}: {why}", node.path)))?,
                NodeKind::List { keys, .. } => {
                    if let Some(missing) = keys.iter().find(|key| node.child(key).is_none()) {
                        return Err(NbError::validation(format!(
                            "{}: list key `{missing}` is missing",
                            node.path
                        )));
                    }
                }
                NodeKind::Container { .. } => {}
                NodeKind::Rpc | NodeKind::Action => {
                    return Err(NbError::validation(format!("`{}` is not a data node", node.path)));
                }
            }
        }
        check_mandatory(self.schema.as_ref(), None, &self.roots, "")
    }

    /// 计算从 `self` 到 `new` 的结构差异。
    pub fn diff(&self, new: &DataTree) -> Vec<Delta> {
        let mut out = Vec::new();
        diff::diff_siblings(self.schema.as_ref(), &self.roots, &new.roots, &mut out);
        out
    }

    pub fn to_json(&self) -> NbResult<String> {
        serde_json::to_string(&self.roots)
            .map_err(|err| NbError::generic(format!("failed to serialize configuration: {err}")))
    }

    /// 从 [`to_json`](Self::to_json) 的输出重建树，并确认每个节点都存在于模式中。
    pub fn from_json(schema: Arc<dyn SchemaProvider>, raw: &str) -> NbResult<Self> {
        let roots: Vec<Arc<DataNode>> = serde_json::from_str(raw)
            .map_err(|err| NbError::validation(format!("malformed configuration: {err}")))?;
        let tree = Self { schema, roots };
        if let Some(unknown) = tree
            .iter()
            .find(|node| tree.schema.node(&node.schema_path).is_none())
        {
            return Err(NbError::validation(format!(
                "`{}` has no schema definition",
                unknown.path
            )));
        }
        Ok(tree)
    }
}

impl PartialEq for DataTree {
    fn eq(&self, other: &Self) -> bool {
        self.roots == other.roots
    }
}

impl fmt::Debug for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|node| (&node.path, &node.value)))
            .finish()
    }
}

fn is_np_container(snode: &SchemaNode) -> bool {
    matches!(snode.kind, NodeKind::Container { presence: false })
}

/// 创建路径上缺失的单个节点。
fn instantiate(
    schema: &dyn SchemaProvider,
    snode: &SchemaNode,
    segment: &PathSegment,
    path: &str,
) -> NbResult<DataNode> {
    let mut node = DataNode {
        path: path.to_owned(),
        schema_path: snode.path.clone(),
        segment: segment.clone(),
        value: None,
        is_default: false,
        children: Vec::new(),
    };

    match &snode.kind {
        NodeKind::Container { .. } => {
            node.children = implicit_children(schema, Some(&snode.path), path);
        }
        NodeKind::List { keys, .. } => {
            let mut children = implicit_children(schema, Some(&snode.path), path);
            for key in keys {
                let value = segment.predicate(key).ok_or_else(|| {
                    NbError::validation(format!("`{path}` lacks list key `{key}`"))
                })?;
                let key_schema = format!("{}/{key}", snode.path);
                if let Some(spec) = schema.node(&key_schema).and_then(SchemaNode::leaf) {
                    spec.ty
                        .check(Some(value))
                        .map_err(|why| NbError::validation(format!("{path}: {why}")))?;
                }
                let leaf = DataNode {
                    path: format!("{path}/{key}"),
                    schema_path: key_schema,
                    segment: PathSegment::new(key.clone()),
                    value: Some(value.to_owned()),
                    is_default: false,
                    children: Vec::new(),
                };
                let position = insert_position(schema, Some(&snode.path), &children, &leaf);
                children.insert(position, Arc::new(leaf));
            }
            node.children = children;
        }
        NodeKind::LeafList { ty, .. } => {
            let value = segment
                .self_value()
                .ok_or_else(|| NbError::validation(format!("`{path}` lacks a leaf-list value")))?;
            ty.check(Some(value))
                .map_err(|why| NbError::validation(format!("{path}: {why}")))?;
            node.value = Some(value.to_owned());
        }
        NodeKind::Leaf(_) => {}
        NodeKind::Rpc | NodeKind::Action => {
            return Err(NbError::validation(format!("`{path}` is not a data node")));
        }
    }
    Ok(node)
}

/// 父节点创建时随之出现的默认叶子与非存在性容器。
fn implicit_children(
    schema: &dyn SchemaProvider,
    parent_schema: Option<&str>,
    parent_path: &str,
) -> Vec<Arc<DataNode>> {
    let mut out = Vec::new();
    for child in schema.children(parent_schema) {
        if child.config != ConfigClass::Writable {
            continue;
        }
        let path = format!("{parent_path}/{}", child.name);
        match &child.kind {
            NodeKind::Leaf(spec) => {
                if let Some(default) = &spec.default {
                    out.push(Arc::new(DataNode {
                        path,
                        schema_path: child.path.clone(),
                        segment: PathSegment::new(child.name.clone()),
                        value: Some(default.clone()),
                        is_default: true,
                        children: Vec::new(),
                    }));
                }
            }
            NodeKind::Container { presence: false } => {
                let children = implicit_children(schema, Some(&child.path), &path);
                if !children.is_empty() {
                    out.push(Arc::new(DataNode {
                        path,
                        schema_path: child.path.clone(),
                        segment: PathSegment::new(child.name.clone()),
                        value: None,
                        is_default: false,
                        children,
                    }));
                }
            }
            _ => {}
        }
    }
    out
}

/// 规范顺序下 `node` 在 `siblings` 中的插入位置。
fn insert_position(
    schema: &dyn SchemaProvider,
    parent_schema: Option<&str>,
    siblings: &[Arc<DataNode>],
    node: &DataNode,
) -> usize {
    let order = schema.children(parent_schema);
    let rank = |candidate: &DataNode| {
        order
            .iter()
            .position(|snode| snode.path == candidate.schema_path)
            .unwrap_or(usize::MAX)
    };
    let own_rank = rank(node);
    let user_ordered = schema
        .node(&node.schema_path)
        .is_some_and(SchemaNode::is_user_ordered);

    siblings
        .iter()
        .position(|sibling| {
            let sibling_rank = rank(sibling);
            if sibling_rank != own_rank {
                sibling_rank > own_rank
            } else {
                !user_ordered && sibling.segment.predicates > node.segment.predicates
            }
        })
        .unwrap_or(siblings.len())
}

fn merge_siblings(
    schema: &dyn SchemaProvider,
    parent_schema: Option<&str>,
    target: &mut Vec<Arc<DataNode>>,
    source: &[Arc<DataNode>],
) {
    for node in source {
        match target.iter().position(|existing| existing.segment == node.segment) {
            None => {
                let position = insert_position(schema, parent_schema, target, node);
                target.insert(position, Arc::clone(node));
            }
            Some(position) => {
                if Arc::ptr_eq(&target[position], node) {
                    continue;
                }
                let existing = Arc::make_mut(&mut target[position]);
                let is_leaf = schema
                    .node(&node.schema_path)
                    .is_some_and(SchemaNode::is_leaf);
                if is_leaf && !(node.is_default && !existing.is_default) {
                    existing.value = node.value.clone();
                    existing.is_default = node.is_default;
                }
                merge_siblings(schema, Some(&node.schema_path), &mut existing.children, &node.children);
            }
        }
    }
}

fn check_mandatory(
    schema: &dyn SchemaProvider,
    parent_schema: Option<&str>,
    children: &[Arc<DataNode>],
    parent_path: &str,
) -> NbResult<()> {
    for snode in schema.children(parent_schema) {
        if snode.config != ConfigClass::Writable {
            continue;
        }
        let present = children.iter().find(|child| child.schema_path == snode.path);
        match &snode.kind {
            NodeKind::Leaf(spec) if spec.mandatory && present.is_none() => {
                return Err(NbError::validation(format!(
                    "{parent_path}: mandatory leaf `{}` is missing",
                    snode.name
                )));
            }
            NodeKind::Container { presence: false } => {
                let grandchildren = present.map(|node| node.children.as_slice()).unwrap_or(&[]);
                let path = format!("{parent_path}/{}", snode.name);
                check_mandatory(schema, Some(&snode.path), grandchildren, &path)?;
            }
            _ => {}
        }
    }

    for child in children {
        let instance = schema
            .node(&child.schema_path)
            .is_some_and(|snode| snode.is_list() || snode.is_presence());
        if instance {
            check_mandatory(schema, Some(&child.schema_path), &child.children, &child.path)?;
        }
    }
    Ok(())
}
