use std::collections::{BTreeMap, HashMap};

use super::{ConfigClass, LeafSpec, LeafType, NodeKind, SchemaNode, SchemaProvider};
use crate::error::{NbError, NbResult};

/// 内存中的模式实现。
#[derive(Debug, Default)]
pub struct Schema {
    nodes: HashMap<String, SchemaNode>,
    /// 按定义顺序记录的路径。
    order: Vec<String>,
    children: HashMap<Option<String>, Vec<String>>,
    modules: BTreeMap<String, Vec<String>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn collect_preorder<'s>(&'s self, path: &str, out: &mut Vec<&'s SchemaNode>) {
        if let Some(node) = self.nodes.get(path) {
            out.push(node);
        }
        if let Some(children) = self.children.get(&Some(path.to_owned())) {
            for child in children {
                self.collect_preorder(child, out);
            }
        }
    }
}

impl SchemaProvider for Schema {
    fn node(&self, path: &str) -> Option<&SchemaNode> {
        self.nodes.get(path)
    }

    fn children(&self, parent: Option<&str>) -> Vec<&SchemaNode> {
        self.children
            .get(&parent.map(str::to_owned))
            .map(|paths| paths.iter().filter_map(|p| self.nodes.get(p)).collect())
            .unwrap_or_default()
    }

    fn module_nodes(&self, module: &str) -> Option<Vec<&SchemaNode>> {
        let roots = self.modules.get(module)?;
        let mut out = Vec::new();
        for root in roots {
            self.collect_preorder(root, &mut out);
        }
        Some(out)
    }
}

/// 以路径逐个声明节点的模式构建器。
///
/// # 教案式说明
/// - **意图 (Why)**：测试与小型守护进程无需 YANG 编译器即可描述模式；
/// - **契约 (What)**：
///   - 父节点必须先于子节点声明；首段路径的模块前缀决定整棵子树所属模块；
///   - 只读容器/列表下声明的节点自动继承只读属性；
///   - [`build`](SchemaBuilder::build) 检查重复路径、缺失父节点与缺失的列表键，并回填叶子的 `is_key`；
/// - **风险 (Trade-offs)**：不支持 grouping、augment 等 YANG 高级特性。
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    pending: Vec<(String, NodeKind, ConfigClass)>,
}

impl SchemaBuilder {
    pub fn node(mut self, path: &str, kind: NodeKind, config: ConfigClass) -> Self {
        self.pending.push((path.to_owned(), kind, config));
        self
    }

    pub fn container(self, path: &str) -> Self {
        self.node(path, NodeKind::Container { presence: false }, ConfigClass::Writable)
    }

    pub fn presence(self, path: &str) -> Self {
        self.node(path, NodeKind::Container { presence: true }, ConfigClass::Writable)
    }

    pub fn list(self, path: &str, keys: &[&str]) -> Self {
        let keys = keys.iter().map(|k| (*k).to_owned()).collect();
        self.node(path, NodeKind::List { keys, user_ordered: false }, ConfigClass::Writable)
    }

    pub fn ordered_list(self, path: &str, keys: &[&str]) -> Self {
        let keys = keys.iter().map(|k| (*k).to_owned()).collect();
        self.node(path, NodeKind::List { keys, user_ordered: true }, ConfigClass::Writable)
    }

    pub fn leaf(self, path: &str, spec: LeafSpec) -> Self {
        self.node(path, NodeKind::Leaf(spec), ConfigClass::Writable)
    }

    pub fn leaf_list(self, path: &str, ty: LeafType) -> Self {
        self.node(path, NodeKind::LeafList { ty, user_ordered: false }, ConfigClass::Writable)
    }

    pub fn ordered_leaf_list(self, path: &str, ty: LeafType) -> Self {
        self.node(path, NodeKind::LeafList { ty, user_ordered: true }, ConfigClass::Writable)
    }

    /// 声明只读状态节点。
    pub fn state(self, path: &str, kind: NodeKind) -> Self {
        self.node(path, kind, ConfigClass::ReadOnly)
    }

    pub fn rpc(self, path: &str) -> Self {
        self.node(path, NodeKind::Rpc, ConfigClass::None)
    }

    pub fn build(self) -> NbResult<Schema> {
        let mut schema = Schema::default();

        for (path, kind, config) in self.pending {
            let (parent, name) = split_schema_path(&path)?;
            let (module, config) = match &parent {
                None => {
                    let module = name
                        .split_once(':')
                        .map(|(module, _)| module.to_owned())
                        .ok_or_else(|| {
                            NbError::inconsistency(format!("top-level node `{path}` lacks a module prefix"))
                        })?;
                    (module, config)
                }
                Some(parent_path) => {
                    let parent_node = schema.nodes.get(parent_path).ok_or_else(|| {
                        NbError::inconsistency(format!("parent of `{path}` is not declared"))
                    })?;
                    if parent_node.is_leaf() || parent_node.is_leaf_list() {
                        return Err(NbError::inconsistency(format!(
                            "`{parent_path}` cannot have children"
                        )));
                    }
                    let inherited = match parent_node.config {
                        ConfigClass::Writable => config,
                        other => other,
                    };
                    (parent_node.module.clone(), inherited)
                }
            };

            if schema.nodes.contains_key(&path) {
                return Err(NbError::inconsistency(format!("schema node `{path}` declared twice")));
            }

            if parent.is_none() {
                schema.modules.entry(module.clone()).or_default().push(path.clone());
            }
            schema.children.entry(parent.clone()).or_default().push(path.clone());
            schema.order.push(path.clone());
            schema.nodes.insert(
                path.clone(),
                SchemaNode {
                    name: name.to_owned(),
                    path,
                    module,
                    parent,
                    kind,
                    config,
                },
            );
        }

        mark_keys(&mut schema)?;
        Ok(schema)
    }
}

/// 拆出父路径与末段名称。
fn split_schema_path(path: &str) -> NbResult<(Option<String>, &str)> {
    let trimmed = path
        .strip_prefix('/')
        .ok_or_else(|| NbError::inconsistency(format!("schema path `{path}` must be absolute")))?;
    if trimmed.is_empty() || trimmed.contains(['[', ']']) {
        return Err(NbError::inconsistency(format!("malformed schema path `{path}`")));
    }
    match path.rfind('/') {
        Some(0) => Ok((None, trimmed)),
        Some(idx) => Ok((Some(path[..idx].to_owned()), &path[idx + 1..])),
        None => Err(NbError::inconsistency(format!("malformed schema path `{path}`"))),
    }
}

fn mark_keys(schema: &mut Schema) -> NbResult<()> {
    let lists: Vec<(String, Vec<String>)> = schema
        .order
        .iter()
        .filter_map(|path| match &schema.nodes[path].kind {
            NodeKind::List { keys, .. } => Some((path.clone(), keys.clone())),
            _ => None,
        })
        .collect();

    for (list, keys) in lists {
        for key in keys {
            let key_path = format!("{list}/{key}");
            match schema.nodes.get_mut(&key_path).map(|node| &mut node.kind) {
                Some(NodeKind::Leaf(spec)) => spec.is_key = true,
                _ => {
                    return Err(NbError::inconsistency(format!(
                        "list `{list}` declares key `{key}` without a matching leaf"
                    )));
                }
            }
        }
    }
    Ok(())
}
