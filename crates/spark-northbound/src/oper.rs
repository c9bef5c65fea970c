//! 状态数据遍历：经由 get_next/get_keys/get_elem 回调把守护进程内部状态展开为数据项。

use tracing::debug;

use crate::{
    callbacks::{ListEntry, YangData},
    error::{NbError, NbResult},
    registry::NodeRegistry,
    schema::{ConfigClass, NodeKind, SchemaNode, SchemaProvider},
    tree::{DataPath, PathSegment},
};

/// 解析数据路径上全部列表谓词对应的条目句柄，返回末段所在的条目。
///
/// 末段本身是带谓词的列表时返回该条目；路径中不含列表时返回 `None`。
pub(crate) fn lookup_entry(
    registry: &NodeRegistry,
    schema: &dyn SchemaProvider,
    path: &DataPath,
) -> NbResult<Option<ListEntry>> {
    let mut entry: Option<ListEntry> = None;
    for depth in 0..path.len() {
        let schema_path = path.schema_prefix(depth + 1);
        let snode = schema
            .node(&schema_path)
            .ok_or_else(|| NbError::not_found(schema_path.as_str()))?;
        let segment = &path.segments()[depth];
        if !snode.is_list() || segment.predicates.is_empty() {
            continue;
        }

        let keys = snode
            .keys()
            .iter()
            .map(|key| segment.predicate(key).map(str::to_owned))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| NbError::validation(format!("`{path}` lacks keys of `{schema_path}`")))?;
        let descriptor = registry.find(&schema_path)?;
        let callbacks = descriptor
            .callbacks()
            .ok_or_else(|| NbError::generic(format!("no callbacks registered for `{schema_path}`")))?;
        entry = Some(
            callbacks
                .lookup_entry(entry.as_ref(), &keys)
                .ok_or_else(|| NbError::not_found(path.to_string()))?,
        );
    }
    Ok(entry)
}

/// 从 `path` 开始展开状态数据。
pub(crate) fn get(
    registry: &NodeRegistry,
    schema: &dyn SchemaProvider,
    path: &DataPath,
) -> NbResult<Vec<YangData>> {
    let snode = schema
        .node(&path.schema_path())
        .ok_or_else(|| NbError::not_found(path.to_string()))?;
    let entry = lookup_entry(registry, schema, path)?;
    let mut out = Vec::new();

    let addresses_entry = snode.is_list() && path.last().is_some_and(|seg| !seg.predicates.is_empty());
    if addresses_entry {
        walk_children(registry, schema, snode, path, entry.as_ref(), &mut out)?;
    } else {
        walk(registry, schema, snode, path, entry.as_ref(), &mut out)?;
    }
    Ok(out)
}

fn walk(
    registry: &NodeRegistry,
    schema: &dyn SchemaProvider,
    snode: &SchemaNode,
    data_path: &DataPath,
    entry: Option<&ListEntry>,
    out: &mut Vec<YangData>,
) -> NbResult<()> {
    let rendered = data_path.to_string();
    let read_only = snode.config == ConfigClass::ReadOnly;
    match &snode.kind {
        NodeKind::Leaf(_) if read_only => {
            let descriptor = registry.find(&snode.path)?;
            if let Some(value) = descriptor
                .callbacks()
                .and_then(|callbacks| callbacks.get_elem(&rendered, entry))
            {
                out.push(YangData::new(rendered, Some(&value)));
            }
        }
        NodeKind::Container { presence: true } if read_only => {
            let descriptor = registry.find(&snode.path)?;
            let present = descriptor
                .callbacks()
                .and_then(|callbacks| callbacks.get_elem(&rendered, entry))
                .is_some();
            if present {
                out.push(YangData::new(rendered, None));
                walk_children(registry, schema, snode, data_path, entry, out)?;
            }
        }
        NodeKind::Container { presence: false } => {
            walk_children(registry, schema, snode, data_path, entry, out)?;
        }
        NodeKind::List { keys, .. } if read_only => {
            let descriptor = registry.find(&snode.path)?;
            let Some(callbacks) = descriptor.callbacks() else {
                debug!(path = %snode.path, "state list without callbacks skipped");
                return Ok(());
            };
            let mut cursor: Option<ListEntry> = None;
            while let Some(next) = callbacks.get_next(entry, cursor.as_ref()) {
                let values = callbacks.get_keys(&next);
                if values.len() != keys.len() {
                    return Err(NbError::inconsistency(format!(
                        "`{}` returned {} key(s), expected {}",
                        snode.path,
                        values.len(),
                        keys.len()
                    )));
                }
                let segment = keys
                    .iter()
                    .zip(values)
                    .try_fold(PathSegment::new(snode.name.clone()), |segment, (key, value)| {
                        segment.with_predicate(key.clone(), value)
                    })
                    .map_err(|err| {
                        NbError::inconsistency(format!("`{}` returned an unusable key: {err}", snode.path))
                    })?;
                let entry_path = data_path.parent().unwrap_or_default().child(segment);
                walk_children(registry, schema, snode, &entry_path, Some(&next), out)?;
                cursor = Some(next);
            }
        }
        _ => {}
    }
    Ok(())
}

fn walk_children(
    registry: &NodeRegistry,
    schema: &dyn SchemaProvider,
    snode: &SchemaNode,
    data_path: &DataPath,
    entry: Option<&ListEntry>,
    out: &mut Vec<YangData>,
) -> NbResult<()> {
    for child in schema.children(Some(&snode.path)) {
        let child_path = data_path.child(PathSegment::new(child.name.clone()));
        walk(registry, schema, child, &child_path, entry, out)?;
    }
    Ok(())
}
