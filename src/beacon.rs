//! 监控树模块
//!
//! 用于诊断和自省的服务监控树。节点保存在共享的注册表（arena）中，
//! 通过稳定的节点ID引用父节点，不持有所有权。

use crate::error::BeaconError;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 节点ID，在所属注册表内稳定不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BeaconId(usize);

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<BeaconId>,
    children: Vec<BeaconId>,
    reattached: bool,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn insert(&mut self, name: String, parent: Option<BeaconId>) -> BeaconId {
        let id = BeaconId(self.nodes.len());
        self.nodes.push(Node {
            name,
            parent,
            children: Vec::new(),
            reattached: false,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    fn node(&self, id: BeaconId) -> &Node {
        &self.nodes[id.0]
    }

    /// `ancestor` 是否位于 `id` 到根的路径上（包含自身）
    fn is_ancestor(&self, ancestor: BeaconId, id: BeaconId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.nodes[node.0].parent;
        }
        false
    }
}

/// 监控树注册表
///
/// 所有互相挂载的节点必须属于同一个注册表。
#[derive(Debug, Clone, Default)]
pub struct BeaconRegistry {
    arena: Arc<RwLock<Arena>>,
}

static GLOBAL_REGISTRY: OnceLock<BeaconRegistry> = OnceLock::new();

impl BeaconRegistry {
    /// 创建新的空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级别的默认注册表
    pub fn global() -> &'static BeaconRegistry {
        GLOBAL_REGISTRY.get_or_init(BeaconRegistry::new)
    }

    /// 创建一个根节点
    pub fn root(&self, name: impl Into<String>) -> Beacon {
        let id = self.write().insert(name.into(), None);
        Beacon {
            id,
            registry: self.clone(),
        }
    }

    /// 注册表中节点总数
    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn same_as(&self, other: &BeaconRegistry) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena)
    }
}

/// 监控树节点句柄
#[derive(Debug, Clone)]
pub struct Beacon {
    id: BeaconId,
    registry: BeaconRegistry,
}

impl PartialEq for Beacon {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.registry.same_as(&other.registry)
    }
}

impl Eq for Beacon {}

impl Beacon {
    /// 在全局注册表中创建根节点
    pub fn root(name: impl Into<String>) -> Self {
        BeaconRegistry::global().root(name)
    }

    /// 创建子节点
    pub fn new_child(&self, name: impl Into<String>) -> Beacon {
        let id = self.registry.write().insert(name.into(), Some(self.id));
        Beacon {
            id,
            registry: self.registry.clone(),
        }
    }

    /// 将本节点重新挂载到 `parent` 下
    ///
    /// 每个节点只允许重新挂载一次，且不能形成环。
    pub fn reattach(&self, parent: &Beacon) -> Result<(), BeaconError> {
        if !self.registry.same_as(&parent.registry) {
            return Err(BeaconError::ForeignRegistry);
        }

        let mut arena = self.registry.write();
        let name = arena.node(self.id).name.clone();

        if self.id == parent.id {
            return Err(BeaconError::SelfParent { node: name });
        }
        if arena.node(self.id).reattached {
            return Err(BeaconError::AlreadyAttached { node: name });
        }
        if arena.is_ancestor(self.id, parent.id) {
            return Err(BeaconError::Cycle {
                node: name,
                parent: arena.node(parent.id).name.clone(),
            });
        }

        if let Some(old) = arena.nodes[self.id.0].parent {
            arena.nodes[old.0].children.retain(|child| *child != self.id);
        }
        arena.nodes[parent.id.0].children.push(self.id);
        let node = &mut arena.nodes[self.id.0];
        node.parent = Some(parent.id);
        node.reattached = true;
        Ok(())
    }

    /// 检查本节点是否还能重新挂载，不修改监控树
    pub fn check_reattach(&self) -> Result<(), BeaconError> {
        let arena = self.registry.read();
        let node = arena.node(self.id);
        if node.reattached {
            return Err(BeaconError::AlreadyAttached {
                node: node.name.clone(),
            });
        }
        Ok(())
    }

    /// 所属注册表
    pub fn registry(&self) -> &BeaconRegistry {
        &self.registry
    }

    /// 节点ID
    pub fn id(&self) -> BeaconId {
        self.id
    }

    /// 节点名称
    pub fn name(&self) -> String {
        self.registry.read().node(self.id).name.clone()
    }

    /// 父节点
    pub fn parent(&self) -> Option<Beacon> {
        let parent = self.registry.read().node(self.id).parent?;
        Some(Beacon {
            id: parent,
            registry: self.registry.clone(),
        })
    }

    /// 直接子节点
    pub fn children(&self) -> Vec<Beacon> {
        self.registry
            .read()
            .node(self.id)
            .children
            .iter()
            .map(|id| Beacon {
                id: *id,
                registry: self.registry.clone(),
            })
            .collect()
    }

    /// 到根节点的距离
    pub fn depth(&self) -> usize {
        let arena = self.registry.read();
        let mut depth = 0;
        let mut current = arena.node(self.id).parent;
        while let Some(id) = current {
            depth += 1;
            current = arena.node(id).parent;
        }
        depth
    }

    /// 从根到本节点的路径，如 `worker/app`
    pub fn path(&self) -> String {
        let arena = self.registry.read();
        let mut names = Vec::new();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let node = arena.node(id);
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// 深度优先遍历以本节点为根的子树
    pub fn walk(&self) -> Vec<BeaconId> {
        let arena = self.registry.read();
        let mut out = Vec::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(arena.node(id).children.iter().rev().copied());
        }
        out
    }

    /// 子树快照，可序列化
    pub fn snapshot(&self) -> BeaconTree {
        let arena = self.registry.read();
        Self::snapshot_node(&arena, self.id)
    }

    fn snapshot_node(arena: &Arena, id: BeaconId) -> BeaconTree {
        let node = arena.node(id);
        BeaconTree {
            id,
            name: node.name.clone(),
            children: node
                .children
                .iter()
                .map(|child| Self::snapshot_node(arena, *child))
                .collect(),
        }
    }

    /// 缩进文本形式的子树
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.snapshot().render_into(&mut out, 0);
        out
    }
}

/// 监控树快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconTree {
    /// 节点ID
    pub id: BeaconId,
    /// 节点名称
    pub name: String,
    /// 子节点
    pub children: Vec<BeaconTree>,
}

impl BeaconTree {
    fn render_into(&self, out: &mut String, indent: usize) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(&self.name);
        out.push('\n');
        for child in &self.children {
            child.render_into(out, indent + 1);
        }
    }
}
