// Copyright (c) 2024 Huawei Technologies Co.,Ltd. All rights reserved.
//
// StratoVirt is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! In-memory AML tree.
//!
//! All nodes of one table-assembly pass live in an [`AmlTree`] arena and are
//! addressed by [`NodeId`] handles. A node attached to a parent is owned by that
//! parent. A detached node is owned by the caller, who must either attach it or
//! free it with [`AmlTree::delete_tree`]. Freed slots bump their generation, so
//! stale handles are rejected instead of aliasing a newer node.

use std::fmt;

use anyhow::{anyhow, Result};

use crate::aml_compiler::{
    build_object_name, AmlBuffer, AmlBuilder, AmlDevice, AmlNameDecl, AmlScope, AmlScopeBuilder,
};
use crate::resource_data::{check_rd_bytes, is_end_tag};
use crate::AcpiError;

/// Index of the name in the fixed arguments of `Name`, `Scope` and `Device`.
pub const AML_FIXED_ARG_NAME: usize = 0;
/// Index of the value in the fixed arguments of `Name`.
pub const AML_FIXED_ARG_VALUE: usize = 1;

/// Handle of a node in an [`AmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Opcode of an object node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlOpCode {
    /// `Name (NameString, DataRefObject)`
    Name,
    /// `Buffer (BufferSize) {ByteList}`
    Buffer,
    /// `Scope (NameString) {TermList}`
    Scope,
    /// `Device (NameString) {TermList}`
    Device,
}

/// Content type of a data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlDataType {
    /// An encoded NameString.
    NameString,
    /// Already encoded AML, e.g. an integer or a string object.
    Raw,
    /// One resource data descriptor.
    ResourceData,
}

enum NodeKind {
    Object {
        opcode: AmlOpCode,
        fixed_args: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Data {
        data_type: AmlDataType,
        buffer: Vec<u8>,
    },
}

struct AmlNode {
    kind: NodeKind,
    parent: Option<NodeId>,
}

struct Slot {
    generation: u32,
    node: Option<AmlNode>,
}

/// Arena owning the AML nodes built by one assembly pass.
#[derive(Default)]
pub struct AmlTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

/// Borrowed view on a node, encodes the node and its subtree.
pub struct AmlNodeRef<'a> {
    tree: &'a AmlTree,
    id: NodeId,
}

impl AmlBuilder for AmlNodeRef<'_> {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.tree.encode(self.id, &mut bytes);
        bytes
    }
}

fn invalid_state(msg: String) -> anyhow::Error {
    anyhow!(AcpiError::InvalidState(msg))
}

impl AmlTree {
    pub fn new() -> AmlTree {
        AmlTree::default()
    }

    /// Number of nodes currently alive in the arena, attached or not.
    pub fn live_nodes(&self) -> usize {
        self.live
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    fn get(&self, id: NodeId) -> Result<&AmlNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or_else(|| anyhow!(AcpiError::InvalidNode(id)))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut AmlNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or_else(|| anyhow!(AcpiError::InvalidNode(id)))
    }

    fn alloc(&mut self, kind: NodeKind) -> Result<NodeId> {
        let node = AmlNode { kind, parent: None };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return Ok(NodeId {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.try_reserve(1).is_err() {
            self.live -= 1;
            return Err(anyhow!(AcpiError::OutOfResources(
                std::mem::size_of::<Slot>()
            )));
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Ok(NodeId {
            index,
            generation: 0,
        })
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                self.live -= 1;
            }
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        self.get_mut(id)?.parent = parent;
        Ok(())
    }

    /// Create a data node holding a copy of `bytes`.
    ///
    /// Resource data nodes must hold exactly one descriptor whose declared
    /// length matches its size.
    pub fn create_data_node(&mut self, data_type: AmlDataType, bytes: &[u8]) -> Result<NodeId> {
        match data_type {
            AmlDataType::ResourceData => {
                check_rd_bytes(bytes)?;
            }
            AmlDataType::NameString | AmlDataType::Raw if bytes.is_empty() => {
                return Err(anyhow!(AcpiError::InvalidArgument(format!(
                    "empty {:?} data node",
                    data_type
                ))));
            }
            _ => {}
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(bytes.len())
            .map_err(|_| anyhow!(AcpiError::OutOfResources(bytes.len())))?;
        buffer.extend_from_slice(bytes);

        self.alloc(NodeKind::Data { data_type, buffer })
    }

    fn create_name_string_node(&mut self, name: &str, allow_root: bool) -> Result<NodeId> {
        let encoded = build_object_name(name, allow_root)?;
        self.create_data_node(AmlDataType::NameString, &encoded)
    }

    /// Create a detached object node.
    ///
    /// `Scope` and `Device` need a `name`, `Buffer` takes none. `Name` nodes are
    /// created by [`AmlTree::create_name_node`].
    pub fn create_object_node(&mut self, opcode: AmlOpCode, name: Option<&str>) -> Result<NodeId> {
        match (opcode, name) {
            (AmlOpCode::Buffer, None) => self.alloc(NodeKind::Object {
                opcode,
                fixed_args: Vec::new(),
                children: Vec::new(),
            }),
            (AmlOpCode::Scope | AmlOpCode::Device, Some(name)) => {
                let name_node =
                    self.create_name_string_node(name, opcode == AmlOpCode::Scope)?;
                let object = self
                    .alloc(NodeKind::Object {
                        opcode,
                        fixed_args: vec![name_node],
                        children: Vec::new(),
                    })
                    .map_err(|e| {
                        self.release(name_node);
                        e
                    })?;
                self.set_parent(name_node, Some(object))?;
                Ok(object)
            }
            _ => Err(anyhow!(AcpiError::InvalidArgument(format!(
                "cannot create {:?} object with name {:?}",
                opcode, name
            )))),
        }
    }

    /// Create a detached `Name (name, value)` node, taking ownership of `value`.
    ///
    /// `value` must be a detached `Buffer` object node or `Raw` data node.
    pub fn create_name_node(&mut self, name: &str, value: NodeId) -> Result<NodeId> {
        self.check_detached(value)?;
        self.check_name_value(value)?;

        let name_node = self.create_name_string_node(name, false)?;
        let object = self
            .alloc(NodeKind::Object {
                opcode: AmlOpCode::Name,
                fixed_args: vec![name_node, value],
                children: Vec::new(),
            })
            .map_err(|e| {
                self.release(name_node);
                e
            })?;
        self.set_parent(name_node, Some(object))?;
        self.set_parent(value, Some(object))?;
        Ok(object)
    }

    fn check_name_value(&self, value: NodeId) -> Result<()> {
        match &self.get(value)?.kind {
            NodeKind::Object {
                opcode: AmlOpCode::Buffer,
                ..
            }
            | NodeKind::Data {
                data_type: AmlDataType::Raw,
                ..
            } => Ok(()),
            _ => Err(invalid_state(format!(
                "node {} cannot be the value of a Name",
                value
            ))),
        }
    }

    fn check_detached(&self, id: NodeId) -> Result<()> {
        match self.get(id)?.parent {
            None => Ok(()),
            Some(parent) => Err(invalid_state(format!(
                "node {} is already attached to {}",
                id, parent
            ))),
        }
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(node) = cur {
            if node == ancestor {
                return true;
            }
            cur = self.get(node).ok().and_then(|n| n.parent);
        }
        false
    }

    /// Check `node` may become a variable argument of `parent`.
    fn check_attachable(&self, parent: NodeId, node: NodeId) -> Result<()> {
        self.check_detached(node)?;
        if self.is_ancestor(node, parent) {
            return Err(invalid_state(format!(
                "attaching {} under {} would create a cycle",
                node, parent
            )));
        }

        let node_kind = &self.get(node)?.kind;
        match (&self.get(parent)?.kind, node_kind) {
            (
                NodeKind::Object {
                    opcode: AmlOpCode::Buffer,
                    ..
                },
                NodeKind::Data {
                    data_type: AmlDataType::ResourceData,
                    ..
                },
            ) => Ok(()),
            (
                NodeKind::Object {
                    opcode: AmlOpCode::Scope | AmlOpCode::Device,
                    ..
                },
                NodeKind::Object { .. },
            ) => Ok(()),
            (NodeKind::Object { opcode, .. }, _) => Err(invalid_state(format!(
                "node {} cannot be a child of {:?} node {}",
                node, opcode, parent
            ))),
            (NodeKind::Data { .. }, _) => Err(invalid_state(format!(
                "data node {} cannot have children",
                parent
            ))),
        }
    }

    fn children_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Object { children, .. } => Ok(children),
            NodeKind::Data { .. } => Err(invalid_state(format!(
                "data node {} cannot have children",
                id
            ))),
        }
    }

    /// Attach the detached `node` as the last variable argument of `parent`.
    ///
    /// For a `Buffer` parent the node must be a resource data node and goes
    /// right before the End Tag, if any. For `Scope` and `Device` parents the
    /// node must be an object node.
    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        if self.opcode(parent)? == Some(AmlOpCode::Buffer) {
            return self.append_rd_node(parent, node);
        }

        self.check_attachable(parent, node)?;
        self.children_mut(parent)?.push(node);
        self.set_parent(node, Some(parent))
    }

    /// Add `rd_node` as the last resource data element of `buffer`, before
    /// the End Tag. If the buffer has no End Tag yet, the node is appended and
    /// the End Tag is left to whoever builds the template.
    pub fn append_rd_node(&mut self, buffer: NodeId, rd_node: NodeId) -> Result<()> {
        if self.opcode(buffer)? != Some(AmlOpCode::Buffer) {
            return Err(invalid_state(format!(
                "node {} is not a Buffer object",
                buffer
            )));
        }
        self.check_attachable(buffer, rd_node)?;

        let end_tag = self.find_end_tag(buffer)?;
        if end_tag.is_some() && self.is_end_tag_node(rd_node) {
            return Err(invalid_state(format!(
                "buffer {} already ends with an End Tag",
                buffer
            )));
        }

        let children = self.children_mut(buffer)?;
        match end_tag {
            Some(_) => {
                let pos = children.len() - 1;
                children.insert(pos, rd_node);
            }
            None => children.push(rd_node),
        }
        self.set_parent(rd_node, Some(buffer))
    }

    fn is_end_tag_node(&self, id: NodeId) -> bool {
        matches!(
            self.get(id).map(|n| &n.kind),
            Ok(NodeKind::Data {
                data_type: AmlDataType::ResourceData,
                buffer,
            }) if is_end_tag(buffer)
        )
    }

    /// Find the End Tag closing the resource data list of `buffer`.
    pub fn find_end_tag(&self, buffer: NodeId) -> Result<Option<NodeId>> {
        if self.opcode(buffer)? != Some(AmlOpCode::Buffer) {
            return Err(invalid_state(format!(
                "node {} is not a Buffer object",
                buffer
            )));
        }

        Ok(self
            .children(buffer)?
            .last()
            .copied()
            .filter(|last| self.is_end_tag_node(*last)))
    }

    /// Detach `node` from its parent. The node is then owned by the caller.
    pub fn remove_child(&mut self, node: NodeId) -> Result<()> {
        let parent = self
            .get(node)?
            .parent
            .ok_or_else(|| invalid_state(format!("node {} is not attached", node)))?;

        let children = self.children_mut(parent)?;
        let pos = children.iter().position(|c| *c == node).ok_or_else(|| {
            invalid_state(format!(
                "node {} is a fixed argument of {}, replace it instead",
                node, parent
            ))
        })?;
        children.remove(pos);
        self.set_parent(node, None)
    }

    /// Put the detached `new` at the position of `old`. `old` is detached and
    /// returned to the caller.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let parent = self
            .get(old)?
            .parent
            .ok_or_else(|| invalid_state(format!("node {} is not attached", old)))?;
        self.check_detached(new)?;

        let (fixed_pos, child_pos) = match &self.get(parent)?.kind {
            NodeKind::Object {
                fixed_args,
                children,
                ..
            } => (
                fixed_args.iter().position(|c| *c == old),
                children.iter().position(|c| *c == old),
            ),
            NodeKind::Data { .. } => (None, None),
        };

        if let Some(pos) = fixed_pos {
            self.check_fixed_arg(parent, pos, new)?;
            if let NodeKind::Object { fixed_args, .. } = &mut self.get_mut(parent)?.kind {
                fixed_args[pos] = new;
            }
        } else if let Some(pos) = child_pos {
            self.check_attachable(parent, new)?;
            if self.opcode(parent)? == Some(AmlOpCode::Buffer)
                && self.is_end_tag_node(old) != self.is_end_tag_node(new)
            {
                return Err(invalid_state(
                    "End Tag can only be replaced by another End Tag".to_string(),
                ));
            }
            self.children_mut(parent)?[pos] = new;
        } else {
            return Err(invalid_state(format!(
                "node {} is not linked from its parent {}",
                old, parent
            )));
        }

        self.set_parent(old, None)?;
        self.set_parent(new, Some(parent))
    }

    fn check_fixed_arg(&self, parent: NodeId, pos: usize, new: NodeId) -> Result<()> {
        if self.is_ancestor(new, parent) {
            return Err(invalid_state(format!(
                "replacing with {} under {} would create a cycle",
                new, parent
            )));
        }
        if pos == AML_FIXED_ARG_VALUE {
            return self.check_name_value(new);
        }
        match self.data_type(new)? {
            Some(AmlDataType::NameString) => Ok(()),
            _ => Err(invalid_state(format!(
                "node {} is not a NameString",
                new
            ))),
        }
    }

    /// Free the detached `node` and its whole subtree.
    pub fn delete_tree(&mut self, node: NodeId) -> Result<()> {
        self.check_detached(node)?;

        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Ok(AmlNode {
                kind:
                    NodeKind::Object {
                        fixed_args,
                        children,
                        ..
                    },
                ..
            }) = self.get(id)
            {
                stack.extend(fixed_args.iter().chain(children.iter()));
            }
            self.release(id);
        }
        Ok(())
    }

    /// Opcode of `id`, `None` for data nodes.
    pub fn opcode(&self, id: NodeId) -> Result<Option<AmlOpCode>> {
        Ok(match &self.get(id)?.kind {
            NodeKind::Object { opcode, .. } => Some(*opcode),
            NodeKind::Data { .. } => None,
        })
    }

    /// Whether `id` is a live object node with the given opcode.
    pub fn has_opcode(&self, id: NodeId, opcode: AmlOpCode) -> bool {
        matches!(self.opcode(id), Ok(Some(op)) if op == opcode)
    }

    /// Data type of `id`, `None` for object nodes.
    pub fn data_type(&self, id: NodeId) -> Result<Option<AmlDataType>> {
        Ok(match &self.get(id)?.kind {
            NodeKind::Data { data_type, .. } => Some(*data_type),
            NodeKind::Object { .. } => None,
        })
    }

    /// Bytes held by a data node, `None` for object nodes.
    pub fn data(&self, id: NodeId) -> Result<Option<&[u8]>> {
        Ok(match &self.get(id)?.kind {
            NodeKind::Data { buffer, .. } => Some(buffer.as_slice()),
            NodeKind::Object { .. } => None,
        })
    }

    /// Variable arguments of `id`, empty for data nodes.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(match &self.get(id)?.kind {
            NodeKind::Object { children, .. } => children.as_slice(),
            NodeKind::Data { .. } => &[],
        })
    }

    pub fn fixed_argument(&self, id: NodeId, index: usize) -> Result<Option<NodeId>> {
        Ok(match &self.get(id)?.kind {
            NodeKind::Object { fixed_args, .. } => fixed_args.get(index).copied(),
            NodeKind::Data { .. } => None,
        })
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn node(&self, id: NodeId) -> Result<AmlNodeRef<'_>> {
        self.get(id)?;
        Ok(AmlNodeRef { tree: self, id })
    }

    /// Encode `id` and its subtree to AML.
    pub fn serialize(&self, id: NodeId) -> Result<Vec<u8>> {
        Ok(self.node(id)?.aml_bytes())
    }

    fn encode_all(&self, ids: &[NodeId], out: &mut Vec<u8>) {
        for id in ids {
            self.encode(*id, out);
        }
    }

    fn encode_fixed_arg(&self, fixed_args: &[NodeId], index: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        if let Some(id) = fixed_args.get(index) {
            self.encode(*id, &mut bytes);
        }
        bytes
    }

    fn build_scope<S: AmlScopeBuilder>(&self, mut scope: S, children: &[NodeId]) -> Vec<u8> {
        for id in children {
            scope.append_child(AmlNodeRef {
                tree: self,
                id: *id,
            });
        }
        scope.aml_bytes()
    }

    fn encode(&self, id: NodeId, out: &mut Vec<u8>) {
        let node = match self.get(id) {
            Ok(node) => node,
            Err(_) => return,
        };

        match &node.kind {
            NodeKind::Data { buffer, .. } => out.extend(buffer),
            NodeKind::Object {
                opcode: AmlOpCode::Name,
                fixed_args,
                ..
            } => {
                let name = self.encode_fixed_arg(fixed_args, AML_FIXED_ARG_NAME);
                let value = self.encode_fixed_arg(fixed_args, AML_FIXED_ARG_VALUE);
                out.extend(AmlNameDecl::from_encoded(name, value).aml_bytes());
            }
            NodeKind::Object {
                opcode: AmlOpCode::Buffer,
                children,
                ..
            } => {
                let mut bytes = Vec::new();
                self.encode_all(children, &mut bytes);
                out.extend(AmlBuffer(bytes).aml_bytes());
            }
            NodeKind::Object {
                opcode,
                fixed_args,
                children,
            } => {
                let name = self.encode_fixed_arg(fixed_args, AML_FIXED_ARG_NAME);
                let bytes = if *opcode == AmlOpCode::Device {
                    self.build_scope(AmlDevice::from_encoded(name), children)
                } else {
                    self.build_scope(AmlScope::from_encoded(name), children)
                };
                out.extend(bytes);
            }
        }
    }
}
