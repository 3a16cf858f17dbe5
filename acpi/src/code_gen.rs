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

//! Code generation of ASL statements into an [`AmlTree`].
//!
//! Every generator checks its arguments before touching the tree. A generator
//! that fails leaves the tree as it found it.

use anyhow::{anyhow, Context, Result};
use log::{debug, error};

use crate::acpi_helper::{is_valid_acpi_id, is_valid_pnp_id};
use crate::aml_compiler::{AmlBuilder, AmlEisaId, AmlInteger, AmlString};
use crate::aml_tree::{AmlDataType, AmlOpCode, AmlTree, NodeId, AML_FIXED_ARG_VALUE};
use crate::resource_data::{
    encode_extended_interrupt, AmlActiveLevel, AmlEdgeLevel, AmlEndTag, AmlIntShare,
    AmlResourceUsage,
};
use crate::AcpiError;

fn delete_or_log(tree: &mut AmlTree, node: NodeId) {
    if let Err(e) = tree.delete_tree(node) {
        error!("Failed to free AML node {}: {:?}", node, e);
    }
}

/// Attach `node` to `parent` if one is given. `node` is freed on failure.
fn attach_or_delete(tree: &mut AmlTree, node: NodeId, parent: Option<NodeId>) -> Result<NodeId> {
    if let Some(parent) = parent {
        if let Err(e) = tree.append_child(parent, node) {
            delete_or_log(tree, node);
            return Err(e);
        }
    }
    Ok(node)
}

fn check_parent(tree: &AmlTree, parent: Option<NodeId>) -> Result<()> {
    match parent {
        Some(parent)
            if !tree.has_opcode(parent, AmlOpCode::Scope)
                && !tree.has_opcode(parent, AmlOpCode::Device) =>
        {
            Err(anyhow!(AcpiError::InvalidParameter(format!(
                "node {} is neither a Scope nor a Device",
                parent
            ))))
        }
        _ => Ok(()),
    }
}

/// Get the `Buffer` holding the resource data list of `Name (X, ResourceTemplate () {..})`.
fn resource_template_buffer(tree: &AmlTree, name_op: NodeId) -> Result<NodeId> {
    if !tree.has_opcode(name_op, AmlOpCode::Name) {
        return Err(anyhow!(AcpiError::InvalidParameter(format!(
            "node {} is not a Name object",
            name_op
        ))));
    }

    match tree.fixed_argument(name_op, AML_FIXED_ARG_VALUE)? {
        Some(buffer) if tree.has_opcode(buffer, AmlOpCode::Buffer) => Ok(buffer),
        _ => Err(anyhow!(AcpiError::InvalidParameter(format!(
            "Name object {} does not hold a resource template",
            name_op
        )))),
    }
}

/// Append the freshly created `rd_node` to the resource template of `name_op`.
///
/// Nothing is spliced when `name_op` is `None`. On failure `rd_node` is freed.
pub fn link_rd_node(tree: &mut AmlTree, rd_node: NodeId, name_op: Option<NodeId>) -> Result<()> {
    let name_op = match name_op {
        Some(name_op) => name_op,
        None => return Ok(()),
    };

    let res = resource_template_buffer(tree, name_op)
        .and_then(|buffer| tree.append_rd_node(buffer, rd_node));
    if let Err(e) = res {
        delete_or_log(tree, rd_node);
        return Err(e);
    }
    Ok(())
}

/// Code generation for the `Interrupt ()` ASL macro, which produces an
/// Extended Interrupt Descriptor.
///
/// # Arguments
///
/// * `tree` - Tree the descriptor node is created in.
/// * `resource_usage` - The device consumes the interrupts or produces them for a child.
/// * `edge_level` - Edge or level triggered.
/// * `active_level` - Active high or active low.
/// * `share` - Exclusive or shared with other devices.
/// * `irq_list` - Interrupt numbers, 1 to 255 entries.
/// * `name_op` - If given, a `Name (X, ResourceTemplate () {..})` node. The new
///   descriptor is appended to its list, before the End Tag.
///
/// Returns the descriptor node. It is owned by `name_op` if given, otherwise
/// by the caller.
pub fn code_gen_rd_interrupt(
    tree: &mut AmlTree,
    resource_usage: AmlResourceUsage,
    edge_level: AmlEdgeLevel,
    active_level: AmlActiveLevel,
    share: AmlIntShare,
    irq_list: &[u32],
    name_op: Option<NodeId>,
) -> Result<NodeId> {
    let count = u8::try_from(irq_list.len())
        .ok()
        .filter(|count| *count != 0)
        .ok_or_else(|| {
            anyhow!(AcpiError::InvalidParameter(format!(
                "{} interrupts, expected 1 to {}",
                irq_list.len(),
                u8::MAX
            )))
        })?;
    if let Some(name_op) = name_op {
        resource_template_buffer(tree, name_op)?;
    }

    let bytes = encode_extended_interrupt(
        resource_usage,
        edge_level,
        active_level,
        share,
        irq_list,
        count,
    )
    .with_context(|| format!("Failed to encode interrupts {:?}", irq_list))?;
    let rd_node = tree.create_data_node(AmlDataType::ResourceData, &bytes)?;
    link_rd_node(tree, rd_node, name_op)?;

    debug!("Generated Interrupt descriptor {} for {:?}", rd_node, irq_list);
    Ok(rd_node)
}

/// Add an `Interrupt ()` descriptor to the resource template of a `_CRS`
/// object declared with `Name (_CRS, ResourceTemplate () {..})`.
pub fn code_gen_crs_add_rd_interrupt(
    tree: &mut AmlTree,
    name_op_crs: NodeId,
    resource_usage: AmlResourceUsage,
    edge_level: AmlEdgeLevel,
    active_level: AmlActiveLevel,
    share: AmlIntShare,
    irq_list: &[u32],
) -> Result<()> {
    code_gen_rd_interrupt(
        tree,
        resource_usage,
        edge_level,
        active_level,
        share,
        irq_list,
        Some(name_op_crs),
    )?;
    Ok(())
}

/// Generate `Name (name, ResourceTemplate () {})`, holding only the End Tag.
pub fn code_gen_name_resource_template(
    tree: &mut AmlTree,
    name: &str,
    parent: Option<NodeId>,
) -> Result<NodeId> {
    check_parent(tree, parent)?;

    let buffer = tree.create_object_node(AmlOpCode::Buffer, None)?;
    let res = tree
        .create_data_node(AmlDataType::ResourceData, &AmlEndTag.aml_bytes())
        .and_then(|end_tag| {
            tree.append_child(buffer, end_tag).map_err(|e| {
                delete_or_log(tree, end_tag);
                e
            })
        })
        .and_then(|_| tree.create_name_node(name, buffer));
    match res {
        Ok(name_op) => attach_or_delete(tree, name_op, parent),
        Err(e) => {
            delete_or_log(tree, buffer);
            Err(e)
        }
    }
}

fn code_gen_name_raw(
    tree: &mut AmlTree,
    name: &str,
    raw: &[u8],
    parent: Option<NodeId>,
) -> Result<NodeId> {
    check_parent(tree, parent)?;

    let value = tree.create_data_node(AmlDataType::Raw, raw)?;
    let name_op = match tree.create_name_node(name, value) {
        Ok(name_op) => name_op,
        Err(e) => {
            delete_or_log(tree, value);
            return Err(e);
        }
    };
    attach_or_delete(tree, name_op, parent)
}

/// Generate `Name (name, value)` for an integer value.
pub fn code_gen_name_integer(
    tree: &mut AmlTree,
    name: &str,
    value: u64,
    parent: Option<NodeId>,
) -> Result<NodeId> {
    code_gen_name_raw(tree, name, &AmlInteger(value).aml_bytes(), parent)
}

/// Generate `Name (name, "value")`.
pub fn code_gen_name_string(
    tree: &mut AmlTree,
    name: &str,
    value: &str,
    parent: Option<NodeId>,
) -> Result<NodeId> {
    if !value.is_ascii() || value.contains('\0') {
        return Err(anyhow!(AcpiError::InvalidParameter(format!(
            "\"{}\" is not a printable AML string",
            value
        ))));
    }
    code_gen_name_raw(tree, name, &AmlString(value.to_string()).aml_bytes(), parent)
}

/// Generate `Name (_HID, ..)`. A PNP ID is compressed with `EisaId ()`, an
/// ACPI ID is kept as a string.
pub fn code_gen_name_hid(tree: &mut AmlTree, hid: &str, parent: Option<NodeId>) -> Result<NodeId> {
    let raw = if is_valid_pnp_id(hid) {
        AmlEisaId::new(hid)?.aml_bytes()
    } else if is_valid_acpi_id(hid) {
        AmlString(hid.to_string()).aml_bytes()
    } else {
        return Err(anyhow!(AcpiError::InvalidParameter(format!(
            "\"{}\" is neither a PNP ID nor an ACPI ID",
            hid
        ))));
    };
    code_gen_name_raw(tree, "_HID", &raw, parent)
}

/// Generate `Scope (name) {}`.
pub fn code_gen_scope(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
    check_parent(tree, parent)?;
    let scope = tree.create_object_node(AmlOpCode::Scope, Some(name))?;
    attach_or_delete(tree, scope, parent)
}

/// Generate `Device (name) {}`.
pub fn code_gen_device(tree: &mut AmlTree, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
    check_parent(tree, parent)?;
    let device = tree.create_object_node(AmlOpCode::Device, Some(name))?;
    attach_or_delete(tree, device, parent)
}

#[cfg(test)]
mod test {
    use super::*;

    fn crs_template(tree: &mut AmlTree) -> NodeId {
        code_gen_name_resource_template(tree, "_CRS", None).unwrap()
    }

    fn gen_interrupt(tree: &mut AmlTree, irqs: &[u32], name_op: Option<NodeId>) -> Result<NodeId> {
        code_gen_rd_interrupt(
            tree,
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Level,
            AmlActiveLevel::Low,
            AmlIntShare::Exclusive,
            irqs,
            name_op,
        )
    }

    fn assert_invalid_parameter(err: anyhow::Error) {
        assert!(
            matches!(
                err.downcast_ref::<AcpiError>(),
                Some(AcpiError::InvalidParameter(_))
            ),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_rd_interrupt_standalone() {
        let mut tree = AmlTree::new();
        let rd = gen_interrupt(&mut tree, &[0x29], None).unwrap();

        assert_eq!(tree.parent(rd).unwrap(), None);
        assert_eq!(
            tree.data(rd).unwrap().unwrap(),
            &[0x89, 0x06, 0x00, 0x05, 0x01, 0x29, 0x00, 0x00, 0x00]
        );
        tree.delete_tree(rd).unwrap();
        assert_eq!(tree.live_nodes(), 0);
    }

    #[test]
    fn test_rd_interrupt_idempotent() {
        let mut tree1 = AmlTree::new();
        let mut tree2 = AmlTree::new();
        let irqs = [0x10, 0x20, 0x30];
        let rd1 = gen_interrupt(&mut tree1, &irqs, None).unwrap();
        let rd2 = gen_interrupt(&mut tree2, &irqs, None).unwrap();

        assert_eq!(tree1.data(rd1).unwrap(), tree2.data(rd2).unwrap());
        assert_eq!(tree1.serialize(rd1).unwrap(), tree2.serialize(rd2).unwrap());
    }

    #[test]
    fn test_rd_interrupt_order() {
        let mut tree = AmlTree::new();
        let crs = crs_template(&mut tree);
        let buffer = tree.fixed_argument(crs, AML_FIXED_ARG_VALUE).unwrap().unwrap();
        let end_tag = tree.find_end_tag(buffer).unwrap().unwrap();

        let d1 = gen_interrupt(&mut tree, &[0x21], Some(crs)).unwrap();
        let d2 = gen_interrupt(&mut tree, &[0x22], Some(crs)).unwrap();
        assert_eq!(tree.children(buffer).unwrap(), &[d1, d2, end_tag]);
        assert_eq!(tree.parent(d2).unwrap(), Some(buffer));
    }

    #[test]
    fn test_rd_interrupt_rejected() {
        let mut tree = AmlTree::new();
        let crs = crs_template(&mut tree);
        let uid = code_gen_name_integer(&mut tree, "_UID", 0, None).unwrap();
        let device = code_gen_device(&mut tree, "COM0", None).unwrap();
        let before = tree.serialize(crs).unwrap();
        let live = tree.live_nodes();

        assert_invalid_parameter(gen_interrupt(&mut tree, &[], Some(crs)).unwrap_err());
        assert_invalid_parameter(gen_interrupt(&mut tree, &[0; 256], Some(crs)).unwrap_err());
        assert_invalid_parameter(gen_interrupt(&mut tree, &[0x29], Some(uid)).unwrap_err());
        assert_invalid_parameter(gen_interrupt(&mut tree, &[0x29], Some(device)).unwrap_err());

        assert_eq!(tree.live_nodes(), live);
        assert_eq!(tree.serialize(crs).unwrap(), before);

        // A full list of 255 interrupts is still accepted.
        gen_interrupt(&mut tree, &[0; 255], Some(crs)).unwrap();
    }

    #[test]
    fn test_link_rd_node_frees_on_error() {
        let mut tree = AmlTree::new();
        let device = code_gen_device(&mut tree, "COM0", None).unwrap();
        let rd = tree
            .create_data_node(AmlDataType::ResourceData, &AmlEndTag.aml_bytes())
            .unwrap();

        assert_invalid_parameter(link_rd_node(&mut tree, rd, Some(device)).unwrap_err());
        assert!(!tree.contains(rd));

        let rd = tree
            .create_data_node(AmlDataType::ResourceData, &AmlEndTag.aml_bytes())
            .unwrap();
        link_rd_node(&mut tree, rd, None).unwrap();
        assert_eq!(tree.parent(rd).unwrap(), None);
    }

    #[test]
    fn test_crs_serialize() {
        // Name (_CRS, ResourceTemplate () {
        //     Interrupt (ResourceConsumer, Level, ActiveLow, Exclusive) { 0x29 }
        // })
        let mut tree = AmlTree::new();
        let crs = crs_template(&mut tree);
        assert_eq!(
            tree.serialize(crs).unwrap(),
            vec![0x08, 0x5F, 0x43, 0x52, 0x53, 0x11, 0x05, 0x0A, 0x02, 0x79, 0x00]
        );

        code_gen_crs_add_rd_interrupt(
            &mut tree,
            crs,
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Level,
            AmlActiveLevel::Low,
            AmlIntShare::Exclusive,
            &[0x29],
        )
        .unwrap();
        assert_eq!(
            tree.serialize(crs).unwrap(),
            vec![
                0x08, 0x5F, 0x43, 0x52, 0x53, 0x11, 0x0E, 0x0A, 0x0B, 0x89, 0x06, 0x00, 0x05,
                0x01, 0x29, 0x00, 0x00, 0x00, 0x79, 0x00
            ]
        );
    }

    #[test]
    fn test_name_hid() {
        let mut tree = AmlTree::new();
        let pnp = code_gen_name_hid(&mut tree, "PNP0501", None).unwrap();
        assert_eq!(
            tree.serialize(pnp).unwrap(),
            vec![0x08, 0x5F, 0x48, 0x49, 0x44, 0x0C, 0x41, 0xD0, 0x05, 0x01]
        );

        let acpi = code_gen_name_hid(&mut tree, "ARMH0011", None).unwrap();
        let mut expected = vec![0x08, 0x5F, 0x48, 0x49, 0x44, 0x0D];
        expected.extend(b"ARMH0011");
        expected.push(0x00);
        assert_eq!(tree.serialize(acpi).unwrap(), expected);

        let live = tree.live_nodes();
        assert_invalid_parameter(code_gen_name_hid(&mut tree, "pnp0501", None).unwrap_err());
        assert_invalid_parameter(code_gen_name_hid(&mut tree, "ARMH001", None).unwrap_err());
        assert_eq!(tree.live_nodes(), live);
    }

    #[test]
    fn test_device_tree() {
        let mut tree = AmlTree::new();
        let sb = code_gen_scope(&mut tree, "\\_SB", None).unwrap();
        let dev = code_gen_device(&mut tree, "COM0", Some(sb)).unwrap();
        code_gen_name_hid(&mut tree, "ARMH0011", Some(dev)).unwrap();
        let uid = code_gen_name_integer(&mut tree, "_UID", 0, Some(dev)).unwrap();
        let crs = code_gen_name_resource_template(&mut tree, "_CRS", Some(dev)).unwrap();
        gen_interrupt(&mut tree, &[0x21], Some(crs)).unwrap();

        assert_eq!(tree.parent(dev).unwrap(), Some(sb));
        assert_eq!(tree.children(dev).unwrap().len(), 3);
        assert_eq!(tree.children(dev).unwrap()[1], uid);

        // Names only go into scopes and devices, and a failed attach frees
        // the generated node.
        let live = tree.live_nodes();
        assert_invalid_parameter(
            code_gen_name_string(&mut tree, "_STR", "uart", Some(crs)).unwrap_err(),
        );
        assert!(code_gen_name_integer(&mut tree, "TOOLONG", 1, Some(dev)).is_err());
        assert_eq!(tree.live_nodes(), live);

        let bytes = tree.serialize(sb).unwrap();
        assert_eq!(&bytes[..2], &[0x10, bytes.len() as u8 - 1]);
        assert_eq!(&bytes[2..6], &[0x5C, 0x5F, 0x53, 0x42]);
    }

    #[test]
    fn test_unnamed_objects_rejected() {
        let mut tree = AmlTree::new();
        let sb = code_gen_scope(&mut tree, "\\_SB", None).unwrap();
        let live = tree.live_nodes();

        for name in ["", "^", "\\"] {
            let err = code_gen_name_integer(&mut tree, name, 1, Some(sb)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<AcpiError>(),
                Some(AcpiError::InvalidArgument(_))
            ));
        }
        assert!(code_gen_device(&mut tree, "\\", Some(sb)).is_err());
        assert!(code_gen_device(&mut tree, "^", None).is_err());
        assert!(code_gen_name_resource_template(&mut tree, "", Some(sb)).is_err());
        assert_eq!(tree.live_nodes(), live);
        assert!(tree.children(sb).unwrap().is_empty());

        // The root may still be opened as a scope.
        let root = code_gen_scope(&mut tree, "\\", None).unwrap();
        assert_eq!(tree.serialize(root).unwrap(), vec![0x10, 0x03, 0x5C, 0x00]);
    }
}
