// Copyright (c) 2020 Huawei Technologies Co.,Ltd. All rights reserved.
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

pub mod acpi_helper;
pub mod acpi_table;
pub mod aml_compiler;
pub mod aml_tree;
pub mod code_gen;
pub mod config_manager;
pub mod error;
pub mod fadt;
pub mod platform_repo;
pub mod resource_data;

pub use acpi_table::*;
pub use aml_compiler::*;
pub use aml_tree::{AmlDataType, AmlNodeRef, AmlOpCode, AmlTree, NodeId};
pub use code_gen::*;
pub use config_manager::{
    get_object_list, get_single_object, ArchCommonObjectId, CmObject, CmObjectDescriptor,
    CmObjectToken, ConfigurationManager, CM_NULL_TOKEN,
};
pub use error::AcpiError;
pub use fadt::fadt_arch_update;
pub use platform_repo::{PlatformConfig, PlatformRepository};
pub use resource_data::{
    encode_extended_interrupt, AmlActiveLevel, AmlEdgeLevel, AmlEndTag, AmlExtendedInterrupt,
    AmlIntShare, AmlResourceUsage,
};
