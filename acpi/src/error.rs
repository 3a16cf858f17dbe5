// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
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

use thiserror::Error;

use crate::aml_tree::NodeId;
use crate::config_manager::ArchCommonObjectId;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AcpiError {
    #[error("Invalid argument: {0}.")]
    InvalidArgument(String),
    #[error("Invalid parameter: {0}.")]
    InvalidParameter(String),
    #[error("Failed to reserve {0} bytes for AML node.")]
    OutOfResources(usize),
    #[error("Invalid state: {0}.")]
    InvalidState(String),
    #[error("AML node {0} does not exist or has been deleted.")]
    InvalidNode(NodeId),
    #[error("Configuration manager object {0:?} not found.")]
    NotFound(ArchCommonObjectId),
    #[error("Configuration manager object {0:?}: buffer size {1} mismatches object size {2}.")]
    BufferSizeMismatch(ArchCommonObjectId, usize, usize),
}
