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

//! Interface to the platform configuration manager, which describes the
//! hardware the tables are generated for.

use std::mem::size_of;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use util::byte_code::ByteCode;

use crate::acpi_table::AcpiGenericAddress;
use crate::AcpiError;

/// Kinds of architecture common records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchCommonObjectId {
    FadtSciInterrupt,
    FadtSciCmdInfo,
    FadtPmBlockInfo,
    FadtGpeBlockInfo,
    FadtXpmBlockInfo,
    FadtMiscInfo,
    FadtXgpeBlockInfo,
    FadtSleepBlockInfo,
    FadtResetBlockInfo,
}

/// Token referencing a group of records.
pub type CmObjectToken = u64;
/// Token asking for every record of a kind.
pub const CM_NULL_TOKEN: CmObjectToken = 0;

/// Records returned by a configuration manager query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmObjectDescriptor {
    pub object_id: ArchCommonObjectId,
    /// Records laid out back to back.
    pub data: Vec<u8>,
    /// Number of records in `data`.
    pub count: u32,
}

pub trait ConfigurationManager {
    /// Look up the records of kind `id` referenced by `token`.
    fn get_object(&self, id: ArchCommonObjectId, token: CmObjectToken)
        -> Result<CmObjectDescriptor>;
}

/// A record with a fixed binary layout, stored in the configuration manager.
pub trait CmObject: ByteCode {
    const OBJECT_ID: ArchCommonObjectId;
}

macro_rules! cm_object_define {
    ($name: ident, $id: ident) => {
        impl ByteCode for $name {}

        impl CmObject for $name {
            const OBJECT_ID: ArchCommonObjectId = ArchCommonObjectId::$id;
        }
    };
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtSciInterrupt {
    pub sci_interrupt: u16,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtSciCmdInfo {
    pub sci_cmd: u32,
    pub acpi_enable: u8,
    pub acpi_disable: u8,
    pub s4bios_req: u8,
    pub pstate_cnt: u8,
    pub cst_cnt: u8,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtPmBlockInfo {
    pub pm1a_evt_blk: u32,
    pub pm1b_evt_blk: u32,
    pub pm1a_cnt_blk: u32,
    pub pm1b_cnt_blk: u32,
    pub pm2_cnt_blk: u32,
    pub pm_tmr_blk: u32,
    pub pm1_evt_len: u8,
    pub pm1_cnt_len: u8,
    pub pm2_cnt_len: u8,
    pub pm_tmr_len: u8,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtGpeBlockInfo {
    pub gpe0_blk: u32,
    pub gpe1_blk: u32,
    pub gpe0_blk_len: u8,
    pub gpe1_blk_len: u8,
    pub gpe1_base: u8,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtXpmBlockInfo {
    pub x_pm1a_evt_blk: AcpiGenericAddress,
    pub x_pm1b_evt_blk: AcpiGenericAddress,
    pub x_pm1a_cnt_blk: AcpiGenericAddress,
    pub x_pm1b_cnt_blk: AcpiGenericAddress,
    pub x_pm2_cnt_blk: AcpiGenericAddress,
    pub x_pm_tmr_blk: AcpiGenericAddress,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtXgpeBlockInfo {
    pub x_gpe0_blk: AcpiGenericAddress,
    pub x_gpe1_blk: AcpiGenericAddress,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtSleepBlockInfo {
    pub sleep_control_reg: AcpiGenericAddress,
    pub sleep_status_reg: AcpiGenericAddress,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtResetBlockInfo {
    pub reset_reg: AcpiGenericAddress,
    pub reset_value: u8,
}

#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmFadtMiscInfo {
    pub p_lvl2_lat: u16,
    pub p_lvl3_lat: u16,
    pub flush_size: u16,
    pub flush_stride: u16,
    pub duty_offset: u8,
    pub duty_width: u8,
    pub day_alrm: u8,
    pub mon_alrm: u8,
    pub century: u8,
}

cm_object_define!(CmFadtSciInterrupt, FadtSciInterrupt);
cm_object_define!(CmFadtSciCmdInfo, FadtSciCmdInfo);
cm_object_define!(CmFadtPmBlockInfo, FadtPmBlockInfo);
cm_object_define!(CmFadtGpeBlockInfo, FadtGpeBlockInfo);
cm_object_define!(CmFadtXpmBlockInfo, FadtXpmBlockInfo);
cm_object_define!(CmFadtXgpeBlockInfo, FadtXgpeBlockInfo);
cm_object_define!(CmFadtSleepBlockInfo, FadtSleepBlockInfo);
cm_object_define!(CmFadtResetBlockInfo, FadtResetBlockInfo);
cm_object_define!(CmFadtMiscInfo, FadtMiscInfo);

/// Get the records of type `T` referenced by `token`.
///
/// Fails with `BufferSizeMismatch` if the returned data cannot hold `count`
/// records of `T`.
pub fn get_object_list<T: CmObject>(
    cm: &dyn ConfigurationManager,
    token: CmObjectToken,
) -> Result<Vec<T>> {
    let desc = cm.get_object(T::OBJECT_ID, token)?;
    if desc.object_id != T::OBJECT_ID {
        return Err(anyhow!(AcpiError::InvalidParameter(format!(
            "asked for {:?}, got {:?}",
            T::OBJECT_ID,
            desc.object_id
        ))));
    }

    let obj_size = size_of::<T>();
    let size_mismatch = || {
        anyhow!(AcpiError::BufferSizeMismatch(
            T::OBJECT_ID,
            desc.data.len(),
            obj_size
        ))
    };
    let expected = (desc.count as usize)
        .checked_mul(obj_size)
        .ok_or_else(size_mismatch)?;
    if desc.data.len() % obj_size != 0 || desc.data.len() < expected {
        return Err(size_mismatch());
    }

    T::vec_from_slice(&desc.data[..expected]).ok_or_else(size_mismatch)
}

/// Get the first record of type `T` referenced by `token`.
pub fn get_single_object<T: CmObject>(
    cm: &dyn ConfigurationManager,
    token: CmObjectToken,
) -> Result<T> {
    get_object_list::<T>(cm, token)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!(AcpiError::NotFound(T::OBJECT_ID)))
}

#[cfg(test)]
mod test {
    use super::*;

    struct RawCm {
        object_id: ArchCommonObjectId,
        data: Vec<u8>,
        count: u32,
    }

    impl ConfigurationManager for RawCm {
        fn get_object(
            &self,
            id: ArchCommonObjectId,
            _token: CmObjectToken,
        ) -> Result<CmObjectDescriptor> {
            if id != self.object_id {
                return Err(anyhow!(AcpiError::NotFound(id)));
            }
            Ok(CmObjectDescriptor {
                object_id: self.object_id,
                data: self.data.clone(),
                count: self.count,
            })
        }
    }

    fn err_of<T: std::fmt::Debug>(res: Result<T>) -> AcpiError {
        res.unwrap_err().downcast::<AcpiError>().unwrap()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of::<CmFadtSciInterrupt>(), 2);
        assert_eq!(size_of::<CmFadtSciCmdInfo>(), 9);
        assert_eq!(size_of::<CmFadtPmBlockInfo>(), 28);
        assert_eq!(size_of::<CmFadtGpeBlockInfo>(), 11);
        assert_eq!(size_of::<CmFadtXpmBlockInfo>(), 72);
        assert_eq!(size_of::<CmFadtXgpeBlockInfo>(), 24);
        assert_eq!(size_of::<CmFadtSleepBlockInfo>(), 24);
        assert_eq!(size_of::<CmFadtResetBlockInfo>(), 13);
        assert_eq!(size_of::<CmFadtMiscInfo>(), 13);
    }

    #[test]
    fn test_get_object_list() {
        let cm = RawCm {
            object_id: ArchCommonObjectId::FadtSciInterrupt,
            data: vec![0x09, 0x00, 0x2A, 0x00],
            count: 2,
        };
        let list = get_object_list::<CmFadtSciInterrupt>(&cm, CM_NULL_TOKEN).unwrap();
        assert_eq!(
            list,
            vec![
                CmFadtSciInterrupt { sci_interrupt: 9 },
                CmFadtSciInterrupt {
                    sci_interrupt: 0x2A
                }
            ]
        );
        let single = get_single_object::<CmFadtSciInterrupt>(&cm, CM_NULL_TOKEN).unwrap();
        assert_eq!({ single.sci_interrupt }, 9);

        assert_eq!(
            err_of(get_object_list::<CmFadtMiscInfo>(&cm, CM_NULL_TOKEN)),
            AcpiError::NotFound(ArchCommonObjectId::FadtMiscInfo)
        );
    }

    #[test]
    fn test_get_object_list_size_mismatch() {
        let id = ArchCommonObjectId::FadtGpeBlockInfo;

        // Not a multiple of the record size.
        let cm = RawCm {
            object_id: id,
            data: vec![0; 12],
            count: 1,
        };
        assert_eq!(
            err_of(get_object_list::<CmFadtGpeBlockInfo>(&cm, CM_NULL_TOKEN)),
            AcpiError::BufferSizeMismatch(id, 12, 11)
        );

        // Smaller than one record.
        let cm = RawCm {
            object_id: id,
            data: vec![0; 4],
            count: 1,
        };
        assert_eq!(
            err_of(get_object_list::<CmFadtGpeBlockInfo>(&cm, CM_NULL_TOKEN)),
            AcpiError::BufferSizeMismatch(id, 4, 11)
        );

        // Fewer records than announced.
        let cm = RawCm {
            object_id: id,
            data: vec![0; 11],
            count: 2,
        };
        assert_eq!(
            err_of(get_object_list::<CmFadtGpeBlockInfo>(&cm, CM_NULL_TOKEN)),
            AcpiError::BufferSizeMismatch(id, 11, 11)
        );
    }

    #[test]
    fn test_get_single_object_empty() {
        let id = ArchCommonObjectId::FadtResetBlockInfo;
        let cm = RawCm {
            object_id: id,
            data: Vec::new(),
            count: 0,
        };
        assert!(get_object_list::<CmFadtResetBlockInfo>(&cm, CM_NULL_TOKEN)
            .unwrap()
            .is_empty());
        assert_eq!(
            err_of(get_single_object::<CmFadtResetBlockInfo>(&cm, CM_NULL_TOKEN)),
            AcpiError::NotFound(id)
        );
    }
}
