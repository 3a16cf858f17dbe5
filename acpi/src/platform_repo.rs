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

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;

use crate::config_manager::{
    ArchCommonObjectId, CmFadtGpeBlockInfo, CmFadtMiscInfo, CmFadtPmBlockInfo,
    CmFadtResetBlockInfo, CmFadtSciCmdInfo, CmFadtSciInterrupt, CmFadtSleepBlockInfo,
    CmFadtXgpeBlockInfo, CmFadtXpmBlockInfo, CmObject, CmObjectDescriptor, CmObjectToken,
    ConfigurationManager, CM_NULL_TOKEN,
};
use crate::AcpiError;

#[derive(Default)]
struct RepoEntry {
    data: Vec<u8>,
    count: u32,
}

/// In-memory configuration manager. Records are grouped by kind and token.
#[derive(Default)]
pub struct PlatformRepository {
    entries: HashMap<(ArchCommonObjectId, CmObjectToken), RepoEntry>,
}

impl PlatformRepository {
    pub fn new() -> PlatformRepository {
        PlatformRepository::default()
    }

    /// Append `obj` to the records of its kind referenced by `token`.
    pub fn add_object<T: CmObject>(&mut self, token: CmObjectToken, obj: T) {
        let entry = self.entries.entry((T::OBJECT_ID, token)).or_default();
        entry.data.extend(obj.as_bytes());
        entry.count += 1;
    }

    pub fn add_object_list<T: CmObject>(&mut self, token: CmObjectToken, objs: &[T]) {
        for obj in objs {
            self.add_object(token, *obj);
        }
    }

    /// Drop every record of kind `id` referenced by `token`.
    pub fn remove_objects(&mut self, id: ArchCommonObjectId, token: CmObjectToken) -> bool {
        self.entries.remove(&(id, token)).is_some()
    }
}

impl ConfigurationManager for PlatformRepository {
    fn get_object(
        &self,
        id: ArchCommonObjectId,
        token: CmObjectToken,
    ) -> Result<CmObjectDescriptor> {
        let entry = self
            .entries
            .get(&(id, token))
            .ok_or_else(|| anyhow!(AcpiError::NotFound(id)))?;
        Ok(CmObjectDescriptor {
            object_id: id,
            data: entry.data.clone(),
            count: entry.count,
        })
    }
}

/// Platform description for the FADT, usually read from a json file.
///
/// Each record is optional. A missing record leaves the matching FADT fields
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    pub sci_interrupt: Option<CmFadtSciInterrupt>,
    pub sci_cmd_info: Option<CmFadtSciCmdInfo>,
    pub pm_block_info: Option<CmFadtPmBlockInfo>,
    pub gpe_block_info: Option<CmFadtGpeBlockInfo>,
    pub x_pm_block_info: Option<CmFadtXpmBlockInfo>,
    pub misc_info: Option<CmFadtMiscInfo>,
    pub x_gpe_block_info: Option<CmFadtXgpeBlockInfo>,
    pub sleep_block_info: Option<CmFadtSleepBlockInfo>,
    pub reset_block_info: Option<CmFadtResetBlockInfo>,
}

impl PlatformConfig {
    pub fn from_json(json: &str) -> Result<PlatformConfig> {
        serde_json::from_str(json).with_context(|| "Failed to parse platform config")
    }

    /// Create `PlatformConfig` from `Value` structure.
    pub fn from_value(value: &serde_json::Value) -> Result<PlatformConfig> {
        PlatformConfig::deserialize(value).with_context(|| "Failed to parse platform config")
    }

    /// Store every present record under `CM_NULL_TOKEN`.
    pub fn into_repository(self) -> PlatformRepository {
        fn add<T: CmObject>(repo: &mut PlatformRepository, obj: Option<T>) {
            if let Some(obj) = obj {
                repo.add_object(CM_NULL_TOKEN, obj);
            }
        }

        let mut repo = PlatformRepository::new();
        add(&mut repo, self.sci_interrupt);
        add(&mut repo, self.sci_cmd_info);
        add(&mut repo, self.pm_block_info);
        add(&mut repo, self.gpe_block_info);
        add(&mut repo, self.x_pm_block_info);
        add(&mut repo, self.misc_info);
        add(&mut repo, self.x_gpe_block_info);
        add(&mut repo, self.sleep_block_info);
        add(&mut repo, self.reset_block_info);
        debug!("Platform repository holds {} record kinds", repo.entries.len());
        repo
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::acpi_table::{AcpiGenericAddress, ACPI_GAS_ACCESS_BYTE, ACPI_GAS_SPACE_SYSTEM_IO};
    use crate::config_manager::{get_object_list, get_single_object};

    #[test]
    fn test_repository_lookup() {
        let mut repo = PlatformRepository::new();
        repo.add_object(CM_NULL_TOKEN, CmFadtSciInterrupt { sci_interrupt: 9 });
        repo.add_object_list(
            7,
            &[
                CmFadtSciInterrupt { sci_interrupt: 5 },
                CmFadtSciInterrupt { sci_interrupt: 6 },
            ],
        );

        let desc = repo
            .get_object(ArchCommonObjectId::FadtSciInterrupt, 7)
            .unwrap();
        assert_eq!(desc.count, 2);
        assert_eq!(desc.data, vec![5, 0, 6, 0]);

        let sci = get_single_object::<CmFadtSciInterrupt>(&repo, CM_NULL_TOKEN).unwrap();
        assert_eq!({ sci.sci_interrupt }, 9);
        assert_eq!(
            get_object_list::<CmFadtSciInterrupt>(&repo, 7).unwrap().len(),
            2
        );

        let err = repo
            .get_object(ArchCommonObjectId::FadtMiscInfo, CM_NULL_TOKEN)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AcpiError>(),
            Some(&AcpiError::NotFound(ArchCommonObjectId::FadtMiscInfo))
        );

        assert!(repo.remove_objects(ArchCommonObjectId::FadtSciInterrupt, 7));
        assert!(repo
            .get_object(ArchCommonObjectId::FadtSciInterrupt, 7)
            .is_err());
    }

    #[test]
    fn test_platform_config_json() {
        let json = r#"
        {
            "sci_interrupt": { "sci_interrupt": 9 },
            "gpe_block_info": {
                "gpe0_blk": 1568,
                "gpe1_blk": 0,
                "gpe0_blk_len": 4,
                "gpe1_blk_len": 0,
                "gpe1_base": 0
            },
            "reset_block_info": {
                "reset_reg": {
                    "space_id": 1,
                    "bit_width": 8,
                    "bit_offset": 0,
                    "access_size": 1,
                    "address": 3321
                },
                "reset_value": 15
            }
        }
        "#;
        let config = PlatformConfig::from_json(json).unwrap();
        assert!(config.pm_block_info.is_none());
        let repo = config.into_repository();

        let gpe = get_single_object::<CmFadtGpeBlockInfo>(&repo, CM_NULL_TOKEN).unwrap();
        assert_eq!({ gpe.gpe0_blk }, 0x620);
        assert_eq!(gpe.gpe0_blk_len, 4);

        let reset = get_single_object::<CmFadtResetBlockInfo>(&repo, CM_NULL_TOKEN).unwrap();
        assert_eq!(
            { reset.reset_reg },
            AcpiGenericAddress::new(ACPI_GAS_SPACE_SYSTEM_IO, 8, 0, ACPI_GAS_ACCESS_BYTE, 0xCF9)
        );
        assert_eq!(reset.reset_value, 0x0F);
        assert!(get_single_object::<CmFadtPmBlockInfo>(&repo, CM_NULL_TOKEN).is_err());
    }

    #[test]
    fn test_platform_config_invalid() {
        assert!(PlatformConfig::from_json(r#"{ "sci_irq": 9 }"#).is_err());
        assert!(PlatformConfig::from_json(r#"{ "sci_interrupt": { "sci_interrupt": 70000 } }"#)
            .is_err());

        let value = serde_json::json!({ "misc_info": { "century": 50 } });
        let config = PlatformConfig::from_value(&value).unwrap();
        let misc = config.misc_info.unwrap();
        assert_eq!(misc.century, 50);
        assert_eq!({ misc.p_lvl2_lat }, 0);
    }
}
