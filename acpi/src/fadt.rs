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

use anyhow::Result;
use log::error;

use crate::acpi_table::{AcpiFadt, TABLE_GENERATOR_CREATOR_ID};
use crate::config_manager::{
    get_single_object, CmFadtGpeBlockInfo, CmFadtMiscInfo, CmFadtPmBlockInfo,
    CmFadtResetBlockInfo, CmFadtSciCmdInfo, CmFadtSciInterrupt, CmFadtSleepBlockInfo,
    CmFadtXgpeBlockInfo, CmFadtXpmBlockInfo, CmObject, ConfigurationManager, CM_NULL_TOKEN,
};

/// Fetch the record `T` and hand it to `update`. A failed lookup is logged and
/// leaves the table untouched.
fn update_from<T: CmObject>(
    cm: &dyn ConfigurationManager,
    fadt: &mut AcpiFadt,
    what: &str,
    update: impl FnOnce(&mut AcpiFadt, &T),
) {
    match get_single_object::<T>(cm, CM_NULL_TOKEN) {
        Ok(obj) => update(fadt, &obj),
        Err(e) => error!("FADT: Failed to get {} information: {:?}", what, e),
    }
}

/// Update the architecture common fields of the FADT from the configuration
/// manager.
///
/// Each field group is fetched on its own. A group that cannot be fetched is
/// logged and skipped, the remaining groups are still updated.
pub fn fadt_arch_update(cm: &dyn ConfigurationManager, fadt: &mut AcpiFadt) -> Result<()> {
    update_from(cm, fadt, "SCI interrupt", |fadt, sci: &CmFadtSciInterrupt| {
        fadt.sci_int = sci.sci_interrupt;
    });

    update_from(cm, fadt, "SCI CMD", |fadt, cmd: &CmFadtSciCmdInfo| {
        fadt.smi_cmd = cmd.sci_cmd;
        fadt.acpi_enable = cmd.acpi_enable;
        fadt.acpi_disable = cmd.acpi_disable;
        fadt.s4bios_req = cmd.s4bios_req;
        fadt.pstate_cnt = cmd.pstate_cnt;
        fadt.cst_cnt = cmd.cst_cnt;
    });

    update_from(cm, fadt, "PM block", |fadt, pm: &CmFadtPmBlockInfo| {
        fadt.pm1a_evt_blk = pm.pm1a_evt_blk;
        fadt.pm1b_evt_blk = pm.pm1b_evt_blk;
        fadt.pm1a_cnt_blk = pm.pm1a_cnt_blk;
        fadt.pm1b_cnt_blk = pm.pm1b_cnt_blk;
        fadt.pm2_cnt_blk = pm.pm2_cnt_blk;
        fadt.pm_tmr_blk = pm.pm_tmr_blk;
        fadt.pm1_evt_len = pm.pm1_evt_len;
        fadt.pm1_cnt_len = pm.pm1_cnt_len;
        fadt.pm2_cnt_len = pm.pm2_cnt_len;
        fadt.pm_tmr_len = pm.pm_tmr_len;
    });

    update_from(cm, fadt, "GPE block", |fadt, gpe: &CmFadtGpeBlockInfo| {
        fadt.gpe0_blk = gpe.gpe0_blk;
        fadt.gpe1_blk = gpe.gpe1_blk;
        fadt.gpe0_blk_len = gpe.gpe0_blk_len;
        fadt.gpe1_blk_len = gpe.gpe1_blk_len;
        fadt.gpe1_base = gpe.gpe1_base;
    });

    update_from(cm, fadt, "64-bit PM block", |fadt, xpm: &CmFadtXpmBlockInfo| {
        fadt.x_pm1a_evt_blk = xpm.x_pm1a_evt_blk;
        fadt.x_pm1b_evt_blk = xpm.x_pm1b_evt_blk;
        fadt.x_pm1a_cnt_blk = xpm.x_pm1a_cnt_blk;
        fadt.x_pm1b_cnt_blk = xpm.x_pm1b_cnt_blk;
        fadt.x_pm2_cnt_blk = xpm.x_pm2_cnt_blk;
        fadt.x_pm_tmr_blk = xpm.x_pm_tmr_blk;
    });

    update_from(cm, fadt, "platform misc", |fadt, misc: &CmFadtMiscInfo| {
        fadt.p_lvl2_lat = misc.p_lvl2_lat;
        fadt.p_lvl3_lat = misc.p_lvl3_lat;
        fadt.flush_size = misc.flush_size;
        fadt.flush_stride = misc.flush_stride;
        fadt.duty_offset = misc.duty_offset;
        fadt.duty_width = misc.duty_width;
        fadt.day_alrm = misc.day_alrm;
        fadt.mon_alrm = misc.mon_alrm;
        fadt.century = misc.century;
    });

    update_from(cm, fadt, "64-bit GPE block", |fadt, xgpe: &CmFadtXgpeBlockInfo| {
        fadt.x_gpe0_blk = xgpe.x_gpe0_blk;
        fadt.x_gpe1_blk = xgpe.x_gpe1_blk;
    });

    update_from(cm, fadt, "sleep block", |fadt, sleep: &CmFadtSleepBlockInfo| {
        fadt.sleep_control_reg = sleep.sleep_control_reg;
        fadt.sleep_status_reg = sleep.sleep_status_reg;
    });

    update_from(cm, fadt, "reset block", |fadt, reset: &CmFadtResetBlockInfo| {
        fadt.reset_reg = reset.reset_reg;
        fadt.reset_value = reset.reset_value;
    });

    fadt.header.asl_compiler_id = TABLE_GENERATOR_CREATOR_ID;
    Ok(())
}
