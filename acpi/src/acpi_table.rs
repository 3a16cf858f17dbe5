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

use serde::Deserialize;

use util::byte_code::ByteCode;

use super::aml_compiler::AmlBuilder;

/// Creator ID of tables updated by the dynamic table generators.
pub const TABLE_GENERATOR_CREATOR_ID: [u8; 4] = *b"DYNT";

/// Address space ids of the Generic Address Structure.
pub const ACPI_GAS_SPACE_SYSTEM_MEMORY: u8 = 0;
pub const ACPI_GAS_SPACE_SYSTEM_IO: u8 = 1;
/// Access sizes of the Generic Address Structure.
pub const ACPI_GAS_ACCESS_UNDEFINED: u8 = 0;
pub const ACPI_GAS_ACCESS_BYTE: u8 = 1;
pub const ACPI_GAS_ACCESS_WORD: u8 = 2;
pub const ACPI_GAS_ACCESS_DWORD: u8 = 3;
pub const ACPI_GAS_ACCESS_QWORD: u8 = 4;

pub const ACPI_FADT_REVISION: u8 = 6;
pub const ACPI_FADT_MINOR_REVISION: u8 = 5;

/// Generic Address Structure, ACPI 6.5 section 5.2.3.2.
#[repr(C, packed)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcpiGenericAddress {
    pub space_id: u8,
    pub bit_width: u8,
    pub bit_offset: u8,
    pub access_size: u8,
    pub address: u64,
}

impl AcpiGenericAddress {
    pub fn new(
        space_id: u8,
        bit_width: u8,
        bit_offset: u8,
        access_size: u8,
        address: u64,
    ) -> AcpiGenericAddress {
        AcpiGenericAddress {
            space_id,
            bit_width,
            bit_offset,
            access_size,
            address,
        }
    }

    pub fn new_io_address<T: Into<u64>>(addr: T) -> AcpiGenericAddress {
        AcpiGenericAddress {
            space_id: ACPI_GAS_SPACE_SYSTEM_IO,
            bit_width: 8 * std::mem::size_of::<T>() as u8,
            bit_offset: 0,
            access_size: std::mem::size_of::<T>() as u8,
            address: addr.into(),
        }
    }
}

impl ByteCode for AcpiGenericAddress {}

impl AmlBuilder for AcpiGenericAddress {
    fn aml_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// The common ACPI table header.
#[repr(C, packed)]
#[derive(Default, Copy, Clone)]
pub struct AcpiTableHeader {
    /// Signature of this table.
    pub signature: [u8; 4],
    /// The total length of this table, including this header.
    pub length: u32,
    /// The revision of this table.
    pub revision: u8,
    /// The checksum of this table, including this header.
    pub checksum: u8,
    /// OEM ID.
    pub oem_id: [u8; 6],
    /// OEM table ID.
    pub oem_table_id: [u8; 8],
    /// OEM revision of this table.
    pub oem_revision: u32,
    /// Vendor ID of the creator of this table, default zero.
    pub asl_compiler_id: [u8; 4],
    /// Revision of the creator of this table, default zero.
    pub asl_compiler_revision: u32,
}

impl AcpiTableHeader {
    pub fn new(
        signature: [u8; 4],
        length: u32,
        revision: u8,
        oem_id: [u8; 6],
        oem_table_id: [u8; 8],
        oem_revision: u32,
    ) -> AcpiTableHeader {
        AcpiTableHeader {
            signature,
            length,
            revision,
            checksum: 0,
            oem_id,
            oem_table_id,
            oem_revision,
            asl_compiler_id: [0_u8; 4],
            asl_compiler_revision: 0_u32,
        }
    }
}

impl ByteCode for AcpiTableHeader {}

impl AmlBuilder for AcpiTableHeader {
    fn aml_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Fixed ACPI Description Table, ACPI 6.5 section 5.2.9.
#[repr(C, packed)]
#[derive(Default, Copy, Clone)]
pub struct AcpiFadt {
    pub header: AcpiTableHeader,
    /// 32-bit physical address of the FACS.
    pub firmware_ctrl: u32,
    /// 32-bit physical address of the DSDT.
    pub dsdt: u32,
    reserved0: u8,
    pub preferred_pm_profile: u8,
    /// System vector the SCI interrupt is wired to in 8259 mode.
    pub sci_int: u16,
    /// System port address of the SMI command port.
    pub smi_cmd: u32,
    pub acpi_enable: u8,
    pub acpi_disable: u8,
    pub s4bios_req: u8,
    pub pstate_cnt: u8,
    pub pm1a_evt_blk: u32,
    pub pm1b_evt_blk: u32,
    pub pm1a_cnt_blk: u32,
    pub pm1b_cnt_blk: u32,
    pub pm2_cnt_blk: u32,
    pub pm_tmr_blk: u32,
    pub gpe0_blk: u32,
    pub gpe1_blk: u32,
    pub pm1_evt_len: u8,
    pub pm1_cnt_len: u8,
    pub pm2_cnt_len: u8,
    pub pm_tmr_len: u8,
    pub gpe0_blk_len: u8,
    pub gpe1_blk_len: u8,
    pub gpe1_base: u8,
    pub cst_cnt: u8,
    pub p_lvl2_lat: u16,
    pub p_lvl3_lat: u16,
    pub flush_size: u16,
    pub flush_stride: u16,
    pub duty_offset: u8,
    pub duty_width: u8,
    pub day_alrm: u8,
    pub mon_alrm: u8,
    pub century: u8,
    pub iapc_boot_arch: u16,
    reserved1: u8,
    pub flags: u32,
    pub reset_reg: AcpiGenericAddress,
    pub reset_value: u8,
    pub arm_boot_arch: u16,
    /// Minor part of the FADT version, the major part is in the header revision.
    pub minor_revision: u8,
    pub x_firmware_ctrl: u64,
    pub x_dsdt: u64,
    pub x_pm1a_evt_blk: AcpiGenericAddress,
    pub x_pm1b_evt_blk: AcpiGenericAddress,
    pub x_pm1a_cnt_blk: AcpiGenericAddress,
    pub x_pm1b_cnt_blk: AcpiGenericAddress,
    pub x_pm2_cnt_blk: AcpiGenericAddress,
    pub x_pm_tmr_blk: AcpiGenericAddress,
    pub x_gpe0_blk: AcpiGenericAddress,
    pub x_gpe1_blk: AcpiGenericAddress,
    pub sleep_control_reg: AcpiGenericAddress,
    pub sleep_status_reg: AcpiGenericAddress,
    pub hypervisor_vendor_identity: u64,
}

impl AcpiFadt {
    /// Create an FADT with every field after the header zeroed.
    pub fn new(oem_id: [u8; 6], oem_table_id: [u8; 8], oem_revision: u32) -> AcpiFadt {
        AcpiFadt {
            header: AcpiTableHeader::new(
                *b"FACP",
                std::mem::size_of::<AcpiFadt>() as u32,
                ACPI_FADT_REVISION,
                oem_id,
                oem_table_id,
                oem_revision,
            ),
            minor_revision: ACPI_FADT_MINOR_REVISION,
            ..Default::default()
        }
    }
}

impl ByteCode for AcpiFadt {}

impl AmlBuilder for AcpiFadt {
    fn aml_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_sizes() {
        assert_eq!(std::mem::size_of::<AcpiGenericAddress>(), 12);
        assert_eq!(std::mem::size_of::<AcpiTableHeader>(), 36);
        assert_eq!(std::mem::size_of::<AcpiFadt>(), 276);
    }

    #[test]
    fn test_generic_address() {
        let gas = AcpiGenericAddress::new_io_address(0x600_u32);
        assert_eq!(
            gas.aml_bytes(),
            vec![0x01, 0x20, 0x00, 0x04, 0x00, 0x06, 0, 0, 0, 0, 0, 0]
        );

        let gas = AcpiGenericAddress::new(
            ACPI_GAS_SPACE_SYSTEM_MEMORY,
            8,
            0,
            ACPI_GAS_ACCESS_BYTE,
            0x0900_0000,
        );
        assert_eq!(
            gas.aml_bytes(),
            vec![0x00, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_fadt_layout() {
        let mut fadt = AcpiFadt::new(*b"STRATO", *b"VIRTFADT", 1);
        let bytes = fadt.aml_bytes();
        assert_eq!(&bytes[0..4], b"FACP");
        assert_eq!(&bytes[4..8], &276_u32.to_le_bytes());
        assert_eq!(bytes[8], 6);
        assert_eq!(&bytes[10..16], b"STRATO");
        assert_eq!(&bytes[16..24], b"VIRTFADT");
        assert_eq!(bytes[131], 5);
        assert!(bytes[36..131].iter().all(|b| *b == 0));
        assert!(bytes[132..].iter().all(|b| *b == 0));

        fadt.sci_int = 9;
        fadt.gpe1_base = 0x10;
        fadt.reset_value = 0x0F;
        fadt.x_gpe0_blk = AcpiGenericAddress::new_io_address(0x620_u32);
        fadt.hypervisor_vendor_identity = 0x1122_3344_5566_7788;
        let bytes = fadt.aml_bytes();
        assert_eq!(&bytes[46..48], &[9, 0]);
        assert_eq!(bytes[94], 0x10);
        assert_eq!(bytes[128], 0x0F);
        assert_eq!(&bytes[220..224], &[0x01, 0x20, 0x00, 0x04]);
        assert_eq!(&bytes[224..226], &[0x20, 0x06]);
        assert_eq!(&bytes[268..276], &0x1122_3344_5566_7788_u64.to_le_bytes());
    }
}
