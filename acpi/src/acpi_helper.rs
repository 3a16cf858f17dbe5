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

use anyhow::{anyhow, Result};

use crate::AcpiError;

/// Convert a nibble to its uppercase hex digit, e.g. 0xB to 'B'.
pub fn ascii_from_hex(x: u8) -> Result<u8> {
    match x {
        0..=9 => Ok(b'0' + x),
        10..=15 => Ok(b'A' + x - 10),
        _ => Err(anyhow!(AcpiError::InvalidArgument(format!(
            "0x{:x} is not a hex digit",
            x
        )))),
    }
}

fn is_upper_hex(ch: u8) -> bool {
    ch.is_ascii_digit() || (b'A'..=b'F').contains(&ch)
}

/// Check if a HID is a valid PNP ID, i.e. "AAA####" where A is an uppercase
/// letter and # is an uppercase hex digit.
pub fn is_valid_pnp_id(hid: &str) -> bool {
    let hid = hid.as_bytes();
    hid.len() == 7
        && hid[..3].iter().all(u8::is_ascii_uppercase)
        && hid[3..].iter().copied().all(is_upper_hex)
}

/// Check if a HID is a valid ACPI ID, i.e. "NNNN####" where N is an uppercase
/// letter or a digit and # is an uppercase hex digit.
pub fn is_valid_acpi_id(hid: &str) -> bool {
    let hid = hid.as_bytes();
    hid.len() == 8
        && hid[..4]
            .iter()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        && hid[4..].iter().copied().all(is_upper_hex)
}
