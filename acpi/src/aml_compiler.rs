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

use anyhow::{anyhow, Result};
use util::byte_code::ByteCode;

use crate::acpi_helper::is_valid_pnp_id;
use crate::AcpiError;

const ACPI_NAME_SEG_MAX: u8 = 4;
const ACPI_NAME_SEG_COUNT_MAX: usize = 255;

pub const AML_ZERO_OP: u8 = 0x00;
pub const AML_ONE_OP: u8 = 0x01;
pub const AML_NAME_OP: u8 = 0x08;
pub const AML_BYTE_PREFIX: u8 = 0x0A;
pub const AML_WORD_PREFIX: u8 = 0x0B;
pub const AML_DWORD_PREFIX: u8 = 0x0C;
pub const AML_STRING_PREFIX: u8 = 0x0D;
pub const AML_QWORD_PREFIX: u8 = 0x0E;
pub const AML_SCOPE_OP: u8 = 0x10;
pub const AML_BUFFER_OP: u8 = 0x11;
pub const AML_DUAL_NAME_PREFIX: u8 = 0x2E;
pub const AML_MULTI_NAME_PREFIX: u8 = 0x2F;
pub const AML_EXT_OP: u8 = 0x5B;
pub const AML_EXT_DEVICE_OP: u8 = 0x82;
pub const AML_ONES_OP: u8 = 0xFF;

/// This trait is used for converting AML Data structure to byte stream.
pub trait AmlBuilder {
    /// Transfer this struct to byte stream.
    fn aml_bytes(&self) -> Vec<u8>;
}

/// This trait is used for adding children to AML Data structure that represents
/// a scope, such as `AmlDevice`, `AmlScope`.
pub trait AmlScopeBuilder: AmlBuilder {
    /// Append a child to this AML scope structure.
    ///
    /// # Arguments
    ///
    /// * `child` - Child that will be appended to the end of this scope.
    fn append_child<T: AmlBuilder>(&mut self, child: T);
}

/// Macro that helps to define `AmlZero`, `AmlOne`, `AmlOnes`
///
/// # Arguments
///
/// * `$name` - struct name
/// * `$byte` - corresponding byte of this structure
macro_rules! zero_one_define {
    ($name: ident, $byte: expr) => {
        pub struct $name;

        impl AmlBuilder for $name {
            fn aml_bytes(&self) -> Vec<u8> {
                vec![$byte]
            }
        }
    };
}

zero_one_define!(AmlZero, AML_ZERO_OP);
zero_one_define!(AmlOne, AML_ONE_OP);
zero_one_define!(AmlOnes, AML_ONES_OP);

/// Macro that helps to define `AmlByte`, `AmlWord`, `AmlDWord`, `AmlQWord`.
///
/// # Arguments
///
/// * `$name` - struct name
/// * `$op` - corresponding Opcode of this structure
/// * `$ty` - inner field of this struct.
macro_rules! aml_bytes_type_define {
    ($name:ident, $op:expr, $ty:tt) => {
        pub struct $name(pub $ty);

        impl AmlBuilder for $name {
            fn aml_bytes(&self) -> Vec<u8> {
                let mut bytes = Vec::new();
                bytes.push($op);
                bytes.extend(self.0.as_bytes());
                bytes
            }
        }
    };
}

aml_bytes_type_define!(AmlByte, AML_BYTE_PREFIX, u8);
aml_bytes_type_define!(AmlWord, AML_WORD_PREFIX, u16);
aml_bytes_type_define!(AmlDWord, AML_DWORD_PREFIX, u32);
aml_bytes_type_define!(AmlQWord, AML_QWORD_PREFIX, u64);

/// Integer, max value u64::MAX.
pub struct AmlInteger(pub u64);

impl AmlBuilder for AmlInteger {
    fn aml_bytes(&self) -> Vec<u8> {
        match self.0 {
            0x00 => AmlZero.aml_bytes(),
            0x01 => AmlOne.aml_bytes(),
            0x02..=0xFF => AmlByte(self.0 as u8).aml_bytes(),
            0x100..=0xFFFF => AmlWord(self.0 as u16).aml_bytes(),
            0x10000..=0xFFFF_FFFF => AmlDWord(self.0 as u32).aml_bytes(),
            _ => AmlQWord(self.0).aml_bytes(),
        }
    }
}

/// String
pub struct AmlString(pub String);

impl AmlBuilder for AmlString {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(AML_STRING_PREFIX);
        bytes.extend(self.0.as_bytes());
        bytes.push(0x0);
        bytes
    }
}

/// Check if `ch` may appear inside a NameSeg.
fn is_name_char(ch: u8, lead: bool) -> bool {
    ch == b'_' || ch.is_ascii_uppercase() || (!lead && ch.is_ascii_digit())
}

/// Parse and check a name-segment, and convert it to byte stream.
fn build_name_seg(name: &str) -> Result<Vec<u8>> {
    let seg = name.as_bytes();
    if seg.is_empty() || seg.len() > usize::from(ACPI_NAME_SEG_MAX) {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "NameSeg \"{}\" must have 1 to {} characters",
            name, ACPI_NAME_SEG_MAX
        ))));
    }
    for (i, ch) in seg.iter().enumerate() {
        if !is_name_char(*ch, i == 0) {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "NameSeg \"{}\" contains invalid character",
                name
            ))));
        }
    }

    let mut bytes = seg.to_vec();
    bytes.resize(usize::from(ACPI_NAME_SEG_MAX), b'_');
    Ok(bytes)
}

/// Parse a name-string and convert it to byte stream.
///
/// Supports root (`\`) and parent (`^`) prefixes and dotted paths, e.g. `\_SB.PCI0`.
pub fn build_name_string(name: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    let path = name.trim_start_matches(|ch| ch == '\\' || ch == '^');
    let prefix = &name[..name.len() - path.len()];
    if prefix.contains('\\') && prefix != "\\" {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "name string \"{}\" mixes root and parent prefix",
            name
        ))));
    }
    bytes.extend(prefix.as_bytes());

    if path.is_empty() {
        bytes.push(AML_ZERO_OP);
        return Ok(bytes);
    }

    let strs = path.split('.').collect::<Vec<&str>>();
    if strs.len() > ACPI_NAME_SEG_COUNT_MAX {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "name string has {} segments",
            strs.len()
        ))));
    }
    match strs.len() {
        1 => {}
        2 => bytes.push(AML_DUAL_NAME_PREFIX),
        n => {
            bytes.push(AML_MULTI_NAME_PREFIX);
            bytes.push(n as u8);
        }
    }
    for seg in strs {
        bytes.extend(build_name_seg(seg)?);
    }

    Ok(bytes)
}

/// Encode the name of a declared object (`Name`, `Scope`, `Device`).
///
/// The path must end with a NameSeg. Only a `Scope` may open the root `\`.
pub fn build_object_name(name: &str, allow_root: bool) -> Result<Vec<u8>> {
    let path = name.trim_start_matches(|ch| ch == '\\' || ch == '^');
    if path.is_empty() && !(allow_root && name == "\\") {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "\"{}\" does not name an object",
            name
        ))));
    }
    build_name_string(name)
}

// Follow ACPI spec: 5.4 Definition Block Encoding
// The lower two bits indicates how many bytes are used for PkgLength
// The 3,4 bits are only used if PkgLength consists of one bytes.
// Therefore, the max value of PkgLength is 0x3F(one-byte encoding),
// 0xF_FF(two-byte encoding), 0xF_FF_FF(three-byte encoding), 0xF_FF_FF_FF(four-byte encoding).
/// Calculate PkgLength according to the length, and convert it to bytes.
pub fn build_pkg_length(length: usize, include_self: bool) -> Vec<u8> {
    let pkg_1byte_shift = 6;
    let pkg_2byte_shift = 4;
    let pkg_3byte_shift = 12;
    let pkg_4byte_shift = 20;
    let mut pkg_length = length;
    let mut bytes = Vec::new();

    let bytes_count = if length + 1 < (1 << pkg_1byte_shift) {
        1
    } else if length + 2 < (1 << pkg_3byte_shift) {
        2
    } else if length + 3 < (1 << pkg_4byte_shift) {
        3
    } else {
        4
    };

    if include_self {
        pkg_length += bytes_count;
    }

    match bytes_count {
        1 => {
            bytes.push(pkg_length as u8);
        }
        2 => {
            bytes.push((1 << pkg_1byte_shift | (pkg_length & 0xF)) as u8);
            bytes.push((pkg_length >> pkg_2byte_shift) as u8);
        }
        3 => {
            bytes.push((2 << pkg_1byte_shift | (pkg_length & 0xF)) as u8);
            bytes.push((pkg_length >> pkg_2byte_shift) as u8);
            bytes.push((pkg_length >> pkg_3byte_shift) as u8);
        }
        _ => {
            bytes.push((3 << pkg_1byte_shift | (pkg_length & 0xF)) as u8);
            bytes.push((pkg_length >> pkg_2byte_shift) as u8);
            bytes.push((pkg_length >> pkg_3byte_shift) as u8);
            bytes.push((pkg_length >> pkg_4byte_shift) as u8);
        }
    }

    bytes
}

/// This struct represents declaration of a named object
pub struct AmlNameDecl {
    /// Encoded name of the object.
    name: Vec<u8>,
    /// The corresponding object that be named.
    obj: Vec<u8>,
}

impl AmlNameDecl {
    pub fn new<T: AmlBuilder>(name: &str, obj: T) -> Result<AmlNameDecl> {
        Ok(AmlNameDecl::from_encoded(
            build_object_name(name, false)?,
            obj.aml_bytes(),
        ))
    }

    pub(crate) fn from_encoded(name: Vec<u8>, obj: Vec<u8>) -> AmlNameDecl {
        AmlNameDecl { name, obj }
    }
}

impl AmlBuilder for AmlNameDecl {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![AML_NAME_OP];
        bytes.extend(&self.name);
        bytes.extend(&self.obj);
        bytes
    }
}

/// EISA ID String, compressed to a DWord.
pub struct AmlEisaId {
    id: u32,
}

impl AmlEisaId {
    /// Compress a PNP ID of the form "AAA####".
    pub fn new(name: &str) -> Result<AmlEisaId> {
        if !is_valid_pnp_id(name) {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "\"{}\" is not a valid PNP ID",
                name
            ))));
        }

        let chars = name.as_bytes();
        let hex = |ch: u8| (ch as char).to_digit(16).unwrap_or_default();
        let id = (u32::from(chars[0]) - 0x40) << 26
            | (u32::from(chars[1]) - 0x40) << 21
            | (u32::from(chars[2]) - 0x40) << 16
            | hex(chars[3]) << 12
            | hex(chars[4]) << 8
            | hex(chars[5]) << 4
            | hex(chars[6]);
        Ok(AmlEisaId { id })
    }
}

impl AmlBuilder for AmlEisaId {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![AML_DWORD_PREFIX];
        bytes.extend(self.id.to_be_bytes());
        bytes
    }
}

/// Buffer declaration, represents an array of bytes.
/// When a byte stream cannot by `AmlByte`, `AmlQWord`, etc, Buffer can be used.
pub struct AmlBuffer(pub Vec<u8>);

impl AmlBuilder for AmlBuffer {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![AML_BUFFER_OP];
        let len_bytes = AmlInteger(self.0.len() as u64).aml_bytes();
        bytes.extend(build_pkg_length(len_bytes.len() + self.0.len(), true));
        bytes.extend(len_bytes);
        bytes.extend(&self.0);

        bytes
    }
}

/// Open a named Scope, can refer any scope within the namespace.
pub struct AmlScope {
    /// Contains objects created inside the scope, which are encodes to bytes.
    buf: Vec<u8>,
}

impl AmlScope {
    pub fn new(name: &str) -> Result<AmlScope> {
        Ok(AmlScope::from_encoded(build_object_name(name, true)?))
    }

    pub(crate) fn from_encoded(name: Vec<u8>) -> AmlScope {
        AmlScope { buf: name }
    }
}

impl AmlBuilder for AmlScope {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![AML_SCOPE_OP];
        bytes.extend(build_pkg_length(self.buf.len(), true));
        bytes.extend(&self.buf);
        bytes
    }
}

impl AmlScopeBuilder for AmlScope {
    fn append_child<T: AmlBuilder>(&mut self, child: T) {
        self.buf.extend(child.aml_bytes());
    }
}

/// Device object that represents a processor, a device, etc.
pub struct AmlDevice {
    buf: Vec<u8>,
}

impl AmlDevice {
    pub fn new(name: &str) -> Result<AmlDevice> {
        Ok(AmlDevice::from_encoded(build_object_name(name, false)?))
    }

    pub(crate) fn from_encoded(name: Vec<u8>) -> AmlDevice {
        AmlDevice { buf: name }
    }
}

impl AmlBuilder for AmlDevice {
    fn aml_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![AML_EXT_OP, AML_EXT_DEVICE_OP];
        bytes.extend(build_pkg_length(self.buf.len(), true));
        bytes.extend(&self.buf);
        bytes
    }
}

impl AmlScopeBuilder for AmlDevice {
    fn append_child<T: AmlBuilder>(&mut self, child: T) {
        self.buf.extend(child.aml_bytes());
    }
}
