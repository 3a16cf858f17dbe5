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

use std::mem::size_of;
use std::slice::{from_raw_parts, from_raw_parts_mut};

/// A trait bound defined for plain-data types whose in-memory representation is
/// exactly their wire representation, e.g. `#[repr(C, packed)]` ACPI structures.
///
/// Implementors must not contain padding, pointers or types with invalid bit
/// patterns.
pub trait ByteCode: Default + Copy + Send + Sync {
    /// Return the contents of an object (impl trait `ByteCode`) as a slice of bytes.
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: The object is guaranteed been initialized already.
        unsafe { from_raw_parts(self as *const Self as *const u8, size_of::<Self>()) }
    }

    /// Return the contents of a mutable object (impl trait `ByteCode`) to a mutable slice of bytes.
    fn as_mut_bytes(&mut self) -> &mut [u8] {
        // SAFETY: The object is guaranteed been initialized already.
        unsafe { from_raw_parts_mut(self as *mut Self as *mut u8, size_of::<Self>()) }
    }

    /// Copy an object (impl trait `ByteCode`) out of the head of a byte slice.
    ///
    /// Returns `None` if `data` is shorter than the object. The slice does not
    /// need to be aligned.
    ///
    /// # Arguments
    ///
    /// * `data` - the slice of bytes that the object is read from.
    fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() < size_of::<Self>() {
            return None;
        }

        // SAFETY: The length was checked above and the read tolerates any alignment.
        Some(unsafe { data.as_ptr().cast::<Self>().read_unaligned() })
    }

    /// Split a byte slice into consecutive objects.
    ///
    /// Returns `None` unless the length of `data` is a multiple of the object size.
    fn vec_from_slice(data: &[u8]) -> Option<Vec<Self>> {
        let obj_size = size_of::<Self>();
        if obj_size == 0 || data.len() % obj_size != 0 {
            return None;
        }

        data.chunks_exact(obj_size).map(Self::from_slice).collect()
    }
}

// Integer types of Rust satisfy the requirements of `trait ByteCode`
impl ByteCode for u8 {}
impl ByteCode for u16 {}
impl ByteCode for u32 {}
impl ByteCode for u64 {}
