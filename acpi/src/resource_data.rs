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

//! Resource data descriptors, ACPI 6.5 section 6.4 "Resource Data Types for ACPI".

use anyhow::{anyhow, Result};

use crate::aml_compiler::AmlBuilder;
use crate::AcpiError;

/// Bit 7 of the first byte distinguishes large items from small items.
pub const ACPI_LARGE_ITEM_FLAG: u8 = 0x80;
pub const ACPI_SMALL_END_TAG_DESCRIPTOR_NAME: u8 = 0x0F;
pub const ACPI_LARGE_EXTENDED_IRQ_DESCRIPTOR_NAME: u8 = 0x09;

const ACPI_SMALL_ITEM_NAME_SHIFT: u8 = 3;
const ACPI_SMALL_ITEM_NAME_MASK: u8 = 0x0F;
const ACPI_SMALL_ITEM_LENGTH_MASK: u8 = 0x07;
const ACPI_LARGE_ITEM_NAME_MASK: u8 = 0x7F;
const ACPI_SMALL_HEADER_SIZE: usize = 1;
const ACPI_LARGE_HEADER_SIZE: usize = 3;

/// End Tag: small item 0x0F with one byte of checksum. A zero checksum
/// means the list is treated as valid.
pub const ACPI_END_TAG_DESCRIPTOR: u8 = (ACPI_SMALL_END_TAG_DESCRIPTOR_NAME
    << ACPI_SMALL_ITEM_NAME_SHIFT)
    | 1;
pub const ACPI_EXTENDED_IRQ_DESCRIPTOR: u8 =
    ACPI_LARGE_ITEM_FLAG | ACPI_LARGE_EXTENDED_IRQ_DESCRIPTOR_NAME;

/// Interrupt vector flags of the Extended Interrupt Descriptor.
const EXT_IRQ_FLAG_CONSUMER: u8 = 1 << 0;
const EXT_IRQ_FLAG_EDGE: u8 = 1 << 1;
const EXT_IRQ_FLAG_ACTIVE_LOW: u8 = 1 << 2;
const EXT_IRQ_FLAG_SHARED: u8 = 1 << 3;
/// The flags byte and the interrupt table length byte.
const EXT_IRQ_FIXED_BODY_SIZE: usize = 2;
const EXT_IRQ_COUNT_MAX: usize = u8::MAX as usize;

/// Whether the device consumes the resource or produces it for a child device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlResourceUsage {
    Producer = 0,
    Consumer = 1,
}

/// Interrupt triggering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlEdgeLevel {
    Level = 0,
    Edge = 1,
}

/// Interrupt polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlActiveLevel {
    High = 0,
    Low = 1,
}

/// Whether the interrupt can be shared with other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlIntShare {
    Exclusive = 0,
    Shared = 1,
}

/// Decoded header of a resource data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdHeader {
    /// Large items carry a 16-bit length after the tag byte.
    pub large: bool,
    /// Item name, 4 bits for small items and 7 bits for large items.
    pub name: u8,
    /// Number of body bytes following the header.
    pub body_len: usize,
}

impl RdHeader {
    /// Decode the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<RdHeader> {
        let tag = *bytes.first().ok_or_else(|| {
            anyhow!(AcpiError::InvalidArgument(
                "empty resource data descriptor".to_string()
            ))
        })?;

        if tag & ACPI_LARGE_ITEM_FLAG == 0 {
            return Ok(RdHeader {
                large: false,
                name: (tag >> ACPI_SMALL_ITEM_NAME_SHIFT) & ACPI_SMALL_ITEM_NAME_MASK,
                body_len: usize::from(tag & ACPI_SMALL_ITEM_LENGTH_MASK),
            });
        }

        if bytes.len() < ACPI_LARGE_HEADER_SIZE {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "large resource descriptor 0x{:x} truncated to {} bytes",
                tag,
                bytes.len()
            ))));
        }
        Ok(RdHeader {
            large: true,
            name: tag & ACPI_LARGE_ITEM_NAME_MASK,
            body_len: usize::from(u16::from_le_bytes([bytes[1], bytes[2]])),
        })
    }

    pub fn header_size(&self) -> usize {
        if self.large {
            ACPI_LARGE_HEADER_SIZE
        } else {
            ACPI_SMALL_HEADER_SIZE
        }
    }

    /// Size of the whole descriptor, header included.
    pub fn total_size(&self) -> usize {
        self.header_size() + self.body_len
    }

    /// An End Tag is `0x79` followed by its checksum byte.
    pub fn is_end_tag(&self) -> bool {
        !self.large && self.name == ACPI_SMALL_END_TAG_DESCRIPTOR_NAME && self.body_len == 1
    }
}

/// Check `bytes` holds exactly one descriptor whose declared length matches
/// its actual size, and return its header.
pub fn check_rd_bytes(bytes: &[u8]) -> Result<RdHeader> {
    let header = RdHeader::parse(bytes)?;
    if header.total_size() != bytes.len() {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "resource descriptor declares {} bytes but holds {}",
            header.total_size(),
            bytes.len()
        ))));
    }
    if !header.large
        && header.name == ACPI_SMALL_END_TAG_DESCRIPTOR_NAME
        && !header.is_end_tag()
    {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "End Tag with {} body bytes",
            header.body_len
        ))));
    }
    Ok(header)
}

/// Size of the descriptor starting at `bytes`, as declared by its header.
pub fn rd_total_size(bytes: &[u8]) -> Result<usize> {
    Ok(RdHeader::parse(bytes)?.total_size())
}

/// Whether `bytes` is an End Tag descriptor.
pub fn is_end_tag(bytes: &[u8]) -> bool {
    RdHeader::parse(bytes).map_or(false, |h| h.is_end_tag())
}

/// End Tag descriptor terminating a resource template.
pub struct AmlEndTag;

impl AmlBuilder for AmlEndTag {
    fn aml_bytes(&self) -> Vec<u8> {
        vec![ACPI_END_TAG_DESCRIPTOR, 0x00]
    }
}

/// Extended Interrupt Descriptor, ACPI 6.5 section 6.4.3.6. This is what the
/// ASL `Interrupt ()` macro produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmlExtendedInterrupt {
    resource_usage: AmlResourceUsage,
    edge_level: AmlEdgeLevel,
    active_level: AmlActiveLevel,
    share: AmlIntShare,
    irq_list: Vec<u32>,
}

impl AmlExtendedInterrupt {
    /// Create an Extended Interrupt Descriptor.
    ///
    /// # Arguments
    ///
    /// * `resource_usage` - Consumer or producer of the interrupt.
    /// * `edge_level` - Edge or level triggered.
    /// * `active_level` - Active high or active low.
    /// * `share` - Exclusive or shared.
    /// * `irq_list` - Interrupt numbers, 1 to 255 entries, emitted in the given order.
    pub fn new(
        resource_usage: AmlResourceUsage,
        edge_level: AmlEdgeLevel,
        active_level: AmlActiveLevel,
        share: AmlIntShare,
        irq_list: Vec<u32>,
    ) -> Result<AmlExtendedInterrupt> {
        if irq_list.is_empty() || irq_list.len() > EXT_IRQ_COUNT_MAX {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "interrupt count {} is out of range 1..={}",
                irq_list.len(),
                EXT_IRQ_COUNT_MAX
            ))));
        }

        Ok(AmlExtendedInterrupt {
            resource_usage,
            edge_level,
            active_level,
            share,
            irq_list,
        })
    }

    /// Decode an encoded Extended Interrupt Descriptor.
    pub fn from_bytes(bytes: &[u8]) -> Result<AmlExtendedInterrupt> {
        let header = check_rd_bytes(bytes)?;
        if !header.large || header.name != ACPI_LARGE_EXTENDED_IRQ_DESCRIPTOR_NAME {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "descriptor 0x{:x} is not an extended interrupt",
                bytes[0]
            ))));
        }

        let body = &bytes[header.header_size()..];
        if body.len() < EXT_IRQ_FIXED_BODY_SIZE {
            return Err(anyhow!(AcpiError::InvalidArgument(
                "extended interrupt body too short".to_string()
            )));
        }
        let flags = body[0];
        let count = usize::from(body[1]);
        let irqs = &body[EXT_IRQ_FIXED_BODY_SIZE..];
        if irqs.len() != count * 4 {
            return Err(anyhow!(AcpiError::InvalidArgument(format!(
                "extended interrupt declares {} interrupts but holds {} bytes",
                count,
                irqs.len()
            ))));
        }

        let irq_list = irqs
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        AmlExtendedInterrupt::new(
            if flags & EXT_IRQ_FLAG_CONSUMER != 0 {
                AmlResourceUsage::Consumer
            } else {
                AmlResourceUsage::Producer
            },
            if flags & EXT_IRQ_FLAG_EDGE != 0 {
                AmlEdgeLevel::Edge
            } else {
                AmlEdgeLevel::Level
            },
            if flags & EXT_IRQ_FLAG_ACTIVE_LOW != 0 {
                AmlActiveLevel::Low
            } else {
                AmlActiveLevel::High
            },
            if flags & EXT_IRQ_FLAG_SHARED != 0 {
                AmlIntShare::Shared
            } else {
                AmlIntShare::Exclusive
            },
            irq_list,
        )
    }

    /// Interrupt vector flags byte.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.resource_usage == AmlResourceUsage::Consumer {
            flags |= EXT_IRQ_FLAG_CONSUMER;
        }
        if self.edge_level == AmlEdgeLevel::Edge {
            flags |= EXT_IRQ_FLAG_EDGE;
        }
        if self.active_level == AmlActiveLevel::Low {
            flags |= EXT_IRQ_FLAG_ACTIVE_LOW;
        }
        if self.share == AmlIntShare::Shared {
            flags |= EXT_IRQ_FLAG_SHARED;
        }
        flags
    }

    pub fn resource_usage(&self) -> AmlResourceUsage {
        self.resource_usage
    }

    pub fn edge_level(&self) -> AmlEdgeLevel {
        self.edge_level
    }

    pub fn active_level(&self) -> AmlActiveLevel {
        self.active_level
    }

    pub fn share(&self) -> AmlIntShare {
        self.share
    }

    pub fn irq_list(&self) -> &[u32] {
        &self.irq_list
    }

    /// Length of the descriptor body: flags, count and the interrupt table.
    fn body_len(&self) -> u16 {
        // At most 2 + 4 * 255, always fits.
        (EXT_IRQ_FIXED_BODY_SIZE + 4 * self.irq_list.len()) as u16
    }
}

impl AmlBuilder for AmlExtendedInterrupt {
    fn aml_bytes(&self) -> Vec<u8> {
        let body_len = self.body_len();
        let mut bytes = Vec::with_capacity(ACPI_LARGE_HEADER_SIZE + usize::from(body_len));
        bytes.push(ACPI_EXTENDED_IRQ_DESCRIPTOR);
        bytes.extend(body_len.to_le_bytes());
        bytes.push(self.flags());
        bytes.push(self.irq_list.len() as u8);
        for irq in &self.irq_list {
            bytes.extend(irq.to_le_bytes());
        }
        bytes
    }
}

/// Encode an Extended Interrupt Descriptor.
///
/// `count` must match the length of `interrupts`. The interrupts are emitted in
/// the given order, neither sorted nor de-duplicated.
pub fn encode_extended_interrupt(
    resource_usage: AmlResourceUsage,
    edge_level: AmlEdgeLevel,
    active_level: AmlActiveLevel,
    share: AmlIntShare,
    interrupts: &[u32],
    count: u8,
) -> Result<Vec<u8>> {
    if interrupts.is_empty() || interrupts.len() != usize::from(count) {
        return Err(anyhow!(AcpiError::InvalidArgument(format!(
            "interrupt count {} mismatches list of {} interrupts",
            count,
            interrupts.len()
        ))));
    }

    let rd = AmlExtendedInterrupt::new(
        resource_usage,
        edge_level,
        active_level,
        share,
        interrupts.to_vec(),
    )?;
    Ok(rd.aml_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    fn all_flag_combinations() -> Vec<(AmlResourceUsage, AmlEdgeLevel, AmlActiveLevel, AmlIntShare)>
    {
        let mut combos = Vec::new();
        for bits in 0..16_u8 {
            combos.push((
                if bits & 1 != 0 {
                    AmlResourceUsage::Consumer
                } else {
                    AmlResourceUsage::Producer
                },
                if bits & 2 != 0 {
                    AmlEdgeLevel::Edge
                } else {
                    AmlEdgeLevel::Level
                },
                if bits & 4 != 0 {
                    AmlActiveLevel::Low
                } else {
                    AmlActiveLevel::High
                },
                if bits & 8 != 0 {
                    AmlIntShare::Shared
                } else {
                    AmlIntShare::Exclusive
                },
            ));
        }
        combos
    }

    #[test]
    fn test_single_interrupt() {
        // Interrupt (ResourceConsumer, Level, ActiveLow, Exclusive) { 41 }
        let bytes = encode_extended_interrupt(
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Level,
            AmlActiveLevel::Low,
            AmlIntShare::Exclusive,
            &[0x29],
            1,
        )
        .unwrap();

        assert_eq!(
            bytes,
            vec![0x89, 0x06, 0x00, 0x05, 0x01, 0x29, 0x00, 0x00, 0x00]
        );
        let body_len = usize::from(u16::from_le_bytes([bytes[1], bytes[2]]));
        assert_eq!(body_len, 1 + 1 + 4);
        assert_eq!(bytes.len(), 3 + body_len);
    }

    #[test]
    fn test_two_interrupts_keep_order() {
        // Interrupt (ResourceProducer, Edge, ActiveHigh, Shared) { 0x20, 0x10 }
        let bytes = encode_extended_interrupt(
            AmlResourceUsage::Producer,
            AmlEdgeLevel::Edge,
            AmlActiveLevel::High,
            AmlIntShare::Shared,
            &[0x20, 0x10],
            2,
        )
        .unwrap();

        assert_eq!(
            bytes,
            vec![
                0x89, 0x0A, 0x00, 0x0A, 0x02, 0x20, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_length_for_all_counts() {
        for count in [1_usize, 2, 17, 255] {
            let irqs: Vec<u32> = (0..count as u32).collect();
            let bytes = encode_extended_interrupt(
                AmlResourceUsage::Consumer,
                AmlEdgeLevel::Edge,
                AmlActiveLevel::High,
                AmlIntShare::Exclusive,
                &irqs,
                count as u8,
            )
            .unwrap();
            let header = check_rd_bytes(&bytes).unwrap();
            assert!(header.large);
            assert_eq!(header.name, ACPI_LARGE_EXTENDED_IRQ_DESCRIPTOR_NAME);
            assert_eq!(header.body_len, 2 + 4 * count);
            assert_eq!(bytes.len(), 5 + 4 * count);
        }
    }

    #[test]
    fn test_flags_round_trip() {
        for (usage, edge, active, share) in all_flag_combinations() {
            let rd = AmlExtendedInterrupt::new(usage, edge, active, share, vec![7]).unwrap();
            assert_eq!(rd.flags() & 0xF0, 0);

            let decoded = AmlExtendedInterrupt::from_bytes(&rd.aml_bytes()).unwrap();
            assert_eq!(decoded.resource_usage(), usage);
            assert_eq!(decoded.edge_level(), edge);
            assert_eq!(decoded.active_level(), active);
            assert_eq!(decoded.share(), share);
            assert_eq!(decoded, rd);
        }
    }

    #[test]
    fn test_invalid_interrupt_list() {
        let empty = encode_extended_interrupt(
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Edge,
            AmlActiveLevel::High,
            AmlIntShare::Exclusive,
            &[],
            0,
        );
        assert!(matches!(
            empty.err().unwrap().downcast_ref::<AcpiError>(),
            Some(AcpiError::InvalidArgument(_))
        ));

        let mismatch = encode_extended_interrupt(
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Edge,
            AmlActiveLevel::High,
            AmlIntShare::Exclusive,
            &[1, 2, 3],
            2,
        );
        assert!(matches!(
            mismatch.err().unwrap().downcast_ref::<AcpiError>(),
            Some(AcpiError::InvalidArgument(_))
        ));

        let too_many = AmlExtendedInterrupt::new(
            AmlResourceUsage::Consumer,
            AmlEdgeLevel::Edge,
            AmlActiveLevel::High,
            AmlIntShare::Exclusive,
            vec![0; 256],
        );
        assert!(too_many.is_err());
    }

    #[test]
    fn test_end_tag() {
        let end_tag = AmlEndTag.aml_bytes();
        assert_eq!(end_tag, vec![0x79, 0x00]);
        assert!(is_end_tag(&end_tag));

        let header = check_rd_bytes(&end_tag).unwrap();
        assert!(!header.large);
        assert_eq!(header.body_len, 1);
        assert!(!is_end_tag(&[0x89, 0x06, 0x00]));
    }

    #[test]
    fn test_rd_header_mismatch() {
        // Declares 6 body bytes but only carries 5.
        let short = [0x89, 0x06, 0x00, 0x05, 0x01, 0x29, 0x00, 0x00];
        assert!(check_rd_bytes(&short).is_err());
        assert!(AmlExtendedInterrupt::from_bytes(&short).is_err());
        assert!(RdHeader::parse(&[0x89, 0x06]).is_err());
        assert!(RdHeader::parse(&[]).is_err());
        assert_eq!(rd_total_size(&short).unwrap(), 9);
        assert_eq!(rd_total_size(&[0x79, 0x00]).unwrap(), 2);
        // Well formed, but an End Tag rather than an interrupt.
        assert!(AmlExtendedInterrupt::from_bytes(&[0x79, 0x00]).is_err());

        // End Tags without exactly one checksum byte.
        for bad in [&[0x78][..], &[0x7A, 0x00, 0x00][..]] {
            let err = check_rd_bytes(bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<AcpiError>(),
                Some(AcpiError::InvalidArgument(_))
            ));
            assert!(!is_end_tag(bad));
        }
        assert!(!RdHeader::parse(&[0x78]).unwrap().is_end_tag());
    }
}
