//! RFC 1071 Internet checksum, shared by the IPv4 and ICMP headers.

/// Location of the 16-bit checksum inside a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumField {
    Ip,
    Icmp,
}

impl ChecksumField {
    pub const fn offset(self) -> usize {
        match self {
            ChecksumField::Ip => 10,
            ChecksumField::Icmp => 2,
        }
    }
}

pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Copy of `buffer` with the checksum field zeroed. Buffers too short to hold
/// the field come back unchanged.
pub fn zero_checksum_field(buffer: &[u8], field: ChecksumField) -> Vec<u8> {
    let mut copy = buffer.to_vec();
    let offset = field.offset();
    if let Some(slot) = copy.get_mut(offset..offset + 2) {
        slot.fill(0);
    }
    copy
}

/// Returns `(embedded, computed)` for the header in `buffer`.
pub fn verify(buffer: &[u8], field: ChecksumField) -> Option<(u16, u16)> {
    let offset = field.offset();
    let embedded = buffer.get(offset..offset + 2)?;
    let embedded = u16::from_be_bytes([embedded[0], embedded[1]]);
    let computed = checksum(&zero_checksum_field(buffer, field));
    Some((embedded, computed))
}
