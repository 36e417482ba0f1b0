//! IPv4 header view
//!
//! Only the fixed 20 byte header of RFC 791 is modelled. The worker
//! inspects the version and protocol fields and the source address;
//! options are not parsed and the checksum is not validated.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|  IHL  |    DSCP   |ECN|          Total Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Identification        |Flags|      Fragment Offset    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Time to Live |    Protocol   |         Header Checksum       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Source Address                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Destination Address                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! # Examples
//!
//! ```
//! use gre_tracker::packet::ipv4::Ipv4Header;
//! use gre_tracker::packet::protocol::IpProto;
//! use gre_tracker::packet::PacketHeader;
//! use std::net::Ipv4Addr;
//!
//! let packet = [
//!     0x45, 0x00, 0x00, 0x18, // Version=4, IHL=5, total length 24
//!     0x00, 0x01, 0x00, 0x00, // Identification, flags
//!     0x40, 0x2f, 0x00, 0x00, // TTL 64, protocol GRE (47), checksum
//!     0xcb, 0x00, 0x71, 0x05, // Source: 203.0.113.5
//!     0xc0, 0x00, 0x02, 0x01, // Destination: 192.0.2.1
//!     0x00, 0x00, 0x65, 0x58, // GRE header follows
//! ];
//!
//! let (header, rest) = Ipv4Header::from_prefix(&packet).unwrap();
//! assert_eq!(header.protocol(), IpProto::GRE);
//! assert_eq!(header.src_ip(), Ipv4Addr::new(203, 0, 113, 5));
//! assert_eq!(rest.len(), 4);
//! ```

use std::fmt::{self, Formatter};
use std::net::Ipv4Addr;

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::packet::protocol::IpProto;
use crate::packet::PacketHeader;

/// Minimum IPv4 header length in bytes (IHL = 5)
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Fixed portion of the IPv4 header as defined in RFC 791
#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, KnownLayout, Immutable)]
pub struct Ipv4Header {
    ver_ihl: u8,
    dscp_ecn: u8,
    total_length: U16<BigEndian>,
    identification: U16<BigEndian>,
    flags_frag_offset: U16<BigEndian>,
    ttl: u8,
    protocol: IpProto,
    checksum: U16<BigEndian>,
    src_ip: U32<BigEndian>,
    dst_ip: U32<BigEndian>,
}

impl Ipv4Header {
    #[inline]
    pub fn version(&self) -> u8 {
        self.ver_ihl >> 4
    }

    #[inline]
    pub fn ihl(&self) -> u8 {
        self.ver_ihl & 0x0F
    }

    #[inline]
    pub fn dscp(&self) -> u8 {
        self.dscp_ecn >> 2
    }

    #[inline]
    pub fn ecn(&self) -> u8 {
        self.dscp_ecn & 0x03
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.identification.get()
    }

    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        self.flags_frag_offset.get() & 0x1FFF
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn total_length(&self) -> usize {
        self.total_length.get() as usize
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn protocol(&self) -> IpProto {
        self.protocol
    }

    #[inline]
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_ip.get())
    }

    #[inline]
    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_ip.get())
    }

    #[inline]
    pub fn is_gre(&self) -> bool {
        self.protocol == IpProto::GRE
    }
}

impl PacketHeader for Ipv4Header {
    const NAME: &'static str = "IPv4Header";
    type InnerType = IpProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.protocol
    }

    // The IHL is not checked: the worker only needs the version to trust
    // the address fields.
    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == 4
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto={} ttl={} len={}",
            self.src_ip(),
            self.dst_ip(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )
    }
}
