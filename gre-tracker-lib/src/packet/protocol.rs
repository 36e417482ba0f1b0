//! IP protocol numbers
//!
//! Only the protocol numbers that show up in front of a GRE worker are
//! named; any other value is still representable and prints as hex.
//!
//! # Examples
//!
//! ```
//! use gre_tracker::packet::protocol::IpProto;
//!
//! assert_eq!(IpProto::GRE.0, 47);
//! assert_eq!(format!("{}", IpProto::GRE), "gre");
//! assert_eq!(IpProto::from(6), IpProto::TCP);
//! assert_eq!(format!("{}", IpProto(200)), "0xc8");
//! ```

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

crate::protocol_constants! {
    IpProto:
        IPV6_HOPOPT = 0;
        ICMP = 1;
        IGMP = 2;
        IP_ENCAP = 4;
        TCP = 6;
        UDP = 17;
        IPV6 = 41;
        RSVP = 46;
        GRE = 47;
        ESP = 50;
        AH = 51;
        OSPF = 89;
        ETHERIP = 97;
        L2TP = 115;
        SCTP = 132;
        #[default] ANY = 255;
}
