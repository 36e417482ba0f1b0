use std::mem;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, KnownLayout, Ref, Unaligned};

pub mod ipv4;
pub mod protocol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketHeaderError {
    #[error("buffer too short for {0}")]
    TooShort(&'static str),
    #[error("invalid {0}")]
    Invalid(&'static str),
}

pub trait PacketHeader: Sized + FromBytes + KnownLayout + Immutable + Unaligned {
    const FIXED_LEN: usize = mem::size_of::<Self>();
    const NAME: &'static str;
    type InnerType;

    /// return the inner type of the header
    fn inner_type(&self) -> Self::InnerType;

    /// check whether the header is valid
    #[inline]
    fn is_valid(&self) -> bool {
        true
    }

    /// View the fixed part of the header at the start of `buf`.
    ///
    /// Only `FIXED_LEN` bytes are required: queues configured to copy just
    /// the header prefix hand over truncated packets, so options and payload
    /// are never touched here.
    #[inline]
    fn from_prefix(buf: &[u8]) -> Result<(&Self, &[u8]), PacketHeaderError> {
        let (header_ref, rest) =
            Ref::<_, Self>::from_prefix(buf).map_err(|_| PacketHeaderError::TooShort(Self::NAME))?;

        let header = Ref::into_ref(header_ref);
        if !header.is_valid() {
            return Err(PacketHeaderError::Invalid(Self::NAME));
        }

        Ok((header, rest))
    }
}
