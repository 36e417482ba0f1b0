// Macro to generate a u8 protocol-number newtype with named constants
#[macro_export]
macro_rules! protocol_constants {
    (   $(#[$outer:meta])*
        $type_name:ident:
        $( $(#[$default:ident])? $const_name:ident = $val:expr; )+
    ) => {
        paste::paste! {
            #[doc = concat!("A newtype wrapper around a u8 representing an ", stringify!($type_name), " number.")]
            ///
            /// Named constants cover the protocols this crate cares about;
            /// `Display` shows the kebab-case name, or the hex value when unknown.
            $(#[$outer])*
            #[derive(
                Clone,
                Copy,
                PartialEq,
                Eq,
                Hash,
                Debug,
                FromBytes,
                IntoBytes,
                Immutable,
                KnownLayout,
                Unaligned,
            )]
            #[repr(transparent)]
            pub struct $type_name(pub u8);

            impl $type_name {
                $(
                    pub const $const_name: $type_name = $type_name($val);
                )+

                pub fn is_known(&self) -> bool {
                    <[< $type_name Name >] as std::convert::TryFrom<u8>>::try_from(self.0).is_ok()
                }
            }

            impl Default for $type_name {
                fn default() -> Self {
                    $( $(if stringify!($default) == "default" {
                            return Self::$const_name;
                        })?
                    )+
                    Self(0)
                }
            }

            // Shadow enum for the strum name machinery
            #[derive(Debug, PartialEq, strum::EnumString, strum::IntoStaticStr, Clone, Copy)]
            #[strum(serialize_all = "kebab-case")]
            #[allow(non_camel_case_types)]
            enum [< $type_name Name >] {
                $(
                    $const_name,
                )+
            }

            impl TryFrom<u8> for [< $type_name Name >] {
                type Error = ();
                fn try_from(v: u8) -> Result<Self, Self::Error> {
                    match v {
                        $(
                            $val => Ok([< $type_name Name >]::$const_name),
                        )+
                        _ => Err(()),
                    }
                }
            }

            impl From<u8> for $type_name {
                fn from(v: u8) -> Self {
                    Self(v)
                }
            }

            impl From<$type_name> for u8 {
                fn from(v: $type_name) -> Self {
                    v.0
                }
            }

            impl std::str::FromStr for $type_name {
                type Err = String;

                fn from_str(value: &str) -> Result<Self, Self::Err> {
                    if let Ok(variant) = <[< $type_name Name >] as std::str::FromStr>::from_str(value) {
                        return Ok(match variant {
                            $(
                                [< $type_name Name >]::$const_name => Self::$const_name,
                            )+
                        });
                    }

                    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
                        return u8::from_str_radix(hex, 16)
                            .map(Self)
                            .map_err(|_| format!("invalid hex: {}", value));
                    }

                    Err(format!("unknown {}: {}", stringify!($type_name), value))
                }
            }

            impl std::fmt::Display for $type_name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    if let Ok(name) = <[< $type_name Name >] as std::convert::TryFrom<u8>>::try_from(self.0) {
                        let s: &'static str = name.into();
                        f.write_str(s)
                    } else {
                        write!(f, "0x{:x}", self.0)
                    }
                }
            }

            impl serde::Serialize for $type_name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serde::Serialize::serialize(&self.0, serializer)
                }
            }

            impl<'de> serde::Deserialize<'de> for $type_name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let val = <u8 as serde::Deserialize>::deserialize(deserializer)?;
                    Ok($type_name(val))
                }
            }
        }
    };
}
