use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a GUID in registry format, braces included.
pub const REGISTRY_FORMAT_LEN: usize = 38;

/// A 128-bit COM identifier (CLSID or IID) in its native field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub type ClassId = Guid;
pub type InterfaceId = Guid;

impl Guid {
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80 & 0xffff) as u16,
            data3: (value >> 64 & 0xffff) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// Parses the braced registry form, e.g. `{0000033A-0000-0000-C000-000000000046}`.
    pub fn parse_registry_format(raw: &str) -> Result<Self, GuidParseError> {
        let raw = raw.trim();
        if raw.len() != REGISTRY_FORMAT_LEN || !raw.starts_with('{') || !raw.ends_with('}') {
            return Err(GuidParseError(raw.to_string()));
        }
        let uuid = Uuid::parse_str(raw).map_err(|_| GuidParseError(raw.to_string()))?;
        let (data1, data2, data3, data4) = uuid.as_fields();
        Ok(Self {
            data1,
            data2,
            data3,
            data4: *data4,
        })
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a GUID in registry format: {0:?}")]
pub struct GuidParseError(pub String);

impl FromStr for Guid {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_registry_format(s)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub const IID_IUNKNOWN: InterfaceId = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);
pub const IID_IMARSHAL: InterfaceId = Guid::from_u128(0x00000003_0000_0000_c000_000000000046);
pub const IID_IAGILE_OBJECT: InterfaceId = Guid::from_u128(0x94ea2b94_e9cc_49e0_c0ff_ee64ca8f5b90);
pub const IID_ICLASS_FACTORY: InterfaceId =
    Guid::from_u128(0x00000001_0000_0000_c000_000000000046);

pub const CLSID_FREE_THREADED_MARSHALER: ClassId =
    Guid::from_u128(0x0000033a_0000_0000_c000_000000000046);

/// Proxy/stub classes that route through the automation (oleaut32) marshaler.
pub const CLSID_PS_OA_INTERFACE: ClassId =
    Guid::from_u128(0x00020424_0000_0000_c000_000000000046);
pub const CLSID_PS_DISPATCH: ClassId = Guid::from_u128(0x00020420_0000_0000_c000_000000000046);

pub fn is_automation_marshaler(clsid: &ClassId) -> bool {
    *clsid == CLSID_PS_OA_INTERFACE || *clsid == CLSID_PS_DISPATCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_format_case_insensitively() {
        let lower: Guid = "{0000033a-0000-0000-c000-000000000046}".parse().unwrap();
        assert_eq!(lower, CLSID_FREE_THREADED_MARSHALER);
        assert_eq!(
            lower.to_string(),
            "{0000033A-0000-0000-C000-000000000046}"
        );
    }

    #[test]
    fn rejects_unbraced_and_truncated_input() {
        assert!("0000033A-0000-0000-C000-000000000046".parse::<Guid>().is_err());
        assert!("{0000033A-0000-0000-C000-00000000004}".parse::<Guid>().is_err());
        assert!("{not-a-guid-at-all-xxxxxxxxxxxxxxxxxxx}".parse::<Guid>().is_err());
    }

    #[test]
    fn field_layout_matches_com() {
        let g = IID_IAGILE_OBJECT;
        assert_eq!(g.data1, 0x94ea2b94);
        assert_eq!(g.data2, 0xe9cc);
        assert_eq!(g.data3, 0x49e0);
        assert_eq!(g.data4, [0xc0, 0xff, 0xee, 0x64, 0xca, 0x8f, 0x5b, 0x90]);
    }
}
