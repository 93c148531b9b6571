use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Namespace under which every name-based identity is hashed.
pub const TYPE_NAMESPACE: AssetUuid = AssetUuid(Uuid::from_bytes([
    0xf8, 0x1d, 0x4f, 0xae, 0x7d, 0xec, 0x11, 0xd0, 0xa7, 0x65, 0x00, 0xa0, 0xc9, 0x1e, 0x6b, 0xf6,
]));

/// 128-bit identity used for asset instances and for asset/codec types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetUuid(Uuid);

impl AssetUuid {
    pub const NULL: AssetUuid = AssetUuid(Uuid::nil());

    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic identity of `name` under [`TYPE_NAMESPACE`].
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&TYPE_NAMESPACE.0, name.as_bytes()))
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub const fn to_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }

    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AssetUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for AssetUuid {
    type Err = uuid::Error;

    /// Accepts hyphenated, simple (hex) and braced forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for AssetUuid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
