use crate::asset_id::AssetUuid;
use std::fmt;

/// Stable identity of an asset or codec class.
///
/// Implement it with [`asset_type_info!`](crate::asset_type_info); the id is derived from the name
/// under the fixed type namespace and computed once per type.
pub trait TypeInfo {
    fn type_name() -> &'static str;
    fn type_uuid() -> AssetUuid;
}

/// Implements [`TypeInfo`] for a type, caching the derived id in a per-type static.
#[macro_export]
macro_rules! asset_type_info {
    ($ty:ty, $name:literal) => {
        impl $crate::type_info::TypeInfo for $ty {
            fn type_name() -> &'static str {
                $name
            }

            fn type_uuid() -> $crate::AssetUuid {
                static ID: ::std::sync::OnceLock<$crate::AssetUuid> = ::std::sync::OnceLock::new();
                *ID.get_or_init(|| $crate::AssetUuid::from_name($name))
            }
        }
    };
}

/// Fallback for classes that were never registered.
pub struct UnknownType;

impl TypeInfo for UnknownType {
    fn type_name() -> &'static str {
        "Unknown"
    }

    fn type_uuid() -> AssetUuid {
        AssetUuid::NULL
    }
}

pub fn type_name<T: TypeInfo>() -> &'static str {
    T::type_name()
}

pub fn type_id<T: TypeInfo>() -> AssetUuid {
    T::type_uuid()
}

/// Value form of a [`TypeInfo`] implementation, passed around by codecs and payloads.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: &'static str,
    id: AssetUuid,
}

impl TypeDescriptor {
    pub fn of<T: TypeInfo>() -> Self {
        Self { name: T::type_name(), id: T::type_uuid() }
    }

    pub fn unknown() -> Self {
        Self::of::<UnknownType>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> AssetUuid {
        self.id
    }

    pub fn is_known(&self) -> bool {
        !self.id.is_null()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    crate::asset_type_info!(Probe, "Probe");

    #[test]
    fn registered_type_id_depends_only_on_name() {
        assert_eq!(type_name::<Probe>(), "Probe");
        assert_eq!(type_id::<Probe>(), AssetUuid::from_name("Probe"));
        assert_eq!(type_id::<Probe>(), type_id::<Probe>());
        assert!(TypeDescriptor::of::<Probe>().is_known());
    }

    #[test]
    fn unknown_types_have_null_identity() {
        let unknown = TypeDescriptor::unknown();
        assert_eq!(unknown.name(), "Unknown");
        assert!(unknown.id().is_null());
        assert!(!unknown.is_known());
    }
}
