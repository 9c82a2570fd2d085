//! Typed URL parameter extraction.
//!
//! The router captures raw strings. [`UrlParams`] converts them to the shape
//! a scope kind declares, failing with [`ApiError::MalformedParameter`].

use uuid::Uuid;
use warden_router::Params;

use crate::error::ApiError;
use crate::scope::{IdKind, ResourceId, ScopeKind};

const UUID_LEN: usize = 36;
const UUID_HYPHENS: [usize; 4] = [8, 13, 18, 23];

/// Typed view over captured path parameters.
///
/// # Example
///
/// ```
/// use warden_core::UrlParams;
/// use warden_router::Params;
///
/// let params: Params = [("project_id".to_string(), "12".to_string())].into_iter().collect();
/// let url = UrlParams::new(&params);
///
/// assert_eq!(url.get_uint("project_id").unwrap(), 12);
/// assert!(url.get_uuid("project_id").is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct UrlParams<'a> {
    params: &'a Params,
}

impl<'a> UrlParams<'a> {
    /// Wraps captured parameters.
    #[must_use]
    pub const fn new(params: &'a Params) -> Self {
        Self { params }
    }

    fn raw(&self, name: &str, expected: IdKind) -> Result<&'a str, ApiError> {
        self.params
            .get(name)
            .ok_or_else(|| ApiError::malformed_parameter(name, "", expected))
    }

    /// Parses a base-10 unsigned 64-bit integer.
    ///
    /// Only ASCII digits are accepted: no sign, no whitespace.
    pub fn get_uint(&self, name: &str) -> Result<u64, ApiError> {
        let value = self.raw(name, IdKind::Uint)?;
        parse_uint(value).ok_or_else(|| ApiError::malformed_parameter(name, value, IdKind::Uint))
    }

    /// Returns a non-empty string parameter.
    pub fn get_string(&self, name: &str) -> Result<String, ApiError> {
        let value = self.raw(name, IdKind::Name)?;
        if value.is_empty() {
            return Err(ApiError::malformed_parameter(name, value, IdKind::Name));
        }
        Ok(value.to_string())
    }

    /// Parses a canonical hyphenated UUID.
    pub fn get_uuid(&self, name: &str) -> Result<Uuid, ApiError> {
        let value = self.raw(name, IdKind::Uuid)?;
        parse_uuid(value).ok_or_else(|| ApiError::malformed_parameter(name, value, IdKind::Uuid))
    }

    /// Extracts the identifier for `kind` from the parameter it declares.
    pub fn get(&self, kind: ScopeKind) -> Result<ResourceId, ApiError> {
        let name = kind.param_name();
        match kind.id_kind() {
            IdKind::Uint => self.get_uint(name).map(ResourceId::Uint),
            IdKind::Name => self.get_string(name).map(ResourceId::Name),
            IdKind::Uuid => self.get_uuid(name).map(ResourceId::Uuid),
        }
    }

    /// Returns true if the route captured `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.contains(name)
    }
}

fn parse_uint(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_uuid(value: &str) -> Option<Uuid> {
    let bytes = value.as_bytes();
    if bytes.len() != UUID_LEN {
        return None;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| {
        if UUID_HYPHENS.contains(&i) {
            *b == b'-'
        } else {
            b.is_ascii_hexdigit()
        }
    });
    if !well_formed {
        return None;
    }
    Uuid::parse_str(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_get_uint() {
        let p = params(&[("project_id", "42"), ("cluster_id", "-1"), ("infra_id", " 3")]);
        let url = UrlParams::new(&p);
        assert_eq!(url.get_uint("project_id").unwrap(), 42);
        assert!(url.get_uint("cluster_id").is_err());
        assert!(url.get_uint("infra_id").is_err());
    }

    #[test]
    fn test_get_uint_overflow() {
        let p = params(&[("project_id", "18446744073709551616")]);
        let err = UrlParams::new(&p).get_uint("project_id").unwrap_err();
        assert_eq!(
            err.external_message().as_deref(),
            Some("could not convert url parameter project_id to uint, got 18446744073709551616")
        );
    }

    #[test]
    fn test_missing_parameter_has_empty_value() {
        let p = params(&[]);
        let err = UrlParams::new(&p).get_uint("project_id").unwrap_err();
        assert!(matches!(
            err,
            ApiError::MalformedParameter { ref value, .. } if value.is_empty()
        ));
    }

    #[test]
    fn test_get_string() {
        let p = params(&[("namespace", "default"), ("name", "")]);
        let url = UrlParams::new(&p);
        assert_eq!(url.get_string("namespace").unwrap(), "default");
        assert!(url.get_string("name").is_err());
    }

    #[test]
    fn test_get_uuid_requires_canonical_form() {
        let p = params(&[
            ("revision_id", "550e8400-e29b-41d4-a716-446655440000"),
            ("simple", "550e8400e29b41d4a716446655440000"),
            ("braced", "{550e8400-e29b-41d4-a716-446655440000}"),
            ("urn", "urn:uuid:550e8400-e29b-41d4-a716-446655440000"),
        ]);
        let url = UrlParams::new(&p);
        assert!(url.get_uuid("revision_id").is_ok());
        assert!(url.get_uuid("simple").is_err());
        assert!(url.get_uuid("braced").is_err());
        assert!(url.get_uuid("urn").is_err());
    }

    #[test]
    fn test_get_by_scope_kind() {
        let p = params(&[
            ("project_id", "1"),
            ("namespace", "default"),
            ("revision_id", "550e8400-e29b-41d4-a716-446655440000"),
        ]);
        let url = UrlParams::new(&p);
        assert_eq!(url.get(ScopeKind::Project).unwrap(), ResourceId::Uint(1));
        assert_eq!(
            url.get(ScopeKind::Namespace).unwrap(),
            ResourceId::Name("default".to_string())
        );
        assert!(matches!(
            url.get(ScopeKind::ApiContractRevision).unwrap(),
            ResourceId::Uuid(_)
        ));
        assert!(url.get(ScopeKind::Cluster).is_err());
    }

    proptest! {
        #[test]
        fn prop_uint_round_trip(n in any::<u64>()) {
            let value = n.to_string();
            let p = params(&[("project_id", &value)]);
            prop_assert_eq!(UrlParams::new(&p).get_uint("project_id").unwrap(), n);
        }

        #[test]
        fn prop_non_digit_rejected(value in "[0-9]{0,4}[^0-9][0-9]{0,4}") {
            let p = params(&[("project_id", &value)]);
            prop_assert!(UrlParams::new(&p).get_uint("project_id").is_err());
        }

        #[test]
        fn prop_uuid_round_trip(n in any::<u128>()) {
            let id = Uuid::from_u128(n);
            let value = id.hyphenated().to_string();
            let p = params(&[("revision_id", &value)]);
            prop_assert_eq!(UrlParams::new(&p).get_uuid("revision_id").unwrap(), id);
        }

        #[test]
        fn prop_simple_uuid_rejected(n in any::<u128>()) {
            let value = Uuid::from_u128(n).simple().to_string();
            let p = params(&[("revision_id", &value)]);
            prop_assert!(UrlParams::new(&p).get_uuid("revision_id").is_err());
        }

        #[test]
        fn prop_non_empty_string_accepted(value in "[a-z0-9-]{1,32}") {
            let p = params(&[("namespace", &value)]);
            prop_assert_eq!(UrlParams::new(&p).get_string("namespace").unwrap(), value);
        }
    }
}
