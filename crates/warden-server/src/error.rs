//! Server and registration errors.

use thiserror::Error;
use warden_core::DescriptorError;
use warden_router::RouteError;

/// Errors raised while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address could not be parsed or bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`EndpointRegistryBuilder::build`](crate::EndpointRegistryBuilder::build).
///
/// Registration fails fast: the first invalid endpoint aborts the build.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// An endpoint's descriptor or template is invalid.
    #[error("endpoint {method} {template}: {source}")]
    Descriptor {
        /// HTTP method.
        method: http::Method,
        /// URL template.
        template: String,
        /// What is wrong with it.
        #[source]
        source: DescriptorError,
    },

    /// An endpoint conflicts with one registered before it.
    #[error("endpoint {method} {template}: {source}")]
    Route {
        /// HTTP method.
        method: http::Method,
        /// URL template.
        template: String,
        /// The conflict.
        #[source]
        source: RouteError,
    },
}

impl RegistrationError {
    /// Returns the template of the offending endpoint.
    #[must_use]
    pub fn template(&self) -> &str {
        match self {
            Self::Descriptor { template, .. } | Self::Route { template, .. } => template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ScopeKind;

    #[test]
    fn test_display_names_endpoint() {
        let err = RegistrationError::Descriptor {
            method: http::Method::GET,
            template: "/clusters/{cluster_id}".to_string(),
            source: DescriptorError::RootNotProject(ScopeKind::Cluster),
        };
        assert_eq!(
            err.to_string(),
            "endpoint GET /clusters/{cluster_id}: scope list must start at project, found cluster"
        );
        assert_eq!(err.template(), "/clusters/{cluster_id}");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind("address in use".to_string());
        assert_eq!(err.to_string(), "bind error: address in use");
    }
}
