//! Endpoint descriptors.
//!
//! Every route declares an [`EndpointDescriptor`]: the HTTP method, the verb
//! it performs, and the ordered scope kinds whose identifiers its URL carries.
//! Descriptors are only obtainable through [`EndpointDescriptorBuilder::build`],
//! which rejects scope lists that are not a root-to-leaf path of the scope tree.

use http::Method;
use std::fmt;
use thiserror::Error;
use warden_router::{template_params, RouteError};

use crate::scope::{ScopeKind, Verb};

/// A check that runs after hydration and can deny a request based on
/// feature flags of hydrated resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGate {
    /// Preview environments must be enabled on the project and the cluster.
    PreviewEnvironments,
    /// Stacks must be enabled on the project.
    Stacks,
}

impl FeatureGate {
    /// Scope kinds the gate reads; the endpoint must declare all of them.
    #[must_use]
    pub const fn required_scopes(self) -> &'static [ScopeKind] {
        match self {
            Self::PreviewEnvironments => &[ScopeKind::Project, ScopeKind::Cluster],
            Self::Stacks => &[ScopeKind::Project],
        }
    }

    /// Returns the gate name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreviewEnvironments => "preview_environments",
            Self::Stacks => "stacks",
        }
    }
}

impl fmt::Display for FeatureGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while validating a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// No verb was declared.
    #[error("endpoint declares no verb")]
    MissingVerb,

    /// The scope list is empty.
    #[error("endpoint declares no scopes")]
    Empty,

    /// The first scope is not `project`.
    #[error("scope list must start at project, found {0}")]
    RootNotProject(ScopeKind),

    /// A scope does not follow its parent.
    #[error("scope {scope} must follow its parent {expected}, found {found}")]
    NotChildOf {
        /// Offending scope.
        scope: ScopeKind,
        /// Its parent.
        expected: ScopeKind,
        /// The scope actually preceding it.
        found: ScopeKind,
    },

    /// A scope appears twice.
    #[error("scope {0} declared twice")]
    Duplicate(ScopeKind),

    /// A gate reads a scope the endpoint does not declare.
    #[error("gate {gate} requires scope {scope}")]
    GateRequires {
        /// Gate.
        gate: FeatureGate,
        /// Missing scope.
        scope: ScopeKind,
    },

    /// The template does not capture a scope's parameter.
    #[error("template {template} has no {{{param}}} capture for scope {scope}")]
    MissingParam {
        /// Template.
        template: String,
        /// Scope.
        scope: ScopeKind,
        /// Parameter name the scope reads.
        param: &'static str,
    },

    /// The template is malformed.
    #[error(transparent)]
    InvalidTemplate(#[from] RouteError),
}

/// Immutable declaration attached to each route.
///
/// # Example
///
/// ```
/// use http::Method;
/// use warden_core::{EndpointDescriptor, ScopeKind, Verb};
///
/// let descriptor = EndpointDescriptor::builder(Method::POST)
///     .verb(Verb::Create)
///     .scopes([ScopeKind::Project, ScopeKind::Cluster])
///     .build()
///     .unwrap();
///
/// assert_eq!(descriptor.verb(), Verb::Create);
/// assert!(descriptor
///     .validate_template("/projects/{project_id}/clusters/{cluster_id}")
///     .is_ok());
///
/// // Reversed order is rejected.
/// assert!(EndpointDescriptor::builder(Method::POST)
///     .verb(Verb::Create)
///     .scopes([ScopeKind::Cluster, ScopeKind::Project])
///     .build()
///     .is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    method: Method,
    verb: Verb,
    scopes: Vec<ScopeKind>,
    gates: Vec<FeatureGate>,
}

impl EndpointDescriptor {
    /// Starts a descriptor for `method`.
    #[must_use]
    pub fn builder(method: Method) -> EndpointDescriptorBuilder {
        EndpointDescriptorBuilder {
            method,
            verb: None,
            scopes: Vec::new(),
            gates: Vec::new(),
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Verb applied to every scope.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Scopes in root-to-leaf order.
    #[must_use]
    pub fn scopes(&self) -> &[ScopeKind] {
        &self.scopes
    }

    /// Feature gates applied after hydration.
    #[must_use]
    pub fn gates(&self) -> &[FeatureGate] {
        &self.gates
    }

    /// Checks that `template` captures every declared scope's parameter.
    pub fn validate_template(&self, template: &str) -> Result<(), DescriptorError> {
        let captured = template_params(template)?;
        for scope in &self.scopes {
            let param = scope.param_name();
            if !captured.iter().any(|c| c == param) {
                return Err(DescriptorError::MissingParam {
                    template: template.to_string(),
                    scope: *scope,
                    param,
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`EndpointDescriptor`].
#[derive(Debug, Clone)]
pub struct EndpointDescriptorBuilder {
    method: Method,
    verb: Option<Verb>,
    scopes: Vec<ScopeKind>,
    gates: Vec<FeatureGate>,
}

impl EndpointDescriptorBuilder {
    /// Sets the verb.
    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Appends scopes in root-to-leaf order.
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = ScopeKind>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    /// Adds a feature gate.
    pub fn gate(mut self, gate: FeatureGate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Returns the method being declared.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Validates and freezes the descriptor.
    pub fn build(self) -> Result<EndpointDescriptor, DescriptorError> {
        let verb = self.verb.ok_or(DescriptorError::MissingVerb)?;
        validate_scopes(&self.scopes)?;

        for gate in &self.gates {
            if let Some(missing) = gate
                .required_scopes()
                .iter()
                .find(|s| !self.scopes.contains(s))
            {
                return Err(DescriptorError::GateRequires {
                    gate: *gate,
                    scope: *missing,
                });
            }
        }

        Ok(EndpointDescriptor {
            method: self.method,
            verb,
            scopes: self.scopes,
            gates: self.gates,
        })
    }
}

fn validate_scopes(scopes: &[ScopeKind]) -> Result<(), DescriptorError> {
    let (first, rest) = scopes.split_first().ok_or(DescriptorError::Empty)?;
    if *first != ScopeKind::Project {
        return Err(DescriptorError::RootNotProject(*first));
    }

    for (i, scope) in scopes.iter().enumerate() {
        if scopes[..i].contains(scope) {
            return Err(DescriptorError::Duplicate(*scope));
        }
    }

    let mut previous = *first;
    for scope in rest {
        match scope.parent() {
            Some(parent) if parent == previous => previous = *scope,
            Some(parent) => {
                return Err(DescriptorError::NotChildOf {
                    scope: *scope,
                    expected: parent,
                    found: previous,
                })
            }
            None => return Err(DescriptorError::Duplicate(*scope)),
        }
    }
    Ok(())
}
