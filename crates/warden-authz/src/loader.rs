//! Policy loading.
//!
//! A [`PolicyLoader`] turns the caller identity and the requested project into
//! the policy documents the evaluator checks. Loaders are chosen when the
//! endpoint registry is built and shared by every request.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use warden_core::{CallerIdentity, PolicyDocument, Repository, RepositoryError};

use crate::error::{PolicyLoadError, PolicyLoadResult};

/// Inputs to a policy load.
#[derive(Debug, Clone, Copy)]
pub struct PolicyLoadOptions<'a> {
    /// The authenticated caller.
    pub identity: &'a CallerIdentity,
    /// The project the request targets.
    pub project_id: u64,
    /// The request's cancellation token.
    pub cancel: &'a CancellationToken,
}

/// Resolves policy documents for a caller within a project.
///
/// An empty list is a valid answer and makes the evaluator deny.
#[async_trait]
pub trait PolicyLoader: Send + Sync + fmt::Debug {
    /// Loads every document that applies to the caller in the project.
    async fn load_policy_documents(
        &self,
        opts: &PolicyLoadOptions<'_>,
    ) -> PolicyLoadResult<Vec<PolicyDocument>>;
}

/// Loads policies through a [`Repository`].
///
/// - Users get every document attached to them in the project.
/// - API tokens get the single document stored on the token, after checking
///   that both the identity and the stored record are bound to the project.
#[derive(Clone)]
pub struct RepositoryPolicyLoader {
    repository: Arc<dyn Repository>,
}

impl RepositoryPolicyLoader {
    /// Creates a loader over `repository`.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

impl fmt::Debug for RepositoryPolicyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryPolicyLoader").finish_non_exhaustive()
    }
}

#[async_trait]
impl PolicyLoader for RepositoryPolicyLoader {
    #[instrument(skip_all, fields(caller = %opts.identity, project_id = opts.project_id))]
    async fn load_policy_documents(
        &self,
        opts: &PolicyLoadOptions<'_>,
    ) -> PolicyLoadResult<Vec<PolicyDocument>> {
        match *opts.identity {
            CallerIdentity::User { id } => {
                match self
                    .repository
                    .list_user_policies(opts.project_id, id, opts.cancel)
                    .await
                {
                    Ok(documents) => {
                        debug!(documents = documents.len(), "loaded user policies");
                        Ok(documents)
                    }
                    Err(RepositoryError::RecordNotFound) => {
                        debug!("no policies attached to user");
                        Ok(Vec::new())
                    }
                    Err(RepositoryError::Transient(source)) => Err(PolicyLoadError::Backend(source)),
                }
            }
            CallerIdentity::ApiToken { id, project_id } => {
                if project_id != opts.project_id {
                    return Err(PolicyLoadError::TokenProjectMismatch {
                        token_id: id,
                        token_project_id: project_id,
                        project_id: opts.project_id,
                    });
                }

                let token = match self.repository.read_api_token(id, opts.cancel).await {
                    Ok(token) => token,
                    Err(RepositoryError::RecordNotFound) => {
                        return Err(PolicyLoadError::TokenNotFound(id))
                    }
                    Err(RepositoryError::Transient(source)) => {
                        return Err(PolicyLoadError::Backend(source))
                    }
                };

                if token.project_id != opts.project_id {
                    return Err(PolicyLoadError::TokenProjectMismatch {
                        token_id: id,
                        token_project_id: token.project_id,
                        project_id: opts.project_id,
                    });
                }
                if token.revoked {
                    return Err(PolicyLoadError::TokenRevoked(id));
                }

                debug!("loaded token policy");
                Ok(vec![token.policy])
            }
        }
    }
}

/// Loader whose backend always fails.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingPolicyLoader;

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl PolicyLoader for FailingPolicyLoader {
    async fn load_policy_documents(
        &self,
        _opts: &PolicyLoadOptions<'_>,
    ) -> PolicyLoadResult<Vec<PolicyDocument>> {
        Err(PolicyLoadError::backend(anyhow::anyhow!(
            "policy backend unavailable"
        )))
    }
}

/// Loader that grants every caller the viewer preset on the requested project.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewerPolicyLoader;

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl PolicyLoader for ViewerPolicyLoader {
    async fn load_policy_documents(
        &self,
        opts: &PolicyLoadOptions<'_>,
    ) -> PolicyLoadResult<Vec<PolicyDocument>> {
        Ok(vec![PolicyDocument::viewer(opts.project_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::fixtures::{
        self, ReadTarget, ADMIN_TOKEN, ADMIN_USER, PROJECT_ID, REVOKED_TOKEN,
    };

    async fn load(
        repo: Arc<fixtures::InMemoryRepository>,
        identity: CallerIdentity,
        project_id: u64,
    ) -> PolicyLoadResult<Vec<PolicyDocument>> {
        let cancel = CancellationToken::new();
        RepositoryPolicyLoader::new(repo)
            .load_policy_documents(&PolicyLoadOptions {
                identity: &identity,
                project_id,
                cancel: &cancel,
            })
            .await
    }

    #[tokio::test]
    async fn test_user_policies() {
        let docs = load(
            Arc::new(fixtures::seeded()),
            CallerIdentity::user(ADMIN_USER),
            PROJECT_ID,
        )
        .await
        .unwrap();
        assert_eq!(docs, vec![PolicyDocument::admin(PROJECT_ID)]);
    }

    #[tokio::test]
    async fn test_user_without_policies_gets_empty_list() {
        let docs = load(Arc::new(fixtures::seeded()), CallerIdentity::user(99), PROJECT_ID)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_user_backend_failure() {
        let repo = Arc::new(fixtures::seeded());
        repo.fail(ReadTarget::UserPolicies);
        let err = load(repo, CallerIdentity::user(ADMIN_USER), PROJECT_ID)
            .await
            .unwrap_err();
        assert!(!err.is_denial());
    }

    #[tokio::test]
    async fn test_token_policy() {
        let docs = load(
            Arc::new(fixtures::seeded()),
            CallerIdentity::api_token(ADMIN_TOKEN, PROJECT_ID),
            PROJECT_ID,
        )
        .await
        .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn test_token_for_other_project_rejected_before_read() {
        let repo = Arc::new(fixtures::seeded());
        let err = load(
            Arc::clone(&repo),
            CallerIdentity::api_token(ADMIN_TOKEN, PROJECT_ID),
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PolicyLoadError::TokenProjectMismatch { .. }));
        assert!(!repo.was_read(ReadTarget::ApiToken));
    }

    #[tokio::test]
    async fn test_token_record_checked_against_project() {
        // The identity claims project 2 but the stored token belongs to project 1.
        let err = load(
            Arc::new(fixtures::seeded()),
            CallerIdentity::api_token(ADMIN_TOKEN, 2),
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PolicyLoadError::TokenProjectMismatch {
                token_project_id: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_revoked_and_unknown_tokens() {
        let repo = Arc::new(fixtures::seeded());
        let revoked = load(
            Arc::clone(&repo),
            CallerIdentity::api_token(REVOKED_TOKEN, PROJECT_ID),
            PROJECT_ID,
        )
        .await
        .unwrap_err();
        assert!(matches!(revoked, PolicyLoadError::TokenRevoked(_)));

        let unknown = load(repo, CallerIdentity::api_token(404, PROJECT_ID), PROJECT_ID)
            .await
            .unwrap_err();
        assert!(matches!(unknown, PolicyLoadError::TokenNotFound(404)));
    }

    #[tokio::test]
    async fn test_doubles() {
        let identity = CallerIdentity::user(1);
        let cancel = CancellationToken::new();
        let opts = PolicyLoadOptions {
            identity: &identity,
            project_id: 5,
            cancel: &cancel,
        };
        assert!(FailingPolicyLoader.load_policy_documents(&opts).await.is_err());
        assert_eq!(
            ViewerPolicyLoader.load_policy_documents(&opts).await.unwrap(),
            vec![PolicyDocument::viewer(5)]
        );
    }
}
