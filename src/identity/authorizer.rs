//! Authorization: deciding whether an authenticated [`Principal`] may invoke
//! a specific tool.
//!
//! Generalized from `security::policy::ToolPolicy`'s allow/deny matcher, with
//! one deliberate change: here deny is checked *before* allow. A tool policy
//! blocking `drop_table` should not be overridable by a caller's role grant
//! for an unrelated allow pattern; the only way a role should be able to
//! unblock a denied tool is by restating a principal-specific deny-override,
//! which this authorizer does not expose. `ToolPolicy` itself keeps its own
//! allow-first precedence for the static, identity-independent deny-list it
//! already applies ahead of this stage.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::canonical::CanonicalTool;
use crate::{Error, Result};

use super::Principal;

/// What a caller is trying to do, to be checked against policy.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    /// The authenticated (or anonymous) caller.
    pub principal: &'a Principal,
    /// The tool being invoked, carrying its `required_scopes`.
    pub tool: &'a CanonicalTool,
    /// Backend the tool is qualified under.
    pub backend: &'a str,
}

/// Decides whether an [`AuthorizationRequest`] is permitted.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` when the request is permitted, `Err(Error::Unauthorized)`
    /// otherwise.
    async fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<()>;
}

/// Role-to-permission grants plus explicit allow/deny tool lists, evaluated
/// deny-first.
#[derive(Debug, Clone, Default)]
pub struct RoleBasedAuthorizer {
    /// Explicit per-role tool allow patterns (`role -> {tool-or-prefix*}`).
    role_allow: std::collections::HashMap<String, Vec<String>>,
    /// Tool patterns denied regardless of role, checked first.
    deny_patterns: Vec<String>,
    /// Tool patterns allowed for any authenticated principal, checked after
    /// deny and before role-specific grants.
    allow_patterns: Vec<String>,
    /// Roles exempt from scope checks (e.g. an `admin` role).
    superuser_roles: HashSet<String>,
}

impl RoleBasedAuthorizer {
    /// Build from explicit deny/allow pattern lists and per-role grants.
    #[must_use]
    pub fn new(
        deny_patterns: Vec<String>,
        allow_patterns: Vec<String>,
        role_allow: std::collections::HashMap<String, Vec<String>>,
        superuser_roles: HashSet<String>,
    ) -> Self {
        Self { role_allow, deny_patterns, allow_patterns, superuser_roles }
    }

    fn matches(tool: &str, qualified: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => tool.starts_with(prefix) || qualified.starts_with(prefix),
            None => tool == p || qualified == p,
        })
    }
}

#[async_trait]
impl Authorizer for RoleBasedAuthorizer {
    async fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<()> {
        let tool = request.tool.id.as_str();
        let qualified = request.tool.qualified_id();

        // Deny first: no role or allow-list can override an explicit deny.
        if Self::matches(tool, &qualified, &self.deny_patterns) {
            return Err(Error::Unauthorized(format!(
                "tool '{qualified}' is denied by policy"
            )));
        }

        let is_superuser = request.principal.roles.iter().any(|r| self.superuser_roles.contains(r));

        if !is_superuser && !request.tool.required_scopes.is_empty() {
            if !request.principal.has_scopes(&request.tool.required_scopes) {
                return Err(Error::Unauthorized(format!(
                    "principal '{}' lacks required scopes for '{qualified}'",
                    request.principal.id
                )));
            }
        }

        if is_superuser || Self::matches(tool, &qualified, &self.allow_patterns) {
            return Ok(());
        }

        for role in &request.principal.roles {
            if let Some(patterns) = self.role_allow.get(role) {
                if Self::matches(tool, &qualified, patterns) {
                    return Ok(());
                }
            }
        }

        Err(Error::Unauthorized(format!(
            "principal '{}' is not permitted to invoke '{qualified}'",
            request.principal.id
        )))
    }
}

/// Adapts an external policy engine (OPA-style, or any service answering a
/// yes/no question about a resource+action+context tuple) to the
/// [`Authorizer`] contract.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluate one authorization decision against external policy.
    ///
    /// `extra_context` lets callers pass request-specific facts (arguments,
    /// time of day, tenant quota state) the policy may want to consult
    /// beyond what `AuthorizationRequest` already carries.
    async fn evaluate(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
        extra_context: &serde_json::Value,
    ) -> Result<bool>;
}

/// Wraps a [`PolicyEngine`], defaulting to deny when no rule matches.
pub struct ExternalPolicyAuthorizer {
    engine: std::sync::Arc<dyn PolicyEngine>,
}

impl ExternalPolicyAuthorizer {
    /// Wrap an external policy engine.
    #[must_use]
    pub fn new(engine: std::sync::Arc<dyn PolicyEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Authorizer for ExternalPolicyAuthorizer {
    async fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<()> {
        let qualified = request.tool.qualified_id();
        let allowed = self
            .engine
            .evaluate(
                request.principal,
                &qualified,
                "invoke",
                &serde_json::json!({"backend": request.backend}),
            )
            .await?;
        if allowed {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "policy engine denied '{}' for principal '{}'",
                qualified, request.principal.id
            )))
        }
    }
}
