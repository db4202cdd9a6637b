//! Policy validation
//!
//! A [`PolicyValidator`] decides whether a user may reach a service or the
//! management interface. Denials are values, not errors: an `Err` means the
//! validator itself failed.

use async_trait::async_trait;

use crate::database::DbHandle;
use crate::error::Result;
use crate::model::{ErrorData, PolicyResult, Service, User};

/// Decision function evaluating a user against configured rules
#[async_trait]
pub trait PolicyValidator: Send + Sync {
    /// May `user` reach `service`?
    async fn validate(&self, db: &DbHandle, user: &User, service: &Service) -> Result<PolicyResult>;

    /// May `user` use the management interface?
    async fn validate_admin(&self, db: &DbHandle, user: &User) -> Result<PolicyResult>;
}

/// Role-matching policy
///
/// - disabled users are always denied
/// - a service with no roles admits nobody
/// - otherwise the user needs at least one of the service's roles
/// - management access requires the administrator flag
#[derive(Debug, Default, Clone)]
pub struct RolePolicy;

impl RolePolicy {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate without touching the database
    pub fn check_service(user: &User, service: &Service) -> PolicyResult {
        if user.disabled {
            return PolicyResult::Deny(ErrorData::unauthorized());
        }

        let allowed = service.roles.iter().any(|role| user.roles.contains(role));
        if allowed {
            PolicyResult::Pass
        } else {
            PolicyResult::Deny(ErrorData::unauthorized())
        }
    }

    /// Evaluate management access without touching the database
    pub fn check_admin(user: &User) -> PolicyResult {
        if user.disabled || !user.administrator {
            PolicyResult::Deny(ErrorData::unauthorized())
        } else {
            PolicyResult::Pass
        }
    }
}

#[async_trait]
impl PolicyValidator for RolePolicy {
    async fn validate(&self, _db: &DbHandle, user: &User, service: &Service) -> Result<PolicyResult> {
        Ok(Self::check_service(user, service))
    }

    async fn validate_admin(&self, _db: &DbHandle, user: &User) -> Result<PolicyResult> {
        Ok(Self::check_admin(user))
    }
}
