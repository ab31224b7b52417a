use crate::error::AppError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// The caller of a protected route, placed in request extensions by
/// `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req.extensions().get::<AuthUser>().cloned();
        ready(user.ok_or_else(|| AppError::Unauthorized("Token not provided".into()).into()))
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".into()))
        }
    }

    /// Admins may act on anyone, employees only on themselves.
    pub fn require_self_or_admin(&self, user_id: u64) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: 5,
            email: "caller@example.com".into(),
            role,
        }
    }

    #[test]
    fn only_admins_pass_admin_guard() {
        assert!(caller(Role::Admin).require_admin().is_ok());
        assert!(matches!(
            caller(Role::Employee).require_admin(),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn employees_may_act_on_themselves() {
        let employee = caller(Role::Employee);
        assert!(employee.require_self_or_admin(5).is_ok());
        assert!(employee.require_self_or_admin(6).is_err());
        assert!(caller(Role::Admin).require_self_or_admin(6).is_ok());
    }
}
