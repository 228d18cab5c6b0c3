//! Account lifecycle: registration, login, profile edits, password changes
//! and account deletion.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, User,
};
use crate::store::{Store, StoreError};
use crate::validation::{self, ValidationErrors};

pub struct AccountService {
    store: Arc<Store>,
    auth: Arc<AuthService>,
}

impl AccountService {
    pub fn new(store: Arc<Store>, auth: Arc<AuthService>) -> Self {
        Self { store, auth }
    }

    pub fn register(&self, req: &RegisterRequest) -> AppResult<AuthResponse> {
        let account = validation::validate_registration(req)?;
        let password_hash = self.auth.hash_password(&account.password)?;

        let mut user = User::new(&account.username, &account.email, password_hash, &account.full_name);
        self.store.create_user(&mut user)?;
        log::info!("Registered user {} ({})", user.username, user.id);

        let token = self.auth.generate_token(&user.id)?;
        Ok(AuthResponse {
            token,
            user: user.public_profile(),
        })
    }

    pub fn login(&self, req: &LoginRequest) -> AppResult<AuthResponse> {
        let email = validation::validate_login(&req.email, &req.password)?;

        let user = match self.store.get_user_by_email(&email) {
            Ok(u) => u,
            Err(StoreError::NotFound(_)) => return Err(AppError::auth("Invalid credentials")),
            Err(e) => return Err(e.into()),
        };
        if !self.auth.verify_password(&req.password, &user.password_hash)? {
            return Err(AppError::auth("Invalid credentials"));
        }

        let token = self.auth.generate_token(&user.id)?;
        Ok(AuthResponse {
            token,
            user: user.public_profile(),
        })
    }

    /// The caller's own record, email and relation lists included.
    pub fn get_profile(&self, user_id: &str) -> AppResult<User> {
        Ok(self.store.get_user(user_id)?)
    }

    pub fn update_profile(&self, user_id: &str, req: &UpdateProfileRequest) -> AppResult<User> {
        validation::validate_profile_update(req)?;
        let mut user = self.store.get_user(user_id)?;

        if let Some(full_name) = &req.full_name {
            user.full_name = full_name.trim().to_string();
        }
        if let Some(bio) = &req.bio {
            user.bio = bio.trim().to_string();
        }
        if let Some(location) = &req.location {
            user.location = location.trim().to_string();
        }
        if let Some(website) = &req.website {
            user.website = website.trim().to_string();
        }
        if let Some(picture) = &req.profile_picture {
            user.profile_picture = picture.trim().to_string();
        }
        if let Some(cover) = &req.cover_photo {
            user.cover_photo = cover.trim().to_string();
        }
        if let Some(is_private) = req.is_private {
            user.is_private = is_private;
        }

        self.store.update_user_profile(&mut user)?;
        Ok(user)
    }

    pub fn change_password(&self, user_id: &str, req: &ChangePasswordRequest) -> AppResult<()> {
        validation::validate_password_change(req)?;
        let user = self.store.get_user(user_id)?;

        if !self.auth.verify_password(&req.current_password, &user.password_hash)? {
            return Err(ValidationErrors::single(
                "currentPassword",
                "incorrect",
                "Current password is incorrect",
            )
            .into());
        }

        let password_hash = self.auth.hash_password(&req.new_password)?;
        self.store.update_password_hash(user_id, &password_hash)?;
        log::info!("Password changed for user {}", user_id);
        Ok(())
    }

    pub fn refresh_token(&self, user_id: &str) -> AppResult<String> {
        Ok(self.auth.generate_token(user_id)?)
    }

    /// Deletes the account and everything it owns once the password checks out.
    pub fn delete_account(&self, user_id: &str, password: &str) -> AppResult<()> {
        let user = self.store.get_user(user_id)?;
        if !self.auth.verify_password(password, &user.password_hash)? {
            return Err(ValidationErrors::single("password", "incorrect", "Password is incorrect").into());
        }

        self.store.delete_user(user_id)?;
        log::info!("Deleted account {} ({})", user.username, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccountService {
        let store = Arc::new(Store::in_memory().unwrap());
        let auth = Arc::new(AuthService::new("test_secret".to_string(), store.clone()).with_bcrypt_cost(4));
        AccountService::new(store, auth)
    }

    fn register_jane(accounts: &AccountService) -> AuthResponse {
        accounts
            .register(&RegisterRequest {
                username: "jane".to_string(),
                email: " Jane@Example.com ".to_string(),
                password: "secret123".to_string(),
                full_name: "Jane Doe".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_register_then_login() {
        let accounts = service();
        let registered = register_jane(&accounts);
        assert!(!registered.token.is_empty());

        let logged_in = accounts
            .login(&LoginRequest {
                email: "jane@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
    }

    #[test]
    fn test_login_with_wrong_password() {
        let accounts = service();
        register_jane(&accounts);

        let err = accounts
            .login(&LoginRequest {
                email: "jane@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[test]
    fn test_duplicate_registration_conflicts() {
        let accounts = service();
        register_jane(&accounts);

        let err = accounts
            .register(&RegisterRequest {
                username: "jane".to_string(),
                email: "someone@example.com".to_string(),
                password: "secret123".to_string(),
                full_name: "Another Jane".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_change_password_checks_current() {
        let accounts = service();
        let jane = register_jane(&accounts);

        let err = accounts
            .change_password(
                &jane.user.id,
                &ChangePasswordRequest {
                    current_password: "nope-nope".to_string(),
                    new_password: "newsecret".to_string(),
                },
            )
            .unwrap_err();
        match err {
            AppError::Validation(e) => assert!(e.has_field("currentPassword")),
            other => panic!("unexpected error: {:?}", other),
        }

        accounts
            .change_password(
                &jane.user.id,
                &ChangePasswordRequest {
                    current_password: "secret123".to_string(),
                    new_password: "newsecret".to_string(),
                },
            )
            .unwrap();
        assert!(accounts
            .login(&LoginRequest {
                email: "jane@example.com".to_string(),
                password: "newsecret".to_string(),
            })
            .is_ok());
    }

    #[test]
    fn test_update_profile_trims_fields() {
        let accounts = service();
        let jane = register_jane(&accounts);

        let user = accounts
            .update_profile(
                &jane.user.id,
                &UpdateProfileRequest {
                    bio: Some("  Photographer  ".to_string()),
                    website: Some("https://jane.example.com".to_string()),
                    ..UpdateProfileRequest::default()
                },
            )
            .unwrap();
        assert_eq!(user.bio, "Photographer");
        assert_eq!(accounts.get_profile(&jane.user.id).unwrap().website, "https://jane.example.com");
    }

    #[test]
    fn test_delete_account_requires_password() {
        let accounts = service();
        let jane = register_jane(&accounts);

        assert!(matches!(
            accounts.delete_account(&jane.user.id, "wrong-password"),
            Err(AppError::Validation(_))
        ));
        accounts.delete_account(&jane.user.id, "secret123").unwrap();
        assert!(matches!(accounts.get_profile(&jane.user.id), Err(AppError::NotFound(_))));
    }
}
