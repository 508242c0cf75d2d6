#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use serde_json::json;

    use crate::db::repositories::LocalRepository;
    use crate::db::repository::{RepositoryResult, UserRepository};
    use crate::models::{NewUser, RoleInput, UserId, UserUpdate};
    use crate::services::users::*;

    /// Reversible digest so tests do not pay for bcrypt rounds.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, plain: &str) -> RepositoryResult<String> {
            Ok(format!("plain:{}", plain))
        }

        fn verify(&self, plain: &str, digest: &str) -> RepositoryResult<bool> {
            Ok(digest == format!("plain:{}", plain))
        }
    }

    fn hasher() -> Arc<dyn PasswordHasher> {
        Arc::new(PlainHasher)
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn new_user(user_name: &str, status: bool) -> NewUser {
        NewUser {
            full_name: "Ana Costa".to_string(),
            user_name: user_name.to_string(),
            email: format!("{}@example.org", user_name),
            designation: Some("Operator".to_string()),
            role_id: None,
            status,
            password: "s3cret".to_string(),
            is_admin: false,
            parameters: None,
        }
    }

    fn credentials(user_name: &str, password: &str) -> Credentials {
        Credentials {
            user_name: user_name.to_string(),
            password: password.to_string(),
        }
    }

    async fn seeded(status: bool) -> (LocalRepository, UserId) {
        let repo = LocalRepository::new();
        let user = add_user(&repo, &hasher(), new_user("ana", status), now())
            .await
            .unwrap();
        (repo, user.id)
    }

    #[tokio::test]
    async fn test_add_user_hashes_password() {
        let (repo, id) = seeded(true).await;
        let stored = repo.find_user_by_name("ana").await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.password_hash, "plain:s3cret");
        assert_eq!(stored.parameters, json!({}));
    }

    #[tokio::test]
    async fn test_add_user_requires_password() {
        let repo = LocalRepository::new();
        let mut input = new_user("ana", true);
        input.password = "  ".to_string();
        let err = add_user(&repo, &hasher(), input, now()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_active_user_gets_status_log_on_creation() {
        let (repo, id) = seeded(true).await;
        let logs = repo.status_logs_of(id);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].activated_at, Some(now()));
        assert_eq!(logs[0].inactivated_at, None);
    }

    #[tokio::test]
    async fn test_update_user_keeps_password_when_omitted() {
        let (repo, id) = seeded(true).await;
        let update = UserUpdate {
            full_name: "Ana C.".to_string(),
            user_name: "ana".to_string(),
            email: "ana@example.org".to_string(),
            designation: None,
            role_id: None,
            status: true,
            password: None,
            parameters: None,
        };
        let user = update_user(&repo, &hasher(), id, update, now()).await.unwrap();
        assert_eq!(user.full_name, "Ana C.");
        assert_eq!(user.password_hash, "plain:s3cret");
    }

    #[tokio::test]
    async fn test_deactivation_closes_status_log() {
        let (repo, id) = seeded(true).await;
        let later = now() + Duration::hours(2);
        let change = update_status(&repo, id, false, later).await.unwrap();
        assert!(!change.user.status);
        let log = change.log.unwrap();
        assert_eq!(log.inactivated_at, Some(later));
    }

    #[tokio::test]
    async fn test_login_success_opens_session() {
        let repo = LocalRepository::new();
        let role = add_role(
            &repo,
            &RoleInput {
                name: "viewer".to_string(),
                description: None,
                permissions: json!("{\"dashboard\": true}"),
            },
        )
        .await
        .unwrap();
        let mut input = new_user("ana", true);
        input.role_id = Some(role.id);
        let user = add_user(&repo, &hasher(), input, now()).await.unwrap();

        let outcome = login(
            &repo,
            &hasher(),
            LoginPolicy::default(),
            &credentials("ana", "s3cret"),
            now(),
        )
        .await
        .unwrap();

        let LoginOutcome::Success(success) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(success.message, "Login successful");
        assert_eq!(success.user.role.as_deref(), Some("viewer"));
        assert_eq!(success.user.permissions, json!({"dashboard": true}));

        let sessions = repo.sessions_of(user.id);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, success.session_id);
        assert_eq!(sessions[0].logout_time, None);
    }

    #[tokio::test]
    async fn test_login_unknown_and_inactive_users() {
        let (repo, _) = seeded(false).await;
        let policy = LoginPolicy::default();

        let unknown = login(&repo, &hasher(), policy, &credentials("bob", "x"), now())
            .await
            .unwrap();
        assert_eq!(unknown, LoginOutcome::UnknownUser);

        let inactive = login(&repo, &hasher(), policy, &credentials("ana", "s3cret"), now())
            .await
            .unwrap();
        assert_eq!(inactive, LoginOutcome::Inactive);
        assert_eq!(inactive.message(), "User is not active. Please contact admin.");
    }

    #[tokio::test]
    async fn test_third_failure_locks_account() {
        let (repo, id) = seeded(true).await;
        let policy = LoginPolicy::default();
        let bad = credentials("ana", "wrong");

        for _ in 0..2 {
            let outcome = login(&repo, &hasher(), policy, &bad, now()).await.unwrap();
            assert_eq!(outcome, LoginOutcome::WrongPassword);
        }
        let outcome = login(&repo, &hasher(), policy, &bad, now()).await.unwrap();
        assert_eq!(outcome, LoginOutcome::LockedOut);

        let user = repo.find_user_by_name("ana").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.failed_attempts, 3);
        assert_eq!(user.on_hold_time, Some(now() + Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_on_hold_rejects_even_correct_password() {
        let (repo, id) = seeded(true).await;
        repo.record_failed_login(id, 3, Some(now() + Duration::minutes(30)))
            .await
            .unwrap();

        let at = now() + Duration::seconds(1);
        let outcome = login(
            &repo,
            &hasher(),
            LoginPolicy::default(),
            &credentials("ana", "s3cret"),
            at,
        )
        .await
        .unwrap();
        assert_eq!(outcome, LoginOutcome::OnHold { minutes_left: 30 });
        assert_eq!(outcome.message(), "Account locked. Try again after 30 minutes.");
    }

    #[tokio::test]
    async fn test_expired_hold_allows_login_and_resets_attempts() {
        let (repo, id) = seeded(true).await;
        repo.record_failed_login(id, 3, Some(now() - Duration::minutes(1)))
            .await
            .unwrap();

        let outcome = login(
            &repo,
            &hasher(),
            LoginPolicy::default(),
            &credentials("ana", "s3cret"),
            now(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));

        let user = repo.find_user_by_name("ana").await.unwrap().unwrap();
        assert_eq!(user.failed_attempts, 0);
        assert_eq!(user.on_hold_time, None);
    }

    #[tokio::test]
    async fn test_logout_closes_session() {
        let (repo, id) = seeded(true).await;
        let outcome = login(
            &repo,
            &hasher(),
            LoginPolicy::default(),
            &credentials("ana", "s3cret"),
            now(),
        )
        .await
        .unwrap();
        let LoginOutcome::Success(success) = outcome else {
            panic!("expected success");
        };

        assert_eq!(active_sessions(&repo).await.unwrap().count, 1);
        let later = now() + Duration::minutes(45);
        logout(&repo, success.session_id, later).await.unwrap();

        assert_eq!(active_sessions(&repo).await.unwrap().count, 0);
        assert_eq!(repo.sessions_of(id)[0].logout_time, Some(later));
    }

    #[test]
    fn test_normalize_permissions() {
        assert_eq!(
            normalize_permissions(&json!("{\"a\": [1, 2]}")),
            json!({"a": [1, 2]})
        );
        assert_eq!(normalize_permissions(&json!("not json")), json!({}));
        assert_eq!(normalize_permissions(&json!(null)), json!({}));
        assert_eq!(normalize_permissions(&json!({"b": 1})), json!({"b": 1}));
    }

    #[tokio::test]
    async fn test_recovery_checks() {
        let (repo, _) = seeded(true).await;
        let request = |user_name: &str, email: &str, password: Option<&str>| RecoveryRequest {
            user_name: user_name.to_string(),
            email_id: email.to_string(),
            password: password.map(str::to_string),
        };

        let check = forgot_request(&repo, &request("bob", "ana@example.org", None))
            .await
            .unwrap();
        assert_eq!(check.reason, Some("username"));

        let check = forgot_request(&repo, &request("ana", "other@example.org", None))
            .await
            .unwrap();
        assert_eq!(check.reason, Some("email"));

        let check = forgot_request(&repo, &request("ana", "ana@example.org", None))
            .await
            .unwrap();
        assert!(check.valid);

        let check = verify_user(
            &repo,
            &hasher(),
            &request("ana", "ana@example.org", Some("nope")),
        )
        .await
        .unwrap();
        assert_eq!(check.reason, Some("password"));
    }

    #[tokio::test]
    async fn test_reset_password() {
        let (repo, _) = seeded(true).await;
        reset_password(&repo, &hasher(), "ana", "fresh").await.unwrap();
        let user = repo.find_user_by_name("ana").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "plain:fresh");

        let err = reset_password(&repo, &hasher(), "bob", "fresh")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_check_username() {
        let (repo, _) = seeded(true).await;
        let check = check_username(&repo, "ana", "someone@example.org").await.unwrap();
        assert!(check.username_exists);
        assert!(!check.email_exists);
    }

    #[test]
    fn test_bcrypt_hasher_round_trip() {
        let hasher = BcryptHasher::new(4);
        let digest = hasher.hash("s3cret").unwrap();
        assert!(hasher.verify("s3cret", &digest).unwrap());
        assert!(!hasher.verify("wrong", &digest).unwrap());
        assert!(!hasher.verify("s3cret", "not-a-digest").unwrap());
    }
}
