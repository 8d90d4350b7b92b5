use anyhow::Result;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::info;
use turfbook_models::{Account, AppRole, Profile};

use crate::begin_write;

const ACCOUNT_SELECT: &str = "SELECT u.id, u.email, r.role FROM users u \
    JOIN user_roles r ON r.user_id = u.id";

const PROFILE_COLUMNS: &str = "id, user_id, full_name, phone, city, avatar_url, created_at, updated_at";

/// Account plus the stored password hash, for sign-in only.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    #[sqlx(flatten)]
    pub account: Account,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
}

/// Creates the user, its role and an empty profile together.
pub async fn create_account(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    full_name: &str,
    role: AppRole,
) -> Result<Account> {
    let now = Utc::now();
    let mut tx = begin_write(pool).await?;

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(email)
    .bind(password_hash)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (?, ?)")
        .bind(id)
        .bind(role)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO profiles (user_id, full_name, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(full_name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Account {id} created for {email} as {role}");

    Ok(Account {
        id,
        email: email.to_string(),
        role,
    })
}

pub async fn find_credentials(pool: &SqlitePool, email: &str) -> Result<Option<Credentials>> {
    let creds = sqlx::query_as::<_, Credentials>(
        "SELECT u.id, u.email, r.role, u.password_hash FROM users u \
         JOIN user_roles r ON r.user_id = u.id WHERE u.email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(creds)
}

pub async fn get_account(pool: &SqlitePool, user_id: i64) -> Result<Option<Account>> {
    let sql = format!("{ACCOUNT_SELECT} WHERE u.id = ?");
    let account = sqlx::query_as::<_, Account>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

/// Returns false when no user has that email.
pub async fn set_role(pool: &SqlitePool, email: &str, role: AppRole) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE user_roles SET role = ? WHERE user_id = (SELECT id FROM users WHERE email = ?)",
    )
    .bind(role)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_profile(pool: &SqlitePool, user_id: i64) -> Result<Option<Profile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?");
    let profile = sqlx::query_as::<_, Profile>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(profile)
}

/// Fields left as `None` keep their current value.
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    update: &ProfileUpdate,
) -> Result<Option<Profile>> {
    let sql = format!(
        "UPDATE profiles SET \
            full_name = COALESCE(?, full_name), \
            phone = COALESCE(?, phone), \
            city = COALESCE(?, city), \
            updated_at = ? \
         WHERE user_id = ? RETURNING {PROFILE_COLUMNS}"
    );
    let profile = sqlx::query_as::<_, Profile>(&sql)
        .bind(&update.full_name)
        .bind(&update.phone)
        .bind(&update.city)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unique_violation;
    use crate::testing::{account, pool};

    #[tokio::test]
    async fn account_round_trip() {
        let pool = pool().await;
        let created = account(&pool, "asha@example.com", AppRole::Player).await;

        let fetched = get_account(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "asha@example.com");
        assert_eq!(fetched.role, AppRole::Player);

        let creds = find_credentials(&pool, "asha@example.com").await.unwrap().unwrap();
        assert_eq!(creds.account.id, created.id);
        assert_eq!(creds.password_hash, "not-a-real-hash");

        let profile = get_profile(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(profile.full_name, "Test User");
        assert!(profile.phone.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let pool = pool().await;
        account(&pool, "dup@example.com", AppRole::Owner).await;
        let err = create_account(&pool, "dup@example.com", "x", "Someone", AppRole::Player)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn role_can_be_changed_by_email() {
        let pool = pool().await;
        let created = account(&pool, "ops@example.com", AppRole::Player).await;
        assert!(set_role(&pool, "ops@example.com", AppRole::Admin).await.unwrap());
        assert!(!set_role(&pool, "nobody@example.com", AppRole::Admin).await.unwrap());
        let fetched = get_account(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.role, AppRole::Admin);
    }

    #[tokio::test]
    async fn profile_update_keeps_unset_fields() {
        let pool = pool().await;
        let created = account(&pool, "p@example.com", AppRole::Player).await;

        let update = ProfileUpdate {
            phone: Some("+91 98765 43210".into()),
            city: Some("Chennai".into()),
            ..Default::default()
        };
        let profile = update_profile(&pool, created.id, &update).await.unwrap().unwrap();
        assert_eq!(profile.full_name, "Test User");
        assert_eq!(profile.city.as_deref(), Some("Chennai"));

        assert!(update_profile(&pool, 999, &update).await.unwrap().is_none());
    }
}
