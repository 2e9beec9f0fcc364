//! Provision a staff account.
//!
//! Usage: create_user <email> <name> <admin|clinician> <password>
//! Reads DATABASE_URL from the environment (or .env).

use anyhow::{Context, bail};
use argon2::{Argon2, PasswordHasher};
use argon2::password_hash::{SaltString, rand_core::OsRng};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [email, name, role, password] = args.as_slice() else {
        bail!("Usage: create_user <email> <name> <admin|clinician> <password>");
    };

    let email = email.trim().to_lowercase();
    if !matches!(role.as_str(), "admin" | "clinician") {
        bail!("role must be admin or clinician, got {role:?}");
    }

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash error: {e}"))?
        .to_string();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = sqlx::PgPool::connect(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(name.trim())
    .bind(&email)
    .bind(&phc)
    .bind(role.as_str())
    .execute(&pool)
    .await
    .with_context(|| format!("could not insert {email}"))?;

    println!("{id}");
    Ok(())
}
