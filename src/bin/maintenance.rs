//! Operational helper: find posts by a content pattern and, with `--purge`,
//! hard-delete the newest match together with its comments and likes. Goes
//! through the repository so the cascade rules live in exactly one place.

use anyhow::Context as _;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use networkup::repo::pg::PgRepo;
use networkup::repo::PostRepo;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut pattern = None;
    let mut purge = false;
    for arg in std::env::args().skip(1) {
        if arg == "--purge" {
            purge = true;
        } else {
            pattern = Some(arg);
        }
    }
    let Some(pattern) = pattern else {
        eprintln!("usage: maintenance <content-pattern> [--purge]");
        std::process::exit(2);
    };

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .context("failed to connect to Postgres")?;
    let repo = PgRepo::new(pool);

    let matches = repo
        .find_by_content(&pattern)
        .await
        .context("post search failed")?;
    if matches.is_empty() {
        println!("no posts match '{pattern}'");
        return Ok(());
    }

    println!("{} post(s) match '{pattern}':", matches.len());
    for post in &matches {
        println!(
            "  #{} user={} active={} created={} content={:?}",
            post.id, post.user_id, post.active, post.created_at, post.content
        );
    }

    if purge {
        // newest first, so the head of the list is the most recent match
        let newest = &matches[0];
        repo.purge_post(newest.id)
            .await
            .context("purge failed")?;
        println!("purged post #{} (comments and likes removed)", newest.id);
    }

    Ok(())
}
