//! Basic session example
//!
//! Usage:
//!   FEED_API_URL=http://localhost:8080 FEED_USERNAME=alice FEED_PASSWORD=... \
//!     cargo run --example basic_session

use feed_auth_client::{AuthApiHttp, AuthContext, ClientConfig, FollowStatusCache};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let username = std::env::var("FEED_USERNAME").unwrap_or_else(|_| "alice".to_string());
    let password = std::env::var("FEED_PASSWORD").unwrap_or_default();

    println!("=== Feed Auth Client Example ===");
    println!("Endpoint: {}", config.base_url);
    println!("Refresh interval: {}s", config.refresh_interval_secs);
    println!();

    let api = AuthApiHttp::new(config.clone())?;
    let http_client = api.http_client().clone();
    let ctx = AuthContext::new(api, &config);

    let follows = FollowStatusCache::new();
    ctx.register_logout_listener(Arc::new(follows.clone()));

    println!("Signing in as {username}...");
    let login = ctx.sign_in(&username, &password).await?;
    println!("✓ Signed in as {} (user id {})", login.username, login.user_id);
    println!("  Refresh token issued: {}", login.refresh_token.is_some());
    println!();

    // Every request through this transport carries the bearer token and is
    // replayed once after a refresh if the backend answers 401
    let http = ctx.authorized_http(http_client);
    let url = format!("{}/api/posts/promoted?limit=5", config.base_url);
    match http.send_json::<serde_json::Value>(http.client().get(&url)).await {
        Ok(posts) => println!("✓ Promoted posts: {posts}"),
        Err(e) => println!("! Failed to load promoted posts: {e}"),
    }
    println!();

    println!("Forcing a token refresh...");
    if ctx.force_refresh().await {
        println!("✓ Access token refreshed");
    } else {
        println!("! Refresh failed, token marked invalid");
    }
    println!();

    ctx.logout();
    println!("✓ Logged out (session cleared: {})", !ctx.session().is_logged_in());

    Ok(())
}
