use std::time::Duration;

use jiff::Timestamp;
use jsonwebtoken::{EncodingKey, Header};
use jwt_autorefresh::{AutoRefresh, AutoRefreshOptions, Settings, SettingsLocation};

fn issue_token(ttl_secs: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Timestamp::now().as_second();
    jsonwebtoken::encode(
        &Header::default(),
        &serde_json::json!({ "sub": "demo", "iat": now, "exp": now + ttl_secs }),
        &EncodingKey::from_secret(b"demo-secret"),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt().try_init();

    // AUTOREFRESH_LEAD_SECONDS=2 cargo run --example refresh_loop --features unstable-example
    let options = AutoRefreshOptions::new().refresh_async(|| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        issue_token(5)
    });
    let options = match Settings::load(SettingsLocation::Env) {
        Ok(settings) => settings.apply(options),
        Err(_) => options.lead_seconds(2.0),
    };

    let autorefresh = AutoRefresh::new(options)?;
    let handle = autorefresh.start(issue_token(5)?)?;
    tokio::time::sleep(Duration::from_secs(12)).await;
    handle.cancel();
    Ok(())
}
