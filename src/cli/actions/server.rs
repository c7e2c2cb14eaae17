use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            redis_url,
            frontend_url,
            session_ttl,
            session_renewal,
        } => {
            let auth_config = AuthConfig::new(frontend_url)
                .with_session_ttl_seconds(session_ttl)
                .with_session_renewal_seconds(session_renewal);

            api::new(port, dsn, redis_url, auth_config).await?;
        }
    }

    Ok(())
}
