pub mod server;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        redis_url: String,
        frontend_url: String,
        session_ttl: i64,
        session_renewal: i64,
    },
}
