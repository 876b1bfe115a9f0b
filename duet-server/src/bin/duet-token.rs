//! Issue a bearer token for the HMAC verifier.
//!
//! Usage:
//!   DUET_TOKEN_SECRET=... cargo run --bin duet-token -- --uid u1 --email u1@example.com
//!
//! The token works both as `?token=` on `/ws/chat` and as
//! `Authorization: Bearer` on the REST API of a server started with the same
//! secret.

use anyhow::Result;
use clap::Parser;
use duet_server::verifiers::{HmacTokenVerifier, TokenClaims};

#[derive(Parser)]
#[command(name = "duet-token", about = "Issue a signed bearer token")]
struct Args {
    /// Shared HMAC secret (same as the server's --token-secret).
    #[arg(long, env = "DUET_TOKEN_SECRET", hide_env_values = true)]
    secret: String,

    /// User id to embed as the token subject.
    #[arg(long)]
    uid: String,

    #[arg(long)]
    email: Option<String>,

    /// Display name.
    #[arg(long)]
    name: Option<String>,

    /// Lifetime in seconds.
    #[arg(long, default_value_t = 86_400)]
    ttl_secs: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.uid.trim().is_empty() {
        anyhow::bail!("--uid must not be blank");
    }
    let verifier = HmacTokenVerifier::new(&args.secret)?;
    let claims = TokenClaims {
        sub: args.uid,
        email: args.email,
        name: args.name,
        exp: chrono::Utc::now().timestamp() + args.ttl_secs,
    };
    println!("{}", verifier.issue(&claims));
    Ok(())
}
