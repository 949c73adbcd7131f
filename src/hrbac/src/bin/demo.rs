//! # HRBAC Demo
//!
//! Builds an engine, compiles a few guards and logs their verdicts.
//!
//! ## Usage
//!
//! ```text
//! hrbac-demo [POLICY_DOCUMENT.json]
//! ```
//!
//! Without an argument the built-in policy is used. A policy document may
//! reference the `is group owner` function, which the demo registers in
//! code before loading.
//!
//! Environment variables:
//! - `RUST_LOG` - Log level (default: info)

use anyhow::Context;
use hrbac::{Hrbac, Parents, PolicyDocument, Predicate, Rejection, UnauthorizedHandler};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stand-in for a membership lookup in a backing store
async fn owns_group(req: &Value) -> bool {
    tokio::time::sleep(Duration::from_millis(5)).await;
    req["params"]["groupId"] == 10 && req["user"]["id"] == "alice"
}

fn build_engine(document: Option<PolicyDocument>) -> anyhow::Result<Hrbac<Value>> {
    let hrbac: Hrbac<Value> = Hrbac::new();

    hrbac.add_function(
        "is group owner",
        Predicate::deferred(|req: &Value, _: &()| Box::pin(async move { Ok(owns_group(req).await) })),
    )?;

    hrbac.set_unauthorized_handler(UnauthorizedHandler::immediate(|req: &Value, _: &(), data| {
        let path = req["route"]["path"].as_str().unwrap_or("?");
        let mut rejection = Rejection::unauthorized();
        if let Some(reason) = data.and_then(|d| d["reason"].as_str()) {
            rejection.message = format!("Unauthorized: {} ({})", reason, path);
        }
        rejection
    }));

    match document {
        Some(document) => hrbac.load_document(&document)?,
        None => {
            hrbac.add_role("guest", Parents::None)?;
            hrbac.add_role("user", "guest")?;
            hrbac.add_role("admin", ["user"])?;

            let rule = hrbac.or("admin", hrbac.and("user", "is group owner")?)?;
            hrbac.add_function("is admin or group owner", rule)?;
        }
    }

    Ok(hrbac)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HRBAC demo v{}", hrbac::VERSION);

    let document = match std::env::args().nth(1) {
        Some(path) => Some(
            PolicyDocument::from_path(&path)
                .with_context(|| format!("failed to read policy document {}", path))?,
        ),
        None => None,
    };

    let hrbac = build_engine(document).context("failed to build policy")?;
    info!("Declared roles: {:?}", hrbac.roles());

    let requests = [
        json!({
            "user": { "id": "root", "role": ["admin"] },
            "route": { "path": "/admin/delete" },
            "method": "PUT",
            "params": { "groupId": 9 }
        }),
        json!({
            "user": { "id": "alice", "role": "user" },
            "route": { "path": "/groups/10" },
            "method": "PUT",
            "params": { "groupId": 10 }
        }),
        json!({
            "user": { "id": "bob", "role": "guest" },
            "route": { "path": "/groups/10" },
            "method": "PUT",
            "params": { "groupId": 10 }
        }),
        json!({
            "user": { "id": "mallory", "role": 42 },
            "route": { "path": "/groups/10" },
            "method": "PUT"
        }),
    ];

    for label in ["admin", "is admin or group owner"] {
        let guard = match hrbac.middleware(label, Some(json!({ "reason": label }))) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping guard '{}': {}", label, e);
                continue;
            }
        };

        for request in &requests {
            let user = &request["user"]["id"];
            guard
                .call(request, &(), |rejection| match rejection {
                    None => info!("[{}] {} -> ALLOW", label, user),
                    Some(r) => info!("[{}] {} -> DENY {} {}", label, user, r.status, r),
                })
                .await;
        }
    }

    Ok(())
}
