//! Sum - one server, one client, concurrent calls.
//!
//! This example demonstrates:
//! - Registering a service with a typed method
//! - Serving it on a loopback TCP listener
//! - Issuing concurrent calls over one multiplexed client
//!
//! ```text
//! cargo run --example sum
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tinyrpc::{Client, ConnectionOptions, Server, Service};
use tokio::net::TcpListener;
use tracing::info;

/// Arguments of `Foo.Sum`.
#[derive(Serialize, Deserialize, Debug)]
struct Args {
    num1: i32,
    num2: i32,
}

struct Foo;

impl Foo {
    async fn sum(&self, args: Args) -> Result<i32, String> {
        Ok(args.num1 + args.num2)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let server = Server::new();
    server.register(
        Service::builder(Foo).method("Sum", |foo: Arc<Foo>, args: Args| async move {
            foo.sum(args).await
        }),
    )?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = format!("tcp@{}", listener.local_addr()?);
    tokio::spawn(async move { server.accept(listener).await });

    let client = Arc::new(Client::xdial(&addr, ConnectionOptions::default()).await?);

    let mut calls = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            let args = Args { num1: i, num2: i * i };
            let reply: tinyrpc::Result<i32> = client.call("Foo.Sum", &args).await;
            (args, reply)
        }));
    }

    for call in calls {
        let (args, reply) = call.await?;
        info!("{} + {} = {}", args.num1, args.num2, reply?);
    }

    client.close().await?;
    Ok(())
}
