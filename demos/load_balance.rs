//! Load balance - two servers behind an XClient.
//!
//! This example demonstrates:
//! - Random and round-robin selection over a fixed server list
//! - Broadcasting one call to every server
//! - A handle timeout cutting a slow broadcast short
//!
//! ```text
//! cargo run --example load_balance
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinyrpc::{ConnectionOptions, MultiServersDiscovery, SelectMode, Server, Service, XClient};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
struct Args {
    num1: i32,
    num2: i32,
}

struct Foo;

async fn start_server() -> Result<String, Box<dyn std::error::Error>> {
    let server = Server::new();
    server.register(
        Service::builder(Foo)
            .method("Sum", |_: Arc<Foo>, args: Args| async move {
                Ok::<_, String>(args.num1 + args.num2)
            })
            .method("Sleep", |_: Arc<Foo>, args: Args| async move {
                tokio::time::sleep(Duration::from_secs(args.num1 as u64)).await;
                Ok::<_, String>(args.num1 + args.num2)
            }),
    )?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = format!("tcp@{}", listener.local_addr()?);
    tokio::spawn(async move { server.accept(listener).await });
    Ok(addr)
}

async fn call(mode: SelectMode, servers: Vec<String>) {
    let discovery = Arc::new(MultiServersDiscovery::new(servers));
    let xc = XClient::new(discovery, mode, ConnectionOptions::default());

    for i in 0..5 {
        let args = Args { num1: i, num2: i * i };
        match xc.call::<_, i32>("Foo.Sum", &args).await {
            Ok(reply) => info!(?mode, "call Foo.Sum success: {} + {} = {}", args.num1, args.num2, reply),
            Err(e) => warn!(?mode, "call Foo.Sum error: {}", e),
        }
    }
    let _ = xc.close().await;
}

async fn broadcast(servers: Vec<String>) {
    let discovery = Arc::new(MultiServersDiscovery::new(servers));
    let opts = ConnectionOptions::default().with_handle_timeout(Duration::from_secs(2));
    let xc = XClient::new(discovery, SelectMode::Random, opts);

    for i in 0..5 {
        let args = Args { num1: i, num2: i * i };
        let mut reply = 0i32;
        match xc.broadcast("Foo.Sum", &args, Some(&mut reply)).await {
            Ok(()) => info!("broadcast Foo.Sum success: {}", reply),
            Err(e) => warn!("broadcast Foo.Sum error: {}", e),
        }

        // calls sleeping 2s or more hit the handle timeout
        match xc.broadcast("Foo.Sleep", &args, Some(&mut reply)).await {
            Ok(()) => info!("broadcast Foo.Sleep success: {}", reply),
            Err(e) => warn!("broadcast Foo.Sleep error: {}", e),
        }
    }
    let _ = xc.close().await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let servers = vec![start_server().await?, start_server().await?];

    call(SelectMode::Random, servers.clone()).await;
    call(SelectMode::RoundRobin, servers.clone()).await;
    broadcast(servers).await;
    Ok(())
}
