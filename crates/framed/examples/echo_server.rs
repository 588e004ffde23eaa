//! Answers every request with its own bytes back.
//!
//! ```bash
//! cargo run --example echo_server -- -s 0.0.0.0 -p 9000
//! ```

use clap::Parser;
use framed::{NoEvents, Request, RequestHandler, Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// address to listen on
    #[arg(short = 's', long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// port to listen on
    #[arg(short = 'p', long, default_value_t = 9000)]
    port: u16,

    /// worker threads; defaults to twice the available cores
    #[arg(short = 't', long)]
    threads: Option<usize>,
}

struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn on_request(&self, request: &Request) -> bool {
        let body = request.bytes().to_vec();
        request.clone_response(&body);
        request.end_response();
        true
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let mut server = Server::new(EchoHandler);
    server.set_listen_address(args.host);
    if let Some(threads) = args.threads {
        server.set_work_thread_count(threads);
    }

    std::process::exit(server.start(args.port, NoEvents));
}
