//! Synchronous client matching the wire protocol: sends a file's bytes as a
//! single frame and writes whatever comes back to an output path.
//!
//! ```bash
//! cargo run --example file_roundtrip_client -- -s 127.0.0.1 -p 9000 in.bin out.bin
//! ```

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
struct Args {
    /// server address
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    host: String,

    /// server port
    #[arg(short = 'p', long, default_value_t = 9000)]
    port: u16,

    input: PathBuf,
    output: PathBuf,
}

fn write_frame(stream: &mut TcpStream, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len()).expect("frame body too large to encode a length prefix");
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(body)
}

fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(body)
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let body = std::fs::read(&args.input)?;
    let mut stream = TcpStream::connect((args.host.as_str(), args.port))?;
    stream.set_nodelay(true)?;

    write_frame(&mut stream, &body)?;
    let response = read_frame(&mut stream)?;

    std::fs::write(&args.output, response)?;
    println!("wrote {} bytes to {}", body.len(), args.output.display());
    Ok(())
}
