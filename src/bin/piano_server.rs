use clap::Parser;
use piano::params::Params;
use piano::server::{InMemoryDb, Server};
use piano::transport::{read_frame, write_frame};
use simplelog::{Config, LevelFilter, SimpleLogger};
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    db: String,
    #[arg(long, default_value = "8")]
    entry_size: usize,
    #[arg(long, default_value = "127.0.0.1:4000")]
    listen: String,
}

fn handle_client(mut stream: TcpStream, server: Arc<Server<InMemoryDb>>) -> io::Result<()> {
    loop {
        let payload = read_frame(&mut stream)?;
        let replies = server.handle_request(&payload).map_err(|e| {
            log::warn!("request failed: {}", e);
            io::Error::new(io::ErrorKind::InvalidData, e.to_string())
        })?;
        for reply in replies {
            write_frame(&mut stream, &reply)?;
        }
    }
}

fn build_server(db_path: &str, entry_size: usize) -> Result<Server<InMemoryDb>, Box<dyn std::error::Error>> {
    let db = std::fs::read(db_path)?;
    if entry_size == 0 || db.len() % entry_size != 0 {
        return Err("entry_size must divide db length".into());
    }
    let num_entries = db.len() / entry_size;
    let params = Params::new(num_entries as u64, entry_size, 1);
    let db = InMemoryDb::new(db, entry_size)?;
    let server = Server::new(db, params.chunk_size)?;
    Ok(server)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::init(LevelFilter::Info, Config::default())?;
    let args = Args::parse();
    let server = build_server(&args.db, args.entry_size)?;
    let server = Arc::new(server);
    log::info!(
        "serving {} chunks of {} entries on {}",
        server.set_size(),
        server.chunk_size(),
        args.listen
    );

    let listener = TcpListener::bind(&args.listen)?;
    for stream in listener.incoming() {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            if let Ok(stream) = stream {
                if let Err(e) = handle_client(stream, server) {
                    log::debug!("connection closed: {}", e);
                }
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from([
            "piano_server",
            "--db",
            "db.bin",
            "--entry-size",
            "16",
            "--listen",
            "127.0.0.1:5000",
        ]);
        assert_eq!(args.db, "db.bin");
        assert_eq!(args.entry_size, 16);
        assert_eq!(args.listen, "127.0.0.1:5000");
    }

    #[test]
    fn test_parse_args_defaults() {
        let args = Args::parse_from(["piano_server", "--db", "db.bin"]);
        assert_eq!(args.entry_size, 8);
        assert_eq!(args.listen, "127.0.0.1:4000");
    }

    #[test]
    fn test_build_server_uses_params_chunk_size() {
        let path = std::env::temp_dir().join("piano_server_build_test.bin");
        std::fs::write(&path, vec![0u8; 256 * 8]).unwrap();
        let server = build_server(path.to_str().unwrap(), 8).unwrap();
        let params = Params::new(256, 8, 1);
        assert_eq!(server.chunk_size(), params.chunk_size);
        assert_eq!(server.set_size(), params.set_size);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_build_server_rejects_misaligned_db() {
        let path = std::env::temp_dir().join("piano_server_misaligned_test.bin");
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        assert!(build_server(path.to_str().unwrap(), 8).is_err());
        std::fs::remove_file(&path).ok();
    }
}
