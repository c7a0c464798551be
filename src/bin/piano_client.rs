use clap::Parser;
use piano::params::Params;
use piano::prf::Prf;
use piano::transport::FramedIo;
use piano::QueryClient;
use rand::Rng;
use sha3::{Digest, Sha3_256};
use simplelog::{Config, LevelFilter, SimpleLogger};
use std::net::TcpStream;
use std::time::Instant;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4000")]
    server: String,
    #[arg(long)]
    entry_num: u64,
    #[arg(long, default_value = "8")]
    entry_size: usize,
    #[arg(long, default_value = "1")]
    threads: u64,
    #[arg(long, default_value = "100")]
    query_count: u64,
    #[arg(long)]
    seed: Option<u64>,
}

fn prf_from_seed(seed: u64) -> Prf {
    let mut hasher = Sha3_256::new();
    hasher.update(seed.to_le_bytes());
    let out = hasher.finalize();
    let mut key = [0u8; 16];
    key.copy_from_slice(&out[..16]);
    Prf::new(key)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::init(LevelFilter::Info, Config::default())?;
    let args = Args::parse();

    let params = Params::new(args.entry_num, args.entry_size, args.threads);
    let prf = match args.seed {
        Some(seed) => prf_from_seed(seed),
        None => Prf::random(),
    };

    let stream = TcpStream::connect(&args.server)?;
    stream.set_nodelay(true)?;
    let mut client = QueryClient::with_prf(params, prf, FramedIo::new(stream));

    log::info!(
        "preprocessing {} entries ({} chunks x {})",
        args.entry_num,
        client.params().set_size,
        client.params().chunk_size
    );
    let start = Instant::now();
    client.fetch_full_db()?;
    log::info!("preprocessing done in {:.2?}", start.elapsed());

    let mut rng = rand::thread_rng();
    let indices: Vec<u64> = (0..args.query_count)
        .map(|_| rng.gen_range(0..args.entry_num))
        .collect();

    let start = Instant::now();
    let results = client.queries(&indices)?;
    let elapsed = start.elapsed();
    log::info!(
        "{} queries in {:.2?} ({:.1} queries/s), first result {:02x?}",
        results.len(),
        elapsed,
        results.len() as f64 / elapsed.as_secs_f64(),
        results.first().map(|e| e.as_bytes())
    );
    Ok(())
}
