use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use regionkeeper_anvil::compression::gzip_to_zlib;
use regionkeeper_anvil::{ChunkData, ChunkPos, Compression, RegionPos};
use regionkeeper_store::{RegionStore, StoreConfig, DEFAULT_MAX_OPEN_REGIONS};

#[derive(Parser)]
#[command(name = "regionkeeper", about = "Inspect and maintain Minecraft Anvil region directories")]
pub struct Args {
    /// Directory holding the r.x.z.mca files
    #[arg(short, long, env = "ROOT")]
    pub root: PathBuf,

    /// Maximum number of region files kept open at once
    #[arg(long, env = "CACHE_SIZE", default_value_t = DEFAULT_MAX_OPEN_REGIONS)]
    pub cache_size: usize,

    /// Skip fsync after each write
    #[arg(long)]
    pub no_sync: bool,

    /// Print store statistics on exit
    #[arg(long)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List region files
    Regions,

    /// List chunk positions of a region
    #[command(allow_negative_numbers = true)]
    Chunks {
        rx: i32,
        rz: i32,
        /// Every position, not only the chunks present
        #[arg(long)]
        all: bool,
    },

    /// Print a JSON summary of a region file
    #[command(allow_negative_numbers = true)]
    Info { rx: i32, rz: i32 },

    /// Write a chunk payload to stdout
    #[command(allow_negative_numbers = true)]
    Cat {
        x: i32,
        z: i32,
        #[arg(long)]
        decompress: bool,
    },

    /// Store a file as a chunk
    #[command(allow_negative_numbers = true)]
    Put {
        x: i32,
        z: i32,
        file: PathBuf,
        #[arg(long, value_enum, default_value = "zlib")]
        compression: CompressionArg,
        /// Store the bytes as they are, detecting their compression
        #[arg(long)]
        raw: bool,
    },

    /// Remove a chunk
    #[command(allow_negative_numbers = true)]
    Delete { x: i32, z: i32 },

    /// Repack one region, or all of them
    #[command(allow_negative_numbers = true)]
    Compact {
        #[arg(requires = "rz")]
        rx: Option<i32>,
        rz: Option<i32>,
    },

    /// Zero unused space in one region, or all of them
    #[command(allow_negative_numbers = true)]
    EraseFreeSpace {
        #[arg(requires = "rz")]
        rx: Option<i32>,
        rz: Option<i32>,
    },

    /// Rewrite a gzip chunk as zlib
    #[command(allow_negative_numbers = true)]
    ToZlib { x: i32, z: i32 },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CompressionArg {
    Gzip,
    Zlib,
    None,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Zlib => Compression::Zlib,
            CompressionArg::None => Compression::None,
        }
    }
}

#[derive(Serialize)]
struct RegionInfo {
    region: String,
    path: PathBuf,
    file_len: u64,
    used_sectors: usize,
    chunks: Vec<ChunkInfo>,
}

#[derive(Serialize)]
struct ChunkInfo {
    x: i32,
    z: i32,
    sector: u32,
    sectors: u8,
    timestamp: i32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = StoreConfig::new(&args.root)
        .max_open_regions(args.cache_size)
        .sync_writes(!args.no_sync);
    let mut store = RegionStore::with_config(config)
        .with_context(|| format!("Failed to open region store at {}", args.root.display()))?;

    run(&mut store, args.command)?;

    let stats = store.stats();
    store.close().context("Failed to close region store")?;
    if args.stats {
        println!("{}", stats.generate_report());
    }
    Ok(())
}

fn run(store: &mut RegionStore, command: Command) -> Result<()> {
    match command {
        Command::Regions => {
            for pos in store.regions()? {
                println!("{} {}", pos.x, pos.z);
            }
        }
        Command::Chunks { rx, rz, all } => {
            for chunk in store.chunks(RegionPos::new(rx, rz), !all)? {
                println!("{} {}", chunk.x, chunk.z);
            }
        }
        Command::Info { rx, rz } => {
            let pos = RegionPos::new(rx, rz);
            let Some(region) = store.region(pos, false)? else {
                bail!("Region {} does not exist", pos);
            };
            let chunks = region
                .chunks(true)?
                .into_iter()
                .map(|chunk| {
                    let location = region.location(chunk);
                    ChunkInfo {
                        x: chunk.x,
                        z: chunk.z,
                        sector: location.sector,
                        sectors: location.count,
                        timestamp: region.timestamp(chunk),
                    }
                })
                .collect();
            let info = RegionInfo {
                region: pos.to_string(),
                path: region.path().to_path_buf(),
                file_len: region.file_len()?,
                used_sectors: region.used_sectors(),
                chunks,
            };
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Cat { x, z, decompress } => {
            let chunk = ChunkPos::new(x, z);
            let data = store
                .read(chunk)?
                .with_context(|| format!("Chunk {} not found", chunk))?;
            let bytes = if decompress {
                data.decompress()
                    .with_context(|| format!("Failed to decompress chunk {}", chunk))?
            } else {
                data.into_raw_data()
            };
            std::io::stdout().lock().write_all(&bytes)?;
        }
        Command::Put { x, z, file, compression, raw } => {
            let chunk = ChunkPos::new(x, z);
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let data = if raw {
                ChunkData::new(bytes)
            } else {
                ChunkData::compress(&bytes, compression.into(), regionkeeper_anvil::chunk::now())?
            };
            info!(
                "Storing {} bytes ({:?}) at chunk {}",
                data.len(),
                data.compression(),
                chunk
            );
            store.write(chunk, Some(data))?;
        }
        Command::Delete { x, z } => {
            store.delete(ChunkPos::new(x, z))?;
        }
        Command::Compact { rx, rz } => match rx.zip(rz) {
            Some((rx, rz)) => store.compact(RegionPos::new(rx, rz))?,
            None => store.compact_all()?,
        },
        Command::EraseFreeSpace { rx, rz } => match rx.zip(rz) {
            Some((rx, rz)) => store.erase_free_space(RegionPos::new(rx, rz))?,
            None => store.erase_free_space_all()?,
        },
        Command::ToZlib { x, z } => {
            let chunk = ChunkPos::new(x, z);
            let data = store
                .read(chunk)?
                .with_context(|| format!("Chunk {} not found", chunk))?;
            if data.compression() != Compression::Gzip {
                bail!(
                    "Chunk {} is {:?}, only gzip chunks can be converted",
                    chunk,
                    data.compression()
                );
            }
            let zlib = gzip_to_zlib(data.raw_data())
                .with_context(|| format!("Failed to convert chunk {}", chunk))?;
            let timestamp = data.timestamp();
            store.write(
                chunk,
                Some(ChunkData::with_compression(zlib, Compression::Zlib, timestamp)),
            )?;
        }
    }
    Ok(())
}
