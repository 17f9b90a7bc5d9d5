use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;
use xastore::archive::{self, PackOptions, UnpackOptions};
use xastore::{DigestSource, Manifest, SideDataOrder, StoreReader};

#[derive(Parser)]
#[command(name = "xastore", version, about = "Xamarin.Android assembly store blob tool")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every assembly of a blob into a directory
    Unpack {
        blob:     PathBuf,
        manifest: PathBuf,
        out_dir:  PathBuf,
        /// Where to record per-assembly framing (default <OUT_DIR>/frames.json)
        #[arg(long)]
        sideband: Option<PathBuf>,
        /// Do not write the framing sideband
        #[arg(long)]
        no_sideband: bool,
    },
    /// Build a blob from a directory of assemblies
    Pack {
        out_blob: PathBuf,
        manifest: PathBuf,
        in_dir:   PathBuf,
        /// Hash names with xxHash instead of using the manifest's digests
        #[arg(long)]
        compute_digests: bool,
        /// Place config data before debug data in the data region
        #[arg(long)]
        config_before_debug: bool,
        /// Store assemblies without a sideband record uncompressed
        #[arg(long)]
        no_compress: bool,
        /// Store id written to the header and hash tables
        #[arg(long, default_value = "0")]
        store_id: u32,
        /// Framing sideband to read (default <IN_DIR>/frames.json)
        #[arg(long)]
        sideband: Option<PathBuf>,
    },
    /// List blob entries
    List {
        blob: PathBuf,
        /// Manifest used to name entries
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Show blob header and layout checks
    Info {
        blob: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { blob, manifest, out_dir, sideband, no_sideband } => {
            let opts = UnpackOptions { sideband, write_sideband: !no_sideband };
            let report = archive::unpack(&blob, &manifest, &out_dir, &opts)?;
            println!("Unpacked {} assemblies ({} files) to: {}",
                     report.modules, report.files.len(), out_dir.display());
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack {
            out_blob, manifest, in_dir,
            compute_digests, config_before_debug, no_compress, store_id, sideband,
        } => {
            let opts = PackOptions {
                digests: if compute_digests { DigestSource::Computed } else { DigestSource::Manifest },
                side_data_order: if config_before_debug {
                    SideDataOrder::ConfigThenDebug
                } else {
                    SideDataOrder::DebugThenConfig
                },
                store_id,
                compress: !no_compress,
                sideband,
            };
            let report = archive::pack(&out_blob, &manifest, &in_dir, &opts)?;
            println!("Created: {} ({} assemblies, {} bytes)",
                     out_blob.display(), report.modules, report.bytes);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { blob, manifest } => {
            let manifest = manifest.map(Manifest::load).transpose()?;
            let entries = archive::list(&blob, manifest.as_ref())?;
            println!("Blob: {}", blob.display());
            println!("{:>5}  {:<10} {:<18} {:>10} {:>10}  {:<5} {:<6}  Name",
                     "Index", "Hash32", "Hash64", "Stored", "Size", "Debug", "Config");
            for e in entries {
                let size = e.frame.map(|(_, s)| s).unwrap_or(e.data.size);
                println!("{:>5}  {:<10} {:<18} {:>10} {:>10}  {:<5} {:<6}  {}",
                    e.index,
                    e.hash32.map(|h| format!("{h:08x}")).unwrap_or_else(|| "-".into()),
                    e.hash64.map(|h| format!("{h:016x}")).unwrap_or_else(|| "-".into()),
                    e.data.size,
                    size,
                    if e.debug.is_some() { "yes" } else { "no" },
                    if e.config.is_some() { "yes" } else { "no" },
                    e.name.as_deref().unwrap_or("?"));
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { blob } => {
            let store = StoreReader::open(&blob)?;
            let hdr = &store.header;
            println!("── Assembly store ───────────────────────────────────────");
            println!("  Path           {}", blob.display());
            println!("  Format version {}", hdr.version);
            println!("  Store id       {}", hdr.store_id);
            println!("  Local entries  {}", hdr.local_entry_count);
            println!("  Global entries {}", hdr.global_entry_count);
            println!("  Data offset    {} B", hdr.tables_end());
            println!("  Size           {} B", store.len());
            match store.check_layout() {
                Ok(())  => println!("  Layout         ok"),
                Err(e)  => println!("  Layout         {e}"),
            }
        }
    }

    Ok(())
}
