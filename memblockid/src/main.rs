mod logger;

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use libmemblockid::{Probe, ProbeConfig, ProbeResult, REGISTRY};

use crate::logger::init_logger;

/// Enough for every registered superblock, including btrfs at 64 KiB.
const DEFAULT_READ_BYTES: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(name = "memblockid")]
#[command(version, about = "Identify filesystem signatures in files and block devices", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe files or devices for a known filesystem signature
    Probe {
        /// Files or block devices to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only consider these formats (repeatable, or comma separated)
        #[arg(short, long, value_delimiter = ',')]
        filter: Vec<String>,
        /// Number of leading bytes read from each input
        #[arg(short, long, default_value_t = DEFAULT_READ_BYTES)]
        bytes: u64,
    },
    /// List supported filesystems
    List {
        /// Also show each format's usage category
        #[arg(short, long)]
        long: bool,
    },
}

fn read_leading(path: &Path, bytes: u64) -> Result<Vec<u8>, std::io::Error> {
    let mut buffer = Vec::new();
    File::open(path)?.take(bytes).read_to_end(&mut buffer)?;

    return Ok(buffer);
}

fn format_result(path: &Path, result: &ProbeResult) -> String {
    let (fstype, block_size) = match result {
        ProbeResult::Matched(m) => (m.name.to_string(), m.block_size),
        ProbeResult::NoMatch => ("unknown".to_string(), None),
        ProbeResult::Ambiguous(names) => (format!("ambiguous({})", names.join(",")), None),
    };

    let block_size = match block_size {
        Some(size) => size.to_string(),
        None => "unknown".to_string(),
    };

    return format!(
        "name={} fstype={fstype} block_size={block_size}",
        path.display()
    );
}

fn probe(paths: &[PathBuf], filter: Vec<String>, bytes: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = if filter.is_empty() {
        ProbeConfig::all()
    } else {
        ProbeConfig::builder().formats(filter).build()?
    };

    let probe = Probe::new(config);
    let mut unreadable = 0usize;

    for path in paths {
        let buffer = match read_leading(path, bytes) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::error!("probe - unable to read {}: {e}", path.display());
                unreadable += 1;
                continue;
            }
        };

        log::debug!("probe - read {} bytes from {}", buffer.len(), path.display());

        println!("{}", format_result(path, &probe.run(&buffer)));
    }

    if unreadable > 0 {
        return Err(format!("{unreadable} of {} inputs could not be read", paths.len()).into());
    }

    return Ok(());
}

fn list(long: bool) {
    println!("Supported Filesystems:");

    for desc in REGISTRY {
        if long {
            println!("- {} ({})", desc.name(), desc.usage);
        } else {
            println!("- {}", desc.name());
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Probe {
            paths,
            filter,
            bytes,
        } => probe(&paths, filter, bytes)?,
        Commands::List { long } => list(long),
    }

    return Ok(());
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(()) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("memblockid: {e}");
            return ExitCode::FAILURE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libmemblockid::probe_buffer;

    #[test]
    fn result_lines() {
        let path = Path::new("/dev/sdz1");

        assert_eq!(
            format_result(path, &ProbeResult::NoMatch),
            "name=/dev/sdz1 fstype=unknown block_size=unknown"
        );
        assert_eq!(
            format_result(path, &ProbeResult::Ambiguous(vec!["xfs", "ext2"])),
            "name=/dev/sdz1 fstype=ambiguous(xfs,ext2) block_size=unknown"
        );

        let mut romfs = vec![0u8; 512];
        romfs[..8].copy_from_slice(b"-rom1fs-");
        let result = probe_buffer(&romfs, None).unwrap();
        assert_eq!(
            format_result(path, &result),
            "name=/dev/sdz1 fstype=romfs block_size=1024"
        );
    }

    #[test]
    fn unknown_filter_fails_before_reading() {
        let paths = [PathBuf::from("/nonexistent/image.bin")];
        let err = probe(&paths, vec!["reiserfs".to_string()], 4096).unwrap_err();
        assert!(err.to_string().contains("reiserfs"));
    }

    #[test]
    fn unreadable_input_is_a_failure() {
        let image = std::env::temp_dir().join(format!("memblockid-{}.img", std::process::id()));
        let mut romfs = vec![0u8; 512];
        romfs[..8].copy_from_slice(b"-rom1fs-");
        std::fs::write(&image, &romfs).unwrap();

        assert!(probe(&[image.clone()], vec![], 4096).is_ok());

        // readable inputs are still reported, but the run fails
        let paths = [image.clone(), PathBuf::from("/nonexistent/image.bin")];
        let err = probe(&paths, vec![], 4096).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 inputs could not be read");

        std::fs::remove_file(&image).unwrap();
    }

    #[test]
    fn cli_arguments() {
        let cli = Cli::try_parse_from([
            "memblockid",
            "probe",
            "--filter",
            "ext4,xfs",
            "-f",
            "vfat",
            "disk.img",
        ])
        .unwrap();

        let Commands::Probe {
            paths,
            filter,
            bytes,
        } = cli.command
        else {
            panic!("expected probe subcommand");
        };
        assert_eq!(paths, vec![PathBuf::from("disk.img")]);
        assert_eq!(filter, vec!["ext4", "xfs", "vfat"]);
        assert_eq!(bytes, DEFAULT_READ_BYTES);

        assert!(Cli::try_parse_from(["memblockid", "probe"]).is_err());
    }
}
