//! blockchurn CLI - streaming block-wise file encryption
//!
//! Encrypts and decrypts files or whole directories with AES-256-GCM (or
//! AES-256-CCM) blocks, and prints sampled fingerprints of large files.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

use blockchurn::codec::ByteCodec;
use blockchurn::fingerprint::{self, HashAlgo};
use blockchurn::secret::{FileSecretReader, ReaderSecretReader, SecretReader};
use blockchurn::{ChurnError, ChurnParams, FolderChurnParams, Result, file_ops};

#[derive(Parser)]
#[command(name = "blockchurn")]
#[command(version)]
#[command(about = "Streaming block-wise file encryption.", long_about = None)]
struct Cli {
    /// Read the secret from this file instead of from stdin
    #[arg(long, global = true, value_name = "FILE")]
    secret_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file, or every file in a directory
    #[command(alias = "e")]
    Encrypt(ChurnArgs),

    /// Decrypt an .enc file, or every .enc file in a directory
    #[command(alias = "d")]
    Decrypt {
        #[command(flatten)]
        churn: ChurnArgs,

        /// Decrypt without checking authentication tags
        #[arg(long)]
        skip_auth: bool,
    },

    /// Print a sampled fingerprint of a file
    #[command(alias = "f")]
    Fingerprint {
        /// Path to the file to fingerprint
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = AlgoArg::Sha256)]
        algo: AlgoArg,

        /// Number of evenly spaced chunks to sample
        #[arg(long, default_value_t = fingerprint::DEFAULT_READS)]
        reads: u64,

        /// Size of each sampled chunk in bytes
        #[arg(long, default_value_t = fingerprint::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        #[arg(long, value_enum, default_value_t = CodecArg::Hex)]
        codec: CodecArg,
    },
}

#[derive(Args)]
struct ChurnArgs {
    /// File or directory to churn
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Keep the source file after churning
    #[arg(long)]
    keep_source: bool,

    /// Churn even if the target already exists
    #[arg(long)]
    redo: bool,

    /// Keep authentication tags in a .gmac side file
    #[arg(long)]
    auth_file: bool,

    /// Use AES-256-CCM instead of AES-256-GCM
    #[arg(long)]
    ccm: bool,

    /// Do not descend into subdirectories
    #[arg(long)]
    shallow: bool,

    /// Name of the target file, placed next to the source (files only)
    #[arg(long, value_name = "NAME")]
    target_name: Option<String>,
}

impl ChurnArgs {
    fn params(&self) -> ChurnParams {
        let mut params = ChurnParams::DEFAULTS;
        if self.keep_source {
            params |= ChurnParams::KEEP_SOURCE;
        }
        if self.redo {
            params |= ChurnParams::REDO_TARGET;
        }
        if self.auth_file {
            params |= ChurnParams::SUBJECT_AUTHENTICATION;
        }
        if self.ccm {
            params |= ChurnParams::IS_CCM;
        }
        params
    }

    fn folder_params(&self) -> FolderChurnParams {
        if self.shallow {
            FolderChurnParams::IS_SHALLOW
        } else {
            FolderChurnParams::DEFAULTS
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgoArg {
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl From<AlgoArg> for HashAlgo {
    fn from(arg: AlgoArg) -> Self {
        match arg {
            AlgoArg::Sha256 => HashAlgo::Sha256,
            AlgoArg::Sha384 => HashAlgo::Sha384,
            AlgoArg::Sha512 => HashAlgo::Sha512,
            AlgoArg::Blake3 => HashAlgo::Blake3,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CodecArg {
    Hex,
    Base64,
}

impl From<CodecArg> for ByteCodec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Hex => ByteCodec::Hex,
            CodecArg::Base64 => ByteCodec::Base64,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Encrypt(churn) => {
            let mut reader = get_secret_reader(cli.secret_file.as_deref());
            run_churn(&churn, churn.params(), &mut *reader)
        }
        Commands::Decrypt { churn, skip_auth } => {
            let mut params = churn.params() | ChurnParams::IS_DECRYPT;
            if skip_auth {
                params |= ChurnParams::SKIP_AUTHENTICATION;
            }
            let mut reader = get_secret_reader(cli.secret_file.as_deref());
            run_churn(&churn, params, &mut *reader)
        }
        Commands::Fingerprint {
            file,
            algo,
            reads,
            chunk_size,
            codec,
        } => {
            let digest = fingerprint::light_hash_file(&file, algo.into(), reads, chunk_size)?;
            println!("{}", ByteCodec::from(codec).encode(&digest));
            Ok(())
        }
    }
}

fn run_churn(
    churn: &ChurnArgs,
    params: ChurnParams,
    reader: &mut dyn SecretReader,
) -> Result<()> {
    let outcomes = if churn.path.is_dir() {
        if churn.target_name.is_some() {
            return Err(ChurnError::invalid_argument(
                "--target-name only applies to single files",
            ));
        }
        let secret = reader.read_secret()?;
        file_ops::churn_dir(&churn.path, &secret, churn.folder_params(), params)?
    } else {
        let secret = reader.read_secret()?;
        vec![file_ops::churn_file(
            &churn.path,
            &secret,
            params,
            churn.target_name.as_deref(),
        )?]
    };

    for outcome in outcomes {
        println!("{}", outcome.target().display());
    }
    Ok(())
}

fn get_secret_reader(secret_file: Option<&Path>) -> Box<dyn SecretReader> {
    match secret_file {
        Some(path) => Box::new(FileSecretReader::new(path)),
        None => Box::new(ReaderSecretReader::new(Box::new(std::io::stdin()))),
    }
}

fn error_chain(err: &ChurnError) -> String {
    let mut rendered = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
